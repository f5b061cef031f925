//! spillkv Dedup Binary
//!
//! Counts distinct lines of its input through a struct-keyed set, spilling to
//! disk once the memory budget is exceeded.

use std::fs::File;
use std::io::{self, BufRead, BufReader, BufWriter, Write};
use std::path::PathBuf;

use clap::Parser;
use spillkv::{Datum, FieldType, SpillConfig, StructField, StructLikeFactory, StructType, StructValue};
use tracing_subscriber::{fmt, EnvFilter};

/// spillkv Dedup
#[derive(Parser, Debug)]
#[command(name = "spillkv-dedup")]
#[command(about = "Count distinct input lines with a memory-bounded set")]
#[command(version)]
struct Args {
    /// Input file (reads stdin when omitted)
    #[arg(short, long)]
    input: Option<PathBuf>,

    /// Memory budget in bytes before the set spills to disk
    #[arg(short, long)]
    budget_bytes: Option<u64>,

    /// Parent directory for the spill engine (default: $SPILLKV_BASE_DIR or temp)
    #[arg(long)]
    base_dir: Option<PathBuf>,

    /// Partition identifier for the spilled set
    #[arg(short, long, default_value = "dedup")]
    partition: String,

    /// Print each line the first time it is seen
    #[arg(long)]
    print_unique: bool,
}

fn main() {
    // Initialize tracing/logging; stdout carries the results
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,spillkv=info"));

    fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_writer(io::stderr)
        .init();

    let args = Args::parse();

    tracing::info!("spillkv-dedup v{}", spillkv::VERSION);

    match run(args) {
        Ok((total, distinct)) => {
            tracing::info!("Read {} lines, {} distinct", total, distinct);
        }
        Err(e) => {
            tracing::error!("Dedup failed: {}", e);
            std::process::exit(1);
        }
    }
}

fn run(args: Args) -> Result<(u64, u64), Box<dyn std::error::Error>> {
    let mut config = SpillConfig::from_env();
    if let Some(dir) = args.base_dir {
        config.base_dir = Some(dir);
    }
    if let Some(budget) = args.budget_bytes {
        config.max_in_memory_bytes = Some(budget);
        config.map_identifier = Some(args.partition.clone());
        tracing::info!("Memory budget: {} bytes, partition prefix: {}", budget, args.partition);
    } else {
        tracing::info!("No memory budget, set stays in memory");
    }

    let factory = StructLikeFactory::with_config(config);
    let key_type = StructType::new(vec![StructField::required(1, "line", FieldType::String)]);
    let mut seen = factory.create_set(&key_type)?;

    let input: Box<dyn BufRead> = match &args.input {
        Some(path) => Box::new(BufReader::new(File::open(path)?)),
        None => Box::new(io::stdin().lock()),
    };
    let stdout = io::stdout();
    let mut out = BufWriter::new(stdout.lock());

    let mut total = 0u64;
    let mut distinct = 0u64;
    for line in input.lines() {
        let line = line?;
        total += 1;

        let key = StructValue::new(vec![Datum::String(line)]);
        if seen.contains(&key)? {
            continue;
        }
        seen.add(&key)?;
        distinct += 1;

        if args.print_unique {
            if let Some(Datum::String(line)) = key.get(0) {
                writeln!(out, "{}", line)?;
            }
        }
    }

    if !args.print_unique {
        writeln!(out, "{}", distinct)?;
    }
    out.flush()?;

    tracing::debug!("Final set state: {:?}", seen);
    seen.close();
    Ok((total, distinct))
}
