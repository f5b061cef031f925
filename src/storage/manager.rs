//! Storage Manager
//!
//! Manages the SSTables of one partition and coordinates reads/writes.
//!
//! ## Responsibilities
//! - Discover existing SSTables on startup
//! - Search SSTables newest → oldest for reads
//! - Create new SSTables from MemTable flushes
//! - Size-tiered compaction: merge runs of similarly sized tables

use std::fs;
use std::ops::Range;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::RwLock;

use crate::error::{StorageError, StorageResult};
use crate::memtable::{MemTable, MemTableEntry};

use super::merge::{MergeIterator, MergeSource};
use super::{SSTable, SSTableBuilder, SSTableReader};

/// Tables within this size factor of each other belong to the same tier
const TIER_RATIO: u64 = 2;

/// Manages the storage layer of one partition
///
/// ## Concurrency:
/// - `sstables`: Protected by RwLock (many concurrent readers, exclusive writer)
/// - `next_sstable_id`: Atomic counter (lock-free)
/// - Flush and compaction are serialized by the owning partition's write lock
pub struct StorageManager {
    /// Directory where SSTables are stored
    data_dir: PathBuf,

    /// Open SSTable readers, ordered newest → oldest
    sstables: RwLock<Vec<Arc<SSTableReader>>>,

    /// Next ID for creating new SSTables (atomic, lock-free)
    next_sstable_id: AtomicU64,

    /// Sparse index interval for newly written tables
    index_interval: usize,

    /// Input bytes rewritten by compaction
    bytes_compacted: AtomicU64,
}

impl StorageManager {
    /// Open or create storage in the given directory
    ///
    /// On startup:
    /// 1. Create directory if it doesn't exist
    /// 2. Discover existing SSTable files
    /// 3. Open readers for each (loads sparse indexes into RAM)
    /// 4. Order by ID descending (newest first)
    pub fn open(path: &Path, index_interval: usize) -> StorageResult<Self> {
        fs::create_dir_all(path)?;

        let mut sstable_ids: Vec<u64> = Vec::new();
        for entry in fs::read_dir(path)? {
            let file_path = entry?.path();
            if file_path.is_file() {
                if let Some(id) = Self::parse_sstable_id(&file_path) {
                    sstable_ids.push(id);
                }
            }
        }

        // Sort newest first (highest ID first)
        sstable_ids.sort_unstable_by(|a, b| b.cmp(a));

        let mut sstables = Vec::with_capacity(sstable_ids.len());
        for id in &sstable_ids {
            let reader = SSTableReader::open(&Self::sstable_path_with_dir(path, *id))?;
            sstables.push(Arc::new(reader));
        }

        // Next ID = max + 1, or 1 if no SSTables exist
        let next_id = sstable_ids.first().map(|&id| id + 1).unwrap_or(1);

        Ok(Self {
            data_dir: path.to_path_buf(),
            sstables: RwLock::new(sstables),
            next_sstable_id: AtomicU64::new(next_id),
            index_interval: index_interval.max(1),
            bytes_compacted: AtomicU64::new(0),
        })
    }

    /// Get a value by key (searches all SSTables newest → oldest)
    ///
    /// Returns:
    /// - `Ok(Some(value))` — key found with value
    /// - `Ok(None)` — key not found, or found tombstone (deleted)
    pub fn get(&self, key: &[u8]) -> StorageResult<Option<Vec<u8>>> {
        let sstables = self.sstables.read();

        for reader in sstables.iter() {
            // Skip SSTable if key is outside its range (O(1) check)
            if !reader.might_contain(key) {
                continue;
            }

            match reader.get(key) {
                Ok(Some(value)) => return Ok(Some(value)),
                Ok(None) => return Ok(None), // Tombstone = deleted
                Err(StorageError::KeyNotFound) => continue,
                Err(e) => return Err(e),
            }
        }

        Ok(None)
    }

    /// Flush a MemTable to a new SSTable
    ///
    /// Creates a new SSTable file from the MemTable's sorted entries,
    /// opens a reader for it, and adds it to the front of the list.
    pub fn flush(&self, memtable: &MemTable) -> StorageResult<SSTable> {
        if memtable.is_empty() {
            return Err(StorageError::Corruption(
                "Cannot flush empty MemTable".to_string(),
            ));
        }

        let id = self.next_sstable_id.fetch_add(1, Ordering::SeqCst);
        let path = self.sstable_path(id);

        // Entries come out of the BTreeMap already sorted
        let mut builder = SSTableBuilder::new(&path, self.index_interval)?;
        for (key, entry) in memtable.iter() {
            match entry {
                MemTableEntry::Value(v) => builder.add(&key, &v)?,
                MemTableEntry::Tombstone => builder.add_tombstone(&key)?,
            }
        }
        let metadata = builder.finish()?;

        let reader = SSTableReader::open(&path)?;
        self.sstables.write().insert(0, Arc::new(reader));

        tracing::trace!(
            "Flushed {} entries to {}",
            metadata.entry_count,
            path.display()
        );
        Ok(metadata)
    }

    /// Merge one tier of similarly sized SSTables
    ///
    /// Picks the longest run of adjacent tables whose sizes stay within
    /// `TIER_RATIO` of each other (falling back to the cheapest adjacent
    /// pair) and replaces it with one table in the same age position.
    /// Tombstones are dropped only when the oldest table is part of the run;
    /// otherwise they still have to hide older versions.
    ///
    /// Returns the new table, or `None` if there was nothing to merge or
    /// nothing live remained.
    pub fn compact(&self) -> StorageResult<Option<SSTable>> {
        let tables: Vec<Arc<SSTableReader>> = self.sstables.read().clone();
        let sizes: Vec<u64> = tables.iter().map(|t| t.file_size()).collect();
        let Some(run) = Self::pick_tier(&sizes) else {
            return Ok(None);
        };
        let inputs = &tables[run.clone()];
        let drop_tombstones = run.end == tables.len();
        let input_bytes: u64 = sizes[run.clone()].iter().sum();

        let sources = inputs
            .iter()
            .map(|reader| reader.iter().map(|it| Box::new(it) as MergeSource))
            .collect::<StorageResult<Vec<_>>>()?;
        let merged = MergeIterator::new(sources, !drop_tombstones)?;

        let id = self.next_sstable_id.fetch_add(1, Ordering::SeqCst);
        let path = self.sstable_path(id);
        let mut builder = SSTableBuilder::new(&path, self.index_interval)?;
        for entry in merged {
            match entry? {
                (key, Some(value)) => builder.add(&key, &value)?,
                (key, None) => builder.add_tombstone(&key)?,
            }
        }
        let written = builder.entry_count();
        let metadata = builder.finish()?;

        let output = if written > 0 {
            let reader = Arc::new(SSTableReader::open(&path)?);
            let mut sstables = self.sstables.write();
            sstables.drain(run.clone());
            sstables.insert(run.start, reader);
            Some(metadata)
        } else {
            self.sstables.write().drain(run.clone());
            Self::remove_file(&path);
            None
        };

        for reader in inputs {
            Self::remove_file(reader.path());
        }
        self.bytes_compacted.fetch_add(input_bytes, Ordering::Relaxed);

        tracing::debug!(
            "Compacted {} of {} SSTables ({} bytes) in {} into {} entries",
            inputs.len(),
            tables.len(),
            input_bytes,
            self.data_dir.display(),
            written
        );
        Ok(output)
    }

    /// Sorted sources over every SSTable, newest first
    pub fn sources(&self) -> StorageResult<Vec<MergeSource>> {
        self.sstables
            .read()
            .iter()
            .map(|reader| reader.iter().map(|it| Box::new(it) as MergeSource))
            .collect()
    }

    /// Get the number of SSTables
    pub fn sstable_count(&self) -> usize {
        self.sstables.read().len()
    }

    /// Get the data directory path
    pub fn data_dir(&self) -> &Path {
        &self.data_dir
    }

    /// Total size of every table consumed by compaction so far
    pub fn bytes_compacted(&self) -> u64 {
        self.bytes_compacted.load(Ordering::Relaxed)
    }

    /// Get the next SSTable ID (for testing/debugging)
    pub fn next_sstable_id(&self) -> u64 {
        self.next_sstable_id.load(Ordering::SeqCst)
    }

    // =========================================================================
    // Private Helpers
    // =========================================================================

    /// Choose the adjacent run of tables to merge, given sizes newest first
    fn pick_tier(sizes: &[u64]) -> Option<Range<usize>> {
        if sizes.len() < 2 {
            return None;
        }

        // (run, total bytes) of the longest similar-size run; ties go to the cheaper one
        let mut best: Option<(Range<usize>, u64)> = None;
        for start in 0..sizes.len() {
            let (mut lo, mut hi, mut total) = (sizes[start], sizes[start], sizes[start]);
            let mut end = start + 1;
            while let Some(&size) = sizes.get(end) {
                let (next_lo, next_hi) = (lo.min(size), hi.max(size));
                if next_hi > next_lo.saturating_mul(TIER_RATIO) {
                    break;
                }
                lo = next_lo;
                hi = next_hi;
                total += size;
                end += 1;
            }

            let better = match &best {
                None => true,
                Some((run, best_total)) => {
                    let len = end - start;
                    len > run.len() || (len == run.len() && total < *best_total)
                }
            };
            if better {
                best = Some((start..end, total));
            }
        }

        match best {
            Some((run, _)) if run.len() >= 2 => Some(run),
            _ => (0..sizes.len() - 1)
                .min_by_key(|&i| sizes[i] + sizes[i + 1])
                .map(|i| i..i + 2),
        }
    }

    fn remove_file(path: &Path) {
        if let Err(e) = fs::remove_file(path) {
            tracing::warn!("Failed to remove SSTable {}: {}", path.display(), e);
        }
    }

    /// Generate the file path for an SSTable with given ID
    fn sstable_path(&self, id: u64) -> PathBuf {
        Self::sstable_path_with_dir(&self.data_dir, id)
    }

    /// Generate SSTable path given a directory and ID
    fn sstable_path_with_dir(dir: &Path, id: u64) -> PathBuf {
        dir.join(format!("sstable_{:06}.sst", id))
    }

    /// Parse SSTable ID from filename
    /// "sstable_000042.sst" → Some(42)
    fn parse_sstable_id(path: &Path) -> Option<u64> {
        if path.extension()? != "sst" {
            return None;
        }
        let name = path.file_stem()?.to_string_lossy();
        let id_str = name.strip_prefix("sstable_")?;
        id_str.parse().ok()
    }
}
