//! Configuration for spillkv
//!
//! Centralized configuration with sensible defaults.

use std::path::PathBuf;

/// Environment variable overriding [`SpillConfig::base_dir`]
pub const BASE_DIR_ENV: &str = "SPILLKV_BASE_DIR";

/// Configuration shared by engine handles, maps and factories
#[derive(Debug, Clone)]
pub struct SpillConfig {
    // -------------------------------------------------------------------------
    // Engine Configuration
    // -------------------------------------------------------------------------
    /// Parent directory for disposable engine directories.
    /// `None` uses the system temp directory. Layout:
    ///   {base_dir}/spillkv-{uuid}/
    ///     └── partitions/{name}/sstable_000001.sst ...
    pub base_dir: Option<PathBuf>,

    /// Size of a partition's memtable before it is flushed to an SSTable
    pub write_buffer_bytes: usize,

    /// Number of SSTables in one partition that triggers a tier compaction
    pub max_sstables: usize,

    /// Every Nth key of an SSTable is kept in its in-memory index
    pub index_interval: usize,

    // -------------------------------------------------------------------------
    // Map Configuration
    // -------------------------------------------------------------------------
    /// Spill budget for maps and sets. `None` means memory-only.
    pub max_in_memory_bytes: Option<u64>,

    /// Partition identifier for maps and sets. `None` means memory-only.
    pub map_identifier: Option<String>,
}

impl Default for SpillConfig {
    fn default() -> Self {
        Self {
            base_dir: None,
            write_buffer_bytes: 4 * 1024 * 1024, // 4 MB
            max_sstables: 8,
            index_interval: 16,
            max_in_memory_bytes: None,
            map_identifier: None,
        }
    }
}

impl SpillConfig {
    /// Create a new config builder
    pub fn builder() -> ConfigBuilder {
        ConfigBuilder::default()
    }

    /// Default config with `base_dir` taken from `SPILLKV_BASE_DIR` when set
    pub fn from_env() -> Self {
        let mut config = Self::default();
        if let Some(dir) = std::env::var_os(BASE_DIR_ENV) {
            if !dir.is_empty() {
                config.base_dir = Some(PathBuf::from(dir));
            }
        }
        config
    }

    /// True when maps built from this config are allowed to spill
    pub fn is_spillable(&self) -> bool {
        self.max_in_memory_bytes.is_some() && self.map_identifier.is_some()
    }
}

/// Builder for SpillConfig
#[derive(Default)]
pub struct ConfigBuilder {
    config: SpillConfig,
}

impl ConfigBuilder {
    /// Set the parent directory for disposable engine directories
    pub fn base_dir(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.base_dir = Some(path.into());
        self
    }

    /// Set the per-partition memtable size limit (in bytes)
    pub fn write_buffer_bytes(mut self, size: usize) -> Self {
        self.config.write_buffer_bytes = size;
        self
    }

    /// Set the SSTable count that triggers compaction
    pub fn max_sstables(mut self, count: usize) -> Self {
        self.config.max_sstables = count;
        self
    }

    /// Set the sparse index sampling interval
    pub fn index_interval(mut self, interval: usize) -> Self {
        self.config.index_interval = interval;
        self
    }

    /// Set the spill budget (in bytes) for maps and sets
    pub fn max_in_memory_bytes(mut self, bytes: u64) -> Self {
        self.config.max_in_memory_bytes = Some(bytes);
        self
    }

    /// Set the partition identifier for maps and sets
    pub fn map_identifier(mut self, id: impl Into<String>) -> Self {
        self.config.map_identifier = Some(id.into());
        self
    }

    pub fn build(self) -> SpillConfig {
        let mut config = self.config;
        // Zero would disable flushing or sampling entirely
        config.write_buffer_bytes = config.write_buffer_bytes.max(1);
        config.max_sstables = config.max_sstables.max(1);
        config.index_interval = config.index_interval.max(1);
        config
    }
}
