//! Engine Handle
//!
//! Owns one embedded engine instance rooted at a private directory and
//! multiplexes it into named partitions.
//!
//! ## Directory Layout
//! ```text
//! {root}/
//!   └── partitions/
//!         ├── {name}/sstable_000001.sst
//!         └── ...
//! ```
//!
//! ## Ownership
//! A handle is owned by one unit of work and passed explicitly (usually as
//! `Arc<EngineHandle>`) to the maps that spill into it. Dropping the handle
//! closes it, so release happens on every exit path.

use std::collections::HashMap;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::RwLock;
use uuid::Uuid;

use crate::config::SpillConfig;
use crate::error::{Result, SpillError, StorageError, StorageResult};
use crate::storage::{MergeIterator, MAX_ENTRY_BYTES};

use super::partition::Partition;

/// Shared reference to an open partition
pub type PartitionRef = Arc<Partition>;

/// Handle to one embedded engine instance
///
/// All methods take `&self`: the partition registry sits behind a RwLock so
/// maps on different threads can create and use their own partitions
/// concurrently. Each partition still expects a single logical owner.
pub struct EngineHandle {
    /// Directory exclusively owned by this handle
    root: PathBuf,

    /// Root was generated by `open_temp` and is removed once idle
    disposable: bool,

    config: SpillConfig,

    /// Registry of open partitions: name → keyspace
    partitions: RwLock<HashMap<String, PartitionRef>>,

    closed: AtomicBool,

    /// Value payload bytes passed to `put` (diagnostics only)
    total_bytes_written: AtomicU64,
}

impl EngineHandle {
    // =========================================================================
    // Internal Path Constants
    // =========================================================================
    const PARTITIONS_DIR: &'static str = "partitions";
    const TEMP_PREFIX: &'static str = "spillkv-";

    /// Open an engine rooted at `root` with the default config
    ///
    /// Any existing content at `root` is deleted first.
    pub fn open(root: impl AsRef<Path>) -> Result<Self> {
        Self::open_with_config(root, SpillConfig::default())
    }

    /// Open an engine rooted at `root`
    ///
    /// On startup:
    /// 1. Delete stale content at `root`
    /// 2. Create the partitions directory
    /// 3. Load any partitions found there
    pub fn open_with_config(root: impl AsRef<Path>, config: SpillConfig) -> Result<Self> {
        Self::open_internal(root.as_ref().to_path_buf(), config, false)
    }

    /// Open a disposable engine in a fresh directory under `config.base_dir`
    /// (or the system temp directory)
    ///
    /// The directory is deleted when the last partition is dropped and again
    /// on close; creating a new partition later re-creates it.
    pub fn open_temp(config: &SpillConfig) -> Result<Self> {
        let base = config.base_dir.clone().unwrap_or_else(std::env::temp_dir);
        let root = base.join(format!("{}{}", Self::TEMP_PREFIX, Uuid::new_v4()));
        Self::open_internal(root, config.clone(), true)
    }

    fn open_internal(root: PathBuf, config: SpillConfig, disposable: bool) -> Result<Self> {
        tracing::info!("Deleting and re-creating spill engine at {}", root.display());

        let partitions = match Self::prepare_root(&root, &config) {
            Ok(partitions) => partitions,
            Err(e) => {
                tracing::error!("Failed to open spill engine at {}: {}", root.display(), e);
                if let Err(cleanup) = Self::remove_dir(&root) {
                    tracing::warn!(
                        "Failed to clean up engine directory {}: {}",
                        root.display(),
                        cleanup
                    );
                }
                return Err(SpillError::engine(
                    format!("failed to open engine at {}", root.display()),
                    e,
                ));
            }
        };

        Ok(Self {
            root,
            disposable,
            config,
            partitions: RwLock::new(partitions),
            closed: AtomicBool::new(false),
            total_bytes_written: AtomicU64::new(0),
        })
    }

    fn prepare_root(
        root: &Path,
        config: &SpillConfig,
    ) -> StorageResult<HashMap<String, PartitionRef>> {
        // Step 1: Clear anything a previous owner left behind
        Self::remove_dir(root)?;

        // Step 2: Create directory structure
        let partitions_dir = root.join(Self::PARTITIONS_DIR);
        fs::create_dir_all(&partitions_dir)?;

        // Step 3: Discover existing partitions
        let mut partitions = HashMap::new();
        for entry in fs::read_dir(&partitions_dir)? {
            let path = entry?.path();
            if !path.is_dir() {
                continue;
            }
            let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
                continue;
            };
            let partition = Partition::open(name, &path, config)?;
            partitions.insert(name.to_string(), Arc::new(partition));
        }

        if partitions.is_empty() {
            tracing::debug!("No partitions found under {}", partitions_dir.display());
        } else {
            let mut names: Vec<&String> = partitions.keys().collect();
            names.sort();
            tracing::info!("Loaded partitions: {:?}", names);
        }
        Ok(partitions)
    }

    // =========================================================================
    // Partition Lifecycle
    // =========================================================================

    /// Get or create a partition
    ///
    /// Idempotent: an existing partition with this name is returned as is.
    pub fn create_partition(&self, name: &str) -> Result<PartitionRef> {
        self.ensure_open()?;
        validate_partition_name(name)?;

        if let Some(partition) = self.partitions.read().get(name) {
            return Ok(Arc::clone(partition));
        }

        let mut partitions = self.partitions.write();
        // Re-check under the write lock: another thread or close() may have won
        self.ensure_open()?;
        if let Some(partition) = partitions.get(name) {
            return Ok(Arc::clone(partition));
        }

        let dir = self.partition_dir(name);
        let partition = Self::remove_dir(&dir)
            .map_err(StorageError::from)
            .and_then(|()| Partition::open(name, &dir, &self.config))
            .map_err(|e| SpillError::engine(format!("failed to create partition {name}"), e))?;

        let partition = Arc::new(partition);
        partitions.insert(name.to_string(), Arc::clone(&partition));
        tracing::debug!("Created partition {} in {}", name, dir.display());
        Ok(partition)
    }

    /// Drop a partition and delete its files
    ///
    /// No-op if the partition does not exist or the handle is closed. On a
    /// disposable handle, dropping the last partition deletes the root.
    pub fn drop_partition(&self, name: &str) -> Result<()> {
        if self.is_closed() {
            return Ok(());
        }

        let mut partitions = self.partitions.write();
        let Some(partition) = partitions.remove(name) else {
            return Ok(());
        };
        let dir = partition.dir().to_path_buf();
        drop(partition);

        let result = Self::remove_dir(&dir);
        tracing::debug!("Dropped partition {}", name);

        if self.disposable && partitions.is_empty() {
            match Self::remove_dir(&self.root) {
                Ok(()) => tracing::debug!(
                    "Last partition dropped, removed engine directory {}",
                    self.root.display()
                ),
                Err(e) => tracing::warn!(
                    "Failed to remove idle engine directory {}: {}",
                    self.root.display(),
                    e
                ),
            }
        }

        result.map_err(|e| {
            SpillError::engine(format!("failed to drop partition {name}"), e.into())
        })
    }

    // =========================================================================
    // Point Operations
    // =========================================================================

    /// Write one entry
    pub fn put(&self, partition: &str, key: &[u8], value: &[u8]) -> Result<()> {
        Self::check_bytes(key, "key")?;
        Self::check_bytes(value, "value")?;
        let target = self.partition(partition)?;

        target
            .put(key.to_vec(), value.to_vec())
            .map_err(|e| SpillError::engine(format!("put into partition {partition} failed"), e))?;
        self.total_bytes_written
            .fetch_add(value.len() as u64, Ordering::Relaxed);
        Ok(())
    }

    /// Write many entries under one partition write lock
    ///
    /// Every entry is validated before anything is written. Returns the
    /// number of entries written.
    pub fn put_batch<I>(&self, partition: &str, entries: I) -> Result<usize>
    where
        I: IntoIterator<Item = (Vec<u8>, Vec<u8>)>,
    {
        let entries: Vec<(Vec<u8>, Vec<u8>)> = entries.into_iter().collect();
        let mut payload = 0u64;
        for (key, value) in &entries {
            Self::check_bytes(key, "key")?;
            Self::check_bytes(value, "value")?;
            payload += value.len() as u64;
        }
        let target = self.partition(partition)?;

        let written = target.put_batch(entries).map_err(|e| {
            SpillError::engine(format!("batch put into partition {partition} failed"), e)
        })?;
        self.total_bytes_written.fetch_add(payload, Ordering::Relaxed);
        Ok(written)
    }

    /// Read one entry
    pub fn get(&self, partition: &str, key: &[u8]) -> Result<Option<Vec<u8>>> {
        Self::check_bytes(key, "key")?;
        let target = self.partition(partition)?;

        target
            .get(key)
            .map_err(|e| SpillError::engine(format!("get from partition {partition} failed"), e))
    }

    /// Delete one entry; deleting a missing key is not an error
    pub fn delete(&self, partition: &str, key: &[u8]) -> Result<()> {
        Self::check_bytes(key, "key")?;
        let target = self.partition(partition)?;

        target.delete(key.to_vec()).map_err(|e| {
            SpillError::engine(format!("delete from partition {partition} failed"), e)
        })
    }

    /// Fresh cursor over a partition, in key-byte order
    pub fn scan(&self, partition: &str) -> Result<PartitionScan> {
        let target = self.partition(partition)?;

        let inner = target.scan().map_err(|e| {
            SpillError::engine(format!("scan of partition {partition} failed"), e)
        })?;
        Ok(PartitionScan {
            partition: partition.to_string(),
            inner,
        })
    }

    /// Force the partition's memtable to disk
    pub fn flush(&self, partition: &str) -> Result<()> {
        let target = self.partition(partition)?;

        target.flush().map_err(|e| {
            SpillError::engine(format!("flush of partition {partition} failed"), e)
        })
    }

    // =========================================================================
    // Shutdown
    // =========================================================================

    /// Release every partition and delete the root directory
    ///
    /// Idempotent. A failure to delete the directory is logged and the handle
    /// is still marked closed.
    pub fn close(&self) {
        if self.closed.swap(true, Ordering::SeqCst) {
            return;
        }

        let released = {
            let mut partitions = self.partitions.write();
            let count = partitions.len();
            partitions.clear();
            count
        };

        match Self::remove_dir(&self.root) {
            Ok(()) => tracing::info!(
                "Closed spill engine at {} ({} partitions released, {} bytes written)",
                self.root.display(),
                released,
                self.total_bytes_written()
            ),
            Err(e) => tracing::warn!(
                "Closed spill engine but failed to delete {}: {}",
                self.root.display(),
                e
            ),
        }
    }

    // =========================================================================
    // Accessors (for testing and debugging)
    // =========================================================================

    /// Get the root directory path
    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    pub fn is_disposable(&self) -> bool {
        self.disposable
    }

    /// Names of all open partitions, sorted
    pub fn partition_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.partitions.read().keys().cloned().collect();
        names.sort();
        names
    }

    pub fn has_partition(&self, name: &str) -> bool {
        self.partitions.read().contains_key(name)
    }

    /// Total value payload bytes passed to `put`/`put_batch`
    pub fn total_bytes_written(&self) -> u64 {
        self.total_bytes_written.load(Ordering::Relaxed)
    }

    /// Get the configuration
    pub fn config(&self) -> &SpillConfig {
        &self.config
    }

    // =========================================================================
    // Private Helpers
    // =========================================================================

    fn ensure_open(&self) -> Result<()> {
        if self.is_closed() {
            return Err(SpillError::InvalidArgument(format!(
                "engine handle at {} is closed",
                self.root.display()
            )));
        }
        Ok(())
    }

    fn partition(&self, name: &str) -> Result<PartitionRef> {
        self.ensure_open()?;
        self.partitions.read().get(name).cloned().ok_or_else(|| {
            SpillError::InvalidArgument(format!("partition {name} does not exist"))
        })
    }

    fn partition_dir(&self, name: &str) -> PathBuf {
        self.root.join(Self::PARTITIONS_DIR).join(name)
    }

    fn check_bytes(bytes: &[u8], what: &str) -> Result<()> {
        if bytes.is_empty() {
            return Err(SpillError::InvalidArgument(format!(
                "{what} bytes can not be empty"
            )));
        }
        if bytes.len() > MAX_ENTRY_BYTES {
            return Err(SpillError::InvalidArgument(format!(
                "{what} of {} bytes exceeds the {MAX_ENTRY_BYTES} byte limit",
                bytes.len()
            )));
        }
        Ok(())
    }

    /// `remove_dir_all` that treats a missing directory as success
    fn remove_dir(path: &Path) -> io::Result<()> {
        match fs::remove_dir_all(path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e),
        }
    }
}

impl Drop for EngineHandle {
    fn drop(&mut self) {
        self.close();
    }
}

impl std::fmt::Debug for EngineHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EngineHandle")
            .field("root", &self.root)
            .field("disposable", &self.disposable)
            .field("partitions", &self.partition_names())
            .field("closed", &self.is_closed())
            .finish()
    }
}

/// Check that a partition name is usable as a directory name
///
/// Allowed: ASCII letters, digits, `-`, `_` and `.`, not starting with `.`.
pub fn validate_partition_name(name: &str) -> Result<()> {
    let valid = !name.is_empty()
        && name.len() <= 255
        && !name.starts_with('.')
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'));

    if valid {
        Ok(())
    } else {
        Err(SpillError::InvalidArgument(format!(
            "invalid partition name {name:?}: use ASCII letters, digits, '-', '_' or '.'"
        )))
    }
}

/// Lazy ordered cursor over one partition
///
/// Yields `(key, value)` pairs in key-byte order and ends after the last
/// entry. Independent of later writes to the partition.
pub struct PartitionScan {
    partition: String,
    inner: MergeIterator,
}

impl Iterator for PartitionScan {
    type Item = Result<(Vec<u8>, Vec<u8>)>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            return match self.inner.next()? {
                Ok((key, Some(value))) => Some(Ok((key, value))),
                // Tombstones are already filtered by the merge
                Ok((_, None)) => continue,
                Err(e) => Some(Err(SpillError::engine(
                    format!("scan of partition {} failed", self.partition),
                    e,
                ))),
            };
        }
    }
}
