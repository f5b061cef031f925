//! Partition
//!
//! One isolated keyspace of the engine: a memtable in front of a set of
//! SSTables, all stored in the partition's own directory.
//!
//! ## Responsibilities
//! - Point get/put/delete with newest-wins semantics
//! - Flush the memtable to an SSTable when it is full
//! - Compact a tier of similar tables once too many pile up
//! - Ordered scans that merge memtable and SSTables

use std::path::{Path, PathBuf};

use parking_lot::Mutex;

use crate::config::SpillConfig;
use crate::error::{StorageError, StorageResult};
use crate::memtable::{MemTable, MemTableEntry};
use crate::storage::{MergeIterator, MergeSource, StorageManager};

/// An isolated, independently iterable keyspace
///
/// ## Concurrency Model: Single-Writer / Multiple-Reader (SWMR)
///
/// - **Writes** (put/delete/flush/compaction): serialized by `write_lock`
/// - **Reads** (get): memtable and SSTable list both use internal RwLocks,
///   so lookups run concurrently with each other
/// - **Scans**: created under `write_lock` so the memtable snapshot and the
///   SSTable list describe the same point in time
pub struct Partition {
    name: String,

    /// Directory holding this partition's SSTables
    dir: PathBuf,

    /// In-memory table for recent writes (internal RwLock)
    memtable: MemTable,

    /// Persistent SSTables (internal RwLock on the reader list)
    storage: StorageManager,

    /// Serializes write operations
    write_lock: Mutex<()>,

    /// Memtable size that triggers a flush
    write_buffer_bytes: usize,

    /// SSTable count that triggers a tier compaction
    max_sstables: usize,
}

impl Partition {
    /// Open or create a partition rooted at `dir`
    ///
    /// Existing SSTables in `dir` are loaded.
    pub(crate) fn open(name: &str, dir: &Path, config: &SpillConfig) -> StorageResult<Self> {
        let storage = StorageManager::open(dir, config.index_interval)?;

        Ok(Self {
            name: name.to_string(),
            dir: dir.to_path_buf(),
            memtable: MemTable::new(),
            storage,
            write_lock: Mutex::new(()),
            write_buffer_bytes: config.write_buffer_bytes.max(1),
            max_sstables: config.max_sstables.max(1),
        })
    }

    /// Get a value by key
    ///
    /// Search order:
    /// 1. MemTable (most recent writes)
    /// 2. SSTables (newest to oldest)
    pub(crate) fn get(&self, key: &[u8]) -> StorageResult<Option<Vec<u8>>> {
        if let Some(entry) = self.memtable.get(key) {
            return match entry {
                MemTableEntry::Value(value) => Ok(Some(value)),
                MemTableEntry::Tombstone => Ok(None),
            };
        }

        self.storage.get(key)
    }

    /// Put a key-value pair
    pub(crate) fn put(&self, key: Vec<u8>, value: Vec<u8>) -> StorageResult<()> {
        let _write_guard = self.write_lock.lock();

        self.memtable.put(key, value);
        if self.memtable.should_flush(self.write_buffer_bytes) {
            self.flush_internal()?;
        }
        Ok(())
    }

    /// Put many key-value pairs under one write lock
    ///
    /// The memtable may be flushed several times while the batch is applied.
    pub(crate) fn put_batch<I>(&self, entries: I) -> StorageResult<usize>
    where
        I: IntoIterator<Item = (Vec<u8>, Vec<u8>)>,
    {
        let _write_guard = self.write_lock.lock();

        let mut written = 0;
        for (key, value) in entries {
            self.memtable.put(key, value);
            written += 1;
            if self.memtable.should_flush(self.write_buffer_bytes) {
                self.flush_internal()?;
            }
        }
        Ok(written)
    }

    /// Delete a key by writing a tombstone
    pub(crate) fn delete(&self, key: Vec<u8>) -> StorageResult<()> {
        let _write_guard = self.write_lock.lock();

        self.memtable.delete(key);
        if self.memtable.should_flush(self.write_buffer_bytes) {
            self.flush_internal()?;
        }
        Ok(())
    }

    /// Flush memtable to disk regardless of its size
    pub(crate) fn flush(&self) -> StorageResult<()> {
        let _write_guard = self.write_lock.lock();
        self.flush_internal()
    }

    /// Internal flush implementation (called with write lock held)
    fn flush_internal(&self) -> StorageResult<()> {
        if self.memtable.is_empty() {
            return Ok(());
        }

        tracing::trace!(
            "Flushing partition {} ({} entries, {} bytes)",
            self.name,
            self.memtable.entry_count(),
            self.memtable.size()
        );
        self.storage.flush(&self.memtable)?;
        self.memtable.clear();

        if self.storage.sstable_count() > self.max_sstables {
            self.storage.compact()?;
        }
        Ok(())
    }

    /// Ordered merge over memtable and SSTables, tombstones hidden
    pub(crate) fn scan(&self) -> StorageResult<MergeIterator> {
        let _write_guard = self.write_lock.lock();

        let memtable: MergeSource = Box::new(self.memtable.iter().map(|(key, entry)| {
            let value = match entry {
                MemTableEntry::Value(value) => Some(value),
                MemTableEntry::Tombstone => None,
            };
            Ok::<_, StorageError>((key, value))
        }));

        let mut sources = vec![memtable];
        sources.extend(self.storage.sources()?);
        MergeIterator::new(sources, false)
    }

    // =========================================================================
    // Accessors (for testing and debugging)
    // =========================================================================

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Get the directory holding this partition's SSTables
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Get the current memtable size
    pub fn memtable_size(&self) -> usize {
        self.memtable.size()
    }

    /// Get the number of SSTables
    pub fn sstable_count(&self) -> usize {
        self.storage.sstable_count()
    }

    /// Bytes of SSTables rewritten by compaction
    pub fn bytes_compacted(&self) -> u64 {
        self.storage.bytes_compacted()
    }
}
