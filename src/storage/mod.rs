//! Storage Module
//!
//! Persistent storage layer of one engine partition, using SSTables.
//!
//! ## Responsibilities
//! - Persist flushed memtables to disk in sorted format
//! - Point lookups through sparse in-memory indexes
//! - Ordered merge scans across all tables
//! - Size-tiered compaction once a partition accumulates too many tables

mod manager;
mod merge;
mod sstable;

pub use manager::StorageManager;
pub use merge::{MergeEntry, MergeIterator, MergeSource};
pub use sstable::{SSTable, SSTableBuilder, SSTableIterator, SSTableReader, MAX_ENTRY_BYTES};
