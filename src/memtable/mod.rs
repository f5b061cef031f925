//! MemTable Module
//!
//! Write buffer of one engine partition.
//!
//! ## Responsibilities
//! - Fast reads and writes in memory
//! - Track size for flush triggers
//! - Tombstones so deletes shadow older SSTable entries
//! - Ordered iteration for SSTable creation and scans
//!
//! ## Data Structure Choice
//! BTreeMap behind a parking_lot RwLock:
//! - Ordered keys (required for SSTable generation)
//! - Partitions are shared through the engine handle, so reads stay `&self`

mod table;

pub use table::{MemTable, MemTableIterator};

/// Entry stored in the MemTable
#[derive(Debug, Clone, PartialEq)]
pub enum MemTableEntry {
    /// A live value
    Value(Vec<u8>),

    /// A tombstone (deleted key)
    Tombstone,
}

impl MemTableEntry {
    /// Bytes this entry contributes on top of its key
    pub(crate) fn payload_len(&self) -> usize {
        match self {
            MemTableEntry::Value(v) => v.len(),
            MemTableEntry::Tombstone => 0,
        }
    }
}
