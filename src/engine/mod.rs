//! Engine Module
//!
//! The persistent side of a spillable map: one embedded, ordered key-value
//! engine per [`EngineHandle`], split into isolated partitions.
//!
//! ```text
//!   EngineHandle (root dir, partition registry, byte counter)
//!        │
//!        ├── Partition "dedup-0" ── MemTable ── SSTables
//!        ├── Partition "dedup-1" ── MemTable ── SSTables
//!        └── ...
//! ```
//!
//! Storage-layer failures are translated into [`crate::SpillError`] here and
//! never reach callers in raw form.

mod handle;
mod partition;

pub use handle::{validate_partition_name, EngineHandle, PartitionRef, PartitionScan};
pub use partition::Partition;
