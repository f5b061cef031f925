//! # spillkv
//!
//! Out-of-core maps and sets for deduplication over more keys than fit in
//! memory:
//! - Hybrid maps that spill to disk once a memory budget is exceeded
//! - Struct-keyed sets for row deduplication
//! - An embedded, partitioned LSM engine with explicit handle ownership
//! - Order-preserving struct key serialization
//!
//! ## Architecture Overview
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                  StructLikeFactory                           │
//! │          (memory-only vs spill-capable choice)               │
//! └─────────────────────┬───────────────────────────────────────┘
//!                       │
//! ┌─────────────────────▼───────────────────────────────────────┐
//! │            SpillableMap / SpillableSet                       │
//! │           (Serializer<K>, Serializer<V>)                     │
//! └─────────────────────┬───────────────────────────────────────┘
//!                       │
//!          ┌────────────┴────────────┐
//!          │                         │
//!          ▼                         ▼
//!   ┌─────────────┐          ┌─────────────┐
//!   │   Memory    │  spill   │ EngineHandle│
//!   │   Stage     │ ───────► │ (partition) │
//!   └─────────────┘          └──────┬──────┘
//!                                   │
//!                            ┌──────┴──────┐
//!                            ▼             ▼
//!                     ┌──────────┐  ┌──────────┐
//!                     │ MemTable │  │ SSTables │
//!                     └──────────┘  └──────────┘
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod error;
pub mod config;

pub mod memtable;
pub mod storage;
pub mod engine;

pub mod serializer;
pub mod struct_key;
pub mod map;
pub mod set;
pub mod factory;

// =============================================================================
// Public API Re-exports
// =============================================================================

pub use error::{Result, SpillError, StorageError};
pub use config::SpillConfig;
pub use engine::{EngineHandle, PartitionRef};
pub use serializer::{BincodeSerializer, RawBytesSerializer, Serializer};
pub use struct_key::{Datum, FieldType, StructField, StructLikeSerializer, StructType, StructValue};
pub use map::{SpillableMap, StructLikeMap};
pub use set::{SpillableSet, StructLikeSet};
pub use factory::StructLikeFactory;

// =============================================================================
// Version Info
// =============================================================================

/// Current version of spillkv
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
