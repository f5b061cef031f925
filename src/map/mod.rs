//! Spillable Map Module
//!
//! Typed maps with two stages: a memory stage with a byte budget and a spill
//! stage backed by one engine partition.
//!
//! ## Lifecycle
//!
//! ```text
//!   put ──► memory stage ──(tally > budget)──► spill event ──► partition
//!                ▲                                   │
//!                └──────── memory cleared ◄──────────┘
//! ```

mod memory;
mod spillable;

pub use spillable::{MapIter, SpillableMap};

use crate::struct_key::StructValue;

/// Map keyed by struct-like records
pub type StructLikeMap<V> = SpillableMap<StructValue, V>;
