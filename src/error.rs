//! Error types for spillkv
//!
//! Two layers:
//! - [`StorageError`]: raised inside the embedded engine (memtable, SSTables,
//!   partition directories).
//! - [`SpillError`]: the domain error seen by callers of the engine handle,
//!   maps, sets and factory. Storage errors never cross the engine handle
//!   without being translated into [`SpillError::EngineOpen`].

use thiserror::Error;

/// Result type alias using SpillError
pub type Result<T> = std::result::Result<T, SpillError>;

/// Result type alias for the storage layer
pub type StorageResult<T> = std::result::Result<T, StorageError>;

/// Domain error for spillkv operations
#[derive(Debug, Error)]
pub enum SpillError {
    // -------------------------------------------------------------------------
    // Caller Errors
    // -------------------------------------------------------------------------
    /// Empty key/value, unknown partition, or use after close. Not retried.
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    // -------------------------------------------------------------------------
    // Engine Errors
    // -------------------------------------------------------------------------
    /// The persistent engine could not be opened, or a partition or point
    /// operation against it failed.
    #[error("Engine error: {context}")]
    EngineOpen {
        context: String,
        #[source]
        source: StorageError,
    },

    // -------------------------------------------------------------------------
    // Serialization Errors
    // -------------------------------------------------------------------------
    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl SpillError {
    /// Wrap a storage failure with the operation that caused it
    pub(crate) fn engine(context: impl Into<String>, source: StorageError) -> Self {
        SpillError::EngineOpen {
            context: context.into(),
            source,
        }
    }

    /// True for failures of the underlying engine
    pub fn is_engine_error(&self) -> bool {
        matches!(self, SpillError::EngineOpen { .. })
    }
}

/// Error type for the embedded storage layer
#[derive(Debug, Error)]
pub enum StorageError {
    // -------------------------------------------------------------------------
    // I/O Errors
    // -------------------------------------------------------------------------
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    // -------------------------------------------------------------------------
    // SSTable Errors
    // -------------------------------------------------------------------------
    #[error("SSTable corruption detected: {0}")]
    Corruption(String),

    #[error("Key not found")]
    KeyNotFound,
}
