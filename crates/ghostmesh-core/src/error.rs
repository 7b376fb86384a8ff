//! Error types for GhostMesh
//!
//! Failures touching the memory log are surfaced to the caller. Staleness or
//! corruption of derived state (the persisted index and its id map) is
//! recoverable by a rebuild.

use thiserror::Error;

/// The main error type for GhostMesh operations
#[derive(Error, Debug)]
pub enum Error {
    // ========== Log Errors ==========
    #[error("Memory log unavailable: {0}")]
    StorageUnavailable(String),

    #[error("Invalid memory record: {0}")]
    InvalidRecord(String),

    // ========== Index Errors ==========
    #[error("Persisted index is stale: id map covers {found} records, log holds {expected}")]
    IndexStale { expected: usize, found: usize },

    #[error("Persisted index is corrupt: {0}")]
    IndexCorrupt(String),

    #[error("Index position {position} out of range for {len} memories")]
    QueryOutOfRange { position: usize, len: usize },

    // ========== Embedding Errors ==========
    #[error("Embedding failed: {0}")]
    EmbeddingFailure(String),

    // ========== Serialization Errors ==========
    #[error("Serialization error: {0}")]
    Serialization(String),

    // ========== IO Errors ==========
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    // ========== Configuration Errors ==========
    #[error("Configuration error: {0}")]
    Configuration(String),

    // ========== Internal Errors ==========
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Result type alias for GhostMesh operations
pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    /// Returns true if this error is healed by rebuilding the index
    pub fn is_recoverable(&self) -> bool {
        matches!(self, Error::IndexStale { .. } | Error::IndexCorrupt(_))
    }

    /// Returns true if this error indicates a corrupt persisted index or id map
    pub fn is_corruption(&self) -> bool {
        matches!(self, Error::IndexCorrupt(_))
    }

    /// Returns true if this error originated in the memory log
    pub fn is_storage(&self) -> bool {
        matches!(self, Error::StorageUnavailable(_) | Error::Io(_))
    }
}
