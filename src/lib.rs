//! GhostMesh - conversational agent with a persistent vector memory
//!
//! This is the main library crate that re-exports all GhostMesh components.

pub use ghostmesh_cli as cli;
pub use ghostmesh_core as core;
pub use ghostmesh_memory as memory;

// Re-export commonly used types
pub use ghostmesh_core::{Error, LogEntry, MemoryRecord, Ordinal, Result};

pub use ghostmesh_memory::{
    EmbeddingConfig, EmbeddingProvider, FlatIndex, MemoryStore, RetrievedMemory, StoreConfig,
    SyncOutcome,
};

pub use ghostmesh_cli::{GenerationProvider, Session};
