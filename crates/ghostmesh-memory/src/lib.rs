//! GhostMesh Persistent Vector Memory
//!
//! Keeps an append-only log of text memories synchronized with an exact
//! similarity index, and answers top-k nearest neighbor queries over it.
//!
//! # Components
//!
//! - **Memory Log**: JSONL file, the only durable source of truth
//! - **Vector Index**: flat inner-product index over normalized embeddings
//! - **Index Synchronizer**: reuses the persisted index when its id map
//!   matches the log length, rebuilds otherwise
//! - **Memory Store**: `retrieve` and `append` over the above
//!
//! # Example
//!
//! ```no_run
//! use ghostmesh_memory::{MemoryStore, MockEmbeddingProvider, StoreConfig};
//! use std::sync::Arc;
//!
//! # async fn demo() -> ghostmesh_core::Result<()> {
//! let provider = Arc::new(MockEmbeddingProvider::new(384));
//! let mut store = MemoryStore::open(StoreConfig::new("memory"), provider).await?;
//!
//! store.append("The tide came in twice today").await?;
//! let memories = store.retrieve("tide", 5).await?;
//! store.checkpoint().await?;
//! # Ok(())
//! # }
//! ```

pub mod embeddings;
pub mod id_map;
pub mod log;
pub mod store;
pub mod sync;
pub mod types;
pub mod vector_index;

pub use embeddings::{
    create_provider, EmbeddingConfig, EmbeddingError, EmbeddingProvider, EmbeddingProviderType,
    MockEmbeddingProvider,
};
pub use id_map::IdMap;
pub use log::MemoryLog;
pub use store::{MemoryStore, RetrievedMemory};
pub use sync::{IndexSynchronizer, RebuildReason, SyncOutcome};
pub use types::StoreConfig;
pub use vector_index::{FlatIndex, IndexError, SearchResult};

#[cfg(feature = "openai")]
pub use embeddings::OpenAIEmbeddingProvider;
