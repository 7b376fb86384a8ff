//! Startup reconciliation of the memory log and the vector index
//!
//! Embedding every memory is the expensive operation, so a persisted index
//! is reused whenever its id map covers exactly as many records as the log
//! holds. Anything else (no persisted state, a length mismatch in either
//! direction, or a file that fails to load) falls back to a full rebuild.
//! Problems with the persisted state are never surfaced to the caller; a
//! failure to embed during the rebuild is.

use crate::embeddings::{EmbeddingError, EmbeddingProvider};
use crate::id_map::IdMap;
use crate::types::StoreConfig;
use crate::vector_index::FlatIndex;
use ghostmesh_core::{Error, Result};
use std::fmt;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// Why a persisted index was not reused
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RebuildReason {
    /// No persisted index or id map
    Missing,
    /// The id map length differs from the log length
    Stale { expected: usize, found: usize },
    /// The index or id map could not be read or decoded
    Corrupt(String),
}

impl RebuildReason {
    fn from_error(err: &Error) -> Self {
        match err {
            Error::IndexStale { expected, found } => RebuildReason::Stale {
                expected: *expected,
                found: *found,
            },
            Error::Io(e) if e.kind() == ErrorKind::NotFound => RebuildReason::Missing,
            other => RebuildReason::Corrupt(other.to_string()),
        }
    }
}

impl fmt::Display for RebuildReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RebuildReason::Missing => write!(f, "no persisted index"),
            RebuildReason::Stale { expected, found } => {
                write!(f, "id map covers {} records, log holds {}", found, expected)
            }
            RebuildReason::Corrupt(msg) => write!(f, "unreadable persisted state: {}", msg),
        }
    }
}

/// How the live index was obtained
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyncOutcome {
    Reused,
    Rebuilt(RebuildReason),
}

impl SyncOutcome {
    pub fn is_reused(&self) -> bool {
        matches!(self, SyncOutcome::Reused)
    }
}

/// A live index aligned with the log
#[derive(Debug)]
pub struct Synchronized {
    pub index: FlatIndex,
    pub id_map: IdMap,
    pub outcome: SyncOutcome,
}

/// Reconciles the log with the persisted index
pub struct IndexSynchronizer<'a> {
    index_path: PathBuf,
    id_map_path: PathBuf,
    provider: &'a dyn EmbeddingProvider,
}

impl<'a> IndexSynchronizer<'a> {
    pub fn new(config: &StoreConfig, provider: &'a dyn EmbeddingProvider) -> Self {
        Self {
            index_path: config.index_path(),
            id_map_path: config.id_map_path(),
            provider,
        }
    }

    pub fn index_path(&self) -> &Path {
        &self.index_path
    }

    pub fn id_map_path(&self) -> &Path {
        &self.id_map_path
    }

    /// Produce an index whose position `i` holds the embedding of `texts[i]`
    pub async fn synchronize(&self, texts: &[String]) -> Result<Synchronized> {
        match self.try_reuse(texts.len()) {
            Ok((index, id_map)) => {
                info!(
                    "Reusing persisted index with {} vectors from {}",
                    index.len(),
                    self.index_path.display()
                );
                Ok(Synchronized {
                    index,
                    id_map,
                    outcome: SyncOutcome::Reused,
                })
            }
            Err(err) => {
                let reason = RebuildReason::from_error(&err);
                info!("Rebuilding index: {}", reason);
                self.rebuild(texts, reason).await
            }
        }
    }

    /// Load the persisted index if its id map matches the log length
    fn try_reuse(&self, log_len: usize) -> Result<(FlatIndex, IdMap)> {
        let id_map = IdMap::load(&self.id_map_path)?;
        if !id_map.is_fresh_for(log_len) {
            return Err(Error::IndexStale {
                expected: log_len,
                found: id_map.len(),
            });
        }

        let index = FlatIndex::load(&self.index_path)?;

        // A blob that disagrees with its own id map would misalign every
        // search result, so it is treated as corrupt rather than trusted.
        if index.len() != log_len {
            return Err(Error::IndexCorrupt(format!(
                "index holds {} vectors but id map covers {}",
                index.len(),
                log_len
            )));
        }

        // Vectors from a different model cannot be searched with this provider
        if !index.is_empty() && index.dimension() != self.provider.dimensions() {
            return Err(Error::IndexCorrupt(format!(
                "index dimension {} does not match provider dimension {}",
                index.dimension(),
                self.provider.dimensions()
            )));
        }

        Ok((index, id_map))
    }

    /// Embed every text in one batch and build a fresh index
    pub async fn rebuild(&self, texts: &[String], reason: RebuildReason) -> Result<Synchronized> {
        info!("Building index for {} memories", texts.len());

        let vectors = if texts.is_empty() {
            Vec::new()
        } else {
            self.provider.embed_batch(texts).await?
        };

        if vectors.len() != texts.len() {
            return Err(EmbeddingError::CountMismatch {
                expected: texts.len(),
                got: vectors.len(),
            }
            .into());
        }

        let index = FlatIndex::build(&vectors).map_err(|e| {
            Error::EmbeddingFailure(format!("provider returned unusable vectors: {}", e))
        })?;
        if !index.is_empty() && index.dimension() != self.provider.dimensions() {
            warn!(
                "{} returned {} dimensions but reports {}, next start will rebuild",
                self.provider.model_name(),
                index.dimension(),
                self.provider.dimensions()
            );
        }
        let id_map = IdMap::sequential(texts.len());

        // The in-memory index is already valid; a failed write only means
        // the next startup rebuilds again.
        if let Err(e) = self.persist(&index, &id_map) {
            warn!("Failed to persist rebuilt index: {}", e);
        }

        Ok(Synchronized {
            index,
            id_map,
            outcome: SyncOutcome::Rebuilt(reason),
        })
    }

    /// Write the index, then the id map that vouches for it
    pub fn persist(&self, index: &FlatIndex, id_map: &IdMap) -> Result<()> {
        index.save(&self.index_path)?;
        id_map.save(&self.id_map_path)?;
        debug!(
            "Persisted index with {} vectors to {}",
            index.len(),
            self.index_path.display()
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embeddings::MockEmbeddingProvider;
    use std::fs;
    use tempfile::TempDir;

    fn texts(items: &[&str]) -> Vec<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    #[tokio::test]
    async fn test_missing_state_rebuilds_and_persists() {
        let dir = TempDir::new().unwrap();
        let config = StoreConfig::for_testing(dir.path());
        let provider = MockEmbeddingProvider::new(8);
        let sync = IndexSynchronizer::new(&config, &provider);

        let result = sync.synchronize(&texts(&["a", "b", "c"])).await.unwrap();

        assert_eq!(result.outcome, SyncOutcome::Rebuilt(RebuildReason::Missing));
        assert_eq!(result.index.len(), 3);
        assert_eq!(result.id_map, IdMap::sequential(3));
        assert!(config.index_path().exists());
        assert_eq!(IdMap::load(&config.id_map_path()).unwrap().len(), 3);
    }

    #[tokio::test]
    async fn test_fresh_state_is_reused() {
        let dir = TempDir::new().unwrap();
        let config = StoreConfig::for_testing(dir.path());
        let provider = MockEmbeddingProvider::new(8);
        let sync = IndexSynchronizer::new(&config, &provider);
        let items = texts(&["a", "b"]);

        let first = sync.synchronize(&items).await.unwrap();
        let second = sync.synchronize(&items).await.unwrap();

        assert!(second.outcome.is_reused());
        assert_eq!(second.index, first.index);
    }

    #[tokio::test]
    async fn test_length_mismatch_rebuilds() {
        let dir = TempDir::new().unwrap();
        let config = StoreConfig::for_testing(dir.path());
        let provider = MockEmbeddingProvider::new(8);
        let sync = IndexSynchronizer::new(&config, &provider);

        sync.synchronize(&texts(&["a", "b"])).await.unwrap();

        let grown = sync.synchronize(&texts(&["a", "b", "c"])).await.unwrap();
        assert_eq!(
            grown.outcome,
            SyncOutcome::Rebuilt(RebuildReason::Stale {
                expected: 3,
                found: 2
            })
        );
        assert_eq!(grown.index.len(), 3);

        let shrunk = sync.synchronize(&texts(&["a"])).await.unwrap();
        assert_eq!(
            shrunk.outcome,
            SyncOutcome::Rebuilt(RebuildReason::Stale {
                expected: 1,
                found: 3
            })
        );
        assert_eq!(shrunk.index.len(), 1);
    }

    #[tokio::test]
    async fn test_corrupt_index_rebuilds() {
        let dir = TempDir::new().unwrap();
        let config = StoreConfig::for_testing(dir.path());
        let provider = MockEmbeddingProvider::new(8);
        let sync = IndexSynchronizer::new(&config, &provider);
        let items = texts(&["a", "b"]);

        let first = sync.synchronize(&items).await.unwrap();
        fs::write(config.index_path(), b"garbage").unwrap();

        let second = sync.synchronize(&items).await.unwrap();
        assert!(matches!(
            second.outcome,
            SyncOutcome::Rebuilt(RebuildReason::Corrupt(_))
        ));
        assert_eq!(second.index, first.index);

        // The rebuild repaired the persisted state
        assert!(sync.synchronize(&items).await.unwrap().outcome.is_reused());
    }

    #[tokio::test]
    async fn test_corrupt_id_map_rebuilds() {
        let dir = TempDir::new().unwrap();
        let config = StoreConfig::for_testing(dir.path());
        let provider = MockEmbeddingProvider::new(8);
        let sync = IndexSynchronizer::new(&config, &provider);
        let items = texts(&["a"]);

        sync.synchronize(&items).await.unwrap();
        fs::write(config.id_map_path(), "{not a list}").unwrap();

        let result = sync.synchronize(&items).await.unwrap();
        assert!(matches!(
            result.outcome,
            SyncOutcome::Rebuilt(RebuildReason::Corrupt(_))
        ));
    }

    #[tokio::test]
    async fn test_index_disagreeing_with_id_map_rebuilds() {
        let dir = TempDir::new().unwrap();
        let config = StoreConfig::for_testing(dir.path());
        let provider = MockEmbeddingProvider::new(8);
        let sync = IndexSynchronizer::new(&config, &provider);
        let items = texts(&["a", "b"]);

        sync.synchronize(&items).await.unwrap();
        FlatIndex::sentinel().save(&config.index_path()).unwrap();

        let result = sync.synchronize(&items).await.unwrap();
        assert!(matches!(
            result.outcome,
            SyncOutcome::Rebuilt(RebuildReason::Corrupt(_))
        ));
        assert_eq!(result.index.len(), 2);
    }

    #[tokio::test]
    async fn test_provider_dimension_change_rebuilds() {
        let dir = TempDir::new().unwrap();
        let config = StoreConfig::for_testing(dir.path());
        let items = texts(&["a", "b"]);

        let small = MockEmbeddingProvider::new(8);
        IndexSynchronizer::new(&config, &small)
            .synchronize(&items)
            .await
            .unwrap();

        let large = MockEmbeddingProvider::new(16);
        let sync = IndexSynchronizer::new(&config, &large);
        let result = sync.synchronize(&items).await.unwrap();

        match &result.outcome {
            SyncOutcome::Rebuilt(RebuildReason::Corrupt(msg)) => {
                assert!(msg.contains("dimension"))
            }
            other => panic!("expected a rebuild, got {:?}", other),
        }
        assert_eq!(result.index.dimension(), 16);
        assert_eq!(result.index.len(), 2);

        // The rebuilt index matches the new provider and is reused from now on
        assert!(sync.synchronize(&items).await.unwrap().outcome.is_reused());
    }

    #[tokio::test]
    async fn test_empty_sentinel_reused_by_any_provider() {
        let dir = TempDir::new().unwrap();
        let config = StoreConfig::for_testing(dir.path());

        let small = MockEmbeddingProvider::new(8);
        IndexSynchronizer::new(&config, &small)
            .synchronize(&[])
            .await
            .unwrap();

        let large = MockEmbeddingProvider::new(16);
        let result = IndexSynchronizer::new(&config, &large)
            .synchronize(&[])
            .await
            .unwrap();
        assert!(result.outcome.is_reused());
    }

    #[tokio::test]
    async fn test_empty_log_persists_sentinel() {
        let dir = TempDir::new().unwrap();
        let config = StoreConfig::for_testing(dir.path());
        let provider = MockEmbeddingProvider::new(8);
        let sync = IndexSynchronizer::new(&config, &provider);

        let result = sync.synchronize(&[]).await.unwrap();
        assert!(result.index.is_empty());
        assert_eq!(result.index.dimension(), 1);

        let persisted = FlatIndex::load(&config.index_path()).unwrap();
        assert!(persisted.is_empty());
        assert!(IdMap::load(&config.id_map_path()).unwrap().is_empty());

        assert!(sync.synchronize(&[]).await.unwrap().outcome.is_reused());
    }

    #[tokio::test]
    async fn test_embedding_failure_is_fatal() {
        let dir = TempDir::new().unwrap();
        let config = StoreConfig::for_testing(dir.path());
        let provider = MockEmbeddingProvider::new(8);
        let sync = IndexSynchronizer::new(&config, &provider);

        // The mock provider refuses empty texts
        let result = sync.synchronize(&texts(&["a", ""])).await;
        assert!(matches!(result, Err(Error::EmbeddingFailure(_))));
        assert!(!config.index_path().exists());
    }

    #[test]
    fn test_rebuild_reason_display() {
        let reason = RebuildReason::Stale {
            expected: 5,
            found: 4,
        };
        assert_eq!(reason.to_string(), "id map covers 4 records, log holds 5");
    }
}
