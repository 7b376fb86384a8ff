//! Memory store facade
//!
//! Owns the memory log and the live vector index for the lifetime of the
//! process and keeps them aligned: index position `i` is always the
//! embedding of log ordinal `i`.
//!
//! Appends are written to the log before the index is touched. If the
//! process dies in between, the next [`MemoryStore::open`] sees a log longer
//! than the persisted id map and rebuilds.

use crate::embeddings::{EmbeddingError, EmbeddingProvider};
use crate::id_map::IdMap;
use crate::log::MemoryLog;
use crate::sync::{IndexSynchronizer, SyncOutcome};
use crate::types::StoreConfig;
use crate::vector_index::FlatIndex;
use ghostmesh_core::{Error, LogEntry, MemoryRecord, Ordinal, Result};
use std::fs;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// A memory returned by a similarity query
#[derive(Debug, Clone, PartialEq)]
pub struct RetrievedMemory {
    pub ordinal: Ordinal,
    pub text: String,
    /// Inner product with the query embedding
    pub score: f32,
}

/// Persistent vector memory store
pub struct MemoryStore {
    config: StoreConfig,
    log: MemoryLog,
    index: FlatIndex,
    /// Texts of indexed records, by ordinal
    texts: Vec<String>,
    /// Texts already in the log whose embeddings have not been inserted
    pending: Vec<String>,
    provider: Arc<dyn EmbeddingProvider>,
    outcome: SyncOutcome,
}

impl MemoryStore {
    /// Open the store: load the log, then reuse or rebuild the index
    pub async fn open(config: StoreConfig, provider: Arc<dyn EmbeddingProvider>) -> Result<Self> {
        info!("Opening memory store in {}", config.memory_dir.display());

        fs::create_dir_all(&config.memory_dir).map_err(|e| {
            Error::StorageUnavailable(format!(
                "failed to create {}: {}",
                config.memory_dir.display(),
                e
            ))
        })?;

        let log = MemoryLog::new(config.log_path(), config.sync_writes);
        let texts = log.load()?;

        let synced = IndexSynchronizer::new(&config, provider.as_ref())
            .synchronize(&texts)
            .await?;

        info!(
            "Memory store ready: {} memories loaded from {}",
            texts.len(),
            log.path().display()
        );

        Ok(Self {
            config,
            log,
            index: synced.index,
            texts,
            pending: Vec::new(),
            provider,
            outcome: synced.outcome,
        })
    }

    /// Get configuration
    pub fn config(&self) -> &StoreConfig {
        &self.config
    }

    /// Number of retrievable memories
    pub fn len(&self) -> usize {
        self.texts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.texts.is_empty()
    }

    /// Records in the log that are waiting for their embedding
    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }

    /// Texts of retrievable memories in ordinal order
    pub fn texts(&self) -> &[String] {
        &self.texts
    }

    pub fn record(&self, ordinal: Ordinal) -> Option<MemoryRecord> {
        self.texts
            .get(ordinal.as_usize())
            .map(|text| MemoryRecord::new(ordinal, text.clone()))
    }

    /// The live index
    pub fn index(&self) -> &FlatIndex {
        &self.index
    }

    /// Whether startup reused the persisted index
    pub fn sync_outcome(&self) -> &SyncOutcome {
        &self.outcome
    }

    /// Texts of the `k` memories most similar to `query`, most similar first
    pub async fn retrieve(&self, query: &str, k: usize) -> Result<Vec<String>> {
        Ok(self
            .retrieve_scored(query, k)
            .await?
            .into_iter()
            .map(|m| m.text)
            .collect())
    }

    /// Like [`MemoryStore::retrieve`], with ordinals and scores
    ///
    /// An empty store (or a blank query) returns nothing without calling the
    /// embedding provider.
    pub async fn retrieve_scored(&self, query: &str, k: usize) -> Result<Vec<RetrievedMemory>> {
        if self.texts.is_empty() || k == 0 || query.trim().is_empty() {
            return Ok(Vec::new());
        }

        let query_vector = self.provider.embed(query).await?;
        let hits = self.index.search(&query_vector, k).map_err(|e| {
            Error::EmbeddingFailure(format!("query embedding unusable: {}", e))
        })?;

        let mut memories = Vec::with_capacity(hits.len());
        for hit in hits {
            match self.texts.get(hit.position) {
                Some(text) => memories.push(RetrievedMemory {
                    ordinal: Ordinal::new(hit.position),
                    text: text.clone(),
                    score: hit.score,
                }),
                None => {
                    let err = Error::QueryOutOfRange {
                        position: hit.position,
                        len: self.texts.len(),
                    };
                    debug!("Skipping search hit: {}", err);
                }
            }
        }

        debug!(
            "Retrieved {} memories for query of length {}",
            memories.len(),
            query.len()
        );
        Ok(memories)
    }

    /// Append a memory, returning its ordinal
    ///
    /// The log write comes first and its failure is returned untouched. If
    /// embedding then fails the record stays pending: it is not retrievable,
    /// and the next append or checkpoint indexes it ahead of newer records.
    pub async fn append(&mut self, text: &str) -> Result<Ordinal> {
        let entry = LogEntry::new(text)?;
        self.log.append(&entry)?;

        let ordinal = Ordinal::new(self.texts.len() + self.pending.len());
        self.pending.push(entry.text);

        self.index_pending().await?;

        debug!("Appended memory {}", ordinal);
        Ok(ordinal)
    }

    /// Embed and insert pending records, all or none
    async fn index_pending(&mut self) -> Result<()> {
        if self.pending.is_empty() {
            return Ok(());
        }

        let vectors = match self.provider.embed_batch(&self.pending).await {
            Ok(vectors) => vectors,
            Err(e) => {
                warn!(
                    "Embedding failed, {} logged memories not yet indexed: {}",
                    self.pending.len(),
                    e
                );
                return Err(e.into());
            }
        };

        if vectors.len() != self.pending.len() {
            return Err(EmbeddingError::CountMismatch {
                expected: self.pending.len(),
                got: vectors.len(),
            }
            .into());
        }

        self.index.insert_batch(&vectors).map_err(|e| {
            Error::EmbeddingFailure(format!("provider returned unusable vectors: {}", e))
        })?;
        self.texts.append(&mut self.pending);

        Ok(())
    }

    /// Persist the live index so the next open can reuse it
    ///
    /// Pending records are indexed first; if that fails nothing is written
    /// and the next open rebuilds.
    pub async fn checkpoint(&mut self) -> Result<()> {
        self.index_pending().await?;

        let sync = IndexSynchronizer::new(&self.config, self.provider.as_ref());
        sync.persist(&self.index, &IdMap::sequential(self.texts.len()))?;

        info!("Checkpointed index with {} memories", self.texts.len());
        Ok(())
    }
}
