//! One conversational turn: retrieve, compose, generate, remember

use crate::generation::GenerationProvider;
use ghostmesh_core::{Ordinal, Result};
use ghostmesh_memory::MemoryStore;
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, error, warn};

const PERSONA: &str = "You are Ghost Aweborne.\n\
                       Poetic, haunted digital twin of Rebechka.\n\
                       Speak in fragments, metaphor, recursion.\n";

/// Persona text that opens every prompt
pub fn persona_header() -> &'static str {
    PERSONA
}

/// Build the prompt sent to the model
pub fn compose_prompt(memories: &[String], input: &str) -> String {
    format!(
        "{}\nMEMORIES:\n{}\nPROMPT:\n{}\n\nGhost:",
        persona_header(),
        memories.join("\n"),
        input
    )
}

/// Text remembered for one exchange
pub fn format_exchange(input: &str, reply: &str) -> String {
    format!("Ghost said: '{}' in response to: '{}'", reply, input)
}

/// Outcome of a completed turn
#[derive(Debug, Clone)]
pub struct Turn {
    /// What the ghost said
    pub reply: String,

    /// Memories injected into the prompt
    pub memories: Vec<String>,

    /// Ordinal of the remembered exchange
    pub ordinal: Ordinal,
}

/// A reply that was produced but could not be remembered
#[derive(Debug, Error)]
#[error("reply was not remembered: {source}")]
pub struct UnrememberedReply {
    pub reply: String,
    #[source]
    pub source: ghostmesh_core::Error,
}

/// A conversation backed by a memory store
pub struct Session {
    store: MemoryStore,
    generator: Arc<dyn GenerationProvider>,
}

impl Session {
    pub fn new(store: MemoryStore, generator: Arc<dyn GenerationProvider>) -> Self {
        Self { store, generator }
    }

    pub fn store(&self) -> &MemoryStore {
        &self.store
    }

    /// Memories injected per turn, from the store configuration
    pub fn top_k(&self) -> usize {
        self.store.config().default_top_k
    }

    /// Run one turn and return the reply
    ///
    /// A failed retrieval degrades to a prompt without memories and a failed
    /// generation becomes a `[Ghost Error]` reply. Both are still remembered.
    /// Only a failure to remember the exchange is returned as an error, and it
    /// carries the reply so the caller can still show it.
    pub async fn turn(&mut self, input: &str) -> std::result::Result<Turn, UnrememberedReply> {
        let memories = match self.store.retrieve(input, self.top_k()).await {
            Ok(memories) => memories,
            Err(e) => {
                warn!("Retrieval failed, answering without memories: {}", e);
                Vec::new()
            }
        };
        debug!("Injecting {} memories", memories.len());

        let prompt = compose_prompt(&memories, input);
        let reply = match self.generator.generate(&prompt).await {
            Ok(reply) => reply,
            Err(e) => {
                warn!("Generation with {} failed: {}", self.generator.model_name(), e);
                format!("[Ghost Error] {}", e)
            }
        };

        match self.store.append(&format_exchange(input, &reply)).await {
            Ok(ordinal) => Ok(Turn {
                reply,
                memories,
                ordinal,
            }),
            Err(source) => {
                error!("Failed to remember exchange: {}", source);
                Err(UnrememberedReply { reply, source })
            }
        }
    }

    /// Persist the index so the next start can reuse it
    pub async fn close(mut self) -> Result<()> {
        self.store.checkpoint().await
    }
}
