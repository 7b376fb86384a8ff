//! Command line configuration

use clap::{Parser, ValueEnum};
use ghostmesh_core::{Error, Result};
use ghostmesh_memory::{EmbeddingConfig, EmbeddingProviderType, StoreConfig};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Default generation model served by Ollama
pub const DEFAULT_MODEL: &str = "gemma:2b-instruct";

/// Default generation timeout in seconds
pub const DEFAULT_TIMEOUT_SECS: u64 = 180;

/// Local embedding endpoint used when `--embedding-url` is absent
pub const LOCAL_EMBEDDING_URL: &str = "http://localhost:11434/v1";

/// Local embedding model used when `--embedding-model` is absent
pub const LOCAL_EMBEDDING_MODEL: &str = "all-minilm";

/// Dimensions of [`LOCAL_EMBEDDING_MODEL`]
pub const LOCAL_EMBEDDING_DIM: usize = 384;

/// Embedding backend selectable on the command line
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum, Serialize, Deserialize)]
pub enum EmbeddingBackend {
    /// Deterministic hash embeddings, no model needed
    Mock,
    /// OpenAI embeddings API (key from `OPENAI_API_KEY`)
    Openai,
    /// Local OpenAI-compatible server such as Ollama
    Local,
}

/// GhostMesh command line arguments
#[derive(Debug, Clone, Parser)]
#[command(name = "ghostmesh", version, about = "Talk to a ghost that remembers")]
pub struct Args {
    /// Folder holding the soul file and index
    #[arg(long, default_value = "memory")]
    pub memory_dir: PathBuf,

    /// JSONL soul file (inside memory-dir unless absolute)
    #[arg(long = "soul", alias = "soul-file", default_value = "ghost_soul_file.jsonl")]
    pub soul: PathBuf,

    /// Number of memories injected per turn
    #[arg(long, default_value_t = 5)]
    pub top_k: usize,

    /// Ollama model used for replies
    #[arg(long, default_value = DEFAULT_MODEL)]
    pub model: String,

    /// Seconds to wait for a reply before giving up
    #[arg(long, default_value_t = DEFAULT_TIMEOUT_SECS)]
    pub timeout_secs: u64,

    /// Embedding backend
    #[arg(long, value_enum, default_value = "local")]
    pub embedding_provider: EmbeddingBackend,

    /// Embedding model name [default: backend preset]
    #[arg(long)]
    pub embedding_model: Option<String>,

    /// Embedding dimensions [default: backend preset]
    #[arg(long)]
    pub embedding_dim: Option<usize>,

    /// Base URL of the embedding endpoint [default: backend preset]
    #[arg(long)]
    pub embedding_url: Option<String>,

    /// API key for the OpenAI backend
    #[arg(long, env = "OPENAI_API_KEY", hide_env_values = true)]
    pub api_key: Option<String>,

    /// Log level used when RUST_LOG is unset
    #[arg(long, default_value = "info")]
    pub log_level: String,
}

/// Resolved configuration for a session
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GhostConfig {
    /// Memory store layout
    pub store: StoreConfig,

    /// Embedding provider
    pub embedding: EmbeddingConfig,

    /// Generation model name
    pub model: String,

    /// Generation timeout in seconds
    pub timeout_secs: u64,

    /// Log level
    pub log_level: String,
}

impl Default for GhostConfig {
    fn default() -> Self {
        Self {
            store: StoreConfig::default(),
            embedding: EmbeddingConfig::default(),
            model: DEFAULT_MODEL.to_string(),
            timeout_secs: DEFAULT_TIMEOUT_SECS,
            log_level: "info".to_string(),
        }
    }
}

impl GhostConfig {
    /// Create a configuration rooted at a memory directory
    pub fn new<P: Into<PathBuf>>(memory_dir: P) -> Self {
        Self {
            store: StoreConfig::new(memory_dir),
            ..Default::default()
        }
    }

    /// Builder: set the generation model
    pub fn model(mut self, model: &str) -> Self {
        self.model = model.to_string();
        self
    }

    /// Builder: set the number of memories per turn
    pub fn top_k(mut self, k: usize) -> Self {
        self.store.default_top_k = k;
        self
    }

    /// Builder: set the embedding provider
    pub fn embedding(mut self, embedding: EmbeddingConfig) -> Self {
        self.embedding = embedding;
        self
    }

    /// Builder: set log level
    pub fn log_level(mut self, level: &str) -> Self {
        self.log_level = level.to_string();
        self
    }

    /// Generation timeout
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    /// Check values that clap cannot
    pub fn validate(&self) -> Result<()> {
        if self.timeout_secs == 0 {
            return Err(Error::Configuration(
                "timeout must be at least one second".to_string(),
            ));
        }
        if self.embedding.dimensions == 0 {
            return Err(Error::Configuration(
                "embedding dimensions must be positive".to_string(),
            ));
        }
        if self.embedding.provider == EmbeddingProviderType::OpenAI
            && self.embedding.api_key.is_none()
        {
            return Err(Error::Configuration(
                "the openai embedding provider needs OPENAI_API_KEY".to_string(),
            ));
        }
        Ok(())
    }
}

impl Args {
    /// Resolve arguments into a validated configuration
    pub fn into_config(self) -> Result<GhostConfig> {
        let store = StoreConfig::new(self.memory_dir)
            .log_file(self.soul)
            .default_top_k(self.top_k);

        // Each backend starts from its own preset; flags only override
        let mut embedding = match self.embedding_provider {
            EmbeddingBackend::Mock => EmbeddingConfig::mock(LOCAL_EMBEDDING_DIM),
            EmbeddingBackend::Local => EmbeddingConfig::local(
                LOCAL_EMBEDDING_URL,
                LOCAL_EMBEDDING_MODEL,
                LOCAL_EMBEDDING_DIM,
            ),
            EmbeddingBackend::Openai => EmbeddingConfig {
                api_key: self.api_key,
                ..EmbeddingConfig::openai_small("")
            },
        };
        if let Some(model) = self.embedding_model {
            embedding.model = model;
        }
        if let Some(dimensions) = self.embedding_dim {
            embedding.dimensions = dimensions;
        }
        if let Some(url) = self.embedding_url {
            embedding.api_base_url = Some(url);
        }

        let config = GhostConfig {
            store,
            embedding,
            model: self.model,
            timeout_secs: self.timeout_secs,
            log_level: self.log_level,
        };
        config.validate()?;
        Ok(config)
    }
}
