//! Embedding generation for semantic recall
//!
//! This module provides the abstraction for embedding providers and the
//! vector helpers used by the memory store. Every provider returns
//! unit-normalized vectors so that inner product equals cosine similarity.

use async_trait::async_trait;
use ghostmesh_core::Error;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, info};

/// Errors that can occur during embedding operations
#[derive(Debug, Error)]
pub enum EmbeddingError {
    /// API request failed
    #[error("API request failed: {0}")]
    ApiError(String),

    /// Rate limit exceeded
    #[error("Rate limit exceeded")]
    RateLimitExceeded,

    /// Invalid input
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Provider not configured
    #[error("Provider not configured: {0}")]
    NotConfigured(String),

    /// The provider returned a different number of vectors than texts
    #[error("Expected {expected} embeddings, got {got}")]
    CountMismatch { expected: usize, got: usize },

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Network error
    #[error("Network error: {0}")]
    Network(String),
}

/// Result type for embedding operations
pub type EmbeddingResult<T> = Result<T, EmbeddingError>;

impl From<EmbeddingError> for Error {
    fn from(err: EmbeddingError) -> Self {
        Error::EmbeddingFailure(err.to_string())
    }
}

/// Configuration for embedding providers
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmbeddingConfig {
    /// Provider type
    pub provider: EmbeddingProviderType,

    /// Model name (e.g., "text-embedding-3-small")
    pub model: String,

    /// Embedding dimensions
    pub dimensions: usize,

    /// API key (for cloud providers)
    pub api_key: Option<String>,

    /// API base URL (for custom endpoints)
    pub api_base_url: Option<String>,

    /// Maximum batch size for embedding requests
    pub max_batch_size: usize,

    /// Timeout in seconds for API requests
    pub timeout_secs: u64,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            provider: EmbeddingProviderType::Mock,
            model: "mock-embedding".to_string(),
            dimensions: 384,
            api_key: None,
            api_base_url: None,
            max_batch_size: 100,
            timeout_secs: 30,
        }
    }
}

impl EmbeddingConfig {
    /// Create config for OpenAI text-embedding-3-small
    pub fn openai_small(api_key: &str) -> Self {
        Self {
            provider: EmbeddingProviderType::OpenAI,
            model: "text-embedding-3-small".to_string(),
            dimensions: 1536,
            api_key: Some(api_key.to_string()),
            api_base_url: Some("https://api.openai.com/v1".to_string()),
            max_batch_size: 100,
            timeout_secs: 30,
        }
    }

    /// Create config for mock embeddings (testing)
    pub fn mock(dimensions: usize) -> Self {
        Self {
            provider: EmbeddingProviderType::Mock,
            model: "mock-embedding".to_string(),
            dimensions,
            ..Default::default()
        }
    }

    /// Create config for a local OpenAI-compatible embedding server
    /// (e.g. Ollama at `http://localhost:11434/v1` serving `all-minilm`)
    pub fn local(base_url: &str, model: &str, dimensions: usize) -> Self {
        Self {
            provider: EmbeddingProviderType::Local,
            model: model.to_string(),
            dimensions,
            api_key: None,
            api_base_url: Some(base_url.to_string()),
            max_batch_size: 32,
            timeout_secs: 60,
        }
    }
}

/// Supported embedding provider types
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EmbeddingProviderType {
    /// OpenAI embeddings API
    OpenAI,
    /// Local OpenAI-compatible embedding server
    Local,
    /// Mock provider for testing
    Mock,
}

/// Trait for embedding providers
///
/// `embed_batch` must return exactly one vector per input text, in input order.
#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    /// Get the embedding dimension for this provider
    fn dimensions(&self) -> usize;

    /// Get the model name
    fn model_name(&self) -> &str;

    /// Generate embedding for a single text
    async fn embed(&self, text: &str) -> EmbeddingResult<Vec<f32>>;

    /// Generate embeddings for multiple texts (batch)
    async fn embed_batch(&self, texts: &[String]) -> EmbeddingResult<Vec<Vec<f32>>>;
}

/// Mock embedding provider for testing
///
/// Generates deterministic embeddings based on text hash. Identical texts map
/// to identical vectors, so a query equal to a stored memory scores 1.0.
pub struct MockEmbeddingProvider {
    dimensions: usize,
}

impl MockEmbeddingProvider {
    /// Create a new mock provider
    pub fn new(dimensions: usize) -> Self {
        info!("Created mock embedding provider with {} dimensions", dimensions);
        Self { dimensions }
    }

    /// Generate a deterministic embedding from text
    fn hash_to_embedding(&self, text: &str) -> Vec<f32> {
        use std::collections::hash_map::DefaultHasher;
        use std::hash::{Hash, Hasher};

        let mut hasher = DefaultHasher::new();
        text.hash(&mut hasher);
        let mut current = hasher.finish();

        let mut embedding = Vec::with_capacity(self.dimensions);
        for _ in 0..self.dimensions {
            // LCG step, mapped to [-1, 1]
            current = current
                .wrapping_mul(6364136223846793005)
                .wrapping_add(1442695040888963407);
            let value = ((current as f64) / (u64::MAX as f64) * 2.0 - 1.0) as f32;
            embedding.push(value);
        }

        normalize_vector(&mut embedding);
        embedding
    }
}

#[async_trait]
impl EmbeddingProvider for MockEmbeddingProvider {
    fn dimensions(&self) -> usize {
        self.dimensions
    }

    fn model_name(&self) -> &str {
        "mock-embedding"
    }

    async fn embed(&self, text: &str) -> EmbeddingResult<Vec<f32>> {
        if text.is_empty() {
            return Err(EmbeddingError::InvalidInput("Empty text".to_string()));
        }
        debug!("Mock embedding for text of length {}", text.len());
        Ok(self.hash_to_embedding(text))
    }

    async fn embed_batch(&self, texts: &[String]) -> EmbeddingResult<Vec<Vec<f32>>> {
        // Empty texts are rejected rather than skipped: dropping one would
        // shift every following vector off its ordinal.
        if let Some(pos) = texts.iter().position(|t| t.is_empty()) {
            return Err(EmbeddingError::InvalidInput(format!(
                "Empty text at batch position {}",
                pos
            )));
        }

        let embeddings: Vec<Vec<f32>> = texts.iter().map(|t| self.hash_to_embedding(t)).collect();

        debug!("Mock batch embedding for {} texts", embeddings.len());
        Ok(embeddings)
    }
}

/// OpenAI-compatible embedding provider
///
/// Uses the `/embeddings` endpoint of the OpenAI API or of any local server
/// that speaks the same protocol. Large batches are split into requests of
/// at most `max_batch_size` texts.
#[cfg(feature = "openai")]
pub struct OpenAIEmbeddingProvider {
    config: EmbeddingConfig,
    client: reqwest::Client,
}

#[cfg(feature = "openai")]
impl OpenAIEmbeddingProvider {
    /// Create a new OpenAI-compatible provider
    pub fn new(config: EmbeddingConfig) -> EmbeddingResult<Self> {
        if config.provider == EmbeddingProviderType::OpenAI && config.api_key.is_none() {
            return Err(EmbeddingError::NotConfigured(
                "OpenAI API key required".to_string(),
            ));
        }

        let client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| EmbeddingError::Network(e.to_string()))?;

        info!(
            "Created {:?} embedding provider with model {}",
            config.provider, config.model
        );

        Ok(Self { config, client })
    }

    async fn request(&self, texts: &[String]) -> EmbeddingResult<Vec<Vec<f32>>> {
        let base_url = self
            .config
            .api_base_url
            .as_deref()
            .unwrap_or("https://api.openai.com/v1");

        let url = format!("{}/embeddings", base_url.trim_end_matches('/'));

        #[derive(Serialize)]
        struct EmbeddingRequest<'a> {
            model: &'a str,
            input: &'a [String],
        }

        #[derive(Deserialize)]
        struct EmbeddingResponse {
            data: Vec<EmbeddingData>,
        }

        #[derive(Deserialize)]
        struct EmbeddingData {
            embedding: Vec<f32>,
            index: usize,
        }

        let request = EmbeddingRequest {
            model: &self.config.model,
            input: texts,
        };

        let mut builder = self
            .client
            .post(&url)
            .header("Content-Type", "application/json")
            .json(&request);
        if let Some(api_key) = &self.config.api_key {
            builder = builder.header("Authorization", format!("Bearer {}", api_key));
        }

        let response = builder
            .send()
            .await
            .map_err(|e| EmbeddingError::Network(e.to_string()))?;

        if response.status() == 429 {
            return Err(EmbeddingError::RateLimitExceeded);
        }

        if !response.status().is_success() {
            let error_text = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            return Err(EmbeddingError::ApiError(error_text));
        }

        let embedding_response: EmbeddingResponse = response
            .json()
            .await
            .map_err(|e| EmbeddingError::Serialization(e.to_string()))?;

        // Sort by index to ensure correct order
        let mut data = embedding_response.data;
        data.sort_by_key(|d| d.index);

        if data.len() != texts.len() {
            return Err(EmbeddingError::CountMismatch {
                expected: texts.len(),
                got: data.len(),
            });
        }

        Ok(data
            .into_iter()
            .map(|d| {
                let mut embedding = d.embedding;
                normalize_vector(&mut embedding);
                embedding
            })
            .collect())
    }
}

#[cfg(feature = "openai")]
#[async_trait]
impl EmbeddingProvider for OpenAIEmbeddingProvider {
    fn dimensions(&self) -> usize {
        self.config.dimensions
    }

    fn model_name(&self) -> &str {
        &self.config.model
    }

    async fn embed(&self, text: &str) -> EmbeddingResult<Vec<f32>> {
        let embeddings = self.embed_batch(&[text.to_string()]).await?;
        embeddings
            .into_iter()
            .next()
            .ok_or_else(|| EmbeddingError::ApiError("Empty response".to_string()))
    }

    async fn embed_batch(&self, texts: &[String]) -> EmbeddingResult<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Ok(vec![]);
        }

        let chunk_size = self.config.max_batch_size.max(1);
        let mut embeddings = Vec::with_capacity(texts.len());
        for chunk in texts.chunks(chunk_size) {
            embeddings.extend(self.request(chunk).await?);
        }

        debug!("Embedded batch of {} texts", embeddings.len());
        Ok(embeddings)
    }
}

/// Create an embedding provider from configuration
pub fn create_provider(config: EmbeddingConfig) -> EmbeddingResult<Arc<dyn EmbeddingProvider>> {
    match config.provider {
        EmbeddingProviderType::Mock => Ok(Arc::new(MockEmbeddingProvider::new(config.dimensions))),
        #[cfg(feature = "openai")]
        EmbeddingProviderType::OpenAI | EmbeddingProviderType::Local => {
            Ok(Arc::new(OpenAIEmbeddingProvider::new(config)?))
        }
        #[cfg(not(feature = "openai"))]
        EmbeddingProviderType::OpenAI | EmbeddingProviderType::Local => {
            Err(EmbeddingError::NotConfigured(
                "HTTP embedding providers not enabled. Compile with --features openai".to_string(),
            ))
        }
    }
}

// ============== Vector Functions ==============

/// Normalize a vector in-place
pub fn normalize_vector(v: &mut [f32]) {
    let magnitude: f32 = v.iter().map(|x| x * x).sum::<f32>().sqrt();
    if magnitude > 0.0 {
        for x in v.iter_mut() {
            *x /= magnitude;
        }
    }
}

/// Calculate dot product between two vectors
///
/// For normalized vectors, this is equivalent to cosine similarity.
pub fn dot_product(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() {
        return 0.0;
    }

    a.iter().zip(b.iter()).map(|(x, y)| x * y).sum()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dot_product() {
        let a = vec![1.0, 2.0, 3.0];
        let b = vec![4.0, 5.0, 6.0];
        // 1*4 + 2*5 + 3*6 = 4 + 10 + 18 = 32
        assert!((dot_product(&a, &b) - 32.0).abs() < 0.0001);
    }

    #[test]
    fn test_dot_product_length_mismatch() {
        assert_eq!(dot_product(&[1.0, 0.0], &[1.0]), 0.0);
    }

    #[test]
    fn test_normalize_vector() {
        let mut v = vec![3.0, 4.0];
        normalize_vector(&mut v);
        assert!((v[0] - 0.6).abs() < 0.0001);
        assert!((v[1] - 0.8).abs() < 0.0001);
    }

    #[test]
    fn test_normalize_zero_vector() {
        let mut v = vec![0.0, 0.0];
        normalize_vector(&mut v);
        assert_eq!(v, vec![0.0, 0.0]);
    }

    #[tokio::test]
    async fn test_mock_provider() {
        let provider = MockEmbeddingProvider::new(384);

        let embedding = provider.embed("Hello world").await.unwrap();
        assert_eq!(embedding.len(), 384);

        // Unit length
        assert!((dot_product(&embedding, &embedding) - 1.0).abs() < 0.001);

        // Same text should produce same embedding
        let embedding2 = provider.embed("Hello world").await.unwrap();
        assert_eq!(embedding, embedding2);

        // Different text should produce different embedding
        let embedding3 = provider.embed("Goodbye world").await.unwrap();
        assert_ne!(embedding, embedding3);
    }

    #[tokio::test]
    async fn test_mock_provider_batch_matches_single() {
        let provider = MockEmbeddingProvider::new(16);

        let texts = vec![
            "First text".to_string(),
            "Second text".to_string(),
            "Third text".to_string(),
        ];

        let embeddings = provider.embed_batch(&texts).await.unwrap();
        assert_eq!(embeddings.len(), 3);

        for (text, emb) in texts.iter().zip(&embeddings) {
            assert_eq!(emb, &provider.embed(text).await.unwrap());
        }
    }

    #[tokio::test]
    async fn test_mock_provider_batch_rejects_empty_text() {
        let provider = MockEmbeddingProvider::new(8);
        let texts = vec!["one".to_string(), String::new(), "three".to_string()];
        let result = provider.embed_batch(&texts).await;
        assert!(matches!(result, Err(EmbeddingError::InvalidInput(_))));
    }

    #[test]
    fn test_embedding_error_converts_to_failure() {
        let err: Error = EmbeddingError::RateLimitExceeded.into();
        assert!(matches!(err, Error::EmbeddingFailure(_)));
    }

    #[test]
    fn test_embedding_config_defaults() {
        let config = EmbeddingConfig::default();
        assert_eq!(config.provider, EmbeddingProviderType::Mock);
        assert_eq!(config.dimensions, 384);
    }

    #[test]
    fn test_embedding_config_presets() {
        let config = EmbeddingConfig::openai_small("test-key");
        assert_eq!(config.provider, EmbeddingProviderType::OpenAI);
        assert_eq!(config.dimensions, 1536);
        assert_eq!(config.model, "text-embedding-3-small");

        let local = EmbeddingConfig::local("http://localhost:11434/v1", "all-minilm", 384);
        assert_eq!(local.provider, EmbeddingProviderType::Local);
        assert!(local.api_key.is_none());
    }

    #[test]
    fn test_create_mock_provider() {
        let provider = create_provider(EmbeddingConfig::mock(32)).unwrap();
        assert_eq!(provider.dimensions(), 32);
        assert_eq!(provider.model_name(), "mock-embedding");
    }
}
