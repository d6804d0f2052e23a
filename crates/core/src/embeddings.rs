use crate::error::{BackendError, IngestError};
use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use serde_json::json;

const DEFAULT: usize = 384;

pub const DEFAULT_EMBEDDING_DIMENSIONS: usize = DEFAULT;

/// Token counting for chunk budgeting. Must be deterministic for a fixed
/// model version.
pub trait TokenCounter: Send + Sync {
    fn count_tokens(&self, text: &str) -> Result<usize, IngestError>;
}

/// Text-to-vector adapter. `encode` batches every input into one backend
/// call; output length equals input length and every vector has
/// `dimensions()` entries.
#[async_trait]
pub trait Embedder: TokenCounter {
    fn dimensions(&self) -> usize;

    async fn encode(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, BackendError>;
}

/// Subword estimate for backends that do not expose their tokenizer over the
/// wire: one token per word plus one per four characters of word length.
pub fn approximate_token_count(text: &str) -> usize {
    text.split_whitespace()
        .map(|word| 1 + word.len() / 4)
        .sum()
}

/// Deterministic local embedder hashing character trigrams into a fixed-size
/// normalized vector. No model download, no network; used for offline runs
/// and as the test-time stand-in for a real embedding model.
#[derive(Debug, Clone, Copy)]
pub struct HashEmbedder {
    pub dimensions: usize,
}

impl Default for HashEmbedder {
    fn default() -> Self {
        Self {
            dimensions: DEFAULT_EMBEDDING_DIMENSIONS,
        }
    }
}

impl HashEmbedder {
    fn embed_one(&self, text: &str) -> Vec<f32> {
        let mut vector = vec![0f32; self.dimensions.max(1)];
        let lowered = text.to_lowercase();
        let chars: Vec<char> = lowered.chars().collect();

        if chars.is_empty() {
            return vector;
        }

        for window in chars.windows(3) {
            let mut hash = 1469598103934665603u64;
            for ch in window {
                let mut buf = [0u8; 4];
                for byte in ch.encode_utf8(&mut buf).bytes() {
                    hash ^= byte as u64;
                    hash = hash.wrapping_mul(1099511628211);
                }
            }
            let bucket = (hash % vector.len() as u64) as usize;
            vector[bucket] += 1.0;
        }

        let magnitude = vector.iter().map(|value| value * value).sum::<f32>().sqrt();
        if magnitude > 0.0 {
            for value in &mut vector {
                *value /= magnitude;
            }
        }

        vector
    }
}

impl TokenCounter for HashEmbedder {
    fn count_tokens(&self, text: &str) -> Result<usize, IngestError> {
        Ok(approximate_token_count(text))
    }
}

#[async_trait]
impl Embedder for HashEmbedder {
    fn dimensions(&self) -> usize {
        self.dimensions
    }

    async fn encode(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, BackendError> {
        Ok(texts.iter().map(|text| self.embed_one(text)).collect())
    }
}

/// Embedding model served over HTTP by an Ollama-compatible backend.
pub struct OllamaEmbedder {
    endpoint: String,
    model: String,
    dimensions: usize,
    client: Client,
}

impl OllamaEmbedder {
    pub fn new(
        endpoint: impl Into<String>,
        model: impl Into<String>,
        dimensions: usize,
    ) -> Self {
        Self {
            endpoint: endpoint.into(),
            model: model.into(),
            dimensions,
            client: Client::new(),
        }
    }
}

#[derive(Debug, Deserialize)]
struct EmbedResponse {
    embeddings: Vec<Vec<f32>>,
}

impl TokenCounter for OllamaEmbedder {
    fn count_tokens(&self, text: &str) -> Result<usize, IngestError> {
        // the embedding service does not expose its tokenizer, so chunk
        // budgeting runs on a local approximation
        Ok(approximate_token_count(text))
    }
}

#[async_trait]
impl Embedder for OllamaEmbedder {
    fn dimensions(&self) -> usize {
        self.dimensions
    }

    async fn encode(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, BackendError> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }

        let response = self
            .client
            .post(format!("{}/api/embed", self.endpoint))
            .json(&json!({ "model": self.model, "input": texts }))
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(BackendError::BackendResponse {
                backend: "ollama-embed".to_string(),
                details: response.status().to_string(),
            });
        }

        let parsed: EmbedResponse = response.json().await?;

        if parsed.embeddings.len() != texts.len() {
            return Err(BackendError::BackendResponse {
                backend: "ollama-embed".to_string(),
                details: format!(
                    "expected {} embeddings, got {}",
                    texts.len(),
                    parsed.embeddings.len()
                ),
            });
        }

        for embedding in &parsed.embeddings {
            if embedding.len() != self.dimensions {
                return Err(BackendError::DimensionMismatch {
                    expected: self.dimensions,
                    got: embedding.len(),
                });
            }
        }

        Ok(parsed.embeddings)
    }
}
