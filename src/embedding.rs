//! Embedder abstraction and HTTP-backed implementations.
//!
//! The retrieval engine treats embedding generation as an external
//! capability behind the [`Embedder`] trait: text in, fixed-length float
//! vector out. Concrete embedders:
//! - **[`DisabledEmbedder`]**: always fails; used when embeddings are not configured.
//! - **[`OpenAiEmbedder`]**: calls the OpenAI embeddings API with retry and backoff.
//! - **[`OllamaEmbedder`]**: calls a local Ollama instance's `/api/embed` endpoint.
//!
//! Also provides the vector helpers shared by ingestion and retrieval:
//! - [`validate_vector`]: reject empty, non-finite, zero or wrongly sized vectors
//! - [`vector_to_string`]: serialize a vector as comma-joined floats for storage
//! - [`parse_vector`]: parse a stored vector back into `Vec<f32>`
//!
//! # Retry Strategy
//!
//! The HTTP embedders use exponential backoff for transient errors:
//! - HTTP 429 (rate limited) and 5xx (server error) → retry
//! - HTTP 4xx (client error, not 429) → fail immediately
//! - Network errors → retry
//! - Backoff: 1s, 2s, 4s, 8s, 16s, 32s (capped at 2^5)

use std::num::ParseFloatError;
use std::sync::Arc;
use std::time::Duration;

use anyhow::bail;
use async_trait::async_trait;
use serde::Deserialize;

use crate::config::EmbeddingConfig;
use crate::error::{Error, Result};

/// Converts text into an embedding vector.
#[async_trait]
pub trait Embedder: Send + Sync {
    /// Returns the model identifier (e.g. `"text-embedding-3-small"`).
    fn model_name(&self) -> &str;
    /// Returns the expected dimensionality, or `0` when not known up front.
    fn dims(&self) -> usize;
    /// Embed one text. Implementations must return an error rather than a
    /// placeholder vector when the backend produces nothing usable.
    async fn embed(&self, text: &str) -> Result<Vec<f32>>;
}

// ============ Disabled ============

/// Used when `embedding.provider = "disabled"`. Every call fails.
pub struct DisabledEmbedder;

#[async_trait]
impl Embedder for DisabledEmbedder {
    fn model_name(&self) -> &str {
        "disabled"
    }
    fn dims(&self) -> usize {
        0
    }
    async fn embed(&self, _text: &str) -> Result<Vec<f32>> {
        Err(Error::embedding("embedding provider is disabled"))
    }
}

// ============ OpenAI ============

/// Embedder using `POST https://api.openai.com/v1/embeddings`.
///
/// Requires the `OPENAI_API_KEY` environment variable.
pub struct OpenAiEmbedder {
    model: String,
    dims: usize,
    api_key: String,
    max_retries: u32,
    client: reqwest::Client,
}

impl OpenAiEmbedder {
    /// # Errors
    ///
    /// Returns an error if `model` or `dims` is not set in config,
    /// or if `OPENAI_API_KEY` is not in the environment.
    pub fn new(config: &EmbeddingConfig) -> anyhow::Result<Self> {
        let model = config
            .model
            .clone()
            .ok_or_else(|| anyhow::anyhow!("embedding.model required for OpenAI provider"))?;
        let dims = config
            .dims
            .ok_or_else(|| anyhow::anyhow!("embedding.dims required for OpenAI provider"))?;
        let api_key = std::env::var("OPENAI_API_KEY")
            .map_err(|_| anyhow::anyhow!("OPENAI_API_KEY environment variable not set"))?;
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;

        Ok(Self {
            model,
            dims,
            api_key,
            max_retries: config.max_retries,
            client,
        })
    }
}

#[derive(Deserialize)]
struct OpenAiResponse {
    data: Vec<OpenAiEmbedding>,
}

#[derive(Deserialize)]
struct OpenAiEmbedding {
    index: usize,
    embedding: Vec<f32>,
}

#[async_trait]
impl Embedder for OpenAiEmbedder {
    fn model_name(&self) -> &str {
        &self.model
    }
    fn dims(&self) -> usize {
        self.dims
    }

    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        let body = serde_json::json!({
            "model": self.model,
            "input": [text],
        });
        let request = self
            .client
            .post("https://api.openai.com/v1/embeddings")
            .header("Authorization", format!("Bearer {}", self.api_key))
            .json(&body);

        let json = send_with_retry(request, self.max_retries, "OpenAI").await?;
        let mut parsed: OpenAiResponse = serde_json::from_value(json)
            .map_err(|e| Error::embedding(format!("invalid OpenAI response: {}", e)))?;
        parsed.data.sort_by_key(|d| d.index);

        parsed
            .data
            .into_iter()
            .next()
            .map(|d| d.embedding)
            .ok_or_else(|| Error::embedding("OpenAI response contained no embeddings"))
    }
}

// ============ Ollama ============

/// Embedder using a local Ollama instance (default `http://localhost:11434`).
pub struct OllamaEmbedder {
    model: String,
    dims: usize,
    url: String,
    max_retries: u32,
    client: reqwest::Client,
}

impl OllamaEmbedder {
    pub fn new(config: &EmbeddingConfig) -> anyhow::Result<Self> {
        let model = config
            .model
            .clone()
            .ok_or_else(|| anyhow::anyhow!("embedding.model required for Ollama provider"))?;
        let dims = config
            .dims
            .ok_or_else(|| anyhow::anyhow!("embedding.dims required for Ollama provider"))?;
        let url = config
            .url
            .clone()
            .unwrap_or_else(|| "http://localhost:11434".to_string());
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;

        Ok(Self {
            model,
            dims,
            url,
            max_retries: config.max_retries,
            client,
        })
    }
}

#[derive(Deserialize)]
struct OllamaResponse {
    embeddings: Vec<Vec<f32>>,
}

#[async_trait]
impl Embedder for OllamaEmbedder {
    fn model_name(&self) -> &str {
        &self.model
    }
    fn dims(&self) -> usize {
        self.dims
    }

    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        let body = serde_json::json!({
            "model": self.model,
            "input": [text],
        });
        let request = self
            .client
            .post(format!("{}/api/embed", self.url))
            .json(&body);

        let json = send_with_retry(request, self.max_retries, "Ollama").await?;
        let parsed: OllamaResponse = serde_json::from_value(json)
            .map_err(|e| Error::embedding(format!("invalid Ollama response: {}", e)))?;

        parsed
            .embeddings
            .into_iter()
            .next()
            .ok_or_else(|| Error::embedding("Ollama response contained no embeddings"))
    }
}

/// Send a JSON request, retrying 429/5xx/network failures with backoff.
async fn send_with_retry(
    request: reqwest::RequestBuilder,
    max_retries: u32,
    backend: &str,
) -> Result<serde_json::Value> {
    let mut last_err = None;

    for attempt in 0..=max_retries {
        if attempt > 0 {
            let delay = Duration::from_secs(1 << (attempt - 1).min(5));
            tracing::debug!(backend, attempt, ?delay, "retrying embedding request");
            tokio::time::sleep(delay).await;
        }

        let Some(req) = request.try_clone() else {
            return Err(Error::embedding("embedding request body is not replayable"));
        };

        match req.send().await {
            Ok(response) => {
                let status = response.status();

                if status.is_success() {
                    return response.json().await.map_err(|e| {
                        Error::embedding(format!("{} returned unreadable JSON: {}", backend, e))
                    });
                }

                let body_text = response.text().await.unwrap_or_default();

                // Rate limited or server error, retry
                if status.as_u16() == 429 || status.is_server_error() {
                    last_err = Some(format!("{} API error {}: {}", backend, status, body_text));
                    continue;
                }

                return Err(Error::embedding(format!(
                    "{} API error {}: {}",
                    backend, status, body_text
                )));
            }
            Err(e) => {
                last_err = Some(format!("{} connection error: {}", backend, e));
                continue;
            }
        }
    }

    Err(Error::embedding(last_err.unwrap_or_else(|| {
        format!("{} embedding failed after retries", backend)
    })))
}

/// Create the [`Embedder`] selected by configuration.
///
/// | Config Value | Embedder |
/// |-------------|----------|
/// | `"disabled"` | [`DisabledEmbedder`] |
/// | `"openai"` | [`OpenAiEmbedder`] |
/// | `"ollama"` | [`OllamaEmbedder`] |
pub fn create_embedder(config: &EmbeddingConfig) -> anyhow::Result<Arc<dyn Embedder>> {
    match config.provider.as_str() {
        "disabled" => Ok(Arc::new(DisabledEmbedder)),
        "openai" => Ok(Arc::new(OpenAiEmbedder::new(config)?)),
        "ollama" => Ok(Arc::new(OllamaEmbedder::new(config)?)),
        other => bail!("Unknown embedding provider: {}", other),
    }
}

/// Check that a vector is usable for cosine similarity.
///
/// `expected_dims == 0` skips the dimension check.
pub fn validate_vector(vector: &[f32], expected_dims: usize) -> Result<()> {
    if vector.is_empty() {
        return Err(Error::embedding("embedder returned an empty vector"));
    }
    if expected_dims > 0 && vector.len() != expected_dims {
        return Err(Error::embedding(format!(
            "expected {} dimensions, got {}",
            expected_dims,
            vector.len()
        )));
    }
    if vector.iter().any(|v| !v.is_finite()) {
        return Err(Error::embedding("embedder returned a non-finite value"));
    }
    if vector.iter().all(|v| *v == 0.0) {
        return Err(Error::embedding("embedder returned the zero vector"));
    }
    Ok(())
}

/// Serialize a vector as comma-joined floats.
///
/// # Example
///
/// ```rust
/// use civic_context::embedding::{parse_vector, vector_to_string};
///
/// let v = vec![1.0f32, -2.5, 3.125];
/// let s = vector_to_string(&v);
/// assert_eq!(s, "1,-2.5,3.125");
/// assert_eq!(parse_vector(&s).unwrap(), v);
/// ```
pub fn vector_to_string(vector: &[f32]) -> String {
    vector
        .iter()
        .map(|v| v.to_string())
        .collect::<Vec<_>>()
        .join(",")
}

/// Parse a vector produced by [`vector_to_string`].
pub fn parse_vector(s: &str) -> Result<Vec<f32>, ParseFloatError> {
    s.split(',').map(|part| part.trim().parse::<f32>()).collect()
}
