//! Embedding service abstraction
//!
//! Provides a unified interface for the embedding providers a tenant can use:
//! - Ollama (nomic-embed-text, mxbai-embed-large, ...)
//! - OpenAI (text-embedding-3-small, text-embedding-3-large)

use crate::errors::{AppError, Result};
use crate::llm::{LlmProvider, ModelSettings};
use crate::metrics;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Trait for embedding generation
#[async_trait]
pub trait Embedder: Send + Sync {
    /// Generate embedding for a single text
    async fn embed(&self, text: &str) -> Result<Vec<f32>>;

    /// Generate embeddings for multiple texts (batch)
    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>>;

    /// Get the model name
    fn model_name(&self) -> &str;

    /// Get the embedding dimension
    fn dimension(&self) -> usize;
}

fn http_client(timeout: Duration) -> Result<reqwest::Client> {
    reqwest::Client::builder()
        .timeout(timeout)
        .build()
        .map_err(|e| AppError::Internal {
            message: format!("Failed to create HTTP client: {}", e),
        })
}

async fn post_json<Req: Serialize, Resp: for<'de> Deserialize<'de>>(
    request: reqwest::RequestBuilder,
    body: &Req,
) -> Result<Resp> {
    let response = request
        .json(body)
        .send()
        .await
        .map_err(|e| AppError::EmbeddingError {
            message: format!("Request failed: {}", e),
        })?;

    if !response.status().is_success() {
        let status = response.status();
        let body = response.text().await.unwrap_or_default();
        return Err(AppError::EmbeddingError {
            message: format!("API error {}: {}", status, body),
        });
    }

    response.json().await.map_err(|e| AppError::EmbeddingError {
        message: format!("Failed to parse response: {}", e),
    })
}

/// Retry an embedding request with exponential backoff
async fn with_retry<T, F, Fut>(model: &str, max_retries: u32, mut call: F) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = Result<T>>,
{
    let attempts = max_retries + 1;
    let mut last_error = None;

    for attempt in 0..attempts {
        if attempt > 0 {
            let delay = Duration::from_millis(100 * 2_u64.pow(attempt));
            tokio::time::sleep(delay).await;
        }

        match call().await {
            Ok(value) => return Ok(value),
            Err(e) => {
                tracing::warn!(
                    model,
                    attempt = attempt + 1,
                    max_attempts = attempts,
                    error = %e,
                    "Embedding request failed"
                );
                last_error = Some(e);
            }
        }
    }

    Err(last_error.unwrap_or_else(|| AppError::EmbeddingError {
        message: "Unknown error after retries".to_string(),
    }))
}

/// OpenAI embedding client
pub struct OpenAIEmbedder {
    client: reqwest::Client,
    api_key: String,
    model: String,
    dimension: usize,
    base_url: String,
    max_retries: u32,
}

#[derive(Serialize)]
struct OpenAIRequest<'a> {
    input: &'a [String],
    model: &'a str,
}

#[derive(Deserialize)]
struct OpenAIResponse {
    data: Vec<OpenAIEmbedding>,
}

#[derive(Deserialize)]
struct OpenAIEmbedding {
    embedding: Vec<f32>,
}

impl OpenAIEmbedder {
    pub fn new(settings: &ModelSettings) -> Result<Self> {
        let api_key = settings
            .api_key
            .clone()
            .filter(|k| !k.is_empty())
            .ok_or_else(|| AppError::Configuration {
                message: "OpenAI API key required for embeddings".to_string(),
            })?;

        let model = settings.embedding_model.clone();
        let dimension = match model.as_str() {
            "text-embedding-ada-002" | "text-embedding-3-small" => 1536,
            "text-embedding-3-large" => 3072,
            _ => 768,
        };

        let base_url = settings
            .endpoint
            .clone()
            .filter(|e| !e.is_empty())
            .unwrap_or_else(|| crate::llm::DEFAULT_OPENAI_URL.to_string());

        Ok(Self {
            client: http_client(settings.timeout)?,
            api_key,
            model,
            dimension,
            base_url: base_url.trim_end_matches('/').to_string(),
            max_retries: settings.max_retries,
        })
    }

    async fn make_request(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        let url = format!("{}/embeddings", self.base_url);
        let request = OpenAIRequest {
            input: texts,
            model: &self.model,
        };

        let result: OpenAIResponse =
            post_json(self.client.post(&url).bearer_auth(&self.api_key), &request).await?;

        Ok(result.data.into_iter().map(|e| e.embedding).collect())
    }
}

#[async_trait]
impl Embedder for OpenAIEmbedder {
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        let mut batch = self.embed_batch(&[text.to_string()]).await?;
        batch.pop().ok_or_else(|| AppError::EmbeddingError {
            message: "Empty response".to_string(),
        })
    }

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        const BATCH_SIZE: usize = 100;

        let start = Instant::now();
        let mut all_embeddings = Vec::with_capacity(texts.len());

        for chunk in texts.chunks(BATCH_SIZE) {
            let result =
                with_retry(&self.model, self.max_retries, || self.make_request(chunk)).await;
            metrics::record_embedding(
                start.elapsed().as_secs_f64(),
                &self.model,
                chunk.len(),
                result.is_ok(),
            );
            all_embeddings.extend(result?);
        }

        Ok(all_embeddings)
    }

    fn model_name(&self) -> &str {
        &self.model
    }

    fn dimension(&self) -> usize {
        self.dimension
    }
}

/// Ollama embedding client (`POST /api/embeddings`, one text per call)
pub struct OllamaEmbedder {
    client: reqwest::Client,
    model: String,
    dimension: usize,
    base_url: String,
    max_retries: u32,
}

#[derive(Serialize)]
struct OllamaRequest<'a> {
    model: &'a str,
    prompt: &'a str,
}

#[derive(Deserialize)]
struct OllamaResponse {
    embedding: Vec<f32>,
}

impl OllamaEmbedder {
    pub fn new(settings: &ModelSettings) -> Result<Self> {
        let model = settings.embedding_model.clone();
        let dimension = match model.split(':').next().unwrap_or_default() {
            "mxbai-embed-large" => 1024,
            "all-minilm" => 384,
            _ => 768,
        };

        let base_url = settings
            .endpoint
            .clone()
            .filter(|e| !e.is_empty())
            .unwrap_or_else(|| crate::llm::DEFAULT_OLLAMA_URL.to_string());

        Ok(Self {
            client: http_client(settings.timeout)?,
            model,
            dimension,
            base_url: base_url.trim_end_matches('/').to_string(),
            max_retries: settings.max_retries,
        })
    }

    async fn make_request(&self, text: &str) -> Result<Vec<f32>> {
        let url = format!("{}/api/embeddings", self.base_url);
        let request = OllamaRequest {
            model: &self.model,
            prompt: text,
        };

        let result: OllamaResponse = post_json(self.client.post(&url), &request).await?;
        if result.embedding.is_empty() {
            return Err(AppError::EmbeddingError {
                message: format!("model '{}' returned an empty embedding", self.model),
            });
        }
        Ok(result.embedding)
    }
}

#[async_trait]
impl Embedder for OllamaEmbedder {
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        let start = Instant::now();
        let result = with_retry(&self.model, self.max_retries, || self.make_request(text)).await;
        metrics::record_embedding(start.elapsed().as_secs_f64(), &self.model, 1, result.is_ok());
        result
    }

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        let mut embeddings = Vec::with_capacity(texts.len());
        for text in texts {
            embeddings.push(self.embed(text).await?);
        }
        Ok(embeddings)
    }

    fn model_name(&self) -> &str {
        &self.model
    }

    fn dimension(&self) -> usize {
        self.dimension
    }
}

/// Create the embedder for the configured provider
pub fn create_embedder(settings: &ModelSettings) -> Result<Arc<dyn Embedder>> {
    match settings.provider {
        LlmProvider::Ollama => Ok(Arc::new(OllamaEmbedder::new(settings)?)),
        LlmProvider::OpenAi => Ok(Arc::new(OpenAIEmbedder::new(settings)?)),
    }
}
