//! Ollama chat client
//!
//! Non-streaming `POST /api/generate`; JSON mode via `format: "json"`.

use super::{
    classify_send_error, classify_status, parse_json_reply, with_retries, LanguageModel,
    LlmProvider, ModelSettings,
};
use crate::errors::{AppError, Result};
use crate::metrics;
use async_trait::async_trait;
use backoff::Error as BackoffError;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::{Duration, Instant};

/// Default Ollama API endpoint
pub const DEFAULT_OLLAMA_URL: &str = "http://localhost:11434";

#[derive(Debug, Serialize)]
struct GenerateRequest<'a> {
    model: &'a str,
    prompt: &'a str,
    stream: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    format: Option<&'a str>,
    options: GenerateOptions,
}

#[derive(Debug, Serialize)]
struct GenerateOptions {
    temperature: f32,
}

#[derive(Debug, Deserialize)]
struct GenerateResponse {
    response: String,
}

/// Ollama-served chat model
#[derive(Debug, Clone)]
pub struct OllamaChatModel {
    client: Client,
    base_url: String,
    model: String,
    timeout: Duration,
    max_retries: u32,
}

impl OllamaChatModel {
    pub fn new(settings: &ModelSettings) -> Result<Self> {
        let client = Client::builder()
            .timeout(settings.timeout)
            .build()
            .map_err(|e| AppError::Internal {
                message: format!("Failed to create HTTP client: {}", e),
            })?;

        let base_url = settings
            .endpoint
            .clone()
            .unwrap_or_else(|| DEFAULT_OLLAMA_URL.to_string());

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            model: settings.model.clone(),
            timeout: settings.timeout,
            max_retries: settings.max_retries,
        })
    }

    async fn generate(&self, prompt: &str, json: bool) -> Result<String> {
        let start = Instant::now();
        let url = format!("{}/api/generate", self.base_url);

        let result = with_retries(LlmProvider::Ollama, self.max_retries, || {
            let request = GenerateRequest {
                model: &self.model,
                prompt,
                stream: false,
                format: json.then_some("json"),
                options: GenerateOptions { temperature: 0.0 },
            };
            let send = self.client.post(&url).json(&request).send();

            async move {
                let response = send
                    .await
                    .map_err(|e| classify_send_error(LlmProvider::Ollama, self.timeout, e))?;

                if !response.status().is_success() {
                    let status = response.status();
                    let body = response.text().await.unwrap_or_default();
                    return Err(classify_status(LlmProvider::Ollama, status, body));
                }

                let parsed: GenerateResponse = response.json().await.map_err(|e| {
                    BackoffError::permanent(AppError::LanguageModel {
                        provider: LlmProvider::Ollama.to_string(),
                        message: format!("Failed to parse response: {}", e),
                    })
                })?;

                Ok(parsed.response)
            }
        })
        .await;

        metrics::record_llm_call(
            start.elapsed().as_secs_f64(),
            LlmProvider::Ollama.as_str(),
            &self.model,
            result.is_ok(),
        );

        result
    }
}

#[async_trait]
impl LanguageModel for OllamaChatModel {
    async fn complete(&self, prompt: &str) -> Result<String> {
        self.generate(prompt, false).await
    }

    async fn complete_json(&self, prompt: &str) -> Result<serde_json::Value> {
        let reply = self.generate(prompt, true).await?;
        parse_json_reply(&reply)
    }

    fn provider(&self) -> LlmProvider {
        LlmProvider::Ollama
    }

    fn model_name(&self) -> &str {
        &self.model
    }
}
