//! Language model abstraction
//!
//! One trait for every chat provider a tenant can be configured with:
//! - Ollama (`/api/generate`)
//! - OpenAI-compatible chat completions
//!
//! Each client offers a free-text completion and a JSON-constrained
//! completion. Prompt wording is chosen by [`ModelFamily`], never by the
//! provider.

mod ollama;
mod openai;

pub use ollama::{OllamaChatModel, DEFAULT_OLLAMA_URL};
pub use openai::{OpenAiChatModel, DEFAULT_OPENAI_URL};

use crate::config::LlmConfig;
use crate::embeddings::{create_embedder, Embedder};
use crate::errors::{AppError, Result};
use crate::tenant::TenantProfile;
use async_trait::async_trait;
use backoff::{future::retry, Error as BackoffError, ExponentialBackoff};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::future::Future;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

/// Trait for chat model invocation
#[async_trait]
pub trait LanguageModel: Send + Sync {
    /// Free-text completion
    async fn complete(&self, prompt: &str) -> Result<String>;

    /// Completion constrained to a JSON reply
    async fn complete_json(&self, prompt: &str) -> Result<serde_json::Value>;

    /// Provider serving this model
    fn provider(&self) -> LlmProvider;

    /// Get the model name
    fn model_name(&self) -> &str;
}

/// Supported chat/embedding providers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LlmProvider {
    Ollama,
    OpenAi,
}

impl LlmProvider {
    pub fn as_str(&self) -> &'static str {
        match self {
            LlmProvider::Ollama => "ollama",
            LlmProvider::OpenAi => "open_ai",
        }
    }

    /// Lenient lookup used for stored settings; unknown names map to Ollama
    pub fn from_name(name: &str) -> Self {
        name.parse().unwrap_or_else(|_| {
            tracing::warn!(provider = name, "Unknown llm provider, using ollama");
            LlmProvider::Ollama
        })
    }
}

impl fmt::Display for LlmProvider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for LlmProvider {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "ollama" => Ok(LlmProvider::Ollama),
            "open_ai" | "openai" => Ok(LlmProvider::OpenAi),
            other => Err(AppError::Validation {
                message: format!("unknown llm provider '{}'", other),
                field: Some("provider".to_string()),
            }),
        }
    }
}

/// Prompt variant selector
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ModelFamily {
    /// Llama chat-format special tokens
    Llama,
    /// Plain prompts
    Other,
}

impl ModelFamily {
    /// Infer the family from a model name
    pub fn infer(model_name: &str) -> Self {
        if model_name.to_lowercase().contains("llama") {
            ModelFamily::Llama
        } else {
            ModelFamily::Other
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ModelFamily::Llama => "llama",
            ModelFamily::Other => "other",
        }
    }
}

impl FromStr for ModelFamily {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "llama" => Ok(ModelFamily::Llama),
            "other" => Ok(ModelFamily::Other),
            other => Err(AppError::Validation {
                message: format!("unknown prompt family '{}'", other),
                field: Some("prompt_family".to_string()),
            }),
        }
    }
}

/// Connection settings for one provider
#[derive(Debug, Clone)]
pub struct ModelSettings {
    pub provider: LlmProvider,
    pub endpoint: Option<String>,
    pub api_key: Option<String>,
    pub model: String,
    pub embedding_model: String,
    pub timeout: Duration,
    pub max_retries: u32,
}

impl ModelSettings {
    /// Settings for a tenant, with service-wide call limits
    pub fn for_tenant(tenant: &TenantProfile, limits: &LlmConfig) -> Self {
        Self {
            provider: tenant.provider,
            endpoint: tenant.provider_endpoint.clone(),
            api_key: tenant.provider_api_key.clone(),
            model: tenant.llm_model.clone(),
            embedding_model: tenant.embedding_model.clone(),
            timeout: limits.timeout(),
            max_retries: limits.max_retries,
        }
    }
}

/// Models serving one tenant
#[derive(Clone)]
pub struct TenantModels {
    pub chat: Arc<dyn LanguageModel>,
    pub embedder: Arc<dyn Embedder>,
}

/// Create the chat model for the configured provider
pub fn create_language_model(settings: &ModelSettings) -> Result<Arc<dyn LanguageModel>> {
    match settings.provider {
        LlmProvider::Ollama => Ok(Arc::new(OllamaChatModel::new(settings)?)),
        LlmProvider::OpenAi => Ok(Arc::new(OpenAiChatModel::new(settings)?)),
    }
}

/// Create chat model and embedder for a tenant
pub fn create_tenant_models(settings: &ModelSettings) -> Result<TenantModels> {
    tracing::debug!(
        provider = %settings.provider,
        model = %settings.model,
        embedding_model = %settings.embedding_model,
        "Loading tenant models"
    );

    Ok(TenantModels {
        chat: create_language_model(settings)?,
        embedder: create_embedder(settings)?,
    })
}

/// Parse a JSON-mode reply. Tolerates a surrounding markdown code fence.
pub fn parse_json_reply(reply: &str) -> Result<serde_json::Value> {
    let trimmed = reply.trim();
    let body = trimmed
        .strip_prefix("```json")
        .or_else(|| trimmed.strip_prefix("```"))
        .and_then(|rest| rest.strip_suffix("```"))
        .unwrap_or(trimmed)
        .trim();

    serde_json::from_str(body).map_err(|e| AppError::InvalidFormat {
        message: format!("model reply is not valid JSON ({}): {}", e, truncate(body, 200)),
    })
}

fn truncate(text: &str, max_chars: usize) -> String {
    text.chars().take(max_chars).collect()
}

/// Classify an HTTP status from a provider
pub(crate) fn classify_status(
    provider: LlmProvider,
    status: reqwest::StatusCode,
    body: String,
) -> BackoffError<AppError> {
    let err = AppError::LanguageModel {
        provider: provider.to_string(),
        message: format!("API error {}: {}", status, truncate(&body, 500)),
    };

    if status.is_server_error() || status == reqwest::StatusCode::TOO_MANY_REQUESTS {
        BackoffError::transient(err)
    } else {
        BackoffError::permanent(err)
    }
}

/// Classify a transport failure from a provider
pub(crate) fn classify_send_error(
    provider: LlmProvider,
    timeout: Duration,
    err: reqwest::Error,
) -> BackoffError<AppError> {
    if err.is_timeout() {
        BackoffError::transient(AppError::Timeout {
            operation: format!("{} completion", provider),
            timeout_ms: timeout.as_millis() as u64,
        })
    } else if err.is_connect() || err.is_request() {
        BackoffError::transient(AppError::LanguageModel {
            provider: provider.to_string(),
            message: format!("Request failed: {}", err),
        })
    } else {
        BackoffError::permanent(AppError::LanguageModel {
            provider: provider.to_string(),
            message: format!("Request failed: {}", err),
        })
    }
}

/// Run a provider call, retrying transient failures with exponential backoff
pub(crate) async fn with_retries<T, F, Fut>(
    provider: LlmProvider,
    max_retries: u32,
    mut call: F,
) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = std::result::Result<T, BackoffError<AppError>>>,
{
    let policy = ExponentialBackoff {
        initial_interval: Duration::from_millis(200),
        max_interval: Duration::from_secs(5),
        max_elapsed_time: Some(Duration::from_secs(120)),
        ..Default::default()
    };

    let mut attempt = 0u32;
    retry(policy, || {
        attempt += 1;
        let current = attempt;
        let fut = call();
        async move {
            match fut.await {
                Err(BackoffError::Transient { err, .. }) if current > max_retries => {
                    Err(BackoffError::permanent(err))
                }
                Err(BackoffError::Transient { err, retry_after }) => {
                    tracing::warn!(
                        provider = %provider,
                        attempt = current,
                        max_retries,
                        error = %err,
                        "Language model request failed, retrying"
                    );
                    Err(BackoffError::Transient { err, retry_after })
                }
                other => other,
            }
        }
    })
    .await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_provider_parsing() {
        assert_eq!("Ollama".parse::<LlmProvider>().unwrap(), LlmProvider::Ollama);
        assert_eq!(" open_ai ".parse::<LlmProvider>().unwrap(), LlmProvider::OpenAi);
        assert_eq!("openai".parse::<LlmProvider>().unwrap(), LlmProvider::OpenAi);
        assert!("bedrock".parse::<LlmProvider>().is_err());
        assert_eq!(LlmProvider::from_name("bedrock"), LlmProvider::Ollama);
    }

    #[test]
    fn test_model_family_inference() {
        assert_eq!(ModelFamily::infer("llama3.1:8b"), ModelFamily::Llama);
        assert_eq!(ModelFamily::infer("Meta-Llama-3-70B"), ModelFamily::Llama);
        assert_eq!(ModelFamily::infer("gpt-4o-mini"), ModelFamily::Other);
    }

    #[test]
    fn test_parse_json_reply() {
        let value = parse_json_reply(" {\"score\": \"yes\"} ").unwrap();
        assert_eq!(value["score"], "yes");

        let fenced = parse_json_reply("```json\n[\"Acme\", \"Bob\"]\n```").unwrap();
        assert_eq!(fenced.as_array().map(|a| a.len()), Some(2));

        assert!(parse_json_reply("yes").is_err());
    }

    #[tokio::test]
    async fn test_permanent_failure_is_not_retried() {
        let mut calls = 0;
        let result: Result<()> = with_retries(LlmProvider::Ollama, 3, || {
            calls += 1;
            async {
                Err(BackoffError::permanent(AppError::LanguageModel {
                    provider: "ollama".into(),
                    message: "bad request".into(),
                }))
            }
        })
        .await;

        assert!(result.is_err());
        assert_eq!(calls, 1);
    }

    #[tokio::test]
    async fn test_transient_failure_stops_after_max_retries() {
        let mut calls = 0;
        let result: Result<()> = with_retries(LlmProvider::OpenAi, 1, || {
            calls += 1;
            async {
                Err(BackoffError::transient(AppError::LanguageModel {
                    provider: "open_ai".into(),
                    message: "503".into(),
                }))
            }
        })
        .await;

        assert!(matches!(result, Err(AppError::LanguageModel { .. })));
        assert_eq!(calls, 2);
    }
}
