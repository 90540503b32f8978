//! OpenAI-compatible chat completions client

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

pub const DEFAULT_OPENAI_URL: &str = "https://api.openai.com/v1";

#[derive(Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Serialize)]
struct ResponseFormat {
    #[serde(rename = "type")]
    kind: &'static str,
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    temperature: f32,
    #[serde(skip_serializing_if = "Option::is_none")]
    response_format: Option<ResponseFormat>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChatMessageResponse,
}

#[derive(Deserialize)]
struct ChatMessageResponse {
    content: Option<String>,
}

#[derive(Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

/// OpenAI chat model
pub struct OpenAiChatModel {
    client: Client,
    base_url: String,
    api_key: String,
    model: String,
    timeout: Duration,
    max_retries: u32,
}

impl OpenAiChatModel {
    pub fn new(settings: &ModelSettings) -> Result<Self> {
        let api_key = settings.api_key.clone().filter(|k| !k.is_empty()).ok_or_else(|| {
            AppError::Configuration {
                message: "OpenAI API key required".to_string(),
            }
        })?;

        let client = Client::builder()
            .timeout(settings.timeout)
            .build()
            .map_err(|e| AppError::Internal {
                message: format!("Failed to create HTTP client: {}", e),
            })?;

        let base_url = settings
            .endpoint
            .clone()
            .filter(|e| !e.is_empty())
            .unwrap_or_else(|| DEFAULT_OPENAI_URL.to_string());

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key,
            model: settings.model.clone(),
            timeout: settings.timeout,
            max_retries: settings.max_retries,
        })
    }

    async fn chat(&self, prompt: &str, json: bool) -> Result<String> {
        let start = Instant::now();
        let url = format!("{}/chat/completions", self.base_url);

        let result = with_retries(LlmProvider::OpenAi, self.max_retries, || {
            let request = ChatRequest {
                model: &self.model,
                messages: vec![ChatMessage {
                    role: "user",
                    content: prompt,
                }],
                temperature: 0.0,
                response_format: json.then_some(ResponseFormat {
                    kind: "json_object",
                }),
            };
            let send = self
                .client
                .post(&url)
                .bearer_auth(&self.api_key)
                .json(&request)
                .send();

            async move {
                let response = send
                    .await
                    .map_err(|e| classify_send_error(LlmProvider::OpenAi, self.timeout, e))?;

                if !response.status().is_success() {
                    let status = response.status();
                    let body = response.text().await.unwrap_or_default();
                    return Err(classify_status(LlmProvider::OpenAi, status, body));
                }

                let parsed: ChatResponse = response.json().await.map_err(|e| {
                    BackoffError::permanent(AppError::LanguageModel {
                        provider: LlmProvider::OpenAi.to_string(),
                        message: format!("Failed to parse response: {}", e),
                    })
                })?;

                parsed
                    .choices
                    .into_iter()
                    .next()
                    .and_then(|c| c.message.content)
                    .ok_or_else(|| {
                        BackoffError::permanent(AppError::LanguageModel {
                            provider: LlmProvider::OpenAi.to_string(),
                            message: "Empty response from LLM".to_string(),
                        })
                    })
            }
        })
        .await;

        metrics::record_llm_call(
            start.elapsed().as_secs_f64(),
            LlmProvider::OpenAi.as_str(),
            &self.model,
            result.is_ok(),
        );

        result
    }
}

#[async_trait]
impl LanguageModel for OpenAiChatModel {
    async fn complete(&self, prompt: &str) -> Result<String> {
        self.chat(prompt, false).await
    }

    async fn complete_json(&self, prompt: &str) -> Result<serde_json::Value> {
        let reply = self.chat(prompt, true).await?;
        parse_json_reply(&reply)
    }

    fn provider(&self) -> LlmProvider {
        LlmProvider::OpenAi
    }

    fn model_name(&self) -> &str {
        &self.model
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn settings(api_key: Option<&str>) -> ModelSettings {
        ModelSettings {
            provider: LlmProvider::OpenAi,
            endpoint: None,
            api_key: api_key.map(str::to_string),
            model: "gpt-4o-mini".to_string(),
            embedding_model: "text-embedding-3-small".to_string(),
            timeout: Duration::from_secs(5),
            max_retries: 0,
        }
    }

    #[test]
    fn test_api_key_required() {
        assert!(matches!(
            OpenAiChatModel::new(&settings(None)),
            Err(AppError::Configuration { .. })
        ));
        assert!(OpenAiChatModel::new(&settings(Some(""))).is_err());

        let model = OpenAiChatModel::new(&settings(Some("sk-test"))).unwrap();
        assert_eq!(model.base_url, DEFAULT_OPENAI_URL);
    }

    #[test]
    fn test_json_mode_request_body() {
        let request = ChatRequest {
            model: "gpt-4o-mini",
            messages: vec![ChatMessage { role: "user", content: "grade" }],
            temperature: 0.0,
            response_format: Some(ResponseFormat { kind: "json_object" }),
        };
        let body = serde_json::to_value(&request).unwrap();
        assert_eq!(body["response_format"]["type"], "json_object");
        assert_eq!(body["messages"][0]["role"], "user");
    }
}
