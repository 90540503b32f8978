//! Follow-up question reformation

use crate::memory::{buffer_string, ChatMessage};
use crate::prompts::{self, PromptKind};
use hybridrag_common::errors::{AppError, Result};
use hybridrag_common::{LanguageModel, ModelFamily};
use std::sync::Arc;
use tracing::debug;

/// Rewrites a follow-up into a question that stands on its own
pub struct QuestionReformer {
    llm: Arc<dyn LanguageModel>,
    family: ModelFamily,
}

impl QuestionReformer {
    pub fn new(llm: Arc<dyn LanguageModel>, family: ModelFamily) -> Self {
        Self { llm, family }
    }

    /// Without history the question is returned unchanged and no model call
    /// is made. Once a call is attempted its failure is the caller's error.
    pub async fn reform(&self, question: &str, history: &[ChatMessage]) -> Result<String> {
        if history.is_empty() {
            return Ok(question.to_string());
        }

        let chat_history = buffer_string(history);
        let prompt = prompts::render(
            PromptKind::ReformQuestion,
            self.family,
            &[("chat_history", &chat_history), ("question", question)],
        );

        let reply = self
            .llm
            .complete(&prompt)
            .await
            .map_err(|e| AppError::Extraction {
                message: format!("question reformation failed: {}", e),
            })?;

        let reformed = reply.trim();
        if reformed.is_empty() {
            return Err(AppError::Extraction {
                message: "question reformation returned an empty reply".to_string(),
            });
        }

        debug!(original = question, reformed, "Question reformed");
        Ok(reformed.to_string())
    }
}
