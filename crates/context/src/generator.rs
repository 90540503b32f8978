//! Answer generation
//!
//! The grounded variant answers the reformed question from retrieved
//! documents and graph relationships. The fallback variant answers the
//! original question from conversation memory alone.

use crate::memory::{buffer_string, ChatMessage};
use crate::prompts::{self, PromptKind};
use crate::retrieval::{join_documents, Document};
use hybridrag_common::errors::{AppError, Result};
use hybridrag_common::{LanguageModel, ModelFamily};
use std::sync::Arc;
use tracing::debug;

/// Evidence an answer is generated from
#[derive(Debug, Clone, Copy)]
pub enum AnswerContext<'a> {
    Grounded {
        question: &'a str,
        documents: &'a [Document],
        relationships: &'a str,
    },
    Fallback {
        question: &'a str,
        summary: &'a str,
        history: &'a [ChatMessage],
    },
}

impl AnswerContext<'_> {
    fn variant(&self) -> &'static str {
        match self {
            AnswerContext::Grounded { .. } => "grounded",
            AnswerContext::Fallback { .. } => "fallback",
        }
    }
}

pub struct AnswerGenerator {
    llm: Arc<dyn LanguageModel>,
    family: ModelFamily,
}

impl AnswerGenerator {
    pub fn new(llm: Arc<dyn LanguageModel>, family: ModelFamily) -> Self {
        Self { llm, family }
    }

    pub async fn generate(&self, context: &AnswerContext<'_>) -> Result<String> {
        let prompt = match context {
            AnswerContext::Grounded {
                question,
                documents,
                relationships,
            } => {
                let context = join_documents(documents);
                prompts::render(
                    PromptKind::GroundedAnswer,
                    self.family,
                    &[
                        ("context", &context),
                        ("relationships", *relationships),
                        ("question", *question),
                    ],
                )
            }
            AnswerContext::Fallback {
                question,
                summary,
                history,
            } => {
                let history = buffer_string(history);
                prompts::render(
                    PromptKind::FallbackAnswer,
                    self.family,
                    &[("summary", *summary), ("history", &history), ("question", *question)],
                )
            }
        };

        let reply = self
            .llm
            .complete(&prompt)
            .await
            .map_err(|e| AppError::Generation {
                message: format!("{} answer: {}", context.variant(), e),
            })?;

        let answer = reply.trim();
        if answer.is_empty() {
            return Err(AppError::Generation {
                message: format!("{} answer: model returned an empty reply", context.variant()),
            });
        }

        debug!(variant = context.variant(), chars = answer.len(), "Answer generated");
        Ok(answer.to_string())
    }
}
