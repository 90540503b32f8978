//! Conversation memory
//!
//! Ordered message history plus a running summary that is extended after
//! every completed turn, so prompts stay bounded however long the
//! conversation gets.

use crate::prompts::{self, PromptKind};
use hybridrag_common::errors::{AppError, Result};
use hybridrag_common::{LanguageModel, ModelFamily};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, warn};

/// Author of a message
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageRole {
    #[serde(alias = "user")]
    Human,
    #[serde(alias = "assistant")]
    Ai,
}

impl MessageRole {
    fn prefix(&self) -> &'static str {
        match self {
            MessageRole::Human => "Human",
            MessageRole::Ai => "AI",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: MessageRole,
    pub content: String,
}

impl ChatMessage {
    pub fn human(content: impl Into<String>) -> Self {
        Self {
            role: MessageRole::Human,
            content: content.into(),
        }
    }

    pub fn ai(content: impl Into<String>) -> Self {
        Self {
            role: MessageRole::Ai,
            content: content.into(),
        }
    }
}

/// Persisted conversation for one (tenant, user) pair
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ConversationState {
    #[serde(default)]
    pub history: Vec<ChatMessage>,
    #[serde(default)]
    pub summary: String,
}

/// Render messages as `Human: ...` / `AI: ...` lines
pub fn buffer_string(messages: &[ChatMessage]) -> String {
    messages
        .iter()
        .map(|m| format!("{}: {}", m.role.prefix(), m.content))
        .collect::<Vec<_>>()
        .join("\n")
}

pub struct ConversationMemory {
    llm: Arc<dyn LanguageModel>,
    family: ModelFamily,
    history: Vec<ChatMessage>,
    summary: String,
}

impl ConversationMemory {
    /// Seed memory from persisted state.
    ///
    /// A stored summary is used as-is. Without one, a summary is built once
    /// from the full history; if that call fails the memory starts with an
    /// empty summary.
    pub async fn from_state(
        llm: Arc<dyn LanguageModel>,
        family: ModelFamily,
        state: ConversationState,
    ) -> Self {
        let mut memory = Self {
            llm,
            family,
            history: state.history,
            summary: state.summary,
        };

        if memory.summary.trim().is_empty() && !memory.history.is_empty() {
            debug!(messages = memory.history.len(), "Building summary from loaded history");
            match memory.summarize("", &memory.history).await {
                Ok(summary) => memory.summary = summary,
                Err(e) => warn!(error = %e, "Initial summary failed, starting without one"),
            }
        }

        memory
    }

    pub fn history(&self) -> &[ChatMessage] {
        &self.history
    }

    pub fn summary(&self) -> &str {
        &self.summary
    }

    /// The most recent `n` messages, oldest first
    pub fn last_turns(&self, n: usize) -> Vec<ChatMessage> {
        let start = self.history.len().saturating_sub(n);
        self.history[start..].to_vec()
    }

    /// Append a completed exchange and extend the running summary.
    ///
    /// The turns are always kept. On a summarization failure the previous
    /// summary stays in place and the error is returned.
    pub async fn record(&mut self, user_message: &str, ai_message: &str) -> Result<()> {
        let turns = [ChatMessage::human(user_message), ChatMessage::ai(ai_message)];
        self.history.extend(turns.iter().cloned());

        let summary = self.summarize(&self.summary, &turns).await?;
        self.summary = summary;
        Ok(())
    }

    pub fn into_state(self) -> ConversationState {
        ConversationState {
            history: self.history,
            summary: self.summary,
        }
    }

    async fn summarize(&self, current: &str, new_lines: &[ChatMessage]) -> Result<String> {
        let new_lines = buffer_string(new_lines);
        let prompt = prompts::render(
            PromptKind::SummarizeConversation,
            self.family,
            &[("summary", current), ("new_lines", &new_lines)],
        );

        let reply = self
            .llm
            .complete(&prompt)
            .await
            .map_err(|e| AppError::Summarization {
                message: e.to_string(),
            })?;

        let summary = reply.trim();
        if summary.is_empty() {
            return Err(AppError::Summarization {
                message: "model returned an empty summary".to_string(),
            });
        }
        Ok(summary.to_string())
    }
}
