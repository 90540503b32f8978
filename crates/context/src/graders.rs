//! Binary LLM graders
//!
//! Each grader is one JSON-mode model call whose reply must carry a `score`
//! of `yes` or `no`. Anything else is a grading failure; a malformed reply
//! is never read as `no`.

use crate::memory::ConversationMemory;
use crate::prompts::{self, PromptKind};
use crate::retrieval::{join_documents, Document};
use hybridrag_common::errors::{AppError, Result};
use hybridrag_common::metrics;
use hybridrag_common::{LanguageModel, ModelFamily};
use serde::Serialize;
use std::sync::Arc;
use tracing::debug;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Verdict {
    Yes,
    No,
}

impl Verdict {
    pub fn is_yes(&self) -> bool {
        matches!(self, Verdict::Yes)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Verdict::Yes => "yes",
            Verdict::No => "no",
        }
    }

    /// Read the verdict from a grader reply
    pub fn from_reply(grader: &str, reply: &serde_json::Value) -> Result<Self> {
        let score = reply
            .as_object()
            .and_then(|fields| {
                fields
                    .iter()
                    .find(|(key, _)| key.eq_ignore_ascii_case("score"))
                    .map(|(_, value)| value)
            })
            .ok_or_else(|| {
                AppError::grading(grader, format!("reply has no 'score' key: {}", reply))
            })?;

        let text = score
            .as_str()
            .ok_or_else(|| {
                AppError::grading(grader, format!("'score' is not a string: {}", score))
            })?;

        match text.trim().to_lowercase().as_str() {
            "yes" => Ok(Verdict::Yes),
            "no" => Ok(Verdict::No),
            other => Err(AppError::grading(
                grader,
                format!("expected 'yes' or 'no', got '{}'", other),
            )),
        }
    }
}

async fn ask(
    llm: &dyn LanguageModel,
    family: ModelFamily,
    grader: &str,
    kind: PromptKind,
    vars: &[(&str, &str)],
) -> Result<Verdict> {
    let prompt = prompts::render(kind, family, vars);
    let reply = llm
        .complete_json(&prompt)
        .await
        .map_err(|e| AppError::grading(grader, e.to_string()))?;

    let verdict = Verdict::from_reply(grader, &reply)?;
    metrics::record_verdict(grader, verdict.as_str());
    Ok(verdict)
}

/// Drops retrieved documents unrelated to the question
pub struct RelevanceGrader {
    llm: Arc<dyn LanguageModel>,
    family: ModelFamily,
}

impl RelevanceGrader {
    pub fn new(llm: Arc<dyn LanguageModel>, family: ModelFamily) -> Self {
        Self { llm, family }
    }

    pub async fn grade(&self, document: &Document, question: &str) -> Result<Verdict> {
        ask(
            self.llm.as_ref(),
            self.family,
            "relevance",
            PromptKind::GradeRelevance,
            &[("document", &document.content), ("question", question)],
        )
        .await
    }

    /// Relevant documents in their original order. Blank documents are
    /// dropped without a model call; grading is sequential.
    pub async fn filter_relevant(
        &self,
        documents: Vec<Document>,
        question: &str,
    ) -> Result<Vec<Document>> {
        let mut kept = Vec::with_capacity(documents.len());

        for document in documents {
            if document.is_blank() {
                debug!("Skipping blank document");
                continue;
            }
            let verdict = self.grade(&document, question).await?;
            debug!(verdict = verdict.as_str(), "Document graded");
            if verdict.is_yes() {
                kept.push(document);
            }
        }

        Ok(kept)
    }
}

/// Checks an answer against the evidence it was generated from
pub struct HallucinationGrader {
    llm: Arc<dyn LanguageModel>,
    family: ModelFamily,
}

impl HallucinationGrader {
    pub fn new(llm: Arc<dyn LanguageModel>, family: ModelFamily) -> Self {
        Self { llm, family }
    }

    pub async fn grade(
        &self,
        generation: &str,
        documents: &[Document],
        relationships: &str,
        memory: &ConversationMemory,
    ) -> Result<Verdict> {
        let documents = join_documents(documents);
        ask(
            self.llm.as_ref(),
            self.family,
            "hallucination",
            PromptKind::GradeHallucination,
            &[
                ("generation", generation),
                ("documents", &documents),
                ("relationships", relationships),
                ("summary", memory.summary()),
            ],
        )
        .await
    }
}

/// Checks that an answer actually addresses the question asked
pub struct UsefulnessGrader {
    llm: Arc<dyn LanguageModel>,
    family: ModelFamily,
}

impl UsefulnessGrader {
    pub fn new(llm: Arc<dyn LanguageModel>, family: ModelFamily) -> Self {
        Self { llm, family }
    }

    pub async fn grade(&self, generation: &str, question: &str) -> Result<Verdict> {
        ask(
            self.llm.as_ref(),
            self.family,
            "usefulness",
            PromptKind::GradeUsefulness,
            &[("generation", generation), ("question", question)],
        )
        .await
    }
}
