//! Answer workflow state machine
//!
//! ```text
//! Reform -> RetrieveGraph -> RetrieveVectors -> GradeDocuments
//!   GradeDocuments --(relevant docs)--> GenerateGrounded -> CheckAnswer
//!   GradeDocuments --(none)-----------> GenerateFallback -> End
//!   CheckAnswer --(not grounded, retries left)--> GenerateGrounded
//!   CheckAnswer --(not grounded, exhausted)-----> GenerateFallback
//!   CheckAnswer --(grounded, not useful)--------> GenerateFallback
//!   CheckAnswer --(grounded, useful)------------> End
//! ```
//!
//! Every node takes the current [`WorkflowState`] by value and returns the
//! next one together with the node to run next.

use crate::generator::{AnswerContext, AnswerGenerator};
use crate::graders::{HallucinationGrader, RelevanceGrader, UsefulnessGrader, Verdict};
use crate::memory::ConversationMemory;
use crate::reformer::QuestionReformer;
use crate::retrieval::{
    Document, GraphRetriever, GraphSearchSettings, GraphStore, LexicalReranker, VectorRetriever,
    VectorStore,
};
use hybridrag_common::config::WorkflowConfig;
use hybridrag_common::errors::Result;
use hybridrag_common::llm::TenantModels;
use hybridrag_common::metrics;
use hybridrag_common::{ModelFamily, TenantProfile};
use serde::Serialize;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// Everything a run needs to know about the tenant it serves
#[derive(Clone)]
pub struct TenantContext {
    pub profile: TenantProfile,
    pub family: ModelFamily,
    pub models: TenantModels,
}

impl TenantContext {
    pub fn new(profile: TenantProfile, models: TenantModels) -> Self {
        let family = profile.prompt_family;
        Self {
            profile,
            family,
            models,
        }
    }
}

/// Bounds for one workflow run
#[derive(Debug, Clone)]
pub struct WorkflowSettings {
    /// Regenerations after an ungrounded answer before falling back
    pub max_regenerations: u32,
    /// History messages used for reformation and fallback answers
    pub history_window: usize,
    pub retrieval_top_k: usize,
    /// Documents kept after reranking; `None` disables reranking
    pub rerank_top_n: Option<usize>,
    pub graph: GraphSearchSettings,
}

impl WorkflowSettings {
    pub fn from_config(config: &WorkflowConfig, fulltext_index: &str) -> Self {
        Self {
            max_regenerations: config.max_regenerations,
            history_window: config.history_window,
            retrieval_top_k: config.retrieval_top_k,
            rerank_top_n: config.enable_reranking.then_some(config.rerank_top_n),
            graph: GraphSearchSettings {
                index: fulltext_index.to_string(),
                match_limit: config.entity_match_limit,
                row_limit: config.neighbor_row_limit,
                timeout: config.store_timeout(),
            },
        }
    }

    fn store_timeout(&self) -> Duration {
        self.graph.timeout
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkflowNode {
    Reform,
    RetrieveGraph,
    RetrieveVectors,
    GradeDocuments,
    GenerateGrounded,
    CheckAnswer,
    GenerateFallback,
    End,
}

impl WorkflowNode {
    pub fn as_str(&self) -> &'static str {
        match self {
            WorkflowNode::Reform => "reform",
            WorkflowNode::RetrieveGraph => "retrieve_graph",
            WorkflowNode::RetrieveVectors => "retrieve_vectors",
            WorkflowNode::GradeDocuments => "grade_documents",
            WorkflowNode::GenerateGrounded => "generate_grounded",
            WorkflowNode::CheckAnswer => "check_answer",
            WorkflowNode::GenerateFallback => "generate_fallback",
            WorkflowNode::End => "end",
        }
    }
}

/// Which generator produced the final answer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AnswerPath {
    Grounded,
    Fallback,
}

impl AnswerPath {
    pub fn as_str(&self) -> &'static str {
        match self {
            AnswerPath::Grounded => "grounded",
            AnswerPath::Fallback => "fallback",
        }
    }
}

/// Grader outcomes of the latest attempt
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Verdicts {
    pub relevant_documents: Option<usize>,
    pub grounded: Option<Verdict>,
    pub useful: Option<Verdict>,
}

/// Request-scoped state threaded through the nodes. Never persisted.
#[derive(Debug, Clone, Default, Serialize)]
pub struct WorkflowState {
    pub question: String,
    pub reformed_question: String,
    pub documents: Vec<Document>,
    pub relationships: String,
    pub generation: String,
    pub verdicts: Verdicts,
    pub regenerations: u32,
    pub path: Option<AnswerPath>,
    /// Nodes visited, in order
    pub trail: Vec<WorkflowNode>,
}

impl WorkflowState {
    pub fn new(question: &str) -> Self {
        Self {
            question: question.to_string(),
            ..Default::default()
        }
    }
}

type Step = (WorkflowNode, WorkflowState);

pub struct WorkflowEngine {
    tenant: String,
    settings: WorkflowSettings,
    reformer: QuestionReformer,
    graph: GraphRetriever,
    vectors: VectorRetriever,
    relevance: RelevanceGrader,
    hallucination: HallucinationGrader,
    usefulness: UsefulnessGrader,
    generator: AnswerGenerator,
}

impl WorkflowEngine {
    pub fn new(
        tenant: &TenantContext,
        graph_store: Arc<dyn GraphStore>,
        vector_store: Arc<dyn VectorStore>,
        settings: WorkflowSettings,
    ) -> Self {
        let llm = tenant.models.chat.clone();
        let family = tenant.family;

        let mut vectors =
            VectorRetriever::new(vector_store, settings.retrieval_top_k, settings.store_timeout());
        if let Some(top_n) = settings.rerank_top_n {
            vectors = vectors.with_reranker(Arc::new(LexicalReranker::new(top_n)));
        }

        Self {
            tenant: tenant.profile.name.clone(),
            reformer: QuestionReformer::new(llm.clone(), family),
            graph: GraphRetriever::new(graph_store, llm.clone(), family, settings.graph.clone()),
            vectors,
            relevance: RelevanceGrader::new(llm.clone(), family),
            hallucination: HallucinationGrader::new(llm.clone(), family),
            usefulness: UsefulnessGrader::new(llm.clone(), family),
            generator: AnswerGenerator::new(llm, family),
            settings,
        }
    }

    /// Run the workflow to completion. The answer is the final state's
    /// `generation`.
    pub async fn run(&self, question: &str, memory: &ConversationMemory) -> Result<WorkflowState> {
        let started = Instant::now();
        let mut node = WorkflowNode::Reform;
        let mut state = WorkflowState::new(question);

        while node != WorkflowNode::End {
            state.trail.push(node);
            let node_started = Instant::now();
            debug!(tenant = %self.tenant, node = node.as_str(), "Entering node");

            let regenerations = state.regenerations;
            let (next, next_state) = match self.step(node, state, memory).await {
                Ok(step) => step,
                Err(e) => {
                    let elapsed = started.elapsed().as_secs_f64();
                    metrics::record_workflow(elapsed, "error", regenerations);
                    warn!(
                        tenant = %self.tenant,
                        node = node.as_str(),
                        error = %e,
                        "Workflow failed"
                    );
                    return Err(e);
                }
            };
            metrics::record_node(node.as_str(), node_started.elapsed().as_secs_f64());

            node = next;
            state = next_state;
        }

        let path = state.path.map(|p| p.as_str()).unwrap_or("none");
        metrics::record_workflow(started.elapsed().as_secs_f64(), path, state.regenerations);
        info!(
            tenant = %self.tenant,
            path,
            regenerations = state.regenerations,
            documents = state.documents.len(),
            latency_ms = started.elapsed().as_millis() as u64,
            "Workflow completed"
        );

        Ok(state)
    }

    async fn step(
        &self,
        node: WorkflowNode,
        state: WorkflowState,
        memory: &ConversationMemory,
    ) -> Result<Step> {
        match node {
            WorkflowNode::Reform => self.reform(state, memory).await,
            WorkflowNode::RetrieveGraph => self.retrieve_graph(state).await,
            WorkflowNode::RetrieveVectors => self.retrieve_vectors(state).await,
            WorkflowNode::GradeDocuments => self.grade_documents(state).await,
            WorkflowNode::GenerateGrounded => self.generate_grounded(state).await,
            WorkflowNode::CheckAnswer => self.check_answer(state, memory).await,
            WorkflowNode::GenerateFallback => self.generate_fallback(state, memory).await,
            WorkflowNode::End => Ok((WorkflowNode::End, state)),
        }
    }

    async fn reform(&self, mut state: WorkflowState, memory: &ConversationMemory) -> Result<Step> {
        let history = memory.last_turns(self.settings.history_window);
        state.reformed_question = self.reformer.reform(&state.question, &history).await?;
        Ok((WorkflowNode::RetrieveGraph, state))
    }

    async fn retrieve_graph(&self, mut state: WorkflowState) -> Result<Step> {
        state.relationships = self
            .graph
            .retrieve(&self.tenant, &state.reformed_question)
            .await?;
        debug!(
            tenant = %self.tenant,
            lines = state.relationships.lines().count(),
            "Graph relationships retrieved"
        );
        Ok((WorkflowNode::RetrieveVectors, state))
    }

    async fn retrieve_vectors(&self, mut state: WorkflowState) -> Result<Step> {
        state.documents = self.vectors.retrieve(&state.reformed_question).await?;
        Ok((WorkflowNode::GradeDocuments, state))
    }

    async fn grade_documents(&self, mut state: WorkflowState) -> Result<Step> {
        let retrieved = state.documents.len();
        let documents = std::mem::take(&mut state.documents);
        state.documents = self
            .relevance
            .filter_relevant(documents, &state.reformed_question)
            .await?;
        state.verdicts.relevant_documents = Some(state.documents.len());

        let next = if state.documents.is_empty() {
            WorkflowNode::GenerateFallback
        } else {
            WorkflowNode::GenerateGrounded
        };
        debug!(
            tenant = %self.tenant,
            retrieved,
            relevant = state.documents.len(),
            next = next.as_str(),
            "Documents graded"
        );
        Ok((next, state))
    }

    async fn generate_grounded(&self, mut state: WorkflowState) -> Result<Step> {
        state.generation = self
            .generator
            .generate(&AnswerContext::Grounded {
                question: &state.reformed_question,
                documents: &state.documents,
                relationships: &state.relationships,
            })
            .await?;
        state.path = Some(AnswerPath::Grounded);
        Ok((WorkflowNode::CheckAnswer, state))
    }

    async fn check_answer(
        &self,
        mut state: WorkflowState,
        memory: &ConversationMemory,
    ) -> Result<Step> {
        let grounded = self
            .hallucination
            .grade(&state.generation, &state.documents, &state.relationships, memory)
            .await?;
        state.verdicts.grounded = Some(grounded);
        state.verdicts.useful = None;

        if !grounded.is_yes() {
            if state.regenerations < self.settings.max_regenerations {
                state.regenerations += 1;
                debug!(
                    tenant = %self.tenant,
                    attempt = state.regenerations,
                    max = self.settings.max_regenerations,
                    "Answer not grounded, regenerating"
                );
                return Ok((WorkflowNode::GenerateGrounded, state));
            }
            warn!(
                tenant = %self.tenant,
                regenerations = state.regenerations,
                "Answer still not grounded, falling back"
            );
            return Ok((WorkflowNode::GenerateFallback, state));
        }

        let useful = self
            .usefulness
            .grade(&state.generation, &state.question)
            .await?;
        state.verdicts.useful = Some(useful);

        if useful.is_yes() {
            Ok((WorkflowNode::End, state))
        } else {
            debug!(tenant = %self.tenant, "Grounded answer not useful, falling back");
            Ok((WorkflowNode::GenerateFallback, state))
        }
    }

    async fn generate_fallback(
        &self,
        mut state: WorkflowState,
        memory: &ConversationMemory,
    ) -> Result<Step> {
        let history = memory.last_turns(self.settings.history_window);
        state.generation = self
            .generator
            .generate(&AnswerContext::Fallback {
                question: &state.question,
                summary: memory.summary(),
                history: &history,
            })
            .await?;
        state.path = Some(AnswerPath::Fallback);
        Ok((WorkflowNode::End, state))
    }
}
