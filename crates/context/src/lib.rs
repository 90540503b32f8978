//! HybridRAG Context Library
//!
//! The conversational answer workflow:
//! - Conversation memory with a progressive summary
//! - Question reformation against recent history
//! - Knowledge-graph and vector retrieval
//! - Relevance, hallucination and usefulness grading
//! - Grounded and fallback answer generation
//! - The workflow engine and the conversation service around it

pub mod generator;
pub mod graders;
pub mod memory;
pub mod prompts;
pub mod reformer;
pub mod retrieval;
pub mod service;
pub mod workflow;

#[cfg(test)]
pub mod testing;

pub use generator::{AnswerContext, AnswerGenerator};
pub use graders::{HallucinationGrader, RelevanceGrader, UsefulnessGrader, Verdict};
pub use memory::{ChatMessage, ConversationMemory, ConversationState, MessageRole};
pub use reformer::QuestionReformer;
pub use retrieval::{
    Document, GraphRetriever, GraphStore, Neo4jGraphStore, VectorRetriever, VectorStore,
};
pub use service::{ConversationService, ModelFactory, ProviderModels, SessionStore};
pub use workflow::{AnswerPath, TenantContext, WorkflowEngine, WorkflowSettings, WorkflowState};
