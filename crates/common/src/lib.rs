//! HybridRAG Common Library
//!
//! Shared code for the HybridRAG services including:
//! - Database models and repository patterns
//! - Language model and embedding client abstractions
//! - Tenant profiles
//! - Error types and handling
//! - Configuration management
//! - Metrics and observability

pub mod config;
pub mod db;
pub mod embeddings;
pub mod errors;
pub mod llm;
pub mod metrics;
pub mod tenant;

// Re-export commonly used types
pub use config::AppConfig;
pub use db::{ChunkResult, Repository};
pub use embeddings::Embedder;
pub use errors::{AppError, Result};
pub use llm::{LanguageModel, LlmProvider, ModelFamily};
pub use tenant::TenantProfile;

/// Application version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
