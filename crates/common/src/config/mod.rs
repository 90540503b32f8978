//! Configuration management for HybridRAG services
//!
//! Supports loading configuration from:
//! - Environment variables (prefixed with APP__)
//! - Configuration files (config.toml, config.yaml)
//! - Default values

use config::{Config, ConfigError, Environment, File};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Main application configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct AppConfig {
    /// Server configuration
    #[serde(default)]
    pub server: ServerConfig,

    /// Database configuration
    pub database: DatabaseConfig,

    /// Knowledge graph configuration
    pub graph: GraphConfig,

    /// Default language model settings for new tenants
    #[serde(default)]
    pub llm: LlmConfig,

    /// Answer workflow bounds
    #[serde(default)]
    pub workflow: WorkflowConfig,

    /// Tenant resolution
    #[serde(default)]
    pub tenancy: TenancyConfig,

    /// Observability configuration
    #[serde(default)]
    pub observability: ObservabilityConfig,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ServerConfig {
    /// Host to bind to
    #[serde(default = "default_host")]
    pub host: String,

    /// Port to listen on
    #[serde(default = "default_port")]
    pub port: u16,

    /// Request timeout in seconds
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,

    /// Shutdown timeout in seconds
    #[serde(default = "default_shutdown_timeout")]
    pub shutdown_timeout_secs: u64,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct DatabaseConfig {
    /// Postgres URL
    pub url: String,

    /// Maximum number of connections
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,

    /// Minimum number of connections
    #[serde(default = "default_min_connections")]
    pub min_connections: u32,

    /// Connection timeout in seconds
    #[serde(default = "default_connect_timeout")]
    pub connect_timeout_secs: u64,

    /// Idle timeout in seconds
    #[serde(default = "default_idle_timeout")]
    pub idle_timeout_secs: u64,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct GraphConfig {
    /// Bolt URI, e.g. bolt://localhost:7687
    pub uri: String,

    pub username: String,

    pub password: String,

    /// Database name
    #[serde(default = "default_graph_database")]
    pub database: String,

    /// Full-text index over entity ids
    #[serde(default = "default_fulltext_index")]
    pub fulltext_index: String,

    #[serde(default = "default_graph_max_connections")]
    pub max_connections: usize,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct LlmConfig {
    /// Provider for auto-created tenants: ollama, open_ai
    #[serde(default = "default_llm_provider")]
    pub default_provider: String,

    #[serde(default = "default_llm_endpoint")]
    pub default_endpoint: String,

    #[serde(default)]
    pub default_api_key: Option<String>,

    #[serde(default = "default_llm_model")]
    pub default_model: String,

    #[serde(default = "default_embedding_model")]
    pub default_embedding_model: String,

    /// Per-call timeout in seconds
    #[serde(default = "default_llm_timeout")]
    pub timeout_secs: u64,

    /// Retries for transient provider failures
    #[serde(default = "default_llm_retries")]
    pub max_retries: u32,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct WorkflowConfig {
    /// Regenerations allowed after an ungrounded answer before the
    /// fallback path is forced
    #[serde(default = "default_max_regenerations")]
    pub max_regenerations: u32,

    /// Messages of history used for reformation and fallback answers
    #[serde(default = "default_history_window")]
    pub history_window: usize,

    /// Full-text matches kept per extracted entity
    #[serde(default = "default_entity_match_limit")]
    pub entity_match_limit: usize,

    /// Relationship rows kept per extracted entity
    #[serde(default = "default_neighbor_row_limit")]
    pub neighbor_row_limit: usize,

    /// Documents pulled from the vector index
    #[serde(default = "default_retrieval_top_k")]
    pub retrieval_top_k: usize,

    #[serde(default = "default_enabled")]
    pub enable_reranking: bool,

    /// Documents kept after reranking
    #[serde(default = "default_rerank_top_n")]
    pub rerank_top_n: usize,

    /// Timeout for a single graph or vector store call in seconds
    #[serde(default = "default_store_timeout")]
    pub store_timeout_secs: u64,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct TenancyConfig {
    /// Create unknown tenants on first use with the default llm settings
    #[serde(default = "default_enabled")]
    pub create_tenant_if_not_exists: bool,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ObservabilityConfig {
    /// Log level (debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Enable JSON logging
    #[serde(default = "default_json_logging")]
    pub json_logging: bool,

    /// Metrics port (0 to disable)
    #[serde(default = "default_metrics_port")]
    pub metrics_port: u16,

    /// Service name for tracing
    #[serde(default = "default_service_name")]
    pub service_name: String,
}

// Default value functions
fn default_host() -> String { "0.0.0.0".to_string() }
fn default_port() -> u16 { 8080 }
fn default_request_timeout() -> u64 { 120 }
fn default_shutdown_timeout() -> u64 { 30 }
fn default_max_connections() -> u32 { 20 }
fn default_min_connections() -> u32 { 2 }
fn default_connect_timeout() -> u64 { 10 }
fn default_idle_timeout() -> u64 { 300 }
fn default_graph_database() -> String { "neo4j".to_string() }
fn default_fulltext_index() -> String { "entity".to_string() }
fn default_graph_max_connections() -> usize { 10 }
fn default_llm_provider() -> String { "ollama".to_string() }
fn default_llm_endpoint() -> String { "http://localhost:11434".to_string() }
fn default_llm_model() -> String { "llama3.1:8b".to_string() }
fn default_embedding_model() -> String { "nomic-embed-text:latest".to_string() }
fn default_llm_timeout() -> u64 { 60 }
fn default_llm_retries() -> u32 { 2 }
fn default_max_regenerations() -> u32 { 2 }
fn default_history_window() -> usize { 10 }
fn default_entity_match_limit() -> usize { 2 }
fn default_neighbor_row_limit() -> usize { 50 }
fn default_retrieval_top_k() -> usize { 4 }
fn default_rerank_top_n() -> usize { 3 }
fn default_store_timeout() -> u64 { 15 }
fn default_log_level() -> String { "info".to_string() }
fn default_json_logging() -> bool { true }
fn default_metrics_port() -> u16 { 9090 }
fn default_service_name() -> String { "hybridrag".to_string() }
fn default_enabled() -> bool { true }

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            request_timeout_secs: default_request_timeout(),
            shutdown_timeout_secs: default_shutdown_timeout(),
        }
    }
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            default_provider: default_llm_provider(),
            default_endpoint: default_llm_endpoint(),
            default_api_key: None,
            default_model: default_llm_model(),
            default_embedding_model: default_embedding_model(),
            timeout_secs: default_llm_timeout(),
            max_retries: default_llm_retries(),
        }
    }
}

impl Default for WorkflowConfig {
    fn default() -> Self {
        Self {
            max_regenerations: default_max_regenerations(),
            history_window: default_history_window(),
            entity_match_limit: default_entity_match_limit(),
            neighbor_row_limit: default_neighbor_row_limit(),
            retrieval_top_k: default_retrieval_top_k(),
            enable_reranking: default_enabled(),
            rerank_top_n: default_rerank_top_n(),
            store_timeout_secs: default_store_timeout(),
        }
    }
}

impl Default for TenancyConfig {
    fn default() -> Self {
        Self {
            create_tenant_if_not_exists: default_enabled(),
        }
    }
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            json_logging: default_json_logging(),
            metrics_port: default_metrics_port(),
            service_name: default_service_name(),
        }
    }
}

impl WorkflowConfig {
    /// Get store call timeout as Duration
    pub fn store_timeout(&self) -> Duration {
        Duration::from_secs(self.store_timeout_secs)
    }
}

impl LlmConfig {
    /// Get model call timeout as Duration
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

impl AppConfig {
    /// Load configuration from environment and files
    pub fn load() -> Result<Self, ConfigError> {
        let env = std::env::var("APP_ENV").unwrap_or_else(|_| "development".to_string());

        let config = Config::builder()
            // Start with defaults
            .set_default("server.host", "0.0.0.0")?
            .set_default("server.port", 8080)?

            // Load base config file
            .add_source(File::with_name("config/default").required(false))

            // Load environment-specific config
            .add_source(File::with_name(&format!("config/{}", env)).required(false))

            // Load local overrides
            .add_source(File::with_name("config/local").required(false))

            // Load from environment variables with APP__ prefix
            // e.g., APP__WORKFLOW__MAX_REGENERATIONS=3
            .add_source(
                Environment::with_prefix("APP")
                    .separator("__")
                    .try_parsing(true)
            )

            .build()?;

        config.try_deserialize()
    }

    /// Load from a specific TOML file
    pub fn from_file(path: &str) -> Result<Self, ConfigError> {
        let config = Config::builder()
            .add_source(File::with_name(path))
            .add_source(
                Environment::with_prefix("APP")
                    .separator("__")
                    .try_parsing(true)
            )
            .build()?;

        config.try_deserialize()
    }

    /// Get request timeout as Duration
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.server.request_timeout_secs)
    }

    /// Get shutdown timeout as Duration
    pub fn shutdown_timeout(&self) -> Duration {
        Duration::from_secs(self.server.shutdown_timeout_secs)
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            server: ServerConfig::default(),
            database: DatabaseConfig {
                url: "postgres://localhost/hybridrag".to_string(),
                max_connections: default_max_connections(),
                min_connections: default_min_connections(),
                connect_timeout_secs: default_connect_timeout(),
                idle_timeout_secs: default_idle_timeout(),
            },
            graph: GraphConfig {
                uri: "bolt://localhost:7687".to_string(),
                username: "neo4j".to_string(),
                password: String::new(),
                database: default_graph_database(),
                fulltext_index: default_fulltext_index(),
                max_connections: default_graph_max_connections(),
            },
            llm: LlmConfig::default(),
            workflow: WorkflowConfig::default(),
            tenancy: TenancyConfig::default(),
            observability: ObservabilityConfig::default(),
        }
    }
}
