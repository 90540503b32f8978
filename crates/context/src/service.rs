//! Conversation service: one workflow run wrapped with tenant resolution
//! and conversation load/save

use crate::memory::{ConversationMemory, ConversationState};
use crate::retrieval::{GraphStore, VectorStoreFactory};
use crate::workflow::{TenantContext, WorkflowEngine, WorkflowSettings};
use async_trait::async_trait;
use hybridrag_common::config::{AppConfig, LlmConfig};
use hybridrag_common::errors::{AppError, Result};
use hybridrag_common::llm::{create_tenant_models, ModelSettings, TenantModels};
use hybridrag_common::{Repository, TenantProfile};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Tenant and conversation persistence
#[async_trait]
pub trait SessionStore: Send + Sync {
    /// Look up a tenant by name, active or not
    async fn find_tenant(&self, name: &str) -> Result<Option<TenantProfile>>;

    /// Store a new tenant. A name that already exists is `Duplicate`.
    async fn create_tenant(&self, profile: &TenantProfile) -> Result<TenantProfile>;

    async fn load_conversation(
        &self,
        tenant_id: Uuid,
        user_id: &str,
    ) -> Result<Option<ConversationState>>;

    async fn save_conversation(
        &self,
        tenant_id: Uuid,
        user_id: &str,
        state: &ConversationState,
    ) -> Result<()>;

    /// Returns false if there was nothing to delete
    async fn delete_conversation(&self, tenant_id: Uuid, user_id: &str) -> Result<bool>;
}

#[async_trait]
impl SessionStore for Repository {
    async fn find_tenant(&self, name: &str) -> Result<Option<TenantProfile>> {
        Ok(self.find_tenant_by_name(name).await?.map(TenantProfile::from))
    }

    async fn create_tenant(&self, profile: &TenantProfile) -> Result<TenantProfile> {
        Ok(Repository::create_tenant(self, profile).await?.into())
    }

    async fn load_conversation(
        &self,
        tenant_id: Uuid,
        user_id: &str,
    ) -> Result<Option<ConversationState>> {
        let Some(row) = self.find_conversation(tenant_id, user_id).await? else {
            return Ok(None);
        };

        Ok(Some(ConversationState {
            history: serde_json::from_value(row.history)?,
            summary: row.summary,
        }))
    }

    async fn save_conversation(
        &self,
        tenant_id: Uuid,
        user_id: &str,
        state: &ConversationState,
    ) -> Result<()> {
        let history = serde_json::to_value(&state.history)?;
        Repository::save_conversation(self, tenant_id, user_id, history, &state.summary).await
    }

    async fn delete_conversation(&self, tenant_id: Uuid, user_id: &str) -> Result<bool> {
        Repository::delete_conversation(self, tenant_id, user_id).await
    }
}

/// Builds the models serving a tenant
pub trait ModelFactory: Send + Sync {
    fn models_for(&self, tenant: &TenantProfile) -> Result<TenantModels>;
}

/// Provider-backed models with service-wide call limits
pub struct ProviderModels {
    limits: LlmConfig,
}

impl ProviderModels {
    pub fn new(limits: LlmConfig) -> Self {
        Self { limits }
    }
}

impl ModelFactory for ProviderModels {
    fn models_for(&self, tenant: &TenantProfile) -> Result<TenantModels> {
        create_tenant_models(&ModelSettings::for_tenant(tenant, &self.limits))
    }
}

pub struct ConversationService {
    sessions: Arc<dyn SessionStore>,
    graph: Arc<dyn GraphStore>,
    vectors: Arc<dyn VectorStoreFactory>,
    models: Arc<dyn ModelFactory>,
    settings: WorkflowSettings,
    tenant_defaults: LlmConfig,
    create_tenant_if_not_exists: bool,
}

impl ConversationService {
    pub fn new(
        sessions: Arc<dyn SessionStore>,
        graph: Arc<dyn GraphStore>,
        vectors: Arc<dyn VectorStoreFactory>,
        models: Arc<dyn ModelFactory>,
        config: &AppConfig,
    ) -> Self {
        Self {
            sessions,
            graph,
            vectors,
            models,
            settings: WorkflowSettings::from_config(&config.workflow, &config.graph.fulltext_index),
            tenant_defaults: config.llm.clone(),
            create_tenant_if_not_exists: config.tenancy.create_tenant_if_not_exists,
        }
    }

    /// Answer one message and persist the updated conversation.
    ///
    /// Nothing is written when the workflow fails.
    pub async fn respond(&self, tenant_name: &str, user_id: &str, message: &str) -> Result<String> {
        let started = Instant::now();
        let tenant = self.resolve_tenant(tenant_name).await?;
        let tenant_id = tenant.id;

        let models = self.models.models_for(&tenant)?;
        let context = TenantContext::new(tenant, models);

        let state = self
            .sessions
            .load_conversation(tenant_id, user_id)
            .await?
            .unwrap_or_default();
        debug!(
            tenant = tenant_name,
            user = user_id,
            messages = state.history.len(),
            "Conversation loaded"
        );

        let chat = context.models.chat.clone();
        let mut memory = ConversationMemory::from_state(chat, context.family, state).await;

        let vector_store = self
            .vectors
            .for_tenant(tenant_id, context.models.embedder.clone());
        let engine = WorkflowEngine::new(
            &context,
            self.graph.clone(),
            vector_store,
            self.settings.clone(),
        );

        let outcome = engine.run(message, &memory).await?;
        let answer = outcome.generation;

        if let Err(e) = memory.record(message, &answer).await {
            warn!(
                tenant = tenant_name,
                user = user_id,
                error = %e,
                "Summary not refreshed, keeping previous summary"
            );
        }

        self.sessions
            .save_conversation(tenant_id, user_id, &memory.into_state())
            .await?;

        info!(
            tenant = tenant_name,
            user = user_id,
            latency_ms = started.elapsed().as_millis() as u64,
            "Message answered"
        );
        Ok(answer)
    }

    /// Forget a user's conversation. Unknown tenants and users are a no-op.
    pub async fn reset(&self, tenant_name: &str, user_id: &str) -> Result<()> {
        let Some(tenant) = self.sessions.find_tenant(tenant_name).await? else {
            debug!(tenant = tenant_name, "Reset for unknown tenant ignored");
            return Ok(());
        };
        if !tenant.is_active {
            return Err(AppError::TenantNotFound {
                name: tenant_name.to_string(),
            });
        }

        let deleted = self.sessions.delete_conversation(tenant.id, user_id).await?;
        info!(tenant = tenant_name, user = user_id, deleted, "Conversation reset");
        Ok(())
    }

    /// Active tenant by name, created from defaults on first use when enabled
    pub async fn resolve_tenant(&self, name: &str) -> Result<TenantProfile> {
        let not_found = || AppError::TenantNotFound {
            name: name.to_string(),
        };

        match self.sessions.find_tenant(name).await? {
            Some(tenant) if tenant.is_active => Ok(tenant),
            Some(_) => Err(not_found()),
            None if self.create_tenant_if_not_exists => {
                let profile = TenantProfile::with_defaults(name, &self.tenant_defaults);
                match self.sessions.create_tenant(&profile).await {
                    Ok(tenant) => {
                        info!(
                            tenant = name,
                            provider = %tenant.provider,
                            model = %tenant.llm_model,
                            "Tenant created with default settings"
                        );
                        Ok(tenant)
                    }
                    // Created concurrently by another request
                    Err(AppError::Duplicate { .. }) => self
                        .sessions
                        .find_tenant(name)
                        .await?
                        .filter(|t| t.is_active)
                        .ok_or_else(not_found),
                    Err(e) => Err(e),
                }
            }
            None => Err(not_found()),
        }
    }
}
