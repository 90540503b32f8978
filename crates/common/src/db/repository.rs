//! Repository pattern for database operations
//!
//! Provides a clean interface for all data access operations
//! with proper error handling.

use crate::db::models::*;
use crate::db::DbPool;
use crate::errors::{AppError, Result};
use crate::llm::ModelFamily;
use crate::tenant::TenantProfile;
use sea_orm::sea_query::Expr;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, ConnectionTrait, DatabaseConnection, DbBackend, DbErr,
    EntityTrait, QueryFilter, QueryOrder, QueryResult, Set, SqlErr, Statement,
};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Result from vector similarity search
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChunkResult {
    pub chunk_id: Uuid,
    pub content: String,
    pub metadata: serde_json::Value,
    pub score: f64,
}

/// Partial update of a tenant's model settings. `None` leaves a field unchanged.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct TenantUpdate {
    pub provider: Option<String>,
    pub provider_endpoint: Option<String>,
    pub provider_api_key: Option<String>,
    pub llm_model: Option<String>,
    pub embedding_model: Option<String>,
    pub prompt_family: Option<String>,
    pub enable_summary_embedding: Option<bool>,
}

/// Convert Vec<f32> to pgvector string format "[1.0,2.0,...]"
pub fn format_vector(embedding: &[f32]) -> String {
    format!(
        "[{}]",
        embedding
            .iter()
            .map(|f| f.to_string())
            .collect::<Vec<_>>()
            .join(",")
    )
}

fn map_unique_violation(err: DbErr, message: String) -> AppError {
    match err.sql_err() {
        Some(SqlErr::UniqueConstraintViolation(_)) => AppError::Duplicate { message },
        _ => AppError::Database(err),
    }
}

/// Repository for data access operations
#[derive(Clone)]
pub struct Repository {
    pool: DbPool,
}

impl Repository {
    /// Create a new repository with the given connection pool
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    fn conn(&self) -> &DatabaseConnection {
        self.pool.conn()
    }

    // ========================================================================
    // Health Check
    // ========================================================================

    /// Ping the database
    pub async fn ping(&self) -> Result<()> {
        self.pool.ping().await
    }

    // ========================================================================
    // Tenant Operations
    // ========================================================================

    /// Find tenant by name, active or not
    pub async fn find_tenant_by_name(&self, name: &str) -> Result<Option<Tenant>> {
        TenantEntity::find()
            .filter(TenantColumn::Name.eq(name))
            .one(self.conn())
            .await
            .map_err(Into::into)
    }

    pub async fn list_tenants(&self) -> Result<Vec<Tenant>> {
        TenantEntity::find()
            .order_by_asc(TenantColumn::Name)
            .all(self.conn())
            .await
            .map_err(Into::into)
    }

    /// Insert a tenant. Fails with `Duplicate` if the name is taken.
    pub async fn create_tenant(&self, profile: &TenantProfile) -> Result<Tenant> {
        let now = chrono::Utc::now();
        // Only pin the family when it differs from what the model name implies
        let explicit_family = (profile.prompt_family != ModelFamily::infer(&profile.llm_model))
            .then(|| profile.prompt_family.as_str().to_string());

        let tenant = TenantActiveModel {
            id: Set(profile.id),
            name: Set(profile.name.clone()),
            provider: Set(profile.provider.as_str().to_string()),
            provider_endpoint: Set(profile.provider_endpoint.clone()),
            provider_api_key: Set(profile.provider_api_key.clone()),
            llm_model: Set(profile.llm_model.clone()),
            embedding_model: Set(profile.embedding_model.clone()),
            prompt_family: Set(explicit_family),
            enable_summary_embedding: Set(profile.enable_summary_embedding),
            is_active: Set(profile.is_active),
            created_at: Set(now.into()),
            updated_at: Set(now.into()),
        };

        tenant
            .insert(self.conn())
            .await
            .map_err(|e| {
                map_unique_violation(e, format!("tenant '{}' already exists", profile.name))
            })
    }

    /// Apply a partial update to a tenant's settings
    pub async fn update_tenant(&self, name: &str, update: TenantUpdate) -> Result<Tenant> {
        let existing = self
            .find_tenant_by_name(name)
            .await?
            .ok_or_else(|| AppError::NotFound {
                resource_type: "tenant".to_string(),
                id: name.to_string(),
            })?;

        let mut tenant: TenantActiveModel = existing.into();
        if let Some(provider) = update.provider {
            tenant.provider = Set(provider);
        }
        if let Some(endpoint) = update.provider_endpoint {
            tenant.provider_endpoint = Set(Some(endpoint).filter(|e| !e.is_empty()));
        }
        if let Some(api_key) = update.provider_api_key {
            tenant.provider_api_key = Set(Some(api_key).filter(|k| !k.is_empty()));
        }
        if let Some(model) = update.llm_model {
            tenant.llm_model = Set(model);
        }
        if let Some(model) = update.embedding_model {
            tenant.embedding_model = Set(model);
        }
        if let Some(family) = update.prompt_family {
            tenant.prompt_family = Set(Some(family).filter(|f| !f.is_empty()));
        }
        if let Some(enabled) = update.enable_summary_embedding {
            tenant.enable_summary_embedding = Set(enabled);
        }
        tenant.updated_at = Set(chrono::Utc::now().into());

        tenant.update(self.conn()).await.map_err(Into::into)
    }

    /// Activate or deactivate a tenant. Returns false if no such tenant.
    pub async fn set_tenant_active(&self, name: &str, active: bool) -> Result<bool> {
        let result = TenantEntity::update_many()
            .col_expr(TenantColumn::IsActive, Expr::value(active))
            .col_expr(TenantColumn::UpdatedAt, Expr::value(chrono::Utc::now()))
            .filter(TenantColumn::Name.eq(name))
            .exec(self.conn())
            .await?;

        Ok(result.rows_affected > 0)
    }

    // ========================================================================
    // Conversation Operations
    // ========================================================================

    pub async fn find_conversation(
        &self,
        tenant_id: Uuid,
        user_id: &str,
    ) -> Result<Option<Conversation>> {
        ConversationEntity::find()
            .filter(ConversationColumn::TenantId.eq(tenant_id))
            .filter(ConversationColumn::UserId.eq(user_id))
            .one(self.conn())
            .await
            .map_err(Into::into)
    }

    /// Create or replace a user's conversation state
    pub async fn save_conversation(
        &self,
        tenant_id: Uuid,
        user_id: &str,
        history: serde_json::Value,
        summary: &str,
    ) -> Result<()> {
        let now = chrono::Utc::now();

        let stmt = Statement::from_sql_and_values(
            DbBackend::Postgres,
            r#"
            INSERT INTO conversations
                (id, tenant_id, user_id, history, summary, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $6)
            ON CONFLICT (tenant_id, user_id) DO UPDATE SET
                history = EXCLUDED.history,
                summary = EXCLUDED.summary,
                updated_at = EXCLUDED.updated_at
            "#,
            vec![
                Uuid::new_v4().into(),
                tenant_id.into(),
                user_id.into(),
                history.into(),
                summary.into(),
                now.into(),
            ],
        );

        self.conn().execute(stmt).await?;
        Ok(())
    }

    /// Delete a user's conversation. Returns false if there was none.
    pub async fn delete_conversation(&self, tenant_id: Uuid, user_id: &str) -> Result<bool> {
        let result = ConversationEntity::delete_many()
            .filter(ConversationColumn::TenantId.eq(tenant_id))
            .filter(ConversationColumn::UserId.eq(user_id))
            .exec(self.conn())
            .await?;

        Ok(result.rows_affected > 0)
    }

    // ========================================================================
    // Document Chunk Operations
    // ========================================================================

    /// Cosine similarity search over a tenant's document chunks
    pub async fn vector_search(
        &self,
        tenant_id: Uuid,
        embedding: &[f32],
        limit: usize,
    ) -> Result<Vec<ChunkResult>> {
        let stmt = Statement::from_sql_and_values(
            DbBackend::Postgres,
            r#"
            SELECT
                c.id as chunk_id,
                c.content,
                c.metadata,
                1 - (c.embedding <=> $1::vector) as score
            FROM document_chunks c
            WHERE c.tenant_id = $3
              AND c.embedding IS NOT NULL
            ORDER BY c.embedding <=> $1::vector
            LIMIT $2
            "#,
            vec![
                format_vector(embedding).into(),
                (limit as i64).into(),
                tenant_id.into(),
            ],
        );

        let rows = self.conn().query_all(stmt).await?;
        rows.iter().map(chunk_from_row).collect()
    }
}

/// A chunk column that does not decode fails the whole search
fn chunk_column<T>(value: std::result::Result<T, DbErr>, column: &str) -> Result<T> {
    value.map_err(|e| {
        AppError::retrieval("vector", format!("bad chunk column '{}': {}", column, e))
    })
}

fn chunk_from_row(row: &QueryResult) -> Result<ChunkResult> {
    Ok(ChunkResult {
        chunk_id: chunk_column(row.try_get_by_index::<Uuid>(0), "chunk_id")?,
        content: chunk_column(row.try_get_by_index::<String>(1), "content")?,
        metadata: chunk_column(row.try_get_by_index::<Option<serde_json::Value>>(2), "metadata")?
            .unwrap_or(serde_json::Value::Null),
        score: chunk_column(row.try_get_by_index::<f64>(3), "score")?,
    })
}
