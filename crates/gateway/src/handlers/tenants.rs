//! Tenant administration handlers

use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::Validate;

use super::{check_tenant_name, validate_request};
use crate::AppState;
use hybridrag_common::{
    db::{models::Tenant, TenantUpdate},
    errors::{AppError, Result},
    LlmProvider, ModelFamily, TenantProfile,
};

/// Request to register a tenant. Unset fields take the service defaults.
#[derive(Debug, Deserialize, Validate)]
pub struct CreateTenantRequest {
    #[validate(length(min = 1, max = 64))]
    pub name: String,

    pub provider: Option<String>,

    #[validate(url)]
    pub provider_endpoint: Option<String>,

    pub provider_api_key: Option<String>,

    #[validate(length(min = 1, max = 200))]
    pub llm_model: Option<String>,

    #[validate(length(min = 1, max = 200))]
    pub embedding_model: Option<String>,

    pub prompt_family: Option<String>,

    pub enable_summary_embedding: Option<bool>,
}

/// Tenant as returned by the API. The provider key is never echoed.
#[derive(Debug, Serialize)]
pub struct TenantResponse {
    pub id: Uuid,
    pub name: String,
    pub provider: LlmProvider,
    pub provider_endpoint: Option<String>,
    pub has_api_key: bool,
    pub llm_model: String,
    pub embedding_model: String,
    pub prompt_family: ModelFamily,
    pub enable_summary_embedding: bool,
    pub is_active: bool,
    pub created_at: String,
    pub updated_at: String,
}

impl From<Tenant> for TenantResponse {
    fn from(model: Tenant) -> Self {
        let created_at = model.created_at.to_rfc3339();
        let updated_at = model.updated_at.to_rfc3339();
        let profile = TenantProfile::from(model);

        Self {
            id: profile.id,
            has_api_key: profile.has_api_key(),
            name: profile.name,
            provider: profile.provider,
            provider_endpoint: profile.provider_endpoint,
            llm_model: profile.llm_model,
            embedding_model: profile.embedding_model,
            prompt_family: profile.prompt_family,
            enable_summary_embedding: profile.enable_summary_embedding,
            is_active: profile.is_active,
            created_at,
            updated_at,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct TenantListResponse {
    pub tenants: Vec<TenantResponse>,
}

fn tenant_not_found(name: &str) -> AppError {
    AppError::NotFound {
        resource_type: "tenant".to_string(),
        id: name.to_string(),
    }
}

/// Build the profile for a new tenant from the request and service defaults
fn build_profile(request: CreateTenantRequest, state: &AppState) -> Result<TenantProfile> {
    let mut profile = TenantProfile::with_defaults(&request.name, &state.config.llm);

    if let Some(provider) = request.provider {
        profile.provider = provider.parse()?;
        // Defaults belong to the default provider
        if profile.provider != LlmProvider::from_name(&state.config.llm.default_provider) {
            profile.provider_endpoint = None;
            profile.provider_api_key = None;
        }
    }
    if let Some(endpoint) = request.provider_endpoint {
        profile.provider_endpoint = Some(endpoint);
    }
    if let Some(api_key) = request.provider_api_key.filter(|k| !k.is_empty()) {
        profile.provider_api_key = Some(api_key);
    }
    if let Some(model) = request.llm_model {
        profile.prompt_family = ModelFamily::infer(&model);
        profile.llm_model = model;
    }
    if let Some(model) = request.embedding_model {
        profile.embedding_model = model;
    }
    if let Some(family) = request.prompt_family {
        profile.prompt_family = family.parse()?;
    }
    if let Some(enabled) = request.enable_summary_embedding {
        profile.enable_summary_embedding = enabled;
    }

    Ok(profile)
}

/// Reject unknown provider and prompt family names before they are stored
fn check_update(update: &TenantUpdate) -> Result<()> {
    if let Some(provider) = &update.provider {
        provider.parse::<LlmProvider>()?;
    }
    if let Some(family) = update.prompt_family.as_deref().filter(|f| !f.is_empty()) {
        family.parse::<ModelFamily>()?;
    }
    Ok(())
}

/// Register a tenant
pub async fn create_tenant(
    State(state): State<AppState>,
    Json(request): Json<CreateTenantRequest>,
) -> Result<(StatusCode, Json<TenantResponse>)> {
    validate_request(&request)?;
    check_tenant_name(&request.name)?;

    let profile = build_profile(request, &state)?;
    let tenant = state.repo.create_tenant(&profile).await?;

    tracing::info!(
        tenant = %tenant.name,
        provider = %tenant.provider,
        model = %tenant.llm_model,
        "Tenant created"
    );

    Ok((StatusCode::CREATED, Json(tenant.into())))
}

pub async fn list_tenants(State(state): State<AppState>) -> Result<Json<TenantListResponse>> {
    let tenants = state.repo.list_tenants().await?;
    Ok(Json(TenantListResponse {
        tenants: tenants.into_iter().map(Into::into).collect(),
    }))
}

pub async fn get_tenant(
    State(state): State<AppState>,
    Path(name): Path<String>,
) -> Result<Json<TenantResponse>> {
    let tenant = state
        .repo
        .find_tenant_by_name(&name)
        .await?
        .ok_or_else(|| tenant_not_found(&name))?;
    Ok(Json(tenant.into()))
}

/// Change a tenant's model settings
pub async fn update_tenant(
    State(state): State<AppState>,
    Path(name): Path<String>,
    Json(mut update): Json<TenantUpdate>,
) -> Result<Json<TenantResponse>> {
    check_update(&update)?;
    // Store the canonical provider name
    if let Some(provider) = update.provider.take() {
        update.provider = Some(provider.parse::<LlmProvider>()?.as_str().to_string());
    }

    let tenant = state.repo.update_tenant(&name, update).await?;
    tracing::info!(tenant = %name, "Tenant updated");
    Ok(Json(tenant.into()))
}

pub async fn activate_tenant(
    State(state): State<AppState>,
    Path(name): Path<String>,
) -> Result<StatusCode> {
    set_active(&state, &name, true).await
}

pub async fn deactivate_tenant(
    State(state): State<AppState>,
    Path(name): Path<String>,
) -> Result<StatusCode> {
    set_active(&state, &name, false).await
}

async fn set_active(state: &AppState, name: &str, active: bool) -> Result<StatusCode> {
    if !state.repo.set_tenant_active(name, active).await? {
        return Err(tenant_not_found(name));
    }
    tracing::info!(tenant = %name, active, "Tenant status changed");
    Ok(StatusCode::NO_CONTENT)
}
