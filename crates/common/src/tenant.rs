//! Tenant profile: the per-tenant model configuration the workflow runs with

use crate::config::LlmConfig;
use crate::db::models::Tenant;
use crate::llm::{LlmProvider, ModelFamily};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Separator between tenant name and entity id in the knowledge graph
pub const NAMESPACE_SEPARATOR: &str = "::";

/// Longest accepted tenant name
pub const MAX_TENANT_NAME_LEN: usize = 64;

/// Names that collide with static API path segments (`/v1/tenants/...`)
pub const RESERVED_TENANT_NAMES: &[&str] = &["tenants"];

/// Tenant names become graph namespaces and path segments, so they are
/// restricted to ASCII letters, digits, `_` and `-`, and may not be reserved.
pub fn valid_tenant_name(name: &str) -> bool {
    !name.is_empty()
        && name.len() <= MAX_TENANT_NAME_LEN
        && !RESERVED_TENANT_NAMES.contains(&name)
        && name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TenantProfile {
    pub id: Uuid,
    pub name: String,
    pub provider: LlmProvider,
    pub provider_endpoint: Option<String>,
    #[serde(skip_serializing)]
    pub provider_api_key: Option<String>,
    pub llm_model: String,
    pub embedding_model: String,
    pub prompt_family: ModelFamily,
    pub enable_summary_embedding: bool,
    pub is_active: bool,
}

impl TenantProfile {
    /// Profile for a tenant created on first use from service defaults
    pub fn with_defaults(name: &str, defaults: &LlmConfig) -> Self {
        Self {
            id: Uuid::new_v4(),
            name: name.to_string(),
            provider: LlmProvider::from_name(&defaults.default_provider),
            provider_endpoint: Some(defaults.default_endpoint.clone()).filter(|e| !e.is_empty()),
            provider_api_key: defaults.default_api_key.clone(),
            llm_model: defaults.default_model.clone(),
            embedding_model: defaults.default_embedding_model.clone(),
            prompt_family: ModelFamily::infer(&defaults.default_model),
            enable_summary_embedding: true,
            is_active: true,
        }
    }

    /// Graph namespace prefix, e.g. `acme::`
    pub fn namespace(&self) -> String {
        format!("{}{}", self.name, NAMESPACE_SEPARATOR)
    }

    pub fn has_api_key(&self) -> bool {
        self.provider_api_key.as_deref().is_some_and(|k| !k.is_empty())
    }
}

impl From<Tenant> for TenantProfile {
    fn from(model: Tenant) -> Self {
        let prompt_family = model
            .prompt_family
            .as_deref()
            .and_then(|f| f.parse().ok())
            .unwrap_or_else(|| ModelFamily::infer(&model.llm_model));

        Self {
            id: model.id,
            name: model.name,
            provider: LlmProvider::from_name(&model.provider),
            provider_endpoint: model.provider_endpoint,
            provider_api_key: model.provider_api_key,
            llm_model: model.llm_model,
            embedding_model: model.embedding_model,
            prompt_family,
            enable_summary_embedding: model.enable_summary_embedding,
            is_active: model.is_active,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tenant_row(model: &str, family: Option<&str>) -> Tenant {
        let now = chrono::Utc::now();
        Tenant {
            id: Uuid::new_v4(),
            name: "acme".into(),
            provider: "openai".into(),
            provider_endpoint: None,
            provider_api_key: Some("sk-test".into()),
            llm_model: model.into(),
            embedding_model: "text-embedding-3-small".into(),
            prompt_family: family.map(str::to_string),
            enable_summary_embedding: false,
            is_active: true,
            created_at: now.into(),
            updated_at: now.into(),
        }
    }

    #[test]
    fn test_prompt_family_inferred_when_unset() {
        let profile = TenantProfile::from(tenant_row("llama3.1:70b", None));
        assert_eq!(profile.prompt_family, ModelFamily::Llama);
        assert_eq!(profile.provider, LlmProvider::OpenAi);

        let profile = TenantProfile::from(tenant_row("gpt-4o-mini", None));
        assert_eq!(profile.prompt_family, ModelFamily::Other);
    }

    #[test]
    fn test_explicit_prompt_family_wins() {
        let profile = TenantProfile::from(tenant_row("my-llama-finetune", Some("other")));
        assert_eq!(profile.prompt_family, ModelFamily::Other);
    }

    #[test]
    fn test_defaults_and_namespace() {
        let profile = TenantProfile::with_defaults("acme", &LlmConfig::default());
        assert_eq!(profile.provider, LlmProvider::Ollama);
        assert_eq!(profile.llm_model, "llama3.1:8b");
        assert_eq!(profile.prompt_family, ModelFamily::Llama);
        assert_eq!(profile.namespace(), "acme::");
        assert!(!profile.has_api_key());
    }

    #[test]
    fn test_tenant_name_rules() {
        assert!(valid_tenant_name("acme"));
        assert!(valid_tenant_name("acme-eu_2"));
        assert!(!valid_tenant_name(""));
        assert!(!valid_tenant_name("acme::eu"));
        assert!(!valid_tenant_name("acme corp"));
        assert!(!valid_tenant_name(&"a".repeat(65)));
        assert!(!valid_tenant_name("tenants"));
        assert!(valid_tenant_name("tenants-eu"));
    }

    #[test]
    fn test_api_key_never_serialized() {
        let profile = TenantProfile::from(tenant_row("gpt-4o-mini", None));
        let json = serde_json::to_value(&profile).unwrap();
        assert!(json.get("provider_api_key").is_none());
        assert!(profile.has_api_key());
    }
}
