//! API handlers module

pub mod conversations;
pub mod health;
pub mod tenants;

use hybridrag_common::errors::{AppError, Result};
use hybridrag_common::tenant::valid_tenant_name;
use validator::Validate;

/// Reject tenant names that cannot serve as a graph namespace
pub(crate) fn check_tenant_name(name: &str) -> Result<()> {
    if valid_tenant_name(name) {
        Ok(())
    } else {
        Err(AppError::Validation {
            message: format!(
                "invalid tenant name '{}': use 1-64 of [A-Za-z0-9_-], not a reserved name",
                name
            ),
            field: Some("tenant".to_string()),
        })
    }
}

/// Run `validator` rules, mapping failures to a 400
pub(crate) fn validate_request<T: Validate>(request: &T) -> Result<()> {
    request.validate().map_err(|e| AppError::Validation {
        message: e.to_string(),
        field: None,
    })
}
