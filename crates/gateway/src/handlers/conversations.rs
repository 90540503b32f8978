//! Conversation handlers

use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use serde::{Deserialize, Serialize};
use validator::Validate;

use super::{check_tenant_name, validate_request};
use crate::AppState;
use hybridrag_common::errors::{AppError, Result};

/// A user message for the tenant's assistant
#[derive(Debug, Deserialize, Validate)]
pub struct ConversationRequest {
    #[validate(length(min = 1, max = 256))]
    pub user_id: String,

    #[validate(length(min = 1, max = 16000))]
    pub message: String,
}

#[derive(Debug, Serialize)]
pub struct ConversationResponse {
    pub message: String,
}

fn check_request(request: &ConversationRequest) -> Result<()> {
    validate_request(request)?;
    if request.message.trim().is_empty() {
        return Err(AppError::Validation {
            message: "message must not be blank".to_string(),
            field: Some("message".to_string()),
        });
    }
    if request.user_id.trim().is_empty() {
        return Err(AppError::Validation {
            message: "user_id must not be blank".to_string(),
            field: Some("user_id".to_string()),
        });
    }
    Ok(())
}

/// Answer a message within the user's conversation
pub async fn converse(
    State(state): State<AppState>,
    Path(tenant): Path<String>,
    Json(request): Json<ConversationRequest>,
) -> Result<Json<ConversationResponse>> {
    check_tenant_name(&tenant)?;
    check_request(&request)?;

    let answer = state
        .conversations
        .respond(&tenant, &request.user_id, &request.message)
        .await?;

    Ok(Json(ConversationResponse { message: answer }))
}

/// Forget a user's conversation
pub async fn reset(
    State(state): State<AppState>,
    Path((tenant, user_id)): Path<(String, String)>,
) -> Result<StatusCode> {
    check_tenant_name(&tenant)?;
    state.conversations.reset(&tenant, &user_id).await?;
    Ok(StatusCode::ACCEPTED)
}
