// libs/conversation-cell/src/handlers.rs
use std::sync::Arc;

use axum::{extract::State, Json};
use serde_json::{json, Value};

use shared_models::error::AppError;

use crate::models::{ConversationError, InboundMessage};
use crate::services::engine::ConversationEngine;

impl From<ConversationError> for AppError {
    fn from(error: ConversationError) -> Self {
        match error {
            ConversationError::Appointment(e) => e.into(),
            ConversationError::Availability(e) => e.into(),
            ConversationError::InvalidMessage(msg) => AppError::BadRequest(msg),
            ConversationError::SessionStore(msg) => AppError::ExternalService(msg),
            ConversationError::Template(_) | ConversationError::RedirectLoop(_) => {
                AppError::Internal(error.to_string())
            }
        }
    }
}

/// Provider-neutral inbound webhook. Replies go out through the configured
/// sender; the body echoes them for the gateway's logs.
#[axum::debug_handler]
pub async fn receive_message(
    State(engine): State<Arc<ConversationEngine>>,
    Json(message): Json<InboundMessage>,
) -> Result<Json<Value>, AppError> {
    let report = engine.handle(message).await?;

    Ok(Json(json!({
        "success": true,
        "state": report.state,
        "silenced": report.silenced,
        "messages": report.messages
    })))
}
