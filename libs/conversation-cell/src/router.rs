// libs/conversation-cell/src/router.rs
use std::sync::Arc;

use axum::{routing::post, Router};

use crate::handlers;
use crate::services::engine::ConversationEngine;

pub fn conversation_routes(engine: Arc<ConversationEngine>) -> Router {
    Router::new()
        .route("/messages", post(handlers::receive_message))
        .with_state(engine)
}
