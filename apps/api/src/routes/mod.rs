pub mod health;

use axum::{
    routing::{get, post},
    Router,
};

use crate::conversation::handlers as conversation;
use crate::generation::handlers as generation;
use crate::state::AppState;

pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/", get(health::root_handler))
        .route("/health", get(health::health_handler))
        // Conversation API
        .route("/upload", post(conversation::handle_upload))
        .route("/ask-question", post(conversation::handle_ask_question))
        .route(
            "/session/:session_id",
            get(conversation::handle_session_status)
                .delete(conversation::handle_delete_session),
        )
        // Generation API
        .route(
            "/complete-document",
            post(generation::handle_complete_document),
        )
        .route("/document/:session_id", get(generation::handle_get_document))
        .route("/download/:session_id", get(generation::handle_download))
        .with_state(state)
}
