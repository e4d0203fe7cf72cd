use std::sync::Arc;

use crate::assistant::ConversationService;
use crate::sessions::SessionStore;

/// Shared application state injected into all route handlers via Axum extractors.
#[derive(Clone)]
pub struct AppState {
    pub sessions: SessionStore,
    /// Pluggable conversational service. A trait object so handlers can be
    /// exercised against a scripted fake.
    pub assistant: Arc<dyn ConversationService>,
}
