//! Axum route handlers for upload, conversation turns, and session lifecycle.

use std::io::Write;

use axum::{
    extract::{Multipart, Path, State},
    http::StatusCode,
    Json,
};
use anyhow::Context;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};
use uuid::Uuid;

use crate::assistant::{prompts, DEFAULT_RUN_TIMEOUT};
use crate::conversation::{
    completion, ensure_completed, extract, latest_assistant_text, user_turn_count,
};
use crate::errors::AppError;
use crate::models::placeholder::PlaceholderDescriptor;
use crate::sessions::Session;
use crate::state::AppState;

const SESSION_NOT_FOUND: &str = "Session not found";
const DOCX_EXTENSION: &str = ".docx";

// ────────────────────────────────────────────────────────────────────────────
// Request / Response types
// ────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Serialize)]
pub struct UploadResponse {
    pub session_id: Uuid,
    pub placeholders: Vec<PlaceholderDescriptor>,
    pub message: String,
}

#[derive(Debug, Deserialize)]
pub struct AskQuestionRequest {
    pub session_id: Uuid,
    #[serde(default)]
    pub message: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct AskQuestionResponse {
    pub message: String,
    pub is_complete: bool,
    pub session_id: Uuid,
    pub placeholders_filled: Vec<String>,
}

#[derive(Debug, Serialize)]
pub struct SessionStatusResponse {
    pub session_id: Uuid,
    pub is_complete: bool,
    pub placeholders: Vec<PlaceholderDescriptor>,
    pub placeholders_filled: Vec<String>,
    pub has_completed_document: bool,
    pub completed_text: Option<String>,
    pub created_at: chrono::DateTime<chrono::Utc>,
}

// ────────────────────────────────────────────────────────────────────────────
// Handlers
// ────────────────────────────────────────────────────────────────────────────

/// POST /upload
///
/// Accepts a multipart DOCX template, hands it to the conversational service
/// for analysis, and opens a session around the resulting thread.
pub async fn handle_upload(
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> Result<Json<UploadResponse>, AppError> {
    let mut file_name = None;
    let mut content = None;
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| AppError::Validation(format!("Invalid multipart payload: {e}")))?
    {
        if field.name() == Some("file") {
            file_name = field.file_name().map(str::to_string);
            content = Some(
                field
                    .bytes()
                    .await
                    .map_err(|e| AppError::Validation(format!("Failed to read upload: {e}")))?,
            );
            break;
        }
    }

    let content = content.ok_or_else(|| AppError::Validation("Missing 'file' field".to_string()))?;
    let file_name = file_name.unwrap_or_else(|| format!("document{DOCX_EXTENSION}"));
    if !file_name.to_lowercase().ends_with(DOCX_EXTENSION) {
        return Err(AppError::Validation(format!(
            "Only {DOCX_EXTENSION} files are supported"
        )));
    }

    // Keep the template on disk for the substitution pass at finalization.
    let mut tmp = tempfile::Builder::new()
        .suffix(DOCX_EXTENSION)
        .tempfile()
        .context("Failed to create temp file")?;
    tmp.write_all(&content).context("Failed to persist upload")?;
    let template = tmp.into_temp_path();

    let service = state.assistant.as_ref();
    let file_id = service
        .upload_file(&template, &file_name)
        .await
        .map_err(|e| AppError::Assistant(format!("File upload failed: {e}")))?;
    let assistant_id = service
        .create_assistant()
        .await
        .map_err(|e| AppError::Assistant(format!("Assistant creation failed: {e}")))?;
    let thread_id = service
        .create_thread()
        .await
        .map_err(|e| AppError::Assistant(format!("Thread creation failed: {e}")))?;

    service
        .send_message(
            &thread_id,
            prompts::INITIAL_ANALYSIS_MESSAGE,
            std::slice::from_ref(&file_id),
        )
        .await
        .map_err(|e| AppError::Assistant(format!("Failed to send analysis request: {e}")))?;

    let outcome = service
        .run_and_await(&thread_id, &assistant_id, DEFAULT_RUN_TIMEOUT)
        .await
        .map_err(|e| AppError::Assistant(format!("Analysis run failed: {e}")))?;
    ensure_completed(outcome)?;

    let turns = service
        .list_turns(&thread_id)
        .await
        .map_err(|e| AppError::Assistant(format!("Failed to list conversation: {e}")))?;
    let message = latest_assistant_text(&turns)
        .ok_or_else(|| AppError::Assistant("No response from assistant".to_string()))?;

    // The first reply may already advertise descriptors; if not, they arrive
    // with the final mapping.
    let placeholders = extract::extract_placeholders(&message);

    let session = Session::new(
        Uuid::new_v4(),
        template,
        file_id,
        assistant_id,
        thread_id,
        placeholders.clone(),
    );
    let session_id = state.sessions.insert(session).await;
    info!(
        "Session {session_id} created ({} advertised placeholders)",
        placeholders.len()
    );

    Ok(Json(UploadResponse {
        session_id,
        placeholders,
        message,
    }))
}

/// POST /ask-question
///
/// One conversation turn: forwards the user's message (if any), awaits the
/// assistant, and checks whether the conversation has everything it needs.
pub async fn handle_ask_question(
    State(state): State<AppState>,
    Json(request): Json<AskQuestionRequest>,
) -> Result<Json<AskQuestionResponse>, AppError> {
    let session = state
        .sessions
        .get(request.session_id)
        .await
        .ok_or_else(|| AppError::NotFound(SESSION_NOT_FOUND.to_string()))?;
    let mut session = session.lock().await;

    let service = state.assistant.as_ref();
    if let Some(message) = request.message.as_deref().filter(|m| !m.trim().is_empty()) {
        service
            .send_message(&session.thread_id, message, &[])
            .await
            .map_err(|e| AppError::Assistant(format!("Failed to send message: {e}")))?;
    }

    let outcome = service
        .run_and_await(&session.thread_id, &session.assistant_id, DEFAULT_RUN_TIMEOUT)
        .await
        .map_err(|e| AppError::Assistant(format!("Assistant run failed: {e}")))?;
    ensure_completed(outcome)?;

    let turns = service
        .list_turns(&session.thread_id)
        .await
        .map_err(|e| AppError::Assistant(format!("Failed to list conversation: {e}")))?;
    let mut message = latest_assistant_text(&turns)
        .ok_or_else(|| AppError::Assistant("No response from assistant".to_string()))?;

    let is_complete = completion::is_complete(&message, user_turn_count(&turns));

    let mut placeholders_filled = Vec::new();
    if is_complete {
        if let Some(mapping) = extract::extract_mapping(&turns) {
            placeholders_filled = mapping.replacements.keys().cloned().collect();
            session.replacements = mapping.replacements;
            if !mapping.placeholders.is_empty() {
                session.placeholders = mapping.placeholders;
            }
        }
        session.is_complete = true;
        // Users get a status line instead of the raw JSON payload.
        message = "Perfect! I have all the information I need. \
                   Generating your completed document now..."
            .to_string();
    }

    Ok(Json(AskQuestionResponse {
        message,
        is_complete,
        session_id: request.session_id,
        placeholders_filled,
    }))
}

/// GET /session/:session_id
///
/// Current session state, for clients re-syncing after a reload.
pub async fn handle_session_status(
    State(state): State<AppState>,
    Path(session_id): Path<Uuid>,
) -> Result<Json<SessionStatusResponse>, AppError> {
    let session = state
        .sessions
        .get(session_id)
        .await
        .ok_or_else(|| AppError::NotFound(SESSION_NOT_FOUND.to_string()))?;
    let session = session.lock().await;

    Ok(Json(SessionStatusResponse {
        session_id,
        is_complete: session.is_complete,
        placeholders: session.placeholders.clone(),
        placeholders_filled: session.replacements.keys().cloned().collect(),
        has_completed_document: session.completed_path.is_some(),
        completed_text: session.completed_text.clone(),
        created_at: session.created_at,
    }))
}

/// DELETE /session/:session_id
///
/// Explicit teardown: drops the session (removing the temp template with it),
/// deletes the generated document, and best-effort releases the upstream
/// file and assistant resources.
pub async fn handle_delete_session(
    State(state): State<AppState>,
    Path(session_id): Path<Uuid>,
) -> Result<StatusCode, AppError> {
    let session = state
        .sessions
        .remove(session_id)
        .await
        .ok_or_else(|| AppError::NotFound(SESSION_NOT_FOUND.to_string()))?;
    let session = session.lock().await;

    if let Err(e) = state.assistant.delete_file(&session.file_id).await {
        warn!("Failed to delete upstream file {}: {e}", session.file_id);
    }
    if let Err(e) = state.assistant.delete_assistant(&session.assistant_id).await {
        warn!(
            "Failed to delete upstream assistant {}: {e}",
            session.assistant_id
        );
    }
    if let Some(path) = &session.completed_path {
        if let Err(e) = std::fs::remove_file(path) {
            warn!("Failed to remove completed document: {e}");
        }
    }

    info!("Session {session_id} removed");
    Ok(StatusCode::NO_CONTENT)
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use axum::extract::{Path, State};

    use crate::assistant::{Role, RunOutcome, Turn};
    use crate::conversation::test_support::ScriptedService;
    use crate::sessions::SessionStore;

    use super::*;

    fn turn(role: Role, text: &str) -> Turn {
        Turn {
            role,
            text: text.to_string(),
        }
    }

    fn state_with(service: ScriptedService) -> AppState {
        AppState {
            sessions: SessionStore::new(),
            assistant: Arc::new(service),
        }
    }

    async fn seeded_session(state: &AppState) -> Uuid {
        let template = tempfile::Builder::new()
            .suffix(".docx")
            .tempfile()
            .unwrap()
            .into_temp_path();
        state
            .sessions
            .insert(Session::new(
                Uuid::new_v4(),
                template,
                "file-1".to_string(),
                "asst-1".to_string(),
                "thread-1".to_string(),
                Vec::new(),
            ))
            .await
    }

    #[tokio::test]
    async fn test_ask_question_incomplete_conversation() {
        let mut service = ScriptedService::with_turns(vec![turn(Role::User, "initial analysis")]);
        service.next_reply = Some("What is the client's name?".to_string());
        let state = state_with(service);
        let session_id = seeded_session(&state).await;

        let response = handle_ask_question(
            State(state),
            Json(AskQuestionRequest {
                session_id,
                message: None,
            }),
        )
        .await
        .unwrap();

        assert!(!response.0.is_complete);
        assert_eq!(response.0.message, "What is the client's name?");
        assert!(response.0.placeholders_filled.is_empty());
    }

    #[tokio::test]
    async fn test_ask_question_completion_stores_mapping() {
        let mut service = ScriptedService::with_turns(vec![
            turn(Role::User, "initial analysis"),
            turn(Role::Assistant, "What is the client's name?"),
        ]);
        service.next_reply = Some(
            "I have all the information needed. Let me complete the document now.\n\
             {\"placeholders\":[{\"name\":\"CLIENT_NAME\",\"literal\":\"[CLIENT_NAME]\"}],\
             \"replacements\":{\"CLIENT_NAME\":\"John Doe\"}}"
                .to_string(),
        );
        let state = state_with(service);
        let session_id = seeded_session(&state).await;

        let response = handle_ask_question(
            State(state.clone()),
            Json(AskQuestionRequest {
                session_id,
                message: Some("John Doe".to_string()),
            }),
        )
        .await
        .unwrap();

        assert!(response.0.is_complete);
        assert_eq!(response.0.placeholders_filled, vec!["CLIENT_NAME"]);
        // Raw JSON is replaced with a friendly status message.
        assert!(response.0.message.starts_with("Perfect!"));

        let session = state.sessions.get(session_id).await.unwrap();
        let session = session.lock().await;
        assert!(session.is_complete);
        assert_eq!(session.replacements.len(), 1);
        assert_eq!(session.placeholders.len(), 1);
    }

    #[tokio::test]
    async fn test_ask_question_rate_limited_maps_to_error() {
        let mut service = ScriptedService::with_turns(vec![turn(Role::User, "hi")]);
        service.outcome = RunOutcome::RateLimited {
            message: "slow down".to_string(),
            wait_secs: 4.0,
        };
        let state = state_with(service);
        let session_id = seeded_session(&state).await;

        let err = handle_ask_question(
            State(state),
            Json(AskQuestionRequest {
                session_id,
                message: None,
            }),
        )
        .await
        .unwrap_err();
        assert!(matches!(err, AppError::RateLimited { .. }));
    }

    #[tokio::test]
    async fn test_ask_question_unknown_session() {
        let state = state_with(ScriptedService::with_turns(Vec::new()));
        let err = handle_ask_question(
            State(state),
            Json(AskQuestionRequest {
                session_id: Uuid::new_v4(),
                message: None,
            }),
        )
        .await
        .unwrap_err();
        assert!(matches!(err, AppError::NotFound(_)));
    }

    #[tokio::test]
    async fn test_session_status_reflects_progress() {
        let state = state_with(ScriptedService::with_turns(Vec::new()));
        let session_id = seeded_session(&state).await;

        let status = handle_session_status(State(state.clone()), Path(session_id))
            .await
            .unwrap();
        assert_eq!(status.0.session_id, session_id);
        assert!(!status.0.is_complete);
        assert!(!status.0.has_completed_document);
        assert!(status.0.placeholders_filled.is_empty());
        assert!(status.0.completed_text.is_none());
    }

    #[tokio::test]
    async fn test_delete_session_removes_state() {
        let state = state_with(ScriptedService::with_turns(Vec::new()));
        let session_id = seeded_session(&state).await;

        let status = handle_delete_session(State(state.clone()), Path(session_id))
            .await
            .unwrap();
        assert_eq!(status, StatusCode::NO_CONTENT);
        assert!(state.sessions.get(session_id).await.is_none());
    }
}
