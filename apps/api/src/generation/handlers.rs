//! Axum route handlers for document generation and delivery.

use axum::{
    extract::{Path, Query, State},
    http::header,
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::conversation::{extract_mapping_from_thread, request_partial_replacements};
use crate::docx::{fill, DocxDocument};
use crate::errors::AppError;
use crate::state::AppState;

const SESSION_NOT_FOUND: &str = "Session not found";
const DOCX_CONTENT_TYPE: &str =
    "application/vnd.openxmlformats-officedocument.wordprocessingml.document";

// ────────────────────────────────────────────────────────────────────────────
// Request / Response types
// ────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
pub struct CompleteDocumentQuery {
    pub session_id: Uuid,
    /// Proceed even with a partial (or empty) mapping.
    #[serde(default)]
    pub force: bool,
}

#[derive(Debug, Serialize)]
pub struct CompleteDocumentResponse {
    pub session_id: Uuid,
    pub completed_text: String,
    pub download_url: String,
    /// Echoed so the client can highlight what changed.
    pub replacements: Map<String, Value>,
}

// ────────────────────────────────────────────────────────────────────────────
// Handlers
// ────────────────────────────────────────────────────────────────────────────

/// POST /complete-document?session_id=...&force=...
///
/// Finalization: freezes the replacement mapping and applies it to the
/// template. Falls back to re-extracting from the thread when the session has
/// no stored mapping, and with `force` asks the assistant for whatever
/// partial mapping it has. Zero substitutions is a warning, not an error;
/// the document is still produced.
pub async fn handle_complete_document(
    State(state): State<AppState>,
    Query(query): Query<CompleteDocumentQuery>,
) -> Result<Json<CompleteDocumentResponse>, AppError> {
    let session = state
        .sessions
        .get(query.session_id)
        .await
        .ok_or_else(|| AppError::NotFound(SESSION_NOT_FOUND.to_string()))?;
    let mut session = session.lock().await;

    let service = state.assistant.as_ref();

    if session.replacements.is_empty() || session.placeholders.is_empty() {
        debug!("No stored mapping; re-extracting from thread {}", session.thread_id);
        let mut mapping = extract_mapping_from_thread(service, &session.thread_id).await?;

        if mapping.is_none() && query.force {
            info!("Force mode: requesting partial replacements from the assistant");
            mapping =
                request_partial_replacements(service, &session.thread_id, &session.assistant_id)
                    .await?;
        }

        if let Some(mapping) = mapping {
            session.replacements = mapping.replacements;
            if !mapping.placeholders.is_empty() {
                session.placeholders = mapping.placeholders;
            }
        }
    }

    if session.replacements.is_empty() && !query.force {
        return Err(AppError::Validation(
            "No replacements found. Please complete the conversation first.".to_string(),
        ));
    }

    debug!(
        "Applying replacements: {:?}",
        session.replacements.keys().collect::<Vec<_>>()
    );

    let mut doc = DocxDocument::load(&session.template)?;
    let applied = fill::apply(&mut doc, &session.replacements, &session.placeholders);

    if applied == 0 {
        warn!(
            "No replacements were applied; placeholder forms likely do not match the document \
             (keys: {:?})",
            session.replacements.keys().collect::<Vec<_>>()
        );
    } else {
        info!("Applied {applied} substitutions");
    }

    let target = session.completed_target();
    doc.save(&target)?;
    let completed_text = doc.body_text();

    session.is_complete = true;
    session.completed_path = Some(target);
    session.completed_text = Some(completed_text.clone());

    Ok(Json(CompleteDocumentResponse {
        session_id: query.session_id,
        completed_text,
        download_url: format!("/download/{}", query.session_id),
        replacements: session.replacements.clone(),
    }))
}

/// GET /document/:session_id
///
/// The original uploaded template, for preview.
pub async fn handle_get_document(
    State(state): State<AppState>,
    Path(session_id): Path<Uuid>,
) -> Result<Response, AppError> {
    let session = state
        .sessions
        .get(session_id)
        .await
        .ok_or_else(|| AppError::NotFound(SESSION_NOT_FOUND.to_string()))?;
    let session = session.lock().await;

    let bytes = tokio::fs::read(&session.template)
        .await
        .map_err(|_| AppError::NotFound("Document file not found".to_string()))?;
    Ok(docx_response(bytes, "document.docx"))
}

/// GET /download/:session_id
///
/// The completed document; 404 until generation has run.
pub async fn handle_download(
    State(state): State<AppState>,
    Path(session_id): Path<Uuid>,
) -> Result<Response, AppError> {
    let session = state
        .sessions
        .get(session_id)
        .await
        .ok_or_else(|| AppError::NotFound(SESSION_NOT_FOUND.to_string()))?;
    let session = session.lock().await;

    let path = session
        .completed_path
        .as_ref()
        .ok_or_else(|| AppError::NotFound("Document not generated yet".to_string()))?;
    let bytes = tokio::fs::read(path)
        .await
        .map_err(|_| AppError::NotFound("Completed document file not found".to_string()))?;
    Ok(docx_response(bytes, "completed_document.docx"))
}

fn docx_response(bytes: Vec<u8>, filename: &str) -> Response {
    (
        [
            (header::CONTENT_TYPE, DOCX_CONTENT_TYPE.to_string()),
            (
                header::CONTENT_DISPOSITION,
                format!("attachment; filename=\"{filename}\""),
            ),
        ],
        bytes,
    )
        .into_response()
}

#[cfg(test)]
mod tests {
    use std::io::Write;
    use std::sync::Arc;

    use serde_json::json;
    use zip::write::SimpleFileOptions;
    use zip::ZipWriter;

    use crate::assistant::{Role, Turn};
    use crate::conversation::test_support::ScriptedService;
    use crate::models::placeholder::PlaceholderDescriptor;
    use crate::sessions::{Session, SessionStore};

    use super::*;

    const TEMPLATE_XML: &str = r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?><w:document xmlns:w="http://schemas.openxmlformats.org/wordprocessingml/2006/main"><w:body><w:p><w:r><w:rPr><w:b/></w:rPr><w:t>This agreement is between [CLIENT</w:t></w:r><w:r><w:t>_NAME] and the provider.</w:t></w:r></w:p></w:body></w:document>"#;

    fn template_file() -> tempfile::TempPath {
        let mut zip = ZipWriter::new(std::io::Cursor::new(Vec::new()));
        let options = SimpleFileOptions::default();
        zip.start_file("[Content_Types].xml", options).unwrap();
        zip.write_all(br#"<?xml version="1.0"?><Types xmlns="http://schemas.openxmlformats.org/package/2006/content-types"/>"#)
            .unwrap();
        zip.start_file("word/document.xml", options).unwrap();
        zip.write_all(TEMPLATE_XML.as_bytes()).unwrap();
        let bytes = zip.finish().unwrap().into_inner();

        let mut tmp = tempfile::Builder::new()
            .suffix(".docx")
            .tempfile()
            .unwrap();
        tmp.write_all(&bytes).unwrap();
        tmp.into_temp_path()
    }

    fn state_with(service: ScriptedService) -> AppState {
        AppState {
            sessions: SessionStore::new(),
            assistant: Arc::new(service),
        }
    }

    async fn seeded_session(state: &AppState) -> Uuid {
        state
            .sessions
            .insert(Session::new(
                Uuid::new_v4(),
                template_file(),
                "file-1".to_string(),
                "asst-1".to_string(),
                "thread-1".to_string(),
                Vec::new(),
            ))
            .await
    }

    #[tokio::test]
    async fn test_complete_document_applies_stored_mapping() {
        let state = state_with(ScriptedService::with_turns(Vec::new()));
        let session_id = seeded_session(&state).await;
        {
            let session = state.sessions.get(session_id).await.unwrap();
            let mut session = session.lock().await;
            session.replacements.insert(
                "CLIENT_NAME".to_string(),
                json!("John Doe"),
            );
            session.placeholders = vec![PlaceholderDescriptor {
                name: "CLIENT_NAME".to_string(),
                literal: Some("[CLIENT_NAME]".to_string()),
                value_type: None,
                context: None,
            }];
        }

        let response = handle_complete_document(
            State(state.clone()),
            Query(CompleteDocumentQuery {
                session_id,
                force: false,
            }),
        )
        .await
        .unwrap();

        assert_eq!(
            response.0.completed_text,
            "This agreement is between John Doe and the provider."
        );
        assert_eq!(response.0.download_url, format!("/download/{session_id}"));

        // The saved file reloads with the substitution in place.
        let session = state.sessions.get(session_id).await.unwrap();
        let session = session.lock().await;
        let saved = DocxDocument::load(session.completed_path.as_ref().unwrap()).unwrap();
        assert!(saved.body_text().contains("John Doe"));
    }

    #[tokio::test]
    async fn test_complete_document_extracts_mapping_from_thread() {
        let service = ScriptedService::with_turns(vec![
            Turn {
                role: Role::User,
                text: "John Doe".to_string(),
            },
            Turn {
                role: Role::Assistant,
                text: r#"{"placeholders":[{"name":"CLIENT_NAME","literal":"[CLIENT_NAME]"}],"replacements":{"CLIENT_NAME":"John Doe"}}"#.to_string(),
            },
        ]);
        let state = state_with(service);
        let session_id = seeded_session(&state).await;

        let response = handle_complete_document(
            State(state),
            Query(CompleteDocumentQuery {
                session_id,
                force: false,
            }),
        )
        .await
        .unwrap();
        assert!(response.0.completed_text.contains("John Doe"));
        assert_eq!(response.0.replacements.len(), 1);
    }

    #[tokio::test]
    async fn test_complete_document_without_mapping_rejected_unless_forced() {
        let service = ScriptedService::with_turns(vec![Turn {
            role: Role::Assistant,
            text: "Still asking questions.".to_string(),
        }]);
        let state = state_with(service);
        let session_id = seeded_session(&state).await;

        let err = handle_complete_document(
            State(state),
            Query(CompleteDocumentQuery {
                session_id,
                force: false,
            }),
        )
        .await
        .unwrap_err();
        assert!(matches!(err, AppError::Validation(_)));
    }

    #[tokio::test]
    async fn test_complete_document_forced_with_empty_mapping_still_saves() {
        // The assistant has nothing usable even when asked for partials;
        // force mode proceeds with an empty mapping.
        let mut service = ScriptedService::with_turns(vec![Turn {
            role: Role::Assistant,
            text: "Still asking questions.".to_string(),
        }]);
        service.next_reply = Some("I cannot provide replacements yet.".to_string());
        let state = state_with(service);
        let session_id = seeded_session(&state).await;

        let response = handle_complete_document(
            State(state.clone()),
            Query(CompleteDocumentQuery {
                session_id,
                force: true,
            }),
        )
        .await
        .unwrap();

        // Zero substitutions: the template text survives untouched.
        assert!(response.0.completed_text.contains("[CLIENT_NAME]"));
        assert!(response.0.replacements.is_empty());

        let session = state.sessions.get(session_id).await.unwrap();
        let session = session.lock().await;
        assert!(session.completed_path.is_some());
    }

    #[tokio::test]
    async fn test_download_before_generation_is_not_found() {
        let state = state_with(ScriptedService::with_turns(Vec::new()));
        let session_id = seeded_session(&state).await;

        let err = handle_download(State(state), Path(session_id))
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::NotFound(_)));
    }

    #[tokio::test]
    async fn test_get_document_serves_template_bytes() {
        let state = state_with(ScriptedService::with_turns(Vec::new()));
        let session_id = seeded_session(&state).await;

        let response = handle_get_document(State(state), Path(session_id))
            .await
            .unwrap();
        assert_eq!(
            response.headers().get(header::CONTENT_TYPE).unwrap(),
            DOCX_CONTENT_TYPE
        );
    }
}
