//! Conversation orchestration: everything between "document uploaded" and
//! "mapping ready", built on the assistant client.

pub mod completion;
pub mod extract;
pub mod handlers;

use tracing::warn;

use crate::assistant::{
    prompts, ConversationService, Role, RunOutcome, Turn, DEFAULT_RUN_TIMEOUT,
};
use crate::errors::AppError;
use extract::ExtractedMapping;

/// Lists the thread and runs the Reply Interpreter over it.
pub async fn extract_mapping_from_thread(
    service: &dyn ConversationService,
    thread_id: &str,
) -> Result<Option<ExtractedMapping>, AppError> {
    let turns = service
        .list_turns(thread_id)
        .await
        .map_err(|e| AppError::Assistant(format!("Failed to list conversation: {e}")))?;
    Ok(extract::extract_mapping(&turns))
}

/// Forced-finalization path: asks the assistant for whatever subset of
/// replacements it has, then extracts through the normal contract. A
/// non-completed run yields `None` rather than an error, since the caller is
/// already in a degraded path.
pub async fn request_partial_replacements(
    service: &dyn ConversationService,
    thread_id: &str,
    assistant_id: &str,
) -> Result<Option<ExtractedMapping>, AppError> {
    service
        .send_message(thread_id, prompts::PARTIAL_REPLACEMENTS_REQUEST, &[])
        .await
        .map_err(|e| AppError::Assistant(format!("Failed to send partial request: {e}")))?;

    let outcome = service
        .run_and_await(thread_id, assistant_id, DEFAULT_RUN_TIMEOUT)
        .await
        .map_err(|e| AppError::Assistant(format!("Partial-replacements run failed: {e}")))?;

    match outcome {
        RunOutcome::Completed => extract_mapping_from_thread(service, thread_id).await,
        other => {
            warn!("Partial-replacements run did not complete: {other:?}");
            Ok(None)
        }
    }
}

/// Maps a non-completed run outcome onto the error taxonomy. Rate limits and
/// timeouts stay distinct so the client can retry them.
pub fn ensure_completed(outcome: RunOutcome) -> Result<(), AppError> {
    match outcome {
        RunOutcome::Completed => Ok(()),
        RunOutcome::RateLimited { message, wait_secs } => {
            Err(AppError::RateLimited { message, wait_secs })
        }
        RunOutcome::Timeout => Err(AppError::Timeout(
            "The document analysis is taking longer than expected. Please try again in a moment."
                .to_string(),
        )),
        RunOutcome::Failed { message } => Err(AppError::Assistant(message)),
        RunOutcome::Cancelled => Err(AppError::Assistant("Run was cancelled".to_string())),
        RunOutcome::Expired => Err(AppError::Assistant("Run expired".to_string())),
    }
}

/// The newest assistant turn's text.
pub fn latest_assistant_text(turns: &[Turn]) -> Option<String> {
    turns
        .iter()
        .rev()
        .find(|t| t.is_assistant())
        .map(|t| t.text.clone())
}

pub fn user_turn_count(turns: &[Turn]) -> usize {
    turns.iter().filter(|t| t.role == Role::User).count()
}
