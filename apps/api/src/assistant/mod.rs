//! Assistant client: the single point of entry for all calls to the
//! conversational document-analysis service.
//!
//! ARCHITECTURAL RULE: No other module may call the upstream API directly.
//! All conversation interactions MUST go through this module.

use std::path::Path;
use std::sync::OnceLock;
use std::time::Duration;

use async_trait::async_trait;
use regex::Regex;
use reqwest::multipart::{Form, Part};
use reqwest::Client;
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use thiserror::Error;
use tokio::time::Instant;
use tracing::{debug, warn};

pub mod prompts;

const API_BASE_URL: &str = "https://api.openai.com/v1";
const BETA_HEADER: &str = "OpenAI-Beta";
const BETA_VERSION: &str = "assistants=v2";
/// The model used for all document-analysis assistants.
/// Intentionally hardcoded to prevent accidental drift.
pub const MODEL: &str = "gpt-4-turbo-preview";

/// Fixed polling cadence while a run is in flight.
const POLL_INTERVAL: Duration = Duration::from_secs(1);
/// Default deadline for `run_and_await`.
pub const DEFAULT_RUN_TIMEOUT: Duration = Duration::from_secs(60);
const MAX_RATE_LIMIT_RETRIES: u32 = 5;
const DEFAULT_RATE_LIMIT_WAIT: f64 = 5.0;

#[derive(Debug, Error)]
pub enum AssistantError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("API error (status {status}): {message}")]
    Api { status: u16, message: String },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// One entry of a conversation thread, in chronological order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Turn {
    pub role: Role,
    pub text: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

impl Turn {
    pub fn is_assistant(&self) -> bool {
        self.role == Role::Assistant
    }
}

/// Terminal result of awaiting an assistant run. Rate limiting and timeouts
/// are distinct from generic failure so callers can retry them.
#[derive(Debug, Clone, PartialEq)]
pub enum RunOutcome {
    Completed,
    Failed { message: String },
    RateLimited { message: String, wait_secs: f64 },
    Timeout,
    Cancelled,
    Expired,
}

/// The conversational document-analysis service the core depends on.
/// Implemented by `OpenAiAssistantClient`; a trait object so handlers can be
/// exercised against a scripted fake.
#[async_trait]
pub trait ConversationService: Send + Sync {
    async fn upload_file(&self, path: &Path, file_name: &str) -> Result<String, AssistantError>;

    async fn create_assistant(&self) -> Result<String, AssistantError>;

    async fn create_thread(&self) -> Result<String, AssistantError>;

    async fn send_message(
        &self,
        thread_id: &str,
        text: &str,
        file_ids: &[String],
    ) -> Result<(), AssistantError>;

    /// Starts a run and polls it to a terminal state, bounded by `timeout`.
    async fn run_and_await(
        &self,
        thread_id: &str,
        assistant_id: &str,
        timeout: Duration,
    ) -> Result<RunOutcome, AssistantError>;

    /// Returns the thread's turns in chronological order.
    async fn list_turns(&self, thread_id: &str) -> Result<Vec<Turn>, AssistantError>;

    async fn delete_file(&self, file_id: &str) -> Result<(), AssistantError>;

    async fn delete_assistant(&self, assistant_id: &str) -> Result<(), AssistantError>;
}

// ────────────────────────────────────────────────────────────────────────────
// Wire types
// ────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Serialize)]
struct CreateAssistantRequest<'a> {
    name: &'a str,
    instructions: &'a str,
    model: &'a str,
    tools: Vec<ToolSpec>,
}

#[derive(Debug, Serialize)]
struct ToolSpec {
    #[serde(rename = "type")]
    kind: &'static str,
}

fn file_search_tool() -> ToolSpec {
    ToolSpec {
        kind: "file_search",
    }
}

#[derive(Debug, Serialize)]
struct CreateMessageRequest<'a> {
    role: &'a str,
    content: &'a str,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    attachments: Vec<MessageAttachment<'a>>,
}

#[derive(Debug, Serialize)]
struct MessageAttachment<'a> {
    file_id: &'a str,
    tools: Vec<ToolSpec>,
}

#[derive(Debug, Serialize)]
struct CreateRunRequest<'a> {
    assistant_id: &'a str,
}

#[derive(Debug, Deserialize)]
struct IdResponse {
    id: String,
}

#[derive(Debug, Deserialize)]
struct RunResponse {
    status: String,
    #[serde(default)]
    last_error: Option<LastError>,
}

#[derive(Debug, Default, Deserialize)]
struct LastError {
    #[serde(default)]
    code: String,
    #[serde(default)]
    message: String,
}

#[derive(Debug, Deserialize)]
struct MessageListResponse {
    data: Vec<MessageObject>,
}

#[derive(Debug, Deserialize)]
struct MessageObject {
    role: String,
    #[serde(default)]
    content: Vec<MessageContent>,
}

#[derive(Debug, Deserialize)]
struct MessageContent {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    text: Option<MessageText>,
}

#[derive(Debug, Deserialize)]
struct MessageText {
    value: String,
}

#[derive(Debug, Deserialize)]
struct ApiError {
    error: ApiErrorBody,
}

#[derive(Debug, Deserialize)]
struct ApiErrorBody {
    message: String,
}

// ────────────────────────────────────────────────────────────────────────────
// Client
// ────────────────────────────────────────────────────────────────────────────

/// Client for the upstream assistants API.
#[derive(Clone)]
pub struct OpenAiAssistantClient {
    client: Client,
    api_key: String,
}

impl OpenAiAssistantClient {
    pub fn new(api_key: String) -> Self {
        Self {
            client: Client::builder()
                .timeout(Duration::from_secs(120))
                .build()
                .expect("Failed to build HTTP client"),
            api_key,
        }
    }

    fn request(&self, method: reqwest::Method, path: &str) -> reqwest::RequestBuilder {
        self.client
            .request(method, format!("{API_BASE_URL}{path}"))
            .bearer_auth(&self.api_key)
            .header(BETA_HEADER, BETA_VERSION)
    }

    async fn parse_response<T: DeserializeOwned>(
        response: reqwest::Response,
    ) -> Result<T, AssistantError> {
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            let message = serde_json::from_str::<ApiError>(&body)
                .map(|e| e.error.message)
                .unwrap_or(body);
            return Err(AssistantError::Api {
                status: status.as_u16(),
                message,
            });
        }
        Ok(response.json().await?)
    }

    async fn post_json<T: DeserializeOwned>(
        &self,
        path: &str,
        body: &impl Serialize,
    ) -> Result<T, AssistantError> {
        let response = self
            .request(reqwest::Method::POST, path)
            .json(body)
            .send()
            .await?;
        Self::parse_response(response).await
    }

    async fn get_json<T: DeserializeOwned>(&self, path: &str) -> Result<T, AssistantError> {
        let response = self.request(reqwest::Method::GET, path).send().await?;
        Self::parse_response(response).await
    }

    async fn retrieve_run(
        &self,
        thread_id: &str,
        run_id: &str,
    ) -> Result<RunResponse, AssistantError> {
        self.get_json(&format!("/threads/{thread_id}/runs/{run_id}"))
            .await
    }
}

#[async_trait]
impl ConversationService for OpenAiAssistantClient {
    async fn upload_file(&self, path: &Path, file_name: &str) -> Result<String, AssistantError> {
        let bytes = tokio::fs::read(path).await?;
        let part = Part::bytes(bytes).file_name(file_name.to_string());
        let form = Form::new().text("purpose", "assistants").part("file", part);

        let response = self
            .client
            .post(format!("{API_BASE_URL}/files"))
            .bearer_auth(&self.api_key)
            .multipart(form)
            .send()
            .await?;
        let parsed: IdResponse = Self::parse_response(response).await?;
        Ok(parsed.id)
    }

    async fn create_assistant(&self) -> Result<String, AssistantError> {
        let request = CreateAssistantRequest {
            name: "Document Filler",
            instructions: prompts::ASSISTANT_INSTRUCTIONS,
            model: MODEL,
            tools: vec![file_search_tool()],
        };
        let parsed: IdResponse = self.post_json("/assistants", &request).await?;
        Ok(parsed.id)
    }

    async fn create_thread(&self) -> Result<String, AssistantError> {
        let parsed: IdResponse = self
            .post_json("/threads", &serde_json::json!({}))
            .await?;
        Ok(parsed.id)
    }

    async fn send_message(
        &self,
        thread_id: &str,
        text: &str,
        file_ids: &[String],
    ) -> Result<(), AssistantError> {
        let request = CreateMessageRequest {
            role: "user",
            content: text,
            attachments: file_ids
                .iter()
                .map(|id| MessageAttachment {
                    file_id: id,
                    tools: vec![file_search_tool()],
                })
                .collect(),
        };
        let _: serde_json::Value = self
            .post_json(&format!("/threads/{thread_id}/messages"), &request)
            .await?;
        Ok(())
    }

    async fn run_and_await(
        &self,
        thread_id: &str,
        assistant_id: &str,
        timeout: Duration,
    ) -> Result<RunOutcome, AssistantError> {
        let run: IdResponse = self
            .post_json(
                &format!("/threads/{thread_id}/runs"),
                &CreateRunRequest { assistant_id },
            )
            .await?;

        let deadline = Instant::now() + timeout;
        let mut retries = 0u32;

        while Instant::now() < deadline {
            match self.retrieve_run(thread_id, &run.id).await {
                Ok(state) => {
                    if let Some(outcome) =
                        terminal_outcome(&state.status, state.last_error.as_ref())
                    {
                        return Ok(outcome);
                    }
                    debug!("Run {} still {}", run.id, state.status);
                    retries = 0;
                    tokio::time::sleep(POLL_INTERVAL).await;
                }
                Err(e) => {
                    let text = e.to_string();
                    if is_rate_limit(&text) {
                        let wait_secs = extract_wait_time(&text);
                        if retries < MAX_RATE_LIMIT_RETRIES {
                            retries += 1;
                            warn!(
                                "Rate limit while polling run, waiting {wait_secs:.1}s \
                                 (retry {retries}/{MAX_RATE_LIMIT_RETRIES})"
                            );
                            tokio::time::sleep(Duration::from_secs_f64(wait_secs)).await;
                            continue;
                        }
                        return Ok(RunOutcome::RateLimited {
                            message: text,
                            wait_secs,
                        });
                    }
                    // Transient retrieval errors: keep polling until the deadline.
                    warn!("Error retrieving run: {text}");
                    tokio::time::sleep(POLL_INTERVAL).await;
                }
            }
        }

        Ok(RunOutcome::Timeout)
    }

    async fn list_turns(&self, thread_id: &str) -> Result<Vec<Turn>, AssistantError> {
        let response: MessageListResponse = self
            .get_json(&format!("/threads/{thread_id}/messages?order=asc&limit=100"))
            .await?;
        Ok(response.data.into_iter().map(message_to_turn).collect())
    }

    async fn delete_file(&self, file_id: &str) -> Result<(), AssistantError> {
        let _: serde_json::Value = Self::parse_response(
            self.request(reqwest::Method::DELETE, &format!("/files/{file_id}"))
                .send()
                .await?,
        )
        .await?;
        Ok(())
    }

    async fn delete_assistant(&self, assistant_id: &str) -> Result<(), AssistantError> {
        let _: serde_json::Value = Self::parse_response(
            self.request(
                reqwest::Method::DELETE,
                &format!("/assistants/{assistant_id}"),
            )
            .send()
            .await?,
        )
        .await?;
        Ok(())
    }
}

/// Maps a run status to its terminal outcome, or `None` while still running.
fn terminal_outcome(status: &str, last_error: Option<&LastError>) -> Option<RunOutcome> {
    match status {
        "completed" => Some(RunOutcome::Completed),
        "cancelled" => Some(RunOutcome::Cancelled),
        "expired" => Some(RunOutcome::Expired),
        "failed" => {
            let message = match last_error {
                Some(e) if !e.code.is_empty() => format!("{}: {}", e.code, e.message),
                Some(e) => e.message.clone(),
                None => "unknown error".to_string(),
            };
            if is_rate_limit(&message) {
                Some(RunOutcome::RateLimited {
                    wait_secs: extract_wait_time(&message),
                    message,
                })
            } else {
                Some(RunOutcome::Failed { message })
            }
        }
        _ => None,
    }
}

fn message_to_turn(message: MessageObject) -> Turn {
    let role = if message.role == "assistant" {
        Role::Assistant
    } else {
        Role::User
    };
    let text = message
        .content
        .into_iter()
        .filter(|c| c.kind == "text")
        .filter_map(|c| c.text)
        .map(|t| t.value)
        .collect::<Vec<_>>()
        .join("\n");
    Turn { role, text }
}

fn is_rate_limit(text: &str) -> bool {
    let lower = text.to_lowercase();
    lower.contains("rate_limit") || lower.contains("rate limit") || lower.contains("429")
}

/// Pulls the suggested wait out of a rate-limit error ("try again in 2.5s"),
/// adding a one-second buffer; falls back to a fixed wait when absent.
fn extract_wait_time(error: &str) -> f64 {
    static WAIT_RE: OnceLock<Regex> = OnceLock::new();
    let re = WAIT_RE
        .get_or_init(|| Regex::new(r"try again in ([0-9.]+)s").expect("static pattern compiles"));
    re.captures(&error.to_lowercase())
        .and_then(|c| c.get(1))
        .and_then(|m| m.as_str().parse::<f64>().ok())
        .map(|w| w + 1.0)
        .unwrap_or(DEFAULT_RATE_LIMIT_WAIT)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extract_wait_time_parses_suggestion_with_buffer() {
        let wait = extract_wait_time("Rate limit reached. Please try again in 2.5s.");
        assert!((wait - 3.5).abs() < f64::EPSILON);
    }

    #[test]
    fn test_extract_wait_time_handles_integer_seconds() {
        let wait = extract_wait_time("Error 429: Try again in 12s");
        assert!((wait - 13.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_extract_wait_time_falls_back_when_absent() {
        let wait = extract_wait_time("rate_limit_exceeded");
        assert!((wait - DEFAULT_RATE_LIMIT_WAIT).abs() < f64::EPSILON);
    }

    #[test]
    fn test_is_rate_limit_matches_known_spellings() {
        assert!(is_rate_limit("rate_limit_exceeded"));
        assert!(is_rate_limit("Rate limit reached"));
        assert!(is_rate_limit("API error (status 429): slow down"));
        assert!(!is_rate_limit("server exploded"));
    }

    #[test]
    fn test_terminal_outcome_completed_and_nonterminal() {
        assert_eq!(
            terminal_outcome("completed", None),
            Some(RunOutcome::Completed)
        );
        assert_eq!(terminal_outcome("in_progress", None), None);
        assert_eq!(terminal_outcome("queued", None), None);
    }

    #[test]
    fn test_terminal_outcome_failed_with_rate_limit_code() {
        let err = LastError {
            code: "rate_limit_exceeded".to_string(),
            message: "Please try again in 4s".to_string(),
        };
        match terminal_outcome("failed", Some(&err)) {
            Some(RunOutcome::RateLimited { wait_secs, .. }) => {
                assert!((wait_secs - 5.0).abs() < f64::EPSILON);
            }
            other => panic!("expected RateLimited, got {other:?}"),
        }
    }

    #[test]
    fn test_terminal_outcome_generic_failure() {
        let err = LastError {
            code: "server_error".to_string(),
            message: "boom".to_string(),
        };
        assert_eq!(
            terminal_outcome("failed", Some(&err)),
            Some(RunOutcome::Failed {
                message: "server_error: boom".to_string()
            })
        );
    }

    #[test]
    fn test_message_to_turn_joins_text_blocks_and_maps_role() {
        let message: MessageObject = serde_json::from_str(
            r#"{
                "role": "assistant",
                "content": [
                    {"type": "text", "text": {"value": "Hello"}},
                    {"type": "image_file"},
                    {"type": "text", "text": {"value": "world"}}
                ]
            }"#,
        )
        .unwrap();
        let turn = message_to_turn(message);
        assert!(turn.is_assistant());
        assert_eq!(turn.text, "Hello\nworld");
    }

    #[test]
    fn test_turn_role_serde_round_trip() {
        let turn = Turn {
            role: Role::User,
            text: "hi".to_string(),
        };
        let json = serde_json::to_string(&turn).unwrap();
        assert!(json.contains("\"user\""));
        let back: Turn = serde_json::from_str(&json).unwrap();
        assert_eq!(back, turn);
    }
}
