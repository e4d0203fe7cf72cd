//! In-memory session store.
//!
//! Sessions live exactly as long as the process; there is no persistence by
//! design. The outer `RwLock` guards the map, and each session sits behind
//! its own `Mutex` so at most one request mutates a given session's
//! conversation and document state at a time.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde_json::{Map, Value};
use tempfile::TempPath;
use tokio::sync::{Mutex, RwLock};
use uuid::Uuid;

use crate::models::placeholder::PlaceholderDescriptor;

/// Suffix inserted before the extension of the generated document.
const COMPLETED_SUFFIX: &str = "_completed";

/// One upload-to-download lifecycle: the template document, the upstream
/// conversation handles, and the mapping gathered so far.
pub struct Session {
    pub id: Uuid,
    /// Uploaded template. The temp file is removed when the session drops.
    pub template: TempPath,
    pub file_id: String,
    pub assistant_id: String,
    pub thread_id: String,
    pub placeholders: Vec<PlaceholderDescriptor>,
    pub replacements: Map<String, Value>,
    pub is_complete: bool,
    pub completed_path: Option<PathBuf>,
    pub completed_text: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl Session {
    pub fn new(
        id: Uuid,
        template: TempPath,
        file_id: String,
        assistant_id: String,
        thread_id: String,
        placeholders: Vec<PlaceholderDescriptor>,
    ) -> Self {
        Session {
            id,
            template,
            file_id,
            assistant_id,
            thread_id,
            placeholders,
            replacements: Map::new(),
            is_complete: false,
            completed_path: None,
            completed_text: None,
            created_at: Utc::now(),
        }
    }

    /// Where the generated document goes: same directory and base name as the
    /// template with `_completed` appended before the extension.
    pub fn completed_target(&self) -> PathBuf {
        let path: &std::path::Path = self.template.as_ref();
        let stem = path
            .file_stem()
            .and_then(|s| s.to_str())
            .unwrap_or("document");
        path.with_file_name(format!("{stem}{COMPLETED_SUFFIX}.docx"))
    }
}

/// Process-wide session map as an explicit component with its own
/// concurrency guard, keyed by session id.
#[derive(Clone, Default)]
pub struct SessionStore {
    inner: Arc<RwLock<HashMap<Uuid, Arc<Mutex<Session>>>>>,
}

impl SessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn insert(&self, session: Session) -> Uuid {
        let id = session.id;
        self.inner
            .write()
            .await
            .insert(id, Arc::new(Mutex::new(session)));
        id
    }

    pub async fn get(&self, id: Uuid) -> Option<Arc<Mutex<Session>>> {
        self.inner.read().await.get(&id).cloned()
    }

    pub async fn remove(&self, id: Uuid) -> Option<Arc<Mutex<Session>>> {
        self.inner.write().await.remove(&id)
    }
}
