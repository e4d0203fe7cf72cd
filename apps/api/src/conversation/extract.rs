//! Reply Interpreter: recovers a placeholder→value mapping from free-form
//! assistant output.
//!
//! Replies range from clean JSON to JSON buried in prose behind markdown
//! fences to nothing usable at all. The contract is "best available, never
//! raise": every failure path degrades to `None`.

use std::collections::BTreeSet;
use std::sync::OnceLock;

use regex::Regex;
use serde::Deserialize;
use serde_json::{Map, Value};
use tracing::debug;

use crate::assistant::{Role, Turn};
use crate::models::placeholder::PlaceholderDescriptor;

/// The structured payload an assistant emits once the conversation is done.
#[derive(Debug, Clone, Deserialize)]
pub struct ExtractedMapping {
    #[serde(default)]
    pub placeholders: Vec<PlaceholderDescriptor>,
    pub replacements: Map<String, Value>,
}

/// Extracts a replacement mapping from a conversation.
///
/// Only the newest non-empty assistant turn is parsed; when it fails every
/// parse attempt the result is `None` even if an older turn carried a valid
/// mapping. Most-recent wins, and a newer turn without JSON means the
/// assistant walked back its earlier answer.
pub fn extract_mapping(turns: &[Turn]) -> Option<ExtractedMapping> {
    let candidate = turns
        .iter()
        .rev()
        .find(|t| t.is_assistant() && !t.text.trim().is_empty())?;

    if let Some(mapping) = parse_candidate(&candidate.text) {
        debug!(
            "Extracted replacement mapping with {} entries",
            mapping.replacements.len()
        );
        return Some(mapping);
    }

    // Diagnostic only: shows what a mapping might have contained, but a
    // reliable name-to-answer pairing needs the assistant, so nothing is
    // synthesized from it.
    log_heuristic_candidates(turns);
    None
}

/// Strict parse, then best-effort recovery from the first `{` to the last `}`.
fn parse_candidate(text: &str) -> Option<ExtractedMapping> {
    if let Ok(mapping) = serde_json::from_str::<ExtractedMapping>(strip_json_fences(text)) {
        return Some(mapping);
    }

    let start = text.find('{')?;
    let end = text.rfind('}')?;
    if end <= start {
        return None;
    }
    serde_json::from_str(strip_json_fences(&text[start..=end])).ok()
}

/// Pulls the advertised placeholder descriptors out of an assistant reply.
/// Used on the first analysis message, where a mapping does not exist yet.
/// Tolerant: anything unparseable yields an empty list.
pub fn extract_placeholders(text: &str) -> Vec<PlaceholderDescriptor> {
    let Ok(value) = serde_json::from_str::<Value>(strip_json_fences(text)) else {
        return Vec::new();
    };
    value
        .get("placeholders")
        .and_then(|p| serde_json::from_value(p.clone()).ok())
        .unwrap_or_default()
}

/// Strips ```json ... ``` or ``` ... ``` code fences from assistant output.
fn strip_json_fences(text: &str) -> &str {
    let text = text.trim();
    if let Some(stripped) = text.strip_prefix("```json") {
        stripped
            .trim_start()
            .strip_suffix("```")
            .map(|s| s.trim())
            .unwrap_or(stripped.trim_start())
    } else if let Some(stripped) = text.strip_prefix("```") {
        stripped
            .trim_start()
            .strip_suffix("```")
            .map(|s| s.trim())
            .unwrap_or(stripped.trim_start())
    } else {
        text
    }
}

fn log_heuristic_candidates(turns: &[Turn]) {
    let pairs = question_answer_pairs(turns);
    let tokens = mine_placeholder_tokens(turns);
    debug!(
        "No structured mapping found; {} question/answer pairs, placeholder-like tokens: {:?}",
        pairs.len(),
        tokens
    );
}

/// Pairs each assistant turn with the user turn that directly follows it.
fn question_answer_pairs(turns: &[Turn]) -> Vec<(&str, &str)> {
    turns
        .windows(2)
        .filter(|w| w[0].is_assistant() && w[1].role == Role::User)
        .map(|w| (w[0].text.as_str(), w[1].text.as_str()))
        .collect()
}

/// Scans assistant text for placeholder-looking tokens: UPPER_SNAKE
/// identifiers in square brackets, double braces, or parentheses.
fn mine_placeholder_tokens(turns: &[Turn]) -> BTreeSet<String> {
    static TOKEN_RE: OnceLock<Regex> = OnceLock::new();
    let re = TOKEN_RE.get_or_init(|| {
        Regex::new(r"\[([A-Z_]+)\]|\{\{([A-Z_]+)\}\}|\(([A-Z_]+)\)")
            .expect("static pattern compiles")
    });

    let mut tokens = BTreeSet::new();
    for turn in turns.iter().filter(|t| t.is_assistant()) {
        for caps in re.captures_iter(&turn.text) {
            if let Some(m) = caps.get(1).or_else(|| caps.get(2)).or_else(|| caps.get(3)) {
                tokens.insert(m.as_str().to_string());
            }
        }
    }
    tokens
}
