//! Heuristic detector for "the conversation has gathered everything".

/// Phrases the assistant is instructed to emit when it has every value.
/// Substring-matched case-insensitively; a heuristic, not a guarantee.
const COMPLETION_PHRASES: &[&str] = &[
    "i have all the information needed",
    "let me complete the document now",
    "i have enough information",
    "complete the document",
];

/// True when the latest assistant reply declares the conversation complete.
///
/// Always false before the user has said anything: assistants sometimes
/// declare victory in their very first analysis message, and that must not
/// finalize the document.
pub fn is_complete(latest_assistant_text: &str, user_turn_count: usize) -> bool {
    if user_turn_count == 0 {
        return false;
    }
    let lowered = latest_assistant_text.to_lowercase();
    COMPLETION_PHRASES.iter().any(|p| lowered.contains(p))
}
