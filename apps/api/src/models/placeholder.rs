use serde::{Deserialize, Serialize};

/// A placeholder advertised by the document-analysis assistant.
///
/// `name` is the semantic identifier used as the replacement-mapping key;
/// `literal` is the exact delimiter-inclusive text as it appears in the
/// document (e.g. `[CLIENT_NAME]`), when the assistant reported one. Older
/// reply formats used `semantic_name` for the identifier, so both keys are
/// accepted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlaceholderDescriptor {
    #[serde(alias = "semantic_name")]
    pub name: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub literal: Option<String>,

    /// Advisory value kind ("string", "date", ...). Never validated.
    #[serde(default, rename = "type", skip_serializing_if = "Option::is_none")]
    pub value_type: Option<String>,

    /// Human description of what the placeholder means in this document.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub context: Option<String>,
}
