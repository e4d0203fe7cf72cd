//! Placeholder substitution: resolves mapping entries to literal document
//! text and rewrites runs around each match without losing formatting.

use std::collections::HashMap;

use serde_json::{Map, Value};

use super::{BodyElement, DocxDocument, Paragraph, Run};
use crate::models::placeholder::PlaceholderDescriptor;

/// Candidate literal forms for a placeholder name with no known literal,
/// tried in order. Upstream replies are inconsistent about brace count, so
/// both double- and triple-brace conventions are present.
pub fn candidate_forms(name: &str) -> [String; 5] {
    [
        format!("[{name}]"),
        format!("{{{{{name}}}}}"),
        format!("{{{{{{{name}}}}}}}"),
        format!("<{name}>"),
        name.to_string(),
    ]
}

/// Applies a replacement mapping to every paragraph in the document: body
/// paragraphs first in document order, then each table cell's paragraphs.
///
/// For each entry, a descriptor-supplied literal is the only text searched;
/// otherwise the candidate forms are tried and the first one present in the
/// paragraph wins. Returns the total number of substitutions performed. Zero
/// is valid and usually means the upstream literals never matched the
/// document; callers surface it as a warning.
pub fn apply(
    doc: &mut DocxDocument,
    replacements: &Map<String, Value>,
    descriptors: &[PlaceholderDescriptor],
) -> usize {
    let literal_by_name: HashMap<&str, &str> = descriptors
        .iter()
        .filter_map(|d| {
            d.literal
                .as_deref()
                .filter(|l| !l.is_empty())
                .map(|l| (d.name.as_str(), l))
        })
        .collect();

    let mut applied = 0;

    for element in &mut doc.body {
        if let BodyElement::Paragraph(paragraph) = element {
            applied += apply_to_paragraph(paragraph, replacements, &literal_by_name);
        }
    }

    for element in &mut doc.body {
        if let BodyElement::Table(table) = element {
            for row in table.rows_mut() {
                for cell in row.cells_mut() {
                    for paragraph in cell.paragraphs_mut() {
                        applied += apply_to_paragraph(paragraph, replacements, &literal_by_name);
                    }
                }
            }
        }
    }

    applied
}

fn apply_to_paragraph(
    paragraph: &mut Paragraph,
    replacements: &Map<String, Value>,
    literal_by_name: &HashMap<&str, &str>,
) -> usize {
    let mut applied = 0;
    for (name, value) in replacements {
        let replacement = value_text(value);
        match literal_by_name.get(name.as_str()) {
            Some(literal) => {
                if paragraph.text().contains(literal) {
                    split_and_replace(paragraph, literal, &replacement);
                    applied += 1;
                }
            }
            None => {
                for form in candidate_forms(name) {
                    if paragraph.text().contains(&form) {
                        split_and_replace(paragraph, &form, &replacement);
                        applied += 1;
                        break;
                    }
                }
            }
        }
    }
    applied
}

/// Replaces the first occurrence of `literal` in the paragraph, rebuilding
/// the run list as up to three runs: text before the match styled like the
/// first original run, the replacement styled like the run that contained the
/// literal (none if it spanned runs), and text after styled like the last
/// original run.
///
/// Runs rarely align with placeholder boundaries because styling changes
/// mid-sentence split them; a whole-paragraph text replace would drop all of
/// that styling.
pub fn split_and_replace(paragraph: &mut Paragraph, literal: &str, replacement: &str) {
    if literal.is_empty() {
        return;
    }

    let aggregate: String = paragraph.runs().map(|r| r.text.as_str()).collect();
    let Some(index) = aggregate.find(literal) else {
        // The caller's cheaper pre-check and this aggregate can disagree on
        // edge cases; leave the paragraph untouched rather than guess.
        return;
    };

    let runs = paragraph.take_runs();
    let before = &aggregate[..index];
    let after = &aggregate[index + literal.len()..];

    if !before.is_empty() {
        let style = runs.first().map(|r| r.style.clone()).unwrap_or_default();
        paragraph.push_run(Run::new(before, style));
    }

    let source_style = runs
        .iter()
        .find(|r| r.text.contains(literal))
        .map(|r| r.style.clone())
        .unwrap_or_default();
    paragraph.push_run(Run::new(replacement, source_style));

    if !after.is_empty() {
        let style = runs.last().map(|r| r.style.clone()).unwrap_or_default();
        paragraph.push_run(Run::new(after, style));
    }
}

/// Renders a mapping value as document text. Upstream mappings sometimes
/// carry numbers or booleans; `null` becomes empty text rather than a
/// spelled-out artifact.
fn value_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}
