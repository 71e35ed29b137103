//! Callback payload resolution.
//!
//! The workflow engine's completion POST has no contractually fixed shape —
//! several historical integrations put the interesting fields at the top
//! level, under `data`, or under `output.data`. Resolution is a pair of
//! ordered rule tables (first match wins) so the probing stays data-driven
//! and testable apart from the HTTP handler.

use serde_json::Value;
use tracing::warn;

use crate::generation::assemble::{assemble_markup, PitchSections};

/// Correlation-id probes, in priority order.
const ID_PATHS: &[(&str, &[&str])] = &[
    ("input-variables", &["input_variables", "id_unique"]),
    ("output-data", &["output", "data", "id_unique"]),
    ("data", &["data", "id_unique"]),
    ("top-level", &["id_unique"]),
    ("request-id", &["requestId"]),
    ("pitch-id", &["pitch_id"]),
];

/// Roots a named output field may sit under, in priority order.
const CONTENT_ROOTS: &[&[&str]] = &[&[], &["data"], &["output", "data"]];

/// What a callback delivered, routed to the column it belongs in.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResolvedContent {
    /// Markup destined for `pitch_content`; completion also finalizes status.
    Pitch(String),
    /// Plain text destined for `ai_guidance`.
    Guidance(String),
}

/// Walks the id rule table and returns the first correlation identifier found.
pub fn resolve_correlation_id(payload: &Value) -> Option<String> {
    for (_name, path) in ID_PATHS {
        if let Some(id) = string_at(payload, path) {
            return Some(id);
        }
    }
    None
}

/// Walks the content rule table and returns the first produced content found.
///
/// Priority: a finished "Final Pitch" string, then a sectioned
/// "Integration Prompt" JSON document (reassembled into paragraph markup),
/// then an "AI Guidance" text field.
pub fn resolve_content(payload: &Value) -> Option<ResolvedContent> {
    if let Some(text) = field_at_any_root(payload, "Final Pitch") {
        return Some(ResolvedContent::Pitch(text));
    }

    if let Some(raw) = field_at_any_root(payload, "Integration Prompt") {
        match serde_json::from_str::<PitchSections>(&raw) {
            Ok(sections) => return Some(ResolvedContent::Pitch(assemble_markup(&sections))),
            Err(e) => {
                // Fall through to the remaining rules rather than failing the
                // whole callback on one malformed field.
                warn!("Integration Prompt field is not valid JSON: {e}");
            }
        }
    }

    field_at_any_root(payload, "AI Guidance").map(ResolvedContent::Guidance)
}

fn field_at_any_root(payload: &Value, field: &str) -> Option<String> {
    for root in CONTENT_ROOTS {
        let mut path: Vec<&str> = root.to_vec();
        path.push(field);
        if let Some(text) = string_at(payload, &path) {
            return Some(text);
        }
    }
    None
}

/// Reads a nested field as a string. Numbers are accepted and stringified —
/// one engine revision sent numeric ids.
fn string_at(payload: &Value, path: &[&str]) -> Option<String> {
    let mut current = payload;
    for key in path {
        current = current.get(key)?;
    }
    match current {
        Value::String(s) if !s.trim().is_empty() => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}
