//! Deterministic archive identifiers.

use crate::catalog::{ManualItem, Source};

const MIN_LEN: usize = 5;
const MAX_LEN: usize = 100;
const SHORT_SUFFIX: &str = "_manual";

/// Reduces `raw` to the archive's identifier alphabet.
///
/// Characters outside `[A-Za-z0-9_-]` become `_`, runs of `_` collapse,
/// leading and trailing `_` are trimmed, `_manual` is appended to results
/// shorter than five characters, and the result is capped at 100 characters.
#[must_use]
pub fn sanitize_identifier(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    for c in raw.chars() {
        let c = if c.is_ascii_alphanumeric() || c == '-' || c == '_' {
            c
        } else {
            '_'
        };
        if c == '_' && out.ends_with('_') {
            continue;
        }
        out.push(c);
    }
    let mut id = out.trim_matches('_').to_string();
    if id.len() < MIN_LEN {
        id.push_str(SHORT_SUFFIX);
    }
    id.truncate(MAX_LEN);
    id
}

/// `{source}-id-{source_id}`, sanitized.
#[must_use]
pub fn identifier_for(source: Source, source_id: &str) -> String {
    sanitize_identifier(&format!("{}-id-{source_id}", source.as_str()))
}

/// Identifier for a catalog item.
#[must_use]
pub fn item_identifier(item: &ManualItem) -> String {
    identifier_for(item.source, &item.source_id)
}
