//! Original-filename derivation for downloaded manuals.

use std::path::{Component, Path};

use url::Url;

const DEFAULT_FILENAME: &str = "manual.pdf";

/// Parses a Content-Disposition header for its filename.
///
/// Handles `filename="a.pdf"`, `filename=a.pdf` and the RFC 5987
/// `filename*=UTF-8''a%20b.pdf` form, preferring the latter.
pub(crate) fn parse_content_disposition(header: &str) -> Option<String> {
    if let Some(pos) = header.find("filename*=") {
        let value = header[pos + 10..].trim();
        if let Some(quote_pos) = value.find("''") {
            let encoded = &value[quote_pos + 2..];
            let end = encoded.find(';').unwrap_or(encoded.len());
            let encoded_name = encoded[..end].trim().trim_matches('"');
            if let Ok(decoded) = urlencoding::decode(encoded_name) {
                return Some(decoded.into_owned());
            }
        }
    }

    if let Some(pos) = header.find("filename=") {
        let value = header[pos + 9..].trim();
        if let Some(stripped) = value.strip_prefix('"') {
            if let Some(end) = stripped.find('"') {
                return Some(stripped[..end].to_string()).filter(|s| !s.is_empty());
            }
        } else {
            let end = value.find(';').unwrap_or(value.len());
            let filename = value[..end].trim();
            if !filename.is_empty() {
                return Some(filename.to_string());
            }
        }
    }

    None
}

/// Replaces characters that are invalid on common filesystems and rewrites
/// dot-only names.
pub(crate) fn sanitize_filename(name: &str) -> String {
    let sanitized: String = name
        .trim()
        .chars()
        .map(|c| match c {
            '/' | '\\' | ':' | '*' | '?' | '"' | '<' | '>' | '|' => '_',
            c if c.is_control() => '_',
            c => c,
        })
        .collect();

    if sanitized.is_empty() {
        return "_".to_string();
    }

    if is_safe_filename_segment(&sanitized) {
        sanitized
    } else {
        sanitized.replace('.', "_")
    }
}

fn is_safe_filename_segment(name: &str) -> bool {
    !Path::new(name).components().any(|component| {
        matches!(
            component,
            Component::CurDir | Component::ParentDir | Component::RootDir | Component::Prefix(_)
        )
    })
}

/// Last non-empty path segment of `url`, percent-decoded.
fn last_segment(url: &Url) -> Option<String> {
    let last = url.path_segments()?.rfind(|s| !s.is_empty())?;
    Some(urlencoding::decode(last).map_or_else(|_| last.to_string(), |d| d.into_owned()))
}

/// Picks the filename a manual is recorded under.
///
/// Content-Disposition wins, then a URL segment that already names a PDF,
/// then the adapter's expected name. `.pdf` is appended when missing.
pub(crate) fn original_filename(
    content_disposition: Option<&str>,
    url: &Url,
    expected: &str,
) -> String {
    let from_header = content_disposition.and_then(parse_content_disposition);
    let from_url = last_segment(url).filter(|s| s.to_ascii_lowercase().ends_with(".pdf"));
    let expected = Some(expected.trim().to_string()).filter(|s| !s.is_empty());

    let chosen = from_header
        .or(from_url)
        .or(expected)
        .unwrap_or_else(|| DEFAULT_FILENAME.to_string());
    let mut name = sanitize_filename(&chosen);
    if !name.to_ascii_lowercase().ends_with(".pdf") {
        name.push_str(".pdf");
    }
    name
}

/// Builds an expected filename from item metadata: `Brand_Model_DocType.pdf`.
pub(crate) fn expected_filename(parts: &[&str]) -> String {
    let joined: Vec<String> = parts
        .iter()
        .map(|p| {
            p.split_whitespace()
                .collect::<Vec<_>>()
                .join("_")
        })
        .filter(|p| !p.is_empty())
        .collect();
    if joined.is_empty() {
        return DEFAULT_FILENAME.to_string();
    }
    format!("{}.pdf", sanitize_filename(&joined.join("_")))
}
