//! Upload metadata and its S3 header encoding.

use std::path::Path;

use super::identifier::item_identifier;
use crate::catalog::ManualItem;

const DEFAULT_BRAND: &str = "Unknown";
const DEFAULT_DOC_TYPE: &str = "Manual";
const DEFAULT_REMOTE_FILENAME: &str = "manual.pdf";

/// What gets uploaded for one item.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadMetadata {
    pub identifier: String,
    pub title: String,
    pub remote_filename: String,
    pub subjects: Vec<String>,
    pub description: Option<String>,
    pub source_url: Option<String>,
    /// `urn:<algorithm>:<hex>` for each known checksum: md5, sha1, then sha256.
    pub external_identifiers: Vec<String>,
}

/// Drops characters XML 1.0 cannot carry (C0 controls other than tab, LF
/// and CR, plus DEL).
#[must_use]
pub fn strip_xml_controls(text: &str) -> String {
    text.chars()
        .filter(|&c| !(c.is_control() && !matches!(c, '\t' | '\n' | '\r') && (c as u32) < 0x80))
        .collect()
}

/// Checksum URNs in the order the archive lists them.
pub(crate) fn external_identifiers(
    md5: Option<&str>,
    sha1: Option<&str>,
    sha256: Option<&str>,
) -> Vec<String> {
    [("md5", md5), ("sha1", sha1), ("sha256", sha256)]
        .into_iter()
        .filter_map(|(algorithm, digest)| {
            digest
                .map(str::trim)
                .filter(|d| !d.is_empty())
                .map(|d| format!("urn:{algorithm}:{}", d.to_ascii_lowercase()))
        })
        .collect()
}

/// "Brand Model DocType", without repeating the brand or the document type
/// when the model already contains them.
#[must_use]
pub fn upload_title(brand: &str, model: &str, doc_type: &str) -> String {
    let brand = strip_xml_controls(brand.trim());
    let brand = if brand.is_empty() {
        DEFAULT_BRAND.to_string()
    } else {
        brand
    };
    let mut model = strip_xml_controls(model.trim());
    if model.to_lowercase().starts_with(&brand.to_lowercase()) {
        model = model
            .get(brand.len()..)
            .unwrap_or_default()
            .trim()
            .to_string();
    }
    let doc_type = strip_xml_controls(doc_type.trim());
    let doc_type = if doc_type.is_empty() {
        DEFAULT_DOC_TYPE.to_string()
    } else {
        doc_type
    };

    let parts: Vec<&str> = if model.to_lowercase().contains(&doc_type.to_lowercase()) {
        vec![brand.as_str(), model.as_str()]
    } else {
        vec![brand.as_str(), model.as_str(), doc_type.as_str()]
    };
    parts
        .into_iter()
        .filter(|p| !p.is_empty())
        .collect::<Vec<_>>()
        .join(" ")
}

impl UploadMetadata {
    /// Metadata for a downloaded item.
    #[must_use]
    pub fn for_item(item: &ManualItem) -> Self {
        let remote_filename = item
            .original_filename
            .as_deref()
            .filter(|n| !n.trim().is_empty())
            .map(str::to_string)
            .or_else(|| {
                item.blob_path.as_deref().and_then(|p| {
                    Path::new(p)
                        .file_name()
                        .map(|n| n.to_string_lossy().into_owned())
                })
            })
            .unwrap_or_else(|| DEFAULT_REMOTE_FILENAME.to_string());

        Self {
            identifier: item_identifier(item),
            title: upload_title(&item.brand, &item.model, &item.document_type),
            remote_filename: strip_xml_controls(&remote_filename),
            subjects: vec![item.source.as_str().to_string(), "manuals".to_string()],
            description: Some(strip_xml_controls(&item.description)).filter(|d| !d.is_empty()),
            source_url: Some(strip_xml_controls(&item.detail_page_url)).filter(|u| !u.is_empty()),
            external_identifiers: external_identifiers(
                item.file_md5.as_deref(),
                item.file_sha1.as_deref(),
                item.content_hash.as_deref(),
            ),
        }
    }

    /// `x-archive-*` request headers for an S3-style PUT.
    #[must_use]
    pub fn headers(&self) -> Vec<(String, String)> {
        let mut headers = vec![
            ("x-archive-auto-make-bucket".to_string(), "1".to_string()),
            ("x-archive-meta-mediatype".to_string(), "texts".to_string()),
            ("x-archive-meta-title".to_string(), header_value(&self.title)),
        ];
        for (i, subject) in self.subjects.iter().enumerate() {
            headers.push((
                format!("x-archive-meta{:02}-subject", i + 1),
                header_value(subject),
            ));
        }
        if let Some(description) = &self.description {
            headers.push((
                "x-archive-meta-description".to_string(),
                header_value(description),
            ));
        }
        if let Some(source) = &self.source_url {
            headers.push(("x-archive-meta-source".to_string(), header_value(source)));
        }
        for (i, external) in self.external_identifiers.iter().enumerate() {
            headers.push((
                format!("x-archive-meta{:02}-external-identifier", i + 1),
                header_value(external),
            ));
        }
        headers
    }
}

/// Plain ASCII passes through; anything else is sent as `uri(<percent-encoded>)`.
fn header_value(value: &str) -> String {
    let plain = value
        .chars()
        .all(|c| c.is_ascii() && !c.is_ascii_control());
    if plain {
        value.to_string()
    } else {
        format!("uri({})", urlencoding::encode(value))
    }
}
