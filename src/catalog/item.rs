//! Manual item types, source identifiers and item filters.

use std::fmt;

use serde::{Deserialize, Serialize};
use sqlx::FromRow;

use crate::blob::Checksums;

/// Document-hosting site a manual was discovered on.
///
/// Stored as its lowercase id (`manualslib`, `manualsbase`, `manualzz`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "lowercase")]
#[sqlx(rename_all = "lowercase")]
pub enum Source {
    /// www.manualslib.com
    ManualsLib,
    /// www.manualsbase.com
    ManualsBase,
    /// manualzz.com
    Manualzz,
}

impl Source {
    /// Every supported source, in a stable order.
    pub const ALL: [Source; 3] = [Self::ManualsLib, Self::ManualsBase, Self::Manualzz];

    /// Returns the stable string id used in the database and archive identifiers.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ManualsLib => "manualslib",
            Self::ManualsBase => "manualsbase",
            Self::Manualzz => "manualzz",
        }
    }

    /// Human-readable site name.
    #[must_use]
    pub fn display_name(&self) -> &'static str {
        match self {
            Self::ManualsLib => "ManualsLib",
            Self::ManualsBase => "ManualsBase",
            Self::Manualzz => "Manualzz",
        }
    }
}

impl fmt::Display for Source {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for Source {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "manualslib" => Ok(Self::ManualsLib),
            "manualsbase" => Ok(Self::ManualsBase),
            "manualzz" => Ok(Self::Manualzz),
            _ => Err(format!(
                "unknown source: {s} (expected manualslib, manualsbase or manualzz)"
            )),
        }
    }
}

/// Derived processing state of an item.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ItemStatus {
    /// Neither downloaded nor archived.
    Pending,
    /// Stored locally, not yet on the remote archive.
    Downloaded,
    /// Present on the remote archive.
    Archived,
}

impl ItemStatus {
    /// Returns the string label used in filters and listings.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Downloaded => "downloaded",
            Self::Archived => "archived",
        }
    }
}

impl fmt::Display for ItemStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for ItemStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(Self::Pending),
            "downloaded" => Ok(Self::Downloaded),
            "archived" => Ok(Self::Archived),
            _ => Err(format!("invalid item status: {s}")),
        }
    }
}

/// A manual as enumerated from a listing page, before any download.
///
/// Optional metadata the page did not carry stays as an empty string.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewManual {
    pub source: Source,
    /// Site-native identifier, unique within the source.
    pub source_id: String,
    pub brand: String,
    pub model: String,
    /// Product/model page the item was listed under.
    pub listing_page_url: String,
    pub document_type: String,
    pub description: String,
    pub category: String,
    /// Page the download flow starts from.
    pub detail_page_url: String,
}

impl NewManual {
    /// Creates an item with the required identity fields and empty metadata.
    #[must_use]
    pub fn new(
        source: Source,
        source_id: impl Into<String>,
        detail_page_url: impl Into<String>,
    ) -> Self {
        Self {
            source,
            source_id: source_id.into(),
            brand: String::new(),
            model: String::new(),
            listing_page_url: String::new(),
            document_type: String::new(),
            description: String::new(),
            category: String::new(),
            detail_page_url: detail_page_url.into(),
        }
    }

    #[must_use]
    pub fn with_brand(mut self, brand: impl Into<String>) -> Self {
        self.brand = brand.into();
        self
    }

    #[must_use]
    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    #[must_use]
    pub fn with_listing_page_url(mut self, url: impl Into<String>) -> Self {
        self.listing_page_url = url.into();
        self
    }

    #[must_use]
    pub fn with_document_type(mut self, document_type: impl Into<String>) -> Self {
        self.document_type = document_type.into();
        self
    }

    #[must_use]
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    #[must_use]
    pub fn with_category(mut self, category: impl Into<String>) -> Self {
        self.category = category.into();
        self
    }
}

/// A catalog row.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct ManualItem {
    pub id: i64,
    pub source: Source,
    pub source_id: String,
    pub brand: String,
    pub model: String,
    pub listing_page_url: String,
    pub document_type: String,
    pub description: String,
    pub category: String,
    pub detail_page_url: String,
    pub downloaded: bool,
    pub archived: bool,
    /// Hex SHA-256 of the stored blob; set whenever `downloaded` is true.
    pub content_hash: Option<String>,
    /// Blob path; set whenever `downloaded` is true.
    pub blob_path: Option<String>,
    pub original_filename: Option<String>,
    pub file_size: Option<i64>,
    pub file_md5: Option<String>,
    pub file_sha1: Option<String>,
    /// Set whenever `archived` is true.
    pub archive_url: Option<String>,
    pub created_at: String,
    pub downloaded_at: Option<String>,
    pub archived_at: Option<String>,
    pub archive_checked_at: Option<String>,
    /// Phase-prefixed message of the last failed download attempt.
    pub last_error: Option<String>,
    pub failed_attempts: i64,
}

impl ManualItem {
    /// Returns the derived processing state.
    #[must_use]
    pub fn status(&self) -> ItemStatus {
        if self.archived {
            ItemStatus::Archived
        } else if self.downloaded {
            ItemStatus::Downloaded
        } else {
            ItemStatus::Pending
        }
    }

    /// Short label for logs: "Brand Model (doc type)".
    #[must_use]
    pub fn label(&self) -> String {
        let mut label = format!("{} {}", self.brand, self.model).trim().to_string();
        if label.is_empty() {
            label = format!("{}#{}", self.source, self.source_id);
        }
        if !self.document_type.is_empty() {
            label.push_str(&format!(" ({})", self.document_type));
        }
        label
    }
}

/// Content fields written when an item transitions to downloaded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DownloadRecord {
    pub content_hash: String,
    pub blob_path: String,
    pub original_filename: String,
    pub file_size: i64,
    /// `None` leaves the checksum columns empty.
    pub checksums: Option<Checksums>,
}

/// Selection of pending items for a download run.
#[derive(Debug, Clone, Default)]
pub struct PendingFilter {
    /// Only items of this brand (case-insensitive).
    pub brand: Option<String>,
    /// Only items in this category.
    pub category: Option<String>,
    /// Maximum number of items returned.
    pub limit: Option<u32>,
}

/// Filter for the monitoring item listing.
#[derive(Debug, Clone, Default)]
pub struct ItemFilter {
    pub source: Option<Source>,
    pub brand: Option<String>,
    pub status: Option<ItemStatus>,
    pub limit: Option<u32>,
}

/// Where a downloaded item's bytes live, for serving them back.
#[derive(Debug, Clone, PartialEq, Eq, FromRow)]
pub struct BlobReference {
    pub blob_path: String,
    pub original_filename: Option<String>,
}
