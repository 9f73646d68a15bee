//! Aggregate counts for the status command and dashboard.

use serde::Serialize;
use sqlx::FromRow;

use super::item::Source;

/// Item counts by processing state.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, FromRow, Serialize)]
pub struct CatalogStats {
    pub total: i64,
    pub downloaded: i64,
    pub archived: i64,
    /// Neither downloaded nor archived.
    pub pending: i64,
}

/// Per-source counts.
#[derive(Debug, Clone, PartialEq, Eq, FromRow, Serialize)]
pub struct SourceStats {
    pub source: Source,
    pub total: i64,
    pub downloaded: i64,
    pub archived: i64,
    pub pending: i64,
}

/// Per-brand counts.
#[derive(Debug, Clone, PartialEq, Eq, FromRow, Serialize)]
pub struct BrandCount {
    pub brand: String,
    pub total: i64,
    pub downloaded: i64,
    pub archived: i64,
}

/// Collection enumeration progress.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, FromRow, Serialize)]
pub struct CollectionStats {
    pub total: i64,
    pub scraped: i64,
    pub pending: i64,
}

/// Progress of the archive checker over items it may probe.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, FromRow, Serialize)]
pub struct ArchiveCheckStats {
    /// Items that are not downloaded locally.
    pub total_checkable: i64,
    pub archived: i64,
    pub checked_not_archived: i64,
    pub never_checked: i64,
}
