//! Persistent catalog of discovered collections and manual items.
//!
//! The catalog is the single source of truth shared by the scraper, the
//! download engine and the archive sync processes. Every write is a single
//! atomic statement keyed by row id or natural key, so all of them are safe
//! to retry and safe to run from several processes at once.
//!
//! # Overview
//!
//! - [`Catalog`] - Main interface for catalog operations
//! - [`ManualItem`] / [`NewManual`] - Item rows and enumeration input
//! - [`Collection`] / [`NewCollection`] - Brand/category listings
//! - [`CatalogError`] - Operation error types
//!
//! # Example
//!
//! ```ignore
//! use manual_archiver_core::catalog::{Catalog, NewManual, PendingFilter, Source};
//! use manual_archiver_core::Database;
//!
//! let db = Database::new(Path::new("manuals.db")).await?;
//! let catalog = Catalog::new(db);
//!
//! let id = catalog
//!     .upsert_item(&NewManual::new(Source::ManualsLib, "123", "https://www.manualslib.com/manual/123/x.html"))
//!     .await?;
//! let pending = catalog.list_pending(Source::ManualsLib, &PendingFilter::default()).await?;
//! ```

mod collection;
mod error;
mod item;
mod stats;

pub use collection::{Collection, NewCollection};
pub use error::{CatalogDbErrorKind, CatalogError};
pub use item::{
    BlobReference, DownloadRecord, ItemFilter, ItemStatus, ManualItem, NewManual, PendingFilter,
    Source,
};
pub use stats::{ArchiveCheckStats, BrandCount, CatalogStats, CollectionStats, SourceStats};

use tracing::{debug, info, instrument};

use crate::db::Database;

/// Result type for catalog operations.
pub type Result<T> = std::result::Result<T, CatalogError>;

/// Items checked longer ago than this are probed again.
const ARCHIVE_RECHECK_WINDOW: &str = "-7 days";

const MANUAL_COLUMNS: &str = "id, source, source_id, brand, model, listing_page_url, \
    document_type, description, category, detail_page_url, downloaded, archived, \
    content_hash, blob_path, original_filename, file_size, file_md5, file_sha1, archive_url, \
    created_at, downloaded_at, archived_at, archive_checked_at, last_error, failed_attempts";

const COLLECTION_COLUMNS: &str = "id, source, slug, display_name, listing_url, category_tags, \
    scraped, last_page, created_at, updated_at";

fn check_item_affected(id: i64, rows_affected: u64) -> Result<()> {
    if rows_affected == 0 {
        Err(CatalogError::ItemNotFound(id))
    } else {
        Ok(())
    }
}

fn check_collection_affected(id: i64, rows_affected: u64) -> Result<()> {
    if rows_affected == 0 {
        Err(CatalogError::CollectionNotFound(id))
    } else {
        Ok(())
    }
}

/// `LIMIT -1` is unbounded in `SQLite`.
fn sql_limit(limit: Option<u32>) -> i64 {
    limit.map_or(-1, i64::from)
}

/// Catalog store over the shared database.
#[derive(Debug, Clone)]
pub struct Catalog {
    db: Database,
}

impl Catalog {
    /// Creates a catalog over an opened database.
    #[must_use]
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    /// Returns the underlying database handle.
    #[must_use]
    pub fn database(&self) -> &Database {
        &self.db
    }

    // ==================== Items ====================

    /// Inserts an item, or merges non-empty fields into the existing row for
    /// the same `(source, source_id)`.
    ///
    /// Download and archive state are never touched, so re-discovery cannot
    /// reset a processed item.
    ///
    /// # Errors
    ///
    /// Returns [`CatalogError::Database`] if the statement fails.
    #[instrument(skip(self, item), fields(source = %item.source, source_id = %item.source_id))]
    pub async fn upsert_item(&self, item: &NewManual) -> Result<i64> {
        let id: i64 = sqlx::query_scalar(
            r"INSERT INTO manuals (
                source, source_id, brand, model, listing_page_url,
                document_type, description, category, detail_page_url
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT (source, source_id) DO UPDATE SET
                brand = CASE WHEN excluded.brand <> '' THEN excluded.brand ELSE manuals.brand END,
                model = CASE WHEN excluded.model <> '' THEN excluded.model ELSE manuals.model END,
                listing_page_url = CASE WHEN excluded.listing_page_url <> ''
                    THEN excluded.listing_page_url ELSE manuals.listing_page_url END,
                document_type = CASE WHEN excluded.document_type <> ''
                    THEN excluded.document_type ELSE manuals.document_type END,
                description = CASE WHEN excluded.description <> ''
                    THEN excluded.description ELSE manuals.description END,
                category = CASE WHEN excluded.category <> ''
                    THEN excluded.category ELSE manuals.category END,
                detail_page_url = CASE WHEN excluded.detail_page_url <> ''
                    THEN excluded.detail_page_url ELSE manuals.detail_page_url END
            RETURNING id",
        )
        .bind(item.source)
        .bind(&item.source_id)
        .bind(&item.brand)
        .bind(&item.model)
        .bind(&item.listing_page_url)
        .bind(&item.document_type)
        .bind(&item.description)
        .bind(&item.category)
        .bind(&item.detail_page_url)
        .fetch_one(self.db.pool())
        .await?;

        debug!(id, "upserted manual item");
        Ok(id)
    }

    /// Lists items of `source` that are neither downloaded nor archived, in
    /// discovery order.
    ///
    /// # Errors
    ///
    /// Returns [`CatalogError::Database`] if the query fails.
    #[instrument(skip(self, filter), fields(source = %source))]
    pub async fn list_pending(
        &self,
        source: Source,
        filter: &PendingFilter,
    ) -> Result<Vec<ManualItem>> {
        let sql = format!(
            "SELECT {MANUAL_COLUMNS} FROM manuals
            WHERE source = ? AND downloaded = 0 AND archived = 0
              AND (? IS NULL OR brand = ? COLLATE NOCASE)
              AND (? IS NULL OR category = ? COLLATE NOCASE)
            ORDER BY id ASC
            LIMIT ?"
        );
        let items = sqlx::query_as::<_, ManualItem>(&sql)
            .bind(source)
            .bind(filter.brand.as_deref())
            .bind(filter.brand.as_deref())
            .bind(filter.category.as_deref())
            .bind(filter.category.as_deref())
            .bind(sql_limit(filter.limit))
            .fetch_all(self.db.pool())
            .await?;
        Ok(items)
    }

    /// Fetches one item by id.
    ///
    /// # Errors
    ///
    /// Returns [`CatalogError::Database`] if the query fails.
    pub async fn get(&self, id: i64) -> Result<Option<ManualItem>> {
        let sql = format!("SELECT {MANUAL_COLUMNS} FROM manuals WHERE id = ?");
        Ok(sqlx::query_as::<_, ManualItem>(&sql)
            .bind(id)
            .fetch_optional(self.db.pool())
            .await?)
    }

    /// Fetches one item by natural key.
    ///
    /// # Errors
    ///
    /// Returns [`CatalogError::Database`] if the query fails.
    pub async fn find(&self, source: Source, source_id: &str) -> Result<Option<ManualItem>> {
        let sql = format!("SELECT {MANUAL_COLUMNS} FROM manuals WHERE source = ? AND source_id = ?");
        Ok(sqlx::query_as::<_, ManualItem>(&sql)
            .bind(source)
            .bind(source_id)
            .fetch_optional(self.db.pool())
            .await?)
    }

    /// Records a committed blob on the item and moves it to downloaded.
    ///
    /// Must only be called after the blob is in place.
    ///
    /// # Errors
    ///
    /// Returns [`CatalogError::ItemNotFound`] if no row has this id, or
    /// [`CatalogError::Database`] if the update fails.
    #[instrument(skip(self, record), fields(hash = %record.content_hash))]
    pub async fn mark_downloaded(&self, id: i64, record: &DownloadRecord) -> Result<()> {
        let result = sqlx::query(
            r"UPDATE manuals SET
                downloaded = 1,
                content_hash = ?,
                blob_path = ?,
                original_filename = ?,
                file_size = ?,
                file_md5 = ?,
                file_sha1 = ?,
                downloaded_at = datetime('now'),
                last_error = NULL
            WHERE id = ?",
        )
        .bind(&record.content_hash)
        .bind(&record.blob_path)
        .bind(&record.original_filename)
        .bind(record.file_size)
        .bind(record.checksums.as_ref().map(|c| c.md5.as_str()))
        .bind(record.checksums.as_ref().map(|c| c.sha1.as_str()))
        .bind(id)
        .execute(self.db.pool())
        .await?;

        check_item_affected(id, result.rows_affected())
    }

    /// Moves the item to archived unless it already is.
    ///
    /// Returns `true` when this call performed the transition. A second
    /// writer gets `false` and leaves the stored URL unchanged.
    ///
    /// # Errors
    ///
    /// Returns [`CatalogError::ItemNotFound`] if no row has this id, or
    /// [`CatalogError::Database`] if the update fails.
    #[instrument(skip(self))]
    pub async fn mark_archived(&self, id: i64, archive_url: &str) -> Result<bool> {
        let result = sqlx::query(
            r"UPDATE manuals SET
                archived = 1,
                archive_url = ?,
                archived_at = datetime('now'),
                archive_checked_at = datetime('now')
            WHERE id = ? AND archived = 0",
        )
        .bind(archive_url)
        .bind(id)
        .execute(self.db.pool())
        .await?;

        if result.rows_affected() > 0 {
            return Ok(true);
        }

        let exists: Option<i64> = sqlx::query_scalar("SELECT id FROM manuals WHERE id = ?")
            .bind(id)
            .fetch_optional(self.db.pool())
            .await?;
        match exists {
            Some(_) => Ok(false),
            None => Err(CatalogError::ItemNotFound(id)),
        }
    }

    /// Records a failed download attempt. The item stays pending.
    ///
    /// # Errors
    ///
    /// Returns [`CatalogError::ItemNotFound`] if no row has this id, or
    /// [`CatalogError::Database`] if the update fails.
    #[instrument(skip(self, message))]
    pub async fn record_failure(&self, id: i64, phase: &str, message: &str) -> Result<()> {
        let result = sqlx::query(
            r"UPDATE manuals SET
                failed_attempts = failed_attempts + 1,
                last_error = ?
            WHERE id = ?",
        )
        .bind(format!("{phase}: {message}"))
        .bind(id)
        .execute(self.db.pool())
        .await?;

        check_item_affected(id, result.rows_affected())
    }

    /// Lists items the archive checker should probe: not archived, not
    /// downloaded, never checked or checked over a week ago. Never-checked
    /// items come first.
    ///
    /// # Errors
    ///
    /// Returns [`CatalogError::Database`] if the query fails.
    pub async fn list_needing_archive_check(
        &self,
        source: Option<Source>,
        limit: Option<u32>,
    ) -> Result<Vec<ManualItem>> {
        let sql = format!(
            "SELECT {MANUAL_COLUMNS} FROM manuals
            WHERE archived = 0 AND downloaded = 0
              AND (archive_checked_at IS NULL
                   OR archive_checked_at < datetime('now', '{ARCHIVE_RECHECK_WINDOW}'))
              AND (? IS NULL OR source = ?)
            ORDER BY archive_checked_at IS NOT NULL, archive_checked_at ASC, id ASC
            LIMIT ?"
        );
        Ok(sqlx::query_as::<_, ManualItem>(&sql)
            .bind(source)
            .bind(source)
            .bind(sql_limit(limit))
            .fetch_all(self.db.pool())
            .await?)
    }

    /// Stores the result of an archive probe.
    ///
    /// With `found_url` the item is moved to archived (see
    /// [`Catalog::mark_archived`]); the return value says whether this call
    /// performed that transition.
    ///
    /// # Errors
    ///
    /// Returns [`CatalogError::ItemNotFound`] if no row has this id, or
    /// [`CatalogError::Database`] if the update fails.
    #[instrument(skip(self))]
    pub async fn record_archive_check(&self, id: i64, found_url: Option<&str>) -> Result<bool> {
        if let Some(url) = found_url {
            return self.mark_archived(id, url).await;
        }

        let result = sqlx::query("UPDATE manuals SET archive_checked_at = datetime('now') WHERE id = ?")
            .bind(id)
            .execute(self.db.pool())
            .await?;
        check_item_affected(id, result.rows_affected())?;
        Ok(false)
    }

    /// Lists downloaded items that are not yet archived.
    ///
    /// # Errors
    ///
    /// Returns [`CatalogError::Database`] if the query fails.
    pub async fn list_uploadable(
        &self,
        source: Option<Source>,
        limit: Option<u32>,
    ) -> Result<Vec<ManualItem>> {
        let sql = format!(
            "SELECT {MANUAL_COLUMNS} FROM manuals
            WHERE downloaded = 1 AND archived = 0 AND (? IS NULL OR source = ?)
            ORDER BY id ASC
            LIMIT ?"
        );
        Ok(sqlx::query_as::<_, ManualItem>(&sql)
            .bind(source)
            .bind(source)
            .bind(sql_limit(limit))
            .fetch_all(self.db.pool())
            .await?)
    }

    /// Lists archived items.
    ///
    /// # Errors
    ///
    /// Returns [`CatalogError::Database`] if the query fails.
    pub async fn list_archived(&self, source: Option<Source>) -> Result<Vec<ManualItem>> {
        let sql = format!(
            "SELECT {MANUAL_COLUMNS} FROM manuals
            WHERE archived = 1 AND (? IS NULL OR source = ?)
            ORDER BY id ASC"
        );
        Ok(sqlx::query_as::<_, ManualItem>(&sql)
            .bind(source)
            .bind(source)
            .fetch_all(self.db.pool())
            .await?)
    }

    /// Clears the archived flag of an item found missing on the archive.
    ///
    /// # Errors
    ///
    /// Returns [`CatalogError::ItemNotFound`] if no row has this id, or
    /// [`CatalogError::Database`] if the update fails.
    #[instrument(skip(self))]
    pub async fn unmark_archived(&self, id: i64) -> Result<()> {
        let result = sqlx::query(
            r"UPDATE manuals SET
                archived = 0,
                archive_url = NULL,
                archived_at = NULL,
                archive_checked_at = datetime('now')
            WHERE id = ?",
        )
        .bind(id)
        .execute(self.db.pool())
        .await?;

        check_item_affected(id, result.rows_affected())
    }

    /// Lists items for monitoring, newest first.
    ///
    /// # Errors
    ///
    /// Returns [`CatalogError::Database`] if the query fails.
    pub async fn list_items(&self, filter: &ItemFilter) -> Result<Vec<ManualItem>> {
        let status = filter.status.map(|s| s.as_str());
        let sql = format!(
            "SELECT {MANUAL_COLUMNS} FROM manuals
            WHERE (? IS NULL OR source = ?)
              AND (? IS NULL OR brand = ? COLLATE NOCASE)
              AND (? IS NULL
                   OR (? = 'pending' AND downloaded = 0 AND archived = 0)
                   OR (? = 'downloaded' AND downloaded = 1 AND archived = 0)
                   OR (? = 'archived' AND archived = 1))
            ORDER BY id DESC
            LIMIT ?"
        );
        Ok(sqlx::query_as::<_, ManualItem>(&sql)
            .bind(filter.source)
            .bind(filter.source)
            .bind(filter.brand.as_deref())
            .bind(filter.brand.as_deref())
            .bind(status)
            .bind(status)
            .bind(status)
            .bind(status)
            .bind(sql_limit(filter.limit))
            .fetch_all(self.db.pool())
            .await?)
    }

    /// Resolves a downloaded item to its blob path and original filename.
    ///
    /// Returns `None` for unknown or not-yet-downloaded items.
    ///
    /// # Errors
    ///
    /// Returns [`CatalogError::Database`] if the query fails.
    pub async fn blob_reference(&self, id: i64) -> Result<Option<BlobReference>> {
        Ok(sqlx::query_as::<_, BlobReference>(
            "SELECT blob_path, original_filename FROM manuals WHERE id = ? AND downloaded = 1",
        )
        .bind(id)
        .fetch_optional(self.db.pool())
        .await?)
    }

    // ==================== Stats ====================

    /// Item counts over the whole catalog.
    ///
    /// # Errors
    ///
    /// Returns [`CatalogError::Database`] if the query fails.
    pub async fn stats(&self) -> Result<CatalogStats> {
        Ok(sqlx::query_as::<_, CatalogStats>(
            r"SELECT
                COUNT(*) AS total,
                COALESCE(SUM(downloaded), 0) AS downloaded,
                COALESCE(SUM(archived), 0) AS archived,
                COALESCE(SUM(CASE WHEN downloaded = 0 AND archived = 0 THEN 1 ELSE 0 END), 0) AS pending
            FROM manuals",
        )
        .fetch_one(self.db.pool())
        .await?)
    }

    /// Item counts per source.
    ///
    /// # Errors
    ///
    /// Returns [`CatalogError::Database`] if the query fails.
    pub async fn stats_by_source(&self) -> Result<Vec<SourceStats>> {
        Ok(sqlx::query_as::<_, SourceStats>(
            r"SELECT
                source,
                COUNT(*) AS total,
                COALESCE(SUM(downloaded), 0) AS downloaded,
                COALESCE(SUM(archived), 0) AS archived,
                COALESCE(SUM(CASE WHEN downloaded = 0 AND archived = 0 THEN 1 ELSE 0 END), 0) AS pending
            FROM manuals
            GROUP BY source
            ORDER BY source",
        )
        .fetch_all(self.db.pool())
        .await?)
    }

    /// Item counts per brand, largest first.
    ///
    /// # Errors
    ///
    /// Returns [`CatalogError::Database`] if the query fails.
    pub async fn brand_stats(
        &self,
        source: Option<Source>,
        limit: Option<u32>,
    ) -> Result<Vec<BrandCount>> {
        Ok(sqlx::query_as::<_, BrandCount>(
            r"SELECT
                brand,
                COUNT(*) AS total,
                COALESCE(SUM(downloaded), 0) AS downloaded,
                COALESCE(SUM(archived), 0) AS archived
            FROM manuals
            WHERE (? IS NULL OR source = ?)
            GROUP BY brand
            ORDER BY total DESC, brand ASC
            LIMIT ?",
        )
        .bind(source)
        .bind(source)
        .bind(sql_limit(limit))
        .fetch_all(self.db.pool())
        .await?)
    }

    /// Collection enumeration progress.
    ///
    /// # Errors
    ///
    /// Returns [`CatalogError::Database`] if the query fails.
    pub async fn collection_stats(&self, source: Option<Source>) -> Result<CollectionStats> {
        Ok(sqlx::query_as::<_, CollectionStats>(
            r"SELECT
                COUNT(*) AS total,
                COALESCE(SUM(scraped), 0) AS scraped,
                COALESCE(SUM(1 - scraped), 0) AS pending
            FROM collections
            WHERE (? IS NULL OR source = ?)",
        )
        .bind(source)
        .bind(source)
        .fetch_one(self.db.pool())
        .await?)
    }

    /// Archive checker progress over items not downloaded locally.
    ///
    /// # Errors
    ///
    /// Returns [`CatalogError::Database`] if the query fails.
    pub async fn archive_check_stats(&self, source: Option<Source>) -> Result<ArchiveCheckStats> {
        Ok(sqlx::query_as::<_, ArchiveCheckStats>(
            r"SELECT
                COUNT(*) AS total_checkable,
                COALESCE(SUM(archived), 0) AS archived,
                COALESCE(SUM(CASE WHEN archived = 0 AND archive_checked_at IS NOT NULL THEN 1 ELSE 0 END), 0)
                    AS checked_not_archived,
                COALESCE(SUM(CASE WHEN archived = 0 AND archive_checked_at IS NULL THEN 1 ELSE 0 END), 0)
                    AS never_checked
            FROM manuals
            WHERE downloaded = 0 AND (? IS NULL OR source = ?)",
        )
        .bind(source)
        .bind(source)
        .fetch_one(self.db.pool())
        .await?)
    }

    // ==================== Collections ====================

    /// Inserts a collection or refreshes an existing one.
    ///
    /// Tags are merged and the listing URL is replaced; `scraped` and
    /// `last_page` are never reset.
    ///
    /// # Errors
    ///
    /// Returns [`CatalogError::Database`] if a statement fails, or
    /// [`CatalogError::InvalidValue`] if stored tags are not valid JSON.
    #[instrument(skip(self, collection), fields(source = %collection.source, slug = %collection.slug))]
    pub async fn upsert_collection(&self, collection: &NewCollection) -> Result<i64> {
        let mut tx = self.db.pool().begin().await?;

        let existing: Option<String> = sqlx::query_scalar(
            "SELECT category_tags FROM collections WHERE source = ? AND slug = ?",
        )
        .bind(collection.source)
        .bind(&collection.slug)
        .fetch_optional(&mut *tx)
        .await?;

        let mut merged = collection.clone();
        if let Some(json) = existing {
            let stored: Vec<String> =
                serde_json::from_str(&json).map_err(|e| CatalogError::InvalidValue {
                    field: "category_tags",
                    reason: e.to_string(),
                })?;
            for tag in stored.into_iter().rev() {
                if !merged.category_tags.contains(&tag) {
                    merged.category_tags.insert(0, tag);
                }
            }
        }

        let id: i64 = sqlx::query_scalar(
            r"INSERT INTO collections (source, slug, display_name, listing_url, category_tags)
            VALUES (?, ?, ?, ?, ?)
            ON CONFLICT (source, slug) DO UPDATE SET
                display_name = CASE WHEN excluded.display_name <> ''
                    THEN excluded.display_name ELSE collections.display_name END,
                listing_url = excluded.listing_url,
                category_tags = excluded.category_tags,
                updated_at = datetime('now')
            RETURNING id",
        )
        .bind(merged.source)
        .bind(&merged.slug)
        .bind(&merged.display_name)
        .bind(&merged.listing_url)
        .bind(merged.tags_json())
        .fetch_one(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(id)
    }

    /// Lists collections of a source in discovery order.
    ///
    /// # Errors
    ///
    /// Returns [`CatalogError::Database`] if the query fails.
    pub async fn list_collections(
        &self,
        source: Source,
        only_unscraped: bool,
    ) -> Result<Vec<Collection>> {
        let sql = format!(
            "SELECT {COLLECTION_COLUMNS} FROM collections
            WHERE source = ? AND (? = 0 OR scraped = 0)
            ORDER BY id ASC"
        );
        Ok(sqlx::query_as::<_, Collection>(&sql)
            .bind(source)
            .bind(only_unscraped)
            .fetch_all(self.db.pool())
            .await?)
    }

    /// Fetches a collection by slug.
    ///
    /// # Errors
    ///
    /// Returns [`CatalogError::Database`] if the query fails.
    pub async fn find_collection(&self, source: Source, slug: &str) -> Result<Option<Collection>> {
        let sql = format!("SELECT {COLLECTION_COLUMNS} FROM collections WHERE source = ? AND slug = ?");
        Ok(sqlx::query_as::<_, Collection>(&sql)
            .bind(source)
            .bind(slug)
            .fetch_optional(self.db.pool())
            .await?)
    }

    /// Fetches a collection by id.
    ///
    /// # Errors
    ///
    /// Returns [`CatalogError::Database`] if the query fails.
    pub async fn get_collection(&self, id: i64) -> Result<Option<Collection>> {
        let sql = format!("SELECT {COLLECTION_COLUMNS} FROM collections WHERE id = ?");
        Ok(sqlx::query_as::<_, Collection>(&sql)
            .bind(id)
            .fetch_optional(self.db.pool())
            .await?)
    }

    /// Records that listing page `page` was fully enumerated. Progress never
    /// moves backwards.
    ///
    /// # Errors
    ///
    /// Returns [`CatalogError::CollectionNotFound`] if no row has this id, or
    /// [`CatalogError::Database`] if the update fails.
    #[instrument(skip(self))]
    pub async fn record_page_progress(&self, id: i64, page: u32) -> Result<()> {
        let result = sqlx::query(
            r"UPDATE collections SET
                last_page = MAX(last_page, ?),
                updated_at = datetime('now')
            WHERE id = ?",
        )
        .bind(i64::from(page))
        .bind(id)
        .execute(self.db.pool())
        .await?;

        check_collection_affected(id, result.rows_affected())
    }

    /// Marks a collection as fully enumerated.
    ///
    /// # Errors
    ///
    /// Returns [`CatalogError::CollectionNotFound`] if no row has this id, or
    /// [`CatalogError::Database`] if the update fails.
    #[instrument(skip(self))]
    pub async fn mark_collection_scraped(&self, id: i64) -> Result<()> {
        let result = sqlx::query(
            "UPDATE collections SET scraped = 1, updated_at = datetime('now') WHERE id = ?",
        )
        .bind(id)
        .execute(self.db.pool())
        .await?;

        check_collection_affected(id, result.rows_affected())
    }

    // ==================== Clearing ====================

    /// Deletes item rows, for one source or all. Blobs are left on disk.
    ///
    /// # Errors
    ///
    /// Returns [`CatalogError::Database`] if the delete fails.
    #[instrument(skip(self))]
    pub async fn clear_items(&self, source: Option<Source>) -> Result<u64> {
        let result = sqlx::query("DELETE FROM manuals WHERE (? IS NULL OR source = ?)")
            .bind(source)
            .bind(source)
            .execute(self.db.pool())
            .await?;
        info!(deleted = result.rows_affected(), "cleared manual items");
        Ok(result.rows_affected())
    }

    /// Deletes collection rows, for one source or all.
    ///
    /// # Errors
    ///
    /// Returns [`CatalogError::Database`] if the delete fails.
    #[instrument(skip(self))]
    pub async fn clear_collections(&self, source: Option<Source>) -> Result<u64> {
        let result = sqlx::query("DELETE FROM collections WHERE (? IS NULL OR source = ?)")
            .bind(source)
            .bind(source)
            .execute(self.db.pool())
            .await?;
        info!(deleted = result.rows_affected(), "cleared collections");
        Ok(result.rows_affected())
    }

    /// Deletes every item and collection in one transaction.
    ///
    /// Returns `(items, collections)` deleted.
    ///
    /// # Errors
    ///
    /// Returns [`CatalogError::Database`] if a statement fails.
    #[instrument(skip(self))]
    pub async fn clear_everything(&self) -> Result<(u64, u64)> {
        let mut tx = self.db.pool().begin().await?;
        let items = sqlx::query("DELETE FROM manuals")
            .execute(&mut *tx)
            .await?
            .rows_affected();
        let collections = sqlx::query("DELETE FROM collections")
            .execute(&mut *tx)
            .await?
            .rows_affected();
        tx.commit().await?;
        info!(items, collections, "cleared catalog");
        Ok((items, collections))
    }
}
