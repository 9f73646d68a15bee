//! Brand/category collections discovered on a source.

use serde::Serialize;
use sqlx::FromRow;

use super::CatalogError;
use super::item::Source;

/// A listing the scrape driver walks page by page.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct Collection {
    pub id: i64,
    pub source: Source,
    /// Unique within the source.
    pub slug: String,
    pub display_name: String,
    /// First listing page.
    pub listing_url: String,
    /// JSON array of category tags.
    pub category_tags: String,
    pub scraped: bool,
    /// Last listing page fully enumerated; 0 before the first page.
    pub last_page: i64,
    pub created_at: String,
    pub updated_at: String,
}

impl Collection {
    /// Decodes the stored category tags.
    ///
    /// # Errors
    ///
    /// Returns [`CatalogError::InvalidValue`] when the column is not a JSON string array.
    pub fn tags(&self) -> Result<Vec<String>, CatalogError> {
        serde_json::from_str(&self.category_tags).map_err(|e| CatalogError::InvalidValue {
            field: "category_tags",
            reason: e.to_string(),
        })
    }

    /// Next page to fetch when resuming enumeration.
    #[must_use]
    pub fn next_page(&self) -> u32 {
        u32::try_from(self.last_page.max(0)).unwrap_or(u32::MAX - 1) + 1
    }
}

/// A collection as produced by discovery or named on the command line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewCollection {
    pub source: Source,
    pub slug: String,
    pub display_name: String,
    pub listing_url: String,
    pub category_tags: Vec<String>,
}

impl NewCollection {
    #[must_use]
    pub fn new(source: Source, slug: impl Into<String>, listing_url: impl Into<String>) -> Self {
        let slug = slug.into();
        Self {
            source,
            display_name: slug.clone(),
            slug,
            listing_url: listing_url.into(),
            category_tags: Vec::new(),
        }
    }

    #[must_use]
    pub fn with_display_name(mut self, name: impl Into<String>) -> Self {
        self.display_name = name.into();
        self
    }

    #[must_use]
    pub fn with_tag(mut self, tag: impl Into<String>) -> Self {
        let tag = tag.into();
        if !self.category_tags.contains(&tag) {
            self.category_tags.push(tag);
        }
        self
    }

    pub(crate) fn tags_json(&self) -> String {
        serde_json::to_string(&self.category_tags).unwrap_or_else(|_| "[]".to_string())
    }
}
