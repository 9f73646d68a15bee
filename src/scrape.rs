//! Scrape driver: enumerates a source's collections into the catalog.
//!
//! Each collection is read page by page starting after its recorded
//! `last_page`, so an interrupted scrape resumes where it stopped. A page
//! with no items, or without a link to a further page, ends the collection.

use thiserror::Error;
use tracing::{info, instrument, warn};

use crate::adapter::{AdapterError, SiteAdapter};
use crate::catalog::{Catalog, CatalogError, Collection, NewCollection};
use crate::download::DelayRange;

/// Errors that abort a scrape.
#[derive(Debug, Error)]
pub enum ScrapeError {
    #[error(transparent)]
    Catalog(#[from] CatalogError),

    /// Discovery failed or a named collection is not known to the adapter.
    #[error(transparent)]
    Adapter(#[from] AdapterError),
}

/// What to enumerate.
#[derive(Debug, Clone, Default)]
pub struct ScrapeOptions {
    /// Run site discovery even when collections are already stored.
    pub discover: bool,
    /// Scrape only these (brand slugs or catalog URLs, per source).
    pub collections: Vec<String>,
}

/// Counts for one scrape run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ScrapeSummary {
    /// Collections visited.
    pub collections: u32,
    /// Listing pages read.
    pub pages: u32,
    /// Item rows inserted or refreshed.
    pub items_upserted: u32,
    /// Collections abandoned after a page failed; they resume next run.
    pub failed_collections: u32,
}

/// Walks collections and upserts every listed item.
#[derive(Debug, Clone)]
pub struct Enumerator {
    catalog: Catalog,
    page_delay: DelayRange,
}

impl Enumerator {
    #[must_use]
    pub fn new(catalog: Catalog) -> Self {
        Self {
            catalog,
            page_delay: DelayRange::default(),
        }
    }

    /// Pause between listing pages.
    #[must_use]
    pub fn with_page_delay(mut self, delay: DelayRange) -> Self {
        self.page_delay = delay;
        self
    }

    /// Enumerates the adapter's source.
    ///
    /// # Errors
    ///
    /// Returns [`ScrapeError::Catalog`] for catalog failures and
    /// [`ScrapeError::Adapter`] when discovery fails or a named collection
    /// is unknown. Failures on individual listing pages are logged and the
    /// collection is left for the next run.
    #[instrument(skip(self, adapter, options), fields(source = %adapter.source()))]
    pub async fn run(
        &self,
        adapter: &dyn SiteAdapter,
        options: &ScrapeOptions,
    ) -> Result<ScrapeSummary, ScrapeError> {
        let collections = if options.collections.is_empty() {
            self.stored_collections(adapter, options.discover).await?
        } else {
            self.named_collections(adapter, &options.collections).await?
        };
        info!(collections = collections.len(), "collections to scrape");

        let mut summary = ScrapeSummary::default();
        for collection in &collections {
            summary.collections += 1;
            if let Err(error) = self.scrape_collection(adapter, collection, &mut summary).await {
                match error {
                    ScrapeError::Adapter(e) => {
                        warn!(
                            collection = %collection.slug,
                            structural = e.is_structural(),
                            error = %e,
                            "collection scrape interrupted; will resume next run"
                        );
                        summary.failed_collections += 1;
                    }
                    fatal @ ScrapeError::Catalog(_) => return Err(fatal),
                }
            }
        }

        info!(
            collections = summary.collections,
            pages = summary.pages,
            items = summary.items_upserted,
            failed = summary.failed_collections,
            "scrape finished"
        );
        Ok(summary)
    }

    async fn store(&self, collections: &[NewCollection]) -> Result<Vec<i64>, CatalogError> {
        let mut ids = Vec::with_capacity(collections.len());
        for collection in collections {
            ids.push(self.catalog.upsert_collection(collection).await?);
        }
        Ok(ids)
    }

    /// Configured collections plus discovered ones (when asked, or when the
    /// source has none stored yet), limited to those not fully scraped.
    async fn stored_collections(
        &self,
        adapter: &dyn SiteAdapter,
        discover: bool,
    ) -> Result<Vec<Collection>, ScrapeError> {
        let source = adapter.source();
        self.store(&adapter.configured_collections()).await?;

        let known = self.catalog.list_collections(source, false).await?;
        if discover || known.is_empty() {
            let found = adapter.discover_collections().await?;
            info!(found = found.len(), "discovery finished");
            self.store(&found).await?;
        }
        Ok(self.catalog.list_collections(source, true).await?)
    }

    async fn named_collections(
        &self,
        adapter: &dyn SiteAdapter,
        names: &[String],
    ) -> Result<Vec<Collection>, ScrapeError> {
        let mut result = Vec::new();
        for name in names {
            let wanted = adapter.named_collections(name);
            if wanted.is_empty() {
                return Err(AdapterError::config(
                    adapter.source(),
                    format!("unknown collection '{name}'"),
                )
                .into());
            }
            for id in self.store(&wanted).await? {
                match self.catalog.get_collection(id).await? {
                    Some(c) if c.scraped => {
                        info!(collection = %c.slug, "already scraped; skipping");
                    }
                    Some(c) => result.push(c),
                    None => {}
                }
            }
        }
        Ok(result)
    }

    #[instrument(skip(self, adapter, collection, summary), fields(collection = %collection.slug))]
    async fn scrape_collection(
        &self,
        adapter: &dyn SiteAdapter,
        collection: &Collection,
        summary: &mut ScrapeSummary,
    ) -> Result<(), ScrapeError> {
        let mut page = collection.next_page();
        if page > 1 {
            info!(page, "resuming collection");
        }
        loop {
            let listing = adapter.list_page(collection, page).await?;
            summary.pages += 1;
            for item in &listing.items {
                self.catalog.upsert_item(item).await?;
                summary.items_upserted += 1;
            }
            self.catalog.record_page_progress(collection.id, page).await?;
            info!(page, items = listing.items.len(), "listing page stored");

            if listing.is_last() {
                self.catalog.mark_collection_scraped(collection.id).await?;
                return Ok(());
            }
            page += 1;
            self.page_delay.pause().await;
        }
    }
}
