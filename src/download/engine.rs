//! Download engine: walks pending items of one source and moves each
//! through resolution, CAPTCHA handling, transfer, verification and storage.
//!
//! # Item lifecycle
//!
//! ```text
//! pending ─► Resolving ─► [CaptchaWait] ─► Downloading ─► Verifying ─► downloaded
//!               │               │               │              │
//!               └───────────────┴───────────────┴──────────────┴─► failed (stays pending)
//! ```
//!
//! Items are processed one at a time with a randomized pause in between.
//! Every failure is recorded on the item and counted by a
//! [`CircuitBreaker`]; when it opens, the run stops with
//! [`EngineError::CircuitOpen`].
//!
//! The blob is committed before the catalog row is marked downloaded, so an
//! interrupted run can leave an unreferenced blob but never a downloaded row
//! without its file.

use std::fmt;
use std::sync::Arc;

use thiserror::Error;
use tracing::{debug, error, info, instrument, warn};

use super::captcha::{CaptchaError, CaptchaSolver};
use super::circuit_breaker::CircuitBreaker;
use super::client::{FetchRequest, FetchedFile, HttpClient};
use super::constants::CIRCUIT_BREAKER_THRESHOLD;
use super::error::DownloadError;
use super::filename::original_filename;
use super::pacing::DelayRange;
use crate::adapter::{AdapterError, DownloadTarget, Resolution, SiteAdapter};
use crate::archive::{ArchiveClient, item_identifier};
use crate::blob::{BlobError, BlobPut, BlobStore};
use crate::catalog::{Catalog, CatalogError, DownloadRecord, ManualItem, PendingFilter};

/// Solved challenges allowed per item before giving up.
const MAX_CHALLENGE_ROUNDS: u32 = 2;

/// Errors that end a run.
#[derive(Debug, Error)]
pub enum EngineError {
    /// Too many consecutive item failures.
    #[error(
        "circuit breaker open after {failures} consecutive failures ({summary})\n  Suggestion: Check connectivity, proxy credentials and whether the site now blocks this client, then re-run"
    )]
    CircuitOpen { failures: u32, summary: RunSummary },

    /// The catalog could not be read or updated.
    #[error(transparent)]
    Catalog(#[from] CatalogError),

    /// The blob store could not stage or commit a file.
    #[error(transparent)]
    Blob(#[from] BlobError),
}

/// Step of the item lifecycle a failure happened in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Resolving,
    CaptchaWait,
    Downloading,
    Verifying,
}

impl Phase {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Resolving => "resolving",
            Self::CaptchaWait => "captcha_wait",
            Self::Downloading => "downloading",
            Self::Verifying => "verifying",
        }
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Why an item failed.
#[derive(Debug, Error)]
pub enum ItemError {
    #[error(transparent)]
    Adapter(#[from] AdapterError),

    #[error(transparent)]
    Captcha(#[from] CaptchaError),

    #[error(transparent)]
    Download(#[from] DownloadError),

    /// The site kept presenting challenges after solved tokens.
    #[error("challenge still presented after {0} solved tokens")]
    ChallengeLoop(u32),
}

/// A failed item: the phase and the cause.
#[derive(Debug, Error)]
#[error("{phase}: {error}")]
pub struct ItemFailure {
    pub phase: Phase,
    #[source]
    pub error: ItemError,
}

impl ItemFailure {
    fn new(phase: Phase, error: impl Into<ItemError>) -> Self {
        Self {
            phase,
            error: error.into(),
        }
    }

    /// The page layout did not match the adapter.
    #[must_use]
    pub fn is_structural(&self) -> bool {
        matches!(&self.error, ItemError::Adapter(e) if e.is_structural())
    }

    /// Nobody solved the challenge in time.
    #[must_use]
    pub fn is_captcha_timeout(&self) -> bool {
        matches!(&self.error, ItemError::Captcha(e) if e.is_timeout())
    }
}

/// Result of processing one item.
#[derive(Debug)]
pub enum ItemOutcome {
    /// Stored and marked downloaded.
    Downloaded(BlobPut),
    /// The archive already holds the item; it was marked archived.
    AlreadyArchived { url: String },
    /// The item failed and stays pending.
    Failed(ItemFailure),
}

/// Counts for one run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RunSummary {
    pub attempted: u32,
    pub succeeded: u32,
    pub failed: u32,
    pub skipped: u32,
}

impl fmt::Display for RunSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "attempted {}, succeeded {}, failed {}, skipped {}",
            self.attempted, self.succeeded, self.failed, self.skipped
        )
    }
}

/// Sequential downloader for one source at a time.
pub struct DownloadEngine {
    catalog: Catalog,
    blobs: BlobStore,
    transfer: HttpClient,
    solver: Arc<dyn CaptchaSolver>,
    item_delay: DelayRange,
    breaker_threshold: u32,
    archive: Option<ArchiveClient>,
}

impl fmt::Debug for DownloadEngine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DownloadEngine")
            .field("blobs", &self.blobs)
            .field("solver", &self.solver.name())
            .field("item_delay", &self.item_delay)
            .field("breaker_threshold", &self.breaker_threshold)
            .field("archive_precheck", &self.archive.is_some())
            .finish_non_exhaustive()
    }
}

impl DownloadEngine {
    /// Creates an engine. `transfer` carries file downloads that do not need
    /// the adapter's session.
    #[must_use]
    pub fn new(
        catalog: Catalog,
        blobs: BlobStore,
        transfer: HttpClient,
        solver: Arc<dyn CaptchaSolver>,
    ) -> Self {
        Self {
            catalog,
            blobs,
            transfer,
            solver,
            item_delay: DelayRange::default(),
            breaker_threshold: CIRCUIT_BREAKER_THRESHOLD,
            archive: None,
        }
    }

    #[must_use]
    pub fn with_item_delay(mut self, delay: DelayRange) -> Self {
        self.item_delay = delay;
        self
    }

    #[must_use]
    pub fn with_breaker_threshold(mut self, threshold: u32) -> Self {
        self.breaker_threshold = threshold;
        self
    }

    /// Probes the archive before each item and skips items it already holds.
    #[must_use]
    pub fn with_archive_precheck(mut self, client: ArchiveClient) -> Self {
        self.archive = Some(client);
        self
    }

    /// Downloads the pending items of the adapter's source.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::CircuitOpen`] when too many items fail in a
    /// row, and catalog or blob store errors, which are fatal.
    #[instrument(skip(self, adapter, filter), fields(source = %adapter.source()))]
    pub async fn run(
        &self,
        adapter: &dyn SiteAdapter,
        filter: &PendingFilter,
    ) -> Result<RunSummary, EngineError> {
        let items = self.catalog.list_pending(adapter.source(), filter).await?;
        info!(pending = items.len(), "starting download run");

        let mut breaker = CircuitBreaker::new(self.breaker_threshold);
        let mut summary = RunSummary::default();

        for (index, item) in items.iter().enumerate() {
            if index > 0 {
                self.item_delay.pause().await;
            }
            summary.attempted += 1;

            match self.download_item(adapter, item).await? {
                ItemOutcome::Downloaded(put) => {
                    info!(
                        item = %item.label(),
                        digest = %put.digest,
                        size = put.size,
                        new_blob = put.newly_written,
                        "downloaded"
                    );
                    summary.succeeded += 1;
                    breaker.record_success();
                }
                ItemOutcome::AlreadyArchived { url } => {
                    info!(item = %item.label(), %url, "already archived; skipped");
                    summary.skipped += 1;
                }
                ItemOutcome::Failed(failure) => {
                    error!(
                        source = %item.source,
                        source_id = %item.source_id,
                        phase = %failure.phase,
                        structural = failure.is_structural(),
                        error = %failure.error,
                        "item failed"
                    );
                    self.catalog
                        .record_failure(item.id, failure.phase.as_str(), &failure.error.to_string())
                        .await?;
                    summary.failed += 1;
                    if breaker.record_failure() {
                        error!(%summary, "stopping run: circuit breaker open");
                        return Err(EngineError::CircuitOpen {
                            failures: breaker.consecutive_failures(),
                            summary,
                        });
                    }
                }
            }
        }

        info!(%summary, "download run finished");
        Ok(summary)
    }

    /// Processes one item. Per-item problems come back as
    /// [`ItemOutcome::Failed`]; only store errors are returned as `Err`.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::Catalog`] or [`EngineError::Blob`].
    #[instrument(skip(self, adapter, item), fields(item = %item.label()))]
    pub async fn download_item(
        &self,
        adapter: &dyn SiteAdapter,
        item: &ManualItem,
    ) -> Result<ItemOutcome, EngineError> {
        if let Some(url) = self.archived_copy(item).await {
            self.catalog.mark_archived(item.id, &url).await?;
            return Ok(ItemOutcome::AlreadyArchived { url });
        }

        let target = match self.resolve(adapter, item).await {
            Ok(target) => target,
            Err(failure) => return Ok(ItemOutcome::Failed(failure)),
        };
        debug!(url = %target.url, via_session = target.via_session, "resolved");

        let staging = self.blobs.staging_path().await?;
        let fetched = match self.transfer_file(adapter, &target, &staging).await {
            Ok(fetched) => fetched,
            Err(failure) => return Ok(ItemOutcome::Failed(failure)),
        };

        if let Err(e) = fetched.verify() {
            let _ = tokio::fs::remove_file(&staging).await;
            return Ok(ItemOutcome::Failed(ItemFailure::new(Phase::Verifying, e)));
        }

        let put = self.blobs.put_file(&staging).await?;
        let record = DownloadRecord {
            content_hash: put.digest.clone(),
            blob_path: put.path.display().to_string(),
            original_filename: original_filename(
                fetched.content_disposition.as_deref(),
                &fetched.final_url,
                &target.expected_filename,
            ),
            file_size: i64::try_from(put.size).unwrap_or(i64::MAX),
            checksums: Some(put.checksums.clone()),
        };
        self.catalog.mark_downloaded(item.id, &record).await?;
        Ok(ItemOutcome::Downloaded(put))
    }

    /// Archive URL when the pre-check finds the item. Probe failures are
    /// logged and treated as "not archived".
    async fn archived_copy(&self, item: &ManualItem) -> Option<String> {
        let archive = self.archive.as_ref()?;
        let identifier = item_identifier(item);
        match archive.exists(&identifier).await {
            Ok(true) => Some(archive.details_url(&identifier)),
            Ok(false) => None,
            Err(e) => {
                warn!(%identifier, error = %e, "archive pre-check failed; downloading anyway");
                None
            }
        }
    }

    async fn resolve(
        &self,
        adapter: &dyn SiteAdapter,
        item: &ManualItem,
    ) -> Result<DownloadTarget, ItemFailure> {
        let mut resolution = adapter
            .resolve_download(item)
            .await
            .map_err(|e| ItemFailure::new(Phase::Resolving, e))?;

        let mut rounds = 0;
        loop {
            let challenge = match resolution {
                Resolution::Ready(target) => return Ok(target),
                Resolution::Challenge(challenge) => challenge,
            };
            rounds += 1;
            if rounds > MAX_CHALLENGE_ROUNDS {
                return Err(ItemFailure::new(
                    Phase::CaptchaWait,
                    ItemError::ChallengeLoop(MAX_CHALLENGE_ROUNDS),
                ));
            }

            info!(
                kind = ?challenge.kind,
                page = %challenge.page_url,
                solver = self.solver.name(),
                "challenge presented"
            );
            let token = self
                .solver
                .solve(&challenge)
                .await
                .map_err(|e| ItemFailure::new(Phase::CaptchaWait, e))?;
            resolution = adapter
                .submit_challenge(item, &challenge, &token)
                .await
                .map_err(|e| ItemFailure::new(Phase::Resolving, e))?;
        }
    }

    async fn transfer_file(
        &self,
        adapter: &dyn SiteAdapter,
        target: &DownloadTarget,
        staging: &std::path::Path,
    ) -> Result<FetchedFile, ItemFailure> {
        let client = if target.via_session {
            adapter
                .session()
                .check_url(&target.url)
                .map_err(|e| ItemFailure::new(Phase::Downloading, e))?;
            adapter.session().client()
        } else {
            &self.transfer
        };
        let request = FetchRequest {
            url: &target.url,
            form: target.form.as_deref(),
            referer: target.referer.as_deref(),
        };
        client
            .fetch_to_file(&request, staging)
            .await
            .map_err(|e| ItemFailure::new(Phase::Downloading, e))
    }
}
