//! Archive checker: probes the archive for items not yet downloaded and
//! marks those already preserved, so nobody downloads them again.

use std::time::Duration;

use tracing::{debug, info, instrument, warn};

use super::client::ArchiveClient;
use super::error::ArchiveError;
use super::identifier::item_identifier;
use crate::catalog::{Catalog, Source};
use crate::config::ArchiveConfig;
use crate::download::DelayRange;

/// Items fetched from the catalog per query.
const FETCH_CHUNK: u32 = 100;

/// Pacing for one checker run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CheckPacing {
    /// Pause between probes.
    pub delay: DelayRange,
    /// Probes per batch; a longer pause follows each batch.
    pub batch_size: u32,
    pub batch_pause: Duration,
    /// Wait before re-querying when continuous mode runs dry.
    pub idle_wait: Duration,
}

impl CheckPacing {
    #[must_use]
    pub fn from_config(config: &ArchiveConfig) -> Self {
        Self {
            delay: config.check_delay(),
            batch_size: config.batch_size.max(1),
            batch_pause: Duration::from_secs(config.batch_pause_secs),
            idle_wait: Duration::from_secs(config.idle_wait_secs),
        }
    }

    /// No waiting at all.
    #[must_use]
    pub fn none() -> Self {
        Self {
            delay: DelayRange::none(),
            batch_size: u32::MAX,
            batch_pause: Duration::ZERO,
            idle_wait: Duration::ZERO,
        }
    }
}

/// Options for [`ArchiveChecker::run`].
#[derive(Debug, Clone, Default)]
pub struct CheckOptions {
    pub source: Option<Source>,
    /// Stop after this many probes.
    pub limit: Option<u32>,
    /// Keep polling for new items instead of stopping when none remain.
    pub continuous: bool,
}

/// Totals for one checker run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CheckSummary {
    pub checked: u32,
    pub found: u32,
    /// Probes that failed; those items stay unchecked.
    pub errors: u32,
}

/// Walks pending items and records which are already on the archive.
#[derive(Debug, Clone)]
pub struct ArchiveChecker {
    catalog: Catalog,
    client: ArchiveClient,
    pacing: CheckPacing,
}

impl ArchiveChecker {
    #[must_use]
    pub fn new(catalog: Catalog, client: ArchiveClient, pacing: CheckPacing) -> Self {
        Self {
            catalog,
            client,
            pacing,
        }
    }

    /// Runs one pass, or polls forever in continuous mode until the limit is
    /// reached.
    ///
    /// # Errors
    ///
    /// Returns [`ArchiveError::Catalog`] when the catalog cannot be read or
    /// updated. Failed probes are counted, not returned.
    #[instrument(skip(self, options), fields(continuous = options.continuous))]
    pub async fn run(&self, options: &CheckOptions) -> Result<CheckSummary, ArchiveError> {
        let mut summary = CheckSummary::default();
        let mut in_batch = 0u32;

        loop {
            let remaining = options.limit.map(|l| l.saturating_sub(summary.checked));
            if remaining == Some(0) {
                info!(limit = options.limit, "check limit reached");
                break;
            }
            let chunk = remaining.map_or(FETCH_CHUNK, |r| r.min(FETCH_CHUNK));
            let items = self
                .catalog
                .list_needing_archive_check(options.source, Some(chunk))
                .await?;

            if items.is_empty() {
                if options.continuous {
                    info!(wait_secs = self.pacing.idle_wait.as_secs(), "nothing to check; waiting");
                    tokio::time::sleep(self.pacing.idle_wait).await;
                    continue;
                }
                break;
            }

            let mut progressed = false;
            for item in items {
                let identifier = item_identifier(&item);
                match self.client.exists(&identifier).await {
                    Ok(true) => {
                        let url = self.client.details_url(&identifier);
                        if self.catalog.record_archive_check(item.id, Some(&url)).await? {
                            info!(item = %item.label(), %url, "found on archive");
                            summary.found += 1;
                        }
                        progressed = true;
                    }
                    Ok(false) => {
                        debug!(item = %item.label(), "not on archive");
                        self.catalog.record_archive_check(item.id, None).await?;
                        progressed = true;
                    }
                    Err(error) => {
                        warn!(item = %item.label(), %identifier, %error, "archive probe failed");
                        summary.errors += 1;
                    }
                }
                summary.checked += 1;
                in_batch += 1;

                if options.limit.is_some_and(|l| summary.checked >= l) {
                    break;
                }
                if in_batch >= self.pacing.batch_size {
                    info!(
                        checked = summary.checked,
                        found = summary.found,
                        pause_secs = self.pacing.batch_pause.as_secs(),
                        "batch complete; pausing"
                    );
                    tokio::time::sleep(self.pacing.batch_pause).await;
                    in_batch = 0;
                } else {
                    self.pacing.delay.pause().await;
                }
            }

            // Failed probes leave items unchecked; stop instead of re-probing them forever.
            if !progressed && !options.continuous {
                break;
            }
        }

        info!(
            checked = summary.checked,
            found = summary.found,
            errors = summary.errors,
            "archive check finished"
        );
        Ok(summary)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_pacing_from_config() {
        let pacing = CheckPacing::from_config(&ArchiveConfig::default());
        assert_eq!(pacing.delay, DelayRange::from_secs(5, 15));
        assert_eq!(pacing.batch_size, 50);
        assert_eq!(pacing.batch_pause, Duration::from_secs(60));
        assert_eq!(pacing.idle_wait, Duration::from_secs(300));
    }
}
