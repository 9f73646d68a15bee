//! Re-probes archived items and optionally clears the flag on missing ones.

use tracing::{info, instrument, warn};

use super::client::ArchiveClient;
use super::error::ArchiveError;
use super::identifier::item_identifier;
use crate::catalog::{Catalog, ManualItem, Source};
use crate::download::DelayRange;

/// Result of a verification pass.
#[derive(Debug, Clone, Default)]
pub struct VerifyReport {
    pub checked: u32,
    /// Archived items whose identifier the archive does not know.
    pub missing: Vec<ManualItem>,
    /// Probes that failed; those items are left as they are.
    pub errors: u32,
    /// Items whose archived flag was cleared.
    pub fixed: u32,
}

/// Probes every archived item (of `source`, if given). With `fix`, missing
/// items go back to their pre-archive state so the uploader picks them up.
///
/// # Errors
///
/// Returns [`ArchiveError::Catalog`] when the catalog cannot be read or
/// updated.
#[instrument(skip(catalog, client, delay))]
pub async fn verify_archived(
    catalog: &Catalog,
    client: &ArchiveClient,
    source: Option<Source>,
    fix: bool,
    delay: DelayRange,
) -> Result<VerifyReport, ArchiveError> {
    let items = catalog.list_archived(source).await?;
    info!(items = items.len(), "verifying archived items");

    let mut report = VerifyReport::default();
    for item in items {
        let identifier = item_identifier(&item);
        match client.exists(&identifier).await {
            Ok(true) => {}
            Ok(false) => {
                warn!(item = %item.label(), %identifier, "missing from archive");
                if fix {
                    catalog.unmark_archived(item.id).await?;
                    report.fixed += 1;
                }
                report.missing.push(item);
            }
            Err(error) => {
                warn!(item = %item.label(), %error, "verification probe failed");
                report.errors += 1;
            }
        }
        report.checked += 1;
        delay.pause().await;
    }

    info!(
        checked = report.checked,
        missing = report.missing.len(),
        fixed = report.fixed,
        "verification finished"
    );
    Ok(report)
}
