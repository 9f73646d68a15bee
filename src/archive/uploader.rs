//! Uploads downloaded manuals that are not yet archived.

use std::path::PathBuf;

use tracing::{error, info, instrument, warn};

use super::client::ArchiveClient;
use super::error::ArchiveError;
use super::metadata::{UploadMetadata, external_identifiers};
use crate::blob::file_checksums;
use crate::catalog::{Catalog, ManualItem, Source};

/// Options for [`Uploader::run`].
#[derive(Debug, Clone, Default)]
pub struct UploadOptions {
    pub source: Option<Source>,
    pub limit: Option<u32>,
    /// Build metadata and report it without contacting the archive.
    pub dry_run: bool,
}

/// What would be uploaded for one item.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadPreview {
    pub item_id: i64,
    pub file: PathBuf,
    pub metadata: UploadMetadata,
}

/// Totals for one uploader run.
#[derive(Debug, Clone, Default)]
pub struct UploadSummary {
    pub uploaded: u32,
    /// Items found on the archive already and marked without uploading.
    pub already_present: u32,
    pub failed: u32,
    /// Filled in dry-run mode only.
    pub previews: Vec<UploadPreview>,
}

/// Pushes downloaded items to the archive and marks them archived.
#[derive(Debug, Clone)]
pub struct Uploader {
    catalog: Catalog,
    client: ArchiveClient,
}

impl Uploader {
    #[must_use]
    pub fn new(catalog: Catalog, client: ArchiveClient) -> Self {
        Self { catalog, client }
    }

    /// Uploads up to `limit` downloaded, unarchived items.
    ///
    /// # Errors
    ///
    /// Returns [`ArchiveError::Catalog`] for catalog failures and
    /// [`ArchiveError::MissingCredentials`] when uploading without keys.
    /// Per-item failures are logged and counted.
    #[instrument(skip(self, options), fields(dry_run = options.dry_run))]
    pub async fn run(&self, options: &UploadOptions) -> Result<UploadSummary, ArchiveError> {
        if !options.dry_run && !self.client.has_credentials() {
            return Err(ArchiveError::MissingCredentials);
        }

        let items = self
            .catalog
            .list_uploadable(options.source, options.limit)
            .await?;
        info!(items = items.len(), "uploadable items");

        let mut summary = UploadSummary::default();
        for item in items {
            let Some(file) = item.blob_path.as_ref().map(PathBuf::from) else {
                warn!(item = %item.label(), "downloaded item has no blob path");
                summary.failed += 1;
                continue;
            };
            let mut metadata = UploadMetadata::for_item(&item);
            if item.file_md5.is_none() || item.file_sha1.is_none() {
                match file_checksums(&file).await {
                    Ok(checksums) => {
                        metadata.external_identifiers = external_identifiers(
                            Some(checksums.md5.as_str()),
                            Some(checksums.sha1.as_str()),
                            item.content_hash.as_deref(),
                        );
                    }
                    Err(e) => warn!(item = %item.label(), error = %e, "cannot checksum blob"),
                }
            }

            if options.dry_run {
                info!(
                    item = %item.label(),
                    identifier = %metadata.identifier,
                    title = %metadata.title,
                    remote = %metadata.remote_filename,
                    "would upload"
                );
                summary.previews.push(UploadPreview {
                    item_id: item.id,
                    file,
                    metadata,
                });
                continue;
            }

            match self.upload_one(&item, &metadata, file).await {
                Ok(UploadOutcome::Uploaded) => summary.uploaded += 1,
                Ok(UploadOutcome::AlreadyPresent) => summary.already_present += 1,
                Err(e) if e.is_fatal() => return Err(e),
                Err(e) => {
                    error!(item = %item.label(), error = %e, "upload failed");
                    summary.failed += 1;
                }
            }
        }

        info!(
            uploaded = summary.uploaded,
            already_present = summary.already_present,
            failed = summary.failed,
            "upload run finished"
        );
        Ok(summary)
    }

    async fn upload_one(
        &self,
        item: &ManualItem,
        metadata: &UploadMetadata,
        file: PathBuf,
    ) -> Result<UploadOutcome, ArchiveError> {
        if self.client.exists(&metadata.identifier).await? {
            let url = self.client.details_url(&metadata.identifier);
            info!(item = %item.label(), %url, "already on archive; marking");
            self.catalog.mark_archived(item.id, &url).await?;
            return Ok(UploadOutcome::AlreadyPresent);
        }
        if !tokio::fs::try_exists(&file).await.unwrap_or(false) {
            return Err(ArchiveError::MissingBlob { id: item.id, path: file });
        }
        let url = self.client.upload(metadata, &file).await?;
        self.catalog.mark_archived(item.id, &url).await?;
        Ok(UploadOutcome::Uploaded)
    }
}

enum UploadOutcome {
    Uploaded,
    AlreadyPresent,
}
