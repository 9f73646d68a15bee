//! Error type for archive sync.

use std::path::PathBuf;

use thiserror::Error;

use crate::catalog::CatalogError;
use crate::download::DownloadError;

/// Errors raised while probing or uploading to the archive.
#[derive(Debug, Error)]
pub enum ArchiveError {
    /// The probe or upload request failed.
    #[error(transparent)]
    Http(#[from] DownloadError),

    /// The archive answered a probe with something other than 200 or 404.
    #[error("unexpected HTTP {status} probing {url}")]
    UnexpectedStatus { url: String, status: u16 },

    /// The upload endpoint rejected the file.
    #[error("upload of {identifier} failed with HTTP {status}: {body}")]
    UploadRejected {
        identifier: String,
        status: u16,
        body: String,
    },

    /// Uploads need an access/secret key pair.
    #[error(
        "archive credentials are not configured\n  Suggestion: Set IA_ACCESS_KEY and IA_SECRET_KEY, or [archive] access_key/secret_key in the config file"
    )]
    MissingCredentials,

    /// A downloaded item's blob is gone from disk.
    #[error("blob for item {id} not found at {path}")]
    MissingBlob { id: i64, path: PathBuf },

    /// Reading the blob failed.
    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The catalog could not be read or updated.
    #[error(transparent)]
    Catalog(#[from] CatalogError),
}

impl ArchiveError {
    /// True for failures that abort a whole run rather than one item.
    #[must_use]
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::Catalog(_) | Self::MissingCredentials)
    }
}
