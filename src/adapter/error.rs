//! Error type for site adapters.

use thiserror::Error;

use crate::catalog::Source;
use crate::download::DownloadError;

/// Errors raised while enumerating or resolving against a site.
#[derive(Debug, Error)]
pub enum AdapterError {
    /// A page request failed (network, HTTP status, blocked host).
    #[error("{site}: {error}")]
    Fetch {
        site: Source,
        #[source]
        error: DownloadError,
    },

    /// A page did not have the structure the adapter expects.
    #[error(
        "{site}: unexpected page structure at {url}: {reason}\n  Suggestion: The site layout may have changed; inspect the page and update the adapter"
    )]
    Structural {
        site: Source,
        url: String,
        reason: String,
    },

    /// A configured value cannot be used (bad base URL, unknown collection).
    #[error("{site}: {reason}")]
    Config { site: Source, reason: String },
}

impl AdapterError {
    pub fn fetch(site: Source, error: DownloadError) -> Self {
        Self::Fetch { site, error }
    }

    pub fn structural(site: Source, url: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Structural {
            site,
            url: url.into(),
            reason: reason.into(),
        }
    }

    pub fn config(site: Source, reason: impl Into<String>) -> Self {
        Self::Config {
            site,
            reason: reason.into(),
        }
    }

    /// True for layout mismatches, which are never retried blindly.
    #[must_use]
    pub fn is_structural(&self) -> bool {
        matches!(self, Self::Structural { .. })
    }

    /// The underlying fetch error, if any.
    #[must_use]
    pub fn download_error(&self) -> Option<&DownloadError> {
        match self {
            Self::Fetch { error, .. } => Some(error),
            _ => None,
        }
    }
}
