//! Error types for page fetches and file transfers.

use std::path::PathBuf;

use thiserror::Error;

/// Errors that can occur while fetching pages or downloading files.
#[derive(Debug, Error)]
pub enum DownloadError {
    /// Network-level error (DNS resolution, connection refused, TLS errors, etc.)
    #[error("network error fetching {url}: {source}")]
    Network {
        /// The URL that failed.
        url: String,
        /// The underlying network error.
        #[source]
        source: reqwest::Error,
    },

    /// Request timed out before completion.
    #[error("timeout fetching {url}")]
    Timeout {
        /// The URL that timed out.
        url: String,
    },

    /// HTTP error response (4xx client errors, 5xx server errors).
    #[error("HTTP {status} fetching {url}")]
    HttpStatus {
        /// The URL that returned an error status.
        url: String,
        /// The HTTP status code.
        status: u16,
        /// The Retry-After header value, if present (for 429 responses).
        retry_after: Option<String>,
    },

    /// The site refused the request (anti-bot block, IP ban, bad proxy credentials).
    #[error("[BLOCKED] HTTP {status} fetching {url}\n  Suggestion: {suggestion}")]
    Blocked {
        /// The refused URL.
        url: String,
        /// 403, 407 or 451.
        status: u16,
        /// User-facing hint.
        suggestion: &'static str,
    },

    /// Navigation to an ad/tracker host was refused locally.
    #[error("request to blocked host {host} refused: {url}")]
    HostBlocked {
        /// The refused URL.
        url: String,
        /// Matching host.
        host: String,
    },

    /// File system error during download (create file, write, etc.)
    #[error("IO error writing to {path}: {source}")]
    Io {
        /// The file path where the error occurred.
        path: PathBuf,
        /// The underlying IO error.
        #[source]
        source: std::io::Error,
    },

    /// The provided URL is malformed or invalid.
    #[error("invalid URL: {url}")]
    InvalidUrl {
        /// The invalid URL string.
        url: String,
    },

    /// The transferred body is not a plausible manual.
    #[error("verification failed for {url}: {reason}")]
    Verification {
        /// URL the body came from.
        url: String,
        /// What was wrong with it.
        reason: String,
    },

    /// The HTTP client could not be constructed (bad proxy URL, TLS backend).
    #[error("failed to build HTTP client: {0}")]
    ClientBuild(#[source] reqwest::Error),
}

impl DownloadError {
    /// Creates a network error from a reqwest error.
    pub fn network(url: impl Into<String>, source: reqwest::Error) -> Self {
        Self::Network {
            url: url.into(),
            source,
        }
    }

    /// Creates a network or timeout error depending on the reqwest error kind.
    pub fn from_reqwest(url: impl Into<String>, source: reqwest::Error) -> Self {
        if source.is_timeout() {
            Self::timeout(url)
        } else {
            Self::network(url, source)
        }
    }

    /// Creates an HTTP status error.
    pub fn http_status(url: impl Into<String>, status: u16) -> Self {
        Self::HttpStatus {
            url: url.into(),
            status,
            retry_after: None,
        }
    }

    /// Creates an HTTP status error with a Retry-After header value.
    pub fn http_status_with_retry_after(
        url: impl Into<String>,
        status: u16,
        retry_after: Option<String>,
    ) -> Self {
        Self::HttpStatus {
            url: url.into(),
            status,
            retry_after,
        }
    }

    /// Creates a timeout error.
    pub fn timeout(url: impl Into<String>) -> Self {
        Self::Timeout { url: url.into() }
    }

    /// Creates an IO error.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    /// Creates an invalid URL error.
    pub fn invalid_url(url: impl Into<String>) -> Self {
        Self::InvalidUrl { url: url.into() }
    }

    /// Creates a verification failure.
    pub fn verification(url: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Verification {
            url: url.into(),
            reason: reason.into(),
        }
    }

    /// Creates a blocked-request error.
    ///
    /// 407 points at the proxy credentials; anything else at the request rate.
    pub fn blocked(url: impl Into<String>, status: u16) -> Self {
        let suggestion = if status == 407 {
            "Check the proxy host and credentials in the config file or PROXY_* variables."
        } else {
            "The site is refusing requests; wait before retrying or enable use_proxy."
        };
        Self::Blocked {
            url: url.into(),
            status,
            suggestion,
        }
    }

    /// Creates an error for a request to a blocklisted host.
    pub fn host_blocked(url: impl Into<String>, host: impl Into<String>) -> Self {
        Self::HostBlocked {
            url: url.into(),
            host: host.into(),
        }
    }

    /// Returns the HTTP status carried by this error, if any.
    #[must_use]
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::HttpStatus { status, .. } | Self::Blocked { status, .. } => Some(*status),
            _ => None,
        }
    }
}
