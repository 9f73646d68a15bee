//! Archive HTTP client: existence probes and S3-style uploads.

use std::path::Path;

use reqwest::header::{AUTHORIZATION, CONTENT_TYPE};
use tracing::{debug, info, instrument};
use url::Url;

use super::error::ArchiveError;
use super::metadata::UploadMetadata;
use crate::config::ArchiveConfig;
use crate::download::{ClientOptions, DownloadError, HttpClient};
use crate::user_agent::service_user_agent;

const DEFAULT_DETAILS_BASE: &str = "https://archive.org/details/";
const DEFAULT_S3_BASE: &str = "https://s3.us.archive.org/";

/// Access/secret key pair for uploads.
#[derive(Clone, PartialEq, Eq)]
pub struct ArchiveCredentials {
    pub access_key: String,
    pub secret_key: String,
}

impl std::fmt::Debug for ArchiveCredentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ArchiveCredentials")
            .field("access_key", &self.access_key)
            .field("secret_key", &"<redacted>")
            .finish()
    }
}

impl ArchiveCredentials {
    /// Both keys from the config, when both are set.
    #[must_use]
    pub fn from_config(config: &ArchiveConfig) -> Option<Self> {
        match (&config.access_key, &config.secret_key) {
            (Some(access), Some(secret)) if !access.is_empty() && !secret.is_empty() => {
                Some(Self {
                    access_key: access.clone(),
                    secret_key: secret.clone(),
                })
            }
            _ => None,
        }
    }

    fn header(&self) -> String {
        format!("LOW {}:{}", self.access_key, self.secret_key)
    }
}

/// Talks to the archive's details pages and upload endpoint.
#[derive(Debug, Clone)]
pub struct ArchiveClient {
    http: HttpClient,
    details_base: Url,
    s3_base: Url,
    credentials: Option<ArchiveCredentials>,
}

impl ArchiveClient {
    /// # Errors
    ///
    /// Returns [`DownloadError::ClientBuild`] if the HTTP client cannot be set up.
    pub fn new(credentials: Option<ArchiveCredentials>) -> Result<Self, ArchiveError> {
        Self::with_base_urls(credentials, DEFAULT_DETAILS_BASE, DEFAULT_S3_BASE)
    }

    /// Client against custom endpoints (for tests).
    ///
    /// # Errors
    ///
    /// Returns [`DownloadError::InvalidUrl`] for unparsable bases.
    pub fn with_base_urls(
        credentials: Option<ArchiveCredentials>,
        details_base: &str,
        s3_base: &str,
    ) -> Result<Self, ArchiveError> {
        let http = HttpClient::new(&ClientOptions::default().with_user_agent(service_user_agent()))?;
        Ok(Self {
            http,
            details_base: parse_base(details_base)?,
            s3_base: parse_base(s3_base)?,
            credentials,
        })
    }

    /// Replaces the HTTP client (retry policy, timeouts).
    #[must_use]
    pub fn with_http_client(mut self, http: HttpClient) -> Self {
        self.http = http;
        self
    }

    #[must_use]
    pub fn has_credentials(&self) -> bool {
        self.credentials.is_some()
    }

    /// Public page of an identifier, also recorded as the item's archive URL.
    #[must_use]
    pub fn details_url(&self, identifier: &str) -> String {
        self.details_base
            .join(identifier)
            .map_or_else(|_| format!("{}{identifier}", self.details_base), String::from)
    }

    fn upload_url(&self, identifier: &str, filename: &str) -> Result<Url, ArchiveError> {
        let path = format!(
            "{}/{}",
            urlencoding::encode(identifier),
            urlencoding::encode(filename)
        );
        self.s3_base
            .join(&path)
            .map_err(|_| DownloadError::invalid_url(format!("{}{path}", self.s3_base)).into())
    }

    /// Probes the details page: 200 means the item exists, 404 that it does not.
    ///
    /// # Errors
    ///
    /// Returns [`ArchiveError::UnexpectedStatus`] for any other status and
    /// [`ArchiveError::Http`] for network failures.
    #[instrument(skip(self))]
    pub async fn exists(&self, identifier: &str) -> Result<bool, ArchiveError> {
        let url = self.details_url(identifier);
        let status = self.http.head_status(&url).await?;
        debug!(status, "archive probe");
        match status {
            200 => Ok(true),
            404 => Ok(false),
            status => Err(ArchiveError::UnexpectedStatus { url, status }),
        }
    }

    /// Uploads `file` under `metadata.identifier`, creating the item.
    ///
    /// # Errors
    ///
    /// Returns [`ArchiveError::MissingCredentials`] without keys,
    /// [`ArchiveError::Io`] if the file cannot be read, and
    /// [`ArchiveError::UploadRejected`] for a non-success response.
    #[instrument(skip(self, metadata, file), fields(identifier = %metadata.identifier))]
    pub async fn upload(&self, metadata: &UploadMetadata, file: &Path) -> Result<String, ArchiveError> {
        let credentials = self
            .credentials
            .as_ref()
            .ok_or(ArchiveError::MissingCredentials)?;
        let body = tokio::fs::read(file).await.map_err(|source| ArchiveError::Io {
            path: file.to_path_buf(),
            source,
        })?;
        let url = self.upload_url(&metadata.identifier, &metadata.remote_filename)?;

        let mut request = self
            .http
            .inner()
            .put(url.clone())
            .header(AUTHORIZATION, credentials.header())
            .header(CONTENT_TYPE, "application/pdf");
        for (name, value) in metadata.headers() {
            request = request.header(name, value);
        }

        let response = request
            .body(body)
            .send()
            .await
            .map_err(|e| DownloadError::from_reqwest(url.as_str(), e))?;
        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(ArchiveError::UploadRejected {
                identifier: metadata.identifier.clone(),
                status: status.as_u16(),
                body: text.chars().take(500).collect(),
            });
        }

        let details = self.details_url(&metadata.identifier);
        info!(url = %details, "upload accepted");
        Ok(details)
    }
}

fn parse_base(base: &str) -> Result<Url, ArchiveError> {
    let normalized = if base.ends_with('/') {
        base.to_string()
    } else {
        format!("{base}/")
    };
    Url::parse(&normalized).map_err(|_| DownloadError::invalid_url(base).into())
}
