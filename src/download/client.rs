//! HTTP client wrapper for page fetches and streamed file transfers.
//!
//! One [`HttpClient`] is built per network path (a site session with cookies,
//! or the bulk transfer client) and reused for connection pooling. Transient
//! failures are retried according to the client's [`RetryPolicy`].

use std::future::Future;
use std::path::{Path, PathBuf};
use std::time::Duration;

use futures_util::StreamExt;
use reqwest::header::{CONTENT_DISPOSITION, CONTENT_TYPE, REFERER, RETRY_AFTER};
use reqwest::{Client, Method, Proxy};
use tokio::fs::File;
use tokio::io::{AsyncWriteExt, BufWriter};
use tracing::{debug, instrument, warn};
use url::Url;

use super::constants::{CONNECT_TIMEOUT_SECS, READ_TIMEOUT_SECS, SNIFF_BYTES};
use super::error::DownloadError;
use super::retry::{RetryDecision, RetryPolicy};
use crate::user_agent::BROWSER_USER_AGENT;

/// Construction options for [`HttpClient`].
#[derive(Debug, Clone)]
pub struct ClientOptions {
    pub user_agent: String,
    /// Proxy URL, credentials included.
    pub proxy: Option<Url>,
    /// Keep a cookie jar across requests.
    pub cookies: bool,
    pub connect_timeout: Duration,
    pub read_timeout: Duration,
    pub retry_policy: RetryPolicy,
}

impl Default for ClientOptions {
    fn default() -> Self {
        Self {
            user_agent: BROWSER_USER_AGENT.to_string(),
            proxy: None,
            cookies: false,
            connect_timeout: Duration::from_secs(CONNECT_TIMEOUT_SECS),
            read_timeout: Duration::from_secs(READ_TIMEOUT_SECS),
            retry_policy: RetryPolicy::default(),
        }
    }
}

impl ClientOptions {
    /// Options for a cookie-keeping browsing session.
    #[must_use]
    pub fn session() -> Self {
        Self {
            cookies: true,
            ..Self::default()
        }
    }

    #[must_use]
    pub fn with_proxy(mut self, proxy: Option<Url>) -> Self {
        self.proxy = proxy;
        self
    }

    #[must_use]
    pub fn with_user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.user_agent = user_agent.into();
        self
    }

    #[must_use]
    pub fn with_retry_policy(mut self, policy: RetryPolicy) -> Self {
        self.retry_policy = policy;
        self
    }
}

/// A fetched HTML page.
#[derive(Debug, Clone)]
pub struct Page {
    /// Final URL after redirects.
    pub url: Url,
    pub status: u16,
    pub body: String,
}

/// What to transfer: a GET, or a form POST when `form` is set.
#[derive(Debug, Clone, Copy)]
pub struct FetchRequest<'a> {
    pub url: &'a str,
    pub form: Option<&'a [(String, String)]>,
    pub referer: Option<&'a str>,
}

impl<'a> FetchRequest<'a> {
    #[must_use]
    pub fn get(url: &'a str) -> Self {
        Self {
            url,
            form: None,
            referer: None,
        }
    }
}

/// A body streamed to disk.
#[derive(Debug, Clone)]
pub struct FetchedFile {
    pub path: PathBuf,
    /// Final URL after redirects.
    pub final_url: Url,
    pub bytes: u64,
    pub content_type: Option<String>,
    pub content_disposition: Option<String>,
    /// First bytes of the body, for content sniffing.
    pub head: Vec<u8>,
}

impl FetchedFile {
    /// Rejects empty bodies, HTML pages, and bodies that are neither PDF
    /// magic nor served as a PDF/binary type.
    ///
    /// # Errors
    ///
    /// Returns [`DownloadError::Verification`] describing the rejection.
    pub fn verify(&self) -> Result<(), DownloadError> {
        let url = self.final_url.as_str();
        if self.bytes == 0 {
            return Err(DownloadError::verification(url, "empty body"));
        }

        let content_type = self
            .content_type
            .as_deref()
            .unwrap_or("")
            .to_ascii_lowercase();
        let head = String::from_utf8_lossy(&self.head[..self.head.len().min(512)])
            .trim_start()
            .to_ascii_lowercase();
        if content_type.contains("text/html")
            || head.starts_with("<!doctype html")
            || head.starts_with("<html")
        {
            return Err(DownloadError::verification(
                url,
                "received an HTML page instead of a document",
            ));
        }

        let pdf_magic = self.head.starts_with(b"%PDF");
        let binary_type = content_type.contains("application/pdf")
            || content_type.contains("application/octet-stream")
            || content_type.contains("application/x-pdf")
            || content_type.contains("binary/octet-stream");
        if !pdf_magic && !binary_type {
            let shown = if content_type.is_empty() {
                "none"
            } else {
                content_type.as_str()
            };
            return Err(DownloadError::verification(
                url,
                format!("not a PDF (content type {shown})"),
            ));
        }
        Ok(())
    }
}

/// HTTP client for pages and streamed downloads.
#[derive(Debug, Clone)]
pub struct HttpClient {
    client: Client,
    retry_policy: RetryPolicy,
}

impl HttpClient {
    /// Builds a client from `options`.
    ///
    /// # Errors
    ///
    /// Returns [`DownloadError::ClientBuild`] if the proxy URL or TLS backend
    /// cannot be set up.
    pub fn new(options: &ClientOptions) -> Result<Self, DownloadError> {
        let mut builder = Client::builder()
            .connect_timeout(options.connect_timeout)
            .timeout(options.read_timeout)
            .gzip(true)
            .user_agent(options.user_agent.as_str());
        if options.cookies {
            builder = builder.cookie_store(true);
        }
        if let Some(proxy) = &options.proxy {
            builder = builder.proxy(Proxy::all(proxy.as_str()).map_err(DownloadError::ClientBuild)?);
        }
        let client = builder.build().map_err(DownloadError::ClientBuild)?;
        Ok(Self {
            client,
            retry_policy: options.retry_policy.clone(),
        })
    }

    /// Returns the underlying reqwest client.
    #[must_use]
    pub fn inner(&self) -> &Client {
        &self.client
    }

    /// Fetches a page as text.
    ///
    /// # Errors
    ///
    /// Returns the last [`DownloadError`] once retries are exhausted.
    #[instrument(skip(self, referer))]
    pub async fn get_page(&self, url: &str, referer: Option<&str>) -> Result<Page, DownloadError> {
        self.with_retry(url, || async {
            let response = self.send(Method::GET, url, None, referer).await?;
            read_page(url, response).await
        })
        .await
    }

    /// Submits a form and returns the response page.
    ///
    /// # Errors
    ///
    /// Returns the last [`DownloadError`] once retries are exhausted.
    #[instrument(skip(self, form, referer))]
    pub async fn post_form_page(
        &self,
        url: &str,
        form: &[(String, String)],
        referer: Option<&str>,
    ) -> Result<Page, DownloadError> {
        self.with_retry(url, || async {
            let response = self.send(Method::POST, url, Some(form), referer).await?;
            read_page(url, response).await
        })
        .await
    }

    /// Returns the status of a HEAD request without treating 4xx/5xx as errors.
    ///
    /// # Errors
    ///
    /// Returns [`DownloadError`] on network failure after retries.
    pub async fn head_status(&self, url: &str) -> Result<u16, DownloadError> {
        self.with_retry(url, || async {
            let parsed = Url::parse(url).map_err(|_| DownloadError::invalid_url(url))?;
            let response = self
                .client
                .head(parsed)
                .send()
                .await
                .map_err(|e| DownloadError::from_reqwest(url, e))?;
            let status = response.status().as_u16();
            if (500..600).contains(&status) || status == 429 {
                return Err(DownloadError::http_status(url, status));
            }
            Ok(status)
        })
        .await
    }

    /// Streams a response body to `dest`, removing the partial file on failure.
    ///
    /// # Errors
    ///
    /// Returns the last [`DownloadError`] once retries are exhausted.
    #[instrument(skip(self, request, dest), fields(url = %request.url))]
    pub async fn fetch_to_file(
        &self,
        request: &FetchRequest<'_>,
        dest: &Path,
    ) -> Result<FetchedFile, DownloadError> {
        self.with_retry(request.url, || self.fetch_once(request, dest))
            .await
    }

    async fn fetch_once(
        &self,
        request: &FetchRequest<'_>,
        dest: &Path,
    ) -> Result<FetchedFile, DownloadError> {
        let method = if request.form.is_some() {
            Method::POST
        } else {
            Method::GET
        };
        let response = self
            .send(method, request.url, request.form, request.referer)
            .await?;

        let final_url = response.url().clone();
        let content_type = header_string(&response, CONTENT_TYPE);
        let content_disposition = header_string(&response, CONTENT_DISPOSITION);

        let mut file = File::create(dest)
            .await
            .map_err(|e| DownloadError::io(dest, e))?;
        let streamed = stream_to_file(&mut file, response, request.url, dest).await;
        drop(file);

        let (bytes, head) = match streamed {
            Ok(result) => result,
            Err(error) => {
                debug!(path = %dest.display(), "removing partial file after error");
                let _ = tokio::fs::remove_file(dest).await;
                return Err(error);
            }
        };

        debug!(bytes, path = %dest.display(), "transfer complete");
        Ok(FetchedFile {
            path: dest.to_path_buf(),
            final_url,
            bytes,
            content_type,
            content_disposition,
            head,
        })
    }

    async fn send(
        &self,
        method: Method,
        url: &str,
        form: Option<&[(String, String)]>,
        referer: Option<&str>,
    ) -> Result<reqwest::Response, DownloadError> {
        let parsed = Url::parse(url).map_err(|_| DownloadError::invalid_url(url))?;
        let mut request = self.client.request(method, parsed);
        if let Some(referer) = referer {
            request = request.header(REFERER, referer);
        }
        if let Some(form) = form {
            request = request
                .header(CONTENT_TYPE, "application/x-www-form-urlencoded")
                .body(encode_form(form));
        }

        let response = request
            .send()
            .await
            .map_err(|e| DownloadError::from_reqwest(url, e))?;

        let status = response.status().as_u16();
        if response.status().is_success() {
            return Ok(response);
        }
        if matches!(status, 403 | 407) {
            return Err(DownloadError::blocked(url, status));
        }
        let retry_after = header_string(&response, RETRY_AFTER);
        Err(DownloadError::http_status_with_retry_after(
            url,
            status,
            retry_after,
        ))
    }

    async fn with_retry<T, F, Fut>(&self, url: &str, mut operation: F) -> Result<T, DownloadError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, DownloadError>>,
    {
        let mut attempt = 1;
        loop {
            match operation().await {
                Ok(value) => return Ok(value),
                Err(error) => match self.retry_policy.decide(&error, attempt) {
                    RetryDecision::Retry {
                        delay,
                        attempt: next,
                    } => {
                        warn!(
                            url,
                            attempt,
                            delay_ms = delay.as_millis(),
                            error = %error,
                            "request failed; retrying"
                        );
                        tokio::time::sleep(delay).await;
                        attempt = next;
                    }
                    RetryDecision::DoNotRetry { reason } => {
                        debug!(url, attempt, %reason, "not retrying");
                        return Err(error);
                    }
                },
            }
        }
    }
}

/// `application/x-www-form-urlencoded` body for `pairs`.
pub(crate) fn encode_form(pairs: &[(String, String)]) -> String {
    url::form_urlencoded::Serializer::new(String::new())
        .extend_pairs(pairs.iter().map(|(k, v)| (k.as_str(), v.as_str())))
        .finish()
}

fn header_string(
    response: &reqwest::Response,
    name: reqwest::header::HeaderName,
) -> Option<String> {
    response
        .headers()
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(ToString::to_string)
}

async fn read_page(url: &str, response: reqwest::Response) -> Result<Page, DownloadError> {
    let final_url = response.url().clone();
    let status = response.status().as_u16();
    let body = response
        .text()
        .await
        .map_err(|e| DownloadError::from_reqwest(url, e))?;
    Ok(Page {
        url: final_url,
        status,
        body,
    })
}

/// Streams the body to `file`, returning the byte count and sniff prefix.
async fn stream_to_file(
    file: &mut File,
    response: reqwest::Response,
    url: &str,
    file_path: &Path,
) -> Result<(u64, Vec<u8>), DownloadError> {
    let mut writer = BufWriter::new(file);
    let mut stream = response.bytes_stream();
    let mut bytes_written: u64 = 0;
    let mut head = Vec::with_capacity(SNIFF_BYTES);

    while let Some(chunk_result) = stream.next().await {
        let chunk = chunk_result.map_err(|e| DownloadError::from_reqwest(url, e))?;
        if head.len() < SNIFF_BYTES {
            let take = (SNIFF_BYTES - head.len()).min(chunk.len());
            head.extend_from_slice(&chunk[..take]);
        }
        writer
            .write_all(&chunk)
            .await
            .map_err(|e| DownloadError::io(file_path, e))?;
        bytes_written += chunk.len() as u64;
    }

    writer
        .flush()
        .await
        .map_err(|e| DownloadError::io(file_path, e))?;

    Ok((bytes_written, head))
}
