//! Cookie-keeping browsing session shared by one adapter.

use std::sync::{Arc, Mutex, PoisonError};

use tracing::{debug, instrument, warn};
use url::Url;

use super::adblock::HostBlocklist;
use super::error::AdapterError;
use crate::catalog::Source;
use crate::download::{DelayRange, DownloadError, HttpClient, Page};

/// A browsing session: one cookie jar, paced navigations, blocked hosts
/// refused, and the previous page sent as Referer.
#[derive(Debug)]
pub struct Session {
    site: Source,
    client: HttpClient,
    navigation_delay: DelayRange,
    blocklist: Arc<HostBlocklist>,
    last_url: Mutex<Option<String>>,
}

impl Session {
    #[must_use]
    pub fn new(site: Source, client: HttpClient, blocklist: Arc<HostBlocklist>) -> Self {
        Self {
            site,
            client,
            navigation_delay: DelayRange::navigation(),
            blocklist,
            last_url: Mutex::new(None),
        }
    }

    #[must_use]
    pub fn with_navigation_delay(mut self, delay: DelayRange) -> Self {
        self.navigation_delay = delay;
        self
    }

    #[must_use]
    pub fn site(&self) -> Source {
        self.site
    }

    /// The session's HTTP client, cookies included.
    #[must_use]
    pub fn client(&self) -> &HttpClient {
        &self.client
    }

    /// URL of the last page visited, used as Referer.
    #[must_use]
    pub fn last_url(&self) -> Option<String> {
        self.last_url
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn remember(&self, url: &Url) {
        *self.last_url.lock().unwrap_or_else(PoisonError::into_inner) = Some(url.to_string());
    }

    /// Parses `url` and refuses blocklisted hosts.
    ///
    /// # Errors
    ///
    /// Returns [`AdapterError::Fetch`] for invalid URLs and blocked hosts.
    pub fn check_url(&self, url: &str) -> Result<Url, AdapterError> {
        let parsed =
            Url::parse(url).map_err(|_| AdapterError::fetch(self.site, DownloadError::invalid_url(url)))?;
        if let Some(entry) = self.blocklist.blocked_entry(&parsed) {
            warn!(site = %self.site, url, entry, "refusing navigation to blocked host");
            return Err(AdapterError::fetch(
                self.site,
                DownloadError::host_blocked(url, entry),
            ));
        }
        Ok(parsed)
    }

    /// Navigates to `url` after the pacing delay.
    ///
    /// # Errors
    ///
    /// Returns [`AdapterError::Fetch`] when the request fails after retries.
    #[instrument(skip(self), fields(site = %self.site))]
    pub async fn get(&self, url: &str) -> Result<Page, AdapterError> {
        self.check_url(url)?;
        self.navigation_delay.pause().await;
        let referer = self.last_url();
        let page = self
            .client
            .get_page(url, referer.as_deref())
            .await
            .map_err(|e| AdapterError::fetch(self.site, e))?;
        debug!(status = page.status, bytes = page.body.len(), "page loaded");
        self.remember(&page.url);
        Ok(page)
    }

    /// Submits a form after the pacing delay.
    ///
    /// # Errors
    ///
    /// Returns [`AdapterError::Fetch`] when the request fails after retries.
    #[instrument(skip(self, form), fields(site = %self.site))]
    pub async fn post_form(
        &self,
        url: &str,
        form: &[(String, String)],
    ) -> Result<Page, AdapterError> {
        self.check_url(url)?;
        self.navigation_delay.pause().await;
        let referer = self.last_url();
        let page = self
            .client
            .post_form_page(url, form, referer.as_deref())
            .await
            .map_err(|e| AdapterError::fetch(self.site, e))?;
        self.remember(&page.url);
        Ok(page)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::download::{ClientOptions, RetryPolicy};
    use wiremock::matchers::{header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn session() -> Session {
        let client = HttpClient::new(
            &ClientOptions::session().with_retry_policy(RetryPolicy::immediate(1)),
        )
        .unwrap();
        Session::new(Source::Manualzz, client, Arc::new(HostBlocklist::builtin()))
            .with_navigation_delay(DelayRange::none())
    }

    #[test]
    fn test_blocked_host_is_refused() {
        let err = session()
            .check_url("https://pagead2.googlesyndication.com/ad.js")
            .unwrap_err();
        assert!(matches!(
            err.download_error(),
            Some(DownloadError::HostBlocked { .. })
        ));
    }

    #[tokio::test]
    async fn test_previous_page_sent_as_referer() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/first"))
            .respond_with(ResponseTemplate::new(200).set_body_string("one"))
            .mount(&server)
            .await;
        let first_url = format!("{}/first", server.uri());
        Mock::given(method("GET"))
            .and(path("/second"))
            .and(header("referer", first_url.as_str()))
            .respond_with(ResponseTemplate::new(200).set_body_string("two"))
            .mount(&server)
            .await;

        let session = session();
        session.get(&first_url).await.unwrap();
        let page = session
            .get(&format!("{}/second", server.uri()))
            .await
            .unwrap();
        assert_eq!(page.body, "two");
        assert_eq!(
            session.last_url().as_deref(),
            Some(format!("{}/second", server.uri()).as_str())
        );
    }

    #[tokio::test]
    async fn test_cookies_persist_across_navigations() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/login"))
            .respond_with(
                ResponseTemplate::new(200)
                    .insert_header("set-cookie", "sid=abc; Path=/")
                    .set_body_string("ok"),
            )
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/doc"))
            .and(header("cookie", "sid=abc"))
            .respond_with(ResponseTemplate::new(200).set_body_string("with cookie"))
            .mount(&server)
            .await;

        let session = session();
        session.get(&format!("{}/login", server.uri())).await.unwrap();
        let page = session.get(&format!("{}/doc", server.uri())).await.unwrap();
        assert_eq!(page.body, "with cookie");
    }
}
