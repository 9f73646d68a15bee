//! Site adapters: per-source enumeration and download resolution.
//!
//! Every source implements [`SiteAdapter`]:
//!
//! - [`SiteAdapter::discover_collections`] finds brand/category listings
//! - [`SiteAdapter::list_page`] reads one numbered page of a listing
//! - [`SiteAdapter::resolve_download`] walks detail pages to a file URL, or
//!   stops at a [`Challenge`] the engine must get solved
//!
//! Adapters only read the network. Persisting what they find is the job of
//! the scrape driver and the download engine.

mod adblock;
mod error;
mod manualsbase;
mod manualslib;
mod manualzz;
mod registry;
mod session;
mod utils;

pub use adblock::HostBlocklist;
pub use error::AdapterError;
pub use manualsbase::ManualsBaseAdapter;
pub use manualslib::ManualsLibAdapter;
pub use manualzz::ManualzzAdapter;
pub use registry::AdapterRegistry;
pub use session::Session;

use async_trait::async_trait;

use crate::catalog::{Collection, ManualItem, NewCollection, NewManual, Source};

/// Items found on one listing page.
#[derive(Debug, Clone, Default)]
pub struct ListingPage {
    pub items: Vec<NewManual>,
    /// The site links a further page.
    pub has_next: bool,
}

impl ListingPage {
    /// True when pagination ends here: no items, or no next page.
    #[must_use]
    pub fn is_last(&self) -> bool {
        self.items.is_empty() || !self.has_next
    }
}

/// Anti-bot widget type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChallengeKind {
    /// Google reCAPTCHA v2.
    Recaptcha,
    /// Cloudflare Turnstile.
    Turnstile,
}

impl ChallengeKind {
    /// Form field the solved token is posted in.
    #[must_use]
    pub fn token_field(self) -> &'static str {
        match self {
            Self::Recaptcha => "g-recaptcha-response",
            Self::Turnstile => "cf-turnstile-response",
        }
    }
}

/// A challenge blocking a download, with what is needed to submit a token.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Challenge {
    pub kind: ChallengeKind,
    pub site_key: String,
    /// Page showing the widget.
    pub page_url: String,
    /// Where the solved form is posted.
    pub submit_url: String,
    /// Hidden form fields posted with the token.
    pub fields: Vec<(String, String)>,
}

impl Challenge {
    /// The form body for `token`: hidden fields plus the token field.
    #[must_use]
    pub fn form_with_token(&self, token: &str) -> Vec<(String, String)> {
        let mut form = self.fields.clone();
        form.push((self.kind.token_field().to_string(), token.to_string()));
        form
    }
}

/// A resolved file transfer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DownloadTarget {
    pub url: String,
    /// Filename to record when the response does not name one.
    pub expected_filename: String,
    /// Form to POST instead of a plain GET.
    pub form: Option<Vec<(String, String)>>,
    pub referer: Option<String>,
    /// Transfer through the adapter's session (cookies, session proxy)
    /// rather than the bulk transfer client.
    pub via_session: bool,
}

impl DownloadTarget {
    #[must_use]
    pub fn get(url: impl Into<String>, expected_filename: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            expected_filename: expected_filename.into(),
            form: None,
            referer: None,
            via_session: false,
        }
    }

    #[must_use]
    pub fn with_form(mut self, form: Vec<(String, String)>) -> Self {
        self.form = Some(form);
        self
    }

    #[must_use]
    pub fn with_referer(mut self, referer: impl Into<String>) -> Self {
        self.referer = Some(referer.into());
        self
    }

    #[must_use]
    pub fn via_session(mut self) -> Self {
        self.via_session = true;
        self
    }
}

/// Outcome of a resolution step.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Resolution {
    /// The file can be fetched.
    Ready(DownloadTarget),
    /// A challenge must be solved first.
    Challenge(Challenge),
}

/// Discover, list and resolve for one source.
///
/// Uses `async_trait` so adapters can be held as `Arc<dyn SiteAdapter>`.
#[async_trait]
pub trait SiteAdapter: Send + Sync {
    fn source(&self) -> Source;

    /// Session used for page navigation and session-bound transfers.
    fn session(&self) -> &Session;

    /// Collections named in configuration, scraped without discovery.
    fn configured_collections(&self) -> Vec<NewCollection>;

    /// Collections for an operator-supplied name (brand slug or URL).
    fn named_collections(&self, name: &str) -> Vec<NewCollection>;

    /// Enumerates the site's collections. Sources without an index return
    /// an empty list.
    async fn discover_collections(&self) -> Result<Vec<NewCollection>, AdapterError>;

    /// Reads page `page` (1-based) of a collection's listing.
    async fn list_page(
        &self,
        collection: &Collection,
        page: u32,
    ) -> Result<ListingPage, AdapterError>;

    /// Walks from the item's detail page towards a file URL.
    async fn resolve_download(&self, item: &ManualItem) -> Result<Resolution, AdapterError>;

    /// Continues resolution with a solved challenge token.
    async fn submit_challenge(
        &self,
        item: &ManualItem,
        challenge: &Challenge,
        token: &str,
    ) -> Result<Resolution, AdapterError>;
}
