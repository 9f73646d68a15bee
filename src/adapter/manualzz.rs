//! Manualzz (`manualzz.com`) adapter.
//!
//! Manualzz has no brand index; collections are catalog URLs from the
//! configuration or the command line.

use std::collections::HashSet;
use std::sync::LazyLock;

use async_trait::async_trait;
use regex::Regex;
use scraper::{ElementRef, Html, Selector};
use tracing::{debug, instrument};
use url::Url;

use super::utils::{
    absolutize, capture, compile_static_regex, compile_static_selector, detect_challenge,
    element_text, page_url,
};
use super::{
    AdapterError, Challenge, DownloadTarget, ListingPage, Resolution, Session, SiteAdapter,
};
use crate::catalog::{Collection, ManualItem, NewCollection, NewManual, Source};
use crate::config::ManualzzConfig;
use crate::download::expected_filename;

const DEFAULT_BASE_URL: &str = "https://manualzz.com";
const SOURCE: Source = Source::Manualzz;
const UNKNOWN: &str = "Unknown";

static DOC_LINK: LazyLock<Selector> =
    LazyLock::new(|| compile_static_selector(r#"a[href*="/doc/"]"#));
static NEXT_LINK: LazyLock<Selector> =
    LazyLock::new(|| compile_static_selector(r#"a.next, a[rel="next"]"#));
static NEARBY_TITLE: LazyLock<Selector> =
    LazyLock::new(|| compile_static_selector("h3, h4, .title, span"));
static FORMAT_LINK: LazyLock<Selector> =
    LazyLock::new(|| compile_static_selector(".formats a.format"));
static PDF_LINK: LazyLock<Selector> =
    LazyLock::new(|| compile_static_selector(r#"a[href*=".pdf"]"#));

static DOC_ID_RE: LazyLock<Regex> = LazyLock::new(|| compile_static_regex(r"/doc/(\d+)"));
static DOWNLOAD_ID_RE: LazyLock<Regex> =
    LazyLock::new(|| compile_static_regex(r"/download/(\d+)"));

/// Document id from a `/doc/{id}` or `/download/{id}` URL.
pub(crate) fn manualzz_id(url: &str) -> Option<String> {
    capture(&DOC_ID_RE, url).or_else(|| capture(&DOWNLOAD_ID_RE, url))
}

/// Category name from a catalog URL: the last path segment, `+` and
/// percent-escapes decoded.
pub(crate) fn category_from_url(url: &str) -> String {
    let segment = Url::parse(url)
        .ok()
        .and_then(|u| {
            u.path_segments()
                .and_then(|mut s| s.rfind(|seg| !seg.is_empty()).map(str::to_string))
        })
        .unwrap_or_default();
    if segment.is_empty() {
        return UNKNOWN.to_string();
    }
    let spaced = segment.replace('+', " ");
    urlencoding::decode(&spaced)
        .map(|s| s.into_owned())
        .unwrap_or(spaced)
}

fn catalog_collection(url: &str) -> Option<NewCollection> {
    let parsed = Url::parse(url.trim()).ok()?;
    let slug = parsed.path().trim_matches('/').to_string();
    if slug.is_empty() {
        return None;
    }
    let category = category_from_url(parsed.as_str());
    Some(
        NewCollection::new(SOURCE, slug, parsed.as_str())
            .with_display_name(category.clone())
            .with_tag(category.to_lowercase()),
    )
}

/// Manualzz adapter.
#[derive(Debug)]
pub struct ManualzzAdapter {
    session: Session,
    base_url: Url,
    catalog_urls: Vec<String>,
}

impl ManualzzAdapter {
    /// # Errors
    ///
    /// Never fails for the built-in base URL; see [`Self::with_base_url`].
    pub fn new(session: Session, config: &ManualzzConfig) -> Result<Self, AdapterError> {
        Self::with_base_url(session, config, DEFAULT_BASE_URL)
    }

    /// # Errors
    ///
    /// Returns [`AdapterError::Config`] if `base_url` is not a URL.
    pub fn with_base_url(
        session: Session,
        config: &ManualzzConfig,
        base_url: &str,
    ) -> Result<Self, AdapterError> {
        let base_url = Url::parse(base_url)
            .map_err(|e| AdapterError::config(SOURCE, format!("invalid base URL {base_url}: {e}")))?;
        Ok(Self {
            session,
            base_url,
            catalog_urls: config.catalog_urls.clone(),
        })
    }

    fn download_page_url(&self, item: &ManualItem) -> Result<String, AdapterError> {
        let id = manualzz_id(&item.detail_page_url).unwrap_or_else(|| item.source_id.clone());
        self.base_url
            .join(&format!("/download/{id}"))
            .map(String::from)
            .map_err(|e| AdapterError::config(SOURCE, e.to_string()))
    }

    fn target_from_page(
        &self,
        item: &ManualItem,
        html: &str,
        page: &Url,
    ) -> Result<DownloadTarget, AdapterError> {
        let url = find_file_link(html, page).ok_or_else(|| {
            AdapterError::structural(SOURCE, page.as_str(), "no PDF format link on download page")
        })?;
        Ok(DownloadTarget::get(url, expected_filename(&[&item.model]))
            .with_referer(page.as_str())
            .via_session())
    }
}

#[async_trait]
impl SiteAdapter for ManualzzAdapter {
    fn source(&self) -> Source {
        SOURCE
    }

    fn session(&self) -> &Session {
        &self.session
    }

    fn configured_collections(&self) -> Vec<NewCollection> {
        self.catalog_urls
            .iter()
            .filter_map(|u| catalog_collection(u))
            .collect()
    }

    fn named_collections(&self, name: &str) -> Vec<NewCollection> {
        catalog_collection(name).into_iter().collect()
    }

    async fn discover_collections(&self) -> Result<Vec<NewCollection>, AdapterError> {
        Ok(Vec::new())
    }

    #[instrument(skip(self, collection), fields(site = %SOURCE, collection = %collection.slug))]
    async fn list_page(
        &self,
        collection: &Collection,
        page: u32,
    ) -> Result<ListingPage, AdapterError> {
        let url = page_url(&collection.listing_url, page);
        let response = self.session.get(&url).await?;
        let category = collection
            .tags()
            .ok()
            .and_then(|tags| tags.into_iter().next())
            .unwrap_or_else(|| collection.display_name.clone());
        let listing = parse_listing(&response.body, &response.url, &category);
        debug!(page, items = listing.items.len(), has_next = listing.has_next, "listing parsed");
        Ok(listing)
    }

    #[instrument(skip(self, item), fields(site = %SOURCE, source_id = %item.source_id))]
    async fn resolve_download(&self, item: &ManualItem) -> Result<Resolution, AdapterError> {
        let url = self.download_page_url(item)?;
        let page = self.session.get(&url).await?;
        if let Some(challenge) = parse_challenge(&page.body, &page.url) {
            return Ok(Resolution::Challenge(challenge));
        }
        self.target_from_page(item, &page.body, &page.url)
            .map(Resolution::Ready)
    }

    async fn submit_challenge(
        &self,
        item: &ManualItem,
        challenge: &Challenge,
        token: &str,
    ) -> Result<Resolution, AdapterError> {
        let page = self
            .session
            .post_form(&challenge.submit_url, &challenge.form_with_token(token))
            .await?;
        self.target_from_page(item, &page.body, &page.url)
            .map(Resolution::Ready)
    }
}

fn parse_challenge(html: &str, page: &Url) -> Option<Challenge> {
    detect_challenge(&Html::parse_document(html), page)
}

fn link_title(link: &ElementRef<'_>) -> String {
    let own = link
        .value()
        .attr("title")
        .map(|t| t.trim().to_string())
        .filter(|t| !t.is_empty())
        .unwrap_or_else(|| element_text(link));
    if own.chars().count() >= 3 {
        return own;
    }
    link.parent()
        .and_then(ElementRef::wrap)
        .and_then(|parent| parent.select(&NEARBY_TITLE).next())
        .map(|el| element_text(&el))
        .filter(|t| !t.is_empty())
        .unwrap_or(own)
}

fn parse_listing(html: &str, base: &Url, category: &str) -> ListingPage {
    let document = Html::parse_document(html);
    let mut seen = HashSet::new();
    let mut items = Vec::new();

    for link in document.select(&DOC_LINK) {
        let Some(url) = link.value().attr("href").and_then(|h| absolutize(h, base)) else {
            continue;
        };
        if !seen.insert(url.clone()) {
            continue;
        }
        let Some(id) = manualzz_id(&url) else {
            continue;
        };
        let mut title = link_title(&link);
        if title.is_empty() {
            title = UNKNOWN.to_string();
        }
        let brand = title.split_whitespace().next().unwrap_or(UNKNOWN).to_string();
        items.push(
            NewManual::new(SOURCE, id, url)
                .with_brand(brand)
                .with_model(title)
                .with_listing_page_url(base.as_str())
                .with_category(category),
        );
    }

    let has_next = document
        .select(&NEXT_LINK)
        .filter_map(|a| absolutize(a.value().attr("href")?, base))
        .any(|href| href != base.as_str());

    ListingPage { items, has_next }
}

/// The file link on a download page: a `.formats` entry (PDF first), else
/// any `.pdf` link.
fn find_file_link(html: &str, base: &Url) -> Option<String> {
    let document = Html::parse_document(html);
    let formats: Vec<(String, bool)> = document
        .select(&FORMAT_LINK)
        .filter_map(|a| {
            let href = a
                .value()
                .attr("href")
                .or_else(|| a.value().attr("data-url"))?;
            let url = absolutize(href, base)?;
            let is_pdf = element_text(&a).to_lowercase().contains("pdf")
                || url.to_lowercase().contains(".pdf");
            Some((url, is_pdf))
        })
        .collect();
    if let Some((url, _)) = formats.iter().find(|(_, pdf)| *pdf).or(formats.first()) {
        return Some(url.clone());
    }
    document
        .select(&PDF_LINK)
        .find_map(|a| absolutize(a.value().attr("href")?, base))
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn base() -> Url {
        Url::parse("https://manualzz.com/catalog/electronics/TVs+%26+monitors/CRT+TVs").unwrap()
    }

    #[test]
    fn test_manualzz_id() {
        assert_eq!(manualzz_id("https://manualzz.com/doc/123456/sony-kv").as_deref(), Some("123456"));
        assert_eq!(manualzz_id("https://manualzz.com/download/77").as_deref(), Some("77"));
        assert_eq!(manualzz_id("https://manualzz.com/catalog/x"), None);
    }

    #[test]
    fn test_category_from_url_decodes() {
        assert_eq!(category_from_url(base().as_str()), "CRT TVs");
        assert_eq!(
            category_from_url("https://manualzz.com/catalog/a/TVs+%26+monitors/"),
            "TVs & monitors"
        );
        assert_eq!(category_from_url("https://manualzz.com/"), "Unknown");
    }

    #[test]
    fn test_catalog_collection_slug_is_path() {
        let c = catalog_collection(base().as_str()).unwrap();
        assert_eq!(c.slug, "catalog/electronics/TVs+%26+monitors/CRT+TVs");
        assert_eq!(c.category_tags, vec!["crt tvs".to_string()]);
        assert!(catalog_collection("not a url").is_none());
    }

    #[test]
    fn test_parse_listing() {
        let html = r#"
            <div class="item"><a href="/doc/111/sony-kv-27" title="Sony KV-27 Manual"></a></div>
            <div class="item"><a href="/doc/111/sony-kv-27">dup</a></div>
            <div class="item"><a href="/doc/222/x">..</a><h3>Philips 32PW Guide</h3></div>
            <a class="next" href="?page=2">Next</a>"#;
        let page = parse_listing(html, &base(), "crt tvs");
        assert!(page.has_next);
        assert_eq!(page.items.len(), 2);
        assert_eq!(page.items[0].source_id, "111");
        assert_eq!(page.items[0].brand, "Sony");
        assert_eq!(page.items[0].model, "Sony KV-27 Manual");
        assert_eq!(page.items[1].brand, "Philips");
        assert_eq!(page.items[1].category, "crt tvs");
    }

    #[test]
    fn test_last_listing_page() {
        let page = parse_listing("<p>nothing</p>", &base(), "tvs");
        assert!(page.is_last());
    }

    #[test]
    fn test_find_file_link_prefers_pdf_format() {
        let html = r#"<div class="formats">
            <a class="format" href="/dl/1.djvu">DJVU</a>
            <a class="format" href="/dl/1.pdf">PDF</a></div>"#;
        assert_eq!(
            find_file_link(html, &base()).as_deref(),
            Some("https://manualzz.com/dl/1.pdf")
        );
        let fallback = r#"<a href="https://cdn.manualzz.com/f/1.pdf">file</a>"#;
        assert_eq!(
            find_file_link(fallback, &base()).as_deref(),
            Some("https://cdn.manualzz.com/f/1.pdf")
        );
        assert_eq!(find_file_link("<p></p>", &base()), None);
    }
}
