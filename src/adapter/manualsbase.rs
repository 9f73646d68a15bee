//! ManualsBase (`www.manualsbase.com`) adapter.
//!
//! Discovery walks `/brand/allbrands/`, then each brand page for "show all"
//! category links. A category listing is a single page. The file is the
//! response to the download page's `get-manual-btn` form, posted with a
//! solved reCAPTCHA token through the same session.

use std::collections::HashSet;
use std::sync::LazyLock;

use async_trait::async_trait;
use regex::Regex;
use scraper::{ElementRef, Html, Selector};
use tracing::{debug, info, instrument};
use url::Url;

use super::utils::{
    absolutize, capture, compile_static_regex, compile_static_selector, detect_challenge,
    element_text, slugify,
};
use super::{
    AdapterError, Challenge, DownloadTarget, ListingPage, Resolution, Session, SiteAdapter,
};
use crate::catalog::{Collection, ManualItem, NewCollection, NewManual, Source};
use crate::config::ManualsBaseConfig;
use crate::download::expected_filename;

const DEFAULT_BASE_URL: &str = "https://www.manualsbase.com";
const SOURCE: Source = Source::ManualsBase;
const DEFAULT_DOC_TYPE: &str = "User Manual";
const KNOWN_DOC_TYPES: [&str; 5] = [
    "User manual",
    "Operating instructions",
    "User guide",
    "Installation manual",
    "Quick start guide",
];

static BRAND_LINK: LazyLock<Selector> =
    LazyLock::new(|| compile_static_selector(r#"a[href*="/brand/details/"]"#));
static CATEGORY_LINK: LazyLock<Selector> =
    LazyLock::new(|| compile_static_selector(r#"a[href*="/manuals/"]"#));
static MANUAL_LINK: LazyLock<Selector> =
    LazyLock::new(|| compile_static_selector(r#"a[href*="/manual/"]"#));
static DOWNLOAD_LINK: LazyLock<Selector> =
    LazyLock::new(|| compile_static_selector(r#"a[href*="/manual/download/"]"#));
static FORM: LazyLock<Selector> = LazyLock::new(|| compile_static_selector("form"));
static GET_MANUAL_BUTTON: LazyLock<Selector> =
    LazyLock::new(|| compile_static_selector(".get-manual-btn"));
static HIDDEN_INPUT: LazyLock<Selector> =
    LazyLock::new(|| compile_static_selector("input[type=hidden][name]"));

static BRAND_DETAILS_RE: LazyLock<Regex> =
    LazyLock::new(|| compile_static_regex(r"/brand/details/(\d+)/([^/]+)/"));
static CATEGORY_RE: LazyLock<Regex> =
    LazyLock::new(|| compile_static_regex(r"/manuals/\d+/(\d+)/([^/]+)/([^/]+)/"));
static NUMERIC_ID_RE: LazyLock<Regex> = LazyLock::new(|| compile_static_regex(r"/manual/(\d+)/"));
static SLUG_ID_RE: LazyLock<Regex> =
    LazyLock::new(|| compile_static_regex(r"/manual/[^/]+/[^/]+/([^/]+)/"));

/// Site id from a manual URL: the numeric id, else the model slug.
pub(crate) fn manual_id(url: &str) -> Option<String> {
    capture(&NUMERIC_ID_RE, url).or_else(|| capture(&SLUG_ID_RE, url))
}

/// Document type named in a listing title, else "User Manual".
pub(crate) fn guess_doc_type(title: &str) -> &'static str {
    let lower = title.to_lowercase();
    KNOWN_DOC_TYPES
        .iter()
        .find(|dt| lower.contains(&dt.to_lowercase()))
        .copied()
        .unwrap_or(DEFAULT_DOC_TYPE)
}

fn matches_target(name: &str, targets: &[String]) -> bool {
    let name = name.to_lowercase();
    targets
        .iter()
        .any(|t| !t.trim().is_empty() && name.contains(&t.trim().to_lowercase()))
}

/// ManualsBase adapter.
#[derive(Debug)]
pub struct ManualsBaseAdapter {
    session: Session,
    base_url: Url,
    brands: Vec<String>,
    categories: Vec<String>,
}

impl ManualsBaseAdapter {
    /// # Errors
    ///
    /// Never fails for the built-in base URL; see [`Self::with_base_url`].
    pub fn new(session: Session, config: &ManualsBaseConfig) -> Result<Self, AdapterError> {
        Self::with_base_url(session, config, DEFAULT_BASE_URL)
    }

    /// Creates an adapter against a custom origin (for tests).
    ///
    /// # Errors
    ///
    /// Returns [`AdapterError::Config`] if `base_url` is not a URL.
    pub fn with_base_url(
        session: Session,
        config: &ManualsBaseConfig,
        base_url: &str,
    ) -> Result<Self, AdapterError> {
        let base_url = Url::parse(base_url)
            .map_err(|e| AdapterError::config(SOURCE, format!("invalid base URL {base_url}: {e}")))?;
        Ok(Self {
            session,
            base_url,
            brands: config.brands.iter().map(|b| slugify(b)).collect(),
            categories: config.categories.clone(),
        })
    }

    fn wants_brand(&self, slug: &str) -> bool {
        self.brands.is_empty() || self.brands.iter().any(|b| *b == slugify(slug))
    }
}

#[async_trait]
impl SiteAdapter for ManualsBaseAdapter {
    fn source(&self) -> Source {
        SOURCE
    }

    fn session(&self) -> &Session {
        &self.session
    }

    /// Category URLs need brand and category ids, so nothing is configured
    /// directly; `brands` narrows discovery instead.
    fn configured_collections(&self) -> Vec<NewCollection> {
        Vec::new()
    }

    fn named_collections(&self, name: &str) -> Vec<NewCollection> {
        let Ok(url) = Url::parse(name.trim()) else {
            return Vec::new();
        };
        category_collection(url.as_str(), None, None).into_iter().collect()
    }

    #[instrument(skip(self), fields(site = %SOURCE))]
    async fn discover_collections(&self) -> Result<Vec<NewCollection>, AdapterError> {
        let index_url = self
            .base_url
            .join("/brand/allbrands/")
            .map_err(|e| AdapterError::config(SOURCE, e.to_string()))?;
        let index = self.session.get(index_url.as_str()).await?;
        let brands = parse_brand_index(&index.body, &index.url);
        if brands.is_empty() {
            return Err(AdapterError::structural(
                SOURCE,
                index.url.as_str(),
                "no brand links",
            ));
        }

        let mut found = Vec::new();
        let mut seen = HashSet::new();
        for brand in brands.iter().filter(|b| self.wants_brand(&b.slug)) {
            let page = self.session.get(&brand.url).await?;
            let categories = parse_brand_categories(&page.body, &page.url, brand, &self.categories);
            debug!(brand = %brand.name, categories = categories.len(), "brand page parsed");
            for collection in categories {
                if seen.insert(collection.slug.clone()) {
                    found.push(collection);
                }
            }
        }

        info!(collections = found.len(), "discovered ManualsBase collections");
        Ok(found)
    }

    #[instrument(skip(self, collection), fields(site = %SOURCE, collection = %collection.slug))]
    async fn list_page(
        &self,
        collection: &Collection,
        page: u32,
    ) -> Result<ListingPage, AdapterError> {
        if page > 1 {
            return Ok(ListingPage::default());
        }
        let response = self.session.get(&collection.listing_url).await?;
        let category = collection
            .tags()
            .ok()
            .and_then(|tags| tags.into_iter().next())
            .unwrap_or_default();
        Ok(parse_listing(
            &response.body,
            &response.url,
            &collection.display_name,
            &category,
        ))
    }

    #[instrument(skip(self, item), fields(site = %SOURCE, source_id = %item.source_id))]
    async fn resolve_download(&self, item: &ManualItem) -> Result<Resolution, AdapterError> {
        let detail = self.session.get(&item.detail_page_url).await?;
        let download_url = first_href(&detail.body, &detail.url, &DOWNLOAD_LINK).ok_or_else(|| {
            AdapterError::structural(SOURCE, detail.url.as_str(), "no download button")
        })?;

        let download = self.session.get(&download_url).await?;
        let expected = expected_filename(&[&item.model]);
        match parse_download_page(&download.body, &download.url) {
            DownloadPage::Challenge(challenge) => Ok(Resolution::Challenge(challenge)),
            DownloadPage::Form { action, fields } => Ok(Resolution::Ready(
                DownloadTarget::get(action, expected)
                    .with_form(fields)
                    .with_referer(download.url.as_str())
                    .via_session(),
            )),
            DownloadPage::Unknown => Err(AdapterError::structural(
                SOURCE,
                download.url.as_str(),
                "no get-manual form on download page",
            )),
        }
    }

    async fn submit_challenge(
        &self,
        item: &ManualItem,
        challenge: &Challenge,
        token: &str,
    ) -> Result<Resolution, AdapterError> {
        Ok(Resolution::Ready(
            DownloadTarget::get(
                challenge.submit_url.clone(),
                expected_filename(&[&item.model]),
            )
            .with_form(challenge.form_with_token(token))
            .with_referer(challenge.page_url.clone())
            .via_session(),
        ))
    }
}

#[derive(Debug, Clone)]
struct BrandLink {
    name: String,
    slug: String,
    url: String,
}

fn parse_brand_index(html: &str, base: &Url) -> Vec<BrandLink> {
    let document = Html::parse_document(html);
    let mut seen = HashSet::new();
    let mut brands = Vec::new();
    for link in document.select(&BRAND_LINK) {
        let Some(url) = link.value().attr("href").and_then(|h| absolutize(h, base)) else {
            continue;
        };
        let Some(caps) = BRAND_DETAILS_RE.captures(&url) else {
            continue;
        };
        if !seen.insert(url.clone()) {
            continue;
        }
        let slug = caps[2].to_string();
        let name = element_text(&link);
        brands.push(BrandLink {
            name: if name.is_empty() { slug.clone() } else { name },
            slug,
            url,
        });
    }
    brands
}

/// Collection for a category URL `/manuals/{brand}/{category}/{brand-slug}/{category-slug}/`.
fn category_collection(
    url: &str,
    brand_name: Option<&str>,
    targets: Option<&[String]>,
) -> Option<NewCollection> {
    let caps = CATEGORY_RE.captures(url)?;
    let brand_slug = &caps[2];
    let category_slug = &caps[3];
    let category_name = category_slug.replace(['_', '-'], " ");
    if let Some(targets) = targets.filter(|t| !t.is_empty()) {
        if !matches_target(&category_name, targets) && !matches_target(category_slug, targets) {
            return None;
        }
    }
    Some(
        NewCollection::new(SOURCE, format!("{brand_slug}/{category_slug}"), url)
            .with_display_name(brand_name.unwrap_or(brand_slug))
            .with_tag(category_name.to_lowercase()),
    )
}

fn parse_brand_categories(
    html: &str,
    base: &Url,
    brand: &BrandLink,
    targets: &[String],
) -> Vec<NewCollection> {
    let document = Html::parse_document(html);
    let mut seen = HashSet::new();
    document
        .select(&CATEGORY_LINK)
        .filter_map(|link| absolutize(link.value().attr("href")?, base))
        .filter(|url| seen.insert(url.clone()))
        .filter_map(|url| category_collection(&url, Some(&brand.name), Some(targets)))
        .collect()
}

fn parse_listing(html: &str, base: &Url, brand: &str, category: &str) -> ListingPage {
    let document = Html::parse_document(html);
    let mut seen = HashSet::new();
    let mut items = Vec::new();

    for link in document.select(&MANUAL_LINK) {
        let Some(url) = link.value().attr("href").and_then(|h| absolutize(h, base)) else {
            continue;
        };
        if url.contains("/download/") || url.contains("/manuals/") {
            continue;
        }
        let title = element_text(&link);
        if title.chars().count() < 3 {
            continue;
        }
        let Some(id) = manual_id(&url) else {
            continue;
        };
        if !seen.insert(id.clone()) {
            continue;
        }
        items.push(
            NewManual::new(SOURCE, id, url)
                .with_brand(brand)
                .with_document_type(guess_doc_type(&title))
                .with_model(title)
                .with_listing_page_url(base.as_str())
                .with_category(category),
        );
    }

    ListingPage {
        items,
        has_next: false,
    }
}

fn first_href(html: &str, base: &Url, selector: &Selector) -> Option<String> {
    Html::parse_document(html)
        .select(selector)
        .find_map(|a| absolutize(a.value().attr("href")?, base))
}

enum DownloadPage {
    Challenge(Challenge),
    Form {
        action: String,
        fields: Vec<(String, String)>,
    },
    Unknown,
}

fn parse_download_page(html: &str, base: &Url) -> DownloadPage {
    let document = Html::parse_document(html);
    if let Some(challenge) = detect_challenge(&document, base) {
        return DownloadPage::Challenge(challenge);
    }
    let form = document
        .select(&FORM)
        .find(|form: &ElementRef<'_>| form.select(&GET_MANUAL_BUTTON).next().is_some());
    let Some(form) = form else {
        return DownloadPage::Unknown;
    };
    let action = form
        .value()
        .attr("action")
        .and_then(|a| absolutize(a, base))
        .unwrap_or_else(|| base.to_string());
    let fields = form
        .select(&HIDDEN_INPUT)
        .filter_map(|input| {
            Some((
                input.value().attr("name")?.to_string(),
                input.value().attr("value").unwrap_or("").to_string(),
            ))
        })
        .collect();
    DownloadPage::Form { action, fields }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn base() -> Url {
        Url::parse("https://www.manualsbase.com/manuals/12/34/sony/tv/").unwrap()
    }

    #[test]
    fn test_manual_id_numeric_then_slug() {
        assert_eq!(
            manual_id("https://www.manualsbase.com/manual/454301/tv_mount/sony/x/").as_deref(),
            Some("454301")
        );
        assert_eq!(
            manual_id("https://www.manualsbase.com/manual/lcd-tvs/sony/kdl-40/").as_deref(),
            Some("kdl-40")
        );
        assert_eq!(manual_id("https://www.manualsbase.com/brand/"), None);
    }

    #[test]
    fn test_guess_doc_type() {
        assert_eq!(guess_doc_type("Sony KV-27 Operating Instructions"), "Operating instructions");
        assert_eq!(guess_doc_type("Sony KV-27"), "User Manual");
    }

    #[test]
    fn test_brand_index_and_categories() {
        let index = r#"
            <a href="/brand/details/12/sony/">Sony</a>
            <a href="/brand/details/12/sony/">Sony</a>
            <a href="/brand/details/13/lg/">LG</a>
            <a href="/brand/">All</a>"#;
        let brands = parse_brand_index(index, &base());
        assert_eq!(brands.len(), 2);
        assert_eq!(brands[0].slug, "sony");

        let brand_page = r#"
            <a href="/manuals/12/34/sony/tv/">Show all user manuals Sony from the TV category</a>
            <a href="/manuals/12/35/sony/lcd_monitor/">Show all</a>
            <a href="/manuals/12/36/sony/camera/">Show all</a>"#;
        let targets = vec!["tv".to_string(), "monitor".to_string()];
        let collections = parse_brand_categories(brand_page, &base(), &brands[0], &targets);
        let slugs: Vec<&str> = collections.iter().map(|c| c.slug.as_str()).collect();
        assert_eq!(slugs, vec!["sony/tv", "sony/lcd_monitor"]);
        assert_eq!(collections[1].category_tags, vec!["lcd monitor".to_string()]);
        assert_eq!(collections[0].display_name, "Sony");
    }

    #[test]
    fn test_parse_listing_filters_links() {
        let html = r#"
            <a href="/manual/454301/tv/sony/kv27/">Sony KV-27 User guide</a>
            <a href="/manual/454301/tv/sony/kv27/">duplicate</a>
            <a href="/manual/download/454301/">Download</a>
            <a href="/manuals/12/34/sony/tv/">More</a>
            <a href="/manual/9/tv/sony/x/">ab</a>"#;
        let page = parse_listing(html, &base(), "Sony", "tv");
        assert!(!page.has_next);
        assert_eq!(page.items.len(), 1);
        let item = &page.items[0];
        assert_eq!(item.source_id, "454301");
        assert_eq!(item.model, "Sony KV-27 User guide");
        assert_eq!(item.document_type, "User guide");
        assert_eq!(item.listing_page_url, base().as_str());
    }

    #[test]
    fn test_download_page_form_without_challenge() {
        let html = r#"<form action="/manual/download/get/" method="post">
            <input type="hidden" name="id" value="454301">
            <input type="submit" class="get-manual-btn" value="Get manual">
          </form>"#;
        match parse_download_page(html, &base()) {
            DownloadPage::Form { action, fields } => {
                assert_eq!(action, "https://www.manualsbase.com/manual/download/get/");
                assert_eq!(fields, vec![("id".to_string(), "454301".to_string())]);
            }
            _ => panic!("expected form"),
        }
        assert!(matches!(
            parse_download_page("<p>gone</p>", &base()),
            DownloadPage::Unknown
        ));
    }
}
