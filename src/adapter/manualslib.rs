//! ManualsLib (`www.manualslib.com`) adapter.
//!
//! Brands are indexed under `/brand/` by letter; each brand row lists its
//! categories, and every target category page becomes one collection. Items
//! are the per-model manual links on a category page. Downloads go through
//! `/download/{id}/`, which is guarded by reCAPTCHA.

use std::collections::HashSet;
use std::sync::LazyLock;

use async_trait::async_trait;
use regex::Regex;
use scraper::{Html, Selector};
use tracing::{debug, info, instrument};
use url::Url;

use super::utils::{
    absolutize, capture, compile_static_regex, compile_static_selector, detect_challenge,
    element_text, page_url, slugify,
};
use super::{
    AdapterError, Challenge, DownloadTarget, ListingPage, Resolution, Session, SiteAdapter,
};
use crate::catalog::{Collection, ManualItem, NewCollection, NewManual, Source};
use crate::config::ManualsLibConfig;
use crate::download::expected_filename;

const DEFAULT_BASE_URL: &str = "https://www.manualslib.com";
const SOURCE: Source = Source::ManualsLib;

static LETTER_INDEX: LazyLock<Selector> = LazyLock::new(|| compile_static_selector("div.bmap a"));
static ROW: LazyLock<Selector> = LazyLock::new(|| compile_static_selector("div.row.tabled"));
static BRAND_LINK: LazyLock<Selector> =
    LazyLock::new(|| compile_static_selector("div.col1 a, div.col-xs-3 a"));
static CATEGORY_LINK: LazyLock<Selector> =
    LazyLock::new(|| compile_static_selector("div.catel a, div.col-xs-9 a"));
static NEXT_PAGE: LazyLock<Selector> =
    LazyLock::new(|| compile_static_selector("ul.pagination li.active + li a.plink"));
static MODEL_LINK: LazyLock<Selector> = LazyLock::new(|| compile_static_selector("div.mname a"));
static MANUAL_LINK: LazyLock<Selector> =
    LazyLock::new(|| compile_static_selector(r#"div.mlinks a[href*="/manual/"]"#));
static DOWNLOAD_LINK: LazyLock<Selector> =
    LazyLock::new(|| compile_static_selector(r#"a[href*="/download/"]"#));
static PDF_LINK: LazyLock<Selector> = LazyLock::new(|| {
    compile_static_selector(r#"a[href*="manualslib.com/pdf"], a[href*="take=binary"]"#)
});
static ANY_PDF_LINK: LazyLock<Selector> =
    LazyLock::new(|| compile_static_selector(r#"a[href*=".pdf"]"#));
static ANCHOR: LazyLock<Selector> = LazyLock::new(|| compile_static_selector("a[href]"));

static MANUAL_ID_RE: LazyLock<Regex> = LazyLock::new(|| compile_static_regex(r"/manual/(\d+)"));
static BRAND_SLUG_RE: LazyLock<Regex> = LazyLock::new(|| compile_static_regex(r"/brand/([^/?#]+)"));
static CATEGORY_SLUG_RE: LazyLock<Regex> =
    LazyLock::new(|| compile_static_regex(r"/brand/[^/]+/([^/?#]+)\.html"));

/// True for a target category, or a "`<target>` … Combo" variant of one
/// ("TV DVD Combo" matches target "tv").
pub(crate) fn is_target_category(name: &str, targets: &[String]) -> bool {
    let name = name.trim().to_lowercase();
    targets.iter().any(|target| {
        let target = target.trim().to_lowercase();
        name == target || (name.starts_with(&format!("{target} ")) && name.ends_with(" combo"))
    })
}

/// ManualsLib adapter.
#[derive(Debug)]
pub struct ManualsLibAdapter {
    session: Session,
    base_url: Url,
    brands: Vec<String>,
    categories: Vec<String>,
}

impl ManualsLibAdapter {
    /// # Errors
    ///
    /// Never fails for the built-in base URL; see [`Self::with_base_url`].
    pub fn new(session: Session, config: &ManualsLibConfig) -> Result<Self, AdapterError> {
        Self::with_base_url(session, config, DEFAULT_BASE_URL)
    }

    /// Creates an adapter against a custom origin (for tests).
    ///
    /// # Errors
    ///
    /// Returns [`AdapterError::Config`] if `base_url` is not a URL.
    pub fn with_base_url(
        session: Session,
        config: &ManualsLibConfig,
        base_url: &str,
    ) -> Result<Self, AdapterError> {
        let base_url = Url::parse(base_url)
            .map_err(|e| AdapterError::config(SOURCE, format!("invalid base URL {base_url}: {e}")))?;
        Ok(Self {
            session,
            base_url,
            brands: config.brands.clone(),
            categories: config.categories.clone(),
        })
    }

    fn url(&self, path: &str) -> String {
        self.base_url
            .join(path)
            .map_or_else(|_| format!("{DEFAULT_BASE_URL}{path}"), String::from)
    }

    async fn find_pdf(
        &self,
        item: &ManualItem,
        html: &str,
        page_url: &Url,
    ) -> Result<Resolution, AdapterError> {
        let expected = expected_filename(&[&item.brand, &item.model, &item.document_type]);
        match parse_pdf_step(html, page_url) {
            PdfStep::Pdf(url) => Ok(Resolution::Ready(
                DownloadTarget::get(url, expected).with_referer(page_url.as_str()),
            )),
            PdfStep::GetManual(next) => {
                debug!(url = %next, "following Get Manual link");
                let page = self.session.get(&next).await?;
                match parse_pdf_step(&page.body, &page.url) {
                    PdfStep::Pdf(url) => Ok(Resolution::Ready(
                        DownloadTarget::get(url, expected).with_referer(page.url.as_str()),
                    )),
                    PdfStep::GetManual(_) | PdfStep::Missing => Err(AdapterError::structural(
                        SOURCE,
                        page.url.as_str(),
                        "no PDF link after Get Manual",
                    )),
                }
            }
            PdfStep::Missing => Err(AdapterError::structural(
                SOURCE,
                page_url.as_str(),
                "no PDF link on download page",
            )),
        }
    }
}

#[async_trait]
impl SiteAdapter for ManualsLibAdapter {
    fn source(&self) -> Source {
        SOURCE
    }

    fn session(&self) -> &Session {
        &self.session
    }

    fn configured_collections(&self) -> Vec<NewCollection> {
        self.brands
            .iter()
            .flat_map(|brand| self.named_collections(brand))
            .collect()
    }

    fn named_collections(&self, name: &str) -> Vec<NewCollection> {
        let brand = slugify(name);
        if brand.is_empty() {
            return Vec::new();
        }
        self.categories
            .iter()
            .map(|category| {
                let category_slug = slugify(category);
                NewCollection::new(
                    SOURCE,
                    format!("{brand}/{category_slug}"),
                    self.url(&format!("/brand/{brand}/{category_slug}.html")),
                )
                .with_display_name(name.trim())
                .with_tag(category.to_lowercase())
            })
            .collect()
    }

    #[instrument(skip(self), fields(site = %SOURCE))]
    async fn discover_collections(&self) -> Result<Vec<NewCollection>, AdapterError> {
        let index = self.session.get(&self.url("/brand/")).await?;
        let letters = parse_letter_index(&index.body, &index.url);
        if letters.is_empty() {
            return Err(AdapterError::structural(
                SOURCE,
                index.url.as_str(),
                "brand index has no letter links",
            ));
        }

        let mut found = Vec::new();
        let mut seen_slugs = HashSet::new();
        for letter_url in letters {
            let mut visited = HashSet::new();
            let mut next = Some(letter_url);
            while let Some(url) = next.take() {
                if !visited.insert(url.clone()) {
                    break;
                }
                let page = self.session.get(&url).await?;
                let (collections, next_url) =
                    parse_brand_rows(&page.body, &page.url, &self.categories);
                debug!(url = %page.url, collections = collections.len(), "brand page parsed");
                for collection in collections {
                    if seen_slugs.insert(collection.slug.clone()) {
                        found.push(collection);
                    }
                }
                next = next_url;
            }
        }

        info!(collections = found.len(), "discovered ManualsLib collections");
        Ok(found)
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
        let download_url = find_download_page(&detail.body, &detail.url, &item.source_id)
            .ok_or_else(|| {
                AdapterError::structural(SOURCE, detail.url.as_str(), "no download link")
            })?;

        let download = self.session.get(&download_url).await?;
        if let Some(challenge) = parse_challenge(&download.body, &download.url) {
            debug!(site_key = %challenge.site_key, "download page shows a challenge");
            return Ok(Resolution::Challenge(challenge));
        }
        self.find_pdf(item, &download.body, &download.url).await
    }

    #[instrument(skip(self, item, challenge, token), fields(site = %SOURCE, source_id = %item.source_id))]
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
        self.find_pdf(item, &page.body, &page.url).await
    }
}

fn parse_challenge(html: &str, page_url: &Url) -> Option<Challenge> {
    detect_challenge(&Html::parse_document(html), page_url)
}

fn parse_letter_index(html: &str, base: &Url) -> Vec<String> {
    let document = Html::parse_document(html);
    let mut seen = HashSet::new();
    document
        .select(&LETTER_INDEX)
        .filter_map(|a| absolutize(a.value().attr("href")?, base))
        .filter(|url| seen.insert(url.clone()))
        .collect()
}

fn next_page_link(document: &Html, base: &Url) -> Option<String> {
    document
        .select(&NEXT_PAGE)
        .next()
        .and_then(|a| absolutize(a.value().attr("href")?, base))
}

/// Brand rows on a letter page: one collection per target category.
fn parse_brand_rows(
    html: &str,
    base: &Url,
    targets: &[String],
) -> (Vec<NewCollection>, Option<String>) {
    let document = Html::parse_document(html);
    let mut collections = Vec::new();

    for row in document.select(&ROW) {
        let Some(brand_link) = row.select(&BRAND_LINK).next() else {
            continue;
        };
        let brand_name = element_text(&brand_link);
        let brand_slug = brand_link
            .value()
            .attr("href")
            .and_then(|href| capture(&BRAND_SLUG_RE, href))
            .unwrap_or_else(|| slugify(&brand_name));

        for category_link in row.select(&CATEGORY_LINK) {
            let category_name = element_text(&category_link);
            if !is_target_category(&category_name, targets) {
                continue;
            }
            let Some(listing_url) = category_link
                .value()
                .attr("href")
                .and_then(|href| absolutize(href, base))
            else {
                continue;
            };
            let category_slug =
                capture(&CATEGORY_SLUG_RE, &listing_url).unwrap_or_else(|| slugify(&category_name));
            collections.push(
                NewCollection::new(SOURCE, format!("{brand_slug}/{category_slug}"), listing_url)
                    .with_display_name(brand_name.clone())
                    .with_tag(category_name.to_lowercase()),
            );
        }
    }

    (collections, next_page_link(&document, base))
}

/// Model rows on a category page. Each manual link under a model is one item.
fn parse_listing(html: &str, base: &Url, brand: &str, category: &str) -> ListingPage {
    let document = Html::parse_document(html);
    let mut seen = HashSet::new();
    let mut items = Vec::new();

    for row in document.select(&ROW) {
        let model_link = row.select(&MODEL_LINK).next();
        let model = model_link.map(|a| element_text(&a)).unwrap_or_default();
        let model_url = model_link
            .and_then(|a| absolutize(a.value().attr("href")?, base))
            .unwrap_or_else(|| base.to_string());

        for link in row.select(&MANUAL_LINK) {
            let Some(manual_url) = link.value().attr("href").and_then(|h| absolutize(h, base))
            else {
                continue;
            };
            let Some(id) = capture(&MANUAL_ID_RE, &manual_url) else {
                continue;
            };
            if !seen.insert(id.clone()) {
                continue;
            }
            items.push(
                NewManual::new(SOURCE, id, manual_url)
                    .with_brand(brand)
                    .with_model(model.clone())
                    .with_listing_page_url(model_url.clone())
                    .with_document_type(element_text(&link))
                    .with_description(link.value().attr("title").unwrap_or("").trim())
                    .with_category(category),
            );
        }
    }

    ListingPage {
        items,
        has_next: document.select(&NEXT_PAGE).next().is_some(),
    }
}

/// Download page link on a manual's detail page, preferring one naming the id.
fn find_download_page(html: &str, base: &Url, source_id: &str) -> Option<String> {
    let document = Html::parse_document(html);
    let links: Vec<String> = document
        .select(&DOWNLOAD_LINK)
        .filter_map(|a| absolutize(a.value().attr("href")?, base))
        .collect();
    let marker = format!("/download/{source_id}");
    links
        .iter()
        .find(|url| url.contains(&marker))
        .or_else(|| links.first())
        .cloned()
}

enum PdfStep {
    Pdf(String),
    GetManual(String),
    Missing,
}

fn parse_pdf_step(html: &str, base: &Url) -> PdfStep {
    let document = Html::parse_document(html);
    let href_of = |selector: &Selector| {
        document
            .select(selector)
            .find_map(|a| absolutize(a.value().attr("href")?, base))
    };
    if let Some(url) = href_of(&PDF_LINK) {
        return PdfStep::Pdf(url);
    }
    let by_text = |wanted: &str| {
        document.select(&ANCHOR).find_map(|a| {
            element_text(&a)
                .eq_ignore_ascii_case(wanted)
                .then(|| absolutize(a.value().attr("href")?, base))
                .flatten()
        })
    };
    if let Some(url) = by_text("Download PDF").or_else(|| href_of(&ANY_PDF_LINK)) {
        return PdfStep::Pdf(url);
    }
    match by_text("Get Manual") {
        Some(url) => PdfStep::GetManual(url),
        None => PdfStep::Missing,
    }
}
