//! HTML and URL helpers shared by the site adapters.

use std::sync::LazyLock;

use regex::Regex;
use scraper::{ElementRef, Html, Selector};
use url::Url;

use super::{Challenge, ChallengeKind};

/// Compiles a regex at static init; panics on invalid pattern.
pub(crate) fn compile_static_regex(pattern: &str) -> Regex {
    Regex::new(pattern).unwrap_or_else(|e| panic!("invalid static regex '{pattern}': {e}"))
}

/// Parses a CSS selector at static init; panics on invalid selector.
pub(crate) fn compile_static_selector(selector: &str) -> Selector {
    Selector::parse(selector).unwrap_or_else(|e| panic!("invalid static selector '{selector}': {e}"))
}

static SITEKEY_SELECTOR: LazyLock<Selector> =
    LazyLock::new(|| compile_static_selector("[data-sitekey]"));
static IFRAME_SELECTOR: LazyLock<Selector> = LazyLock::new(|| compile_static_selector("iframe[src]"));
static HIDDEN_INPUT_SELECTOR: LazyLock<Selector> =
    LazyLock::new(|| compile_static_selector("input[type=hidden][name]"));
static FORM_SELECTOR: LazyLock<Selector> = LazyLock::new(|| compile_static_selector("form"));
static IFRAME_KEY_RE: LazyLock<Regex> =
    LazyLock::new(|| compile_static_regex(r"[?&](?:k|sitekey)=([A-Za-z0-9_-]+)"));

/// Resolves `href` against `base`. Fragment-only, `javascript:`, `mailto:`
/// and `tel:` links yield `None`.
#[must_use]
pub(crate) fn absolutize(href: &str, base: &Url) -> Option<String> {
    let href = href.trim();
    if href.is_empty()
        || href.starts_with('#')
        || href.starts_with("javascript:")
        || href.starts_with("mailto:")
        || href.starts_with("tel:")
    {
        return None;
    }
    if href.starts_with("//") {
        return Some(format!("{}:{href}", base.scheme()));
    }
    base.join(href).ok().map(String::from)
}

/// Element text with whitespace runs collapsed.
#[must_use]
pub(crate) fn element_text(element: &ElementRef<'_>) -> String {
    element
        .text()
        .flat_map(str::split_whitespace)
        .collect::<Vec<_>>()
        .join(" ")
}

/// URL of page `page` of a listing. Page 1 is the listing URL itself.
#[must_use]
pub(crate) fn page_url(listing_url: &str, page: u32) -> String {
    if page <= 1 {
        return listing_url.to_string();
    }
    let Ok(mut url) = Url::parse(listing_url) else {
        return listing_url.to_string();
    };
    let kept: Vec<(String, String)> = url
        .query_pairs()
        .filter(|(k, _)| k != "page")
        .map(|(k, v)| (k.into_owned(), v.into_owned()))
        .collect();
    url.query_pairs_mut()
        .clear()
        .extend_pairs(kept)
        .append_pair("page", &page.to_string());
    url.into()
}

/// Lowercase slug: alphanumerics kept, everything else collapsed to `-`.
#[must_use]
pub(crate) fn slugify(value: &str) -> String {
    let mut slug = String::with_capacity(value.len());
    for c in value.trim().chars() {
        if c.is_alphanumeric() {
            slug.extend(c.to_lowercase());
        } else if !slug.ends_with('-') {
            slug.push('-');
        }
    }
    slug.trim_matches('-').to_string()
}

/// First capture of `regex` in `text`.
#[must_use]
pub(crate) fn capture(regex: &Regex, text: &str) -> Option<String> {
    regex
        .captures(text)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str().to_string())
}

/// Finds a reCAPTCHA or Turnstile widget and the form it belongs to.
///
/// The submit URL is the enclosing form's action (the page itself when the
/// widget sits outside a form); hidden inputs of that form are carried along.
#[must_use]
pub(crate) fn detect_challenge(document: &Html, page_url: &Url) -> Option<Challenge> {
    let (kind, site_key, widget) = if let Some(el) = document.select(&SITEKEY_SELECTOR).next() {
        let key = el.value().attr("data-sitekey")?.trim().to_string();
        let turnstile = el
            .value()
            .attr("class")
            .is_some_and(|c| c.contains("cf-turnstile"));
        let kind = if turnstile {
            ChallengeKind::Turnstile
        } else {
            ChallengeKind::Recaptcha
        };
        (kind, key, Some(el))
    } else {
        let (kind, key) = document.select(&IFRAME_SELECTOR).find_map(|frame| {
            let src = frame.value().attr("src")?;
            let kind = if src.contains("recaptcha") {
                ChallengeKind::Recaptcha
            } else if src.contains("challenges.cloudflare.com") || src.contains("turnstile") {
                ChallengeKind::Turnstile
            } else {
                return None;
            };
            Some((kind, capture(&IFRAME_KEY_RE, src)?))
        })?;
        (kind, key, None)
    };
    if site_key.is_empty() {
        return None;
    }

    let form = widget
        .and_then(|w| {
            w.ancestors()
                .filter_map(ElementRef::wrap)
                .find(|a| a.value().name() == "form")
        })
        .or_else(|| document.select(&FORM_SELECTOR).next());

    let (submit_url, fields) = match form {
        Some(form) => {
            let action = form
                .value()
                .attr("action")
                .and_then(|a| absolutize(a, page_url))
                .unwrap_or_else(|| page_url.to_string());
            let fields = form
                .select(&HIDDEN_INPUT_SELECTOR)
                .filter_map(|input| {
                    let name = input.value().attr("name")?;
                    if name == kind.token_field() {
                        return None;
                    }
                    Some((
                        name.to_string(),
                        input.value().attr("value").unwrap_or("").to_string(),
                    ))
                })
                .collect();
            (action, fields)
        }
        None => (page_url.to_string(), Vec::new()),
    };

    Some(Challenge {
        kind,
        site_key,
        page_url: page_url.to_string(),
        submit_url,
        fields,
    })
}
