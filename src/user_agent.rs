//! Shared User-Agent strings.
//!
//! Manual sites see a desktop browser; the archive API and CAPTCHA service
//! see the tool's own identifier.

const PROJECT_UA_URL: &str = "https://github.com/fierce/manual-archiver";

/// Desktop Chrome User-Agent for site sessions and transfers.
pub const BROWSER_USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) \
    AppleWebKit/537.36 (KHTML, like Gecko) Chrome/131.0.0.0 Safari/537.36";

/// User-Agent identifying the tool to the archive and solver APIs.
#[must_use]
pub(crate) fn service_user_agent() -> String {
    let version = env!("CARGO_PKG_VERSION");
    format!("manual-archiver/{version} (+{PROJECT_UA_URL})")
}
