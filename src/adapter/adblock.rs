//! Ad and tracker host blocklist for browsing sessions.
//!
//! Entries are host suffixes: `doubleclick.net` blocks `doubleclick.net` and
//! `stats.g.doubleclick.net`, not `notdoubleclick.net`.

use std::collections::BTreeSet;
use std::path::Path;

use tracing::debug;
use url::Url;

use crate::config::ConfigError;

const BUILTIN_HOSTS: &[&str] = &[
    "doubleclick.net",
    "googlesyndication.com",
    "google-analytics.com",
    "googletagmanager.com",
    "adservice.google.com",
    "amazon-adsystem.com",
    "taboola.com",
    "outbrain.com",
    "scorecardresearch.com",
    "criteo.com",
];

/// Set of blocked host suffixes.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HostBlocklist {
    hosts: BTreeSet<String>,
}

impl HostBlocklist {
    /// An empty list.
    #[must_use]
    pub fn empty() -> Self {
        Self::default()
    }

    /// The built-in ad/tracker hosts.
    #[must_use]
    pub fn builtin() -> Self {
        let mut list = Self::empty();
        for host in BUILTIN_HOSTS {
            list.insert(host);
        }
        list
    }

    /// Built-in hosts plus those in an Adblock-style list file.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Io`] if the file cannot be read.
    pub fn with_list_file(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let mut list = Self::builtin();
        let added = list.extend_from_adblock(&text);
        debug!(path = %path.display(), added, "loaded adblock list");
        Ok(list)
    }

    /// Adds `||host^` rules from Adblock filter syntax; other rules are skipped.
    /// Returns the number of hosts added.
    pub fn extend_from_adblock(&mut self, text: &str) -> usize {
        let before = self.hosts.len();
        for line in text.lines() {
            let line = line.trim();
            if line.is_empty() || line.starts_with('!') || line.starts_with('[') {
                continue;
            }
            let Some(rest) = line.strip_prefix("||") else {
                continue;
            };
            let host: String = rest
                .chars()
                .take_while(|c| c.is_ascii_alphanumeric() || *c == '.' || *c == '-')
                .collect();
            let tail = &rest[host.len()..];
            if host.contains('.') && (tail.is_empty() || tail.starts_with('^')) {
                self.insert(&host);
            }
        }
        self.hosts.len() - before
    }

    pub fn insert(&mut self, host: &str) {
        let host = host.trim().trim_matches('.').to_ascii_lowercase();
        if !host.is_empty() {
            self.hosts.insert(host);
        }
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.hosts.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.hosts.is_empty()
    }

    /// Returns the matching entry if `url`'s host is blocked.
    #[must_use]
    pub fn blocked_entry(&self, url: &Url) -> Option<&str> {
        let host = url.host_str()?.trim_end_matches('.').to_ascii_lowercase();
        self.hosts
            .iter()
            .find(|entry| {
                host == **entry
                    || host
                        .strip_suffix(entry.as_str())
                        .is_some_and(|prefix| prefix.ends_with('.'))
            })
            .map(String::as_str)
    }

    #[must_use]
    pub fn is_blocked(&self, url: &Url) -> bool {
        self.blocked_entry(url).is_some()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn url(s: &str) -> Url {
        Url::parse(s).unwrap()
    }

    #[test]
    fn test_builtin_blocks_subdomains_not_lookalikes() {
        let list = HostBlocklist::builtin();
        assert!(list.is_blocked(&url("https://stats.g.doubleclick.net/x.js")));
        assert!(list.is_blocked(&url("https://doubleclick.net/")));
        assert!(!list.is_blocked(&url("https://notdoubleclick.net/")));
        assert!(!list.is_blocked(&url("https://www.manualslib.com/brand/")));
    }

    #[test]
    fn test_adblock_syntax_parsing() {
        let mut list = HostBlocklist::empty();
        let added = list.extend_from_adblock(
            "[Adblock Plus 2.0]\n! comment\n||ads.example.com^\n||tracker.io^$third-party\n\
             ##.banner\n@@||allowed.com^\n||nodot^\n",
        );
        assert_eq!(added, 2);
        assert!(list.is_blocked(&url("https://ads.example.com/a")));
        assert!(list.is_blocked(&url("https://cdn.tracker.io/t.gif")));
        assert!(!list.is_blocked(&url("https://allowed.com/")));
    }

    #[test]
    fn test_list_file_extends_builtin() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("list.txt");
        std::fs::write(&path, "||popads.net^\n").unwrap();
        let list = HostBlocklist::with_list_file(&path).unwrap();
        assert_eq!(list.len(), BUILTIN_HOSTS.len() + 1);
        assert_eq!(
            list.blocked_entry(&url("https://c1.popads.net/pop.js")),
            Some("popads.net")
        );
    }

    #[test]
    fn test_missing_list_file_errors() {
        let err = HostBlocklist::with_list_file(Path::new("/nonexistent/list.txt")).unwrap_err();
        assert!(matches!(err, ConfigError::Io { .. }));
    }
}
