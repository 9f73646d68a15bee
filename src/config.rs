//! TOML configuration with environment overrides.
//!
//! Resolution order for the file: `--config <path>`, then
//! `$XDG_CONFIG_HOME/manual-archiver/config.toml`, then
//! `$HOME/.config/manual-archiver/config.toml`. A missing default file means
//! defaults; a missing explicit file is an error. Credentials may come from
//! the environment (`PROXY_*`, `BULK_PROXY_*`, `TWOCAPTCHA_API_KEY`,
//! `IA_ACCESS_KEY`, `IA_SECRET_KEY`) and override the file.

use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use url::Url;

use crate::download::DelayRange;

const APP_DIR: &str = "manual-archiver";
const CONFIG_FILENAME: &str = "config.toml";

/// Configuration loading and validation errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The file could not be read.
    #[error("failed to read config file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The file is not valid TOML for this schema.
    #[error("failed to parse config file {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: Box<toml::de::Error>,
    },

    /// An explicitly requested config file does not exist.
    #[error("config file not found: {0}\n  Suggestion: Check the --config path")]
    NotFound(PathBuf),

    /// A value is outside its allowed range.
    #[error("invalid config value for `{field}`: {value}. Expected {expected}")]
    Invalid {
        field: &'static str,
        value: String,
        expected: &'static str,
    },
}

impl ConfigError {
    fn invalid(field: &'static str, value: impl ToString, expected: &'static str) -> Self {
        Self::Invalid {
            field,
            value: value.to_string(),
            expected,
        }
    }
}

/// Proxy endpoint with optional credentials.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ProxyConfig {
    pub host: String,
    pub port: u16,
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub password: Option<String>,
}

impl ProxyConfig {
    /// Proxy URL with percent-encoded credentials.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] if the host does not form a valid URL.
    pub fn url(&self) -> Result<Url, ConfigError> {
        let mut url = Url::parse(&format!("http://{}:{}", self.host, self.port))
            .map_err(|_| ConfigError::invalid("proxy.host", &self.host, "a hostname"))?;
        if let Some(username) = self.username.as_deref().filter(|u| !u.is_empty()) {
            url.set_username(username)
                .map_err(|()| ConfigError::invalid("proxy.username", username, "a username"))?;
            url.set_password(self.password.as_deref())
                .map_err(|()| ConfigError::invalid("proxy.password", "<hidden>", "a password"))?;
        }
        Ok(url)
    }

    fn apply_env(
        existing: Option<Self>,
        prefix: &str,
        lookup: &impl Fn(&str) -> Option<String>,
    ) -> Result<Option<Self>, ConfigError> {
        let host = lookup(&format!("{prefix}_HOST"));
        let port = lookup(&format!("{prefix}_PORT"));
        let user = lookup(&format!("{prefix}_USER"));
        let pass = lookup(&format!("{prefix}_PASS"));

        let Some(mut proxy) = existing.or_else(|| {
            host.as_ref().map(|h| Self {
                host: h.clone(),
                port: 0,
                username: None,
                password: None,
            })
        }) else {
            return Ok(None);
        };

        if let Some(host) = host {
            proxy.host = host;
        }
        if let Some(port) = port {
            proxy.port = port
                .trim()
                .parse()
                .map_err(|_| ConfigError::invalid("proxy port", port, "a port number 1..=65535"))?;
        }
        if user.is_some() {
            proxy.username = user;
        }
        if pass.is_some() {
            proxy.password = pass;
        }
        Ok(Some(proxy))
    }
}

/// ManualsLib targets.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ManualsLibConfig {
    /// Brand slugs scraped directly, skipping discovery.
    pub brands: Vec<String>,
    /// Category slugs treated as targets during discovery.
    pub categories: Vec<String>,
}

impl Default for ManualsLibConfig {
    fn default() -> Self {
        Self {
            brands: Vec::new(),
            categories: vec!["tv".to_string()],
        }
    }
}

/// ManualsBase targets.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ManualsBaseConfig {
    /// Brand slugs scraped directly, skipping discovery.
    pub brands: Vec<String>,
    /// Case-insensitive substrings a category name must contain.
    pub categories: Vec<String>,
}

impl Default for ManualsBaseConfig {
    fn default() -> Self {
        Self {
            brands: Vec::new(),
            categories: ["tv", "television", "monitor", "crt", "remote"]
                .into_iter()
                .map(String::from)
                .collect(),
        }
    }
}

/// Manualzz targets.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ManualzzConfig {
    /// Catalog listing URLs, one collection each.
    pub catalog_urls: Vec<String>,
}

/// Third-party CAPTCHA solver settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct CaptchaConfig {
    pub api_key: Option<String>,
    /// Longest wait for the solver before falling back to the operator.
    pub solver_timeout_secs: u64,
}

impl Default for CaptchaConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            solver_timeout_secs: 120,
        }
    }
}

/// Remote archive credentials and checker pacing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ArchiveConfig {
    pub access_key: Option<String>,
    pub secret_key: Option<String>,
    pub check_delay_min_secs: u64,
    pub check_delay_max_secs: u64,
    /// Probes between long pauses.
    pub batch_size: u32,
    pub batch_pause_secs: u64,
    /// Wait when a continuous check finds nothing to do.
    pub idle_wait_secs: u64,
}

impl Default for ArchiveConfig {
    fn default() -> Self {
        Self {
            access_key: None,
            secret_key: None,
            check_delay_min_secs: 5,
            check_delay_max_secs: 15,
            batch_size: 50,
            batch_pause_secs: 60,
            idle_wait_secs: 300,
        }
    }
}

impl ArchiveConfig {
    /// Returns `(access, secret)` when both are set.
    #[must_use]
    pub fn credentials(&self) -> Option<(&str, &str)> {
        match (self.access_key.as_deref(), self.secret_key.as_deref()) {
            (Some(a), Some(s)) if !a.is_empty() && !s.is_empty() => Some((a, s)),
            _ => None,
        }
    }

    #[must_use]
    pub fn check_delay(&self) -> DelayRange {
        DelayRange::from_secs(self.check_delay_min_secs, self.check_delay_max_secs)
    }
}

/// Full application configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    /// Root of the content-addressed blob tree.
    pub download_dir: PathBuf,
    pub database_path: PathBuf,
    /// Pause between downloaded items.
    pub delay_min_secs: u64,
    pub delay_max_secs: u64,
    /// Route traffic through the configured proxy tiers.
    pub use_proxy: bool,
    /// Adblock-style list (`||host^` lines) extending the built-in blocklist.
    pub adblock_list_path: Option<PathBuf>,
    /// Operator wait for a manually solved challenge.
    pub captcha_timeout_secs: u64,
    /// File the operator writes a solved token into.
    pub captcha_token_path: Option<PathBuf>,
    pub manualslib: ManualsLibConfig,
    pub manualsbase: ManualsBaseConfig,
    pub manualzz: ManualzzConfig,
    /// Proxy for interactive page sessions.
    pub proxy: Option<ProxyConfig>,
    /// Proxy for bulk file transfers.
    pub bulk_proxy: Option<ProxyConfig>,
    pub captcha: CaptchaConfig,
    pub archive: ArchiveConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            download_dir: PathBuf::from("downloads"),
            database_path: PathBuf::from("manuals.db"),
            delay_min_secs: 2,
            delay_max_secs: 5,
            use_proxy: false,
            adblock_list_path: None,
            captcha_timeout_secs: 300,
            captcha_token_path: None,
            manualslib: ManualsLibConfig::default(),
            manualsbase: ManualsBaseConfig::default(),
            manualzz: ManualzzConfig::default(),
            proxy: None,
            bulk_proxy: None,
            captcha: CaptchaConfig::default(),
            archive: ArchiveConfig::default(),
        }
    }
}

/// A configuration together with where it came from.
#[derive(Debug, Clone)]
pub struct LoadedConfig {
    pub config: Config,
    /// File that was read, if any.
    pub path: Option<PathBuf>,
}

impl Config {
    /// Parses TOML text.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Parse`] on malformed input or unknown keys.
    pub fn from_toml_str(text: &str, path: &Path) -> Result<Self, ConfigError> {
        toml::from_str(text).map_err(|e| ConfigError::Parse {
            path: path.to_path_buf(),
            source: Box::new(e),
        })
    }

    /// Default config file location, if a base directory is known.
    #[must_use]
    pub fn default_path() -> Option<PathBuf> {
        if let Some(xdg) = env_var_non_empty("XDG_CONFIG_HOME") {
            return Some(PathBuf::from(xdg).join(APP_DIR).join(CONFIG_FILENAME));
        }
        let home = env_var_non_empty("HOME")?;
        Some(
            PathBuf::from(home)
                .join(".config")
                .join(APP_DIR)
                .join(CONFIG_FILENAME),
        )
    }

    /// Loads the config file, applies environment overrides and validates.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] if an explicit file is missing, a file cannot
    /// be read or parsed, an override is malformed, or validation fails.
    pub fn load(explicit: Option<&Path>) -> Result<LoadedConfig, ConfigError> {
        let (mut config, path) = match explicit {
            Some(path) => {
                if !path.exists() {
                    return Err(ConfigError::NotFound(path.to_path_buf()));
                }
                (read_file(path)?, Some(path.to_path_buf()))
            }
            None => match Self::default_path().filter(|p| p.exists()) {
                Some(path) => (read_file(&path)?, Some(path)),
                None => (Self::default(), None),
            },
        };

        config.apply_env_overrides(|key| env_var_non_empty(key))?;
        config.validate()?;
        Ok(LoadedConfig { config, path })
    }

    /// Applies credential overrides from `lookup` (the process environment in
    /// production).
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] for a non-numeric proxy port.
    pub fn apply_env_overrides(
        &mut self,
        lookup: impl Fn(&str) -> Option<String>,
    ) -> Result<(), ConfigError> {
        self.proxy = ProxyConfig::apply_env(self.proxy.take(), "PROXY", &lookup)?;
        self.bulk_proxy = ProxyConfig::apply_env(self.bulk_proxy.take(), "BULK_PROXY", &lookup)?;
        if let Some(key) = lookup("TWOCAPTCHA_API_KEY") {
            self.captcha.api_key = Some(key);
        }
        if let Some(key) = lookup("IA_ACCESS_KEY") {
            self.archive.access_key = Some(key);
        }
        if let Some(key) = lookup("IA_SECRET_KEY") {
            self.archive.secret_key = Some(key);
        }
        Ok(())
    }

    /// Checks ranges and cross-field constraints.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] describing the first bad value.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.delay_min_secs > self.delay_max_secs {
            return Err(ConfigError::invalid(
                "delay_min_secs",
                self.delay_min_secs,
                "a value <= delay_max_secs",
            ));
        }
        if self.delay_max_secs > 3600 {
            return Err(ConfigError::invalid(
                "delay_max_secs",
                self.delay_max_secs,
                "range 0..=3600",
            ));
        }
        if !(1..=3600).contains(&self.captcha_timeout_secs) {
            return Err(ConfigError::invalid(
                "captcha_timeout_secs",
                self.captcha_timeout_secs,
                "range 1..=3600",
            ));
        }
        if !(1..=3600).contains(&self.captcha.solver_timeout_secs) {
            return Err(ConfigError::invalid(
                "captcha.solver_timeout_secs",
                self.captcha.solver_timeout_secs,
                "range 1..=3600",
            ));
        }
        if self.archive.check_delay_min_secs > self.archive.check_delay_max_secs {
            return Err(ConfigError::invalid(
                "archive.check_delay_min_secs",
                self.archive.check_delay_min_secs,
                "a value <= archive.check_delay_max_secs",
            ));
        }
        if self.archive.batch_size == 0 {
            return Err(ConfigError::invalid("archive.batch_size", 0, "a value >= 1"));
        }
        for (field, proxy) in [("proxy.port", &self.proxy), ("bulk_proxy.port", &self.bulk_proxy)] {
            if let Some(proxy) = proxy
                && proxy.port == 0
            {
                return Err(ConfigError::invalid(field, 0, "a port number 1..=65535"));
            }
        }
        if self.use_proxy && self.proxy.is_none() {
            return Err(ConfigError::invalid(
                "use_proxy",
                true,
                "a [proxy] section or PROXY_HOST/PROXY_PORT when enabled",
            ));
        }
        Ok(())
    }

    /// Pause between downloaded items.
    #[must_use]
    pub fn item_delay(&self) -> DelayRange {
        DelayRange::from_secs(self.delay_min_secs, self.delay_max_secs)
    }

    #[must_use]
    pub fn captcha_timeout(&self) -> Duration {
        Duration::from_secs(self.captcha_timeout_secs)
    }

    /// Token file for operator-solved challenges.
    #[must_use]
    pub fn captcha_token_path(&self) -> PathBuf {
        self.captcha_token_path
            .clone()
            .unwrap_or_else(|| self.download_dir.join("captcha_token.txt"))
    }

    /// Proxy for page sessions, when proxying is enabled.
    #[must_use]
    pub fn session_proxy(&self) -> Option<&ProxyConfig> {
        self.proxy.as_ref().filter(|_| self.use_proxy)
    }

    /// Proxy for bulk transfers, when proxying is enabled.
    #[must_use]
    pub fn transfer_proxy(&self) -> Option<&ProxyConfig> {
        self.bulk_proxy.as_ref().filter(|_| self.use_proxy)
    }
}

fn read_file(path: &Path) -> Result<Config, ConfigError> {
    let text = fs::read_to_string(path).map_err(|e| ConfigError::Io {
        path: path.to_path_buf(),
        source: e,
    })?;
    Config::from_toml_str(&text, path)
}

fn env_var_non_empty(name: &str) -> Option<String> {
    env::var(name).ok().filter(|v| !v.trim().is_empty())
}
