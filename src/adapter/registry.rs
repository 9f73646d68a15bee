//! Builds the configured site adapters and looks them up by source.

use std::collections::HashMap;
use std::sync::Arc;

use tracing::debug;

use super::{
    AdapterError, HostBlocklist, ManualsBaseAdapter, ManualsLibAdapter, ManualzzAdapter, Session,
    SiteAdapter,
};
use crate::catalog::Source;
use crate::config::Config;
use crate::download::{ClientOptions, HttpClient};

/// Adapters keyed by [`Source`].
#[derive(Default)]
pub struct AdapterRegistry {
    adapters: HashMap<Source, Arc<dyn SiteAdapter>>,
}

impl std::fmt::Debug for AdapterRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut sources: Vec<&str> = self.adapters.keys().map(Source::as_str).collect();
        sources.sort_unstable();
        f.debug_struct("AdapterRegistry")
            .field("sources", &sources)
            .finish()
    }
}

impl AdapterRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// One adapter per source, each with its own cookie session. Sessions
    /// go through the session proxy when proxying is enabled.
    ///
    /// # Errors
    ///
    /// Returns [`AdapterError::Config`] if a proxy URL or HTTP client cannot
    /// be built.
    pub fn from_config(
        config: &Config,
        blocklist: Arc<HostBlocklist>,
    ) -> Result<Self, AdapterError> {
        let mut registry = Self::new();
        for source in Source::ALL {
            let session = session_for(source, config, Arc::clone(&blocklist))?;
            let adapter: Arc<dyn SiteAdapter> = match source {
                Source::ManualsLib => Arc::new(ManualsLibAdapter::new(session, &config.manualslib)?),
                Source::ManualsBase => {
                    Arc::new(ManualsBaseAdapter::new(session, &config.manualsbase)?)
                }
                Source::Manualzz => Arc::new(ManualzzAdapter::new(session, &config.manualzz)?),
            };
            registry.register(adapter);
        }
        debug!(adapters = registry.len(), "adapter registry built");
        Ok(registry)
    }

    /// Adds or replaces the adapter for its source.
    pub fn register(&mut self, adapter: Arc<dyn SiteAdapter>) {
        self.adapters.insert(adapter.source(), adapter);
    }

    /// # Errors
    ///
    /// Returns [`AdapterError::Config`] when no adapter is registered for
    /// `source`.
    pub fn get(&self, source: Source) -> Result<Arc<dyn SiteAdapter>, AdapterError> {
        self.adapters
            .get(&source)
            .cloned()
            .ok_or_else(|| AdapterError::config(source, "no adapter registered"))
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.adapters.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.adapters.is_empty()
    }
}

fn session_for(
    source: Source,
    config: &Config,
    blocklist: Arc<HostBlocklist>,
) -> Result<Session, AdapterError> {
    let proxy = config
        .session_proxy()
        .map(|p| p.url())
        .transpose()
        .map_err(|e| AdapterError::config(source, e.to_string()))?;
    let client = HttpClient::new(&ClientOptions::session().with_proxy(proxy))
        .map_err(|e| AdapterError::config(source, e.to_string()))?;
    Ok(Session::new(source, client, blocklist))
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_from_config_registers_every_source() {
        let registry =
            AdapterRegistry::from_config(&Config::default(), Arc::new(HostBlocklist::builtin()))
                .unwrap();
        assert_eq!(registry.len(), Source::ALL.len());
        for source in Source::ALL {
            assert_eq!(registry.get(source).unwrap().source(), source);
        }
    }

    #[test]
    fn test_missing_adapter_is_config_error() {
        let registry = AdapterRegistry::new();
        assert!(registry.is_empty());
        let err = registry.get(Source::Manualzz).err().unwrap();
        assert!(matches!(err, AdapterError::Config { .. }));
    }
}
