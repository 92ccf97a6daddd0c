//! Client configuration.

use std::collections::HashMap;
use std::env;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::{catalog::LegacyCatalog, errors::Result};

pub const DEFAULT_GATEWAY_URL: &str = "https://ipfs-gateway.dclimate.net";
pub const DEFAULT_CATALOG_ROOT: &str = "ipns://catalog.dclimate.net/catalog.json";
pub const DEFAULT_CACHE_TTL_SECS: u64 = 3600;

/// Configuration for a `Client`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    /// Base URL of the IPFS gateway used to fetch catalogs and datasets.
    pub gateway_url: String,

    /// Search endpoint of the fast-path lookup service, if there is one.
    pub lookup_url: Option<String>,

    /// Location of the root catalog document, resolved against the gateway.
    pub catalog_root: String,

    /// How long a fetched catalog tree stays fresh.
    pub cache_ttl_secs: u64,

    /// Whether requests without a variant may concatenate variants.
    pub auto_concatenate: bool,

    /// Flat name to identifier map consulted when the hierarchical catalog can't answer.
    pub legacy_catalog: HashMap<String, String>,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            gateway_url: DEFAULT_GATEWAY_URL.to_string(),
            lookup_url: None,
            catalog_root: DEFAULT_CATALOG_ROOT.to_string(),
            cache_ttl_secs: DEFAULT_CACHE_TTL_SECS,
            auto_concatenate: true,
            legacy_catalog: HashMap::new(),
        }
    }
}

impl ClientConfig {
    /// Load configuration from environment variables, falling back to defaults.
    pub fn from_env() -> Self {
        Self::from_vars(|name| env::var(name).ok())
    }

    /// Load configuration from a JSON document. Missing fields take their defaults.
    pub fn from_json_str(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    fn from_vars<F>(var: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();

        if let Some(val) = var("DCLIMATE_GATEWAY_URL") {
            config.gateway_url = val;
        }

        if let Some(val) = var("DCLIMATE_LOOKUP_URL") {
            config.lookup_url = Some(val).filter(|url| !url.is_empty());
        }

        if let Some(val) = var("DCLIMATE_CATALOG_ROOT") {
            config.catalog_root = val;
        }

        if let Some(val) = var("DCLIMATE_CACHE_TTL_SECS") {
            if let Ok(secs) = val.trim().parse() {
                config.cache_ttl_secs = secs;
            }
        }

        if let Some(val) = var("DCLIMATE_AUTO_CONCATENATE") {
            config.auto_concatenate = matches!(val.trim().to_lowercase().as_str(), "true" | "1");
        }

        config
    }

    pub fn cache_ttl(&self) -> Duration {
        Duration::from_secs(self.cache_ttl_secs)
    }

    /// The legacy map, with every identifier checked.
    pub fn legacy(&self) -> Result<LegacyCatalog> {
        LegacyCatalog::new(self.legacy_catalog.iter())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use crate::{errors::Error, testing};

    #[test]
    fn test_defaults() {
        let config = ClientConfig::default();
        assert_eq!(config.gateway_url, "https://ipfs-gateway.dclimate.net");
        assert_eq!(config.cache_ttl(), Duration::from_secs(3600));
        assert!(config.auto_concatenate);
        assert!(config.lookup_url.is_none());
    }

    #[test]
    fn test_from_vars() {
        let vars: HashMap<&str, &str> = [
            ("DCLIMATE_GATEWAY_URL", "http://localhost:8080"),
            ("DCLIMATE_LOOKUP_URL", "https://lookup.test/search"),
            ("DCLIMATE_CACHE_TTL_SECS", "60"),
            ("DCLIMATE_AUTO_CONCATENATE", "False"),
        ]
        .into_iter()
        .collect();
        let config = ClientConfig::from_vars(|name| vars.get(name).map(|val| val.to_string()));
        assert_eq!(config.gateway_url, "http://localhost:8080");
        assert_eq!(config.lookup_url.as_deref(), Some("https://lookup.test/search"));
        assert_eq!(config.catalog_root, DEFAULT_CATALOG_ROOT);
        assert_eq!(config.cache_ttl_secs, 60);
        assert!(!config.auto_concatenate);

        // Unparseable numbers keep the default
        let config = ClientConfig::from_vars(|name| {
            (name == "DCLIMATE_CACHE_TTL_SECS").then(|| String::from("soon"))
        });
        assert_eq!(config.cache_ttl_secs, DEFAULT_CACHE_TTL_SECS);
    }

    #[test]
    fn test_from_json_str() -> Result<()> {
        let json = format!(
            r#"{{"cache_ttl_secs": 10, "legacy_catalog": {{"chirps-final": "{}"}}}}"#,
            testing::cid("chirps-precip-final")
        );
        let config = ClientConfig::from_json_str(&json)?;
        assert_eq!(config.cache_ttl_secs, 10);
        assert_eq!(config.gateway_url, DEFAULT_GATEWAY_URL);
        assert!(!config.legacy()?.is_empty());

        assert!(matches!(ClientConfig::from_json_str("[1, 2]"), Err(Error::Json(_))));

        let bad = r#"{"legacy_catalog": {"chirps-final": "not-a-cid"}}"#;
        assert!(ClientConfig::from_json_str(bad)?.legacy().is_err());

        Ok(())
    }
}
