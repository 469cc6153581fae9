//! # Terminal Configuration
//!
//! Local settings for one terminal: where the store lives, how checkout
//! taxes, and which assets the resource cache keeps offline.
//!
//! ## Configuration Sources (Priority Order)
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                    Configuration Loading                                │
//! │                                                                         │
//! │  1. Environment Variables (highest priority)                           │
//! │     TILL_DB_PATH=/srv/till/till.db                                     │
//! │     TILL_ASSET_ORIGIN=http://localhost:3000                            │
//! │                                                                         │
//! │  2. Config File                                                         │
//! │     ~/.config/pos/terminal.toml (Linux)                                │
//! │                                                                         │
//! │  3. Default Values (lowest priority)                                   │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Example terminal.toml
//! ```toml
//! [store]
//! path = "/srv/till/till.db"
//! max_connections = 5
//!
//! [checkout]
//! tax_rate_bps = 1900
//! currency_code = "EUR"
//!
//! [assets]
//! origin = "http://localhost:3000"
//!
//! [cache]
//! generation = "till-v3-cache"
//! offline_page = "/offline.html"
//! ```

use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use tracing::{debug, info, warn};
use url::Url;

use till_cache::CacheManifest;
use till_core::validation::validate_tax_rate_bps;
use till_core::{TaxRate, DEFAULT_TAX_RATE_BPS};
use till_db::{StoreConfig, LATEST_VERSION};

use crate::error::{ApiError, ApiResult};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreSettings {
    /// Database file. Platform data directory when unset.
    pub path: Option<PathBuf>,

    /// Schema version to open at.
    pub schema_version: i64,

    pub max_connections: u32,
}

impl Default for StoreSettings {
    fn default() -> Self {
        StoreSettings {
            path: None,
            schema_version: LATEST_VERSION,
            max_connections: 5,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CheckoutSettings {
    /// Sales tax in basis points (1900 = 19%).
    pub tax_rate_bps: u32,

    /// ISO 4217 code used when formatting amounts.
    pub currency_code: String,
}

impl Default for CheckoutSettings {
    fn default() -> Self {
        CheckoutSettings {
            tax_rate_bps: DEFAULT_TAX_RATE_BPS,
            currency_code: "EUR".to_string(),
        }
    }
}

/// Where the terminal's static assets are served from.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AssetSettings {
    /// Asset origin. No resource cache runs when unset.
    pub origin: Option<String>,

    pub timeout_secs: u64,
}

impl Default for AssetSettings {
    fn default() -> Self {
        AssetSettings {
            origin: None,
            timeout_secs: 10,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TerminalConfig {
    pub store: StoreSettings,
    pub checkout: CheckoutSettings,
    pub assets: AssetSettings,
    pub cache: CacheManifest,
}

impl TerminalConfig {
    /// Loads configuration from file, environment, and defaults.
    pub fn load(config_path: Option<PathBuf>) -> ApiResult<Self> {
        let mut config = Self::default();

        if let Some(path) = config_path.or_else(Self::default_config_path) {
            if path.exists() {
                info!(?path, "Loading terminal config from file");
                let contents = std::fs::read_to_string(&path)
                    .map_err(|e| ApiError::config(format!("Failed to read config: {}", e)))?;
                config = toml::from_str(&contents)
                    .map_err(|e| ApiError::config(format!("Failed to parse config: {}", e)))?;
            } else {
                debug!(?path, "Config file not found, using defaults");
            }
        }

        config.apply_overrides(|key| std::env::var(key).ok());
        config.validate()?;

        Ok(config)
    }

    /// Loads config or returns default if load fails.
    pub fn load_or_default(config_path: Option<PathBuf>) -> Self {
        Self::load(config_path).unwrap_or_else(|e| {
            warn!("Failed to load terminal config: {}. Using defaults.", e);
            Self::default()
        })
    }

    pub fn validate(&self) -> ApiResult<()> {
        validate_tax_rate_bps(self.checkout.tax_rate_bps)
            .map_err(|e| ApiError::config(e.to_string()))?;

        if self.checkout.currency_code.len() != 3
            || !self.checkout.currency_code.chars().all(|c| c.is_ascii_uppercase())
        {
            return Err(ApiError::config(format!(
                "currency_code must be a three-letter ISO code, got: {}",
                self.checkout.currency_code
            )));
        }

        if self.store.schema_version < 1 || self.store.schema_version > LATEST_VERSION {
            return Err(ApiError::config(format!(
                "schema_version must be between 1 and {}",
                LATEST_VERSION
            )));
        }

        if self.store.max_connections == 0 {
            return Err(ApiError::config("max_connections must be greater than 0"));
        }

        if let Some(origin) = self.asset_origin()? {
            if !matches!(origin.scheme(), "http" | "https") {
                return Err(ApiError::config(format!(
                    "assets.origin must start with http:// or https://, got: {}",
                    origin
                )));
            }
        }

        self.cache
            .validate()
            .map_err(|e| ApiError::config(e.to_string()))?;
        Ok(())
    }

    /// Applies `TILL_*` overrides read through `lookup`.
    fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(path) = lookup("TILL_DB_PATH") {
            debug!(path = %path, "Overriding database path from environment");
            self.store.path = Some(PathBuf::from(path));
        }

        if let Some(origin) = lookup("TILL_ASSET_ORIGIN") {
            debug!(origin = %origin, "Overriding asset origin from environment");
            self.assets.origin = Some(origin);
        }
    }

    pub fn asset_origin(&self) -> ApiResult<Option<Url>> {
        self.assets
            .origin
            .as_deref()
            .map(|raw| {
                Url::parse(raw).map_err(|e| ApiError::config(format!("Invalid asset origin: {}", e)))
            })
            .transpose()
    }

    fn default_config_path() -> Option<PathBuf> {
        ProjectDirs::from("com", "till", "pos").map(|dirs| dirs.config_dir().join("terminal.toml"))
    }

    /// Resolves the database file, creating its directory.
    ///
    /// ## Platform-Specific Paths
    /// - **macOS**: `~/Library/Application Support/com.till.pos/till.db`
    /// - **Windows**: `%APPDATA%\till\pos\data\till.db`
    /// - **Linux**: `~/.local/share/pos/till.db`
    pub fn database_path(&self) -> ApiResult<PathBuf> {
        let path = match self.store.path {
            Some(ref path) => path.clone(),
            None => {
                let dirs = ProjectDirs::from("com", "till", "pos")
                    .ok_or_else(|| ApiError::config("Could not determine app data directory"))?;
                dirs.data_dir().join("till.db")
            }
        };

        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent).map_err(|e| {
                    ApiError::config(format!("Failed to create {}: {}", parent.display(), e))
                })?;
            }
        }

        Ok(path)
    }

    pub fn store_config(&self) -> ApiResult<StoreConfig> {
        Ok(StoreConfig::new(self.database_path()?)
            .max_connections(self.store.max_connections)
            .schema_version(self.store.schema_version))
    }

    pub fn tax_rate(&self) -> TaxRate {
        TaxRate::from_bps(self.checkout.tax_rate_bps)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorCode;
    use std::collections::HashMap;

    #[test]
    fn test_defaults_are_valid() {
        let config = TerminalConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.checkout.tax_rate_bps, 1900);
        assert_eq!(config.store.schema_version, LATEST_VERSION);
        assert_eq!(config.cache.generation, "till-v3-cache");
    }

    #[test]
    fn test_partial_file_keeps_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("terminal.toml");
        std::fs::write(&path, "[checkout]\ntax_rate_bps = 700\n").unwrap();

        let config = TerminalConfig::load(Some(path)).unwrap();
        assert_eq!(config.checkout.tax_rate_bps, 700);
        assert_eq!(config.checkout.currency_code, "EUR");
        assert_eq!(config.store.max_connections, 5);
    }

    #[test]
    fn test_env_overrides() {
        let env: HashMap<&str, &str> = [
            ("TILL_DB_PATH", "/tmp/till-test.db"),
            ("TILL_ASSET_ORIGIN", "http://localhost:3000"),
        ]
        .into();
        let mut config = TerminalConfig::default();
        config.apply_overrides(|key| env.get(key).map(|v| v.to_string()));

        assert_eq!(config.store.path, Some(PathBuf::from("/tmp/till-test.db")));
        assert_eq!(
            config.asset_origin().unwrap().unwrap().as_str(),
            "http://localhost:3000/"
        );
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_invalid_values_rejected() {
        let mut config = TerminalConfig::default();
        config.checkout.currency_code = "euro".into();
        assert_eq!(config.validate().unwrap_err().code, ErrorCode::ConfigError);

        let mut config = TerminalConfig::default();
        config.store.schema_version = LATEST_VERSION + 1;
        assert!(config.validate().is_err());

        let mut config = TerminalConfig::default();
        config.assets.origin = Some("ftp://assets.local".into());
        assert_eq!(config.validate().unwrap_err().code, ErrorCode::ConfigError);

        let mut config = TerminalConfig::default();
        config.cache.generation = String::new();
        assert_eq!(config.validate().unwrap_err().code, ErrorCode::ConfigError);
    }

    #[test]
    fn test_database_path_creates_directory() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = TerminalConfig::default();
        config.store.path = Some(dir.path().join("nested").join("till.db"));

        let path = config.database_path().unwrap();
        assert!(path.parent().unwrap().is_dir());
        assert_eq!(config.store_config().unwrap().database_path, path);
    }
}
