//! # Sync Configuration
//!
//! ## Configuration Sources
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                    Configuration Priority                               │
//! │                                                                         │
//! │  1. Environment Variables (highest priority)                           │
//! │     TILL_REMOTE_URL=https://sync.example.com                           │
//! │     TILL_DEVICE_ID=abc-123                                             │
//! │                                                                         │
//! │  2. TOML Config File                                                   │
//! │     ~/.config/pos/sync.toml (Linux)                                    │
//! │     ~/Library/Application Support/com.till.pos/sync.toml (macOS)       │
//! │                                                                         │
//! │  3. Default Values (lowest priority)                                   │
//! │     generated device id, no remote, hourly backups                     │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Configuration File Format
//! ```toml
//! # sync.toml
//! [device]
//! id = "550e8400-e29b-41d4-a716-446655440000"
//! name = "Register 1"
//!
//! [remote]
//! url = "https://sync.example.com/api"
//! token = "secret"
//! timeout_secs = 10
//!
//! [sync]
//! auto_backup_interval_secs = 3600
//! sync_on_login = true
//!
//! [auth]
//! admin_emails = ["owner@example.com"]
//! ```

use backoff::ExponentialBackoff;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::error::{SyncError, SyncResult};
use crate::session::AccessPolicy;

// =============================================================================
// Device Configuration
// =============================================================================

/// Configuration for this device.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeviceConfig {
    /// Unique device identifier (UUID v4).
    /// Auto-generated on first run if not provided.
    pub id: String,

    /// Human-readable device name (e.g., "Register 1").
    #[serde(default = "default_device_name")]
    pub name: String,
}

fn default_device_name() -> String {
    "POS Terminal".to_string()
}

impl Default for DeviceConfig {
    fn default() -> Self {
        DeviceConfig {
            id: Uuid::new_v4().to_string(),
            name: default_device_name(),
        }
    }
}

// =============================================================================
// Remote Settings
// =============================================================================

/// Where the remote document and blob stores live.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RemoteSettings {
    /// Base URL of the HTTP remote. `None` keeps the terminal offline-only.
    #[serde(default)]
    pub url: Option<String>,

    /// Bearer token sent with every request.
    #[serde(default)]
    pub token: Option<String>,

    /// Per-request timeout (seconds).
    #[serde(default = "default_timeout")]
    pub timeout_secs: u64,

    /// How often the HTTP remote is polled for changes (seconds).
    #[serde(default = "default_poll_interval")]
    pub poll_interval_secs: u64,
}

fn default_timeout() -> u64 {
    10
}

fn default_poll_interval() -> u64 {
    30
}

impl Default for RemoteSettings {
    fn default() -> Self {
        RemoteSettings {
            url: None,
            token: None,
            timeout_secs: default_timeout(),
            poll_interval_secs: default_poll_interval(),
        }
    }
}

// =============================================================================
// Sync Settings
// =============================================================================

/// Sync behavior settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SyncSettings {
    /// Interval between automatic backups while signed in (seconds).
    #[serde(default = "default_auto_backup_interval")]
    pub auto_backup_interval_secs: u64,

    /// Run a full sync whenever a user signs in.
    #[serde(default = "default_true")]
    pub sync_on_login: bool,

    /// Capacity of the push queue.
    #[serde(default = "default_queue_capacity")]
    pub queue_capacity: usize,

    /// Initial backoff (milliseconds) before retrying a failed push.
    #[serde(default = "default_initial_backoff")]
    pub initial_backoff_ms: u64,

    /// Maximum backoff between push retries (seconds).
    #[serde(default = "default_max_backoff")]
    pub max_backoff_secs: u64,

    /// Give up on a push after retrying this long (seconds).
    #[serde(default = "default_max_elapsed")]
    pub max_elapsed_secs: u64,
}

fn default_auto_backup_interval() -> u64 {
    3600
}
fn default_true() -> bool {
    true
}
fn default_queue_capacity() -> usize {
    256
}
fn default_initial_backoff() -> u64 {
    500
}
fn default_max_backoff() -> u64 {
    60
}
fn default_max_elapsed() -> u64 {
    300
}

impl Default for SyncSettings {
    fn default() -> Self {
        SyncSettings {
            auto_backup_interval_secs: default_auto_backup_interval(),
            sync_on_login: default_true(),
            queue_capacity: default_queue_capacity(),
            initial_backoff_ms: default_initial_backoff(),
            max_backoff_secs: default_max_backoff(),
            max_elapsed_secs: default_max_elapsed(),
        }
    }
}

// =============================================================================
// Auth Settings
// =============================================================================

/// Who counts as an administrator.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AuthSettings {
    /// E-mail addresses granted admin rights (case-insensitive).
    #[serde(default)]
    pub admin_emails: Vec<String>,
}

// =============================================================================
// Main Sync Configuration
// =============================================================================

/// Complete sync configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SyncConfig {
    #[serde(default)]
    pub device: DeviceConfig,

    #[serde(default)]
    pub remote: RemoteSettings,

    #[serde(default)]
    pub sync: SyncSettings,

    #[serde(default)]
    pub auth: AuthSettings,
}

impl SyncConfig {
    /// Creates a new config with defaults and a generated device ID.
    pub fn new() -> Self {
        Self::default()
    }

    /// Loads configuration from file, environment, and defaults.
    ///
    /// ## Load Order (later overrides earlier)
    /// 1. Default values
    /// 2. Config file (sync.toml)
    /// 3. Environment variables
    pub fn load(config_path: Option<PathBuf>) -> SyncResult<Self> {
        let mut config = Self::default();

        if let Some(path) = config_path.or_else(Self::default_config_path) {
            if path.exists() {
                info!(?path, "Loading sync config from file");
                let contents = std::fs::read_to_string(&path)?;
                config = toml::from_str(&contents)?;
            } else {
                debug!(?path, "Config file not found, using defaults");
            }
        }

        config.apply_env_overrides();
        config.validate()?;

        Ok(config)
    }

    /// Loads config or returns default if load fails.
    pub fn load_or_default(config_path: Option<PathBuf>) -> Self {
        Self::load(config_path).unwrap_or_else(|e| {
            warn!("Failed to load sync config: {}. Using defaults.", e);
            Self::default()
        })
    }

    /// Saves configuration to file.
    pub fn save(&self, config_path: Option<PathBuf>) -> SyncResult<()> {
        let path = config_path
            .or_else(Self::default_config_path)
            .ok_or_else(|| SyncError::ConfigSaveFailed("No config path available".into()))?;

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let contents = toml::to_string_pretty(self)?;
        std::fs::write(&path, contents)?;

        info!(?path, "Sync config saved");
        Ok(())
    }

    /// Validates the configuration.
    pub fn validate(&self) -> SyncResult<()> {
        if self.device.id.trim().is_empty() {
            return Err(SyncError::MissingDeviceId);
        }

        if let Some(ref raw) = self.remote.url {
            let parsed = url::Url::parse(raw)?;
            if !matches!(parsed.scheme(), "http" | "https") {
                return Err(SyncError::InvalidUrl(format!(
                    "Remote URL must start with http:// or https://, got: {}",
                    raw
                )));
            }
        }

        if self.sync.auto_backup_interval_secs == 0 {
            return Err(SyncError::InvalidConfig(
                "auto_backup_interval_secs must be greater than 0".into(),
            ));
        }

        if self.sync.queue_capacity == 0 {
            return Err(SyncError::InvalidConfig(
                "queue_capacity must be greater than 0".into(),
            ));
        }

        if self.remote.poll_interval_secs == 0 {
            return Err(SyncError::InvalidConfig(
                "poll_interval_secs must be greater than 0".into(),
            ));
        }

        Ok(())
    }

    fn apply_env_overrides(&mut self) {
        self.apply_overrides(|key| std::env::var(key).ok());
    }

    /// Applies `TILL_*` overrides read through `lookup`.
    fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(id) = lookup("TILL_DEVICE_ID") {
            debug!(device_id = %id, "Overriding device ID from environment");
            self.device.id = id;
        }

        if let Some(url) = lookup("TILL_REMOTE_URL") {
            debug!(url = %url, "Overriding remote URL from environment");
            self.remote.url = Some(url);
        }

        if let Some(token) = lookup("TILL_REMOTE_TOKEN") {
            self.remote.token = Some(token);
        }

        if let Some(secs) = lookup("TILL_AUTO_BACKUP_SECS") {
            match secs.parse::<u64>() {
                Ok(s) => self.sync.auto_backup_interval_secs = s,
                Err(_) => warn!(value = %secs, "Ignoring invalid TILL_AUTO_BACKUP_SECS"),
            }
        }

        if let Some(emails) = lookup("TILL_ADMIN_EMAILS") {
            self.auth.admin_emails = emails
                .split(',')
                .map(str::trim)
                .filter(|e| !e.is_empty())
                .map(String::from)
                .collect();
        }

        if let Some(flag) = lookup("TILL_SYNC_ON_LOGIN") {
            match flag.to_lowercase().as_str() {
                "1" | "true" | "yes" | "on" => self.sync.sync_on_login = true,
                "0" | "false" | "no" | "off" => self.sync.sync_on_login = false,
                _ => warn!(value = %flag, "Ignoring invalid TILL_SYNC_ON_LOGIN"),
            }
        }
    }

    /// Returns the default config file path.
    fn default_config_path() -> Option<PathBuf> {
        directories::ProjectDirs::from("com", "till", "pos")
            .map(|dirs| dirs.config_dir().join("sync.toml"))
    }

    // =========================================================================
    // Convenience Methods
    // =========================================================================

    pub fn device_id(&self) -> &str {
        &self.device.id
    }

    pub fn remote_url(&self) -> Option<&str> {
        self.remote.url.as_deref()
    }

    pub fn auto_backup_interval(&self) -> Duration {
        Duration::from_secs(self.sync.auto_backup_interval_secs)
    }

    /// Admin rule derived from `[auth]`.
    pub fn access_policy(&self) -> AccessPolicy {
        AccessPolicy::new(self.auth.admin_emails.clone())
    }

    /// Retry schedule for queued pushes.
    pub fn push_backoff(&self) -> ExponentialBackoff {
        ExponentialBackoff {
            initial_interval: Duration::from_millis(self.sync.initial_backoff_ms),
            max_interval: Duration::from_secs(self.sync.max_backoff_secs),
            multiplier: 2.0,
            max_elapsed_time: Some(Duration::from_secs(self.sync.max_elapsed_secs)),
            ..Default::default()
        }
    }
}
