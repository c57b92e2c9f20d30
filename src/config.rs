//! Sync layer configuration
//!
//! Loaded from TOML; every field has a default so a partial file (or no file)
//! is valid.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::{Result, SyncError};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub api: ApiConfig,
    #[serde(default)]
    pub store: StoreConfig,
    #[serde(default)]
    pub presence: PresenceConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiConfig {
    /// Base URL of the social API (e.g. "https://api.example.com/v1")
    #[serde(default = "default_base_url")]
    pub base_url: String,

    /// Bearer token sent with every request
    #[serde(default)]
    pub api_token: Option<String>,

    /// Request timeout in seconds
    #[serde(default = "default_timeout")]
    pub timeout_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreConfig {
    /// Key prefix isolating one account's overlay from another's
    #[serde(default = "default_scope")]
    pub scope: String,

    /// Overlay file for the JSON file store
    #[serde(default = "default_store_path")]
    pub path: PathBuf,

    /// Request-id mappings older than this are pruned after a sync
    #[serde(default = "default_mapping_ttl")]
    pub mapping_ttl_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PresenceConfig {
    /// Minimum movement before a new location is reported
    #[serde(default = "default_distance_threshold")]
    pub distance_threshold_m: f64,

    /// Forced report period, independent of movement
    #[serde(default = "default_report_interval")]
    pub report_interval_secs: u64,

    /// Ask the server to look for nearby users on each report
    #[serde(default = "default_true")]
    pub check_nearby: bool,
}

// Defaults
fn default_base_url() -> String { "http://localhost:3000/api".to_string() }
fn default_timeout() -> u64 { 30 }
fn default_scope() -> String { "default".to_string() }
fn default_store_path() -> PathBuf { PathBuf::from("network-sync.json") }
fn default_mapping_ttl() -> u64 { 30 * 24 * 60 * 60 } // 30 days
fn default_distance_threshold() -> f64 { 100.0 }
fn default_report_interval() -> u64 { 5 * 60 }
fn default_true() -> bool { true }

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            api_token: None,
            timeout_secs: default_timeout(),
        }
    }
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            scope: default_scope(),
            path: default_store_path(),
            mapping_ttl_secs: default_mapping_ttl(),
        }
    }
}

impl Default for PresenceConfig {
    fn default() -> Self {
        Self {
            distance_threshold_m: default_distance_threshold(),
            report_interval_secs: default_report_interval(),
            check_nearby: true,
        }
    }
}

impl StoreConfig {
    pub fn mapping_ttl(&self) -> Duration {
        Duration::from_secs(self.mapping_ttl_secs)
    }
}

impl PresenceConfig {
    pub fn report_interval(&self) -> Duration {
        Duration::from_secs(self.report_interval_secs)
    }
}

impl Config {
    /// Parse a TOML document and validate it.
    pub fn from_toml_str(content: &str) -> Result<Self> {
        let config: Config = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Load from a file, falling back to defaults when it does not exist.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if !path.exists() {
            tracing::info!(path = %path.display(), "Config file not found, using defaults");
            return Ok(Self::default());
        }
        let content = std::fs::read_to_string(path).map_err(|e| {
            SyncError::Config(format!("cannot read {}: {}", path.display(), e))
        })?;
        Self::from_toml_str(&content)
    }

    pub fn validate(&self) -> Result<()> {
        if self.api.base_url.trim().is_empty() {
            return Err(SyncError::Config("api.base_url must not be empty".into()));
        }
        if self.store.scope.trim().is_empty() {
            return Err(SyncError::Config("store.scope must not be empty".into()));
        }
        if !(self.presence.distance_threshold_m.is_finite() && self.presence.distance_threshold_m >= 0.0) {
            return Err(SyncError::Config(
                "presence.distance_threshold_m must be a non-negative number".into(),
            ));
        }
        if self.presence.report_interval_secs == 0 {
            return Err(SyncError::Config(
                "presence.report_interval_secs must be greater than zero".into(),
            ));
        }
        Ok(())
    }
}
