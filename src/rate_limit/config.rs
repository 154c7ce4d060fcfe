//! Region Limiter Configuration
//!
//! Initialization options for the region selector.

use serde::{Deserialize, Serialize};
use std::time::Duration;

use super::error::{RegionError, Result};

/// Default store host
pub const DEFAULT_STORE_HOST: &str = "127.0.0.1";

/// Default store port
pub const DEFAULT_STORE_PORT: u16 = 6379;

/// Namespace segment placed between the app name and the region
pub const KEY_NAMESPACE: &str = "rl";

/// Region selector configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegionLimiterConfig {
    /// Prefix for every key written to the store
    #[serde(default)]
    pub appname: String,

    /// Store connection options
    #[serde(default)]
    pub store_client: StoreClientConfig,
}

/// Connection options for the shared quota store
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreClientConfig {
    /// Store host
    pub host: String,

    /// Store port
    pub port: u16,
}

impl Default for StoreClientConfig {
    fn default() -> Self {
        Self {
            host: DEFAULT_STORE_HOST.to_string(),
            port: DEFAULT_STORE_PORT,
        }
    }
}

impl RegionLimiterConfig {
    /// Create a configuration for `appname` with the default store address
    pub fn new(appname: impl Into<String>) -> Self {
        Self {
            appname: appname.into(),
            store_client: StoreClientConfig::default(),
        }
    }

    /// Set the store address
    pub fn with_store(mut self, host: impl Into<String>, port: u16) -> Self {
        self.store_client = StoreClientConfig {
            host: host.into(),
            port,
        };
        self
    }

    /// Check that every required option is present
    pub fn validate(&self) -> Result<()> {
        if self.appname.trim().is_empty() {
            return Err(RegionError::Configuration(
                "The appname option is required".to_string(),
            ));
        }
        if self.store_client.host.trim().is_empty() {
            return Err(RegionError::Configuration(
                "The storeClient.host option is required".to_string(),
            ));
        }
        if self.store_client.port == 0 {
            return Err(RegionError::Configuration(
                "The storeClient.port option is required".to_string(),
            ));
        }
        Ok(())
    }

    /// Prefix shared by all region keys, e.g. `myapp:rl`
    pub fn key_prefix(&self) -> String {
        format!("{}:{}", self.appname, KEY_NAMESPACE)
    }

    /// Store key for a region, e.g. `myapp:rl:us-west1`
    pub fn key_for(&self, region: &str) -> String {
        format!("{}:{}", self.key_prefix(), region)
    }

    /// Connection URL for the store
    pub fn store_url(&self) -> String {
        format!(
            "redis://{}:{}/",
            self.store_client.host, self.store_client.port
        )
    }
}

/// One region registration as it appears in configuration files
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegionSpec {
    /// Unique region name
    pub region: String,

    /// Units allowed per window
    pub quota: u32,

    /// Window length in seconds
    #[serde(alias = "duration")]
    pub duration_secs: u64,
}

impl RegionSpec {
    pub fn new(region: impl Into<String>, quota: u32, duration_secs: u64) -> Self {
        Self {
            region: region.into(),
            quota,
            duration_secs,
        }
    }

    /// Window length
    pub fn duration(&self) -> Duration {
        Duration::from_secs(self.duration_secs)
    }
}
