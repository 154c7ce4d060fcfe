// Configuration File Support
//
// This module provides configuration file parsing for the region limiter CLI.
// Supports TOML format with environment variable overrides.
// The file is looked up at $REGION_LIMITER_CONFIG, falling back to ./region-limiter.toml

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};

use crate::rate_limit::{RegionLimiterConfig, RegionSpec};

/// Default application name used for key namespacing
pub const DEFAULT_APPNAME: &str = "myapp";

/// Main configuration structure
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct Config {
    /// Selector and store options
    pub limiter: RegionLimiterConfig,

    /// Regions to register at startup
    pub regions: Vec<RegionSpec>,

    /// Logging configuration
    pub logging: LoggingConfig,
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    pub level: String,

    /// Log format (pretty, compact)
    pub format: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: "compact".to_string(),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            limiter: RegionLimiterConfig::new(DEFAULT_APPNAME),
            regions: vec![
                RegionSpec::new("us-west1", 100, 60),
                RegionSpec::new("us-west2", 100, 60),
                RegionSpec::new("us-west3", 50, 60),
            ],
            logging: LoggingConfig::default(),
        }
    }
}

impl Config {
    /// Load configuration from the default location
    ///
    /// If the config file does not exist, returns the default configuration
    /// with environment overrides applied.
    pub fn load() -> Result<Self> {
        Self::load_from_path(Self::config_path())
    }

    /// Load configuration from a specific path
    ///
    /// # Errors
    ///
    /// Returns an error if the file exists but cannot be read or parsed,
    /// or if the resulting configuration is invalid.
    pub fn load_from_path<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();

        let config = if path.exists() {
            let content = fs::read_to_string(path)
                .with_context(|| format!("Failed to read config file from {:?}", path))?;
            let config: Config = toml::from_str(&content)
                .with_context(|| format!("Failed to parse config file from {:?}", path))?;
            tracing::info!("Loaded configuration from {:?}", path);
            config
        } else {
            tracing::debug!("Config file not found at {:?}, using defaults", path);
            Self::default()
        };

        let config = config.apply_overrides(|name| std::env::var(name).ok());
        config.validate()?;
        Ok(config)
    }

    /// Default configuration file path
    pub fn config_path() -> PathBuf {
        std::env::var("REGION_LIMITER_CONFIG")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("region-limiter.toml"))
    }

    /// Apply overrides looked up by variable name
    ///
    /// Recognised variables:
    /// - REGION_LIMITER_APPNAME
    /// - REGION_LIMITER_STORE_HOST
    /// - REGION_LIMITER_STORE_PORT
    /// - REGION_LIMITER_LOG_LEVEL
    pub fn apply_overrides<F>(mut self, lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(appname) = lookup("REGION_LIMITER_APPNAME") {
            self.limiter.appname = appname;
        }
        if let Some(host) = lookup("REGION_LIMITER_STORE_HOST") {
            self.limiter.store_client.host = host;
        }
        if let Some(port) = lookup("REGION_LIMITER_STORE_PORT") {
            if let Ok(port) = port.parse::<u16>() {
                self.limiter.store_client.port = port;
            }
        }
        if let Some(level) = lookup("REGION_LIMITER_LOG_LEVEL") {
            self.logging.level = level;
        }
        self
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        match self.logging.level.to_lowercase().as_str() {
            "trace" | "debug" | "info" | "warn" | "error" => {}
            _ => anyhow::bail!(
                "Invalid log level: {}. Must be one of: trace, debug, info, warn, error",
                self.logging.level
            ),
        }

        match self.logging.format.to_lowercase().as_str() {
            "pretty" | "compact" => {}
            _ => anyhow::bail!(
                "Invalid log format: {}. Must be one of: pretty, compact",
                self.logging.format
            ),
        }

        self.limiter.validate()?;

        let mut seen = HashSet::new();
        for spec in &self.regions {
            if spec.region.is_empty() {
                anyhow::bail!("Region name must not be empty");
            }
            if !seen.insert(spec.region.as_str()) {
                anyhow::bail!("Region '{}' is configured more than once", spec.region);
            }
            if spec.quota == 0 {
                anyhow::bail!("Region '{}' has quota 0", spec.region);
            }
            if spec.duration_secs == 0 {
                anyhow::bail!("Region '{}' has duration 0", spec.region);
            }
        }

        Ok(())
    }

    /// Convert log level string to tracing::Level
    pub fn log_level(&self) -> Result<tracing::Level> {
        self.logging
            .level
            .to_lowercase()
            .parse()
            .map_err(|e| anyhow::anyhow!("Failed to parse log level: {}", e))
    }
}
