//! Configuration management for the OpenEI rate sensors
//!
//! This module handles loading and validation of the daemon configuration
//! from YAML files, and the per-entry `ConfigurationRecord` produced by the
//! config flow and read by the refresh coordinator.

use crate::error::{OpenEiError, Result};
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::{Path, PathBuf};

mod defaults;

/// Main configuration structure
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Logging configuration
    pub logging: LoggingConfig,

    /// Refresh coordinator timing
    pub coordinator: CoordinatorConfig,

    /// OpenEI API access
    pub api: ApiConfig,

    /// Host platform settings (location, timezone, storage)
    pub host: HostConfig,

    /// Configured rate-plan entries
    pub entries: Vec<ConfigurationRecord>,
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level (TRACE, DEBUG, INFO, WARN, ERROR)
    pub level: String,

    /// Path to log file or log directory
    pub file: String,

    /// Number of rotated files to keep
    pub backup_count: u32,

    /// Whether to log to console
    pub console_output: bool,

    /// Whether to use JSON format
    pub json_format: bool,
}

/// Refresh coordinator timing
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CoordinatorConfig {
    /// Fallback poll interval in seconds
    pub fallback_interval_secs: u64,

    /// Delay before retrying an entry whose setup was not ready
    pub setup_retry_secs: u64,
}

/// OpenEI API access
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ApiConfig {
    /// Base URL of the utility_rates endpoint
    pub base_url: String,

    /// HTTP request timeout in seconds
    pub timeout_secs: u64,

    /// How long a cached plan document is reused before refetching
    pub plan_cache_hours: u32,
}

/// Host platform settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HostConfig {
    /// Home latitude, used as the default lookup location
    pub latitude: f64,

    /// Home longitude, used as the default lookup location
    pub longitude: f64,

    /// IANA timezone used for rate schedules and the hourly alarm
    pub timezone: String,

    /// Directory holding per-entry cache files
    pub storage_dir: String,
}

impl HostConfig {
    /// Parse the configured timezone
    pub fn tz(&self) -> Result<Tz> {
        self.timezone.parse::<Tz>().map_err(|_| {
            OpenEiError::validation(
                "host.timezone".to_string(),
                format!("Unknown timezone: {}", self.timezone),
            )
        })
    }

    /// Default lookup location as "lat,lon"
    pub fn location(&self) -> String {
        format!("{},{}", self.latitude, self.longitude)
    }
}

/// One configured rate-plan entry
#[derive(Clone, PartialEq, Serialize, Deserialize)]
pub struct ConfigurationRecord {
    /// Stable entry identifier
    #[serde(default = "new_entry_id")]
    pub entry_id: String,

    /// Display title, usually the utility name
    #[serde(default)]
    pub title: String,

    /// OpenEI API key
    pub api_key: String,

    /// Utility name chosen in the config flow
    #[serde(default)]
    pub utility: Option<String>,

    /// Rate plan label chosen in the config flow
    #[serde(default)]
    pub rate_plan: Option<String>,

    /// Manually entered plan label, overrides `rate_plan`
    #[serde(default)]
    pub manual_plan: Option<String>,

    /// Entity id of a live energy meter
    #[serde(default)]
    pub sensor: Option<String>,

    /// Lookup location (address or "lat,lon")
    #[serde(default)]
    pub location: Option<String>,

    /// Lookup radius in miles
    #[serde(default)]
    pub radius: Option<f64>,
}

/// Generate a fresh entry identifier
pub fn new_entry_id() -> String {
    uuid::Uuid::new_v4().simple().to_string()
}

fn non_blank(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

impl ConfigurationRecord {
    /// Create a record with a fresh entry id
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            entry_id: new_entry_id(),
            title: String::new(),
            api_key: api_key.into(),
            utility: None,
            rate_plan: None,
            manual_plan: None,
            sensor: None,
            location: None,
            radius: None,
        }
    }

    /// Collapse blank optional strings to `None`
    pub fn normalized(mut self) -> Self {
        self.utility = non_blank(self.utility);
        self.rate_plan = non_blank(self.rate_plan);
        self.manual_plan = non_blank(self.manual_plan);
        self.sensor = non_blank(self.sensor);
        self.location = non_blank(self.location);
        self
    }

    /// Plan label to fetch: the manual override when present, else the chosen plan
    pub fn effective_plan(&self) -> Option<&str> {
        self.manual_plan
            .as_deref()
            .or(self.rate_plan.as_deref())
            .map(str::trim)
            .filter(|p| !p.is_empty())
    }

    /// Per-entry cache file handed to the rate client
    pub fn cache_file(&self, storage_dir: &Path) -> PathBuf {
        storage_dir.join(format!("openei_{}", self.entry_id))
    }
}

impl std::fmt::Debug for ConfigurationRecord {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConfigurationRecord")
            .field("entry_id", &self.entry_id)
            .field("title", &self.title)
            .field("api_key", &"<redacted>")
            .field("utility", &self.utility)
            .field("rate_plan", &self.rate_plan)
            .field("manual_plan", &self.manual_plan)
            .field("sensor", &self.sensor)
            .field("location", &self.location)
            .field("radius", &self.radius)
            .finish()
    }
}

impl Config {
    /// Load configuration from a YAML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        let config: Config = serde_yaml::from_str(&contents)?;
        Ok(config)
    }

    /// Load configuration from the default locations
    pub fn load() -> Result<Self> {
        let default_paths = [
            "openei_config.yaml",
            "/data/openei_config.yaml",
            "/etc/openei/config.yaml",
        ];

        for path in &default_paths {
            if Path::new(path).exists() {
                return Self::from_file(path);
            }
        }

        Ok(Config::default())
    }

    /// Save configuration to a YAML file
    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let yaml = serde_yaml::to_string(self)?;
        std::fs::write(path, yaml)?;
        Ok(())
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        self.host.tz()?;

        if self.coordinator.fallback_interval_secs == 0 {
            return Err(OpenEiError::validation(
                "coordinator.fallback_interval_secs",
                "Must be greater than 0",
            ));
        }

        if self.coordinator.setup_retry_secs == 0 {
            return Err(OpenEiError::validation(
                "coordinator.setup_retry_secs",
                "Must be greater than 0",
            ));
        }

        if self.api.timeout_secs == 0 {
            return Err(OpenEiError::validation(
                "api.timeout_secs",
                "Must be greater than 0",
            ));
        }

        let mut seen = HashSet::new();
        for (idx, entry) in self.entries.iter().enumerate() {
            if entry.api_key.trim().is_empty() {
                return Err(OpenEiError::validation(
                    format!("entries[{}].api_key", idx),
                    "API key cannot be empty".to_string(),
                ));
            }
            if !seen.insert(entry.entry_id.as_str()) {
                return Err(OpenEiError::validation(
                    format!("entries[{}].entry_id", idx),
                    format!("Duplicate entry id: {}", entry.entry_id),
                ));
            }
        }

        Ok(())
    }
}
