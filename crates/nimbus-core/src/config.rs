use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use url::Url;

use crate::error::ConfigError;

/// Environment variable overriding `upstream.user_agent`
pub const USER_AGENT_ENV: &str = "NIMBUS_USER_AGENT";
/// Environment variable overriding `cache.file`
pub const CACHE_FILE_ENV: &str = "NIMBUS_CACHE_FILE";

const PLACEHOLDER_USER_AGENT: &str = "nimbus/0.1 (YOUR_CONTACT_EMAIL)";

/// Configuration validation errors
#[derive(Debug, Clone)]
pub struct ConfigValidationError {
    pub field: String,
    pub message: String,
}

impl std::fmt::Display for ConfigValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

/// Result of config validation
#[derive(Debug, Clone, Default)]
pub struct ValidationResult {
    pub errors: Vec<ConfigValidationError>,
    pub warnings: Vec<ConfigValidationError>,
}

impl ValidationResult {
    /// Returns true if there are no errors (warnings are OK)
    pub fn is_valid(&self) -> bool {
        self.errors.is_empty()
    }

    pub fn add_error(&mut self, field: impl Into<String>, message: impl Into<String>) {
        self.errors.push(ConfigValidationError {
            field: field.into(),
            message: message.into(),
        });
    }

    pub fn add_warning(&mut self, field: impl Into<String>, message: impl Into<String>) {
        self.warnings.push(ConfigValidationError {
            field: field.into(),
            message: message.into(),
        });
    }

    /// Get a user-friendly message summarizing all errors
    pub fn error_summary(&self) -> String {
        self.errors
            .iter()
            .map(|e| e.to_string())
            .collect::<Vec<_>>()
            .join("; ")
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Persistent cache location and entry lifetimes
    #[serde(default)]
    pub cache: CacheConfig,

    /// Upstream API endpoints and request policy
    #[serde(default)]
    pub upstream: UpstreamConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheConfig {
    /// Path of the JSON cache file
    #[serde(default = "default_cache_file")]
    pub file: PathBuf,

    #[serde(default = "default_short_ttl")]
    pub points_ttl_secs: u64,

    #[serde(default = "default_short_ttl")]
    pub forecast_ttl_secs: u64,

    #[serde(default = "default_stations_ttl")]
    pub stations_ttl_secs: u64,

    /// Alert zone boundaries rarely change
    #[serde(default = "default_long_ttl")]
    pub zone_ttl_secs: u64,

    #[serde(default = "default_long_ttl")]
    pub geocode_ttl_secs: u64,
}

fn default_cache_file() -> PathBuf {
    dirs::cache_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("nimbus")
        .join("weather_cache.json")
}

fn default_short_ttl() -> u64 {
    5 * 60
}

fn default_stations_ttl() -> u64 {
    60 * 60
}

fn default_long_ttl() -> u64 {
    24 * 60 * 60
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            file: default_cache_file(),
            points_ttl_secs: default_short_ttl(),
            forecast_ttl_secs: default_short_ttl(),
            stations_ttl_secs: default_stations_ttl(),
            zone_ttl_secs: default_long_ttl(),
            geocode_ttl_secs: default_long_ttl(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UpstreamConfig {
    /// Identifies the operator to weather.gov and Nominatim
    #[serde(default = "default_user_agent")]
    pub user_agent: String,

    #[serde(default = "default_weather_api_url")]
    pub weather_api_url: String,

    #[serde(default = "default_geocoder_url")]
    pub geocoder_url: String,

    #[serde(default = "default_timeout_secs")]
    pub request_timeout_secs: u64,

    /// Nominatim allows one request per second per client
    #[serde(default = "default_geocoder_interval_ms")]
    pub geocoder_min_interval_ms: u64,

    #[serde(default = "default_max_stations")]
    pub max_stations: usize,

    #[serde(default = "default_observation_max_age")]
    pub observation_max_age_minutes: i64,
}

fn default_user_agent() -> String {
    PLACEHOLDER_USER_AGENT.to_string()
}

fn default_weather_api_url() -> String {
    "https://api.weather.gov".to_string()
}

fn default_geocoder_url() -> String {
    "https://nominatim.openstreetmap.org".to_string()
}

fn default_timeout_secs() -> u64 {
    10
}

fn default_geocoder_interval_ms() -> u64 {
    1000
}

fn default_max_stations() -> usize {
    5
}

fn default_observation_max_age() -> i64 {
    120
}

impl Default for UpstreamConfig {
    fn default() -> Self {
        Self {
            user_agent: default_user_agent(),
            weather_api_url: default_weather_api_url(),
            geocoder_url: default_geocoder_url(),
            request_timeout_secs: default_timeout_secs(),
            geocoder_min_interval_ms: default_geocoder_interval_ms(),
            max_stations: default_max_stations(),
            observation_max_age_minutes: default_observation_max_age(),
        }
    }
}

impl Config {
    /// Load configuration from the default path, creating it if it doesn't exist,
    /// then apply environment overrides.
    pub fn load() -> Result<Self> {
        let config_path = Self::config_path()?;

        let mut config = if config_path.exists() {
            Self::read(&config_path)?
        } else {
            let config = Self::default();
            config.save_to(&config_path)?;
            config
        };

        config.apply_env_overrides();
        Ok(config)
    }

    /// Load configuration from an explicit path. The file must exist.
    pub fn load_from(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Err(ConfigError::NotFound(path.display().to_string()).into());
        }
        let mut config = Self::read(path)?;
        config.apply_env_overrides();
        Ok(config)
    }

    /// Load configuration and validate it
    ///
    /// Returns the config along with any validation warnings.
    /// Returns an error if validation fails with critical errors.
    pub fn load_validated(path: Option<&Path>) -> Result<(Self, ValidationResult)> {
        let config = match path {
            Some(p) => Self::load_from(p)?,
            None => Self::load()?,
        };
        let validation = config.validate();

        if !validation.is_valid() {
            return Err(ConfigError::Invalid(validation.error_summary()).into());
        }

        for warning in &validation.warnings {
            tracing::warn!("Config warning: {}", warning);
        }

        Ok((config, validation))
    }

    fn read(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path).context("Failed to read config file")?;

        toml::from_str(&contents)
            .map_err(|e| ConfigError::ParseError(e.to_string()).into())
    }

    /// Apply `NIMBUS_USER_AGENT` and `NIMBUS_CACHE_FILE` when set
    pub fn apply_env_overrides(&mut self) {
        self.apply_overrides(
            std::env::var(USER_AGENT_ENV).ok(),
            std::env::var(CACHE_FILE_ENV).ok(),
        );
    }

    fn apply_overrides(&mut self, user_agent: Option<String>, cache_file: Option<String>) {
        if let Some(agent) = user_agent.filter(|v| !v.trim().is_empty()) {
            self.upstream.user_agent = agent.trim().to_string();
        }
        if let Some(file) = cache_file.filter(|v| !v.trim().is_empty()) {
            self.cache.file = PathBuf::from(file.trim());
        }
    }

    /// Validate the configuration
    pub fn validate(&self) -> ValidationResult {
        let mut result = ValidationResult::default();

        self.validate_url(
            &self.upstream.weather_api_url,
            "upstream.weather_api_url",
            &mut result,
        );
        self.validate_url(
            &self.upstream.geocoder_url,
            "upstream.geocoder_url",
            &mut result,
        );

        let agent = self.upstream.user_agent.trim();
        if agent.is_empty() {
            result.add_warning("upstream.user_agent", "User agent is empty; weather.gov may reject requests");
        } else if agent == PLACEHOLDER_USER_AGENT {
            result.add_warning(
                "upstream.user_agent",
                format!("User agent is a placeholder; set {}", USER_AGENT_ENV),
            );
        }

        if self.upstream.request_timeout_secs == 0 {
            result.add_error("upstream.request_timeout_secs", "Timeout must be greater than 0");
        }

        if self.upstream.max_stations == 0 {
            result.add_warning("upstream.max_stations", "Ground observations disabled (0 stations)");
        }

        let ttls = [
            ("cache.points_ttl_secs", self.cache.points_ttl_secs),
            ("cache.forecast_ttl_secs", self.cache.forecast_ttl_secs),
            ("cache.stations_ttl_secs", self.cache.stations_ttl_secs),
            ("cache.zone_ttl_secs", self.cache.zone_ttl_secs),
            ("cache.geocode_ttl_secs", self.cache.geocode_ttl_secs),
        ];
        for (field, ttl) in ttls {
            if ttl == 0 {
                result.add_warning(field, "Caching disabled (0 seconds)");
            }
        }

        result
    }

    fn validate_url(&self, url_str: &str, field_name: &str, result: &mut ValidationResult) {
        match Url::parse(url_str) {
            Ok(url) => {
                if url.scheme() != "http" && url.scheme() != "https" {
                    result.add_error(
                        field_name,
                        format!("URL must use http or https scheme, got: {}", url.scheme()),
                    );
                }

                if url.host().is_none() {
                    result.add_error(field_name, "URL must have a host");
                }
            }
            Err(e) => {
                result.add_error(field_name, format!("Invalid URL: {}", e));
            }
        }
    }

    /// Save configuration to the default path
    pub fn save(&self) -> Result<()> {
        self.save_to(&Self::config_path()?)
    }

    fn save_to(&self, config_path: &Path) -> Result<()> {
        if let Some(parent) = config_path.parent() {
            std::fs::create_dir_all(parent).context("Failed to create config directory")?;
        }

        let contents = toml::to_string_pretty(self).context("Failed to serialize config")?;

        std::fs::write(config_path, contents).context("Failed to write config file")?;

        Ok(())
    }

    /// Get the path to the configuration file
    fn config_path() -> Result<PathBuf> {
        let config_dir = dirs::config_dir()
            .context("Failed to get config directory")?
            .join("nimbus");

        Ok(config_dir.join("config.toml"))
    }
}
