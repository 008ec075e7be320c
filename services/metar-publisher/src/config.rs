//! Publisher configuration.
//!
//! Loaded from an optional YAML file with `${VAR}` / `${VAR:-default}`
//! substitution, then overlaid with environment variables, which always
//! take precedence over file values.

use std::path::Path;
use std::time::Duration;

use metar_common::AirportFilter;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::error::ConfigError;
use crate::retry::RetryPolicy;

/// Root configuration for the publisher service.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct PublisherConfig {
    #[serde(default)]
    pub lattice: LatticeConfig,
    #[serde(default)]
    pub integration: IntegrationConfig,
    #[serde(default)]
    pub weather: WeatherConfig,
    #[serde(default)]
    pub retry: RetryConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
    #[serde(default)]
    pub airports: AirportSelection,
}

/// Entity platform endpoint and credentials.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct LatticeConfig {
    pub url: Option<String>,
    pub environment_token: Option<String>,
    pub sandboxes_token: Option<String>,
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
}

impl Default for LatticeConfig {
    fn default() -> Self {
        Self {
            url: None,
            environment_token: None,
            sandboxes_token: None,
            request_timeout_secs: default_request_timeout_secs(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct IntegrationConfig {
    #[serde(default = "default_integration_name")]
    pub name: String,
    #[serde(default = "default_update_interval_minutes")]
    pub update_interval_minutes: u64,
    #[serde(default = "default_entity_expiry_hours")]
    pub entity_expiry_hours: u64,
    /// Attach the terminal forecast to each entity payload
    #[serde(default = "default_true")]
    pub include_forecast: bool,
    /// Maximum concurrent entity publishes
    #[serde(default = "default_publish_concurrency")]
    pub publish_concurrency: usize,
}

impl Default for IntegrationConfig {
    fn default() -> Self {
        Self {
            name: default_integration_name(),
            update_interval_minutes: default_update_interval_minutes(),
            entity_expiry_hours: default_entity_expiry_hours(),
            include_forecast: true,
            publish_concurrency: default_publish_concurrency(),
        }
    }
}

/// Upstream weather data source.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct WeatherConfig {
    #[serde(default = "default_weather_base_url")]
    pub base_url: String,
    /// Minimum spacing between any two upstream requests
    #[serde(default = "default_min_request_interval_ms")]
    pub min_request_interval_ms: u64,
    /// Airport codes per upstream request
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    #[serde(default = "default_max_concurrent_batches")]
    pub max_concurrent_batches: usize,
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
    /// How far back to look for observations
    #[serde(default = "default_lookback_hours")]
    pub lookback_hours: u32,
    #[serde(default = "default_user_agent")]
    pub user_agent: String,
}

impl Default for WeatherConfig {
    fn default() -> Self {
        Self {
            base_url: default_weather_base_url(),
            min_request_interval_ms: default_min_request_interval_ms(),
            batch_size: default_batch_size(),
            max_concurrent_batches: default_max_concurrent_batches(),
            request_timeout_secs: default_request_timeout_secs(),
            lookback_hours: default_lookback_hours(),
            user_agent: default_user_agent(),
        }
    }
}

/// Backoff settings shared by fetch and publish retries.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RetryConfig {
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    #[serde(default = "default_initial_delay_ms")]
    pub initial_delay_ms: u64,
    #[serde(default = "default_max_delay_ms")]
    pub max_delay_ms: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            initial_delay_ms: default_initial_delay_ms(),
            max_delay_ms: default_max_delay_ms(),
        }
    }
}

impl RetryConfig {
    pub fn policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_attempts: self.max_attempts,
            initial_delay: Duration::from_millis(self.initial_delay_ms),
            max_delay: Duration::from_millis(self.max_delay_ms),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct AirportSelection {
    #[serde(default)]
    pub include_only: Vec<String>,
    #[serde(default)]
    pub exclude: Vec<String>,
}

impl AirportSelection {
    pub fn filter(&self) -> AirportFilter {
        AirportFilter::new(&self.include_only, &self.exclude)
    }
}

fn default_request_timeout_secs() -> u64 {
    30
}
fn default_integration_name() -> String {
    metar_common::entity::DEFAULT_INTEGRATION_NAME.to_string()
}
fn default_update_interval_minutes() -> u64 {
    30
}
fn default_entity_expiry_hours() -> u64 {
    2
}
fn default_true() -> bool {
    true
}
fn default_publish_concurrency() -> usize {
    4
}
fn default_weather_base_url() -> String {
    "https://aviationweather.gov/api/data".to_string()
}
fn default_min_request_interval_ms() -> u64 {
    1000
}
fn default_batch_size() -> usize {
    20
}
fn default_max_concurrent_batches() -> usize {
    2
}
fn default_lookback_hours() -> u32 {
    2
}
fn default_user_agent() -> String {
    concat!("metar-publisher/", env!("CARGO_PKG_VERSION")).to_string()
}
fn default_max_attempts() -> u32 {
    4
}
fn default_initial_delay_ms() -> u64 {
    1000
}
fn default_max_delay_ms() -> u64 {
    30_000
}
fn default_log_level() -> String {
    "info".to_string()
}

/// Validated endpoint and credentials for the entity platform.
#[derive(Clone)]
pub struct LatticeCredentials {
    pub url: String,
    pub environment_token: String,
    pub sandboxes_token: Option<String>,
}

impl std::fmt::Debug for LatticeCredentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LatticeCredentials")
            .field("url", &self.url)
            .field("environment_token", &"<redacted>")
            .field("sandboxes_token", &self.sandboxes_token.as_ref().map(|_| "<redacted>"))
            .finish()
    }
}

impl PublisherConfig {
    /// Load from `path` (if any) and the process environment, then validate.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let lookup = |name: &str| std::env::var(name).ok();

        let mut config = match path {
            Some(path) => {
                info!(path = %path.display(), "Loading configuration file");
                Self::from_file(path, lookup)?
            }
            None => {
                debug!("No configuration file, using defaults and environment");
                Self::default()
            }
        };

        config.apply_env_overrides(lookup)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_file<F>(path: &Path, lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let expanded = expand_env_vars(&content, lookup)?;
        Self::from_yaml_str(&expanded)
    }

    pub fn from_yaml_str(content: &str) -> Result<Self, ConfigError> {
        if content.trim().is_empty() {
            return Ok(Self::default());
        }
        serde_yaml::from_str(content).map_err(|e| ConfigError::Parse(e.to_string()))
    }

    /// Overlay recognized environment variables. Empty values are ignored.
    pub fn apply_env_overrides<F>(&mut self, lookup: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |name: &str| lookup(name).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        if let Some(url) = get("LATTICE_URL") {
            self.lattice.url = Some(url);
        }
        if let Some(token) = get("ENVIRONMENT_TOKEN") {
            self.lattice.environment_token = Some(token);
        }
        if let Some(token) = get("SANDBOXES_TOKEN") {
            self.lattice.sandboxes_token = Some(token);
        }
        if let Some(value) = get("UPDATE_INTERVAL_MINUTES") {
            self.integration.update_interval_minutes = parse_number("UPDATE_INTERVAL_MINUTES", &value)?;
        }
        if let Some(value) = get("ENTITY_EXPIRY_HOURS") {
            self.integration.entity_expiry_hours = parse_number("ENTITY_EXPIRY_HOURS", &value)?;
        }
        if let Some(value) = get("AIRPORTS_INCLUDE") {
            self.airports.include_only = split_list(&value);
        }
        if let Some(value) = get("AIRPORTS_EXCLUDE") {
            self.airports.exclude = split_list(&value);
        }
        if let Some(level) = get("LOG_LEVEL") {
            self.logging.level = level;
        }
        if let Some(url) = get("WEATHER_API_URL") {
            self.weather.base_url = url;
        }
        Ok(())
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        self.credentials()?;

        if self.integration.update_interval_minutes == 0 {
            return Err(ConfigError::Invalid(
                "update_interval_minutes must be greater than 0".to_string(),
            ));
        }
        if self.integration.entity_expiry_hours == 0 {
            return Err(ConfigError::Invalid(
                "entity_expiry_hours must be greater than 0".to_string(),
            ));
        }
        if self.integration.publish_concurrency == 0 {
            return Err(ConfigError::Invalid("publish_concurrency must be at least 1".to_string()));
        }
        if self.weather.batch_size == 0 || self.weather.max_concurrent_batches == 0 {
            return Err(ConfigError::Invalid(
                "weather batch_size and max_concurrent_batches must be at least 1".to_string(),
            ));
        }
        if self.retry.max_attempts == 0 {
            return Err(ConfigError::Invalid("retry max_attempts must be at least 1".to_string()));
        }
        if self.retry.initial_delay_ms > self.retry.max_delay_ms {
            return Err(ConfigError::Invalid(
                "retry initial_delay_ms must not exceed max_delay_ms".to_string(),
            ));
        }
        Ok(())
    }

    /// Mandatory endpoint and token, plus the optional sandbox token.
    pub fn credentials(&self) -> Result<LatticeCredentials, ConfigError> {
        let non_empty = |v: &Option<String>| v.as_deref().map(str::trim).filter(|s| !s.is_empty()).map(String::from);

        let url = non_empty(&self.lattice.url).ok_or(ConfigError::MissingCredential("LATTICE_URL"))?;
        let environment_token = non_empty(&self.lattice.environment_token)
            .ok_or(ConfigError::MissingCredential("ENVIRONMENT_TOKEN"))?;

        Ok(LatticeCredentials {
            url,
            environment_token,
            sandboxes_token: non_empty(&self.lattice.sandboxes_token),
        })
    }

    pub fn update_interval(&self) -> Duration {
        Duration::from_secs(self.integration.update_interval_minutes * 60)
    }

    pub fn entity_ttl(&self) -> chrono::Duration {
        chrono::Duration::hours(self.integration.entity_expiry_hours as i64)
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        self.retry.policy()
    }
}

fn parse_number<T: std::str::FromStr>(name: &str, value: &str) -> Result<T, ConfigError> {
    value
        .parse()
        .map_err(|_| ConfigError::Invalid(format!("{} must be a non-negative integer, got '{}'", name, value)))
}

fn split_list(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(String::from)
        .collect()
}

/// Expand `${VAR}` and `${VAR:-default}` references using `lookup`.
///
/// Full-line `#` comments are copied through untouched.
pub fn expand_env_vars<F>(content: &str, lookup: F) -> Result<String, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    let mut result = String::with_capacity(content.len());
    for line in content.split_inclusive('\n') {
        if line.trim_start().starts_with('#') {
            result.push_str(line);
        } else {
            expand_line(line, &lookup, &mut result)?;
        }
    }
    Ok(result)
}

fn expand_line<F>(line: &str, lookup: &F, result: &mut String) -> Result<(), ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    let mut chars = line.chars().peekable();

    while let Some(ch) = chars.next() {
        if ch != '$' || chars.peek() != Some(&'{') {
            result.push(ch);
            continue;
        }
        chars.next();

        let mut expr = String::new();
        loop {
            match chars.next() {
                Some('}') => break,
                Some(c) if c != '\n' => expr.push(c),
                _ => {
                    return Err(ConfigError::Parse(format!(
                        "Unclosed variable substitution: ${{{}",
                        expr
                    )))
                }
            }
        }

        let value = match expr.split_once(":-") {
            Some((name, default)) => lookup(name.trim())
                .filter(|v| !v.is_empty())
                .unwrap_or_else(|| default.to_string()),
            None => lookup(expr.trim()).ok_or_else(|| ConfigError::MissingVariable(expr.trim().to_string()))?,
        };
        result.push_str(&value);
    }

    Ok(())
}
