//! Application configuration for LiveCourses.
//!
//! User config lives at `~/.livecourses/livecourses.toml`.
//! CLI flags override config file values, which override defaults.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{LiveCoursesError, Result};

/// Default configuration file name.
const CONFIG_FILE_NAME: &str = "livecourses.toml";

/// Default config directory name under the user's home.
const CONFIG_DIR_NAME: &str = ".livecourses";

// ---------------------------------------------------------------------------
// Config structs (matching livecourses.toml schema)
// ---------------------------------------------------------------------------

/// Top-level application config, deserialized from TOML.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    /// Search defaults applied when a request omits a field.
    #[serde(default)]
    pub defaults: DefaultsConfig,

    /// Scrape provider settings.
    #[serde(default)]
    pub provider: ProviderConfig,

    /// Pipeline limits and timings.
    #[serde(default)]
    pub pipeline: PipelineLimitsConfig,
}

/// `[defaults]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DefaultsConfig {
    /// Keywords used when the request has none.
    #[serde(default = "default_keywords")]
    pub keywords: String,

    /// Location used when the request has none.
    #[serde(default = "default_location")]
    pub location: String,
}

impl Default for DefaultsConfig {
    fn default() -> Self {
        Self {
            keywords: default_keywords(),
            location: default_location(),
        }
    }
}

fn default_keywords() -> String {
    "electrical course".into()
}
fn default_location() -> String {
    "United Kingdom".into()
}

/// `[provider]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderConfig {
    /// Base URL of the content-extraction service.
    #[serde(default = "default_base_url")]
    pub base_url: String,

    /// Name of the env var holding the API key (never store the key itself).
    #[serde(default = "default_api_key_env")]
    pub api_key_env: String,

    /// Path of the extraction endpoint, relative to `base_url`.
    #[serde(default = "default_scrape_endpoint")]
    pub scrape_endpoint: String,

    /// Listing page to extract from. `{keywords}` and `{location}` are
    /// replaced with the URL-encoded search criteria.
    #[serde(default = "default_listing_url_template")]
    pub listing_url_template: String,

    /// Name reported for the listing source in `sourceResults`.
    #[serde(default = "default_source_name")]
    pub source_name: String,

    /// Health probe timeout in seconds.
    #[serde(default = "default_health_timeout")]
    pub health_timeout_secs: u64,

    /// Per-request HTTP timeout in seconds.
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            api_key_env: default_api_key_env(),
            scrape_endpoint: default_scrape_endpoint(),
            listing_url_template: default_listing_url_template(),
            source_name: default_source_name(),
            health_timeout_secs: default_health_timeout(),
            request_timeout_secs: default_request_timeout(),
        }
    }
}

fn default_base_url() -> String {
    "https://api.firecrawl.dev".into()
}
fn default_api_key_env() -> String {
    "FIRECRAWL_API_KEY".into()
}
fn default_scrape_endpoint() -> String {
    "/v1/scrape".into()
}
fn default_listing_url_template() -> String {
    "https://www.findcourses.co.uk/search?q={keywords}&location={location}".into()
}
fn default_source_name() -> String {
    "findcourses.co.uk".into()
}
fn default_health_timeout() -> u64 {
    5
}
fn default_request_timeout() -> u64 {
    45
}

/// `[pipeline]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineLimitsConfig {
    /// Number of leading candidates that receive a detail fetch.
    #[serde(default = "default_enrichment_limit")]
    pub enrichment_limit: usize,

    /// Detail failures after which the rest of the batch is short-circuited.
    #[serde(default = "default_failure_threshold")]
    pub failure_threshold: u32,

    /// Pause after each successful detail fetch, in ms.
    #[serde(default = "default_pacing_ms")]
    pub pacing_ms: u64,

    /// Wall-clock budget for a whole run, in seconds.
    #[serde(default = "default_global_timeout")]
    pub global_timeout_secs: u64,

    /// Attempts per provider request (first try included).
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    /// First backoff delay in ms; doubles on each retry.
    #[serde(default = "default_backoff_base_ms")]
    pub backoff_base_ms: u64,

    /// Upper bound on a single backoff delay, in ms.
    #[serde(default = "default_backoff_cap_ms")]
    pub backoff_cap_ms: u64,
}

impl Default for PipelineLimitsConfig {
    fn default() -> Self {
        Self {
            enrichment_limit: default_enrichment_limit(),
            failure_threshold: default_failure_threshold(),
            pacing_ms: default_pacing_ms(),
            global_timeout_secs: default_global_timeout(),
            max_attempts: default_max_attempts(),
            backoff_base_ms: default_backoff_base_ms(),
            backoff_cap_ms: default_backoff_cap_ms(),
        }
    }
}

fn default_enrichment_limit() -> usize {
    6
}
fn default_failure_threshold() -> u32 {
    3
}
fn default_pacing_ms() -> u64 {
    1000
}
fn default_global_timeout() -> u64 {
    150
}
fn default_max_attempts() -> u32 {
    3
}
fn default_backoff_base_ms() -> u64 {
    1000
}
fn default_backoff_cap_ms() -> u64 {
    5000
}

// ---------------------------------------------------------------------------
// Pipeline config (runtime, merged from config + CLI flags)
// ---------------------------------------------------------------------------

/// Runtime pipeline configuration, merged from the config file and CLI flags.
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// Provider base URL.
    pub base_url: String,
    /// Resolved API key; `None` when the env var is unset or empty.
    pub api_key: Option<String>,
    /// Env var the key was read from, for error messages.
    pub api_key_env: String,
    /// Extraction endpoint path.
    pub scrape_endpoint: String,
    /// Listing URL template.
    pub listing_url_template: String,
    /// Listing source name.
    pub source_name: String,
    /// Health probe timeout.
    pub health_timeout: Duration,
    /// Per-request HTTP timeout.
    pub request_timeout: Duration,
    /// Leading candidates that get a detail fetch.
    pub enrichment_limit: usize,
    /// Circuit breaker threshold.
    pub failure_threshold: u32,
    /// Pause after each successful detail fetch.
    pub pacing: Duration,
    /// Whole-run budget.
    pub global_timeout: Duration,
    /// Attempts per provider request.
    pub max_attempts: u32,
    /// First backoff delay.
    pub backoff_base: Duration,
    /// Backoff ceiling.
    pub backoff_cap: Duration,
}

impl From<&AppConfig> for PipelineConfig {
    fn from(config: &AppConfig) -> Self {
        let provider = &config.provider;
        let limits = &config.pipeline;
        Self {
            base_url: provider.base_url.clone(),
            api_key: read_api_key(&provider.api_key_env),
            api_key_env: provider.api_key_env.clone(),
            scrape_endpoint: provider.scrape_endpoint.clone(),
            listing_url_template: provider.listing_url_template.clone(),
            source_name: provider.source_name.clone(),
            health_timeout: Duration::from_secs(provider.health_timeout_secs),
            request_timeout: Duration::from_secs(provider.request_timeout_secs),
            enrichment_limit: limits.enrichment_limit,
            failure_threshold: limits.failure_threshold,
            pacing: Duration::from_millis(limits.pacing_ms),
            global_timeout: Duration::from_secs(limits.global_timeout_secs),
            max_attempts: limits.max_attempts,
            backoff_base: Duration::from_millis(limits.backoff_base_ms),
            backoff_cap: Duration::from_millis(limits.backoff_cap_ms),
        }
    }
}

impl PipelineConfig {
    /// Return the API key or a config error naming the env var to set.
    pub fn require_api_key(&self) -> Result<&str> {
        self.api_key.as_deref().ok_or_else(|| {
            LiveCoursesError::config(format!(
                "scrape provider API key not found. Set the {} environment variable.",
                self.api_key_env
            ))
        })
    }
}

fn read_api_key(var_name: &str) -> Option<String> {
    match std::env::var(var_name) {
        Ok(val) if !val.trim().is_empty() => Some(val),
        _ => None,
    }
}

// ---------------------------------------------------------------------------
// Config loading
// ---------------------------------------------------------------------------

/// Get the path to the config directory (`~/.livecourses/`).
pub fn config_dir() -> Result<PathBuf> {
    let home = dirs::home_dir()
        .ok_or_else(|| LiveCoursesError::config("could not determine home directory"))?;
    Ok(home.join(CONFIG_DIR_NAME))
}

/// Get the path to the config file (`~/.livecourses/livecourses.toml`).
pub fn config_file_path() -> Result<PathBuf> {
    Ok(config_dir()?.join(CONFIG_FILE_NAME))
}

/// Load the application config from disk. Returns defaults if the file does not exist.
pub fn load_config() -> Result<AppConfig> {
    let path = config_file_path()?;

    if !path.exists() {
        tracing::debug!(?path, "config file not found, using defaults");
        return Ok(AppConfig::default());
    }

    load_config_from(&path)
}

/// Load the application config from a specific file path.
pub fn load_config_from(path: &Path) -> Result<AppConfig> {
    let content = std::fs::read_to_string(path).map_err(|e| LiveCoursesError::io(path, e))?;

    let config: AppConfig = toml::from_str(&content).map_err(|e| {
        LiveCoursesError::config(format!("failed to parse {}: {e}", path.display()))
    })?;
    validate_config(&config)?;
    Ok(config)
}

/// Create the config directory and write a default config file.
/// Returns the path to the created file.
pub fn init_config() -> Result<PathBuf> {
    let dir = config_dir()?;
    std::fs::create_dir_all(&dir).map_err(|e| LiveCoursesError::io(&dir, e))?;

    let path = dir.join(CONFIG_FILE_NAME);
    let config = AppConfig::default();
    let content =
        toml::to_string_pretty(&config).map_err(|e| LiveCoursesError::config(e.to_string()))?;

    std::fs::write(&path, content).map_err(|e| LiveCoursesError::io(&path, e))?;
    tracing::info!(?path, "created default config file");

    Ok(path)
}

/// Reject configs that cannot produce a working pipeline.
pub fn validate_config(config: &AppConfig) -> Result<()> {
    url::Url::parse(&config.provider.base_url).map_err(|e| {
        LiveCoursesError::config(format!(
            "invalid provider base_url '{}': {e}",
            config.provider.base_url
        ))
    })?;

    if config.pipeline.max_attempts == 0 {
        return Err(LiveCoursesError::config("pipeline.max_attempts must be at least 1"));
    }
    if config.pipeline.failure_threshold == 0 {
        return Err(LiveCoursesError::config(
            "pipeline.failure_threshold must be at least 1",
        ));
    }
    if config.pipeline.global_timeout_secs == 0 {
        return Err(LiveCoursesError::config(
            "pipeline.global_timeout_secs must be at least 1",
        ));
    }
    Ok(())
}
