use crate::error::{OverwatchError, Result};
use crate::pipeline::StagePolicy;
use crate::profile::Location;
use genai_gateway::GatewayConfig;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

pub const DEFAULT_CONFIG_FILE: &str = "overwatch.yaml";
pub const SCRAPER_URL_ENV: &str = "SCRAPER_URL";
pub const PLACES_API_KEY_ENV: &str = "GEOAPIFY_API_KEY";

// ---------------------------------------------------------------------------
// ConfigWarning / WarnLevel
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConfigWarning {
    pub level: WarnLevel,
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WarnLevel {
    Warning,
    Error,
}

// ---------------------------------------------------------------------------
// CacheConfig
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheConfig {
    #[serde(default = "default_ttl_secs")]
    pub default_ttl_secs: u64,
}

fn default_ttl_secs() -> u64 {
    15 * 60
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            default_ttl_secs: default_ttl_secs(),
        }
    }
}

impl CacheConfig {
    pub fn default_ttl(&self) -> Duration {
        Duration::from_secs(self.default_ttl_secs)
    }
}

// ---------------------------------------------------------------------------
// SourcesConfig
// ---------------------------------------------------------------------------

/// Size caps applied to every source payload before it reaches a prompt.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Budget {
    #[serde(default = "default_max_items")]
    pub max_items: usize,
    #[serde(default = "default_max_text_chars")]
    pub max_text_chars: usize,
}

fn default_max_items() -> usize {
    20
}

fn default_max_text_chars() -> usize {
    2000
}

impl Default for Budget {
    fn default() -> Self {
        Self {
            max_items: default_max_items(),
            max_text_chars: default_max_text_chars(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourcesConfig {
    /// Base URL of the scraper backend serving `/api/scrape/...`.
    #[serde(default)]
    pub scraper_url: Option<String>,
    #[serde(default = "default_fetch_timeout_secs")]
    pub fetch_timeout_secs: u64,
    #[serde(default)]
    pub budget: Budget,
    /// Overrides `cache.default_ttl_secs` for hazard feeds.
    #[serde(default)]
    pub cache_ttl_secs: Option<u64>,
    /// Restrict the risk fan-out to these source names (all when empty).
    #[serde(default)]
    pub enabled: Vec<String>,
}

fn default_fetch_timeout_secs() -> u64 {
    45
}

impl Default for SourcesConfig {
    fn default() -> Self {
        Self {
            scraper_url: None,
            fetch_timeout_secs: default_fetch_timeout_secs(),
            budget: Budget::default(),
            cache_ttl_secs: None,
            enabled: Vec::new(),
        }
    }
}

impl SourcesConfig {
    pub fn fetch_timeout(&self) -> Duration {
        Duration::from_secs(self.fetch_timeout_secs)
    }

    pub fn is_enabled(&self, name: &str) -> bool {
        self.enabled.is_empty() || self.enabled.iter().any(|n| n == name)
    }
}

// ---------------------------------------------------------------------------
// PlacesConfig
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlacesConfig {
    #[serde(default = "default_places_base_url")]
    pub base_url: String,
    #[serde(default, skip_serializing)]
    pub api_key: Option<String>,
    #[serde(default = "default_radius_m")]
    pub radius_m: u32,
    #[serde(default = "default_max_facilities")]
    pub max_facilities: usize,
    #[serde(default = "default_categories")]
    pub categories: Vec<String>,
    #[serde(default = "default_route_mode")]
    pub route_mode: String,
}

fn default_places_base_url() -> String {
    "https://api.geoapify.com".to_string()
}

fn default_radius_m() -> u32 {
    5000
}

fn default_max_facilities() -> usize {
    5
}

fn default_categories() -> Vec<String> {
    [
        "healthcare.hospital",
        "education.school",
        "service.fire_station",
        "service.police",
    ]
    .iter()
    .map(|s| s.to_string())
    .collect()
}

fn default_route_mode() -> String {
    "drive".to_string()
}

impl Default for PlacesConfig {
    fn default() -> Self {
        Self {
            base_url: default_places_base_url(),
            api_key: None,
            radius_m: default_radius_m(),
            max_facilities: default_max_facilities(),
            categories: default_categories(),
            route_mode: default_route_mode(),
        }
    }
}

// ---------------------------------------------------------------------------
// PipelineConfig
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineConfig {
    #[serde(default)]
    pub stage_two: StagePolicy,
    #[serde(default = "default_event_capacity")]
    pub event_capacity: usize,
    #[serde(default = "default_location")]
    pub default_location: Location,
}

fn default_event_capacity() -> usize {
    64
}

fn default_location() -> Location {
    Location::new("Manila", 14.5995, 120.9842)
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            stage_two: StagePolicy::default(),
            event_capacity: default_event_capacity(),
            default_location: default_location(),
        }
    }
}

// ---------------------------------------------------------------------------
// Config
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub gateway: GatewayConfig,
    #[serde(default)]
    pub cache: CacheConfig,
    #[serde(default)]
    pub sources: SourcesConfig,
    #[serde(default)]
    pub places: PlacesConfig,
    #[serde(default)]
    pub pipeline: PipelineConfig,
}

impl Config {
    /// Load `path`, falling back to defaults when the file does not exist.
    /// Environment overrides are applied in both cases.
    pub fn load(path: &Path) -> Result<Self> {
        let config = if path.exists() {
            Self::load_strict(path)?
        } else {
            Self::default()
        };
        Ok(config.with_env_overrides())
    }

    /// Load `path`, failing if it is missing.
    pub fn load_strict(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Err(OverwatchError::ConfigNotFound(path.display().to_string()));
        }
        let data = std::fs::read_to_string(path)?;
        let config: Config = serde_yaml::from_str(&data)?;
        Ok(config)
    }

    pub fn to_yaml(&self) -> Result<String> {
        Ok(serde_yaml::to_string(self)?)
    }

    /// Secrets and endpoints that normally come from the environment.
    pub fn with_env_overrides(mut self) -> Self {
        self.gateway = self.gateway.with_env_overrides();
        if let Ok(url) = std::env::var(SCRAPER_URL_ENV) {
            if !url.trim().is_empty() {
                self.sources.scraper_url = Some(url);
            }
        }
        if let Ok(key) = std::env::var(PLACES_API_KEY_ENV) {
            if !key.trim().is_empty() {
                self.places.api_key = Some(key);
            }
        }
        self
    }

    pub fn sources_ttl(&self) -> Duration {
        self.sources
            .cache_ttl_secs
            .map(Duration::from_secs)
            .unwrap_or_else(|| self.cache.default_ttl())
    }

    /// Validate the configuration and return any warnings.
    ///
    /// Nothing here prevents loading; a missing API key only disables the
    /// collaborator that needs it.
    pub fn validate(&self) -> Vec<ConfigWarning> {
        let mut warnings = Vec::new();
        let mut warn = |level: WarnLevel, message: String| {
            warnings.push(ConfigWarning { level, message })
        };

        if self.gateway.api_key.is_none() {
            warn(
                WarnLevel::Error,
                format!(
                    "gateway.api_key is not set ({}); every analysis job will fail",
                    genai_gateway::config::API_KEY_ENV
                ),
            );
        }
        if self.gateway.max_attempts == 0 {
            warn(
                WarnLevel::Warning,
                "gateway.max_attempts is 0; treated as a single attempt".to_string(),
            );
        }
        if self.gateway.initial_delay_ms > self.gateway.max_delay_ms {
            warn(
                WarnLevel::Warning,
                format!(
                    "gateway.initial_delay_ms ({}) exceeds max_delay_ms ({}); every retry waits max_delay_ms",
                    self.gateway.initial_delay_ms, self.gateway.max_delay_ms
                ),
            );
        }
        if self.places.api_key.is_none() {
            warn(
                WarnLevel::Warning,
                format!("places.api_key is not set ({PLACES_API_KEY_ENV}); evacuation runs without facilities"),
            );
        }
        if self.sources.scraper_url.is_none() {
            warn(
                WarnLevel::Warning,
                format!("sources.scraper_url is not set ({SCRAPER_URL_ENV}); PAGASA/PHIVOLCS feeds are skipped"),
            );
        }
        if self.sources.budget.max_items == 0 {
            warn(
                WarnLevel::Warning,
                "sources.budget.max_items is 0; every list payload will be emptied".to_string(),
            );
        }
        warnings
    }
}
