//! Application configuration with layered loading.
//!
//! Loading precedence (highest wins):
//! 1. Environment variables (FIELDPOST_*)
//! 2. TOML config file (if FIELDPOST_CONFIG_FILE set)
//! 3. Built-in defaults
//!
//! Numeric policy values (zoom ceiling, budgets, timeouts, retry counts)
//! are deliberately configuration, not constants; the defaults mirror the
//! station firmware they were measured on.

use std::path::PathBuf;
use std::time::Duration;

use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use serde::{Deserialize, Serialize};

mod validation;

pub use validation::ConfigError;

/// Station service configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// Socket address the HTTP server binds to.
    #[serde(default = "default_listen_addr")]
    pub listen_addr: String,

    /// Cache root on the storage medium (tile and asset trees live here).
    #[serde(default = "default_cache_root")]
    pub cache_root: PathBuf,

    /// Secondary mirror directory consumed by the external flashing tool.
    /// Mirror-sync is disabled when unset.
    #[serde(default)]
    pub mirror_root: Option<PathBuf>,

    /// Station callsign reported by `/api/status`.
    #[serde(default = "default_callsign")]
    pub callsign: String,

    /// User-Agent for all upstream requests.
    #[serde(default = "default_user_agent")]
    pub user_agent: String,

    /// Maximum accepted zoom level for tile requests.
    #[serde(default = "default_max_zoom")]
    pub max_zoom: u8,

    /// Maximum size of a single tile payload in bytes.
    #[serde(default = "default_max_tile_bytes")]
    pub max_tile_bytes: usize,

    /// Byte budget for the local asset store.
    #[serde(default = "default_max_cache_bytes")]
    pub max_cache_bytes: u64,

    /// Optional entry-count budget for the local asset store.
    #[serde(default)]
    pub max_cache_entries: Option<usize>,

    /// Upstream timeout for tile fetches, in milliseconds.
    #[serde(default = "default_tile_timeout_ms")]
    pub tile_timeout_ms: u64,

    /// Upstream timeout for release metadata fetches, in milliseconds.
    #[serde(default = "default_metadata_timeout_ms")]
    pub metadata_timeout_ms: u64,

    /// Upstream timeout for release asset downloads, in milliseconds.
    #[serde(default = "default_asset_timeout_ms")]
    pub asset_timeout_ms: u64,

    /// Maximum upstream attempts per fetch (first try included).
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    /// Base backoff between retries, in milliseconds; grows linearly.
    #[serde(default = "default_retry_backoff_ms")]
    pub retry_backoff_ms: u64,

    /// Interval between background release-metadata refreshes, in seconds.
    #[serde(default = "default_poll_interval_secs")]
    pub poll_interval_secs: u64,

    /// Delay before the first background refresh after boot, in seconds.
    #[serde(default = "default_poll_initial_delay_secs")]
    pub poll_initial_delay_secs: u64,

    /// URL template for the standard tile layer ({z}/{x}/{y} placeholders).
    #[serde(default = "default_standard_tile_url")]
    pub standard_tile_url: String,

    /// URL template for the satellite tile layer ({z}/{x}/{y} placeholders).
    #[serde(default = "default_satellite_tile_url")]
    pub satellite_tile_url: String,

    /// Latest-release endpoint of the release-hosting service.
    #[serde(default = "default_release_api_url")]
    pub release_api_url: String,
}

fn default_listen_addr() -> String {
    "0.0.0.0:8080".into()
}

fn default_cache_root() -> PathBuf {
    PathBuf::from("./cache")
}

fn default_callsign() -> String {
    "X3XXXX".into()
}

fn default_user_agent() -> String {
    "Fieldpost-Station/1.0".into()
}

fn default_max_zoom() -> u8 {
    19
}

fn default_max_tile_bytes() -> usize {
    128 * 1024
}

fn default_max_cache_bytes() -> u64 {
    512 * 1024 * 1024
}

fn default_tile_timeout_ms() -> u64 {
    15_000
}

fn default_metadata_timeout_ms() -> u64 {
    30_000
}

fn default_asset_timeout_ms() -> u64 {
    60_000
}

fn default_max_retries() -> u32 {
    3
}

fn default_retry_backoff_ms() -> u64 {
    500
}

fn default_poll_interval_secs() -> u64 {
    3600
}

fn default_poll_initial_delay_secs() -> u64 {
    60
}

fn default_standard_tile_url() -> String {
    "https://tile.openstreetmap.org/{z}/{x}/{y}.png".into()
}

fn default_satellite_tile_url() -> String {
    // Esri addresses tiles in z/y/x order.
    "https://server.arcgisonline.com/ArcGIS/rest/services/World_Imagery/MapServer/tile/{z}/{y}/{x}".into()
}

fn default_release_api_url() -> String {
    "https://api.github.com/repos/geograms/geogram-desktop/releases/latest".into()
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            listen_addr: default_listen_addr(),
            cache_root: default_cache_root(),
            mirror_root: None,
            callsign: default_callsign(),
            user_agent: default_user_agent(),
            max_zoom: default_max_zoom(),
            max_tile_bytes: default_max_tile_bytes(),
            max_cache_bytes: default_max_cache_bytes(),
            max_cache_entries: None,
            tile_timeout_ms: default_tile_timeout_ms(),
            metadata_timeout_ms: default_metadata_timeout_ms(),
            asset_timeout_ms: default_asset_timeout_ms(),
            max_retries: default_max_retries(),
            retry_backoff_ms: default_retry_backoff_ms(),
            poll_interval_secs: default_poll_interval_secs(),
            poll_initial_delay_secs: default_poll_initial_delay_secs(),
            standard_tile_url: default_standard_tile_url(),
            satellite_tile_url: default_satellite_tile_url(),
            release_api_url: default_release_api_url(),
        }
    }
}

impl AppConfig {
    pub fn tile_timeout(&self) -> Duration {
        Duration::from_millis(self.tile_timeout_ms)
    }

    pub fn metadata_timeout(&self) -> Duration {
        Duration::from_millis(self.metadata_timeout_ms)
    }

    pub fn asset_timeout(&self) -> Duration {
        Duration::from_millis(self.asset_timeout_ms)
    }

    pub fn retry_backoff(&self) -> Duration {
        Duration::from_millis(self.retry_backoff_ms)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs)
    }

    pub fn poll_initial_delay(&self) -> Duration {
        Duration::from_secs(self.poll_initial_delay_secs)
    }

    /// Load configuration from all sources with layered precedence.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if a source cannot be read or parsed, or if
    /// validation fails after loading.
    pub fn load() -> Result<Self, ConfigError> {
        let mut figment = Figment::from(Serialized::defaults(Self::default()));

        if let Ok(config_path) = std::env::var("FIELDPOST_CONFIG_FILE") {
            figment = figment.merge(Toml::file(&config_path));
        }

        figment = figment.merge(
            Env::prefixed("FIELDPOST_")
                .map(|key| key.as_str().to_lowercase().into())
                .split("__"),
        );

        let config: Self = figment.extract().map_err(|e| ConfigError::LoadFailed(e.to_string()))?;

        config.validate()?;

        Ok(config)
    }
}
