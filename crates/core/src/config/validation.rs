//! Configuration validation rules.
//!
//! Applied after loading, regardless of which source supplied the values.

use crate::config::AppConfig;
use thiserror::Error;

/// Configuration validation errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to load configuration: {0}")]
    LoadFailed(String),

    #[error("invalid configuration: {field} - {reason}")]
    Invalid { field: String, reason: String },
}

fn invalid(field: &str, reason: &str) -> ConfigError {
    ConfigError::Invalid { field: field.into(), reason: reason.into() }
}

impl AppConfig {
    /// Validate configuration values after loading.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::Invalid` if:
    /// - `listen_addr` is not a parseable socket address
    /// - `max_zoom` exceeds 22 (web-mercator practical ceiling)
    /// - any byte budget or timeout is 0
    /// - `max_retries` is 0
    /// - a tile URL template is missing a coordinate placeholder
    /// - `user_agent` or `callsign` is empty
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.listen_addr.parse::<std::net::SocketAddr>().is_err() {
            return Err(invalid("listen_addr", "must be a socket address like 0.0.0.0:8080"));
        }

        if self.max_zoom > 22 {
            return Err(invalid("max_zoom", "must not exceed 22"));
        }

        if self.max_tile_bytes == 0 {
            return Err(invalid("max_tile_bytes", "must be greater than 0"));
        }
        if self.max_cache_bytes == 0 {
            return Err(invalid("max_cache_bytes", "must be greater than 0"));
        }
        if self.max_cache_entries == Some(0) {
            return Err(invalid("max_cache_entries", "must be greater than 0 when set"));
        }

        for (field, value) in [
            ("tile_timeout_ms", self.tile_timeout_ms),
            ("metadata_timeout_ms", self.metadata_timeout_ms),
            ("asset_timeout_ms", self.asset_timeout_ms),
        ] {
            if value < 100 {
                return Err(invalid(field, "must be at least 100ms"));
            }
        }

        if self.max_retries == 0 {
            return Err(invalid("max_retries", "must allow at least one attempt"));
        }

        for (field, template) in [
            ("standard_tile_url", &self.standard_tile_url),
            ("satellite_tile_url", &self.satellite_tile_url),
        ] {
            if !(template.contains("{z}") && template.contains("{x}") && template.contains("{y}")) {
                return Err(invalid(field, "must contain {z}, {x} and {y} placeholders"));
            }
        }

        if self.user_agent.is_empty() {
            return Err(invalid("user_agent", "must not be empty"));
        }
        if self.callsign.is_empty() {
            return Err(invalid("callsign", "must not be empty"));
        }

        Ok(())
    }
}
