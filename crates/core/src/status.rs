//! Status snapshot served by `/api/status`.
//!
//! Derived, never stored: assembled from live store counters and mount
//! state on every request.

use serde::{Deserialize, Serialize};

pub const SERVICE_NAME: &str = "Fieldpost Station Server";

/// Wire shape of `GET /api/status`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatusSnapshot {
    pub service: String,
    pub version: String,
    pub callsign: String,
    pub tile_server: bool,
    pub cache_size: u64,
    pub cache_size_bytes: u64,
}

impl StatusSnapshot {
    /// Snapshot for a station whose storage medium is reachable.
    pub fn available(callsign: &str, cache_size: u64, cache_size_bytes: u64) -> Self {
        Self {
            service: SERVICE_NAME.to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
            callsign: callsign.to_string(),
            tile_server: true,
            cache_size,
            cache_size_bytes,
        }
    }

    /// Snapshot for a station without usable storage; never an error.
    pub fn unavailable(callsign: &str) -> Self {
        Self {
            service: SERVICE_NAME.to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
            callsign: callsign.to_string(),
            tile_server: false,
            cache_size: 0,
            cache_size_bytes: 0,
        }
    }
}
