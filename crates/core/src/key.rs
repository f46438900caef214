//! Cache key model.
//!
//! Keys are path-shaped: every key maps 1:1 to a relative location under
//! the cache root, so the on-disk tree doubles as the index the external
//! tooling (and a rebooted station) can rediscover.
//!
//! - tiles: `tiles/{standard|satellite}/{z}/{x}/{y}.png`
//! - release assets: `updates/{version}/{filename}`

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;

/// Tile style/source.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TileLayer {
    Standard,
    Satellite,
}

impl TileLayer {
    pub fn as_str(&self) -> &'static str {
        match self {
            TileLayer::Standard => "standard",
            TileLayer::Satellite => "satellite",
        }
    }
}

impl fmt::Display for TileLayer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A key in the local asset store.
///
/// Tile and asset namespaces never alias: they live under distinct
/// top-level directories.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum CacheKey {
    Tile { zoom: u8, x: u32, y: u32, layer: TileLayer },
    Asset { version: String, filename: String },
}

impl CacheKey {
    pub fn tile(zoom: u8, x: u32, y: u32, layer: TileLayer) -> Self {
        CacheKey::Tile { zoom, x, y, layer }
    }

    pub fn asset(version: impl Into<String>, filename: impl Into<String>) -> Self {
        CacheKey::Asset { version: version.into(), filename: filename.into() }
    }

    /// Relative path of this entry under the cache root.
    pub fn relative_path(&self) -> PathBuf {
        match self {
            CacheKey::Tile { zoom, x, y, layer } => {
                PathBuf::from(format!("tiles/{}/{}/{}/{}.png", layer.as_str(), zoom, x, y))
            }
            CacheKey::Asset { version, filename } => PathBuf::from(format!("updates/{version}/{filename}")),
        }
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CacheKey::Tile { zoom, x, y, layer } => write!(f, "tile {zoom}/{x}/{y} ({layer})"),
            CacheKey::Asset { version, filename } => write!(f, "asset {version}/{filename}"),
        }
    }
}
