//! Core types for the Fieldpost station service.
//!
//! This crate holds everything shared between the upstream client and the
//! HTTP server: the configuration layer, the error taxonomy, the cache key
//! model, the SD-card backed asset store, the release data model, and the
//! mirror-sync step consumed by the external flashing tool.

pub mod config;
pub mod error;
pub mod key;
pub mod mirror;
pub mod release;
pub mod status;
pub mod store;

pub use config::AppConfig;
pub use error::Error;
pub use key::{CacheKey, TileLayer};
pub use mirror::{DeviceDescriptor, MirrorSync};
pub use release::{AssetKind, LatestRelease, Release, ReleaseAsset, UpdateStatus, content_type_for};
pub use status::StatusSnapshot;
pub use store::LocalAssetStore;
