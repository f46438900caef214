//! Upstream clients for the station service.
//!
//! One capability trait covers the three things the station fetches from
//! the outside world: map tiles, release metadata, and release assets.
//! The HTTP implementation applies bounded retries with increasing
//! backoff; caching is strictly the caller's concern.

pub mod github;
pub mod http;

use async_trait::async_trait;
use bytes::Bytes;
use fieldpost_core::{Error, Release, TileLayer};
use futures_util::stream::BoxStream;

/// Incrementally delivered response body.
pub type ByteStream = BoxStream<'static, Result<Bytes, Error>>;

/// Capability set for everything fetched over the upstream link.
#[async_trait]
pub trait UpstreamFetcher: Send + Sync {
    /// Fetch a single map tile.
    async fn fetch_tile(&self, zoom: u8, x: u32, y: u32, layer: TileLayer) -> Result<Bytes, Error>;

    /// Fetch the latest release metadata from the release-hosting service.
    async fn fetch_release_metadata(&self) -> Result<Release, Error>;

    /// Open a streaming download of a release asset.
    async fn fetch_asset(&self, url: &str) -> Result<ByteStream, Error>;
}

pub use http::{FetcherConfig, HttpFetcher};
