//! Shared test doubles and fixtures for handler tests.

use crate::state::AppState;
use async_trait::async_trait;
use bytes::Bytes;
use fieldpost_client::{ByteStream, UpstreamFetcher};
use fieldpost_core::{AppConfig, AssetKind, Error, LocalAssetStore, Release, ReleaseAsset, TileLayer};
use futures_util::StreamExt;
use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

pub fn png_tile() -> Bytes {
    Bytes::from_static(&[0x89, 0x50, 0x4E, 0x47, 0x0D, 0x0A, 0x1A, 0x0A, 0x00, 0x01, 0x02, 0x03])
}

pub fn sample_release() -> Release {
    Release {
        version: "2.1.0".into(),
        tag_name: "v2.1.0".into(),
        name: "Release 2.1.0".into(),
        published_at: "2026-07-15T08:30:00Z".into(),
        html_url: "https://releases.example/v2.1.0".into(),
        assets: vec![ReleaseAsset {
            kind: AssetKind::AndroidApk,
            filename: "app-release.apk".into(),
            download_url: "https://releases.example/dl/app-release.apk".into(),
            size_bytes: Some(12),
        }],
    }
}

/// Scriptable [`UpstreamFetcher`] with call counters.
pub struct StubFetcher {
    tile_result: Result<Bytes, Error>,
    tile_delay: Duration,
    tile_calls: AtomicUsize,
    release_result: Result<Release, Error>,
    asset_bodies: HashMap<String, Bytes>,
    asset_delay: Duration,
    asset_calls: AtomicUsize,
}

impl Default for StubFetcher {
    fn default() -> Self {
        Self::new()
    }
}

impl StubFetcher {
    pub fn new() -> Self {
        let mut asset_bodies = HashMap::new();
        asset_bodies.insert(
            "https://releases.example/dl/app-release.apk".to_string(),
            Bytes::from_static(b"apk-contents"),
        );
        Self {
            tile_result: Ok(png_tile()),
            tile_delay: Duration::ZERO,
            tile_calls: AtomicUsize::new(0),
            release_result: Ok(sample_release()),
            asset_bodies,
            asset_delay: Duration::ZERO,
            asset_calls: AtomicUsize::new(0),
        }
    }

    pub fn with_tile_bytes(mut self, bytes: Bytes) -> Self {
        self.tile_result = Ok(bytes);
        self
    }

    pub fn with_tile_error(mut self, err: Error) -> Self {
        self.tile_result = Err(err);
        self
    }

    pub fn with_tile_delay(mut self, delay: Duration) -> Self {
        self.tile_delay = delay;
        self
    }

    pub fn with_release(mut self, release: Release) -> Self {
        self.release_result = Ok(release);
        self
    }

    pub fn with_release_error(mut self) -> Self {
        self.release_result = Err(Error::UpstreamUnavailable("release endpoint down".into()));
        self
    }

    pub fn with_asset_delay(mut self, delay: Duration) -> Self {
        self.asset_delay = delay;
        self
    }

    pub fn tile_calls(&self) -> usize {
        self.tile_calls.load(Ordering::SeqCst)
    }

    pub fn asset_calls(&self) -> usize {
        self.asset_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl UpstreamFetcher for StubFetcher {
    async fn fetch_tile(&self, _zoom: u8, _x: u32, _y: u32, _layer: TileLayer) -> Result<Bytes, Error> {
        self.tile_calls.fetch_add(1, Ordering::SeqCst);
        if !self.tile_delay.is_zero() {
            tokio::time::sleep(self.tile_delay).await;
        }
        self.tile_result.clone()
    }

    async fn fetch_release_metadata(&self) -> Result<Release, Error> {
        self.release_result.clone()
    }

    async fn fetch_asset(&self, url: &str) -> Result<ByteStream, Error> {
        self.asset_calls.fetch_add(1, Ordering::SeqCst);
        if !self.asset_delay.is_zero() {
            tokio::time::sleep(self.asset_delay).await;
        }
        let body = self
            .asset_bodies
            .get(url)
            .cloned()
            .ok_or_else(|| Error::UpstreamUnavailable(format!("no such asset: {url}")))?;
        Ok(futures_util::stream::iter([Ok::<_, Error>(body)]).boxed())
    }
}

pub async fn body_bytes(response: axum::http::Response<axum::body::Body>) -> Bytes {
    axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap()
}

async fn build_state(dir: &tempfile::TempDir, fetcher: Arc<StubFetcher>, with_mirror: bool) -> Arc<AppState> {
    let mut config = AppConfig { cache_root: dir.path().join("cache"), ..AppConfig::default() };
    if with_mirror {
        config.mirror_root = Some(dir.path().join("mirror"));
    }
    let store = Arc::new(
        LocalAssetStore::open(&config.cache_root, config.max_cache_bytes, config.max_cache_entries).await,
    );
    Arc::new(AppState::new(config, store, fetcher))
}

pub async fn test_state(dir: &tempfile::TempDir, fetcher: Arc<StubFetcher>) -> Arc<AppState> {
    build_state(dir, fetcher, false).await
}

pub async fn test_state_with_mirror(dir: &tempfile::TempDir, fetcher: Arc<StubFetcher>) -> Arc<AppState> {
    build_state(dir, fetcher, true).await
}
