//! Shared state behind every request handler.

use crate::singleflight::Singleflight;
use bytes::Bytes;
use fieldpost_client::UpstreamFetcher;
use fieldpost_core::{AppConfig, CacheKey, LocalAssetStore, MirrorSync, Release};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::RwLock;

pub struct AppState {
    pub config: AppConfig,
    pub store: Arc<LocalAssetStore>,
    pub fetcher: Arc<dyn UpstreamFetcher>,
    /// Latest known release; swapped whole by the refresh task, only read
    /// by handlers.
    release: RwLock<Option<Arc<Release>>>,
    pub tile_flights: Singleflight<CacheKey, Bytes>,
    /// Asset flights resolve to the committed entry size; waiters stream
    /// the file from the store afterwards instead of buffering it.
    pub asset_flights: Singleflight<CacheKey, u64>,
}

impl AppState {
    pub fn new(config: AppConfig, store: Arc<LocalAssetStore>, fetcher: Arc<dyn UpstreamFetcher>) -> Self {
        Self {
            config,
            store,
            fetcher,
            release: RwLock::new(None),
            tile_flights: Singleflight::new(),
            asset_flights: Singleflight::new(),
        }
    }

    pub fn mirror(&self) -> Option<MirrorSync> {
        self.config.mirror_root.as_ref().map(MirrorSync::new)
    }

    fn snapshot_path(&self) -> PathBuf {
        self.config.cache_root.join("release.json")
    }

    pub async fn release(&self) -> Option<Arc<Release>> {
        self.release.read().await.clone()
    }

    /// Install a new release snapshot and persist it beside the cache so a
    /// rebooted station serves updates before the link comes back.
    pub async fn set_release(&self, release: Release) {
        let release = Arc::new(release);
        if let Err(e) = release.save(&self.snapshot_path()).await {
            tracing::warn!(error = %e, "failed to persist release snapshot");
        }
        *self.release.write().await = Some(release);
    }

    /// Restore the snapshot persisted by a previous run, if any.
    pub async fn load_persisted_release(&self) {
        match Release::load(&self.snapshot_path()).await {
            Ok(Some(release)) => {
                tracing::info!(version = %release.version, "restored persisted release snapshot");
                *self.release.write().await = Some(Arc::new(release));
            }
            Ok(None) => {}
            Err(e) => {
                tracing::warn!(error = %e, "failed to load persisted release snapshot");
            }
        }
    }
}
