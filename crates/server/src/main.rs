//! Fieldpost station server entry point.
//!
//! Boots the asset store over the storage mount, restores any persisted
//! release snapshot, starts the background release refresh, and serves
//! the HTTP surface.

use anyhow::Result;
use fieldpost_client::{FetcherConfig, HttpFetcher};
use fieldpost_core::{AppConfig, LocalAssetStore};
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

mod error;
mod refresh;
mod routes;
mod singleflight;
mod state;
#[cfg(test)]
mod testing;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .json()
        .init();

    let config = AppConfig::load()?;
    tracing::info!(
        listen_addr = %config.listen_addr,
        cache_root = %config.cache_root.display(),
        "starting station server"
    );

    let store = Arc::new(
        LocalAssetStore::open(&config.cache_root, config.max_cache_bytes, config.max_cache_entries).await,
    );
    let fetcher = Arc::new(HttpFetcher::new(FetcherConfig::from(&config))?);

    let state = Arc::new(state::AppState::new(config.clone(), store, fetcher));
    state.load_persisted_release().await;

    tokio::spawn(refresh::run(state.clone()));

    let listener = tokio::net::TcpListener::bind(&config.listen_addr).await?;
    axum::serve(listener, routes::router(state)).await?;

    Ok(())
}
