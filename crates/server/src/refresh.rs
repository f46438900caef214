//! Background release refresh.
//!
//! On a fixed cadence the task pulls the latest release metadata, installs
//! it as the process-wide snapshot, pre-fetches the assets into the cache,
//! and keeps the flasher mirror in step. A release carrying no classifiable
//! assets is never installed; the previous snapshot keeps serving.

use crate::routes::updates;
use crate::state::AppState;
use fieldpost_core::{CacheKey, Error};
use std::sync::Arc;

pub async fn run(state: Arc<AppState>) {
    tokio::time::sleep(state.config.poll_initial_delay()).await;

    let mut interval = tokio::time::interval(state.config.poll_interval());
    loop {
        interval.tick().await;
        if let Err(e) = refresh_once(&state).await {
            tracing::warn!(error = %e, "release refresh failed");
        }
    }
}

/// One refresh round: metadata, snapshot, assets, mirror.
///
/// Per-asset failures are logged and skipped so one dead download link
/// does not starve the rest; only a metadata failure aborts the round.
pub async fn refresh_once(state: &Arc<AppState>) -> Result<(), Error> {
    let release = state.fetcher.fetch_release_metadata().await?;

    if release.assets.is_empty() {
        tracing::warn!(version = %release.version, "release carries no usable assets, keeping previous snapshot");
        return Ok(());
    }

    // Full comparison, not just the version: a release re-cut under the
    // same tag can change the asset list.
    let changed = match state.release().await {
        Some(current) => *current != release,
        None => true,
    };
    if changed {
        tracing::info!(version = %release.version, assets = release.assets.len(), "installing release snapshot");
        state.set_release(release.clone()).await;
    }

    for asset in &release.assets {
        let key = CacheKey::asset(&release.version, &asset.filename);
        if let Err(e) = updates::ensure_asset_cached(state, &key, asset).await {
            tracing::warn!(key = %key, error = %e, "asset pre-fetch failed");
        }
    }

    if let Some(mirror) = state.mirror() {
        for asset in &release.assets {
            let key = CacheKey::asset(&release.version, &asset.filename);
            let entry = match state.store.entry_file(&key).await {
                Ok(entry) => entry,
                Err(e) => {
                    tracing::warn!(key = %key, error = %e, "mirror sync skipped");
                    continue;
                }
            };
            if let Some((path, _)) = entry {
                match mirror.sync(&asset.filename, &path).await {
                    Ok(true) => tracing::info!(filename = %asset.filename, "mirror refreshed"),
                    Ok(false) => {}
                    Err(e) => tracing::warn!(filename = %asset.filename, error = %e, "mirror sync failed"),
                }
            }
        }
    }

    Ok(())
}
