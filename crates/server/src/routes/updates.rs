//! Update mirror endpoints.
//!
//! `GET /api/updates/latest` reports the latest known release with
//! download URLs pointing at this station. `GET /updates/{version}/
//! {filename}` serves the asset bytes, fetching and caching them on
//! first demand when only the metadata is known so far.

use crate::error::ApiError;
use crate::state::AppState;
use axum::Json;
use axum::body::Body;
use axum::extract::{Path, State};
use axum::http::header;
use axum::response::{IntoResponse, Response};
use fieldpost_core::{CacheKey, Error, LatestRelease, ReleaseAsset, content_type_for};
use futures_util::TryStreamExt;
use std::sync::Arc;
use tokio::io::AsyncWriteExt;
use tokio_util::io::ReaderStream;

pub async fn get_latest(State(state): State<Arc<AppState>>) -> Json<LatestRelease> {
    let snapshot = state.release().await;
    Json(LatestRelease::from_snapshot(snapshot.as_deref()))
}

/// Path segments come from the router, so they cannot contain `/`, but
/// dot segments and empty names still have to be refused before they
/// reach the filesystem.
fn validate_segment(segment: &str) -> Result<(), Error> {
    if segment.is_empty()
        || segment == "."
        || segment == ".."
        || segment.contains('/')
        || segment.contains('\\')
    {
        return Err(Error::InvalidRequest(format!("bad path segment: {segment:?}")));
    }
    Ok(())
}

/// Fetch an asset into the store unless it is already there. Concurrent
/// demands for the same asset share one download; the flight resolves to
/// the committed size and each caller streams from the store afterwards.
pub async fn ensure_asset_cached(
    state: &Arc<AppState>,
    key: &CacheKey,
    asset: &ReleaseAsset,
) -> Result<u64, Error> {
    let flight_state = state.clone();
    let flight_key = key.clone();
    let download_url = asset.download_url.clone();

    state
        .asset_flights
        .run(key.clone(), || async move {
            if let Some((_, size)) = flight_state.store.entry_file(&flight_key).await? {
                return Ok(size);
            }

            let staged = flight_state.store.stage(&flight_key).await?;
            let mut stream = flight_state.fetcher.fetch_asset(&download_url).await?;
            let mut file = match tokio::fs::File::create(&staged).await {
                Ok(file) => file,
                Err(e) => return Err(Error::storage("create staging file", e)),
            };

            loop {
                match stream.try_next().await {
                    Ok(Some(chunk)) => {
                        if let Err(e) = file.write_all(&chunk).await {
                            flight_state.store.discard(&staged).await;
                            return Err(Error::storage("write asset chunk", e));
                        }
                    }
                    Ok(None) => break,
                    Err(e) => {
                        flight_state.store.discard(&staged).await;
                        return Err(e);
                    }
                }
            }
            if let Err(e) = file.flush().await {
                flight_state.store.discard(&staged).await;
                return Err(Error::storage("flush asset", e));
            }
            drop(file);

            let size = flight_state.store.commit_file(&flight_key, &staged).await?;
            tracing::info!(key = %flight_key, bytes = size, "asset cached");
            Ok(size)
        })
        .await
}

async fn stream_entry(state: &AppState, key: &CacheKey, filename: &str) -> Result<Option<Response>, Error> {
    let Some((path, size)) = state.store.entry_file(key).await? else {
        return Ok(None);
    };

    let file = tokio::fs::File::open(&path)
        .await
        .map_err(|e| Error::storage("open asset for streaming", e))?;
    let body = Body::from_stream(ReaderStream::new(file));

    let response = (
        [
            (header::CONTENT_TYPE, content_type_for(filename).to_string()),
            (header::CONTENT_LENGTH, size.to_string()),
            (header::CONTENT_DISPOSITION, format!("attachment; filename=\"{filename}\"")),
        ],
        body,
    )
        .into_response();
    Ok(Some(response))
}

pub async fn get_asset(
    State(state): State<Arc<AppState>>,
    Path((version, filename)): Path<(String, String)>,
) -> Result<Response, ApiError> {
    validate_segment(&version)?;
    validate_segment(&filename)?;

    let key = CacheKey::asset(&version, &filename);
    if let Some(response) = stream_entry(&state, &key, &filename).await? {
        return Ok(response);
    }

    // Not cached: only assets of the known release are fetchable on demand.
    let snapshot = state.release().await;
    let asset = snapshot
        .as_deref()
        .and_then(|release| release.find_asset(&version, &filename))
        .cloned()
        .ok_or_else(|| Error::NotFound(format!("{version}/{filename}")))?;

    ensure_asset_cached(&state, &key, &asset).await?;

    match stream_entry(&state, &key, &filename).await? {
        Some(response) => Ok(response),
        None => Err(Error::StorageUnavailable(format!("asset {version}/{filename} vanished after commit")).into()),
    }
}
