//! Map tile cache/proxy endpoint.
//!
//! `GET /tiles/{z}/{x}/{y}.png[?layer=standard|satellite]`
//!
//! A cache hit serves straight from the store. On a miss the fetch is
//! coalesced per coordinate, the payload is gated on the PNG signature,
//! and the result is cached before being served. An unmounted storage
//! medium degrades the endpoint to a pure proxy rather than killing it;
//! only when the proxy path also fails does the client see 503.

use crate::error::ApiError;
use crate::state::AppState;
use axum::extract::{Path, Query, State};
use axum::http::header;
use axum::response::{IntoResponse, Response};
use bytes::Bytes;
use fieldpost_core::{CacheKey, Error, TileLayer};
use serde::Deserialize;
use std::sync::Arc;

const PNG_SIGNATURE: [u8; 8] = [0x89, 0x50, 0x4E, 0x47, 0x0D, 0x0A, 0x1A, 0x0A];

/// One day; tiles change rarely and the station link is expensive.
const TILE_CACHE_CONTROL: &str = "public, max-age=86400";

#[derive(Debug, Deserialize)]
pub struct TileQuery {
    layer: Option<String>,
}

fn parse_layer(query: &TileQuery) -> Result<TileLayer, Error> {
    match query.layer.as_deref() {
        None | Some("standard") => Ok(TileLayer::Standard),
        Some("satellite") => Ok(TileLayer::Satellite),
        Some(other) => Err(Error::InvalidRequest(format!("unknown tile layer: {other}"))),
    }
}

fn parse_coordinates(z: &str, x: &str, y: &str, max_zoom: u8) -> Result<(u8, u32, u32), Error> {
    let zoom: u8 = z
        .parse()
        .map_err(|_| Error::InvalidRequest(format!("bad zoom segment: {z}")))?;
    let x: u32 = x
        .parse()
        .map_err(|_| Error::InvalidRequest(format!("bad x segment: {x}")))?;
    let y_num = y
        .strip_suffix(".png")
        .ok_or_else(|| Error::InvalidRequest(format!("tile path must end in .png: {y}")))?;
    let y: u32 = y_num
        .parse()
        .map_err(|_| Error::InvalidRequest(format!("bad y segment: {y_num}")))?;

    if zoom > max_zoom {
        return Err(Error::InvalidRequest(format!("zoom {zoom} exceeds maximum {max_zoom}")));
    }
    let extent = 1u64 << zoom;
    if u64::from(x) >= extent || u64::from(y) >= extent {
        return Err(Error::InvalidRequest(format!(
            "coordinates {x}/{y} out of range for zoom {zoom}"
        )));
    }
    Ok((zoom, x, y))
}

fn is_png(bytes: &[u8]) -> bool {
    bytes.len() >= PNG_SIGNATURE.len() && bytes[..PNG_SIGNATURE.len()] == PNG_SIGNATURE
}

fn tile_response(bytes: Bytes) -> Response {
    (
        [
            (header::CONTENT_TYPE, "image/png"),
            (header::CACHE_CONTROL, TILE_CACHE_CONTROL),
            (header::ACCESS_CONTROL_ALLOW_ORIGIN, "*"),
        ],
        bytes,
    )
        .into_response()
}

pub async fn get_tile(
    State(state): State<Arc<AppState>>,
    Path((z, x, y)): Path<(String, String, String)>,
    Query(query): Query<TileQuery>,
) -> Result<Response, ApiError> {
    let layer = parse_layer(&query)?;
    let (zoom, x, y) = parse_coordinates(&z, &x, &y, state.config.max_zoom)?;
    let key = CacheKey::tile(zoom, x, y, layer);

    let storage_down = match state.store.get(&key).await {
        Ok(Some(bytes)) => return Ok(tile_response(bytes)),
        Ok(None) => false,
        Err(Error::StorageUnavailable(_)) => true,
        Err(e) => return Err(e.into()),
    };

    let flight_state = state.clone();
    let flight_key = key.clone();
    let fetched = state
        .tile_flights
        .run(key, || async move {
            let bytes = flight_state.fetcher.fetch_tile(zoom, x, y, layer).await?;
            if !is_png(&bytes) {
                return Err(Error::ValidationFailed(format!(
                    "tile {zoom}/{x}/{y} is not a PNG payload"
                )));
            }
            // Best effort: a vanished medium downgrades caching, not serving.
            match flight_state.store.put(&flight_key, &bytes).await {
                Ok(()) | Err(Error::StorageUnavailable(_)) => {}
                Err(e) => return Err(e),
            }
            Ok(bytes)
        })
        .await;

    match fetched {
        Ok(bytes) => Ok(tile_response(bytes)),
        Err(e) if storage_down => Err(Error::StorageUnavailable(format!(
            "no cache and upstream fetch failed: {e}"
        ))
        .into()),
        Err(e) => Err(e.into()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::routes;
    use crate::testing::{StubFetcher, body_bytes, png_tile, test_state};
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use tower::ServiceExt;

    async fn send(state: Arc<AppState>, uri: &str) -> axum::http::Response<Body> {
        routes::router(state)
            .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn test_miss_fetches_caches_and_serves() {
        let dir = tempfile::tempdir().unwrap();
        let fetcher = Arc::new(StubFetcher::new());
        let state = test_state(&dir, fetcher.clone()).await;

        let response = send(state.clone(), "/tiles/5/16/11.png").await;
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(response.headers()[header::CONTENT_TYPE.as_str()], "image/png");
        assert_eq!(response.headers()[header::CACHE_CONTROL.as_str()], "public, max-age=86400");
        assert_eq!(response.headers()[header::ACCESS_CONTROL_ALLOW_ORIGIN.as_str()], "*");
        assert_eq!(body_bytes(response).await, png_tile());

        let key = CacheKey::tile(5, 16, 11, TileLayer::Standard);
        assert!(state.store.exists(&key).await.unwrap());
    }

    #[tokio::test]
    async fn test_hit_skips_upstream() {
        let dir = tempfile::tempdir().unwrap();
        let fetcher = Arc::new(StubFetcher::new());
        let state = test_state(&dir, fetcher.clone()).await;

        send(state.clone(), "/tiles/5/16/11.png").await;
        send(state.clone(), "/tiles/5/16/11.png").await;

        assert_eq!(fetcher.tile_calls(), 1);
    }

    #[tokio::test]
    async fn test_layers_are_cached_separately() {
        let dir = tempfile::tempdir().unwrap();
        let fetcher = Arc::new(StubFetcher::new());
        let state = test_state(&dir, fetcher.clone()).await;

        send(state.clone(), "/tiles/5/16/11.png").await;
        send(state.clone(), "/tiles/5/16/11.png?layer=satellite").await;

        assert_eq!(fetcher.tile_calls(), 2);
        assert!(
            state
                .store
                .exists(&CacheKey::tile(5, 16, 11, TileLayer::Satellite))
                .await
                .unwrap()
        );
    }

    #[tokio::test]
    async fn test_concurrent_misses_fetch_once() {
        let dir = tempfile::tempdir().unwrap();
        let fetcher = Arc::new(StubFetcher::new().with_tile_delay(std::time::Duration::from_millis(50)));
        let state = test_state(&dir, fetcher.clone()).await;

        let mut handles = Vec::new();
        for _ in 0..6 {
            let state = state.clone();
            handles.push(tokio::spawn(async move { send(state, "/tiles/9/100/200.png").await }));
        }
        for handle in handles {
            assert_eq!(handle.await.unwrap().status(), StatusCode::OK);
        }

        assert_eq!(fetcher.tile_calls(), 1);
    }

    #[tokio::test]
    async fn test_zoom_out_of_range() {
        let dir = tempfile::tempdir().unwrap();
        let state = test_state(&dir, Arc::new(StubFetcher::new())).await;
        let response = send(state, "/tiles/20/0/0.png").await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_coordinates_out_of_range_for_zoom() {
        let dir = tempfile::tempdir().unwrap();
        let state = test_state(&dir, Arc::new(StubFetcher::new())).await;
        // Zoom 2 has a 4x4 grid.
        let response = send(state.clone(), "/tiles/2/4/0.png").await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let response = send(state, "/tiles/2/3/3.png").await;
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_missing_png_suffix_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let state = test_state(&dir, Arc::new(StubFetcher::new())).await;
        let response = send(state, "/tiles/5/16/11.jpg").await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_unknown_layer_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let state = test_state(&dir, Arc::new(StubFetcher::new())).await;
        let response = send(state, "/tiles/5/16/11.png?layer=terrain").await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_non_png_payload_is_rejected_and_not_cached() {
        let dir = tempfile::tempdir().unwrap();
        let fetcher = Arc::new(StubFetcher::new().with_tile_bytes(Bytes::from_static(b"<html>no tile</html>")));
        let state = test_state(&dir, fetcher).await;

        let response = send(state.clone(), "/tiles/5/16/11.png").await;
        assert_eq!(response.status(), StatusCode::BAD_GATEWAY);

        let key = CacheKey::tile(5, 16, 11, TileLayer::Standard);
        assert!(!state.store.exists(&key).await.unwrap());
    }

    #[tokio::test]
    async fn test_upstream_timeout_maps_to_504() {
        let dir = tempfile::tempdir().unwrap();
        let fetcher =
            Arc::new(StubFetcher::new().with_tile_error(Error::UpstreamTimeout("tile upstream".into())));
        let state = test_state(&dir, fetcher).await;

        let response = send(state, "/tiles/5/16/11.png").await;
        assert_eq!(response.status(), StatusCode::GATEWAY_TIMEOUT);
    }

    #[tokio::test]
    async fn test_storage_gone_serves_transiently() {
        let dir = tempfile::tempdir().unwrap();
        let state = test_state(&dir, Arc::new(StubFetcher::new())).await;
        tokio::fs::remove_dir_all(dir.path().join("cache")).await.unwrap();

        let response = send(state, "/tiles/5/16/11.png").await;
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(body_bytes(response).await, png_tile());
    }

    #[tokio::test]
    async fn test_storage_gone_and_upstream_down_maps_to_503() {
        let dir = tempfile::tempdir().unwrap();
        let fetcher =
            Arc::new(StubFetcher::new().with_tile_error(Error::UpstreamUnavailable("offline".into())));
        let state = test_state(&dir, fetcher).await;
        tokio::fs::remove_dir_all(dir.path().join("cache")).await.unwrap();

        let response = send(state, "/tiles/5/16/11.png").await;
        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
    }

    #[test]
    fn test_png_signature_check() {
        assert!(is_png(&png_tile()));
        assert!(!is_png(b"\x89PNG"));
        assert!(!is_png(b"GIF89a..."));
    }
}
