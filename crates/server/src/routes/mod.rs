//! HTTP surface of the station service.

pub mod status;
pub mod tiles;
pub mod updates;

use crate::state::AppState;
use axum::Router;
use axum::routing::get;
use std::sync::Arc;

pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/api/status", get(status::get_status))
        .route("/api/updates/latest", get(updates::get_latest))
        .route("/updates/:version/:filename", get(updates::get_asset))
        .route("/tiles/:z/:x/:y", get(tiles::get_tile))
        .with_state(state)
}
