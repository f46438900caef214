//! Station status endpoint.

use crate::state::AppState;
use axum::Json;
use axum::extract::State;
use fieldpost_core::StatusSnapshot;
use std::sync::Arc;

/// `GET /api/status`. A missing storage medium is reported, never an
/// error: the endpoint is how operators find out the card is gone.
pub async fn get_status(State(state): State<Arc<AppState>>) -> Json<StatusSnapshot> {
    let callsign = &state.config.callsign;

    let counters = async {
        let count = state.store.count().await?;
        let bytes = state.store.size_bytes().await?;
        Ok::<_, fieldpost_core::Error>((count, bytes))
    };

    let snapshot = match counters.await {
        Ok((count, bytes)) => StatusSnapshot::available(callsign, count as u64, bytes),
        Err(_) => StatusSnapshot::unavailable(callsign),
    };
    Json(snapshot)
}
