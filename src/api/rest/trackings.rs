use std::sync::Arc;

use axum::extract::{Path, State};
use axum::routing::get;
use axum::Json;
use axum::Router;

use crate::models::tracking::TrackingEvent;
use crate::state::AppState;

pub fn router() -> Router<Arc<AppState>> {
    Router::new().route("/trackings/:tracking_id", get(list_trackings))
}

/// Public lookup; the tracking id is the customer's handle on the parcel.
async fn list_trackings(
    State(state): State<Arc<AppState>>,
    Path(tracking_id): Path<String>,
) -> Json<Vec<TrackingEvent>> {
    Json(state.tracking.list_by_tracking_id(&tracking_id))
}
