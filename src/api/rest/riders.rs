use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::routing::{get, patch, post};
use axum::Json;
use axum::Router;
use serde::Deserialize;
use uuid::Uuid;

use crate::auth::{authorize, authorize_owner_or_admin, Caller, Capability};
use crate::engine::reports::{self, DailyDeliveries};
use crate::engine::riders::StatusChange;
use crate::error::AppError;
use crate::models::rider::{Rider, RiderApplication, RiderFilter, RiderStatus};
use crate::state::AppState;

pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/riders", post(apply).get(list_riders))
        .route("/riders/:id", patch(update_status).delete(remove_rider))
        .route("/rider/delivery-per-day", get(deliveries_per_day))
}

#[derive(Deserialize)]
pub struct UpdateStatusRequest {
    pub status: RiderStatus,
}

#[derive(Deserialize)]
pub struct RiderEmailQuery {
    pub email: Option<String>,
}

async fn apply(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<RiderApplication>,
) -> Result<(StatusCode, Json<Rider>), AppError> {
    let rider = state.riders.apply(payload)?;
    Ok((StatusCode::CREATED, Json(rider)))
}

async fn list_riders(
    State(state): State<Arc<AppState>>,
    caller: Caller,
    Query(filter): Query<RiderFilter>,
) -> Result<Json<Vec<Rider>>, AppError> {
    authorize(Capability::Admin, &caller)?;
    Ok(Json(state.riders.list(&filter)))
}

async fn update_status(
    State(state): State<Arc<AppState>>,
    caller: Caller,
    Path(id): Path<Uuid>,
    Json(payload): Json<UpdateStatusRequest>,
) -> Result<Json<StatusChange>, AppError> {
    authorize(Capability::Admin, &caller)?;
    Ok(Json(state.riders.set_status(id, payload.status)?))
}

async fn remove_rider(
    State(state): State<Arc<AppState>>,
    caller: Caller,
    Path(id): Path<Uuid>,
) -> Result<Json<Rider>, AppError> {
    authorize(Capability::Admin, &caller)?;
    Ok(Json(state.riders.remove(id)?))
}

async fn deliveries_per_day(
    State(state): State<Arc<AppState>>,
    caller: Caller,
    Query(query): Query<RiderEmailQuery>,
) -> Result<Json<Vec<DailyDeliveries>>, AppError> {
    let email = query
        .email
        .map(|email| email.trim().to_lowercase())
        .unwrap_or_else(|| caller.email.clone());
    authorize_owner_or_admin(&email, &caller)?;

    Ok(Json(reports::rider_deliveries_per_day(&state.store, &email)))
}
