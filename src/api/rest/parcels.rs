use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::routing::{get, patch};
use axum::Json;
use axum::Router;
use serde::Deserialize;
use uuid::Uuid;

use crate::auth::{authorize, authorize_owner_or_admin, Caller, Capability};
use crate::engine::lifecycle::{Assignment, DeliveryUpdate};
use crate::engine::reports::StatusCount;
use crate::error::AppError;
use crate::models::parcel::{DeliveryStatus, NewParcel, Parcel};
use crate::state::AppState;

pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/parcels", get(list_parcels).post(create_parcel))
        .route("/parcels/rider", get(rider_parcels))
        .route("/parcels/delivery-stats", get(delivery_stats))
        .route("/parcels/:id", get(get_parcel).delete(delete_parcel))
        .route("/parcels/:id/assign", patch(assign_rider))
        .route("/parcels/:id/deliveryStatus", patch(update_delivery_status))
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ParcelQuery {
    pub email: Option<String>,
    pub delivery_status: Option<DeliveryStatus>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RiderParcelQuery {
    pub rider_email: Option<String>,
    /// Free-form: only `delivered` selects finished work.
    pub delivery_status: Option<String>,
}

impl RiderParcelQuery {
    fn status_filter(&self) -> Option<DeliveryStatus> {
        (self.delivery_status.as_deref().map(str::trim) == Some(DeliveryStatus::Delivered.as_str()))
            .then_some(DeliveryStatus::Delivered)
    }
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AssignRequest {
    pub rider_id: Uuid,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeliveryStatusRequest {
    pub delivery_status: DeliveryStatus,
    pub email: Option<String>,
    pub tracking_id: Option<String>,
}

fn normalize(email: &str) -> String {
    email.trim().to_lowercase()
}

async fn list_parcels(
    State(state): State<Arc<AppState>>,
    caller: Caller,
    Query(query): Query<ParcelQuery>,
) -> Result<Json<Vec<Parcel>>, AppError> {
    let email = query.email.as_deref().map(normalize);
    match email.as_deref() {
        Some(email) => authorize_owner_or_admin(email, &caller)?,
        None => authorize(Capability::Admin, &caller)?,
    }

    Ok(Json(
        state
            .parcels
            .list_for_sender(email.as_deref(), query.delivery_status),
    ))
}

async fn create_parcel(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<NewParcel>,
) -> Result<(StatusCode, Json<Parcel>), AppError> {
    let parcel = state.parcels.create(payload)?;
    Ok((StatusCode::CREATED, Json(parcel)))
}

async fn get_parcel(
    State(state): State<Arc<AppState>>,
    caller: Caller,
    Path(id): Path<Uuid>,
) -> Result<Json<Parcel>, AppError> {
    let parcel = state.parcels.get(id)?;
    if parcel.rider_email.as_deref() != Some(caller.email.as_str()) {
        authorize_owner_or_admin(&parcel.sender_email, &caller)?;
    }
    Ok(Json(parcel))
}

async fn delete_parcel(
    State(state): State<Arc<AppState>>,
    caller: Caller,
    Path(id): Path<Uuid>,
) -> Result<Json<Parcel>, AppError> {
    let parcel = state.parcels.get(id)?;
    authorize_owner_or_admin(&parcel.sender_email, &caller)?;
    Ok(Json(state.parcels.delete(id)?))
}

async fn rider_parcels(
    State(state): State<Arc<AppState>>,
    caller: Caller,
    Query(query): Query<RiderParcelQuery>,
) -> Result<Json<Vec<Parcel>>, AppError> {
    authorize(Capability::Rider, &caller)?;
    if let Some(email) = query.rider_email.as_deref() {
        authorize(Capability::Owner(email), &caller)?;
    }

    Ok(Json(
        state
            .parcels
            .query_for_rider(&caller.email, query.status_filter()),
    ))
}

async fn delivery_stats(
    State(state): State<Arc<AppState>>,
    caller: Caller,
) -> Result<Json<Vec<StatusCount>>, AppError> {
    authorize(Capability::Admin, &caller)?;
    Ok(Json(state.parcels.delivery_stats()))
}

async fn assign_rider(
    State(state): State<Arc<AppState>>,
    caller: Caller,
    Path(id): Path<Uuid>,
    Json(payload): Json<AssignRequest>,
) -> Result<Json<Assignment>, AppError> {
    authorize(Capability::Admin, &caller)?;
    Ok(Json(state.parcels.assign_rider(id, payload.rider_id)?))
}

async fn update_delivery_status(
    State(state): State<Arc<AppState>>,
    caller: Caller,
    Path(id): Path<Uuid>,
    Json(payload): Json<DeliveryStatusRequest>,
) -> Result<Json<DeliveryUpdate>, AppError> {
    authorize(Capability::Rider, &caller)?;
    if let Some(email) = payload.email.as_deref() {
        authorize(Capability::Owner(email), &caller)?;
    }

    let update = state.parcels.update_delivery_status(
        id,
        payload.delivery_status,
        &caller.email,
        payload.tracking_id.as_deref(),
    )?;
    Ok(Json(update))
}
