use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::routing::{get, patch};
use axum::Json;
use axum::Router;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::auth::{authorize, Caller, Capability};
use crate::error::AppError;
use crate::models::notification::Notification;
use crate::state::AppState;

pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/notifications", get(list_notifications))
        .route("/notifications/read-all", patch(mark_all_read))
        .route("/notifications/:id/read", patch(mark_read))
}

#[derive(Deserialize)]
pub struct NotificationQuery {
    #[serde(default)]
    pub unread: bool,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MarkAllReadResponse {
    pub updated_count: usize,
}

async fn list_notifications(
    State(state): State<Arc<AppState>>,
    caller: Caller,
    Query(query): Query<NotificationQuery>,
) -> Result<Json<Vec<Notification>>, AppError> {
    authorize(Capability::Admin, &caller)?;
    Ok(Json(state.notifications.list(query.unread)))
}

async fn mark_read(
    State(state): State<Arc<AppState>>,
    caller: Caller,
    Path(id): Path<Uuid>,
) -> Result<Json<Notification>, AppError> {
    authorize(Capability::Admin, &caller)?;
    Ok(Json(state.notifications.mark_read(id)?))
}

async fn mark_all_read(
    State(state): State<Arc<AppState>>,
    caller: Caller,
) -> Result<Json<MarkAllReadResponse>, AppError> {
    authorize(Capability::Admin, &caller)?;
    let updated_count = state.notifications.mark_all_read();
    Ok(Json(MarkAllReadResponse { updated_count }))
}
