use std::sync::Arc;

use axum::extract::{Query, State};
use axum::routing::get;
use axum::Json;
use axum::Router;
use chrono::Utc;
use serde::Deserialize;

use crate::auth::{authorize, Caller, Capability};
use crate::engine::reports::{
    self, AverageDuration, DashboardStats, MonthlyComparison, RevenueStats, RiderRanking,
    DEFAULT_TOP_RIDERS,
};
use crate::error::AppError;
use crate::state::AppState;

pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/admin/dashboard-stats", get(dashboard_stats))
        .route("/admin/revenue-stats", get(revenue_stats))
        .route("/admin/top-riders", get(top_riders))
        .route("/admin/monthly-comparison", get(monthly_comparison))
        .route("/admin/average-delivery-time", get(average_delivery_time))
}

#[derive(Deserialize)]
pub struct TopRidersQuery {
    pub limit: Option<usize>,
}

async fn dashboard_stats(
    State(state): State<Arc<AppState>>,
    caller: Caller,
) -> Result<Json<DashboardStats>, AppError> {
    authorize(Capability::Admin, &caller)?;
    Ok(Json(reports::dashboard_stats(&state.store)))
}

async fn revenue_stats(
    State(state): State<Arc<AppState>>,
    caller: Caller,
) -> Result<Json<RevenueStats>, AppError> {
    authorize(Capability::Admin, &caller)?;
    Ok(Json(reports::revenue_stats(&state.store)))
}

async fn top_riders(
    State(state): State<Arc<AppState>>,
    caller: Caller,
    Query(query): Query<TopRidersQuery>,
) -> Result<Json<Vec<RiderRanking>>, AppError> {
    authorize(Capability::Admin, &caller)?;
    let limit = query.limit.unwrap_or(DEFAULT_TOP_RIDERS);
    Ok(Json(reports::top_riders(&state.store, limit)))
}

async fn monthly_comparison(
    State(state): State<Arc<AppState>>,
    caller: Caller,
) -> Result<Json<MonthlyComparison>, AppError> {
    authorize(Capability::Admin, &caller)?;
    Ok(Json(reports::monthly_comparison(&state.store, Utc::now())))
}

async fn average_delivery_time(
    State(state): State<Arc<AppState>>,
    caller: Caller,
) -> Result<Json<AverageDuration>, AppError> {
    authorize(Capability::Admin, &caller)?;
    Ok(Json(state.parcels.average_delivery_duration()))
}
