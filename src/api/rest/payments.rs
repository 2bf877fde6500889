use std::sync::Arc;

use axum::extract::{Query, State};
use axum::routing::{get, patch, post};
use axum::Json;
use axum::Router;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::auth::{authorize, authorize_owner_or_admin, Caller, Capability};
use crate::engine::settlement::{CheckoutLink, Settlement};
use crate::error::AppError;
use crate::models::payment::Payment;
use crate::state::AppState;

pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/create-checkout-session", post(create_checkout_session))
        .route("/payment-success", patch(payment_success))
        .route("/payment-history", get(payment_history))
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CheckoutSessionRequest {
    pub parcel_id: Uuid,
}

#[derive(Deserialize)]
pub struct PaymentSuccessQuery {
    pub session_id: String,
}

#[derive(Deserialize)]
pub struct PaymentHistoryQuery {
    pub email: Option<String>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SettlementResponse {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<&'static str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tracking_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub transaction_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub amount: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub paid_at: Option<DateTime<Utc>>,
}

impl SettlementResponse {
    fn paid(payment: Payment, message: Option<&'static str>) -> Self {
        Self {
            success: true,
            message,
            tracking_id: Some(payment.tracking_id),
            transaction_id: Some(payment.transaction_id),
            amount: Some(payment.amount),
            paid_at: Some(payment.paid_at),
        }
    }
}

impl From<Settlement> for SettlementResponse {
    fn from(settlement: Settlement) -> Self {
        match settlement {
            Settlement::Recorded(payment) => Self::paid(payment, None),
            Settlement::AlreadyRecorded(payment) => {
                Self::paid(payment, Some("payment already exists"))
            }
            Settlement::NotPaid { .. } => Self {
                success: false,
                message: Some("payment not completed"),
                tracking_id: None,
                transaction_id: None,
                amount: None,
                paid_at: None,
            },
        }
    }
}

async fn create_checkout_session(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<CheckoutSessionRequest>,
) -> Result<Json<CheckoutLink>, AppError> {
    Ok(Json(state.payments.open_checkout(payload.parcel_id).await?))
}

async fn payment_success(
    State(state): State<Arc<AppState>>,
    Query(query): Query<PaymentSuccessQuery>,
) -> Result<Json<SettlementResponse>, AppError> {
    let settlement = state.payments.confirm_settlement(&query.session_id).await?;
    Ok(Json(settlement.into()))
}

async fn payment_history(
    State(state): State<Arc<AppState>>,
    caller: Caller,
    Query(query): Query<PaymentHistoryQuery>,
) -> Result<Json<Vec<Payment>>, AppError> {
    let email = query.email.map(|email| email.trim().to_lowercase());
    match email.as_deref() {
        Some(email) => authorize_owner_or_admin(email, &caller)?,
        None => authorize(Capability::Admin, &caller)?,
    }

    Ok(Json(state.payments.payment_history(email.as_deref())))
}
