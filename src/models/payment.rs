use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::parcel::PaymentStatus;

/// Settlement record, keyed by the gateway's transaction identifier.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Payment {
    pub transaction_id: String,
    pub amount: f64,
    pub currency: String,
    pub customer_email: Option<String>,
    pub parcel_id: Uuid,
    pub parcel_name: Option<String>,
    pub tracking_id: String,
    pub payment_status: PaymentStatus,
    pub paid_at: DateTime<Utc>,
}
