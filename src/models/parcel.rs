use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Position of a parcel in its shipment lifecycle.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(rename_all = "kebab-case")]
pub enum DeliveryStatus {
    Pending,
    ParcelPaid,
    RiderAssigned,
    InTransit,
    Delivered,
}

impl DeliveryStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            DeliveryStatus::Pending => "pending",
            DeliveryStatus::ParcelPaid => "parcel-paid",
            DeliveryStatus::RiderAssigned => "rider-assigned",
            DeliveryStatus::InTransit => "in-transit",
            DeliveryStatus::Delivered => "delivered",
        }
    }

    /// Whether a rider may be assigned to a parcel in this state.
    pub fn accepts_assignment(&self) -> bool {
        matches!(self, DeliveryStatus::Pending | DeliveryStatus::ParcelPaid)
    }

    /// Transitions a rider may drive through a delivery-status update.
    pub fn can_advance_to(&self, next: DeliveryStatus) -> bool {
        use DeliveryStatus::*;

        matches!(
            (self, next),
            (RiderAssigned, InTransit)
                | (RiderAssigned, Delivered)
                | (RiderAssigned, ParcelPaid)
                | (InTransit, Delivered)
                | (InTransit, ParcelPaid)
        )
    }

    /// Terminal statuses free the rider for new work.
    pub fn releases_rider(&self) -> bool {
        matches!(self, DeliveryStatus::Delivered | DeliveryStatus::ParcelPaid)
    }
}

impl fmt::Display for DeliveryStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum PaymentStatus {
    Unpaid,
    Paid,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Parcel {
    pub id: Uuid,
    pub parcel_type: Option<String>,
    pub parcel_name: String,
    pub parcel_weight: Option<f64>,
    pub amount: f64,
    pub sender_name: Option<String>,
    pub sender_email: String,
    pub sender_phone: Option<String>,
    pub sender_address: Option<String>,
    pub sender_region: Option<String>,
    pub sender_district: Option<String>,
    pub receiver_name: Option<String>,
    pub receiver_email: Option<String>,
    pub receiver_phone: Option<String>,
    pub receiver_address: Option<String>,
    pub receiver_region: Option<String>,
    pub receiver_district: Option<String>,
    pub tracking_id: String,
    pub delivery_status: DeliveryStatus,
    pub payment_status: PaymentStatus,
    pub rider_id: Option<Uuid>,
    pub rider_name: Option<String>,
    pub rider_email: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// Booking data supplied by the customer.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewParcel {
    pub parcel_type: Option<String>,
    #[serde(default)]
    pub parcel_name: String,
    pub parcel_weight: Option<f64>,
    #[serde(default)]
    pub amount: f64,
    pub sender_name: Option<String>,
    #[serde(default)]
    pub sender_email: String,
    pub sender_phone: Option<String>,
    pub sender_address: Option<String>,
    pub sender_region: Option<String>,
    pub sender_district: Option<String>,
    pub receiver_name: Option<String>,
    pub receiver_email: Option<String>,
    pub receiver_phone: Option<String>,
    pub receiver_address: Option<String>,
    pub receiver_region: Option<String>,
    pub receiver_district: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::DeliveryStatus;

    #[test]
    fn statuses_serialize_kebab_case() {
        let json = serde_json::to_string(&DeliveryStatus::RiderAssigned).unwrap();
        assert_eq!(json, "\"rider-assigned\"");

        let parsed: DeliveryStatus = serde_json::from_str("\"parcel-paid\"").unwrap();
        assert_eq!(parsed, DeliveryStatus::ParcelPaid);
    }

    #[test]
    fn rider_cannot_rewind_a_delivered_parcel() {
        assert!(!DeliveryStatus::Delivered.can_advance_to(DeliveryStatus::InTransit));
        assert!(!DeliveryStatus::Pending.can_advance_to(DeliveryStatus::Delivered));
        assert!(DeliveryStatus::RiderAssigned.can_advance_to(DeliveryStatus::InTransit));
        assert!(DeliveryStatus::InTransit.can_advance_to(DeliveryStatus::Delivered));
    }
}
