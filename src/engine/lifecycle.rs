use std::sync::Arc;

use chrono::Utc;
use serde::Serialize;
use serde_json::json;
use tracing::{info, warn};
use uuid::Uuid;

use crate::engine::notify::NotificationEmitter;
use crate::engine::reports::{self, AverageDuration, StatusCount};
use crate::engine::riders::RiderWorkState;
use crate::engine::tracking::{TrackingLedger, PARCEL_CREATED, RIDER_ASSIGNED};
use crate::engine::tracking_id;
use crate::error::AppError;
use crate::models::notification::{NotificationEvent, NotificationKind};
use crate::models::parcel::{DeliveryStatus, NewParcel, Parcel, PaymentStatus};
use crate::models::rider::Rider;
use crate::models::user::Role;
use crate::observability::metrics::Metrics;
use crate::store::Store;

const MAX_TRACKING_ID_ATTEMPTS: usize = 16;

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Assignment {
    pub parcel_info: Parcel,
    pub rider_info: Rider,
}

/// Result of a rider-driven status change. The parcel write always commits
/// first; `rider_released` reports whether the rider document followed.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DeliveryUpdate {
    pub parcel: Parcel,
    pub rider_released: bool,
}

/// Owns the parcel state machine and drives the rider and tracking side effects.
#[derive(Clone)]
pub struct ParcelLifecycle {
    store: Arc<Store>,
    ledger: TrackingLedger,
    riders: RiderWorkState,
    notifications: NotificationEmitter,
    metrics: Metrics,
    tracking_suffix_len: usize,
}

impl ParcelLifecycle {
    pub fn new(
        store: Arc<Store>,
        ledger: TrackingLedger,
        riders: RiderWorkState,
        notifications: NotificationEmitter,
        metrics: Metrics,
        tracking_suffix_len: usize,
    ) -> Self {
        Self {
            store,
            ledger,
            riders,
            notifications,
            metrics,
            tracking_suffix_len,
        }
    }

    pub fn create(&self, data: NewParcel) -> Result<Parcel, AppError> {
        let sender_email = data.sender_email.trim().to_lowercase();
        if !sender_email.contains('@') {
            return Err(AppError::Validation("senderEmail is required".to_string()));
        }
        if data.parcel_name.trim().is_empty() {
            return Err(AppError::Validation("parcelName is required".to_string()));
        }
        if !data.amount.is_finite() || data.amount < 0.0 {
            return Err(AppError::Validation("amount must be a non-negative number".to_string()));
        }

        let now = Utc::now();
        let parcel = Parcel {
            id: Uuid::new_v4(),
            parcel_type: data.parcel_type,
            parcel_name: data.parcel_name.trim().to_string(),
            parcel_weight: data.parcel_weight,
            amount: data.amount,
            sender_name: data.sender_name,
            sender_email,
            sender_phone: data.sender_phone,
            sender_address: data.sender_address,
            sender_region: data.sender_region,
            sender_district: data.sender_district,
            receiver_name: data.receiver_name,
            receiver_email: data.receiver_email,
            receiver_phone: data.receiver_phone,
            receiver_address: data.receiver_address,
            receiver_region: data.receiver_region,
            receiver_district: data.receiver_district,
            tracking_id: self.issue_tracking_id()?,
            delivery_status: DeliveryStatus::Pending,
            payment_status: PaymentStatus::Unpaid,
            rider_id: None,
            rider_name: None,
            rider_email: None,
            created_at: now,
        };

        self.store.parcels.insert(parcel.id, parcel.clone());
        self.metrics.parcels_created_total.inc();
        info!(parcel_id = %parcel.id, tracking_id = %parcel.tracking_id, "parcel created");

        self.ledger.record(&parcel.tracking_id, PARCEL_CREATED);
        self.notifications.emit(NotificationEvent {
            kind: NotificationKind::NewOrder,
            title: "New parcel booked".to_string(),
            message: format!("{} booked {}", parcel.sender_email, parcel.parcel_name),
            for_role: Role::Admin,
            related_id: parcel.id.to_string(),
            tracking_id: Some(parcel.tracking_id.clone()),
            metadata: json!({ "amount": parcel.amount, "senderEmail": parcel.sender_email }),
        });

        Ok(parcel)
    }

    fn issue_tracking_id(&self) -> Result<String, AppError> {
        for _ in 0..MAX_TRACKING_ID_ATTEMPTS {
            let candidate = tracking_id::generate(Utc::now(), self.tracking_suffix_len);
            if self.store.issued_tracking_ids.insert(candidate.clone()) {
                return Ok(candidate);
            }
            warn!(tracking_id = %candidate, "tracking id collision, retrying");
        }

        Err(AppError::Internal("could not issue a unique tracking id".to_string()))
    }

    pub fn get(&self, parcel_id: Uuid) -> Result<Parcel, AppError> {
        self.store
            .find_parcel(&parcel_id)
            .ok_or_else(|| AppError::NotFound(format!("parcel {parcel_id} not found")))
    }

    /// Parcels on the road cannot be removed; their rider would stay claimed.
    pub fn delete(&self, parcel_id: Uuid) -> Result<Parcel, AppError> {
        let removed = self.store.parcels.remove_if(&parcel_id, |_, parcel| {
            !matches!(
                parcel.delivery_status,
                DeliveryStatus::RiderAssigned | DeliveryStatus::InTransit
            )
        });

        match removed {
            Some((_, parcel)) => {
                info!(parcel_id = %parcel_id, "parcel deleted");
                Ok(parcel)
            }
            None if self.store.parcels.contains_key(&parcel_id) => Err(AppError::Conflict(
                format!("parcel {parcel_id} is out for delivery"),
            )),
            None => Err(AppError::NotFound(format!("parcel {parcel_id} not found"))),
        }
    }

    /// Claims the rider first, then stamps the parcel. If the parcel was taken
    /// in between, the rider claim is handed back.
    pub fn assign_rider(&self, parcel_id: Uuid, rider_id: Uuid) -> Result<Assignment, AppError> {
        let result = self.try_assign_rider(parcel_id, rider_id);

        let outcome = if result.is_ok() { "success" } else { "rejected" };
        self.metrics
            .assignments_total
            .with_label_values(&[outcome])
            .inc();

        result
    }

    fn try_assign_rider(&self, parcel_id: Uuid, rider_id: Uuid) -> Result<Assignment, AppError> {
        let current = self.get(parcel_id)?;
        if !current.delivery_status.accepts_assignment() {
            return Err(AppError::Conflict(format!(
                "parcel {parcel_id} is {} and cannot take a rider",
                current.delivery_status
            )));
        }

        let rider = self.riders.assign(rider_id)?;

        let stamped = match self.store.parcels.get_mut(&parcel_id) {
            Some(mut parcel) if parcel.delivery_status.accepts_assignment() => {
                parcel.delivery_status = DeliveryStatus::RiderAssigned;
                parcel.rider_id = Some(rider.id);
                parcel.rider_name = Some(rider.name.clone());
                parcel.rider_email = Some(rider.email.clone());
                Ok(parcel.clone())
            }
            Some(_) => Err(AppError::Conflict(format!(
                "parcel {parcel_id} was assigned concurrently"
            ))),
            None => Err(AppError::NotFound(format!("parcel {parcel_id} not found"))),
        };

        let parcel = match stamped {
            Ok(parcel) => parcel,
            Err(err) => {
                warn!(parcel_id = %parcel_id, rider_id = %rider_id, error = %err, "assignment lost, releasing rider");
                self.riders.release_by_id(rider.id);
                return Err(err);
            }
        };

        info!(parcel_id = %parcel_id, rider_id = %rider_id, tracking_id = %parcel.tracking_id, "rider assigned");
        self.ledger.record(&parcel.tracking_id, RIDER_ASSIGNED);

        Ok(Assignment {
            parcel_info: parcel,
            rider_info: rider,
        })
    }

    pub fn update_delivery_status(
        &self,
        parcel_id: Uuid,
        new_status: DeliveryStatus,
        rider_email: &str,
        tracking_id: Option<&str>,
    ) -> Result<DeliveryUpdate, AppError> {
        let parcel = {
            let mut parcel = self
                .store
                .parcels
                .get_mut(&parcel_id)
                .ok_or_else(|| AppError::NotFound(format!("parcel {parcel_id} not found")))?;

            if let Some(tracking_id) = tracking_id {
                if tracking_id != parcel.tracking_id {
                    return Err(AppError::Validation(format!(
                        "tracking id {tracking_id} does not belong to parcel {parcel_id}"
                    )));
                }
            }
            if parcel
                .rider_email
                .as_deref()
                .is_some_and(|assigned| assigned != rider_email)
            {
                return Err(AppError::Forbidden);
            }
            if !parcel.delivery_status.can_advance_to(new_status) {
                return Err(AppError::Conflict(format!(
                    "parcel {parcel_id} cannot move from {} to {new_status}",
                    parcel.delivery_status
                )));
            }

            parcel.delivery_status = new_status;
            parcel.clone()
        };

        let rider_released = if new_status.releases_rider() {
            let released = self.riders.release(rider_email).is_some();
            if !released {
                warn!(parcel_id = %parcel_id, email = rider_email, "parcel updated but rider was not released");
            }
            released
        } else {
            false
        };

        info!(parcel_id = %parcel_id, status = %new_status, rider_released, "delivery status updated");
        self.ledger.record(&parcel.tracking_id, new_status.as_str());

        if new_status == DeliveryStatus::Delivered {
            self.notifications.emit(NotificationEvent {
                kind: NotificationKind::ParcelDelivered,
                title: "Parcel delivered".to_string(),
                message: format!("{} was delivered by {rider_email}", parcel.parcel_name),
                for_role: Role::Admin,
                related_id: parcel.id.to_string(),
                tracking_id: Some(parcel.tracking_id.clone()),
                metadata: json!({ "riderEmail": rider_email }),
            });
        }

        Ok(DeliveryUpdate {
            parcel,
            rider_released,
        })
    }

    /// Active work by default; delivered parcels only when asked for.
    pub fn query_for_rider(&self, rider_email: &str, filter: Option<DeliveryStatus>) -> Vec<Parcel> {
        let want_delivered = filter == Some(DeliveryStatus::Delivered);

        let mut parcels = self.store.parcels_where(|parcel| {
            parcel.rider_email.as_deref() == Some(rider_email)
                && (parcel.delivery_status == DeliveryStatus::Delivered) == want_delivered
        });
        parcels.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        parcels
    }

    /// Customer view, newest first.
    pub fn list_for_sender(
        &self,
        sender_email: Option<&str>,
        status: Option<DeliveryStatus>,
    ) -> Vec<Parcel> {
        let mut parcels = self.store.parcels_where(|parcel| {
            sender_email.is_none_or(|email| parcel.sender_email == email)
                && status.is_none_or(|status| parcel.delivery_status == status)
        });
        parcels.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        parcels
    }

    pub fn delivery_stats(&self) -> Vec<StatusCount> {
        reports::delivery_stats(&self.store)
    }

    pub fn average_delivery_duration(&self) -> AverageDuration {
        reports::average_delivery_duration(&self.store)
    }
}
