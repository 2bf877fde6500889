use std::sync::Arc;

use chrono::Utc;
use dashmap::mapref::entry::Entry;
use serde::Serialize;
use serde_json::json;
use tracing::{info, warn};
use uuid::Uuid;

use crate::engine::notify::NotificationEmitter;
use crate::error::AppError;
use crate::models::notification::{NotificationEvent, NotificationKind};
use crate::models::rider::{Rider, RiderApplication, RiderFilter, RiderStatus, WorkStatus};
use crate::models::user::Role;
use crate::observability::metrics::Metrics;
use crate::store::Store;

/// Outcome of an admin status change. Approval writes the rider and then the
/// linked user; `user_promoted` reports whether the second write happened.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusChange {
    pub rider: Rider,
    pub user_promoted: bool,
}

/// Owns rider availability. `workStatus` only moves through `assign` and
/// `release`, which the parcel lifecycle calls.
#[derive(Clone)]
pub struct RiderWorkState {
    store: Arc<Store>,
    notifications: NotificationEmitter,
    metrics: Metrics,
}

impl RiderWorkState {
    pub fn new(store: Arc<Store>, notifications: NotificationEmitter, metrics: Metrics) -> Self {
        Self {
            store,
            notifications,
            metrics,
        }
    }

    pub fn apply(&self, application: RiderApplication) -> Result<Rider, AppError> {
        let email = application.email.trim().to_lowercase();
        if application.name.trim().is_empty() {
            return Err(AppError::Validation("name cannot be empty".to_string()));
        }
        if !email.contains('@') {
            return Err(AppError::Validation("a valid email is required".to_string()));
        }
        if application.rider_district.trim().is_empty() {
            return Err(AppError::Validation("riderDistrict cannot be empty".to_string()));
        }

        let rider = Rider {
            id: Uuid::new_v4(),
            name: application.name.trim().to_string(),
            email: email.clone(),
            phone: application.phone,
            region: application.region,
            rider_district: application.rider_district.trim().to_string(),
            status: RiderStatus::Pending,
            work_status: None,
            created_at: Utc::now(),
        };

        match self.store.rider_ids_by_email.entry(email.clone()) {
            Entry::Occupied(_) => {
                return Err(AppError::Conflict(format!(
                    "rider application for {email} already exists"
                )));
            }
            Entry::Vacant(slot) => {
                slot.insert(rider.id);
                self.store.riders.insert(rider.id, rider.clone());
            }
        }

        info!(rider_id = %rider.id, email = %rider.email, "rider application received");

        self.notifications.emit(NotificationEvent {
            kind: NotificationKind::RiderApplication,
            title: "New rider application".to_string(),
            message: format!("{} applied to ride in {}", rider.name, rider.rider_district),
            for_role: Role::Admin,
            related_id: rider.id.to_string(),
            tracking_id: None,
            metadata: json!({ "email": rider.email, "district": rider.rider_district }),
        });

        Ok(rider)
    }

    /// Newest first, then `skip`/`limit`. A zero or absent limit means no limit.
    pub fn list(&self, filter: &RiderFilter) -> Vec<Rider> {
        let mut riders: Vec<Rider> = self
            .store
            .riders
            .iter()
            .map(|entry| entry.value().clone())
            .filter(|rider| filter.status.is_none_or(|status| rider.status == status))
            .filter(|rider| filter.work_status.is_none_or(|work| rider.work_status == Some(work)))
            .filter(|rider| {
                filter
                    .district
                    .as_deref()
                    .is_none_or(|district| rider.rider_district == district)
            })
            .collect();

        riders.sort_by(|a, b| b.created_at.cmp(&a.created_at));

        let skip = filter.skip.unwrap_or(0);
        let limit = filter.limit.filter(|limit| *limit > 0).unwrap_or(usize::MAX);
        riders.into_iter().skip(skip).take(limit).collect()
    }

    pub fn get(&self, rider_id: Uuid) -> Result<Rider, AppError> {
        self.store
            .riders
            .get(&rider_id)
            .map(|rider| rider.clone())
            .ok_or_else(|| AppError::NotFound(format!("rider {rider_id} not found")))
    }

    pub fn set_status(&self, rider_id: Uuid, status: RiderStatus) -> Result<StatusChange, AppError> {
        if status == RiderStatus::Approved {
            let email = self.get(rider_id)?.email;
            return self.approve(&email);
        }

        let mut rider = self
            .store
            .riders
            .get_mut(&rider_id)
            .ok_or_else(|| AppError::NotFound(format!("rider {rider_id} not found")))?;
        if rider.work_status == Some(WorkStatus::InDelivery) {
            warn!(rider_id = %rider_id, status = ?status, "status change refused for rider in delivery");
            return Err(AppError::Conflict(format!(
                "rider {rider_id} is out on a delivery"
            )));
        }
        rider.status = status;

        info!(rider_id = %rider_id, status = ?status, "rider status changed");
        Ok(StatusChange {
            rider: rider.clone(),
            user_promoted: false,
        })
    }

    /// Approves the rider, makes a first-time rider available and promotes the
    /// linked user to `rider`. The two documents are written one after the other.
    pub fn approve(&self, rider_email: &str) -> Result<StatusChange, AppError> {
        let rider_id = self
            .store
            .rider_ids_by_email
            .get(rider_email)
            .map(|id| *id)
            .ok_or_else(|| AppError::NotFound(format!("rider {rider_email} not found")))?;

        let rider = {
            let mut rider = self
                .store
                .riders
                .get_mut(&rider_id)
                .ok_or_else(|| AppError::NotFound(format!("rider {rider_email} not found")))?;

            rider.status = RiderStatus::Approved;
            // a rider out on a delivery keeps the claim
            if rider.work_status.is_none() {
                rider.work_status = Some(WorkStatus::Available);
            }
            rider.clone()
        };

        let user_promoted = self.promote_user(rider_email);
        if !user_promoted {
            warn!(email = rider_email, "rider approved but linked user was not promoted");
        }

        info!(rider_id = %rider.id, email = rider_email, user_promoted, "rider approved");
        Ok(StatusChange {
            rider,
            user_promoted,
        })
    }

    fn promote_user(&self, email: &str) -> bool {
        let Some(user_id) = self.store.user_ids_by_email.get(email).map(|id| *id) else {
            return false;
        };
        let Some(mut user) = self.store.users.get_mut(&user_id) else {
            return false;
        };

        match user.role {
            Role::User => {
                user.role = Role::Rider;
                true
            }
            Role::Rider => true,
            // admins keep their role
            Role::Admin => false,
        }
    }

    /// Claims an approved, available rider. The check and the write happen under
    /// the rider document's lock, so a rider is never claimed twice.
    pub fn assign(&self, rider_id: Uuid) -> Result<Rider, AppError> {
        let mut rider = self
            .store
            .riders
            .get_mut(&rider_id)
            .ok_or_else(|| AppError::NotFound(format!("rider {rider_id} not found")))?;

        if rider.status != RiderStatus::Approved {
            return Err(AppError::Conflict(format!("rider {rider_id} is not approved")));
        }
        if rider.work_status != Some(WorkStatus::Available) {
            return Err(AppError::Conflict(format!("rider {rider_id} is not available")));
        }

        rider.work_status = Some(WorkStatus::InDelivery);
        self.metrics.riders_in_delivery.inc();
        Ok(rider.clone())
    }

    /// Unconditionally marks the rider available. Returns `None` when no rider
    /// has that email.
    pub fn release(&self, rider_email: &str) -> Option<Rider> {
        let Some(rider_id) = self.store.rider_ids_by_email.get(rider_email).map(|id| *id) else {
            warn!(email = rider_email, "release requested for unknown rider");
            return None;
        };

        self.release_by_id(rider_id)
    }

    pub(crate) fn release_by_id(&self, rider_id: Uuid) -> Option<Rider> {
        let mut rider = self.store.riders.get_mut(&rider_id)?;
        if rider.work_status == Some(WorkStatus::InDelivery) {
            self.metrics.riders_in_delivery.dec();
        }
        rider.work_status = Some(WorkStatus::Available);
        Some(rider.clone())
    }

    pub fn remove(&self, rider_id: Uuid) -> Result<Rider, AppError> {
        let (_, rider) = self
            .store
            .riders
            .remove(&rider_id)
            .ok_or_else(|| AppError::NotFound(format!("rider {rider_id} not found")))?;

        self.store.rider_ids_by_email.remove(&rider.email);
        if rider.work_status == Some(WorkStatus::InDelivery) {
            self.metrics.riders_in_delivery.dec();
        }

        info!(rider_id = %rider_id, "rider removed");
        Ok(rider)
    }
}
