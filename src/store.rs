use dashmap::{DashMap, DashSet};
use uuid::Uuid;

use crate::models::notification::Notification;
use crate::models::parcel::Parcel;
use crate::models::payment::Payment;
use crate::models::rider::Rider;
use crate::models::tracking::TrackingEvent;
use crate::models::user::User;

/// In-process document store, one concurrent map per collection.
///
/// Every single-document mutation runs under that document's shard lock, so
/// `get_mut` and `entry` give conditional updates without a wider lock. No
/// operation spans collections atomically.
#[derive(Default)]
pub struct Store {
    pub parcels: DashMap<Uuid, Parcel>,
    pub riders: DashMap<Uuid, Rider>,
    pub rider_ids_by_email: DashMap<String, Uuid>,
    pub users: DashMap<Uuid, User>,
    pub user_ids_by_email: DashMap<String, Uuid>,
    pub trackings: DashMap<String, Vec<TrackingEvent>>,
    pub issued_tracking_ids: DashSet<String>,
    pub payments: DashMap<String, Payment>,
    pub notifications: DashMap<Uuid, Notification>,
}

impl Store {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn find_user_by_email(&self, email: &str) -> Option<User> {
        let id = *self.user_ids_by_email.get(email)?;
        self.users.get(&id).map(|user| user.clone())
    }

    pub fn find_rider_by_email(&self, email: &str) -> Option<Rider> {
        let id = *self.rider_ids_by_email.get(email)?;
        self.riders.get(&id).map(|rider| rider.clone())
    }

    pub fn find_parcel(&self, id: &Uuid) -> Option<Parcel> {
        self.parcels.get(id).map(|parcel| parcel.clone())
    }

    pub fn parcels_where<F>(&self, predicate: F) -> Vec<Parcel>
    where
        F: Fn(&Parcel) -> bool,
    {
        self.parcels
            .iter()
            .filter(|entry| predicate(entry.value()))
            .map(|entry| entry.value().clone())
            .collect()
    }
}
