use std::sync::Arc;

use chrono::Utc;
use tracing::{debug, warn};

use crate::error::AppError;
use crate::models::tracking::TrackingEvent;
use crate::observability::metrics::Metrics;
use crate::store::Store;

pub const PARCEL_CREATED: &str = "parcel-created";
pub const RIDER_ASSIGNED: &str = "rider-assigned";
pub const PARCEL_PAID: &str = "parcel-paid";
pub const DELIVERED: &str = "delivered";

/// Append-only log of status events keyed by tracking id.
#[derive(Clone)]
pub struct TrackingLedger {
    store: Arc<Store>,
    metrics: Metrics,
}

impl TrackingLedger {
    pub fn new(store: Arc<Store>, metrics: Metrics) -> Self {
        Self { store, metrics }
    }

    /// Best-effort append. A rejected write is logged and counted, never
    /// returned to the caller.
    pub fn record(&self, tracking_id: &str, status: &str) {
        if let Err(err) = self.try_record(tracking_id, status) {
            warn!(tracking_id, status, error = %err, "tracking event dropped");
            self.metrics
                .side_effect_failures_total
                .with_label_values(&["tracking"])
                .inc();
        }
    }

    fn try_record(&self, tracking_id: &str, status: &str) -> Result<TrackingEvent, AppError> {
        if tracking_id.trim().is_empty() {
            return Err(AppError::Validation("tracking id is empty".to_string()));
        }
        if status.trim().is_empty() {
            return Err(AppError::Validation("tracking status is empty".to_string()));
        }

        let event = TrackingEvent {
            tracking_id: tracking_id.to_string(),
            status: status.to_string(),
            details: status.replace('-', " "),
            created_at: Utc::now(),
        };

        self.store
            .trackings
            .entry(event.tracking_id.clone())
            .or_default()
            .push(event.clone());

        debug!(tracking_id, status, "tracking event recorded");
        Ok(event)
    }

    /// All events for one tracking id, oldest first.
    pub fn list_by_tracking_id(&self, tracking_id: &str) -> Vec<TrackingEvent> {
        let mut events = self
            .store
            .trackings
            .get(tracking_id)
            .map(|events| events.clone())
            .unwrap_or_default();

        events.sort_by_key(|event| event.created_at);
        events
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::TrackingLedger;
    use crate::observability::metrics::Metrics;
    use crate::store::Store;

    fn ledger() -> (TrackingLedger, Metrics) {
        let metrics = Metrics::new();
        (TrackingLedger::new(Arc::new(Store::new()), metrics.clone()), metrics)
    }

    #[test]
    fn details_replace_hyphens_with_spaces() {
        let (ledger, _) = ledger();
        ledger.record("TRK-20250101-1234-ABCDEF", "rider-assigned");

        let events = ledger.list_by_tracking_id("TRK-20250101-1234-ABCDEF");
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].status, "rider-assigned");
        assert_eq!(events[0].details, "rider assigned");
    }

    #[test]
    fn events_accumulate_in_order() {
        let (ledger, _) = ledger();
        ledger.record("TRK-1", "parcel-created");
        ledger.record("TRK-1", "parcel-paid");
        ledger.record("TRK-2", "parcel-created");

        let statuses: Vec<String> = ledger
            .list_by_tracking_id("TRK-1")
            .into_iter()
            .map(|event| event.status)
            .collect();
        assert_eq!(statuses, vec!["parcel-created", "parcel-paid"]);
        assert_eq!(ledger.list_by_tracking_id("TRK-2").len(), 1);
    }

    #[test]
    fn rejected_write_is_swallowed_and_counted() {
        let (ledger, metrics) = ledger();
        ledger.record("", "parcel-created");

        assert!(ledger.list_by_tracking_id("").is_empty());
        let failures = metrics
            .side_effect_failures_total
            .with_label_values(&["tracking"])
            .get();
        assert_eq!(failures, 1);
    }

    #[test]
    fn unknown_tracking_id_has_no_events() {
        let (ledger, _) = ledger();
        assert!(ledger.list_by_tracking_id("TRK-missing").is_empty());
    }
}
