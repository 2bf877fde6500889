use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One immutable entry in a parcel's tracking history.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct TrackingEvent {
    pub tracking_id: String,
    pub status: String,
    pub details: String,
    pub created_at: DateTime<Utc>,
}
