//! Read-only aggregates for dashboards. Results are best effort as of read
//! time; nothing here takes a lock across collections.

use std::collections::{BTreeMap, HashMap};

use chrono::{DateTime, Datelike, NaiveDate, Utc};
use serde::Serialize;

use crate::engine::tracking::{DELIVERED, PARCEL_CREATED};
use crate::models::parcel::DeliveryStatus;
use crate::models::rider::RiderStatus;
use crate::models::tracking::TrackingEvent;
use crate::store::Store;

pub const DEFAULT_TOP_RIDERS: usize = 5;

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct StatusCount {
    pub status: DeliveryStatus,
    pub count: usize,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct AverageDuration {
    pub average_minutes: Option<i64>,
    pub sample_size: usize,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DashboardStats {
    pub total_parcels: usize,
    pub delivered_parcels: usize,
    pub total_users: usize,
    pub total_riders: usize,
    pub pending_riders: usize,
    pub total_revenue: f64,
    pub delivery_status: Vec<StatusCount>,
    pub average_delivery_minutes: Option<i64>,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct MonthlyRevenue {
    pub month: String,
    pub revenue: f64,
    pub payments: usize,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RevenueStats {
    pub total_revenue: f64,
    pub total_payments: usize,
    pub monthly: Vec<MonthlyRevenue>,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct RiderRanking {
    pub rider_email: String,
    pub rider_name: Option<String>,
    pub delivered_count: usize,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct MonthSummary {
    pub month: String,
    pub parcels_created: usize,
    pub parcels_delivered: usize,
    pub revenue: f64,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MonthlyComparison {
    pub current_month: MonthSummary,
    pub previous_month: MonthSummary,
    pub parcel_growth_percent: Option<f64>,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct DailyDeliveries {
    pub date: String,
    pub delivered_count: usize,
}

pub fn delivery_stats(store: &Store) -> Vec<StatusCount> {
    let mut counts: BTreeMap<DeliveryStatus, usize> = BTreeMap::new();
    for entry in store.parcels.iter() {
        *counts.entry(entry.delivery_status).or_default() += 1;
    }

    counts
        .into_iter()
        .map(|(status, count)| StatusCount { status, count })
        .collect()
}

/// Mean time from `parcel-created` to `delivered` over delivered parcels, in
/// whole minutes. Parcels missing either event do not count.
pub fn average_delivery_duration(store: &Store) -> AverageDuration {
    let tracking_ids: Vec<String> = store
        .parcels
        .iter()
        .filter(|entry| entry.delivery_status == DeliveryStatus::Delivered)
        .map(|entry| entry.tracking_id.clone())
        .collect();

    let durations: Vec<i64> = tracking_ids
        .iter()
        .filter_map(|tracking_id| {
            let events = store.trackings.get(tracking_id)?;
            let created = first_event_at(&events, PARCEL_CREATED)?;
            let delivered = first_event_at(&events, DELIVERED)?;
            let seconds = (delivered - created).num_seconds();
            (seconds >= 0).then_some(seconds)
        })
        .collect();

    if durations.is_empty() {
        return AverageDuration {
            average_minutes: None,
            sample_size: 0,
        };
    }

    let total: i64 = durations.iter().sum();
    let mean_minutes = total as f64 / durations.len() as f64 / 60.0;

    AverageDuration {
        average_minutes: Some(mean_minutes.round() as i64),
        sample_size: durations.len(),
    }
}

fn first_event_at(events: &[TrackingEvent], status: &str) -> Option<DateTime<Utc>> {
    events
        .iter()
        .filter(|event| event.status == status)
        .map(|event| event.created_at)
        .min()
}

pub fn dashboard_stats(store: &Store) -> DashboardStats {
    let delivery_status = delivery_stats(store);
    let delivered_parcels = delivery_status
        .iter()
        .find(|count| count.status == DeliveryStatus::Delivered)
        .map_or(0, |count| count.count);

    DashboardStats {
        total_parcels: store.parcels.len(),
        delivered_parcels,
        total_users: store.users.len(),
        total_riders: store.riders.len(),
        pending_riders: store
            .riders
            .iter()
            .filter(|entry| entry.status == RiderStatus::Pending)
            .count(),
        total_revenue: store.payments.iter().map(|entry| entry.amount).sum(),
        delivery_status,
        average_delivery_minutes: average_delivery_duration(store).average_minutes,
    }
}

pub fn revenue_stats(store: &Store) -> RevenueStats {
    let mut by_month: BTreeMap<String, MonthlyRevenue> = BTreeMap::new();
    let mut total_revenue = 0.0;
    let mut total_payments = 0;

    for entry in store.payments.iter() {
        total_revenue += entry.amount;
        total_payments += 1;

        let month = month_key(entry.paid_at.date_naive());
        let bucket = by_month.entry(month.clone()).or_insert(MonthlyRevenue {
            month,
            revenue: 0.0,
            payments: 0,
        });
        bucket.revenue += entry.amount;
        bucket.payments += 1;
    }

    RevenueStats {
        total_revenue,
        total_payments,
        monthly: by_month.into_values().collect(),
    }
}

/// Riders ranked by delivered parcels, ties broken by email.
pub fn top_riders(store: &Store, limit: usize) -> Vec<RiderRanking> {
    let mut counts: HashMap<String, RiderRanking> = HashMap::new();

    for entry in store.parcels.iter() {
        if entry.delivery_status != DeliveryStatus::Delivered {
            continue;
        }
        let Some(email) = entry.rider_email.clone() else {
            continue;
        };

        counts
            .entry(email.clone())
            .or_insert_with(|| RiderRanking {
                rider_email: email,
                rider_name: entry.rider_name.clone(),
                delivered_count: 0,
            })
            .delivered_count += 1;
    }

    let mut ranking: Vec<RiderRanking> = counts.into_values().collect();
    ranking.sort_by(|a, b| {
        b.delivered_count
            .cmp(&a.delivered_count)
            .then_with(|| a.rider_email.cmp(&b.rider_email))
    });
    ranking.truncate(limit);
    ranking
}

pub fn monthly_comparison(store: &Store, now: DateTime<Utc>) -> MonthlyComparison {
    let today = now.date_naive();
    let current = month_key(today);
    let previous = today
        .with_day(1)
        .and_then(|first| first.pred_opt())
        .map(month_key)
        .unwrap_or_default();

    let current_month = month_summary(store, &current);
    let previous_month = month_summary(store, &previous);

    let parcel_growth_percent = (previous_month.parcels_created > 0).then(|| {
        let delta = current_month.parcels_created as f64 - previous_month.parcels_created as f64;
        (delta / previous_month.parcels_created as f64 * 100.0 * 100.0).round() / 100.0
    });

    MonthlyComparison {
        current_month,
        previous_month,
        parcel_growth_percent,
    }
}

fn month_summary(store: &Store, month: &str) -> MonthSummary {
    let parcels_created = store
        .parcels
        .iter()
        .filter(|entry| month_key(entry.created_at.date_naive()) == month)
        .count();

    let parcels_delivered = store
        .trackings
        .iter()
        .filter(|entry| {
            first_event_at(entry.value(), DELIVERED)
                .is_some_and(|at| month_key(at.date_naive()) == month)
        })
        .count();

    let revenue = store
        .payments
        .iter()
        .filter(|entry| month_key(entry.paid_at.date_naive()) == month)
        .map(|entry| entry.amount)
        .sum();

    MonthSummary {
        month: month.to_string(),
        parcels_created,
        parcels_delivered,
        revenue,
    }
}

/// Delivered parcels of one rider, grouped by delivery date, oldest first.
pub fn rider_deliveries_per_day(store: &Store, rider_email: &str) -> Vec<DailyDeliveries> {
    let tracking_ids: Vec<String> = store
        .parcels
        .iter()
        .filter(|entry| entry.rider_email.as_deref() == Some(rider_email))
        .map(|entry| entry.tracking_id.clone())
        .collect();

    let mut per_day: BTreeMap<String, usize> = BTreeMap::new();
    for tracking_id in &tracking_ids {
        let Some(events) = store.trackings.get(tracking_id) else {
            continue;
        };
        for event in events.iter().filter(|event| event.status == DELIVERED) {
            *per_day
                .entry(event.created_at.format("%Y-%m-%d").to_string())
                .or_default() += 1;
        }
    }

    per_day
        .into_iter()
        .map(|(date, delivered_count)| DailyDeliveries {
            date,
            delivered_count,
        })
        .collect()
}

fn month_key(date: NaiveDate) -> String {
    format!("{:04}-{:02}", date.year(), date.month())
}
