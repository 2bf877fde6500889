use std::sync::Arc;
use std::time::Duration;

use crate::auth::IdentityProvider;
use crate::config::Config;
use crate::engine::lifecycle::ParcelLifecycle;
use crate::engine::notify::NotificationEmitter;
use crate::engine::riders::RiderWorkState;
use crate::engine::settlement::{CheckoutOptions, PaymentReconciliation};
use crate::engine::tracking::TrackingLedger;
use crate::engine::users::UserDirectory;
use crate::gateway::PaymentGateway;
use crate::observability::metrics::Metrics;
use crate::store::Store;

#[derive(Debug, Clone)]
pub struct Settings {
    pub tracking_suffix_len: usize,
    pub site_domain: String,
    pub currency: String,
    pub external_timeout: Duration,
    pub notification_buffer_size: usize,
}

impl Settings {
    pub fn from_config(config: &Config) -> Self {
        Self {
            tracking_suffix_len: config.tracking_suffix_len,
            site_domain: config.site_domain.clone(),
            currency: config.currency.clone(),
            external_timeout: config.external_timeout,
            notification_buffer_size: config.notification_buffer_size,
        }
    }
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            tracking_suffix_len: 6,
            site_domain: "http://localhost:5173".to_string(),
            currency: "bdt".to_string(),
            external_timeout: Duration::from_secs(10),
            notification_buffer_size: 1024,
        }
    }
}

/// Everything a request handler can reach, wired once at startup.
pub struct AppState {
    pub store: Arc<Store>,
    pub users: UserDirectory,
    pub riders: RiderWorkState,
    pub parcels: ParcelLifecycle,
    pub payments: PaymentReconciliation,
    pub tracking: TrackingLedger,
    pub notifications: NotificationEmitter,
    pub identity: Arc<dyn IdentityProvider>,
    pub external_timeout: Duration,
    pub metrics: Metrics,
}

impl AppState {
    pub fn new(
        settings: Settings,
        gateway: Arc<dyn PaymentGateway>,
        identity: Arc<dyn IdentityProvider>,
    ) -> Self {
        let store = Arc::new(Store::new());
        let metrics = Metrics::new();

        let notifications = NotificationEmitter::new(
            store.clone(),
            settings.notification_buffer_size,
            metrics.clone(),
        );
        let tracking = TrackingLedger::new(store.clone(), metrics.clone());
        let riders = RiderWorkState::new(store.clone(), notifications.clone(), metrics.clone());
        let parcels = ParcelLifecycle::new(
            store.clone(),
            tracking.clone(),
            riders.clone(),
            notifications.clone(),
            metrics.clone(),
            settings.tracking_suffix_len,
        );
        let payments = PaymentReconciliation::new(
            store.clone(),
            gateway,
            tracking.clone(),
            notifications.clone(),
            metrics.clone(),
            CheckoutOptions {
                site_domain: settings.site_domain,
                currency: settings.currency,
                timeout: settings.external_timeout,
            },
        );

        Self {
            users: UserDirectory::new(store.clone()),
            store,
            riders,
            parcels,
            payments,
            tracking,
            notifications,
            identity,
            external_timeout: settings.external_timeout,
            metrics,
        }
    }
}
