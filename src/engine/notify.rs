use std::sync::Arc;

use chrono::Utc;
use tokio::sync::broadcast;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::error::AppError;
use crate::models::notification::{Notification, NotificationEvent};
use crate::observability::metrics::Metrics;
use crate::store::Store;

/// Fans domain events out to the admin inbox and to live subscribers.
#[derive(Clone)]
pub struct NotificationEmitter {
    store: Arc<Store>,
    events_tx: broadcast::Sender<Notification>,
    metrics: Metrics,
}

impl NotificationEmitter {
    pub fn new(store: Arc<Store>, buffer_size: usize, metrics: Metrics) -> Self {
        let (events_tx, _unused_rx) = broadcast::channel(buffer_size.max(1));
        Self {
            store,
            events_tx,
            metrics,
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<Notification> {
        self.events_tx.subscribe()
    }

    /// Best-effort: producers never see a failure from here.
    pub fn emit(&self, event: NotificationEvent) {
        match self.try_emit(event) {
            Ok(notification) => {
                debug!(notification_id = %notification.id, kind = ?notification.kind, "notification emitted");
                if let Err(err) = self.events_tx.send(notification) {
                    debug!(notification_id = %err.0.id, "no live notification subscribers");
                }
            }
            Err(err) => {
                warn!(error = %err, "notification dropped");
                self.metrics
                    .side_effect_failures_total
                    .with_label_values(&["notification"])
                    .inc();
            }
        }
    }

    fn try_emit(&self, event: NotificationEvent) -> Result<Notification, AppError> {
        if event.title.trim().is_empty() {
            return Err(AppError::Validation("notification title is empty".to_string()));
        }

        let notification = Notification {
            id: Uuid::new_v4(),
            kind: event.kind,
            title: event.title,
            message: event.message,
            for_role: event.for_role,
            related_id: event.related_id,
            tracking_id: event.tracking_id,
            metadata: event.metadata,
            is_read: false,
            created_at: Utc::now(),
            read_at: None,
        };

        self.store
            .notifications
            .insert(notification.id, notification.clone());
        Ok(notification)
    }

    /// Inbox listing, newest first.
    pub fn list(&self, unread_only: bool) -> Vec<Notification> {
        let mut notifications: Vec<Notification> = self
            .store
            .notifications
            .iter()
            .filter(|entry| !unread_only || !entry.value().is_read)
            .map(|entry| entry.value().clone())
            .collect();

        notifications.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        notifications
    }

    pub fn mark_read(&self, id: Uuid) -> Result<Notification, AppError> {
        let mut notification = self
            .store
            .notifications
            .get_mut(&id)
            .ok_or_else(|| AppError::NotFound(format!("notification {id} not found")))?;

        if !notification.is_read {
            notification.is_read = true;
            notification.read_at = Some(Utc::now());
        }

        Ok(notification.clone())
    }

    pub fn mark_all_read(&self) -> usize {
        let now = Utc::now();
        let mut updated = 0;

        for mut entry in self.store.notifications.iter_mut() {
            if !entry.is_read {
                entry.is_read = true;
                entry.read_at = Some(now);
                updated += 1;
            }
        }

        updated
    }
}
