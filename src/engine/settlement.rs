use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::Utc;
use dashmap::mapref::entry::Entry;
use serde::Serialize;
use serde_json::json;
use tracing::{info, warn};
use uuid::Uuid;

use crate::engine::notify::NotificationEmitter;
use crate::engine::tracking::{TrackingLedger, PARCEL_PAID};
use crate::error::AppError;
use crate::gateway::{CheckoutRequest, CheckoutSession, PaymentGateway, SessionPaymentStatus};
use crate::models::notification::{NotificationEvent, NotificationKind};
use crate::models::parcel::{DeliveryStatus, PaymentStatus};
use crate::models::payment::Payment;
use crate::models::user::Role;
use crate::observability::metrics::Metrics;
use crate::store::Store;

#[derive(Debug, Clone)]
pub struct CheckoutOptions {
    pub site_domain: String,
    pub currency: String,
    pub timeout: Duration,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CheckoutLink {
    pub session_id: String,
    pub url: String,
}

#[derive(Debug, Clone)]
pub enum Settlement {
    /// This call recorded the payment.
    Recorded(Payment),
    /// The transaction was already recorded; nothing was written.
    AlreadyRecorded(Payment),
    /// The gateway does not report the session as paid.
    NotPaid { session_id: String },
}

impl Settlement {
    fn outcome(&self) -> &'static str {
        match self {
            Settlement::Recorded(_) => "recorded",
            Settlement::AlreadyRecorded(_) => "duplicate",
            Settlement::NotPaid { .. } => "unpaid",
        }
    }
}

/// Reconciles gateway checkout sessions into local payment records.
#[derive(Clone)]
pub struct PaymentReconciliation {
    store: Arc<Store>,
    gateway: Arc<dyn PaymentGateway>,
    ledger: TrackingLedger,
    notifications: NotificationEmitter,
    metrics: Metrics,
    options: CheckoutOptions,
}

impl PaymentReconciliation {
    pub fn new(
        store: Arc<Store>,
        gateway: Arc<dyn PaymentGateway>,
        ledger: TrackingLedger,
        notifications: NotificationEmitter,
        metrics: Metrics,
        options: CheckoutOptions,
    ) -> Self {
        Self {
            store,
            gateway,
            ledger,
            notifications,
            metrics,
            options,
        }
    }

    async fn call_gateway<T, F>(&self, call: F) -> Result<T, AppError>
    where
        F: Future<Output = Result<T, AppError>>,
    {
        tokio::time::timeout(self.options.timeout, call)
            .await
            .map_err(|_| {
                AppError::ExternalService(format!(
                    "payment gateway did not answer within {}ms",
                    self.options.timeout.as_millis()
                ))
            })?
    }

    pub async fn open_checkout(&self, parcel_id: Uuid) -> Result<CheckoutLink, AppError> {
        let parcel = self
            .store
            .find_parcel(&parcel_id)
            .ok_or_else(|| AppError::NotFound(format!("parcel {parcel_id} not found")))?;

        if parcel.payment_status == PaymentStatus::Paid {
            return Err(AppError::Conflict(format!("parcel {parcel_id} is already paid")));
        }
        if parcel.amount <= 0.0 {
            return Err(AppError::Validation(format!("parcel {parcel_id} has nothing to pay")));
        }

        let amount_minor = (parcel.amount * 100.0).round() as i64;
        let request = CheckoutRequest {
            parcel_id,
            parcel_name: parcel.parcel_name.clone(),
            tracking_id: parcel.tracking_id.clone(),
            amount_minor,
            currency: self.options.currency.clone(),
            customer_email: parcel.sender_email.clone(),
            success_url: format!(
                "{}/dashboard/payment-success?success=true&session_id={{CHECKOUT_SESSION_ID}}",
                self.options.site_domain
            ),
            cancel_url: format!("{}/dashboard/my-parcels", self.options.site_domain),
            idempotency_key: format!("checkout-{parcel_id}-{amount_minor}"),
        };

        let session = self
            .call_gateway(self.gateway.create_checkout_session(&request))
            .await?;
        let url = session.url.clone().ok_or_else(|| {
            AppError::ExternalService(format!("checkout session {} has no url", session.id))
        })?;

        info!(parcel_id = %parcel_id, session_id = %session.id, "checkout session opened");
        Ok(CheckoutLink {
            session_id: session.id,
            url,
        })
    }

    /// Idempotent: one payment per gateway transaction, however often this is
    /// called for the same session.
    pub async fn confirm_settlement(&self, session_id: &str) -> Result<Settlement, AppError> {
        let started = Instant::now();
        let result = self.settle(session_id).await;

        let outcome = match &result {
            Ok(settlement) => settlement.outcome(),
            Err(_) => "error",
        };
        self.metrics
            .settlements_total
            .with_label_values(&[outcome])
            .inc();
        self.metrics
            .settlement_latency_seconds
            .with_label_values(&[outcome])
            .observe(started.elapsed().as_secs_f64());

        result
    }

    async fn settle(&self, session_id: &str) -> Result<Settlement, AppError> {
        if session_id.trim().is_empty() {
            return Err(AppError::Validation("session_id is required".to_string()));
        }

        let session = self
            .call_gateway(self.gateway.retrieve_checkout_session(session_id))
            .await?;

        if let Some(existing) = session
            .payment_intent
            .as_deref()
            .and_then(|intent| self.store.payments.get(intent))
        {
            info!(session_id, transaction_id = %existing.transaction_id, "payment already recorded");
            return Ok(Settlement::AlreadyRecorded(existing.clone()));
        }

        if session.payment_status != SessionPaymentStatus::Paid {
            info!(session_id, status = ?session.payment_status, "checkout session not paid");
            return Ok(Settlement::NotPaid {
                session_id: session_id.to_string(),
            });
        }

        let payment = self.payment_from_session(&session)?;

        // The payments map is keyed by transaction id: whoever inserts first
        // owns the side effects below.
        match self.store.payments.entry(payment.transaction_id.clone()) {
            Entry::Occupied(existing) => {
                info!(session_id, transaction_id = %payment.transaction_id, "payment recorded concurrently");
                return Ok(Settlement::AlreadyRecorded(existing.get().clone()));
            }
            Entry::Vacant(slot) => {
                slot.insert(payment.clone());
            }
        }

        match self.store.parcels.get_mut(&payment.parcel_id) {
            Some(mut parcel) => {
                parcel.payment_status = PaymentStatus::Paid;
                if parcel.delivery_status == DeliveryStatus::Pending {
                    parcel.delivery_status = DeliveryStatus::ParcelPaid;
                }
            }
            None => {
                warn!(parcel_id = %payment.parcel_id, transaction_id = %payment.transaction_id, "payment recorded for a parcel that no longer exists");
            }
        }

        info!(
            parcel_id = %payment.parcel_id,
            tracking_id = %payment.tracking_id,
            transaction_id = %payment.transaction_id,
            amount = payment.amount,
            "payment settled"
        );

        self.ledger.record(&payment.tracking_id, PARCEL_PAID);
        self.notifications.emit(NotificationEvent {
            kind: NotificationKind::PaymentReceived,
            title: "Payment received".to_string(),
            message: format!(
                "{} {} received for {}",
                payment.amount, payment.currency, payment.tracking_id
            ),
            for_role: Role::Admin,
            related_id: payment.parcel_id.to_string(),
            tracking_id: Some(payment.tracking_id.clone()),
            metadata: json!({
                "transactionId": payment.transaction_id,
                "amount": payment.amount,
                "currency": payment.currency,
            }),
        });

        Ok(Settlement::Recorded(payment))
    }

    fn payment_from_session(&self, session: &CheckoutSession) -> Result<Payment, AppError> {
        let transaction_id = session.payment_intent.clone().ok_or_else(|| {
            AppError::ExternalService(format!("paid session {} has no payment intent", session.id))
        })?;

        let parcel_id: Uuid = session
            .metadata
            .parcel_id
            .as_deref()
            .ok_or_else(|| AppError::Validation(format!("session {} names no parcel", session.id)))?
            .parse()
            .map_err(|err| AppError::Validation(format!("session {} has a bad parcel id: {err}", session.id)))?;

        let parcel = self
            .store
            .find_parcel(&parcel_id)
            .ok_or_else(|| AppError::NotFound(format!("parcel {parcel_id} not found")))?;

        if let Some(claimed) = session.metadata.tracking_id.as_deref() {
            if claimed != parcel.tracking_id {
                warn!(
                    parcel_id = %parcel_id,
                    claimed,
                    tracking_id = %parcel.tracking_id,
                    "session tracking id disagrees with parcel, keeping the parcel's"
                );
            }
        }

        let amount_total = session.amount_total.ok_or_else(|| {
            AppError::ExternalService(format!("paid session {} has no amount", session.id))
        })?;

        Ok(Payment {
            transaction_id,
            amount: amount_total as f64 / 100.0,
            currency: session
                .currency
                .clone()
                .unwrap_or_else(|| self.options.currency.clone()),
            customer_email: session.customer_email.clone(),
            parcel_id,
            parcel_name: session
                .metadata
                .parcel_name
                .clone()
                .or(Some(parcel.parcel_name)),
            tracking_id: parcel.tracking_id,
            payment_status: PaymentStatus::Paid,
            paid_at: Utc::now(),
        })
    }

    /// Newest first; optionally only one customer's payments.
    pub fn payment_history(&self, customer_email: Option<&str>) -> Vec<Payment> {
        let mut payments: Vec<Payment> = self
            .store
            .payments
            .iter()
            .filter(|entry| {
                customer_email.is_none_or(|email| entry.customer_email.as_deref() == Some(email))
            })
            .map(|entry| entry.value().clone())
            .collect();

        payments.sort_by(|a, b| b.paid_at.cmp(&a.paid_at));
        payments
    }
}
