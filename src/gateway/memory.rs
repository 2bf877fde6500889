use std::sync::Arc;

use async_trait::async_trait;
use dashmap::DashMap;
use uuid::Uuid;

use crate::error::AppError;
use crate::gateway::{
    CheckoutRequest, CheckoutSession, PaymentGateway, SessionMetadata, SessionPaymentStatus,
};

/// Gateway kept in memory, for tests and local runs without gateway keys.
#[derive(Debug, Clone, Default)]
pub struct InMemoryGateway {
    sessions: Arc<DashMap<String, CheckoutSession>>,
    idempotency_keys: Arc<DashMap<String, String>>,
}

impl InMemoryGateway {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert_session(&self, session: CheckoutSession) {
        self.sessions.insert(session.id.clone(), session);
    }

    /// Simulates the customer paying: the session becomes `paid` under the
    /// given payment intent.
    pub fn complete_payment(&self, session_id: &str, payment_intent: &str) -> Result<(), AppError> {
        let mut session = self
            .sessions
            .get_mut(session_id)
            .ok_or_else(|| AppError::NotFound(format!("checkout session {session_id} not found")))?;

        session.payment_status = SessionPaymentStatus::Paid;
        session.payment_intent = Some(payment_intent.to_string());
        Ok(())
    }

    pub fn session_count(&self) -> usize {
        self.sessions.len()
    }
}

#[async_trait]
impl PaymentGateway for InMemoryGateway {
    async fn create_checkout_session(
        &self,
        request: &CheckoutRequest,
    ) -> Result<CheckoutSession, AppError> {
        if let Some(existing_id) = self.idempotency_keys.get(&request.idempotency_key) {
            if let Some(session) = self.sessions.get(existing_id.value()) {
                return Ok(session.clone());
            }
        }

        let id = format!("cs_test_{}", Uuid::new_v4().simple());
        let session = CheckoutSession {
            url: Some(format!("https://checkout.local/pay/{id}")),
            id: id.clone(),
            payment_status: SessionPaymentStatus::Unpaid,
            payment_intent: None,
            amount_total: Some(request.amount_minor),
            currency: Some(request.currency.clone()),
            customer_email: Some(request.customer_email.clone()),
            metadata: SessionMetadata {
                parcel_id: Some(request.parcel_id.to_string()),
                parcel_name: Some(request.parcel_name.clone()),
                tracking_id: Some(request.tracking_id.clone()),
            },
        };

        self.sessions.insert(id.clone(), session.clone());
        self.idempotency_keys
            .insert(request.idempotency_key.clone(), id);
        Ok(session)
    }

    async fn retrieve_checkout_session(
        &self,
        session_id: &str,
    ) -> Result<CheckoutSession, AppError> {
        self.sessions
            .get(session_id)
            .map(|session| session.clone())
            .ok_or_else(|| AppError::NotFound(format!("checkout session {session_id} not found")))
    }
}
