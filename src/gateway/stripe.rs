use std::time::Duration;

use async_trait::async_trait;
use reqwest::StatusCode;
use serde::Deserialize;
use tracing::debug;

use crate::error::AppError;
use crate::gateway::{CheckoutRequest, CheckoutSession, PaymentGateway};

/// Checkout-session client for the Stripe REST API.
#[derive(Debug, Clone)]
pub struct StripeGateway {
    client: reqwest::Client,
    api_base: String,
    secret_key: String,
}

#[derive(Debug, Deserialize)]
struct ErrorEnvelope {
    error: ErrorBody,
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    message: Option<String>,
}

impl StripeGateway {
    pub fn new(api_base: &str, secret_key: &str, timeout: Duration) -> Result<Self, AppError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|err| AppError::Internal(format!("failed to build gateway client: {err}")))?;

        Ok(Self {
            client,
            api_base: api_base.trim_end_matches('/').to_string(),
            secret_key: secret_key.to_string(),
        })
    }

    fn sessions_url(&self) -> String {
        format!("{}/v1/checkout/sessions", self.api_base)
    }

    async fn decode(response: reqwest::Response) -> Result<CheckoutSession, AppError> {
        let status = response.status();
        if status.is_success() {
            return Ok(response.json::<CheckoutSession>().await?);
        }

        let message = match response.json::<ErrorEnvelope>().await {
            Ok(envelope) => envelope.error.message.unwrap_or_else(|| status.to_string()),
            Err(_) => status.to_string(),
        };

        if status == StatusCode::NOT_FOUND {
            Err(AppError::NotFound(format!("checkout session not found: {message}")))
        } else {
            Err(AppError::ExternalService(format!(
                "payment gateway returned {status}: {message}"
            )))
        }
    }
}

fn checkout_form(request: &CheckoutRequest) -> Vec<(&'static str, String)> {
    vec![
        ("mode", "payment".to_string()),
        ("line_items[0][quantity]", "1".to_string()),
        ("line_items[0][price_data][currency]", request.currency.clone()),
        ("line_items[0][price_data][unit_amount]", request.amount_minor.to_string()),
        ("line_items[0][price_data][product_data][name]", request.parcel_name.clone()),
        ("metadata[parcelId]", request.parcel_id.to_string()),
        ("metadata[parcelName]", request.parcel_name.clone()),
        ("metadata[trackingId]", request.tracking_id.clone()),
        ("customer_email", request.customer_email.clone()),
        ("success_url", request.success_url.clone()),
        ("cancel_url", request.cancel_url.clone()),
    ]
}

#[async_trait]
impl PaymentGateway for StripeGateway {
    async fn create_checkout_session(
        &self,
        request: &CheckoutRequest,
    ) -> Result<CheckoutSession, AppError> {
        debug!(parcel_id = %request.parcel_id, amount_minor = request.amount_minor, "creating checkout session");

        let response = self
            .client
            .post(self.sessions_url())
            .bearer_auth(&self.secret_key)
            .header("Idempotency-Key", &request.idempotency_key)
            .form(&checkout_form(request))
            .send()
            .await?;

        Self::decode(response).await
    }

    async fn retrieve_checkout_session(
        &self,
        session_id: &str,
    ) -> Result<CheckoutSession, AppError> {
        if session_id.is_empty() || !session_id.chars().all(|c| c.is_ascii_alphanumeric() || c == '_') {
            return Err(AppError::Validation(format!("invalid session id {session_id:?}")));
        }

        let response = self
            .client
            .get(format!("{}/{session_id}", self.sessions_url()))
            .bearer_auth(&self.secret_key)
            .send()
            .await?;

        Self::decode(response).await
    }
}
