use std::time::Duration;

use async_trait::async_trait;
use reqwest::StatusCode;
use serde::Deserialize;
use serde_json::json;

use crate::auth::{IdentityProvider, VerifiedIdentity};
use crate::config::IdentityCredentials;
use crate::error::AppError;

/// Verifies ID tokens through the identity toolkit `accounts:lookup` endpoint.
#[derive(Debug, Clone)]
pub struct FirebaseIdentityProvider {
    client: reqwest::Client,
    api_base: String,
    credentials: IdentityCredentials,
}

#[derive(Debug, Deserialize)]
struct LookupResponse {
    #[serde(default)]
    users: Vec<LookupUser>,
}

#[derive(Debug, Deserialize)]
struct LookupUser {
    email: Option<String>,
}

impl FirebaseIdentityProvider {
    pub fn new(
        api_base: &str,
        credentials: IdentityCredentials,
        timeout: Duration,
    ) -> Result<Self, AppError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|err| AppError::Internal(format!("failed to build identity client: {err}")))?;

        Ok(Self {
            client,
            api_base: api_base.trim_end_matches('/').to_string(),
            credentials,
        })
    }
}

#[async_trait]
impl IdentityProvider for FirebaseIdentityProvider {
    async fn verify(&self, token: &str) -> Result<VerifiedIdentity, AppError> {
        let response = self
            .client
            .post(format!("{}/v1/accounts:lookup", self.api_base))
            .query(&[("key", self.credentials.api_key.as_str())])
            .json(&json!({ "idToken": token }))
            .send()
            .await?;

        match response.status() {
            status if status.is_success() => {}
            StatusCode::BAD_REQUEST | StatusCode::UNAUTHORIZED => {
                return Err(AppError::Unauthorized);
            }
            status => {
                return Err(AppError::ExternalService(format!(
                    "identity provider returned {status}"
                )));
            }
        }

        let lookup: LookupResponse = response.json().await?;
        lookup
            .users
            .into_iter()
            .find_map(|user| user.email)
            .map(|email| VerifiedIdentity { email })
            .ok_or(AppError::Unauthorized)
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use serde_json::json;
    use wiremock::matchers::{body_json, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    use super::FirebaseIdentityProvider;
    use crate::auth::IdentityProvider;
    use crate::config::IdentityCredentials;
    use crate::error::AppError;

    fn provider(server: &MockServer) -> FirebaseIdentityProvider {
        FirebaseIdentityProvider::new(
            &server.uri(),
            IdentityCredentials {
                project_id: "zap-shift".to_string(),
                api_key: "key-123".to_string(),
            },
            Duration::from_secs(5),
        )
        .unwrap()
    }

    #[tokio::test]
    async fn valid_token_resolves_email() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/accounts:lookup"))
            .and(query_param("key", "key-123"))
            .and(body_json(json!({ "idToken": "token-1" })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "kind": "identitytoolkit#GetAccountInfoResponse",
                "users": [{ "localId": "u1", "email": "a@x.com" }]
            })))
            .mount(&server)
            .await;

        let identity = provider(&server).verify("token-1").await.unwrap();
        assert_eq!(identity.email, "a@x.com");
    }

    #[tokio::test]
    async fn rejected_token_is_unauthorized() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/accounts:lookup"))
            .respond_with(ResponseTemplate::new(400).set_body_json(json!({
                "error": { "message": "INVALID_ID_TOKEN" }
            })))
            .mount(&server)
            .await;

        let err = provider(&server).verify("bad").await.unwrap_err();
        assert!(matches!(err, AppError::Unauthorized));
    }

    #[tokio::test]
    async fn provider_outage_is_an_external_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/accounts:lookup"))
            .respond_with(ResponseTemplate::new(503))
            .mount(&server)
            .await;

        let err = provider(&server).verify("token-1").await.unwrap_err();
        assert!(matches!(err, AppError::ExternalService(_)));
    }
}
