//! Caller identity and the authorization policy evaluated before any
//! lifecycle operation.

pub mod firebase;

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use axum::extract::FromRequestParts;
use axum::http::header::AUTHORIZATION;
use axum::http::request::Parts;
use tracing::warn;

use crate::error::AppError;
use crate::models::user::Role;
use crate::state::AppState;

pub use firebase::FirebaseIdentityProvider;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VerifiedIdentity {
    pub email: String,
}

/// Turns a bearer token into a verified identity. Verification itself belongs
/// to the external provider.
#[async_trait]
pub trait IdentityProvider: Send + Sync {
    async fn verify(&self, token: &str) -> Result<VerifiedIdentity, AppError>;
}

/// Fixed token table, for tests and local runs.
#[derive(Debug, Clone, Default)]
pub struct StaticIdentityProvider {
    tokens: HashMap<String, String>,
}

impl StaticIdentityProvider {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_token(mut self, token: &str, email: &str) -> Self {
        self.tokens.insert(token.to_string(), email.to_string());
        self
    }
}

#[async_trait]
impl IdentityProvider for StaticIdentityProvider {
    async fn verify(&self, token: &str) -> Result<VerifiedIdentity, AppError> {
        self.tokens
            .get(token)
            .map(|email| VerifiedIdentity {
                email: email.clone(),
            })
            .ok_or(AppError::Unauthorized)
    }
}

/// The authenticated caller. `role` is `None` when the email has no user
/// document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Caller {
    pub email: String,
    pub role: Option<Role>,
}

impl Caller {
    pub fn is_admin(&self) -> bool {
        self.role == Some(Role::Admin)
    }
}

#[derive(Debug, Clone, Copy)]
pub enum Capability<'a> {
    Admin,
    Rider,
    Owner(&'a str),
}

pub fn authorize(capability: Capability<'_>, caller: &Caller) -> Result<(), AppError> {
    let allowed = match capability {
        Capability::Admin => caller.role == Some(Role::Admin),
        Capability::Rider => caller.role == Some(Role::Rider),
        Capability::Owner(email) => caller.email.eq_ignore_ascii_case(email.trim()),
    };

    if allowed {
        Ok(())
    } else {
        warn!(email = %caller.email, capability = ?capability, "authorization denied");
        Err(AppError::Forbidden)
    }
}

/// Owner of the resource, or an admin acting on their behalf.
pub fn authorize_owner_or_admin(owner: &str, caller: &Caller) -> Result<(), AppError> {
    if caller.is_admin() {
        return Ok(());
    }
    authorize(Capability::Owner(owner), caller)
}

fn bearer_token(header: &str) -> Option<&str> {
    let (scheme, token) = header.split_once(' ')?;
    let token = token.trim();
    (scheme.eq_ignore_ascii_case("bearer") && !token.is_empty()).then_some(token)
}

#[async_trait]
impl FromRequestParts<Arc<AppState>> for Caller {
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &Arc<AppState>,
    ) -> Result<Self, Self::Rejection> {
        if let Some(caller) = parts.extensions.get::<Caller>() {
            return Ok(caller.clone());
        }

        let Some(token) = parts
            .headers
            .get(AUTHORIZATION)
            .and_then(|value| value.to_str().ok())
            .and_then(bearer_token)
        else {
            warn!(uri = %parts.uri, "missing bearer token");
            return Err(AppError::Unauthorized);
        };

        let identity = tokio::time::timeout(state.external_timeout, state.identity.verify(token))
            .await
            .map_err(|_| AppError::ExternalService("identity provider timed out".to_string()))??;

        let email = identity.email.trim().to_lowercase();
        let caller = Caller {
            role: state.users.role_of(&email),
            email,
        };

        parts.extensions.insert(caller.clone());
        Ok(caller)
    }
}
