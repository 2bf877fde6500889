use std::env;
use std::time::Duration;

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use serde::Deserialize;

use crate::error::AppError;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LogFormat {
    Compact,
    Json,
}

/// Decoded identity-provider service credentials.
#[derive(Debug, Clone, Deserialize)]
pub struct IdentityCredentials {
    pub project_id: String,
    pub api_key: String,
}

#[derive(Debug, Clone)]
pub struct Config {
    pub http_port: u16,
    pub log_level: String,
    pub log_format: LogFormat,
    pub stripe_key: String,
    pub stripe_api_base: String,
    pub site_domain: String,
    pub currency: String,
    pub identity: IdentityCredentials,
    pub identity_api_base: String,
    pub external_timeout: Duration,
    pub tracking_suffix_len: usize,
    pub notification_buffer_size: usize,
}

impl Config {
    pub fn from_env() -> Result<Self, AppError> {
        let _ = dotenvy::dotenv();
        Self::from_lookup(|key| env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self, AppError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let tracking_suffix_len = parse_or_default(&lookup, "TRACKING_SUFFIX_LEN", 6usize)?;
        if !(4..=6).contains(&tracking_suffix_len) {
            return Err(AppError::Internal(format!(
                "invalid TRACKING_SUFFIX_LEN: {tracking_suffix_len} (expected 4..=6)"
            )));
        }

        let log_format = match lookup("LOG_FORMAT").as_deref() {
            Some("json") => LogFormat::Json,
            Some("compact") | None => LogFormat::Compact,
            Some(other) => {
                return Err(AppError::Internal(format!("invalid LOG_FORMAT: {other}")));
            }
        };

        let timeout_ms: u64 = parse_or_default(&lookup, "EXTERNAL_TIMEOUT_MS", 10_000)?;

        Ok(Self {
            http_port: parse_or_default(&lookup, "PORT", 5000)?,
            log_level: lookup("LOG_LEVEL").unwrap_or_else(|| "info".to_string()),
            log_format,
            stripe_key: required(&lookup, "STRIPE_KEY")?,
            stripe_api_base: lookup("STRIPE_API_BASE")
                .unwrap_or_else(|| "https://api.stripe.com".to_string()),
            site_domain: required(&lookup, "SITE_DOMAIN")?
                .trim_end_matches('/')
                .to_string(),
            currency: lookup("CURRENCY").unwrap_or_else(|| "bdt".to_string()),
            identity: decode_credentials(&required(&lookup, "FB_SERVICE_KEY")?)?,
            identity_api_base: lookup("IDENTITY_API_BASE")
                .unwrap_or_else(|| "https://identitytoolkit.googleapis.com".to_string()),
            external_timeout: Duration::from_millis(timeout_ms),
            tracking_suffix_len,
            notification_buffer_size: parse_or_default(&lookup, "NOTIFICATION_BUFFER_SIZE", 1024)?,
        })
    }
}

fn required<F>(lookup: &F, key: &str) -> Result<String, AppError>
where
    F: Fn(&str) -> Option<String>,
{
    lookup(key)
        .filter(|value| !value.trim().is_empty())
        .ok_or_else(|| AppError::Internal(format!("missing required {key}")))
}

fn parse_or_default<F, T>(lookup: &F, key: &str, default: T) -> Result<T, AppError>
where
    F: Fn(&str) -> Option<String>,
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    match lookup(key) {
        Some(raw) => raw
            .parse::<T>()
            .map_err(|err| AppError::Internal(format!("invalid {key}: {err}"))),
        None => Ok(default),
    }
}

fn decode_credentials(encoded: &str) -> Result<IdentityCredentials, AppError> {
    let bytes = STANDARD
        .decode(encoded.trim())
        .map_err(|err| AppError::Internal(format!("FB_SERVICE_KEY is not base64: {err}")))?;

    serde_json::from_slice(&bytes)
        .map_err(|err| AppError::Internal(format!("FB_SERVICE_KEY is not valid credentials: {err}")))
}
