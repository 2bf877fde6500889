use std::sync::Arc;

use parcel_dispatch::api;
use parcel_dispatch::auth::FirebaseIdentityProvider;
use parcel_dispatch::config::{Config, LogFormat};
use parcel_dispatch::error::AppError;
use parcel_dispatch::gateway::StripeGateway;
use parcel_dispatch::state::{AppState, Settings};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<(), AppError> {
    let config = Config::from_env()?;

    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(config.log_level.clone()))
        .with_target(false);
    match config.log_format {
        LogFormat::Json => subscriber.json().init(),
        LogFormat::Compact => subscriber.compact().init(),
    }

    let gateway = StripeGateway::new(
        &config.stripe_api_base,
        &config.stripe_key,
        config.external_timeout,
    )?;
    let identity = FirebaseIdentityProvider::new(
        &config.identity_api_base,
        config.identity.clone(),
        config.external_timeout,
    )?;
    tracing::info!(project_id = %config.identity.project_id, "identity provider configured");

    let state = Arc::new(AppState::new(
        Settings::from_config(&config),
        Arc::new(gateway),
        Arc::new(identity),
    ));
    let app = api::rest::router(state);

    let bind_addr = format!("0.0.0.0:{}", config.http_port);
    let listener = tokio::net::TcpListener::bind(&bind_addr)
        .await
        .map_err(|err| AppError::Internal(format!("failed to bind {bind_addr}: {err}")))?;

    tracing::info!(http_port = config.http_port, "http server started");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .map_err(|err| AppError::Internal(format!("server error: {err}")))?;

    Ok(())
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %err, "failed to listen for shutdown signal");
    }
}
