use std::sync::Arc;

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::State;
use axum::response::IntoResponse;
use futures::SinkExt;
use futures::StreamExt;
use tokio::sync::broadcast::error::RecvError;
use tracing::{info, warn};

use crate::auth::{authorize, Caller, Capability};
use crate::error::AppError;
use crate::state::AppState;

/// Live admin inbox. Each text frame is one serialized notification.
pub async fn ws_handler(
    ws: WebSocketUpgrade,
    State(state): State<Arc<AppState>>,
    caller: Caller,
) -> Result<impl IntoResponse, AppError> {
    authorize(Capability::Admin, &caller)?;
    Ok(ws.on_upgrade(move |socket| handle_socket(socket, state, caller.email)))
}

async fn handle_socket(socket: WebSocket, state: Arc<AppState>, email: String) {
    let (mut sender, mut receiver) = socket.split();
    let mut rx = state.notifications.subscribe();

    info!(email = %email, "notification stream connected");

    let send_task = tokio::spawn(async move {
        loop {
            let notification = match rx.recv().await {
                Ok(notification) => notification,
                Err(RecvError::Lagged(skipped)) => {
                    warn!(skipped, "notification stream lagged");
                    continue;
                }
                Err(RecvError::Closed) => break,
            };

            let json = match serde_json::to_string(&notification) {
                Ok(json) => json,
                Err(err) => {
                    warn!(error = %err, "failed to serialize notification for ws");
                    continue;
                }
            };

            if sender.send(Message::Text(json)).await.is_err() {
                break;
            }
        }
    });

    let recv_task = tokio::spawn(async move {
        while let Some(Ok(_msg)) = receiver.next().await {}
    });

    tokio::select! {
        _ = send_task => {},
        _ = recv_task => {},
    }

    info!(email = %email, "notification stream disconnected");
}
