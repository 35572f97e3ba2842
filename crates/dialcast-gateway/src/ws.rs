//! WebSocket observer feed.
//!
//! Read-only: every connected client gets the full campaign view list once
//! per scheduler tick. No commands come back over the socket beyond ping.
//!
//! Protocol:
//! ← Server sends: {"type":"connected","version":"..."}
//! ← Server sends: {"type":"campaigns","campaigns":[{projectId,state,...}]}

use std::sync::Arc;

use axum::{
    extract::{
        State,
        ws::{Message, WebSocket, WebSocketUpgrade},
    },
    response::IntoResponse,
};
use tokio::sync::broadcast::error::RecvError;

use super::server::AppState;

/// WebSocket upgrade handler.
pub async fn ws_handler(
    ws: WebSocketUpgrade,
    State(state): State<Arc<AppState>>,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}

async fn handle_socket(mut socket: WebSocket, state: Arc<AppState>) {
    tracing::info!("observer connected");
    let mut feed = state.feed.subscribe();

    let welcome = serde_json::json!({
        "type": "connected",
        "service": "dialcast-gateway",
        "version": env!("CARGO_PKG_VERSION"),
    });
    if send_json(&mut socket, &welcome).await.is_err() {
        return;
    }

    // Immediate snapshot so a fresh client doesn't wait out a tick.
    let snapshot = serde_json::json!({
        "type": "campaigns",
        "campaigns": state.registry.views().await,
    });
    if send_json(&mut socket, &snapshot).await.is_err() {
        return;
    }

    loop {
        tokio::select! {
            views = feed.recv() => match views {
                Ok(views) => {
                    let frame = serde_json::json!({
                        "type": "campaigns",
                        "campaigns": views,
                    });
                    if send_json(&mut socket, &frame).await.is_err() {
                        break;
                    }
                }
                Err(RecvError::Lagged(missed)) => {
                    // Slow client; newer ticks supersede the missed ones.
                    tracing::debug!(missed, "observer lagged behind the feed");
                }
                Err(RecvError::Closed) => break,
            },
            msg = socket.recv() => match msg {
                Some(Ok(Message::Ping(data))) => {
                    let _ = socket.send(Message::Pong(data)).await;
                }
                Some(Ok(Message::Close(_))) | None => break,
                Some(Err(e)) => {
                    tracing::debug!("observer socket error: {e}");
                    break;
                }
                Some(Ok(_)) => {}
            },
        }
    }

    tracing::info!("observer disconnected");
}

async fn send_json(socket: &mut WebSocket, value: &serde_json::Value) -> Result<(), ()> {
    socket
        .send(Message::Text(value.to_string().into()))
        .await
        .map_err(|e| {
            tracing::debug!("WS send failed: {e}");
        })
}
