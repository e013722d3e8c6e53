//! WebSocket handler for KYC notifications.

use axum::{
    extract::{
        ws::{Message, WebSocket},
        Path, State, WebSocketUpgrade,
    },
    response::Response,
};
use futures_util::{SinkExt, StreamExt};
use tokio::sync::broadcast::error::RecvError;

use crate::state::AppState;

/// WebSocket upgrade handler for `/kyc/{key}`
pub async fn ws_handler(
    State(state): State<AppState>,
    Path(key): Path<String>,
    ws: WebSocketUpgrade,
) -> Response {
    tracing::info!(%key, "WebSocket connection requested");
    ws.on_upgrade(move |socket| handle_socket(socket, key, state))
}

async fn handle_socket(socket: WebSocket, key: String, state: AppState) {
    let (mut sender, mut receiver) = socket.split();
    let mut events = state.hub.subscribe(&key).await;

    // Task to forward events to the WebSocket
    let forward_key = key.clone();
    let send_task = tokio::spawn(async move {
        loop {
            let event = match events.recv().await {
                Ok(event) => event,
                Err(RecvError::Lagged(skipped)) => {
                    tracing::warn!(key = %forward_key, skipped, "socket lagging, events skipped");
                    continue;
                }
                Err(RecvError::Closed) => break,
            };
            let json = match event.to_json() {
                Ok(json) => json,
                Err(e) => {
                    tracing::error!("Failed to encode event: {}", e);
                    continue;
                }
            };
            if sender.send(Message::Text(json.into())).await.is_err() {
                break;
            }
        }
    });

    // Clients never send anything meaningful; read until they go away.
    while let Some(msg) = receiver.next().await {
        match msg {
            Ok(Message::Close(_)) | Err(_) => break,
            _ => {}
        }
    }

    send_task.abort();
    let _ = send_task.await;
    state.hub.release(&key).await;

    tracing::info!(%key, "WebSocket connection closed");
}
