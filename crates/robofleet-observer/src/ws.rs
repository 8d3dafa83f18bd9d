//! `WebSocket` handler for the live fleet stream.
//!
//! Clients connect to `GET /ws` and receive one text frame per mutator
//! tick, each a complete `{"event":"update","data":{"robots":[...]}}`
//! document. The handler owns a [`Subscription`]; when the client goes
//! away the subscription is dropped and the broadcaster forgets it. When
//! the broadcaster closes, the client gets a close frame.
//!
//! [`Subscription`]: robofleet_core::broadcast::Subscription

use std::sync::Arc;

use axum::extract::ws::{Message, WebSocket};
use axum::extract::{State, WebSocketUpgrade};
use axum::response::IntoResponse;
use robofleet_types::FleetEvent;
use tracing::{debug, warn};

use crate::state::AppState;

/// Upgrade an HTTP request to a `WebSocket` connection and begin
/// streaming fleet snapshots.
///
/// # Route
///
/// `GET /ws`
pub async fn ws_fleet(
    ws: WebSocketUpgrade,
    State(state): State<Arc<AppState>>,
) -> impl IntoResponse {
    ws.on_upgrade(|socket| handle_ws(socket, state))
}

/// Handle the `WebSocket` lifecycle: subscribe to the broadcaster and
/// forward each snapshot as a text frame.
async fn handle_ws(mut socket: WebSocket, state: Arc<AppState>) {
    let mut sub = state.subscribe();
    debug!(subscriber_id = %sub.id(), "WebSocket client connected");

    loop {
        tokio::select! {
            snapshot = sub.recv() => {
                let Some(snapshot) = snapshot else {
                    debug!(subscriber_id = %sub.id(), "Stream ended, closing WebSocket");
                    let _ = socket.send(Message::Close(None)).await;
                    return;
                };
                let json = match serde_json::to_string(&FleetEvent::Update(snapshot)) {
                    Ok(j) => j,
                    Err(e) => {
                        warn!("Failed to serialize fleet update: {e}");
                        continue;
                    }
                };
                if socket.send(Message::Text(json.into())).await.is_err() {
                    debug!(subscriber_id = %sub.id(), "WebSocket client disconnected (send failed)");
                    return;
                }
            }
            msg = socket.recv() => {
                match msg {
                    Some(Ok(Message::Close(_))) | None => {
                        debug!(subscriber_id = %sub.id(), "WebSocket client disconnected");
                        return;
                    }
                    Some(Ok(Message::Ping(data))) => {
                        if socket.send(Message::Pong(data)).await.is_err() {
                            debug!(subscriber_id = %sub.id(), "WebSocket client disconnected (pong failed)");
                            return;
                        }
                    }
                    Some(Err(e)) => {
                        debug!(subscriber_id = %sub.id(), "WebSocket error: {e}");
                        return;
                    }
                    // Clients have nothing to say on this stream.
                    _ => {}
                }
            }
        }
    }
}
