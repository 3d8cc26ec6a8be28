use crate::server::ServerState;

use pull_recorder_core::LifecycleEvent;

use axum::{
    extract::{
        State,
        ws::{Message, WebSocket, WebSocketUpgrade},
    },
    response::IntoResponse,
};
use tokio::sync::broadcast::{self, error::RecvError};
use tracing::{debug, info, warn};

/// Upgrade to a WebSocket that streams lifecycle events as JSON.
pub(crate) async fn events(
    State(state): State<ServerState>,
    ws: WebSocketUpgrade,
) -> impl IntoResponse {
    let events = state.controller.subscribe();
    ws.on_upgrade(move |socket| forward_events(socket, events))
}

async fn forward_events(mut socket: WebSocket, mut events: broadcast::Receiver<LifecycleEvent>) {
    info!("Event stream client connected");

    loop {
        tokio::select! {
            event = events.recv() => match event {
                Ok(event) => {
                    let json = match serde_json::to_string(&event) {
                        Ok(json) => json,
                        Err(e) => {
                            warn!(error = %e, "Failed to serialize lifecycle event");
                            continue;
                        }
                    };
                    if socket.send(Message::Text(json.into())).await.is_err() {
                        break;
                    }
                }
                Err(RecvError::Lagged(skipped)) => {
                    warn!(skipped, "Event stream client lagging, events dropped");
                }
                Err(RecvError::Closed) => break,
            },

            incoming = socket.recv() => match incoming {
                Some(Ok(Message::Close(_))) | None => break,
                Some(Ok(_)) => {}
                Some(Err(e)) => {
                    debug!(error = %e, "Event stream socket error");
                    break;
                }
            },
        }
    }

    info!("Event stream client disconnected");
}
