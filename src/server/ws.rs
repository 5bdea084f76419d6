//! WebSocket endpoints bridging progress events to clients

use std::sync::Arc;

use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        Path, State,
    },
    response::Response,
};
use futures::{SinkExt, StreamExt};
use serde_json::json;
use tokio::sync::mpsc;
use tracing::debug;

use crate::progress::ProgressHub;

use super::state::AppState;

/// Subscribe to one training session's progress
pub async fn training_session(
    ws: WebSocketUpgrade,
    Path(session_id): Path<String>,
    State(state): State<Arc<AppState>>,
) -> Response {
    let hub = Arc::clone(&state.hub);
    ws.on_upgrade(move |socket| bridge(socket, hub, Some(session_id)))
}

/// Connection that only receives broadcasts
pub async fn global(ws: WebSocketUpgrade, State(state): State<Arc<AppState>>) -> Response {
    let hub = Arc::clone(&state.hub);
    ws.on_upgrade(move |socket| bridge(socket, hub, None))
}

/// Forward hub messages to the socket until either side closes
async fn bridge(socket: WebSocket, hub: Arc<ProgressHub>, session_id: Option<String>) {
    let (tx, mut rx) = mpsc::unbounded_channel::<String>();
    let id = hub.subscribe(tx, session_id.as_deref());
    let (mut sink, mut stream) = socket.split();

    let hello = json!({
        "type": "connection",
        "status": "connected",
        "session_id": session_id,
    });
    if sink.send(Message::Text(hello.to_string())).await.is_err() {
        hub.unsubscribe(id);
        return;
    }

    loop {
        tokio::select! {
            outgoing = rx.recv() => match outgoing {
                Some(text) => {
                    if sink.send(Message::Text(text)).await.is_err() {
                        break;
                    }
                }
                None => break,
            },
            incoming = stream.next() => match incoming {
                Some(Ok(Message::Ping(payload))) => {
                    if sink.send(Message::Pong(payload)).await.is_err() {
                        break;
                    }
                }
                Some(Ok(Message::Text(text))) if text.trim() == "ping" => {
                    if sink.send(Message::Text("pong".to_string())).await.is_err() {
                        break;
                    }
                }
                Some(Ok(Message::Close(_))) | Some(Err(_)) | None => break,
                Some(Ok(_)) => {}
            },
        }
    }

    hub.unsubscribe(id);
    debug!(connection = id, session = ?session_id, "WebSocket closed");
}
