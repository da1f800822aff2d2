//! WebSocket chat relay
//!
//! One socket per client. Outgoing frames come from the shared broadcast
//! channel; incoming frames are validated against the sessions table,
//! persisted, and rebroadcast to everyone (sender included).

use std::sync::Arc;

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::State;
use axum::response::Response;
use futures_util::{SinkExt, StreamExt};
use tokio::sync::broadcast;
use tracing::{debug, info, warn};

use tavern_core::{ChatMessage, MessageRepository, UserRepository};
use tavern_net::protocol::{ClientFrame, WireMessage};

use crate::state::AppState;

/// Maximum accepted message content length in bytes
const MAX_CONTENT_BYTES: usize = 4 * 1024;

/// Upgrade handler for `GET /ws`
pub async fn upgrade(ws: WebSocketUpgrade, State(state): State<Arc<AppState>>) -> Response {
    ws.on_upgrade(move |socket| handle_connection(socket, state))
}

/// Handle a single client connection
async fn handle_connection(socket: WebSocket, state: Arc<AppState>) {
    let (mut sender, mut receiver) = socket.split();
    let mut rx = state.chat_tx.subscribe();

    info!("Chat client connected");

    // Writer task: forward broadcast frames to this socket
    let writer = tokio::spawn(async move {
        loop {
            match rx.recv().await {
                Ok(frame) => {
                    if sender.send(Message::Text(frame.into())).await.is_err() {
                        break;
                    }
                }
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    // Slow consumer: skip what was missed and keep going
                    warn!(skipped, "Chat receiver lagging");
                }
                Err(broadcast::error::RecvError::Closed) => break,
            }
        }
    });

    // Read loop: validate, persist, rebroadcast
    while let Some(incoming) = receiver.next().await {
        match incoming {
            Ok(Message::Text(text)) => handle_frame(&text, &state),
            Ok(Message::Close(_)) => break,
            Ok(_) => {}
            Err(e) => {
                debug!(error = %e, "Read error");
                break;
            }
        }
    }

    writer.abort();
    info!("Chat client disconnected");
}

/// Process one inbound frame; invalid frames are dropped
fn handle_frame(text: &str, state: &AppState) {
    let frame: ClientFrame = match serde_json::from_str(text) {
        Ok(frame) => frame,
        Err(e) => {
            warn!(error = %e, "Failed to parse chat frame");
            return;
        }
    };

    if frame.content.is_empty() || frame.content.len() > MAX_CONTENT_BYTES {
        warn!(
            bytes = frame.content.len(),
            "Dropping frame with invalid content length"
        );
        return;
    }

    let db = state.db.lock().unwrap();
    let user = match db.find_user_by_session(&frame.session_token) {
        Ok(Some(user)) => user,
        Ok(None) => {
            warn!("Dropping frame with invalid session token");
            return;
        }
        Err(e) => {
            warn!(error = %e, "Session lookup failed");
            return;
        }
    };

    let message = ChatMessage::new(user.id, frame.content);
    if let Err(e) = db.create_message(&message) {
        warn!(user_id = %user.id, error = %e, "Failed to persist message");
        return;
    }
    drop(db);

    let wire = WireMessage {
        username: user.username,
        content: message.content,
    };
    match serde_json::to_string(&wire) {
        Ok(json) => {
            // Err only means nobody is connected to receive it
            let _ = state.chat_tx.send(json);
        }
        Err(e) => warn!(error = %e, "Failed to serialize broadcast frame"),
    }
}
