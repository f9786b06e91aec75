//! WebSocket upgrade and the bridge between a socket and its session actor.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use axum::extract::ws::{Message as WsMessage, WebSocket, WebSocketUpgrade};
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use tokio::sync::mpsc;
use uuid::Uuid;

use crate::api::state::AppState;
use crate::services::Services;
use crate::session::run_session;

/// A reserved place under the connection cap, released on drop.
pub struct ConnectionSlot {
    counter: Arc<AtomicUsize>,
}

impl ConnectionSlot {
    /// Reserve a slot, or `None` when `max` are already taken.
    pub fn acquire(counter: &Arc<AtomicUsize>, max: usize) -> Option<Self> {
        let previous = counter.fetch_add(1, Ordering::AcqRel);
        if previous >= max {
            counter.fetch_sub(1, Ordering::AcqRel);
            return None;
        }
        Some(ConnectionSlot { counter: counter.clone() })
    }
}

impl Drop for ConnectionSlot {
    fn drop(&mut self) {
        self.counter.fetch_sub(1, Ordering::AcqRel);
    }
}

/// The client side of a session as the bridge sees it.
#[async_trait::async_trait]
pub trait ClientSocket: Send {
    /// Next text payload, or `None` once the client has gone away.
    async fn next_text(&mut self) -> Option<String>;
    /// Returns false when the client can no longer be written to.
    async fn send_text(&mut self, text: String) -> bool;
}

#[async_trait::async_trait]
impl ClientSocket for WebSocket {
    async fn next_text(&mut self) -> Option<String> {
        loop {
            match self.recv().await? {
                Ok(WsMessage::Text(text)) => return Some(text),
                Ok(WsMessage::Ping(data)) => {
                    let _ = self.send(WsMessage::Pong(data)).await;
                }
                Ok(WsMessage::Close(_)) => return None,
                Ok(_) => {}
                Err(e) => {
                    tracing::debug!("websocket error: {}", e);
                    return None;
                }
            }
        }
    }

    async fn send_text(&mut self, text: String) -> bool {
        self.send(WsMessage::Text(text)).await.is_ok()
    }
}

pub async fn ws_handler(ws: WebSocketUpgrade, State(state): State<AppState>) -> Response {
    let max = state.config.max_ws_connections;
    let Some(slot) = ConnectionSlot::acquire(&state.ws_connections, max) else {
        let body = serde_json::json!({
            "error": format!("too many WebSocket connections (max {})", max),
        });
        return (StatusCode::SERVICE_UNAVAILABLE, axum::Json(body)).into_response();
    };

    ws.on_upgrade(move |socket| async move {
        let capacity = state.config.session_queue_capacity;
        serve_client(socket, state.services.clone(), Uuid::new_v4().to_string(), capacity).await;
        drop(slot);
    })
    .into_response()
}

/// Run a session actor for `socket` until either side closes, then wait for
/// the actor's teardown.
///
/// The socket is only read while the actor's inbound queue has room for the
/// last payload read, and the actor's output is drained the whole time, so a
/// client that writes faster than the actor answers is slowed down rather
/// than wedging both queues.
pub async fn serve_client<S: ClientSocket>(mut socket: S, services: Services, token: String, capacity: usize) {
    let capacity = capacity.max(1);
    let (in_tx, in_rx) = mpsc::channel::<String>(capacity);
    let (out_tx, mut out_rx) = mpsc::channel::<String>(capacity);
    let session = tokio::spawn(run_session(services, token.clone(), in_rx, out_tx));

    let mut pending: Option<String> = None;
    loop {
        tokio::select! {
            // Replies and notifications from the session actor
            outgoing = out_rx.recv() => {
                match outgoing {
                    Some(text) => {
                        if !socket.send_text(text).await {
                            break; // client disconnected
                        }
                    }
                    None => break,
                }
            }
            permit = in_tx.reserve(), if pending.is_some() => {
                match permit {
                    Ok(permit) => {
                        if let Some(text) = pending.take() {
                            permit.send(text);
                        }
                    }
                    Err(_) => break,
                }
            }
            incoming = socket.next_text(), if pending.is_none() => {
                match incoming {
                    Some(text) => pending = Some(text),
                    None => break,
                }
            }
        }
    }

    // Closing the inbound queue ends the actor, which runs its teardown.
    drop(in_tx);
    drop(out_rx);
    if let Err(e) = session.await {
        tracing::error!(token = %token, "session task failed: {}", e);
    }
}
