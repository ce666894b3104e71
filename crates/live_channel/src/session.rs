//! WebSocket client session.
//!
//! Each upgraded connection arrives already admitted to the
//! [`ClientRegistry`] and gets a forward task that writes queued frames to the socket. The session
//! ends when the client closes, the socket errors, or the registry drops the
//! client's queue.

use crate::{ClientHandle, ClientRegistry, LiveMessage};
use axum::extract::ws::{Message, WebSocket};
use futures::{SinkExt, StreamExt};
use std::sync::Arc;
use tracing::{debug, info, warn};

pub struct ClientSession {
    registry: Arc<ClientRegistry>,
    handle: ClientHandle,
}

impl ClientSession {
    pub fn new(registry: Arc<ClientRegistry>, handle: ClientHandle) -> Self {
        Self { registry, handle }
    }

    /// Run the session, handling frames until disconnect
    pub async fn run(self, socket: WebSocket) {
        let client_id = self.handle.id;
        let mut outbound = self.handle.receiver;
        info!(client_id = %client_id, "live session started");

        let greeting = LiveMessage::connection(self.registry.client_count().await);
        if let Err(e) = self.registry.send_to(client_id, &greeting).await {
            warn!(client_id = %client_id, error = %e, "failed to queue greeting");
        }

        let (mut ws_tx, mut ws_rx) = socket.split();

        let mut ws_forward = tokio::spawn(async move {
            while let Some(json) = outbound.recv().await {
                if ws_tx.send(Message::Text(json)).await.is_err() {
                    debug!(client_id = %client_id, "WebSocket send failed, closing");
                    return;
                }
            }
            // Queue dropped by the registry
            let _ = ws_tx.send(Message::Close(None)).await;
        });

        loop {
            tokio::select! {
                _ = &mut ws_forward => {
                    debug!(client_id = %client_id, "outbound queue closed");
                    break;
                }
                frame = ws_rx.next() => match frame {
                    Some(Ok(Message::Close(_))) | None => {
                        info!(client_id = %client_id, "client closed connection");
                        break;
                    }
                    Some(Ok(Message::Ping(_))) => {
                        // Axum handles pong automatically
                    }
                    Some(Ok(_)) => {
                        debug!(client_id = %client_id, "ignoring inbound frame");
                    }
                    Some(Err(e)) => {
                        warn!(client_id = %client_id, error = %e, "WebSocket error");
                        break;
                    }
                }
            }
        }

        self.registry.unregister(client_id).await;
        ws_forward.abort();
        info!(client_id = %client_id, "live session ended");
    }
}
