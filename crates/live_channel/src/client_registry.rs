use crate::LiveMessage;
use async_trait::async_trait;
use common::domain::{
    BroadcastDeliveryError, BroadcastOutcome, ClientId, ReadingBroadcaster, ScoredReading,
};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::{mpsc, RwLock};
use tracing::{debug, error, info, warn};

/// Outbound side of one registered client
pub struct ClientHandle {
    pub id: ClientId,
    pub receiver: mpsc::Receiver<String>,
}

/// Set of connected live-channel clients
///
/// Each client owns a bounded queue of serialized frames. Delivery never
/// waits: a full or closed queue removes the client and delivery to the
/// remaining clients continues.
pub struct ClientRegistry {
    clients: RwLock<HashMap<ClientId, mpsc::Sender<String>>>,
    queue_capacity: usize,
    /// Set by `close_all`; only written under the `clients` write lock
    closed: AtomicBool,
}

impl ClientRegistry {
    pub fn new(queue_capacity: usize) -> Self {
        Self {
            clients: RwLock::new(HashMap::new()),
            queue_capacity: queue_capacity.max(1),
            closed: AtomicBool::new(false),
        }
    }

    /// Create a queue for a new client and register it
    pub async fn connect(&self) -> ClientHandle {
        let id = ClientId::new();
        let (sender, receiver) = mpsc::channel(self.queue_capacity);
        self.register(id, sender).await;
        ClientHandle { id, receiver }
    }

    /// Admit a new client unless `max_clients` are already connected or the
    /// registry has been closed. Check and insert happen under one lock.
    pub async fn try_connect(&self, max_clients: usize) -> Option<ClientHandle> {
        let mut clients = self.clients.write().await;
        if self.closed.load(Ordering::Acquire) || clients.len() >= max_clients {
            return None;
        }

        let id = ClientId::new();
        let (sender, receiver) = mpsc::channel(self.queue_capacity);
        clients.insert(id, sender);
        info!(client_id = %id, total = clients.len(), "live client registered");
        Some(ClientHandle { id, receiver })
    }

    /// Returns false when the client was already registered, which leaves
    /// the existing queue in place
    pub async fn register(&self, id: ClientId, sender: mpsc::Sender<String>) -> bool {
        let mut clients = self.clients.write().await;
        if clients.contains_key(&id) {
            return false;
        }
        clients.insert(id, sender);
        info!(client_id = %id, total = clients.len(), "live client registered");
        true
    }

    /// Returns false when the client was not registered
    pub async fn unregister(&self, id: ClientId) -> bool {
        let mut clients = self.clients.write().await;
        let removed = clients.remove(&id).is_some();
        if removed {
            info!(client_id = %id, total = clients.len(), "live client unregistered");
        }
        removed
    }

    pub async fn client_count(&self) -> usize {
        self.clients.read().await.len()
    }

    pub async fn is_registered(&self, id: ClientId) -> bool {
        self.clients.read().await.contains_key(&id)
    }

    /// Queue a message for a single client, removing it on failure
    pub async fn send_to(
        &self,
        id: ClientId,
        message: &LiveMessage<'_>,
    ) -> Result<(), BroadcastDeliveryError> {
        let json = message
            .to_json()
            .map_err(|e| BroadcastDeliveryError::Serialization(e.to_string()))?;

        let result = {
            let clients = self.clients.read().await;
            match clients.get(&id) {
                Some(sender) => deliver(id, sender, json),
                None => Err(BroadcastDeliveryError::Disconnected(id)),
            }
        };

        if result.is_err() {
            self.unregister(id).await;
        }
        result
    }

    /// Drop every client queue and refuse further `try_connect` calls;
    /// sessions close their sockets when their queue ends
    pub async fn close_all(&self) -> usize {
        let mut clients = self.clients.write().await;
        self.closed.store(true, Ordering::Release);
        let closed = clients.len();
        clients.clear();
        if closed > 0 {
            info!(closed, "closed all live clients");
        }
        closed
    }

    async fn remove_failed(&self, failures: &[BroadcastDeliveryError]) -> Vec<ClientId> {
        let mut clients = self.clients.write().await;
        failures
            .iter()
            .filter_map(|failure| {
                let id = match failure {
                    BroadcastDeliveryError::Disconnected(id)
                    | BroadcastDeliveryError::QueueFull(id) => *id,
                    BroadcastDeliveryError::Serialization(_) => return None,
                };
                warn!(client_id = %id, error = %failure, "dropping live client");
                clients.remove(&id).map(|_| id)
            })
            .collect()
    }
}

fn deliver(
    id: ClientId,
    sender: &mpsc::Sender<String>,
    json: String,
) -> Result<(), BroadcastDeliveryError> {
    sender.try_send(json).map_err(|e| match e {
        mpsc::error::TrySendError::Full(_) => BroadcastDeliveryError::QueueFull(id),
        mpsc::error::TrySendError::Closed(_) => BroadcastDeliveryError::Disconnected(id),
    })
}

#[async_trait]
impl ReadingBroadcaster for ClientRegistry {
    async fn broadcast(&self, reading: &ScoredReading) -> BroadcastOutcome {
        let json = match LiveMessage::telemetry(reading).to_json() {
            Ok(json) => json,
            Err(e) => {
                error!(error = %e, "failed to serialize live telemetry message");
                return BroadcastOutcome::default();
            }
        };

        let (delivered, failures) = {
            let clients = self.clients.read().await;
            let mut delivered = 0;
            let mut failures = Vec::new();
            for (id, sender) in clients.iter() {
                match deliver(*id, sender, json.clone()) {
                    Ok(()) => delivered += 1,
                    Err(e) => failures.push(e),
                }
            }
            (delivered, failures)
        };

        let removed = if failures.is_empty() {
            Vec::new()
        } else {
            self.remove_failed(&failures).await
        };

        debug!(delivered, removed = removed.len(), "broadcast live reading");
        BroadcastOutcome { delivered, removed }
    }
}
