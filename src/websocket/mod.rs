//! Chat fan-out hub.
//!
//! The hub is the sole owner of connected clients; rooms hold client ids
//! only, which keeps unregistration deterministic. Both indices live under
//! one RW lock: broadcasts take it for read, registration and room
//! membership changes take it for write. Every client has a bounded send
//! queue drained by its writer task; enqueueing never blocks, and a full
//! or closed queue gets the client evicted instead of stalling the
//! publisher.

pub mod handlers;
pub mod message_types;

use crate::metrics::{WS_BROADCASTS_TOTAL, WS_CONNECTED_CLIENTS, WS_EVICTIONS_TOTAL};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tokio::sync::{mpsc, RwLock};
use tracing::{debug, info};
use uuid::Uuid;

/// Capacity of each client's send queue.
pub const CLIENT_QUEUE_CAPACITY: usize = 256;

/// The hub's end of one connected client.
#[derive(Clone)]
pub struct ClientHandle {
    pub id: Uuid,
    pub user_id: String,
    pub username: String,
    sender: mpsc::Sender<String>,
}

impl ClientHandle {
    pub fn new(id: Uuid, user_id: String, username: String) -> (Self, mpsc::Receiver<String>) {
        let (sender, receiver) = mpsc::channel(CLIENT_QUEUE_CAPACITY);
        (
            Self {
                id,
                user_id,
                username,
                sender,
            },
            receiver,
        )
    }
}

#[derive(Default)]
struct Indices {
    clients: HashMap<Uuid, ClientHandle>,
    rooms: HashMap<String, HashSet<Uuid>>,
    memberships: HashMap<Uuid, HashSet<String>>,
}

impl Indices {
    /// Removes every trace of a client. Dropping its handle closes the send
    /// queue, which ends the writer task.
    fn remove_client(&mut self, client_id: Uuid) -> Option<ClientHandle> {
        let handle = self.clients.remove(&client_id)?;
        if let Some(rooms) = self.memberships.remove(&client_id) {
            for room_id in rooms {
                if let Some(members) = self.rooms.get_mut(&room_id) {
                    members.remove(&client_id);
                    if members.is_empty() {
                        self.rooms.remove(&room_id);
                    }
                }
            }
        }
        Some(handle)
    }
}

#[derive(Clone, Default)]
pub struct Hub {
    indices: Arc<RwLock<Indices>>,
}

impl Hub {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn register(&self, client: ClientHandle) {
        let mut indices = self.indices.write().await;
        debug!(client_id = %client.id, user_id = %client.user_id, "client registered");
        indices.clients.insert(client.id, client);
        WS_CONNECTED_CLIENTS.set(indices.clients.len() as i64);
    }

    pub async fn unregister(&self, client_id: Uuid) {
        let mut indices = self.indices.write().await;
        if indices.remove_client(client_id).is_some() {
            debug!(%client_id, "client unregistered");
        }
        WS_CONNECTED_CLIENTS.set(indices.clients.len() as i64);
    }

    pub async fn join_room(&self, client_id: Uuid, room_id: &str) {
        let mut indices = self.indices.write().await;
        indices
            .rooms
            .entry(room_id.to_string())
            .or_default()
            .insert(client_id);
        indices
            .memberships
            .entry(client_id)
            .or_default()
            .insert(room_id.to_string());
    }

    pub async fn leave_room(&self, client_id: Uuid, room_id: &str) {
        let mut indices = self.indices.write().await;
        if let Some(members) = indices.rooms.get_mut(room_id) {
            members.remove(&client_id);
            if members.is_empty() {
                indices.rooms.remove(room_id);
            }
        }
        if let Some(rooms) = indices.memberships.get_mut(&client_id) {
            rooms.remove(room_id);
        }
    }

    /// Fan-out to one room. Non-blocking: clients whose queue is full or
    /// closed are marked and evicted after the read lock is released.
    pub async fn broadcast_room(&self, room_id: &str, payload: &str) {
        let stale = {
            let indices = self.indices.read().await;
            let Some(members) = indices.rooms.get(room_id) else {
                return;
            };
            let mut stale = Vec::new();
            for client_id in members {
                if let Some(client) = indices.clients.get(client_id) {
                    if client.sender.try_send(payload.to_string()).is_err() {
                        stale.push(*client_id);
                    }
                }
            }
            stale
        };
        WS_BROADCASTS_TOTAL.with_label_values(&["room"]).inc();
        self.evict(stale).await;
    }

    pub async fn broadcast_all(&self, payload: &str) {
        let stale = {
            let indices = self.indices.read().await;
            let mut stale = Vec::new();
            for (client_id, client) in &indices.clients {
                if client.sender.try_send(payload.to_string()).is_err() {
                    stale.push(*client_id);
                }
            }
            stale
        };
        WS_BROADCASTS_TOTAL.with_label_values(&["all"]).inc();
        self.evict(stale).await;
    }

    /// Delivers to every connection a user holds.
    pub async fn send_to_user(&self, user_id: &str, payload: &str) {
        let stale = {
            let indices = self.indices.read().await;
            let mut stale = Vec::new();
            for (client_id, client) in &indices.clients {
                if client.user_id == user_id
                    && client.sender.try_send(payload.to_string()).is_err()
                {
                    stale.push(*client_id);
                }
            }
            stale
        };
        WS_BROADCASTS_TOTAL.with_label_values(&["user"]).inc();
        self.evict(stale).await;
    }

    /// Direct delivery to one client; a full queue evicts it like any other
    /// failed enqueue.
    pub async fn send_to_client(&self, client_id: Uuid, payload: &str) {
        let failed = {
            let indices = self.indices.read().await;
            match indices.clients.get(&client_id) {
                Some(client) => client.sender.try_send(payload.to_string()).is_err(),
                None => false,
            }
        };
        if failed {
            self.evict(vec![client_id]).await;
        }
    }

    async fn evict(&self, stale: Vec<Uuid>) {
        if stale.is_empty() {
            return;
        }
        let mut indices = self.indices.write().await;
        for client_id in stale {
            if indices.remove_client(client_id).is_some() {
                info!(%client_id, "evicted slow client");
                WS_EVICTIONS_TOTAL.inc();
            }
        }
        WS_CONNECTED_CLIENTS.set(indices.clients.len() as i64);
    }

    pub async fn client_count(&self) -> usize {
        self.indices.read().await.clients.len()
    }

    pub async fn room_members(&self, room_id: &str) -> usize {
        self.indices
            .read()
            .await
            .rooms
            .get(room_id)
            .map(HashSet::len)
            .unwrap_or(0)
    }

    pub async fn is_registered(&self, client_id: Uuid) -> bool {
        self.indices.read().await.clients.contains_key(&client_id)
    }

    /// Shutdown: drop every handle so writer tasks drain and exit.
    pub async fn close_all(&self) {
        let mut indices = self.indices.write().await;
        indices.clients.clear();
        indices.rooms.clear();
        indices.memberships.clear();
        WS_CONNECTED_CLIENTS.set(0);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn client(user: &str) -> (ClientHandle, mpsc::Receiver<String>) {
        ClientHandle::new(Uuid::new_v4(), user.to_string(), user.to_string())
    }

    #[tokio::test]
    async fn broadcast_reaches_room_members_only() {
        let hub = Hub::new();
        let (c1, mut rx1) = client("u1");
        let (c2, mut rx2) = client("u2");
        let id1 = c1.id;
        let id2 = c2.id;
        hub.register(c1).await;
        hub.register(c2).await;
        hub.join_room(id1, "r1").await;
        hub.join_room(id2, "r2").await;

        hub.broadcast_room("r1", "hello").await;
        assert_eq!(rx1.recv().await.unwrap(), "hello");
        assert!(rx2.try_recv().is_err());
    }

    #[tokio::test]
    async fn unregister_removes_client_and_empty_rooms() {
        let hub = Hub::new();
        let (c1, _rx1) = client("u1");
        let id1 = c1.id;
        hub.register(c1).await;
        hub.join_room(id1, "r1").await;
        assert_eq!(hub.room_members("r1").await, 1);

        hub.unregister(id1).await;
        assert_eq!(hub.client_count().await, 0);
        assert_eq!(hub.room_members("r1").await, 0);
    }

    #[tokio::test]
    async fn full_queue_evicts_without_blocking() {
        let hub = Hub::new();
        let (c1, _rx1) = client("u1"); // receiver alive but never drained
        let id1 = c1.id;
        hub.register(c1).await;
        hub.join_room(id1, "r1").await;

        for i in 0..CLIENT_QUEUE_CAPACITY {
            hub.broadcast_room("r1", &format!("m{i}")).await;
        }
        assert!(hub.is_registered(id1).await);

        // One past capacity drops the client.
        hub.broadcast_room("r1", "overflow").await;
        assert!(!hub.is_registered(id1).await);
        assert_eq!(hub.room_members("r1").await, 0);
    }

    #[tokio::test]
    async fn closed_queue_evicts_on_next_send() {
        let hub = Hub::new();
        let (c1, rx1) = client("u1");
        let id1 = c1.id;
        hub.register(c1).await;
        hub.join_room(id1, "r1").await;

        drop(rx1);
        hub.broadcast_room("r1", "hello").await;
        assert!(!hub.is_registered(id1).await);
    }
}
