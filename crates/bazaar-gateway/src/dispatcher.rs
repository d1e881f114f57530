use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use thiserror::Error;
use tokio::sync::{RwLock, broadcast, mpsc};
use tracing::debug;
use uuid::Uuid;

use bazaar_types::events::ChatEvent;

use crate::presence::{ConnId, PresenceRegistry};
use crate::rooms::RoomManager;

/// Who hears about a user going online or offline.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum PresenceScope {
    /// Every connected client.
    #[default]
    Global,
    /// Only connections joined to a room of a conversation the user takes part in.
    Rooms,
}

#[derive(Debug, Error)]
#[error("unknown presence scope '{0}' (expected 'global' or 'rooms')")]
pub struct UnknownPresenceScope(String);

impl FromStr for PresenceScope {
    type Err = UnknownPresenceScope;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "global" => Ok(Self::Global),
            "rooms" => Ok(Self::Rooms),
            _ => Err(UnknownPresenceScope(s.to_string())),
        }
    }
}

impl fmt::Display for PresenceScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Global => f.write_str("global"),
            Self::Rooms => f.write_str("rooms"),
        }
    }
}

struct ConnectionEntry {
    user_id: Uuid,
    tx: mpsc::UnboundedSender<ChatEvent>,
}

/// Manages all connected clients and routes events to them.
#[derive(Clone)]
pub struct Dispatcher {
    inner: Arc<DispatcherInner>,
}

struct DispatcherInner {
    /// Global events (presence in `Global` scope). Every connection subscribes.
    broadcast_tx: broadcast::Sender<ChatEvent>,

    /// Per-connection targeted channels: conn_id -> entry
    connections: RwLock<HashMap<ConnId, ConnectionEntry>>,

    presence: PresenceRegistry,

    rooms: RoomManager,

    presence_scope: PresenceScope,
}

impl Dispatcher {
    pub fn new(presence_scope: PresenceScope) -> Self {
        let (broadcast_tx, _) = broadcast::channel(1024);
        Self {
            inner: Arc::new(DispatcherInner {
                broadcast_tx,
                connections: RwLock::new(HashMap::new()),
                presence: PresenceRegistry::spawn(),
                rooms: RoomManager::new(),
                presence_scope,
            }),
        }
    }

    pub fn presence_scope(&self) -> PresenceScope {
        self.inner.presence_scope
    }

    pub fn rooms(&self) -> &RoomManager {
        &self.inner.rooms
    }

    /// Subscribe to global events. Returns a broadcast receiver.
    pub fn subscribe(&self) -> broadcast::Receiver<ChatEvent> {
        self.inner.broadcast_tx.subscribe()
    }

    /// Subscribe to global events and take the online snapshot, in that
    /// order: a change the snapshot misses is still in the receiver.
    pub async fn subscribe_with_snapshot(&self) -> (broadcast::Receiver<ChatEvent>, Vec<Uuid>) {
        let rx = self.subscribe();
        let online = self.online_users().await;
        (rx, online)
    }

    /// Broadcast an event to all connected clients.
    pub fn broadcast(&self, event: ChatEvent) {
        let _ = self.inner.broadcast_tx.send(event);
    }

    /// Register a connection's targeted channel. Returns (conn_id, receiver).
    pub async fn register_connection(
        &self,
        user_id: Uuid,
    ) -> (ConnId, mpsc::UnboundedReceiver<ChatEvent>) {
        let conn_id = Uuid::new_v4();
        let (tx, rx) = mpsc::unbounded_channel();
        self.inner
            .connections
            .write()
            .await
            .insert(conn_id, ConnectionEntry { user_id, tx });
        (conn_id, rx)
    }

    /// Mark the connection as the user's presence handle and announce it.
    pub async fn user_online(&self, user_id: Uuid, conn_id: ConnId) {
        self.inner.presence.connect(user_id, conn_id).await;
        self.publish_presence(user_id, true).await;
    }

    /// Tear down a connection: targeted channel, presence entry and room
    /// memberships. Offline is only announced if this connection still owned
    /// the user's presence entry.
    pub async fn user_offline(&self, user_id: Uuid, conn_id: ConnId) {
        self.inner.connections.write().await.remove(&conn_id);

        if self.inner.presence.disconnect(user_id, conn_id).await {
            // Before leaving rooms, so room-scoped peers are still known
            self.publish_presence(user_id, false).await;
        }

        let left = self.inner.rooms.leave_all(conn_id).await;
        if !left.is_empty() {
            debug!("Connection {} left {} rooms", conn_id, left.len());
        }
    }

    pub async fn is_online(&self, user_id: Uuid) -> bool {
        self.inner.presence.is_online(user_id).await
    }

    pub async fn online_users(&self) -> Vec<Uuid> {
        self.inner.presence.online_users().await
    }

    /// Send a targeted event to one connection.
    pub async fn send_to_connection(&self, conn_id: ConnId, event: ChatEvent) -> bool {
        let connections = self.inner.connections.read().await;
        match connections.get(&conn_id) {
            Some(entry) => entry.tx.send(event).is_ok(),
            None => false,
        }
    }

    /// Fan an event out to every connection in the room, optionally skipping
    /// the connections of one user. Returns how many connections it reached.
    pub async fn send_to_room(
        &self,
        conversation_id: Uuid,
        event: ChatEvent,
        skip_user: Option<Uuid>,
    ) -> usize {
        let members = self.inner.rooms.members(conversation_id).await;
        let connections = self.inner.connections.read().await;

        let mut delivered = 0;
        for (conn_id, user_id) in members {
            if skip_user == Some(user_id) {
                continue;
            }
            if let Some(entry) = connections.get(&conn_id) {
                if entry.tx.send(event.clone()).is_ok() {
                    delivered += 1;
                }
            }
        }
        delivered
    }

    async fn publish_presence(&self, user_id: Uuid, is_online: bool) {
        let event = ChatEvent::UserStatusChange { user_id, is_online };

        match self.inner.presence_scope {
            PresenceScope::Global => self.broadcast(event),
            PresenceScope::Rooms => {
                let peers = self.inner.rooms.peers_of(user_id).await;
                let connections = self.inner.connections.read().await;
                for conn_id in peers {
                    if let Some(entry) = connections.get(&conn_id) {
                        if entry.user_id != user_id {
                            let _ = entry.tx.send(event.clone());
                        }
                    }
                }
            }
        }
    }
}
