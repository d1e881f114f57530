use std::collections::{HashMap, HashSet};

use tokio::sync::RwLock;
use uuid::Uuid;

use bazaar_types::models::Conversation;

use crate::presence::ConnId;

/// Connections subscribed to one conversation.
struct Room {
    client_id: Uuid,
    seller_id: Uuid,
    /// conn_id -> user_id
    members: HashMap<ConnId, Uuid>,
}

impl Room {
    fn has_participant(&self, user_id: Uuid) -> bool {
        self.client_id == user_id || self.seller_id == user_id
    }
}

#[derive(Default)]
struct RoomTable {
    rooms: HashMap<Uuid, Room>,
    /// Reverse index for teardown: conn_id -> joined conversation ids
    joined: HashMap<ConnId, HashSet<Uuid>>,
}

/// Maps conversation ids to the live connections subscribed to them.
#[derive(Default)]
pub struct RoomManager {
    table: RwLock<RoomTable>,
}

impl RoomManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Subscribe a connection to the conversation's room. The caller has
    /// already checked that `user_id` is a participant. Returns false if the
    /// connection was already in the room.
    pub async fn join(&self, conn_id: ConnId, user_id: Uuid, conversation: &Conversation) -> bool {
        let mut table = self.table.write().await;

        let room = table.rooms.entry(conversation.id).or_insert_with(|| Room {
            client_id: conversation.client_id,
            seller_id: conversation.seller_id,
            members: HashMap::new(),
        });
        let added = room.members.insert(conn_id, user_id).is_none();

        table.joined.entry(conn_id).or_default().insert(conversation.id);
        added
    }

    /// Remove the connection from one room, dropping the room once empty.
    /// Returns false if it was not a member.
    pub async fn leave(&self, conn_id: ConnId, conversation_id: Uuid) -> bool {
        let mut table = self.table.write().await;

        let Some(joined) = table.joined.get_mut(&conn_id) else {
            return false;
        };
        if !joined.remove(&conversation_id) {
            return false;
        }
        if joined.is_empty() {
            table.joined.remove(&conn_id);
        }

        if let Some(room) = table.rooms.get_mut(&conversation_id) {
            room.members.remove(&conn_id);
            if room.members.is_empty() {
                table.rooms.remove(&conversation_id);
            }
        }
        true
    }

    /// Remove the connection from every room it joined. Empty rooms are dropped.
    /// Returns the conversations it left.
    pub async fn leave_all(&self, conn_id: ConnId) -> Vec<Uuid> {
        let mut table = self.table.write().await;

        let Some(conversation_ids) = table.joined.remove(&conn_id) else {
            return Vec::new();
        };

        for conversation_id in &conversation_ids {
            let now_empty = match table.rooms.get_mut(conversation_id) {
                Some(room) => {
                    room.members.remove(&conn_id);
                    room.members.is_empty()
                }
                None => false,
            };
            if now_empty {
                table.rooms.remove(conversation_id);
            }
        }

        conversation_ids.into_iter().collect()
    }

    /// Current members of a room as (conn_id, user_id) pairs.
    pub async fn members(&self, conversation_id: Uuid) -> Vec<(ConnId, Uuid)> {
        self.table
            .read()
            .await
            .rooms
            .get(&conversation_id)
            .map(|room| room.members.iter().map(|(c, u)| (*c, *u)).collect())
            .unwrap_or_default()
    }

    pub async fn is_member(&self, conn_id: ConnId, conversation_id: Uuid) -> bool {
        self.table
            .read()
            .await
            .joined
            .get(&conn_id)
            .is_some_and(|rooms| rooms.contains(&conversation_id))
    }

    /// Connections of other users that sit in a room of a conversation
    /// `user_id` takes part in.
    pub async fn peers_of(&self, user_id: Uuid) -> HashSet<ConnId> {
        let table = self.table.read().await;

        table
            .rooms
            .values()
            .filter(|room| room.has_participant(user_id))
            .flat_map(|room| room.members.iter())
            .filter(|(_, member)| **member != user_id)
            .map(|(conn_id, _)| *conn_id)
            .collect()
    }

    pub async fn room_count(&self) -> usize {
        self.table.read().await.rooms.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn conversation() -> Conversation {
        Conversation {
            id: Uuid::new_v4(),
            client_id: Uuid::new_v4(),
            seller_id: Uuid::new_v4(),
            created_at: chrono::Utc::now(),
        }
    }

    #[tokio::test]
    async fn join_is_idempotent_per_connection() {
        let rooms = RoomManager::new();
        let conv = conversation();
        let conn = Uuid::new_v4();

        assert!(rooms.join(conn, conv.client_id, &conv).await);
        assert!(!rooms.join(conn, conv.client_id, &conv).await);
        assert_eq!(rooms.members(conv.id).await, vec![(conn, conv.client_id)]);
        assert!(rooms.is_member(conn, conv.id).await);
    }

    #[tokio::test]
    async fn leave_all_tears_down_every_room() {
        let rooms = RoomManager::new();
        let a = conversation();
        let b = conversation();
        let conn = Uuid::new_v4();
        let other = Uuid::new_v4();

        rooms.join(conn, a.client_id, &a).await;
        rooms.join(conn, a.client_id, &b).await;
        rooms.join(other, b.seller_id, &b).await;

        let mut left = rooms.leave_all(conn).await;
        left.sort();
        let mut expected = vec![a.id, b.id];
        expected.sort();
        assert_eq!(left, expected);

        assert!(!rooms.is_member(conn, a.id).await);
        assert!(rooms.members(a.id).await.is_empty());
        assert_eq!(rooms.members(b.id).await, vec![(other, b.seller_id)]);
        assert_eq!(rooms.room_count().await, 1);

        assert!(rooms.leave_all(conn).await.is_empty());
    }

    #[tokio::test]
    async fn leave_drops_one_membership() {
        let rooms = RoomManager::new();
        let a = conversation();
        let b = conversation();
        let conn = Uuid::new_v4();

        rooms.join(conn, a.client_id, &a).await;
        rooms.join(conn, a.client_id, &b).await;

        assert!(rooms.leave(conn, a.id).await);
        assert!(!rooms.leave(conn, a.id).await);
        assert!(!rooms.is_member(conn, a.id).await);
        assert!(rooms.is_member(conn, b.id).await);
        assert_eq!(rooms.room_count().await, 1);

        assert!(rooms.leave(conn, b.id).await);
        assert_eq!(rooms.room_count().await, 0);
        assert!(rooms.leave_all(conn).await.is_empty());
    }

    #[tokio::test]
    async fn rooms_are_isolated() {
        let rooms = RoomManager::new();
        let a = conversation();
        let b = conversation();
        let conn_a = Uuid::new_v4();
        let conn_b = Uuid::new_v4();

        rooms.join(conn_a, a.seller_id, &a).await;
        rooms.join(conn_b, b.seller_id, &b).await;

        assert_eq!(rooms.members(a.id).await, vec![(conn_a, a.seller_id)]);
        assert!(!rooms.is_member(conn_b, a.id).await);
    }

    #[tokio::test]
    async fn peers_are_the_other_participants_in_rooms() {
        let rooms = RoomManager::new();
        let conv = conversation();
        let unrelated = conversation();
        let seller_conn = Uuid::new_v4();
        let client_conn = Uuid::new_v4();
        let stranger_conn = Uuid::new_v4();

        rooms.join(seller_conn, conv.seller_id, &conv).await;
        rooms.join(client_conn, conv.client_id, &conv).await;
        rooms.join(stranger_conn, unrelated.client_id, &unrelated).await;

        let peers = rooms.peers_of(conv.client_id).await;
        assert_eq!(peers, HashSet::from([seller_conn]));

        // Seller's room membership is enough, the client need not be joined
        rooms.leave_all(client_conn).await;
        assert_eq!(rooms.peers_of(conv.client_id).await, HashSet::from([seller_conn]));
    }
}
