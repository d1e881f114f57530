//! Presence registry: which connection currently speaks for each user.
//!
//! The table is owned by a single task and mutated only through commands,
//! so connect and disconnect for the same user are applied one at a time in
//! the order they were issued.

use std::collections::HashMap;

use tokio::sync::{mpsc, oneshot};
use tracing::{debug, warn};
use uuid::Uuid;

/// Server-assigned id of one live connection.
pub type ConnId = Uuid;

enum PresenceCommand {
    Connect {
        user_id: Uuid,
        conn_id: ConnId,
        /// Handle that was displaced, if the user was already online
        reply: oneshot::Sender<Option<ConnId>>,
    },
    Disconnect {
        user_id: Uuid,
        conn_id: ConnId,
        /// True if the entry was removed
        reply: oneshot::Sender<bool>,
    },
    IsOnline {
        user_id: Uuid,
        reply: oneshot::Sender<bool>,
    },
    Snapshot {
        reply: oneshot::Sender<Vec<Uuid>>,
    },
}

#[derive(Clone)]
pub struct PresenceRegistry {
    tx: mpsc::UnboundedSender<PresenceCommand>,
}

impl PresenceRegistry {
    /// Start the registry task. It stops once every handle has been dropped.
    pub fn spawn() -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        tokio::spawn(run(rx));
        Self { tx }
    }

    /// Record `conn_id` as the user's active connection. Last connection wins.
    pub async fn connect(&self, user_id: Uuid, conn_id: ConnId) -> Option<ConnId> {
        self.request(|reply| PresenceCommand::Connect {
            user_id,
            conn_id,
            reply,
        })
        .await
        .flatten()
    }

    /// Remove the user's entry, but only if `conn_id` still owns it.
    pub async fn disconnect(&self, user_id: Uuid, conn_id: ConnId) -> bool {
        self.request(|reply| PresenceCommand::Disconnect {
            user_id,
            conn_id,
            reply,
        })
        .await
        .unwrap_or(false)
    }

    pub async fn is_online(&self, user_id: Uuid) -> bool {
        self.request(|reply| PresenceCommand::IsOnline { user_id, reply })
            .await
            .unwrap_or(false)
    }

    pub async fn online_users(&self) -> Vec<Uuid> {
        self.request(|reply| PresenceCommand::Snapshot { reply })
            .await
            .unwrap_or_default()
    }

    async fn request<T>(
        &self,
        command: impl FnOnce(oneshot::Sender<T>) -> PresenceCommand,
    ) -> Option<T> {
        let (reply_tx, reply_rx) = oneshot::channel();
        if self.tx.send(command(reply_tx)).is_err() {
            warn!("Presence registry is gone, treating everyone as offline");
            return None;
        }
        reply_rx.await.ok()
    }
}

async fn run(mut rx: mpsc::UnboundedReceiver<PresenceCommand>) {
    let mut entries: HashMap<Uuid, ConnId> = HashMap::new();

    while let Some(command) = rx.recv().await {
        match command {
            PresenceCommand::Connect {
                user_id,
                conn_id,
                reply,
            } => {
                let displaced = entries.insert(user_id, conn_id);
                if let Some(old) = displaced {
                    debug!("{} reconnected, connection {} replaces {}", user_id, conn_id, old);
                }
                let _ = reply.send(displaced);
            }
            PresenceCommand::Disconnect {
                user_id,
                conn_id,
                reply,
            } => {
                let removed = match entries.get(&user_id) {
                    Some(current) if *current == conn_id => {
                        entries.remove(&user_id);
                        true
                    }
                    // A newer connection has taken over, or the user is already gone
                    _ => false,
                };
                let _ = reply.send(removed);
            }
            PresenceCommand::IsOnline { user_id, reply } => {
                let _ = reply.send(entries.contains_key(&user_id));
            }
            PresenceCommand::Snapshot { reply } => {
                let _ = reply.send(entries.keys().copied().collect());
            }
        }
    }

    debug!("Presence registry stopped");
}
