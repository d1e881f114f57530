//! Fixtures shared by the gateway's unit tests.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Result, bail};
use uuid::Uuid;

use bazaar_db::{ChatStore, Database, ReadTransition};
use bazaar_types::api::ConversationSummary;
use bazaar_types::models::{ChatMessage, Conversation, Identity, Role};

use crate::{Gateway, GatewaySettings};

pub const SECRET: &str = "unit-test-secret";

pub fn gateway() -> Gateway {
    let db = Database::open_in_memory().expect("in-memory database");
    gateway_with(Arc::new(db))
}

pub fn gateway_with(store: Arc<dyn ChatStore>) -> Gateway {
    let mut settings = GatewaySettings::new(SECRET);
    settings.persist_timeout = Duration::from_millis(200);
    Gateway::new(store, settings)
}

pub fn identity(role: Role) -> Identity {
    Identity {
        user_id: Uuid::new_v4(),
        role,
    }
}

/// A fresh client/seller conversation in the gateway's store.
pub async fn open_pair(gw: &Gateway) -> Conversation {
    let client = identity(Role::Client);
    let (conversation, _) = gw
        .open_conversation(client, Uuid::new_v4())
        .await
        .expect("open conversation");
    conversation
}

/// A store that knows one conversation and refuses every write, either by
/// failing outright or by blocking past the persistence timeout.
pub struct FailingStore {
    fixture: Conversation,
    hang: Option<Duration>,
}

impl Default for FailingStore {
    fn default() -> Self {
        Self {
            fixture: Conversation {
                id: Uuid::new_v4(),
                client_id: Uuid::new_v4(),
                seller_id: Uuid::new_v4(),
                created_at: chrono::Utc::now(),
            },
            hang: None,
        }
    }
}

impl FailingStore {
    pub fn hanging(for_: Duration) -> Self {
        Self {
            hang: Some(for_),
            ..Self::default()
        }
    }

    pub fn conversation_fixture(&self) -> Conversation {
        self.fixture.clone()
    }

    fn refuse<T>(&self) -> Result<T> {
        if let Some(hang) = self.hang {
            std::thread::sleep(hang);
        }
        bail!("disk I/O error")
    }
}

impl ChatStore for FailingStore {
    fn get_or_create_conversation(&self, _: Uuid, _: Uuid) -> Result<(Conversation, bool)> {
        self.refuse()
    }

    fn conversation(&self, id: Uuid) -> Result<Option<Conversation>> {
        Ok((id == self.fixture.id).then(|| self.fixture.clone()))
    }

    fn conversations_for(&self, _: Uuid) -> Result<Vec<ConversationSummary>> {
        self.refuse()
    }

    fn append_message(&self, _: Uuid, _: Uuid, _: &str) -> Result<ChatMessage> {
        self.refuse()
    }

    fn history(&self, _: Uuid) -> Result<Vec<ChatMessage>> {
        Ok(Vec::new())
    }

    fn mark_read(&self, _: Uuid, _: Uuid, _: Uuid) -> Result<ReadTransition> {
        self.refuse()
    }

    fn mark_all_read(&self, _: Uuid, _: Uuid) -> Result<usize> {
        Ok(0)
    }
}

/// A working SQLite store whose unread sweep always fails, so joins break
/// after the participant check has passed.
pub struct SweepFailingStore {
    db: Database,
}

impl SweepFailingStore {
    pub fn new() -> Self {
        Self {
            db: Database::open_in_memory().expect("in-memory database"),
        }
    }
}

impl ChatStore for SweepFailingStore {
    fn get_or_create_conversation(&self, client_id: Uuid, seller_id: Uuid) -> Result<(Conversation, bool)> {
        ChatStore::get_or_create_conversation(&self.db, client_id, seller_id)
    }

    fn conversation(&self, id: Uuid) -> Result<Option<Conversation>> {
        ChatStore::conversation(&self.db, id)
    }

    fn conversations_for(&self, user_id: Uuid) -> Result<Vec<ConversationSummary>> {
        ChatStore::conversations_for(&self.db, user_id)
    }

    fn append_message(&self, conversation_id: Uuid, sender_id: Uuid, text: &str) -> Result<ChatMessage> {
        ChatStore::append_message(&self.db, conversation_id, sender_id, text)
    }

    fn history(&self, conversation_id: Uuid) -> Result<Vec<ChatMessage>> {
        ChatStore::history(&self.db, conversation_id)
    }

    fn mark_read(&self, conversation_id: Uuid, message_id: Uuid, reader_id: Uuid) -> Result<ReadTransition> {
        ChatStore::mark_read(&self.db, conversation_id, message_id, reader_id)
    }

    fn mark_all_read(&self, _: Uuid, _: Uuid) -> Result<usize> {
        bail!("database is locked")
    }
}
