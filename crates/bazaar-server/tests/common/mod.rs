#![allow(dead_code)]

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use uuid::Uuid;

use bazaar_client::{ChatClient, ChatSession, Connection, EventStream};
use bazaar_db::{ChatStore, Database, ReadTransition};
use bazaar_gateway::identity::issue_token;
use bazaar_gateway::{Gateway, GatewaySettings, PresenceScope};
use bazaar_types::events::{ChatCommand, ChatEvent};
use bazaar_types::api::ConversationSummary;
use bazaar_types::models::{ChatMessage, Conversation, Role};

pub const SECRET: &str = "integration-test-secret";

const EVENT_TIMEOUT: Duration = Duration::from_secs(5);

pub struct TestServer {
    pub base_url: String,
    pub gateway: Gateway,
}

impl TestServer {
    pub async fn start() -> Self {
        Self::start_with_scope(PresenceScope::Global).await
    }

    pub async fn start_with_scope(scope: PresenceScope) -> Self {
        let mut settings = settings();
        settings.presence_scope = scope;
        Self::start_with(memory_store(), settings).await
    }

    /// Serve the real router on an ephemeral port.
    pub async fn start_with(store: Arc<dyn ChatStore>, settings: GatewaySettings) -> Self {
        let gateway = Gateway::new(store, settings);

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .expect("bind test listener");
        let addr = listener.local_addr().expect("local addr");

        let app = bazaar_server::router(gateway.clone());
        tokio::spawn(async move {
            axum::serve(listener, app).await.expect("test server");
        });

        Self {
            base_url: format!("http://{addr}"),
            gateway,
        }
    }

    pub fn client(&self, user_id: Uuid, role: Role) -> ChatClient {
        ChatClient::new(self.base_url.clone(), token(user_id, role))
    }

    pub fn gateway_url(&self, token: &str) -> String {
        format!("{}/gateway?token={token}", self.base_url.replacen("http://", "ws://", 1))
    }
}

pub fn settings() -> GatewaySettings {
    GatewaySettings::new(SECRET)
}

pub fn memory_store() -> Arc<dyn ChatStore> {
    Arc::new(Database::open_in_memory().expect("in-memory database"))
}

/// Poll `check` until it holds, failing the test after a few seconds.
pub async fn eventually<F, Fut>(mut check: F)
where
    F: FnMut() -> Fut,
    Fut: Future<Output = bool>,
{
    let deadline = tokio::time::Instant::now() + EVENT_TIMEOUT;
    while !check().await {
        assert!(tokio::time::Instant::now() < deadline, "condition never held");
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}

pub fn token(user_id: Uuid, role: Role) -> String {
    issue_token(SECRET, user_id, role, chrono::Duration::hours(1)).expect("issue token")
}

/// Anything that yields live events.
pub trait Events {
    fn next(&mut self) -> impl Future<Output = Option<ChatEvent>> + Send;
}

impl Events for ChatSession {
    fn next(&mut self) -> impl Future<Output = Option<ChatEvent>> + Send {
        self.next_event()
    }
}

impl Events for EventStream {
    fn next(&mut self) -> impl Future<Output = Option<ChatEvent>> + Send {
        self.next_event()
    }
}

/// Skip events until one matches, failing the test after a few seconds.
pub async fn wait_for<E, F>(events: &mut E, mut matches: F) -> ChatEvent
where
    E: Events,
    F: FnMut(&ChatEvent) -> bool,
{
    let found = tokio::time::timeout(EVENT_TIMEOUT, async {
        while let Some(event) = events.next().await {
            if matches(&event) {
                return Some(event);
            }
        }
        None
    })
    .await;

    match found {
        Ok(Some(event)) => event,
        Ok(None) => panic!("connection closed before the expected event"),
        Err(_) => panic!("timed out waiting for event"),
    }
}

/// Collect every event until one matches `barrier`; the barrier is not included.
pub async fn collect_until<E, F>(events: &mut E, mut barrier: F) -> Vec<ChatEvent>
where
    E: Events,
    F: FnMut(&ChatEvent) -> bool,
{
    let mut seen = Vec::new();
    wait_for(events, |event| {
        if barrier(event) {
            true
        } else {
            seen.push(event.clone());
            false
        }
    })
    .await;
    seen
}

/// Round-trip a command on the connection. Once the answer is back the
/// server has finished setting the connection up, presence included.
pub async fn settle(connection: &mut Connection) {
    let marker = Uuid::new_v4();
    connection
        .commands
        .send(ChatCommand::CheckOnlineStatus { user_id: marker })
        .expect("connection open");
    wait_for(&mut connection.events, |event| {
        matches!(event, ChatEvent::UserStatusChange { user_id, .. } if *user_id == marker)
    })
    .await;
}

/// In-memory store whose unread sweep fails; everything else works.
pub struct SweepFailingStore(pub Database);

impl ChatStore for SweepFailingStore {
    fn get_or_create_conversation(&self, client_id: Uuid, seller_id: Uuid) -> anyhow::Result<(Conversation, bool)> {
        ChatStore::get_or_create_conversation(&self.0, client_id, seller_id)
    }

    fn conversation(&self, id: Uuid) -> anyhow::Result<Option<Conversation>> {
        ChatStore::conversation(&self.0, id)
    }

    fn conversations_for(&self, user_id: Uuid) -> anyhow::Result<Vec<ConversationSummary>> {
        ChatStore::conversations_for(&self.0, user_id)
    }

    fn append_message(&self, conversation_id: Uuid, sender_id: Uuid, text: &str) -> anyhow::Result<ChatMessage> {
        ChatStore::append_message(&self.0, conversation_id, sender_id, text)
    }

    fn history(&self, conversation_id: Uuid) -> anyhow::Result<Vec<ChatMessage>> {
        ChatStore::history(&self.0, conversation_id)
    }

    fn mark_read(&self, conversation_id: Uuid, message_id: Uuid, reader_id: Uuid) -> anyhow::Result<ReadTransition> {
        ChatStore::mark_read(&self.0, conversation_id, message_id, reader_id)
    }

    fn mark_all_read(&self, _: Uuid, _: Uuid) -> anyhow::Result<usize> {
        anyhow::bail!("database is locked")
    }
}
