pub mod connection;
pub mod conversations;
pub mod dispatcher;
pub mod error;
pub mod identity;
pub mod persist;
pub mod pipeline;
pub mod presence;
pub mod receipts;
pub mod rooms;

#[cfg(test)]
mod testing;

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use tokio::sync::OwnedMutexGuard;
use uuid::Uuid;

use bazaar_db::ChatStore;

pub use dispatcher::{Dispatcher, PresenceScope};
pub use error::ChatError;
pub use presence::ConnId;

/// Default persistence timeout for store calls made on behalf of a connection.
pub const DEFAULT_PERSIST_TIMEOUT: Duration = Duration::from_secs(5);

/// Heartbeat interval: server sends a Ping every 15 seconds.
/// If 2 consecutive Pongs are missed (~30s), the connection is dropped.
pub const DEFAULT_HEARTBEAT_INTERVAL: Duration = Duration::from_secs(15);

#[derive(Debug, Clone)]
pub struct GatewaySettings {
    /// HS256 secret used to verify session tokens.
    pub jwt_secret: String,
    pub persist_timeout: Duration,
    pub presence_scope: PresenceScope,
    pub heartbeat_interval: Duration,
}

impl GatewaySettings {
    pub fn new(jwt_secret: impl Into<String>) -> Self {
        Self {
            jwt_secret: jwt_secret.into(),
            persist_timeout: DEFAULT_PERSIST_TIMEOUT,
            presence_scope: PresenceScope::Global,
            heartbeat_interval: DEFAULT_HEARTBEAT_INTERVAL,
        }
    }
}

/// The chat core: live connections, rooms, presence and the message store.
///
/// Cheap to clone. Must be created inside a Tokio runtime because the
/// presence registry runs as its own task.
#[derive(Clone)]
pub struct Gateway {
    inner: Arc<GatewayInner>,
}

struct GatewayInner {
    dispatcher: Dispatcher,
    store: Arc<dyn ChatStore>,
    settings: GatewaySettings,
    /// Per-conversation lock held across persist + fan-out
    sequencers: Mutex<HashMap<Uuid, Arc<tokio::sync::Mutex<()>>>>,
}

impl Gateway {
    pub fn new(store: Arc<dyn ChatStore>, settings: GatewaySettings) -> Self {
        Self {
            inner: Arc::new(GatewayInner {
                dispatcher: Dispatcher::new(settings.presence_scope),
                store,
                settings,
                sequencers: Mutex::new(HashMap::new()),
            }),
        }
    }

    pub fn dispatcher(&self) -> &Dispatcher {
        &self.inner.dispatcher
    }

    pub fn store(&self) -> &Arc<dyn ChatStore> {
        &self.inner.store
    }

    pub fn settings(&self) -> &GatewaySettings {
        &self.inner.settings
    }

    /// Wait for the conversation's sequencer. Sends holding a turn for the
    /// same conversation run one after the other.
    async fn take_turn(&self, conversation_id: Uuid) -> SequencerTurn<'_> {
        let sequencer = {
            let mut sequencers = self
                .inner
                .sequencers
                .lock()
                .unwrap_or_else(PoisonError::into_inner);
            sequencers.entry(conversation_id).or_default().clone()
        };

        SequencerTurn {
            gateway: self,
            conversation_id,
            guard: Some(sequencer.lock_owned().await),
        }
    }

    #[cfg(test)]
    fn sequencer_count(&self) -> usize {
        self.inner
            .sequencers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }
}

/// A held sequencer. Dropping it releases the turn and forgets the
/// conversation's lock once no other send holds or awaits it.
struct SequencerTurn<'a> {
    gateway: &'a Gateway,
    conversation_id: Uuid,
    guard: Option<OwnedMutexGuard<()>>,
}

impl Drop for SequencerTurn<'_> {
    fn drop(&mut self) {
        self.guard.take();

        let mut sequencers = self
            .gateway
            .inner
            .sequencers
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        let idle = sequencers
            .get(&self.conversation_id)
            .is_some_and(|sequencer| Arc::strong_count(sequencer) == 1);
        if idle {
            sequencers.remove(&self.conversation_id);
        }
    }
}
