use std::collections::HashMap;
use std::time::{Duration, Instant};

use uuid::Uuid;

use bazaar_types::events::ChatEvent;

/// A remote typing flag not refreshed within this window is cleared.
pub const DEFAULT_TYPING_TTL: Duration = Duration::from_secs(2);

/// Remote typing indicators with client-side expiry. The server never
/// clears a flag on its own, e.g. when the typist disconnects mid-sentence.
#[derive(Debug, Clone)]
pub struct TypingIndicator {
    ttl: Duration,
    /// (conversation_id, user_id) -> last `is_typing: true`
    active: HashMap<(Uuid, Uuid), Instant>,
}

impl Default for TypingIndicator {
    fn default() -> Self {
        Self::new(DEFAULT_TYPING_TTL)
    }
}

impl TypingIndicator {
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            active: HashMap::new(),
        }
    }

    /// Returns true if the event was a typing update.
    pub fn apply(&mut self, event: &ChatEvent, now: Instant) -> bool {
        let ChatEvent::UserTyping {
            conversation_id,
            user_id,
            is_typing,
        } = *event
        else {
            return false;
        };

        if is_typing {
            self.active.insert((conversation_id, user_id), now);
        } else {
            self.active.remove(&(conversation_id, user_id));
        }
        true
    }

    pub fn is_typing(&self, conversation_id: Uuid, user_id: Uuid, now: Instant) -> bool {
        self.active
            .get(&(conversation_id, user_id))
            .is_some_and(|since| now.saturating_duration_since(*since) < self.ttl)
    }

    pub fn typing_in(&self, conversation_id: Uuid, now: Instant) -> Vec<Uuid> {
        self.active
            .iter()
            .filter(|((conv, _), since)| {
                *conv == conversation_id && now.saturating_duration_since(**since) < self.ttl
            })
            .map(|((_, user), _)| *user)
            .collect()
    }

    /// Drop expired flags.
    pub fn prune(&mut self, now: Instant) {
        let ttl = self.ttl;
        self.active
            .retain(|_, since| now.saturating_duration_since(*since) < ttl);
    }
}

/// Decides when this user's own typing flag goes out, so a burst of
/// keystrokes refreshes the remote indicator without flooding the socket.
#[derive(Debug, Clone)]
pub struct OutgoingTyping {
    refresh: Duration,
    idle: Duration,
    last_sent: Option<Instant>,
    last_input: Option<Instant>,
}

impl Default for OutgoingTyping {
    fn default() -> Self {
        Self::new(DEFAULT_TYPING_TTL / 2, DEFAULT_TYPING_TTL)
    }
}

impl OutgoingTyping {
    pub fn new(refresh: Duration, idle: Duration) -> Self {
        Self {
            refresh,
            idle,
            last_sent: None,
            last_input: None,
        }
    }

    /// A keystroke. Returns `Some(true)` when a typing flag should be sent.
    pub fn on_input(&mut self, now: Instant) -> Option<bool> {
        self.last_input = Some(now);
        let due = self
            .last_sent
            .is_none_or(|sent| now.saturating_duration_since(sent) >= self.refresh);
        if due {
            self.last_sent = Some(now);
            Some(true)
        } else {
            None
        }
    }

    /// Periodic check. Returns `Some(false)` once input has paused long enough.
    pub fn on_tick(&mut self, now: Instant) -> Option<bool> {
        let input = self.last_input?;
        if now.saturating_duration_since(input) >= self.idle {
            self.reset()
        } else {
            None
        }
    }

    /// The message went out; stop the indicator right away.
    pub fn on_send(&mut self) -> Option<bool> {
        self.reset()
    }

    fn reset(&mut self) -> Option<bool> {
        self.last_input = None;
        self.last_sent.take().map(|_| false)
    }
}
