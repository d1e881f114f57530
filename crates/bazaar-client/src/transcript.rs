use uuid::Uuid;

use bazaar_types::events::ChatEvent;
use bazaar_types::models::ChatMessage;

/// One line of the local transcript.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Entry {
    /// Shown optimistically, not yet confirmed by the server.
    Pending { client_ref: String, text: String },
    /// The server's canonical record.
    Sent(ChatMessage),
}

impl Entry {
    pub fn text(&self) -> &str {
        match self {
            Entry::Pending { text, .. } => text,
            Entry::Sent(message) => &message.text,
        }
    }
}

/// Local state of one conversation as a chat screen shows it.
#[derive(Debug, Clone)]
pub struct Transcript {
    conversation_id: Uuid,
    me: Uuid,
    entries: Vec<Entry>,
}

impl Transcript {
    pub fn new(conversation_id: Uuid, me: Uuid, history: Vec<ChatMessage>) -> Self {
        let mut transcript = Self {
            conversation_id,
            me,
            entries: Vec::with_capacity(history.len()),
        };
        for message in history {
            transcript.receive(message);
        }
        transcript
    }

    pub fn entries(&self) -> &[Entry] {
        &self.entries
    }

    pub fn messages(&self) -> impl Iterator<Item = &ChatMessage> {
        self.entries.iter().filter_map(|entry| match entry {
            Entry::Sent(message) => Some(message),
            Entry::Pending { .. } => None,
        })
    }

    pub fn pending_count(&self) -> usize {
        self.entries
            .iter()
            .filter(|entry| matches!(entry, Entry::Pending { .. }))
            .count()
    }

    /// Messages from the counterpart this user has not read yet.
    pub fn unread_count(&self) -> usize {
        self.messages()
            .filter(|m| m.sender_id != self.me && !m.is_read)
            .count()
    }

    /// Append an optimistic echo and return the `client_ref` to send it with.
    ///
    /// Blank text gets no echo and `None`: the server drops such messages
    /// without a reply, so the echo could never be resolved.
    pub fn push_pending(&mut self, text: impl Into<String>) -> Option<String> {
        let text = text.into();
        if text.trim().is_empty() {
            return None;
        }

        let client_ref = Uuid::new_v4().to_string();
        self.entries.push(Entry::Pending {
            client_ref: client_ref.clone(),
            text,
        });
        Some(client_ref)
    }

    /// Fold one live event into the transcript. Returns true if anything changed.
    pub fn apply(&mut self, event: &ChatEvent) -> bool {
        if event.conversation_id() != Some(self.conversation_id) {
            return false;
        }

        match event {
            ChatEvent::ReceiveMessage(message) => self.receive(message.clone()),

            ChatEvent::SendFailed {
                client_ref: Some(client_ref),
                ..
            } => {
                let before = self.entries.len();
                self.entries.retain(|entry| {
                    !matches!(entry, Entry::Pending { client_ref: r, .. } if r == client_ref)
                });
                self.entries.len() != before
            }

            ChatEvent::MessagesRead { reader_id, .. } => {
                let mut changed = false;
                for entry in &mut self.entries {
                    if let Entry::Sent(message) = entry {
                        if message.sender_id != *reader_id && !message.is_read {
                            message.is_read = true;
                            changed = true;
                        }
                    }
                }
                changed
            }

            _ => false,
        }
    }

    fn receive(&mut self, message: ChatMessage) -> bool {
        let known = self
            .messages()
            .any(|existing| existing.id == message.id);
        if known {
            return false;
        }

        // Our own message replaces the oldest echo with the same text
        if message.sender_id == self.me {
            let echo = self.entries.iter().position(
                |entry| matches!(entry, Entry::Pending { text, .. } if *text == message.text),
            );
            if let Some(index) = echo {
                self.entries[index] = Entry::Sent(message);
                return true;
            }
        }

        self.entries.push(Entry::Sent(message));
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    struct Fixture {
        conversation_id: Uuid,
        me: Uuid,
        other: Uuid,
    }

    impl Fixture {
        fn new() -> Self {
            Self {
                conversation_id: Uuid::new_v4(),
                me: Uuid::new_v4(),
                other: Uuid::new_v4(),
            }
        }

        fn message(&self, sender_id: Uuid, text: &str) -> ChatMessage {
            ChatMessage {
                id: Uuid::new_v4(),
                conversation_id: self.conversation_id,
                sender_id,
                text: text.to_string(),
                is_read: false,
                created_at: Utc::now(),
            }
        }
    }

    #[test]
    fn echo_is_replaced_by_the_canonical_record() {
        let f = Fixture::new();
        let mut transcript = Transcript::new(f.conversation_id, f.me, Vec::new());

        transcript.push_pending("Hello").unwrap();
        transcript.push_pending("Hello").unwrap();
        assert_eq!(transcript.pending_count(), 2);

        let canonical = f.message(f.me, "Hello");
        assert!(transcript.apply(&ChatEvent::ReceiveMessage(canonical.clone())));

        assert_eq!(transcript.entries()[0], Entry::Sent(canonical));
        assert_eq!(transcript.pending_count(), 1);
        assert_eq!(transcript.entries().len(), 2);
    }

    #[test]
    fn blank_text_gets_no_echo() {
        let f = Fixture::new();
        let mut transcript = Transcript::new(f.conversation_id, f.me, Vec::new());

        assert_eq!(transcript.push_pending(""), None);
        assert_eq!(transcript.push_pending(" \n\t"), None);
        assert_eq!(transcript.pending_count(), 0);
        assert!(transcript.push_pending(" hi ").is_some());
    }

    #[test]
    fn duplicates_are_ignored() {
        let f = Fixture::new();
        let message = f.message(f.other, "Is it available?");
        let mut transcript = Transcript::new(f.conversation_id, f.me, vec![message.clone()]);

        assert!(!transcript.apply(&ChatEvent::ReceiveMessage(message)));
        assert_eq!(transcript.entries().len(), 1);
        assert_eq!(transcript.unread_count(), 1);
    }

    #[test]
    fn send_failed_rolls_back_the_matching_echo() {
        let f = Fixture::new();
        let mut transcript = Transcript::new(f.conversation_id, f.me, Vec::new());
        let keep = transcript.push_pending("first").unwrap();
        let lost = transcript.push_pending("second").unwrap();

        let failed = ChatEvent::SendFailed {
            conversation_id: f.conversation_id,
            client_ref: Some(lost),
            reason: "storage unavailable".into(),
        };
        assert!(transcript.apply(&failed));

        assert_eq!(
            transcript.entries(),
            &[Entry::Pending {
                client_ref: keep,
                text: "first".into(),
            }]
        );
        assert!(!transcript.apply(&failed));
    }

    #[test]
    fn counterpart_reading_flips_own_messages() {
        let f = Fixture::new();
        let mine = f.message(f.me, "Hello");
        let theirs = f.message(f.other, "Hi");
        let mut transcript = Transcript::new(f.conversation_id, f.me, vec![mine, theirs]);

        let read = ChatEvent::MessagesRead {
            conversation_id: f.conversation_id,
            reader_id: f.other,
        };
        assert!(transcript.apply(&read));

        let flags: Vec<_> = transcript.messages().map(|m| (m.sender_id, m.is_read)).collect();
        assert_eq!(flags, vec![(f.me, true), (f.other, false)]);
        assert!(!transcript.apply(&read));
    }

    #[test]
    fn events_for_other_conversations_are_ignored() {
        let f = Fixture::new();
        let mut transcript = Transcript::new(f.conversation_id, f.me, Vec::new());
        let elsewhere = Fixture::new();

        assert!(!transcript.apply(&ChatEvent::ReceiveMessage(elsewhere.message(f.other, "x"))));
        assert!(transcript.entries().is_empty());
    }
}
