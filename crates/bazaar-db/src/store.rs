use std::collections::HashMap;

use anyhow::{Context, Result};
use uuid::Uuid;

use bazaar_types::api::ConversationSummary;
use bazaar_types::models::{ChatMessage, Conversation};

use crate::Database;
use crate::models::{ConversationRow, MessageRow};
use crate::queries::parse_timestamp;

/// Outcome of a single-message read request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReadTransition {
    /// The flag moved from false to true.
    Marked,
    /// Already read, or the reader is the sender. Nothing changed.
    Unchanged,
    /// No such message in that conversation.
    Missing,
}

/// The persistence collaborator the chat core talks to. Every method is
/// blocking; callers run them off the async runtime.
pub trait ChatStore: Send + Sync + 'static {
    /// Idempotent lookup of the conversation between a client and a seller.
    /// The bool is true when the conversation was created by this call.
    fn get_or_create_conversation(&self, client_id: Uuid, seller_id: Uuid) -> Result<(Conversation, bool)>;

    fn conversation(&self, id: Uuid) -> Result<Option<Conversation>>;

    /// The user's conversations, most recently active first.
    fn conversations_for(&self, user_id: Uuid) -> Result<Vec<ConversationSummary>>;

    /// Persists a new unread message with a server-assigned id and timestamp.
    fn append_message(&self, conversation_id: Uuid, sender_id: Uuid, text: &str) -> Result<ChatMessage>;

    /// All messages of the conversation in ascending chronological order.
    fn history(&self, conversation_id: Uuid) -> Result<Vec<ChatMessage>>;

    fn mark_read(&self, conversation_id: Uuid, message_id: Uuid, reader_id: Uuid) -> Result<ReadTransition>;

    /// Marks every unread message not sent by `reader_id`; returns how many changed.
    fn mark_all_read(&self, conversation_id: Uuid, reader_id: Uuid) -> Result<usize>;
}

impl ChatStore for Database {
    fn get_or_create_conversation(&self, client_id: Uuid, seller_id: Uuid) -> Result<(Conversation, bool)> {
        let new_id = Uuid::new_v4();
        let (row, created) = Database::get_or_create_conversation(
            self,
            &new_id.to_string(),
            &client_id.to_string(),
            &seller_id.to_string(),
        )?;
        Ok((row.try_into()?, created))
    }

    fn conversation(&self, id: Uuid) -> Result<Option<Conversation>> {
        self.get_conversation(&id.to_string())?
            .map(Conversation::try_from)
            .transpose()
    }

    fn conversations_for(&self, user_id: Uuid) -> Result<Vec<ConversationSummary>> {
        let uid = user_id.to_string();
        let rows = self.list_conversations(&uid)?;

        let mut last_messages: HashMap<Uuid, ChatMessage> = HashMap::new();
        for row in self.last_messages_for_user(&uid)? {
            let message = ChatMessage::try_from(row)?;
            last_messages.insert(message.conversation_id, message);
        }

        let mut summaries = Vec::with_capacity(rows.len());
        for row in rows {
            let conversation = Conversation::try_from(row.conversation)?;
            let Some(companion_id) = conversation.counterpart_of(user_id) else {
                continue;
            };
            summaries.push((
                conversation.created_at,
                ConversationSummary {
                    conversation_id: conversation.id,
                    companion_id,
                    last_message: last_messages.remove(&conversation.id),
                    unread_count: row.unread_count.max(0) as u64,
                },
            ));
        }

        summaries.sort_by(|(a_created, a), (b_created, b)| {
            let a_active = a.last_message.as_ref().map_or(*a_created, |m| m.created_at);
            let b_active = b.last_message.as_ref().map_or(*b_created, |m| m.created_at);
            b_active.cmp(&a_active)
        });

        Ok(summaries.into_iter().map(|(_, summary)| summary).collect())
    }

    fn append_message(&self, conversation_id: Uuid, sender_id: Uuid, text: &str) -> Result<ChatMessage> {
        let row = self.insert_message(
            &Uuid::new_v4().to_string(),
            &conversation_id.to_string(),
            &sender_id.to_string(),
            text,
        )?;
        row.try_into()
    }

    fn history(&self, conversation_id: Uuid) -> Result<Vec<ChatMessage>> {
        self.get_messages(&conversation_id.to_string())?
            .into_iter()
            .map(ChatMessage::try_from)
            .collect()
    }

    fn mark_read(&self, conversation_id: Uuid, message_id: Uuid, reader_id: Uuid) -> Result<ReadTransition> {
        let Some(row) = self.get_message(&message_id.to_string())? else {
            return Ok(ReadTransition::Missing);
        };
        let message = ChatMessage::try_from(row)?;

        if message.conversation_id != conversation_id {
            return Ok(ReadTransition::Missing);
        }
        if message.is_read || message.sender_id == reader_id {
            return Ok(ReadTransition::Unchanged);
        }

        match self.set_message_read(&message_id.to_string())? {
            0 => Ok(ReadTransition::Unchanged),
            _ => Ok(ReadTransition::Marked),
        }
    }

    fn mark_all_read(&self, conversation_id: Uuid, reader_id: Uuid) -> Result<usize> {
        self.mark_conversation_read(&conversation_id.to_string(), &reader_id.to_string())
    }
}

impl TryFrom<ConversationRow> for Conversation {
    type Error = anyhow::Error;

    fn try_from(row: ConversationRow) -> Result<Self> {
        Ok(Conversation {
            id: row.id.parse().with_context(|| format!("corrupt conversation id '{}'", row.id))?,
            client_id: row
                .client_id
                .parse()
                .with_context(|| format!("corrupt client_id on conversation '{}'", row.id))?,
            seller_id: row
                .seller_id
                .parse()
                .with_context(|| format!("corrupt seller_id on conversation '{}'", row.id))?,
            created_at: parse_timestamp(&row.created_at)
                .with_context(|| format!("corrupt created_at on conversation '{}'", row.id))?,
        })
    }
}

impl TryFrom<MessageRow> for ChatMessage {
    type Error = anyhow::Error;

    fn try_from(row: MessageRow) -> Result<Self> {
        Ok(ChatMessage {
            id: row.id.parse().with_context(|| format!("corrupt message id '{}'", row.id))?,
            conversation_id: row
                .conversation_id
                .parse()
                .with_context(|| format!("corrupt conversation_id on message '{}'", row.id))?,
            sender_id: row
                .sender_id
                .parse()
                .with_context(|| format!("corrupt sender_id on message '{}'", row.id))?,
            created_at: parse_timestamp(&row.created_at)
                .with_context(|| format!("corrupt created_at on message '{}'", row.id))?,
            text: row.body,
            is_read: row.is_read,
        })
    }
}
