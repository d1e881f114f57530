//! Message pipeline: validate, persist, then deliver to the room.

use tracing::debug;
use uuid::Uuid;

use bazaar_types::events::ChatEvent;
use bazaar_types::models::ChatMessage;

use crate::Gateway;
use crate::error::ChatError;

/// Reject bodies that are empty or whitespace only.
pub fn validate_text(text: &str) -> Result<(), ChatError> {
    if text.trim().is_empty() {
        return Err(ChatError::Validation("message body is empty"));
    }
    Ok(())
}

impl Gateway {
    /// Persist a message from `sender_id` and fan the stored record out to
    /// every connection in the room, the sender's own included.
    ///
    /// Nothing is delivered unless the store accepted the write. Persist and
    /// fan-out run under the conversation's sequencer, so subscribers see
    /// messages in commit order.
    pub async fn send_message(
        &self,
        sender_id: Uuid,
        conversation_id: Uuid,
        text: String,
    ) -> Result<ChatMessage, ChatError> {
        validate_text(&text)?;
        self.authorize(sender_id, conversation_id).await?;

        let _turn = self.take_turn(conversation_id).await;

        let message = self
            .persist(move |store| store.append_message(conversation_id, sender_id, &text))
            .await?;

        let reached = self
            .dispatcher()
            .send_to_room(conversation_id, ChatEvent::ReceiveMessage(message.clone()), None)
            .await;

        debug!(
            "Message {} in conversation {} delivered to {} connections",
            message.id, conversation_id, reached
        );

        Ok(message)
    }
}
