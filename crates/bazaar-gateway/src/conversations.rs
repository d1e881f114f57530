use tracing::info;
use uuid::Uuid;

use bazaar_types::api::ConversationSummary;
use bazaar_types::models::{ChatMessage, Conversation, Identity, Role};

use crate::Gateway;
use crate::error::ChatError;

/// A conversation's full history plus the id of the caller's counterpart.
#[derive(Debug, Clone)]
pub struct Bootstrap {
    pub history: Vec<ChatMessage>,
    pub counterpart_id: Uuid,
}

impl Gateway {
    /// Resolve a conversation and check that `user_id` takes part in it.
    pub async fn authorize(
        &self,
        user_id: Uuid,
        conversation_id: Uuid,
    ) -> Result<Conversation, ChatError> {
        let conversation = self
            .persist(move |store| store.conversation(conversation_id))
            .await?
            .ok_or_else(|| ChatError::NotFound(format!("conversation {conversation_id}")))?;

        if !conversation.is_participant(user_id) {
            return Err(ChatError::Forbidden(format!(
                "user {user_id} is not a participant of conversation {conversation_id}"
            )));
        }

        Ok(conversation)
    }

    /// Get-or-create the conversation between the caller and a counterpart.
    /// The caller's role decides which side of the pair they are on.
    pub async fn open_conversation(
        &self,
        caller: Identity,
        counterpart_id: Uuid,
    ) -> Result<(Conversation, bool), ChatError> {
        if counterpart_id == caller.user_id {
            return Err(ChatError::Validation("cannot open a conversation with yourself"));
        }

        let (client_id, seller_id) = match caller.role {
            Role::Client => (caller.user_id, counterpart_id),
            Role::Seller => (counterpart_id, caller.user_id),
            Role::Admin => {
                return Err(ChatError::Forbidden(
                    "admins do not take part in conversations".to_string(),
                ));
            }
        };

        let (conversation, created) = self
            .persist(move |store| store.get_or_create_conversation(client_id, seller_id))
            .await?;

        if created {
            info!(
                "Conversation {} opened between client {} and seller {}",
                conversation.id, client_id, seller_id
            );
        }

        Ok((conversation, created))
    }

    /// One-shot history fetch used before attaching to the live stream.
    pub async fn bootstrap(
        &self,
        user_id: Uuid,
        conversation_id: Uuid,
    ) -> Result<Bootstrap, ChatError> {
        let conversation = self.authorize(user_id, conversation_id).await?;
        let history = self
            .persist(move |store| store.history(conversation_id))
            .await?;

        Ok(Bootstrap {
            history,
            counterpart_id: conversation
                .counterpart_of(user_id)
                .ok_or_else(|| ChatError::Forbidden(format!("user {user_id} has no counterpart")))?,
        })
    }

    pub async fn conversations_for(
        &self,
        user_id: Uuid,
    ) -> Result<Vec<ConversationSummary>, ChatError> {
        self.persist(move |store| store.conversations_for(user_id))
            .await
    }
}
