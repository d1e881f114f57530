//! Joining rooms, read receipts and typing indicators.

use tracing::debug;
use uuid::Uuid;

use bazaar_db::ReadTransition;
use bazaar_types::events::ChatEvent;

use crate::Gateway;
use crate::error::ChatError;
use crate::presence::ConnId;

impl Gateway {
    /// Subscribe a connection to a conversation room after re-checking that
    /// the user takes part in it. Everything the counterpart sent so far is
    /// marked read. Returns how many messages that sweep changed.
    pub async fn join_chat(
        &self,
        conn_id: ConnId,
        user_id: Uuid,
        conversation_id: Uuid,
    ) -> Result<usize, ChatError> {
        let conversation = self.authorize(user_id, conversation_id).await?;
        let dispatcher = self.dispatcher();

        let added = dispatcher.rooms().join(conn_id, user_id, &conversation).await;
        if added {
            debug!("Connection {} joined room {}", conn_id, conversation_id);
        }

        let marked = match self
            .persist(move |store| store.mark_all_read(conversation_id, user_id))
            .await
        {
            Ok(marked) => marked,
            Err(e) => {
                // A rejected join leaves no subscription behind
                if added {
                    dispatcher.rooms().leave(conn_id, conversation_id).await;
                }
                return Err(e);
            }
        };

        if marked > 0 {
            dispatcher
                .send_to_room(
                    conversation_id,
                    ChatEvent::MessagesRead {
                        conversation_id,
                        reader_id: user_id,
                    },
                    None,
                )
                .await;
        }

        dispatcher
            .send_to_connection(conn_id, ChatEvent::Joined { conversation_id })
            .await;

        Ok(marked)
    }

    /// Mark one message read on behalf of `reader_id`. The room hears about
    /// it only when the flag actually changed.
    pub async fn mark_as_read(
        &self,
        reader_id: Uuid,
        conversation_id: Uuid,
        message_id: Uuid,
    ) -> Result<ReadTransition, ChatError> {
        self.authorize(reader_id, conversation_id).await?;

        let transition = self
            .persist(move |store| store.mark_read(conversation_id, message_id, reader_id))
            .await?;

        match transition {
            ReadTransition::Marked => {
                self.dispatcher()
                    .send_to_room(
                        conversation_id,
                        ChatEvent::MessagesRead {
                            conversation_id,
                            reader_id,
                        },
                        None,
                    )
                    .await;
            }
            ReadTransition::Unchanged => {}
            ReadTransition::Missing => {
                return Err(ChatError::NotFound(format!(
                    "message {message_id} in conversation {conversation_id}"
                )));
            }
        }

        Ok(transition)
    }

    /// Relay a typing flag to everyone else in the room. Pure pass-through;
    /// receivers expire stale indicators themselves.
    pub async fn set_typing(
        &self,
        conn_id: ConnId,
        user_id: Uuid,
        conversation_id: Uuid,
        is_typing: bool,
    ) -> Result<usize, ChatError> {
        let dispatcher = self.dispatcher();

        if !dispatcher.rooms().is_member(conn_id, conversation_id).await {
            return Err(ChatError::Forbidden(format!(
                "connection {conn_id} has not joined conversation {conversation_id}"
            )));
        }

        Ok(dispatcher
            .send_to_room(
                conversation_id,
                ChatEvent::UserTyping {
                    conversation_id,
                    user_id,
                    is_typing,
                },
                Some(user_id),
            )
            .await)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{SweepFailingStore, gateway, gateway_with, open_pair};
    use std::sync::Arc;

    #[tokio::test]
    async fn join_marks_counterpart_messages_read_and_acks() {
        let gw = gateway();
        let conv = open_pair(&gw).await;
        for text in ["one", "two"] {
            gw.send_message(conv.client_id, conv.id, text.into()).await.unwrap();
        }

        let (client_conn, mut client_rx) = gw.dispatcher().register_connection(conv.client_id).await;
        gw.join_chat(client_conn, conv.client_id, conv.id).await.unwrap();
        assert_eq!(
            client_rx.try_recv().unwrap(),
            ChatEvent::Joined { conversation_id: conv.id }
        );

        let (seller_conn, mut seller_rx) = gw.dispatcher().register_connection(conv.seller_id).await;
        let marked = gw.join_chat(seller_conn, conv.seller_id, conv.id).await.unwrap();
        assert_eq!(marked, 2);

        let read = ChatEvent::MessagesRead {
            conversation_id: conv.id,
            reader_id: conv.seller_id,
        };
        assert_eq!(client_rx.try_recv().unwrap(), read);
        assert_eq!(seller_rx.try_recv().unwrap(), read);
        assert_eq!(
            seller_rx.try_recv().unwrap(),
            ChatEvent::Joined { conversation_id: conv.id }
        );

        let history = gw.store().history(conv.id).unwrap();
        assert!(history.iter().all(|m| m.is_read));
    }

    #[tokio::test]
    async fn join_without_unread_sends_only_the_ack() {
        let gw = gateway();
        let conv = open_pair(&gw).await;
        gw.send_message(conv.client_id, conv.id, "mine".into()).await.unwrap();

        let (conn, mut rx) = gw.dispatcher().register_connection(conv.client_id).await;
        assert_eq!(gw.join_chat(conn, conv.client_id, conv.id).await.unwrap(), 0);
        assert_eq!(rx.try_recv().unwrap(), ChatEvent::Joined { conversation_id: conv.id });
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn outsiders_cannot_join() {
        let gw = gateway();
        let conv = open_pair(&gw).await;
        let outsider = Uuid::new_v4();
        let (conn, mut rx) = gw.dispatcher().register_connection(outsider).await;

        let result = gw.join_chat(conn, outsider, conv.id).await;
        assert!(matches!(result, Err(ChatError::Forbidden(_))));
        assert!(!gw.dispatcher().rooms().is_member(conn, conv.id).await);

        // A later message in that room never reaches the rejected connection
        gw.send_message(conv.client_id, conv.id, "private".into()).await.unwrap();
        assert!(rx.try_recv().is_err());

        let unknown = gw.join_chat(conn, outsider, Uuid::new_v4()).await;
        assert!(matches!(unknown, Err(ChatError::NotFound(_))));
    }

    #[tokio::test]
    async fn failed_read_sweep_leaves_no_subscription() {
        let gw = gateway_with(Arc::new(SweepFailingStore::new()));
        let conv = open_pair(&gw).await;
        let (conn, mut rx) = gw.dispatcher().register_connection(conv.seller_id).await;

        let result = gw.join_chat(conn, conv.seller_id, conv.id).await;
        assert!(matches!(result, Err(ChatError::Persistence(_))));
        assert!(!gw.dispatcher().rooms().is_member(conn, conv.id).await);
        assert_eq!(gw.dispatcher().rooms().room_count().await, 0);

        gw.send_message(conv.client_id, conv.id, "leak".into()).await.unwrap();
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn failed_rejoin_keeps_the_earlier_subscription() {
        let store = Arc::new(SweepFailingStore::new());
        let gw = gateway_with(store);
        let conv = open_pair(&gw).await;
        let (conn, _rx) = gw.dispatcher().register_connection(conv.seller_id).await;
        let room = gw.store().conversation(conv.id).unwrap().unwrap();
        gw.dispatcher().rooms().join(conn, conv.seller_id, &room).await;

        assert!(gw.join_chat(conn, conv.seller_id, conv.id).await.is_err());
        assert!(gw.dispatcher().rooms().is_member(conn, conv.id).await);
    }

    #[tokio::test]
    async fn mark_as_read_broadcasts_once() {
        let gw = gateway();
        let conv = open_pair(&gw).await;
        let (client_conn, mut client_rx) = gw.dispatcher().register_connection(conv.client_id).await;
        gw.join_chat(client_conn, conv.client_id, conv.id).await.unwrap();
        let _ = client_rx.try_recv();

        let message = gw
            .send_message(conv.client_id, conv.id, "Is this still available?".into())
            .await
            .unwrap();
        let _ = client_rx.try_recv();

        // Sender reading their own message changes nothing
        let own = gw.mark_as_read(conv.client_id, conv.id, message.id).await.unwrap();
        assert_eq!(own, ReadTransition::Unchanged);
        assert!(client_rx.try_recv().is_err());

        let first = gw.mark_as_read(conv.seller_id, conv.id, message.id).await.unwrap();
        assert_eq!(first, ReadTransition::Marked);
        assert_eq!(
            client_rx.try_recv().unwrap(),
            ChatEvent::MessagesRead {
                conversation_id: conv.id,
                reader_id: conv.seller_id,
            }
        );

        let again = gw.mark_as_read(conv.seller_id, conv.id, message.id).await.unwrap();
        assert_eq!(again, ReadTransition::Unchanged);
        assert!(client_rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn mark_as_read_checks_participation_and_existence() {
        let gw = gateway();
        let conv = open_pair(&gw).await;
        let message = gw.send_message(conv.client_id, conv.id, "hi".into()).await.unwrap();

        let outsider = gw.mark_as_read(Uuid::new_v4(), conv.id, message.id).await;
        assert!(matches!(outsider, Err(ChatError::Forbidden(_))));

        let missing = gw.mark_as_read(conv.seller_id, conv.id, Uuid::new_v4()).await;
        assert!(matches!(missing, Err(ChatError::NotFound(_))));

        assert!(!gw.store().history(conv.id).unwrap()[0].is_read);
    }

    #[tokio::test]
    async fn typing_reaches_the_counterpart_only() {
        let gw = gateway();
        let conv = open_pair(&gw).await;
        let (client_conn, mut client_rx) = gw.dispatcher().register_connection(conv.client_id).await;
        let (seller_conn, mut seller_rx) = gw.dispatcher().register_connection(conv.seller_id).await;
        gw.join_chat(client_conn, conv.client_id, conv.id).await.unwrap();
        gw.join_chat(seller_conn, conv.seller_id, conv.id).await.unwrap();
        while client_rx.try_recv().is_ok() {}
        while seller_rx.try_recv().is_ok() {}

        let reached = gw.set_typing(client_conn, conv.client_id, conv.id, true).await.unwrap();
        assert_eq!(reached, 1);
        assert_eq!(
            seller_rx.try_recv().unwrap(),
            ChatEvent::UserTyping {
                conversation_id: conv.id,
                user_id: conv.client_id,
                is_typing: true,
            }
        );
        assert!(client_rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn typing_requires_room_membership() {
        let gw = gateway();
        let conv = open_pair(&gw).await;
        let (conn, _rx) = gw.dispatcher().register_connection(conv.client_id).await;

        let result = gw.set_typing(conn, conv.client_id, conv.id, true).await;
        assert!(matches!(result, Err(ChatError::Forbidden(_))));
    }
}
