use std::collections::VecDeque;
use std::pin::Pin;
use std::task::{Context, Poll};

use futures_util::{SinkExt, Stream, StreamExt};
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::Message;
use tracing::{debug, warn};
use uuid::Uuid;

use bazaar_types::events::{ChatCommand, ChatEvent};
use bazaar_types::models::{ChatMessage, Role};

use crate::error::ClientError;
use crate::http::Bootstrap;

/// Outbound half of a live connection. Cheap to clone.
#[derive(Clone)]
pub struct CommandSender {
    tx: mpsc::UnboundedSender<ChatCommand>,
}

impl CommandSender {
    pub fn send(&self, cmd: ChatCommand) -> Result<(), ClientError> {
        self.tx.send(cmd).map_err(|_| ClientError::Closed)
    }
}

/// Inbound half of a live connection.
pub struct EventStream {
    backlog: VecDeque<ChatEvent>,
    rx: mpsc::UnboundedReceiver<ChatEvent>,
}

impl EventStream {
    fn new(rx: mpsc::UnboundedReceiver<ChatEvent>) -> Self {
        Self {
            backlog: VecDeque::new(),
            rx,
        }
    }

    /// Next inbound event, or `None` once the connection is gone.
    pub async fn next_event(&mut self) -> Option<ChatEvent> {
        if let Some(event) = self.backlog.pop_front() {
            return Some(event);
        }
        self.rx.recv().await
    }

    /// Put events back in front of anything not yet read.
    pub(crate) fn requeue(&mut self, mut events: VecDeque<ChatEvent>) {
        events.extend(self.backlog.drain(..));
        self.backlog = events;
    }
}

impl Stream for EventStream {
    type Item = ChatEvent;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<ChatEvent>> {
        let this = self.get_mut();
        if let Some(event) = this.backlog.pop_front() {
            return Poll::Ready(Some(event));
        }
        this.rx.poll_recv(cx)
    }
}

/// An authenticated live connection, not yet joined to any room.
pub struct Connection {
    pub user_id: Uuid,
    pub role: Role,
    pub commands: CommandSender,
    pub events: EventStream,
}

impl Connection {
    pub(crate) async fn establish(url: &str) -> Result<Self, ClientError> {
        let (ws_stream, _) = tokio_tungstenite::connect_async(url).await?;
        let (mut ws_tx, mut ws_rx) = ws_stream.split();

        let (cmd_tx, mut cmd_rx) = mpsc::unbounded_channel::<ChatCommand>();
        let (event_tx, event_rx) = mpsc::unbounded_channel::<ChatEvent>();

        // Writer: ends when every CommandSender is dropped, then closes the socket
        tokio::spawn(async move {
            while let Some(cmd) = cmd_rx.recv().await {
                let text = match serde_json::to_string(&cmd) {
                    Ok(text) => text,
                    Err(e) => {
                        warn!("Failed to encode {:?}: {}", cmd, e);
                        continue;
                    }
                };
                if ws_tx.send(Message::Text(text.into())).await.is_err() {
                    break;
                }
            }
            let _ = ws_tx.send(Message::Close(None)).await;
        });

        tokio::spawn(async move {
            while let Some(frame) = ws_rx.next().await {
                match frame {
                    Ok(Message::Text(text)) => match serde_json::from_str::<ChatEvent>(&text) {
                        Ok(event) => {
                            if event_tx.send(event).is_err() {
                                break;
                            }
                        }
                        Err(e) => {
                            let excerpt: String = text.chars().take(200).collect();
                            warn!("Unrecognised event: {} -- raw: {}", e, excerpt);
                        }
                    },
                    Ok(Message::Close(_)) => break,
                    Ok(_) => {}
                    Err(e) => {
                        debug!("Live connection read failed: {}", e);
                        break;
                    }
                }
            }
        });

        let mut events = EventStream::new(event_rx);
        match events.next_event().await {
            Some(ChatEvent::Ready { user_id, role }) => Ok(Self {
                user_id,
                role,
                commands: CommandSender { tx: cmd_tx },
                events,
            }),
            Some(ChatEvent::ConnectError { reason }) => Err(ClientError::ConnectRefused(reason)),
            Some(other) => {
                warn!("Expected ready, got {:?}", other);
                Err(ClientError::Closed)
            }
            None => Err(ClientError::Closed),
        }
    }
}

/// A live connection joined to one conversation.
///
/// Sends are fire-and-forget: the canonical record comes back as a
/// `receive_message` event, a failed write as `send_failed`.
pub struct ChatSession {
    conversation_id: Uuid,
    user_id: Uuid,
    counterpart_id: Uuid,
    history: Vec<ChatMessage>,
    commands: CommandSender,
    events: EventStream,
}

impl ChatSession {
    pub(crate) fn new(
        conversation_id: Uuid,
        user_id: Uuid,
        bootstrap: Bootstrap,
        commands: CommandSender,
        events: EventStream,
    ) -> Self {
        Self {
            conversation_id,
            user_id,
            counterpart_id: bootstrap.counterpart_id,
            history: bootstrap.history,
            commands,
            events,
        }
    }

    pub fn conversation_id(&self) -> Uuid {
        self.conversation_id
    }

    pub fn user_id(&self) -> Uuid {
        self.user_id
    }

    pub fn counterpart_id(&self) -> Uuid {
        self.counterpart_id
    }

    /// History as fetched when the session was opened, oldest first.
    pub fn history(&self) -> &[ChatMessage] {
        &self.history
    }

    pub fn send(&self, text: impl Into<String>) -> Result<(), ClientError> {
        self.commands.send(ChatCommand::SendMessage {
            conversation_id: self.conversation_id,
            text: text.into(),
            client_ref: None,
        })
    }

    /// Send with a tag that comes back on `send_failed`.
    pub fn send_tagged(
        &self,
        text: impl Into<String>,
        client_ref: impl Into<String>,
    ) -> Result<(), ClientError> {
        self.commands.send(ChatCommand::SendMessage {
            conversation_id: self.conversation_id,
            text: text.into(),
            client_ref: Some(client_ref.into()),
        })
    }

    pub fn set_typing(&self, is_typing: bool) -> Result<(), ClientError> {
        self.commands.send(ChatCommand::Typing {
            conversation_id: self.conversation_id,
            is_typing,
        })
    }

    pub fn mark_as_read(&self, message_id: Uuid) -> Result<(), ClientError> {
        self.commands.send(ChatCommand::MarkAsRead {
            message_id,
            conversation_id: self.conversation_id,
        })
    }

    pub fn check_online(&self, user_id: Uuid) -> Result<(), ClientError> {
        self.commands.send(ChatCommand::CheckOnlineStatus { user_id })
    }

    /// Send any command on this connection, including ones for other rooms.
    pub fn command(&self, cmd: ChatCommand) -> Result<(), ClientError> {
        self.commands.send(cmd)
    }

    pub async fn next_event(&mut self) -> Option<ChatEvent> {
        self.events.next_event().await
    }

    pub fn into_events(self) -> EventStream {
        self.events
    }

    pub fn split(self) -> (CommandSender, EventStream) {
        (self.commands, self.events)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn requeued_events_come_first() {
        let (tx, rx) = mpsc::unbounded_channel();
        let mut events = EventStream::new(rx);
        let user_id = Uuid::new_v4();

        tx.send(ChatEvent::UserStatusChange { user_id, is_online: false }).unwrap();
        events.requeue(VecDeque::from([ChatEvent::UserStatusChange {
            user_id,
            is_online: true,
        }]));

        assert_eq!(
            events.next_event().await,
            Some(ChatEvent::UserStatusChange { user_id, is_online: true })
        );
        assert_eq!(
            events.next().await,
            Some(ChatEvent::UserStatusChange { user_id, is_online: false })
        );

        drop(tx);
        assert_eq!(events.next_event().await, None);
    }

    #[tokio::test]
    async fn commands_fail_once_the_writer_is_gone() {
        let (tx, rx) = mpsc::unbounded_channel();
        let sender = CommandSender { tx };
        drop(rx);

        let result = sender.send(ChatCommand::CheckOnlineStatus { user_id: Uuid::new_v4() });
        assert!(matches!(result, Err(ClientError::Closed)));
    }
}
