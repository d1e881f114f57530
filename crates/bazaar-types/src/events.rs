use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::{ChatMessage, Role};

/// Events sent FROM server TO client over the live connection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data", rename_all = "snake_case")]
pub enum ChatEvent {
    /// Handshake accepted
    Ready { user_id: Uuid, role: Role },

    /// Handshake refused; the server closes the socket right after
    ConnectError { reason: String },

    /// A message was persisted in a room this connection has joined
    ReceiveMessage(ChatMessage),

    /// The counterpart started or stopped typing
    UserTyping {
        conversation_id: Uuid,
        user_id: Uuid,
        is_typing: bool,
    },

    /// Something in the room became read. Carries no message ids.
    MessagesRead {
        conversation_id: Uuid,
        reader_id: Uuid,
    },

    /// Presence change, or the answer to `CheckOnlineStatus`
    UserStatusChange { user_id: Uuid, is_online: bool },

    /// `JoinChat` succeeded; the connection now receives the room's events
    Joined { conversation_id: Uuid },

    /// `JoinChat` was refused; the connection is not in the room
    JoinRejected { conversation_id: Uuid, reason: String },

    /// `SendMessage` was not persisted; nothing was delivered
    SendFailed {
        conversation_id: Uuid,
        client_ref: Option<String>,
        reason: String,
    },
}

impl ChatEvent {
    /// Returns the conversation this event is scoped to, if any.
    pub fn conversation_id(&self) -> Option<Uuid> {
        match self {
            Self::ReceiveMessage(message) => Some(message.conversation_id),
            Self::UserTyping { conversation_id, .. }
            | Self::MessagesRead { conversation_id, .. }
            | Self::Joined { conversation_id }
            | Self::JoinRejected { conversation_id, .. }
            | Self::SendFailed { conversation_id, .. } => Some(*conversation_id),
            Self::Ready { .. } | Self::ConnectError { .. } | Self::UserStatusChange { .. } => None,
        }
    }
}

/// Commands sent FROM client TO server over the live connection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data", rename_all = "snake_case")]
pub enum ChatCommand {
    /// Subscribe this connection to a conversation room
    JoinChat { conversation_id: Uuid },

    /// Post a message. `client_ref` is echoed back on `SendFailed`.
    SendMessage {
        conversation_id: Uuid,
        text: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        client_ref: Option<String>,
    },

    /// Typing indicator; the receiver expires it on its own
    Typing { conversation_id: Uuid, is_typing: bool },

    /// Mark one message read
    MarkAsRead { message_id: Uuid, conversation_id: Uuid },

    /// Ask whether a user is online; answered to this connection only
    CheckOnlineStatus { user_id: Uuid },
}
