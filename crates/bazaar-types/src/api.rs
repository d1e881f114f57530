use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::{ChatMessage, Role};

// -- JWT Claims --

/// Session token claims, shared by bazaar-api (REST middleware) and
/// bazaar-gateway (WebSocket handshake).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    pub sub: Uuid,
    pub role: Role,
    pub exp: usize,
}

// -- Conversations --

#[derive(Debug, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct GetOrCreateConversationRequest {
    pub counterpart_id: Uuid,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ConversationResponse {
    pub conversation_id: Uuid,
}

/// One entry of the caller's conversation list.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConversationSummary {
    pub conversation_id: Uuid,
    pub companion_id: Uuid,
    pub last_message: Option<ChatMessage>,
    pub unread_count: u64,
}

// -- Messages --

#[derive(Debug, Serialize, Deserialize)]
pub struct HistoryResponse {
    pub messages: Vec<ChatMessage>,
    pub companion_id: Uuid,
}

// -- Presence --

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct OnlineStatusResponse {
    pub user_id: Uuid,
    pub is_online: bool,
}

// -- Errors --

#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorBody {
    pub error: String,
}
