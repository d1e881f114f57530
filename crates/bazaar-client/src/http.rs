use std::collections::VecDeque;

use reqwest::{Client, Response, StatusCode};
use tracing::debug;
use uuid::Uuid;

use bazaar_types::api::{
    ConversationResponse, ConversationSummary, ErrorBody, GetOrCreateConversationRequest,
    HistoryResponse, OnlineStatusResponse,
};
use bazaar_types::events::{ChatCommand, ChatEvent};
use bazaar_types::models::ChatMessage;

use crate::error::ClientError;
use crate::session::{ChatSession, Connection};

/// History of a conversation plus who is on the other side.
#[derive(Debug, Clone)]
pub struct Bootstrap {
    pub history: Vec<ChatMessage>,
    pub counterpart_id: Uuid,
}

/// Talks to one chat server on behalf of one signed-in user.
#[derive(Clone)]
pub struct ChatClient {
    http: Client,
    base_url: String,
    token: String,
}

impl ChatClient {
    /// `base_url` is the server root, e.g. `http://127.0.0.1:3000`.
    pub fn new(base_url: impl Into<String>, token: impl Into<String>) -> Self {
        Self {
            http: Client::new(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            token: token.into(),
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    fn gateway_url(&self) -> String {
        format!(
            "{}/gateway?token={}",
            self.base_url
                .replacen("http://", "ws://", 1)
                .replacen("https://", "wss://", 1),
            self.token
        )
    }

    /// Returns the id of the conversation with `counterpart_id`, creating it
    /// on first contact.
    pub async fn get_or_create_conversation(&self, counterpart_id: Uuid) -> Result<Uuid, ClientError> {
        let resp = self
            .http
            .post(self.url("/conversations"))
            .bearer_auth(&self.token)
            .json(&GetOrCreateConversationRequest { counterpart_id })
            .send()
            .await?;

        let body: ConversationResponse = check(resp).await?.json().await?;
        Ok(body.conversation_id)
    }

    pub async fn conversations(&self) -> Result<Vec<ConversationSummary>, ClientError> {
        let resp = self
            .http
            .get(self.url("/conversations"))
            .bearer_auth(&self.token)
            .send()
            .await?;

        Ok(check(resp).await?.json().await?)
    }

    pub async fn bootstrap(&self, conversation_id: Uuid) -> Result<Bootstrap, ClientError> {
        let resp = self
            .http
            .get(self.url(&format!("/conversations/{conversation_id}/messages")))
            .bearer_auth(&self.token)
            .send()
            .await?;

        let body: HistoryResponse = check(resp).await?.json().await?;
        Ok(Bootstrap {
            history: body.messages,
            counterpart_id: body.companion_id,
        })
    }

    pub async fn online_status(&self, user_id: Uuid) -> Result<bool, ClientError> {
        let resp = self
            .http
            .get(self.url(&format!("/users/{user_id}/status")))
            .bearer_auth(&self.token)
            .send()
            .await?;

        let body: OnlineStatusResponse = check(resp).await?.json().await?;
        Ok(body.is_online)
    }

    /// Open the live connection and wait for the handshake.
    pub async fn connect(&self) -> Result<Connection, ClientError> {
        Connection::establish(&self.gateway_url()).await
    }

    /// Everything a chat screen needs: live connection joined to the room,
    /// history fetched after the join so nothing falls between the two, and
    /// an online check for the counterpart in flight.
    pub async fn open(&self, conversation_id: Uuid) -> Result<ChatSession, ClientError> {
        let Connection {
            user_id,
            commands,
            mut events,
            ..
        } = self.connect().await?;

        commands.send(ChatCommand::JoinChat { conversation_id })?;

        let mut early = VecDeque::new();
        loop {
            match events.next_event().await {
                Some(ChatEvent::Joined { conversation_id: joined }) if joined == conversation_id => break,
                Some(ChatEvent::JoinRejected {
                    conversation_id: rejected,
                    reason,
                }) if rejected == conversation_id => {
                    // The one-shot call reports 404 vs 403 precisely; if it
                    // goes through, the rejection was transient
                    self.bootstrap(conversation_id).await?;
                    return Err(ClientError::JoinFailed(reason));
                }
                Some(other) => early.push_back(other),
                None => return Err(ClientError::Closed),
            }
        }
        events.requeue(early);

        let bootstrap = self.bootstrap(conversation_id).await?;
        commands.send(ChatCommand::CheckOnlineStatus {
            user_id: bootstrap.counterpart_id,
        })?;

        debug!(
            "Opened conversation {} with {} messages of history",
            conversation_id,
            bootstrap.history.len()
        );

        Ok(ChatSession::new(
            conversation_id,
            user_id,
            bootstrap,
            commands,
            events,
        ))
    }
}

async fn check(resp: Response) -> Result<Response, ClientError> {
    let status = resp.status();
    if status.is_success() {
        return Ok(resp);
    }

    let raw = resp.text().await.unwrap_or_default();
    let message = serde_json::from_str::<ErrorBody>(&raw)
        .map(|body| body.error)
        .unwrap_or(raw);

    Err(match status {
        StatusCode::UNAUTHORIZED => ClientError::Unauthorized(message),
        StatusCode::FORBIDDEN => ClientError::Forbidden(message),
        StatusCode::NOT_FOUND => ClientError::NotFound(message),
        _ => ClientError::Server {
            status: status.as_u16(),
            message,
        },
    })
}
