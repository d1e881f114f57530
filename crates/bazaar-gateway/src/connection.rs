use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use axum::extract::ws::{CloseFrame, Message, WebSocket, close_code};
use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use bazaar_types::events::{ChatCommand, ChatEvent};
use bazaar_types::models::Identity;

use crate::Gateway;
use crate::dispatcher::PresenceScope;
use crate::error::ChatError;
use crate::identity::verify_token;
use crate::presence::ConnId;

/// One authenticated live connection.
#[derive(Debug, Clone, Copy)]
pub struct Session {
    pub conn_id: ConnId,
    pub identity: Identity,
}

impl Session {
    pub fn user_id(&self) -> Uuid {
        self.identity.user_id
    }
}

fn encode(event: &ChatEvent) -> Option<Message> {
    match serde_json::to_string(event) {
        Ok(text) => Some(Message::Text(text.into())),
        Err(e) => {
            error!("Failed to encode {:?}: {}", event, e);
            None
        }
    }
}

async fn send_event(sender: &mut SplitSink<WebSocket, Message>, event: &ChatEvent) -> bool {
    match encode(event) {
        Some(msg) => sender.send(msg).await.is_ok(),
        None => true,
    }
}

/// Handle an upgraded socket. The token came with the upgrade request; a
/// missing or invalid one gets `connect_error` and a policy close before any
/// state is touched.
pub async fn handle_connection(socket: WebSocket, gateway: Gateway, token: Option<String>) {
    let (mut sender, receiver) = socket.split();

    let verified = match token.as_deref() {
        Some(token) => verify_token(&gateway.settings().jwt_secret, token),
        None => Err(ChatError::Authentication("missing token".into())),
    };

    let identity = match verified {
        Ok(identity) => identity,
        Err(e) => {
            warn!("Rejected live connection: {}", e);
            let reason = e.to_string();
            send_event(&mut sender, &ChatEvent::ConnectError { reason: reason.clone() }).await;
            let _ = sender
                .send(Message::Close(Some(CloseFrame {
                    code: close_code::POLICY,
                    reason: reason.into(),
                })))
                .await;
            return;
        }
    };

    info!("{} ({}) connected to gateway", identity.user_id, identity.role);

    let ready = ChatEvent::Ready {
        user_id: identity.user_id,
        role: identity.role,
    };
    if !send_event(&mut sender, &ready).await {
        return;
    }

    run_connection_loop(sender, receiver, gateway, identity).await;
}

async fn run_connection_loop(
    mut sender: SplitSink<WebSocket, Message>,
    mut receiver: SplitStream<WebSocket>,
    gateway: Gateway,
    identity: Identity,
) {
    let dispatcher = gateway.dispatcher().clone();
    let user_id = identity.user_id;
    let (conn_id, mut conn_rx) = dispatcher.register_connection(user_id).await;
    let session = Session { conn_id, identity };

    // Who is already here, before we announce ourselves
    let (mut broadcast_rx, online_users) = dispatcher.subscribe_with_snapshot().await;
    if dispatcher.presence_scope() == PresenceScope::Global {
        for online in online_users {
            let event = ChatEvent::UserStatusChange {
                user_id: online,
                is_online: true,
            };
            if !send_event(&mut sender, &event).await {
                dispatcher.user_offline(user_id, conn_id).await;
                return;
            }
        }
    }

    dispatcher.user_online(user_id, conn_id).await;

    let heartbeat_interval = gateway.settings().heartbeat_interval;

    let pong_received = Arc::new(AtomicBool::new(true));
    let pong_flag_send = pong_received.clone();
    let pong_flag_recv = pong_received.clone();

    let mut send_task = tokio::spawn(async move {
        let mut heartbeat = tokio::time::interval(heartbeat_interval);
        heartbeat.tick().await;
        let mut missed_heartbeats: u8 = 0;

        loop {
            tokio::select! {
                result = broadcast_rx.recv() => {
                    let event = match result {
                        Ok(event) => event,
                        Err(tokio::sync::broadcast::error::RecvError::Lagged(n)) => {
                            warn!("Broadcast receiver lagged by {} events", n);
                            continue;
                        }
                        Err(_) => break,
                    };
                    if !send_event(&mut sender, &event).await {
                        break;
                    }
                }
                result = conn_rx.recv() => {
                    let Some(event) = result else { break };
                    if !send_event(&mut sender, &event).await {
                        break;
                    }
                }
                _ = heartbeat.tick() => {
                    if pong_flag_send.swap(false, Ordering::Acquire) {
                        missed_heartbeats = 0;
                    } else {
                        missed_heartbeats += 1;
                        if missed_heartbeats >= 2 {
                            warn!("Heartbeat timeout (missed {} pongs), dropping connection", missed_heartbeats);
                            break;
                        }
                    }
                    if sender.send(Message::Ping(Default::default())).await.is_err() {
                        break;
                    }
                }
            }
        }
    });

    let recv_gateway = gateway.clone();
    let mut recv_task = tokio::spawn(async move {
        while let Some(Ok(msg)) = receiver.next().await {
            match msg {
                Message::Text(text) => match serde_json::from_str::<ChatCommand>(&text) {
                    Ok(cmd) => handle_command(&recv_gateway, &session, cmd).await,
                    Err(e) => {
                        let excerpt: String = text.chars().take(200).collect();
                        warn!("{} bad command: {} -- raw: {}", session.user_id(), e, excerpt);
                    }
                },
                Message::Pong(_) => {
                    pong_flag_recv.store(true, Ordering::Release);
                }
                Message::Close(_) => break,
                _ => {}
            }
        }
    });

    tokio::select! {
        _ = &mut send_task => recv_task.abort(),
        _ = &mut recv_task => send_task.abort(),
    }

    dispatcher.user_offline(user_id, conn_id).await;
    info!("{} disconnected from gateway (connection {})", user_id, conn_id);
}

/// Apply one client command. Commands of a connection run one at a time in
/// arrival order; failures turn into events for this connection or log lines.
pub async fn handle_command(gateway: &Gateway, session: &Session, cmd: ChatCommand) {
    let dispatcher = gateway.dispatcher();
    let user_id = session.user_id();

    match cmd {
        ChatCommand::JoinChat { conversation_id } => {
            match gateway.join_chat(session.conn_id, user_id, conversation_id).await {
                Ok(marked) => {
                    info!("{} joined conversation {} ({} marked read)", user_id, conversation_id, marked);
                }
                Err(e) => {
                    warn!("{} join of {} rejected: {}", user_id, conversation_id, e);
                    dispatcher
                        .send_to_connection(
                            session.conn_id,
                            ChatEvent::JoinRejected {
                                conversation_id,
                                reason: e.client_reason(),
                            },
                        )
                        .await;
                }
            }
        }

        ChatCommand::SendMessage {
            conversation_id,
            text,
            client_ref,
        } => match gateway.send_message(user_id, conversation_id, text).await {
            Ok(_) => {}
            Err(ChatError::Validation(reason)) => {
                debug!("{} dropped message for {}: {}", user_id, conversation_id, reason);
            }
            Err(e) => {
                if e.is_persistence() {
                    error!("{} message for {} not persisted: {}", user_id, conversation_id, e);
                } else {
                    warn!("{} message for {} refused: {}", user_id, conversation_id, e);
                }
                dispatcher
                    .send_to_connection(
                        session.conn_id,
                        ChatEvent::SendFailed {
                            conversation_id,
                            client_ref,
                            reason: e.client_reason(),
                        },
                    )
                    .await;
            }
        },

        ChatCommand::Typing {
            conversation_id,
            is_typing,
        } => {
            if let Err(e) = gateway
                .set_typing(session.conn_id, user_id, conversation_id, is_typing)
                .await
            {
                debug!("{} typing in {} ignored: {}", user_id, conversation_id, e);
            }
        }

        ChatCommand::MarkAsRead {
            message_id,
            conversation_id,
        } => {
            if let Err(e) = gateway.mark_as_read(user_id, conversation_id, message_id).await {
                if e.is_persistence() {
                    error!("{} mark_as_read {} failed: {}", user_id, message_id, e);
                } else {
                    warn!("{} mark_as_read {} refused: {}", user_id, message_id, e);
                }
            }
        }

        ChatCommand::CheckOnlineStatus { user_id: target } => {
            let is_online = dispatcher.is_online(target).await;
            dispatcher
                .send_to_connection(
                    session.conn_id,
                    ChatEvent::UserStatusChange {
                        user_id: target,
                        is_online,
                    },
                )
                .await;
        }
    }
}
