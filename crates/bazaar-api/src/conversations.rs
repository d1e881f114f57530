use axum::{
    Extension, Json,
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
};
use uuid::Uuid;

use bazaar_types::api::{
    ConversationResponse, ConversationSummary, GetOrCreateConversationRequest, HistoryResponse,
};
use bazaar_types::models::Identity;

use crate::error::ApiError;
use crate::state::AppState;

/// Open the caller's conversation with a counterpart. 201 when it was
/// created by this request, 200 when it already existed.
pub async fn get_or_create_conversation(
    State(state): State<AppState>,
    Extension(caller): Extension<Identity>,
    Json(req): Json<GetOrCreateConversationRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let (conversation, created) = state
        .gateway
        .open_conversation(caller, req.counterpart_id)
        .await?;

    let status = if created { StatusCode::CREATED } else { StatusCode::OK };
    Ok((
        status,
        Json(ConversationResponse {
            conversation_id: conversation.id,
        }),
    ))
}

pub async fn list_conversations(
    State(state): State<AppState>,
    Extension(caller): Extension<Identity>,
) -> Result<Json<Vec<ConversationSummary>>, ApiError> {
    let summaries = state.gateway.conversations_for(caller.user_id).await?;
    Ok(Json(summaries))
}

/// Full history, oldest first, for a conversation the caller takes part in.
pub async fn get_history(
    State(state): State<AppState>,
    Path(conversation_id): Path<Uuid>,
    Extension(caller): Extension<Identity>,
) -> Result<Json<HistoryResponse>, ApiError> {
    let bootstrap = state
        .gateway
        .bootstrap(caller.user_id, conversation_id)
        .await?;

    Ok(Json(HistoryResponse {
        messages: bootstrap.history,
        companion_id: bootstrap.counterpart_id,
    }))
}
