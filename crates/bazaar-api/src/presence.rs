use axum::{
    Extension, Json,
    extract::{Path, State},
};
use uuid::Uuid;

use bazaar_types::api::OnlineStatusResponse;
use bazaar_types::models::Identity;

use crate::state::AppState;

pub async fn get_online_status(
    State(state): State<AppState>,
    Path(user_id): Path<Uuid>,
    Extension(_caller): Extension<Identity>,
) -> Json<OnlineStatusResponse> {
    let is_online = state.gateway.dispatcher().is_online(user_id).await;
    Json(OnlineStatusResponse { user_id, is_online })
}
