pub mod conversations;
pub mod error;
pub mod middleware;
pub mod presence;
pub mod state;

use axum::{
    Router, middleware as axum_middleware,
    routing::{get, post},
};

use crate::middleware::require_auth;
use crate::state::AppState;

/// Bearer-protected one-shot routes.
pub fn routes(state: AppState) -> Router {
    Router::new()
        .route("/conversations", post(conversations::get_or_create_conversation))
        .route("/conversations", get(conversations::list_conversations))
        .route("/conversations/{conversation_id}/messages", get(conversations::get_history))
        .route("/users/{user_id}/status", get(presence::get_online_status))
        .layer(axum_middleware::from_fn_with_state(state.clone(), require_auth))
        .with_state(state)
}
