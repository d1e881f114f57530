use axum::{
    extract::{Request, State},
    http::header,
    middleware::Next,
    response::Response,
};

use bazaar_gateway::ChatError;
use bazaar_gateway::identity::{bearer_token, verify_token};

use crate::error::ApiError;
use crate::state::AppState;

/// Validate the bearer token and attach the caller's `Identity` to the request.
pub async fn require_auth(
    State(state): State<AppState>,
    mut req: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let token = req
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(bearer_token)
        .ok_or_else(|| ChatError::Authentication("missing bearer token".into()))?;

    let identity = verify_token(&state.gateway.settings().jwt_secret, token)?;

    req.extensions_mut().insert(identity);
    Ok(next.run(req).await)
}
