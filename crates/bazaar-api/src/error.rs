use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use thiserror::Error;
use tracing::error;

use bazaar_gateway::ChatError;
use bazaar_types::api::ErrorBody;

/// A chat failure on its way out of a REST handler.
#[derive(Debug, Error)]
#[error(transparent)]
pub struct ApiError(#[from] pub ChatError);

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self.0 {
            ChatError::Authentication(_) => StatusCode::UNAUTHORIZED,
            ChatError::Forbidden(_) => StatusCode::FORBIDDEN,
            ChatError::NotFound(_) => StatusCode::NOT_FOUND,
            ChatError::Validation(_) => StatusCode::BAD_REQUEST,
            ChatError::Persistence(_) | ChatError::Timeout(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };

        if status == StatusCode::INTERNAL_SERVER_ERROR {
            error!("Request failed: {}", self.0);
        }

        let body = ErrorBody {
            error: self.0.client_reason(),
        };
        (status, Json(body)).into_response()
    }
}
