//! Identity gate: turns a signed session token into an [`Identity`].
//!
//! Token issuance belongs to the marketplace's auth service; [`issue_token`]
//! exists so that service and the tests mint tokens the gateway accepts.

use jsonwebtoken::{DecodingKey, EncodingKey, Header, Validation, decode, encode};
use uuid::Uuid;

use bazaar_types::api::Claims;
use bazaar_types::models::{Identity, Role};

use crate::error::ChatError;

/// Verify signature and expiry of an HS256 session token.
pub fn verify_token(secret: &str, token: &str) -> Result<Identity, ChatError> {
    let token_data = decode::<Claims>(
        token,
        &DecodingKey::from_secret(secret.as_bytes()),
        &Validation::default(),
    )
    .map_err(|e| ChatError::Authentication(e.to_string()))?;

    Ok(Identity {
        user_id: token_data.claims.sub,
        role: token_data.claims.role,
    })
}

pub fn issue_token(
    secret: &str,
    user_id: Uuid,
    role: Role,
    ttl: chrono::Duration,
) -> anyhow::Result<String> {
    let claims = Claims {
        sub: user_id,
        role,
        exp: (chrono::Utc::now() + ttl).timestamp().max(0) as usize,
    };

    let token = encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(secret.as_bytes()),
    )?;

    Ok(token)
}

/// Extract the token from an `Authorization: Bearer <token>` header value.
pub fn bearer_token(header_value: &str) -> Option<&str> {
    header_value
        .strip_prefix("Bearer ")
        .map(str::trim)
        .filter(|t| !t.is_empty())
}
