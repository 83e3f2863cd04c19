//! Bearer-token identity for admin requests (HS256 JWT).

use agentdesk_core::{DeskError, Result};
use jsonwebtoken::{DecodingKey, EncodingKey, Header, Validation, decode, encode};
use serde::{Deserialize, Serialize};

/// Token claims. `sub` is the admin id, which is also the tenant id for
/// every agent and task query.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    pub sub: String,
    pub email: String,
    pub exp: usize,
}

/// Issue a token for an admin, valid for `ttl_hours`.
pub fn create_token(admin_id: &str, email: &str, secret: &str, ttl_hours: i64) -> Result<String> {
    let exp = chrono::Utc::now()
        .checked_add_signed(chrono::Duration::hours(ttl_hours))
        .ok_or_else(|| DeskError::Auth(format!("token lifetime of {ttl_hours}h overflows")))?
        .timestamp();
    let claims = Claims {
        sub: admin_id.to_string(),
        email: email.to_string(),
        exp: usize::try_from(exp).map_err(|_| DeskError::Auth("token already expired".into()))?,
    };
    encode(&Header::default(), &claims, &EncodingKey::from_secret(secret.as_bytes()))
        .map_err(|e| DeskError::Auth(format!("Token encode: {e}")))
}

/// Validate a token and return its claims.
pub fn validate_token(token: &str, secret: &str) -> Result<Claims> {
    decode::<Claims>(token, &DecodingKey::from_secret(secret.as_bytes()), &Validation::default())
        .map(|data| data.claims)
        .map_err(|e| DeskError::Auth(format!("Invalid token: {e}")))
}
