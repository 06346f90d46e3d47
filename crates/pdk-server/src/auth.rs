//! Bearer-token authorization for all core routes.
//!
//! Tokens are HS256 JWTs whose `sub` carries the user id. Registration and
//! token issuance live outside this service; we only verify.

use std::sync::Arc;

use axum::{
    extract::{Request, State},
    http::header,
    middleware::Next,
    response::Response,
};
use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};

use crate::error::ApiError;
use crate::state::AppState;

#[derive(Debug, Serialize, Deserialize)]
pub struct Claims {
    /// User id, as a string per JWT convention.
    pub sub: String,
    /// Expiry, seconds since epoch.
    pub exp: usize,
}

/// The authenticated caller, injected into request extensions.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct AuthUser(pub i64);

/// Axum middleware: reject the request with 401 unless a valid bearer token
/// is presented; on success expose [`AuthUser`] to the handler.
pub async fn require_auth(
    State(st): State<Arc<AppState>>,
    mut request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let header_value = request
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|h| h.to_str().ok());

    let token = match header_value {
        Some(h) if h.starts_with("Bearer ") => &h[7..],
        _ => {
            return Err(ApiError::Unauthorized(
                "missing or malformed Authorization header".to_string(),
            ))
        }
    };

    let data = decode::<Claims>(
        token,
        &DecodingKey::from_secret(st.jwt_secret.as_bytes()),
        &Validation::default(),
    )
    .map_err(|e| ApiError::Unauthorized(format!("invalid token: {e}")))?;

    let user_id: i64 = data
        .claims
        .sub
        .parse()
        .map_err(|_| ApiError::Unauthorized("token subject is not a user id".to_string()))?;

    request.extensions_mut().insert(AuthUser(user_id));
    Ok(next.run(request).await)
}

/// Sign a token for `user_id`, valid for `ttl_secs`. Used by tests and
/// local tooling; production tokens come from the auth service.
pub fn issue_token(secret: &str, user_id: i64, ttl_secs: u64) -> String {
    let exp = chrono::Utc::now().timestamp() as usize + ttl_secs as usize;
    let claims = Claims {
        sub: user_id.to_string(),
        exp,
    };
    encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(secret.as_bytes()),
    )
    .expect("token signing must not fail")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn issued_token_decodes() {
        let token = issue_token("secret", 42, 3600);
        let data = decode::<Claims>(
            &token,
            &DecodingKey::from_secret(b"secret"),
            &Validation::default(),
        )
        .expect("decode");
        assert_eq!(data.claims.sub, "42");
    }

    #[test]
    fn wrong_secret_fails() {
        let token = issue_token("secret", 42, 3600);
        assert!(decode::<Claims>(
            &token,
            &DecodingKey::from_secret(b"other"),
            &Validation::default(),
        )
        .is_err());
    }
}
