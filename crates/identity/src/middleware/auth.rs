//! Service authentication extractor for callable endpoints.
//!
//! End users never call this service directly; the surrounding application
//! authenticates them and forwards requests with an internal bearer token.
//! The webhook endpoint does not use this extractor - its HMAC signature is
//! the authentication.

use axum::{
    extract::FromRequestParts,
    http::{header, request::Parts},
};
use secrecy::ExposeSecret;

use crate::error::AppError;
use crate::state::AppState;

/// Extractor that requires the internal service bearer token.
///
/// # Example
///
/// ```rust,ignore
/// async fn protected_handler(
///     _auth: RequireServiceAuth,
///     State(state): State<AppState>,
/// ) -> impl IntoResponse {
///     // only reachable with a valid Authorization header
/// }
/// ```
pub struct RequireServiceAuth;

impl FromRequestParts<AppState> for RequireServiceAuth {
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let header_value = parts
            .headers
            .get(header::AUTHORIZATION)
            .and_then(|v| v.to_str().ok())
            .ok_or_else(|| AppError::Unauthorized("missing authorization header".into()))?;

        let token = header_value
            .strip_prefix("Bearer ")
            .ok_or_else(|| AppError::Unauthorized("malformed authorization header".into()))?;

        let expected = state.config().service_token.expose_secret();
        if !constant_time_compare(token.as_bytes(), expected.as_bytes()) {
            return Err(AppError::Unauthorized("invalid service token".into()));
        }

        Ok(Self)
    }
}

/// Constant-time byte comparison (length checked first).
fn constant_time_compare(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }

    let mut result: u8 = 0;
    for (x, y) in a.iter().zip(b.iter()) {
        result |= x ^ y;
    }
    result == 0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_constant_time_compare() {
        assert!(constant_time_compare(b"token", b"token"));
        assert!(!constant_time_compare(b"token", b"tokeN"));
        assert!(!constant_time_compare(b"token", b"token-longer"));
        assert!(!constant_time_compare(b"", b"x"));
        assert!(constant_time_compare(b"", b""));
    }
}
