//! Bearer token extraction.

use axum::extract::FromRequestParts;
use axum::http::header::AUTHORIZATION;
use axum::http::request::Parts;
use axum::http::HeaderMap;

use crate::error::ApiError;
use crate::AppState;

/// Authenticated user extracted from the `Authorization` header (access token).
#[derive(Debug, Clone)]
pub struct AuthUser {
    pub user_id: String,
}

/// Raw token from the `Authorization` header, unverified. The `Bearer `
/// prefix is optional.
#[derive(Debug, Clone)]
pub struct RawToken(pub String);

/// Pull the token out of the `Authorization` header.
pub fn header_token(headers: &HeaderMap) -> Result<&str, ApiError> {
    let header = headers
        .get(AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .ok_or_else(|| ApiError::unauthorized("token not provided"))?;
    Ok(header.strip_prefix("Bearer ").unwrap_or(header).trim())
}

impl FromRequestParts<AppState> for RawToken {
    type Rejection = ApiError;

    async fn from_request_parts(
        parts: &mut Parts,
        _state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        header_token(&parts.headers).map(|token| RawToken(token.to_string()))
    }
}

impl FromRequestParts<AppState> for AuthUser {
    type Rejection = ApiError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let token = header_token(&parts.headers)?;
        let user_id = state.auth.verify_access_token(token)?;
        Ok(AuthUser { user_id })
    }
}
