//! Authentication extractor.
//!
//! Requests carry `Authorization: Bearer <token>`. The token is looked up in
//! `auth_tokens`; a missing, unknown or expired token is rejected with 401.

use axum::{
    extract::FromRequestParts,
    http::{header::AUTHORIZATION, request::Parts, HeaderMap},
};
use chrono::Utc;

use crate::db;
use crate::error::AppError;
use crate::AppState;

/// Authenticated user extracted from request.
#[derive(Debug, Clone)]
pub struct AuthUser {
    /// Owner identity the token was issued to
    pub user_id: String,
}

impl FromRequestParts<AppState> for AuthUser {
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let token = bearer_token(&parts.headers)?;

        let user_id = db::find_token_owner(&state.pool, token, Utc::now())
            .await?
            .ok_or(AppError::Unauthorized("Invalid or expired token"))?;

        Ok(AuthUser { user_id })
    }
}

/// Pull the token out of an `Authorization: Bearer` header.
pub fn bearer_token(headers: &HeaderMap) -> Result<&str, AppError> {
    let header = headers
        .get(AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .ok_or(AppError::Unauthorized("Missing authorization header"))?;

    let token = header
        .strip_prefix("Bearer ")
        .ok_or(AppError::Unauthorized("Invalid authorization header format"))?
        .trim();

    if token.is_empty() {
        return Err(AppError::Unauthorized("Empty bearer token"));
    }
    Ok(token)
}
