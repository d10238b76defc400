//! Request handlers for the versioned REST surface.

use axum::http::{header, HeaderMap};
use gatehouse_core::auth::TokenPayload;

use crate::router::AppState;

pub mod auth;
pub mod errors;
pub mod health;
pub mod users;

use errors::ApiError;

/// Pulls the opaque token out of the `Authorization: Bearer` header.
fn bearer_token(headers: &HeaderMap) -> Result<&str, ApiError> {
    headers
        .get(header::AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.strip_prefix("Bearer "))
        .ok_or(ApiError::MissingBearerToken)
}

/// Resolves the caller behind the bearer token, rejecting dead sessions.
async fn authenticate(state: &AppState, headers: &HeaderMap) -> Result<TokenPayload, ApiError> {
    let token = bearer_token(headers)?;
    state
        .auth
        .validate(token)
        .await
        .ok_or(ApiError::InvalidSession)
}
