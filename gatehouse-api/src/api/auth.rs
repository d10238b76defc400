use axum::extract::State;
use axum::http::HeaderMap;
use axum::Json;
use gatehouse_core::auth::{RevocationOutcome, SessionTokens, TokenPayload};
use gatehouse_core::users::UserRole;
use serde::Deserialize;

use crate::api::errors::ApiError;
use crate::api::{authenticate, bearer_token};
use crate::router::AppState;

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

pub async fn login(
    State(state): State<AppState>,
    Json(request): Json<LoginRequest>,
) -> Result<Json<SessionTokens>, ApiError> {
    let tokens = state.auth.login(&request.email, &request.password).await?;
    Ok(Json(tokens))
}

#[derive(Debug, Deserialize)]
pub struct RefreshRequest {
    pub refresh_token: String,
}

pub async fn refresh(
    State(state): State<AppState>,
    Json(request): Json<RefreshRequest>,
) -> Result<Json<SessionTokens>, ApiError> {
    let tokens = state.auth.refresh(&request.refresh_token).await?;
    Ok(Json(tokens))
}

/// Always answers 200 with an in-band outcome; an already-dead token is not
/// an error here.
pub async fn logout(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Json<RevocationOutcome>, ApiError> {
    let token = bearer_token(&headers)?;
    Ok(Json(state.auth.logout(token).await))
}

pub async fn validate(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Json<TokenPayload>, ApiError> {
    let token = bearer_token(&headers)?;
    let payload = state
        .auth
        .validate(token)
        .await
        .ok_or(ApiError::InvalidSession)?;
    Ok(Json(payload))
}

#[derive(Debug, Deserialize)]
pub struct RevokeRequest {
    pub token: String,
}

/// Admin-only revocation of an arbitrary token value. Self-service retirement
/// goes through [`logout`] instead.
pub async fn revoke(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(request): Json<RevokeRequest>,
) -> Result<Json<RevocationOutcome>, ApiError> {
    let caller = authenticate(&state, &headers).await?;
    if caller.role != UserRole::Admin {
        return Err(ApiError::AdminRequired);
    }

    Ok(Json(state.auth.revoke(&request.token).await))
}
