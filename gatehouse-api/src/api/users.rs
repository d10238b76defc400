use axum::extract::{Path, Query, State};
use axum::http::{HeaderMap, StatusCode};
use axum::Json;
use chrono::{DateTime, Utc};
use gatehouse_core::users::{
    RegisteredUser, UserListQuery, UserPage, UserProfile, UserRole, UserStatus,
};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::api::authenticate;
use crate::api::errors::ApiError;
use crate::router::AppState;

#[derive(Debug, Deserialize)]
pub struct RegisterRequest {
    pub email: String,
    pub password: String,
    pub name: String,
}

pub async fn register(
    State(state): State<AppState>,
    Json(request): Json<RegisterRequest>,
) -> Result<(StatusCode, Json<RegisteredUser>), ApiError> {
    let user = state
        .users
        .register(&request.email, &request.password, &request.name)
        .await?;
    Ok((StatusCode::CREATED, Json(user)))
}

/// Paging and filter parameters for the directory listing. Absent or
/// out-of-range paging values fall back to the service defaults.
#[derive(Debug, Deserialize)]
pub struct ListParams {
    pub page: Option<i64>,
    pub page_size: Option<i64>,
    pub search: Option<String>,
    pub status: Option<UserStatus>,
    pub role: Option<UserRole>,
}

pub async fn list(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(params): Query<ListParams>,
) -> Result<Json<UserPage>, ApiError> {
    authenticate(&state, &headers).await?;

    let query = UserListQuery {
        page: params.page.unwrap_or(0),
        page_size: params.page_size.unwrap_or(0),
        search: params.search,
        status: params.status,
        role: params.role,
    };
    Ok(Json(state.users.get_list(query).await?))
}

pub async fn get_profile(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Json<UserProfile>, ApiError> {
    let caller = authenticate(&state, &headers).await?;
    Ok(Json(state.users.get_profile(caller.user_id).await?))
}

#[derive(Debug, Deserialize)]
pub struct UpdateProfileRequest {
    pub name: String,
}

pub async fn update_profile(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(request): Json<UpdateProfileRequest>,
) -> Result<Json<UserProfile>, ApiError> {
    let caller = authenticate(&state, &headers).await?;
    let profile = state
        .users
        .update_profile(caller.user_id, &request.name)
        .await?;
    Ok(Json(profile))
}

#[derive(Debug, Deserialize)]
pub struct ChangePasswordRequest {
    pub old_password: String,
    pub new_password: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct UpdatedAt {
    pub updated_at: DateTime<Utc>,
}

pub async fn change_password(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(request): Json<ChangePasswordRequest>,
) -> Result<Json<UpdatedAt>, ApiError> {
    let caller = authenticate(&state, &headers).await?;
    let updated_at = state
        .users
        .change_password(caller.user_id, &request.old_password, &request.new_password)
        .await?;
    Ok(Json(UpdatedAt { updated_at }))
}

#[derive(Debug, Deserialize)]
pub struct UpdateStatusRequest {
    pub status: UserStatus,
}

/// Admin-only account suspension and reinstatement.
pub async fn update_status(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(user_id): Path<Uuid>,
    Json(request): Json<UpdateStatusRequest>,
) -> Result<Json<UpdatedAt>, ApiError> {
    let caller = authenticate(&state, &headers).await?;
    if caller.role != UserRole::Admin {
        return Err(ApiError::AdminRequired);
    }

    let updated_at = state.users.update_status(user_id, request.status).await?;
    Ok(Json(UpdatedAt { updated_at }))
}
