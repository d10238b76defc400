use axum::http::StatusCode;
use axum::response::{IntoResponse, Json, Response};
use gatehouse_core::error::{AuthError, StorageError, UserError};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// JSON envelope returned by every failing route.
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorBody {
    pub error: String,
}

#[derive(Error, Debug)]
pub enum ApiError {
    #[error("missing bearer token")]
    MissingBearerToken,
    #[error("invalid or expired token")]
    InvalidSession,
    #[error("admin role required")]
    AdminRequired,
    #[error(transparent)]
    Auth(#[from] AuthError),
    #[error(transparent)]
    User(#[from] UserError),
}

impl ApiError {
    /// Rejections surface their message verbatim; everything else is logged
    /// in full and answered with an opaque body.
    fn is_rejection(&self) -> bool {
        match self {
            ApiError::MissingBearerToken | ApiError::InvalidSession | ApiError::AdminRequired => {
                true
            }
            ApiError::Auth(error) => error.is_rejection(),
            ApiError::User(error) => error.is_rejection(),
        }
    }

    pub fn status_code(&self) -> StatusCode {
        match self {
            ApiError::MissingBearerToken
            | ApiError::InvalidSession
            | ApiError::Auth(
                AuthError::InvalidCredentials
                | AuthError::UnknownRefreshToken
                | AuthError::NotARefreshToken
                | AuthError::TokenNotActive
                | AuthError::RefreshTokenExpired,
            ) => StatusCode::UNAUTHORIZED,

            ApiError::AdminRequired
            | ApiError::Auth(AuthError::AccountInactive | AuthError::AccountSuspended) => {
                StatusCode::FORBIDDEN
            }

            ApiError::User(UserError::EmailTaken) => StatusCode::CONFLICT,
            ApiError::User(UserError::NotFound) => StatusCode::NOT_FOUND,
            ApiError::User(UserError::InvalidOldPassword) => StatusCode::BAD_REQUEST,

            ApiError::Auth(AuthError::StorageError(error))
            | ApiError::User(UserError::StorageError(error)) => storage_status(error),

            ApiError::Auth(AuthError::HashError(_)) | ApiError::User(UserError::HashError(_)) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }
}

fn storage_status(error: &StorageError) -> StatusCode {
    if error.is_transient() || error.is_timeout() {
        StatusCode::SERVICE_UNAVAILABLE
    } else {
        StatusCode::INTERNAL_SERVER_ERROR
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let error = if self.is_rejection() {
            self.to_string()
        } else {
            tracing::error!(error = %self, "request failed");
            match status {
                StatusCode::SERVICE_UNAVAILABLE => "service temporarily unavailable".to_string(),
                _ => "internal server error".to_string(),
            }
        };

        (status, Json(ErrorBody { error })).into_response()
    }
}
