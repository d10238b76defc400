use std::path::PathBuf;

use thiserror::Error;

/// Enumeration of errors raised while loading or watching the live settings
/// document.
#[derive(Error, Debug)]
pub enum SettingsError {
    #[error("failed to read settings file {}: {error}", path.display())]
    ReadError { path: PathBuf, error: std::io::Error },
    #[error("failed to parse settings file {}: {error}", path.display())]
    ParseError {
        path: PathBuf,
        error: serde_json::Error,
    },
    #[error("failed to watch settings file {}: {error}", path.display())]
    WatchError { path: PathBuf, error: notify::Error },
}

/// Database errors wrapped by us to carry the operation that produced them.
#[derive(Error, Debug)]
pub enum StorageError {
    #[error("{command} query failed with: {error}")]
    QueryError { command: String, error: sqlx::Error },
    #[error("transaction {command} failed with: {error}")]
    TransactionError { command: String, error: sqlx::Error },
    #[error("{value} is not a valid {field}")]
    DecodeError { field: &'static str, value: String },
}

impl StorageError {
    fn sqlx_error(&self) -> Option<&sqlx::Error> {
        match self {
            StorageError::QueryError { error, .. } | StorageError::TransactionError { error, .. } => {
                Some(error)
            }
            StorageError::DecodeError { .. } => None,
        }
    }

    pub fn is_unique_violation(&self) -> bool {
        self.sqlx_error()
            .is_some_and(common_database::is_unique_violation_error)
    }

    /// Connection-level trouble worth a retry (and a 503 rather than a 500).
    pub fn is_transient(&self) -> bool {
        self.sqlx_error()
            .is_some_and(common_database::is_transient_error)
    }

    pub fn is_timeout(&self) -> bool {
        self.sqlx_error()
            .is_some_and(common_database::is_timeout_error)
    }
}

/// Password hashing backend failure: a malformed stored hash or a broken
/// hashing run, distinct from an ordinary mismatch.
#[derive(Error, Debug)]
#[error("password hashing failed: {message}")]
pub struct HashError {
    pub message: String,
}

/// Errors raised by the token state machine. Rejection variants carry the
/// exact message surfaced to callers.
#[derive(Error, Debug)]
pub enum AuthError {
    #[error("invalid email or password")]
    InvalidCredentials,
    #[error("user account is inactive")]
    AccountInactive,
    #[error("user account is suspended")]
    AccountSuspended,
    #[error("invalid refresh token")]
    UnknownRefreshToken,
    #[error("invalid token type")]
    NotARefreshToken,
    #[error("token is not active")]
    TokenNotActive,
    #[error("refresh token expired")]
    RefreshTokenExpired,
    #[error(transparent)]
    HashError(#[from] HashError),
    #[error(transparent)]
    StorageError(#[from] StorageError),
}

impl AuthError {
    /// Rejections are user-caused and safe to surface verbatim; everything
    /// else is infrastructure and maps to an opaque failure.
    pub fn is_rejection(&self) -> bool {
        !matches!(self, AuthError::HashError(_) | AuthError::StorageError(_))
    }
}

/// Errors raised by the user directory operations.
#[derive(Error, Debug)]
pub enum UserError {
    #[error("email already registered")]
    EmailTaken,
    #[error("user not found")]
    NotFound,
    #[error("invalid old password")]
    InvalidOldPassword,
    #[error(transparent)]
    HashError(#[from] HashError),
    #[error(transparent)]
    StorageError(#[from] StorageError),
}

impl UserError {
    pub fn is_rejection(&self) -> bool {
        !matches!(self, UserError::HashError(_) | UserError::StorageError(_))
    }
}
