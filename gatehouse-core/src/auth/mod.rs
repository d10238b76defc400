//! Opaque-token sessions: issuance, rotation, revocation and introspection.
//!
//! Tokens are random values stored server-side, not signed claims. Every
//! check goes through the `auth_tokens` table, so revocation takes effect
//! immediately.

use std::str::FromStr;

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use chrono::{DateTime, Utc};
use rand::rngs::OsRng;
use rand::RngCore;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::StorageError;
use crate::users::UserRole;

pub mod repository;
pub mod service;

/// Random bytes behind each token value. Encoded without padding this yields
/// a 43-character URL-safe string.
const TOKEN_VALUE_BYTES: usize = 32;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TokenKind {
    Access,
    Refresh,
}

impl TokenKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            TokenKind::Access => "access",
            TokenKind::Refresh => "refresh",
        }
    }
}

impl FromStr for TokenKind {
    type Err = StorageError;

    fn from_str(value: &str) -> Result<Self, StorageError> {
        match value {
            "access" => Ok(TokenKind::Access),
            "refresh" => Ok(TokenKind::Refresh),
            other => Err(StorageError::DecodeError {
                field: "token type",
                value: other.to_string(),
            }),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TokenStatus {
    Active,
    Revoked,
    /// Stale rows are deleted rather than flipped to this state; the variant
    /// still decodes so older rows keep reading cleanly.
    Expired,
}

impl TokenStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TokenStatus::Active => "active",
            TokenStatus::Revoked => "revoked",
            TokenStatus::Expired => "expired",
        }
    }
}

impl FromStr for TokenStatus {
    type Err = StorageError;

    fn from_str(value: &str) -> Result<Self, StorageError> {
        match value {
            "active" => Ok(TokenStatus::Active),
            "revoked" => Ok(TokenStatus::Revoked),
            "expired" => Ok(TokenStatus::Expired),
            other => Err(StorageError::DecodeError {
                field: "token status",
                value: other.to_string(),
            }),
        }
    }
}

/// One token row. `paired_refresh` is set on access tokens only and carries
/// the refresh value issued alongside, letting logout retire the whole pair.
#[derive(Debug, Clone)]
pub struct TokenRecord {
    pub id: Uuid,
    pub user_id: Uuid,
    pub value: String,
    pub kind: TokenKind,
    pub status: TokenStatus,
    pub expires_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
    pub paired_refresh: Option<String>,
}

/// Insert payload for one token. Status always starts `active`.
#[derive(Debug, Clone)]
pub struct NewToken {
    pub user_id: Uuid,
    pub value: String,
    pub kind: TokenKind,
    pub expires_at: DateTime<Utc>,
    pub paired_refresh: Option<String>,
}

impl NewToken {
    pub fn access(
        user_id: Uuid,
        value: String,
        paired_refresh: String,
        expires_at: DateTime<Utc>,
    ) -> Self {
        Self {
            user_id,
            value,
            kind: TokenKind::Access,
            expires_at,
            paired_refresh: Some(paired_refresh),
        }
    }

    pub fn refresh(user_id: Uuid, value: String, expires_at: DateTime<Utc>) -> Self {
        Self {
            user_id,
            value,
            kind: TokenKind::Refresh,
            expires_at,
            paired_refresh: None,
        }
    }
}

/// The freshly inserted access/refresh rows of one session.
#[derive(Debug, Clone)]
pub struct SessionPair {
    pub access: TokenRecord,
    pub refresh: TokenRecord,
}

/// Wire shape of an issued session.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionTokens {
    pub access_token: String,
    pub refresh_token: String,
    pub expires_in: i64,
    pub token_type: String,
}

/// Introspection result for a live token.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TokenPayload {
    pub user_id: Uuid,
    pub email: String,
    pub role: UserRole,
    pub token_type: TokenKind,
    pub issued_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

/// Result shape for logout and revocation, which report failure in-band
/// instead of erroring.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RevocationOutcome {
    pub success: bool,
    pub message: String,
}

impl RevocationOutcome {
    pub fn ok(message: &str) -> Self {
        Self {
            success: true,
            message: message.to_string(),
        }
    }

    pub fn failed(message: &str) -> Self {
        Self {
            success: false,
            message: message.to_string(),
        }
    }
}

/// Draws [`TOKEN_VALUE_BYTES`] from the OS generator, URL-safe encoded.
pub fn generate_token_value() -> String {
    let mut bytes = [0u8; TOKEN_VALUE_BYTES];
    OsRng.fill_bytes(&mut bytes);
    URL_SAFE_NO_PAD.encode(bytes)
}
