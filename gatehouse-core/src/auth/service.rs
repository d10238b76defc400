//! Session lifecycle: login, refresh rotation, logout, introspection,
//! on-demand revocation and the scheduled reaper.

use std::sync::Arc;

use chrono::{Duration, Utc};
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::auth::repository::TokenRepository;
use crate::auth::{
    generate_token_value, NewToken, RevocationOutcome, SessionTokens, TokenKind, TokenPayload,
    TokenRecord, TokenStatus,
};
use crate::error::AuthError;
use crate::password::verify_password;
use crate::users::repository::UserRepository;

/// Access tokens live fifteen minutes, refresh tokens seven days.
pub const ACCESS_TOKEN_TTL_SECS: i64 = 15 * 60;
pub const REFRESH_TOKEN_TTL_SECS: i64 = 7 * 24 * 60 * 60;
/// Expired rows stay queryable this long before the reaper deletes them.
pub const REAP_RETENTION_HOURS: i64 = 24;
pub const BEARER_TOKEN_TYPE: &str = "Bearer";

pub struct AuthService {
    tokens: Arc<dyn TokenRepository>,
    users: Arc<dyn UserRepository>,
}

impl AuthService {
    pub fn new(tokens: Arc<dyn TokenRepository>, users: Arc<dyn UserRepository>) -> Self {
        Self { tokens, users }
    }

    /// Verifies credentials and issues a fresh session pair. An unknown email
    /// and a wrong password produce the same rejection; only the account
    /// status checks say more.
    pub async fn login(&self, email: &str, password: &str) -> Result<SessionTokens, AuthError> {
        let Some(user) = self.users.find_by_email(email).await? else {
            return Err(AuthError::InvalidCredentials);
        };

        user.status.can_login()?;

        if !verify_password(password, &user.password_hash)? {
            return Err(AuthError::InvalidCredentials);
        }

        let session = self.issue_session(user.id).await?;
        info!(user_id = %user.id, "issued session tokens");
        Ok(session)
    }

    /// Trades a live refresh token for a new session pair. The rotation is
    /// transactional: the old token is retired and the replacements inserted
    /// together, so a concurrent rotation of the same token loses cleanly.
    pub async fn refresh(&self, refresh_token: &str) -> Result<SessionTokens, AuthError> {
        let Some(token) = self.tokens.find_by_value(refresh_token).await? else {
            return Err(AuthError::UnknownRefreshToken);
        };

        if token.kind != TokenKind::Refresh {
            return Err(AuthError::NotARefreshToken);
        }
        if token.status != TokenStatus::Active {
            return Err(AuthError::TokenNotActive);
        }
        if Utc::now() > token.expires_at {
            return Err(AuthError::RefreshTokenExpired);
        }

        let (access, replacement) = new_session_pair(token.user_id);
        let Some(pair) = self
            .tokens
            .rotate(refresh_token, access, replacement)
            .await?
        else {
            // Lost the race against a concurrent rotation or revocation of
            // the same token.
            return Err(AuthError::TokenNotActive);
        };

        info!(user_id = %token.user_id, "rotated refresh token");
        Ok(session_tokens(pair.access, pair.refresh))
    }

    /// Retires the session behind an access token. Never errors; failures
    /// come back in-band. Revoking the paired refresh token is best effort,
    /// the session is already dead once the access token is gone.
    pub async fn logout(&self, access_token: &str) -> RevocationOutcome {
        let token = match self.tokens.find_by_value(access_token).await {
            Ok(Some(token)) => token,
            Ok(None) => return RevocationOutcome::failed("Invalid token"),
            Err(error) => {
                warn!(error = %error, "token lookup failed during logout");
                return RevocationOutcome::failed("Invalid token");
            }
        };

        match self.tokens.revoke(access_token, token.user_id).await {
            Ok(true) => {}
            Ok(false) => return RevocationOutcome::failed("Failed to revoke access token"),
            Err(error) => {
                warn!(error = %error, "access token revocation failed during logout");
                return RevocationOutcome::failed("Failed to revoke access token");
            }
        }

        if let Some(refresh_value) = &token.paired_refresh {
            if let Err(error) = self.tokens.revoke(refresh_value, token.user_id).await {
                warn!(error = %error, "paired refresh revocation failed during logout");
            }
        }

        info!(user_id = %token.user_id, "logged out session");
        RevocationOutcome::ok("Logged out successfully")
    }

    /// Introspects a token. Any failure along the way, a missing row, an
    /// inactive status, expiry or a broken user lookup, collapses to `None`.
    pub async fn validate(&self, token_value: &str) -> Option<TokenPayload> {
        let token = match self.tokens.find_by_value(token_value).await {
            Ok(Some(token)) => token,
            Ok(None) => return None,
            Err(error) => {
                warn!(error = %error, "token lookup failed during validation");
                return None;
            }
        };

        if token.status != TokenStatus::Active || Utc::now() > token.expires_at {
            return None;
        }

        let user = match self.users.find_by_id(token.user_id).await {
            Ok(Some(user)) => user,
            Ok(None) => return None,
            Err(error) => {
                warn!(error = %error, "user lookup failed during validation");
                return None;
            }
        };

        Some(TokenPayload {
            user_id: user.id,
            email: user.email,
            role: user.role,
            token_type: token.kind,
            issued_at: token.created_at,
            expires_at: token.expires_at,
        })
    }

    /// Revokes one token by value. Never errors; failures come back in-band.
    pub async fn revoke(&self, token_value: &str) -> RevocationOutcome {
        let token = match self.tokens.find_by_value(token_value).await {
            Ok(Some(token)) => token,
            Ok(None) => return RevocationOutcome::failed("Token not found"),
            Err(error) => {
                warn!(error = %error, "token lookup failed during revocation");
                return RevocationOutcome::failed("Token not found");
            }
        };

        match self.tokens.revoke(token_value, token.user_id).await {
            Ok(true) => {
                info!(user_id = %token.user_id, "revoked token");
                RevocationOutcome::ok("Token revoked successfully")
            }
            Ok(false) => RevocationOutcome::failed("Token already revoked"),
            Err(error) => {
                warn!(error = %error, "token revocation failed");
                RevocationOutcome::failed("Failed to revoke token")
            }
        }
    }

    /// Deletes tokens that expired more than [`REAP_RETENTION_HOURS`] ago.
    /// Failures are logged, not propagated; the next scheduled run retries.
    pub async fn reap_expired_tokens(&self) -> u64 {
        let cutoff = Utc::now() - Duration::hours(REAP_RETENTION_HOURS);
        match self.tokens.delete_expired(cutoff).await {
            Ok(0) => {
                info!("no expired tokens to clean up");
                0
            }
            Ok(deleted) => {
                info!(deleted, cutoff = %cutoff, "deleted expired tokens");
                deleted
            }
            Err(error) => {
                error!(error = %error, "expired token cleanup failed");
                0
            }
        }
    }

    /// The two inserts are sequential, not transactional. A crash between
    /// them leaks an access row without its refresh partner, which the reaper
    /// collects once expired.
    async fn issue_session(&self, user_id: Uuid) -> Result<SessionTokens, AuthError> {
        let (access, refresh) = new_session_pair(user_id);

        let access = self.tokens.create(access).await?;
        let refresh = self.tokens.create(refresh).await?;

        Ok(session_tokens(access, refresh))
    }
}

fn new_session_pair(user_id: Uuid) -> (NewToken, NewToken) {
    let now = Utc::now();
    let access_value = generate_token_value();
    let refresh_value = generate_token_value();

    let access = NewToken::access(
        user_id,
        access_value,
        refresh_value.clone(),
        now + Duration::seconds(ACCESS_TOKEN_TTL_SECS),
    );
    let refresh = NewToken::refresh(
        user_id,
        refresh_value,
        now + Duration::seconds(REFRESH_TOKEN_TTL_SECS),
    );

    (access, refresh)
}

fn session_tokens(access: TokenRecord, refresh: TokenRecord) -> SessionTokens {
    SessionTokens {
        access_token: access.value,
        refresh_token: refresh.value,
        expires_in: ACCESS_TOKEN_TTL_SECS,
        token_type: BEARER_TOKEN_TYPE.to_string(),
    }
}
