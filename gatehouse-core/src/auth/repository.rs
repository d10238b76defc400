use async_trait::async_trait;
use chrono::{DateTime, Utc};
#[cfg(test)]
use mockall::automock;
use sqlx::PgPool;
use uuid::Uuid;

use crate::auth::{NewToken, SessionPair, TokenRecord, TokenStatus};
use crate::error::StorageError;

const TOKEN_COLUMNS: &str =
    "id, user_id, token, token_type, status, expires_at, created_at, refresh_token";

/// Storage seam for session tokens.
#[cfg_attr(test, automock)]
#[async_trait]
pub trait TokenRepository: Send + Sync {
    async fn create(&self, new_token: NewToken) -> Result<TokenRecord, StorageError>;
    async fn find_by_value(&self, value: &str) -> Result<Option<TokenRecord>, StorageError>;
    /// Flips one active token to revoked. `false` means no row changed: the
    /// token was missing, belonged to another user or was already retired.
    async fn revoke(&self, value: &str, user_id: Uuid) -> Result<bool, StorageError>;
    /// Retires `refresh_value` and inserts the replacement pair in one
    /// transaction. `None` means the conditional revoke matched nothing and
    /// everything rolled back.
    async fn rotate(
        &self,
        refresh_value: &str,
        access: NewToken,
        refresh: NewToken,
    ) -> Result<Option<SessionPair>, StorageError>;
    /// Deletes every token that expired before `cutoff`, returning the count.
    async fn delete_expired(&self, cutoff: DateTime<Utc>) -> Result<u64, StorageError>;
}

#[derive(sqlx::FromRow)]
struct TokenRow {
    id: Uuid,
    user_id: Uuid,
    token: String,
    token_type: String,
    status: String,
    expires_at: DateTime<Utc>,
    created_at: DateTime<Utc>,
    refresh_token: Option<String>,
}

impl TryFrom<TokenRow> for TokenRecord {
    type Error = StorageError;

    fn try_from(row: TokenRow) -> Result<Self, StorageError> {
        Ok(TokenRecord {
            id: row.id,
            user_id: row.user_id,
            value: row.token,
            kind: row.token_type.parse()?,
            status: row.status.parse()?,
            expires_at: row.expires_at,
            created_at: row.created_at,
            paired_refresh: row.refresh_token,
        })
    }
}

pub struct PgTokenRepository {
    pool: PgPool,
}

impl PgTokenRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

/// Runs the insert on either the pool or an open transaction.
async fn insert_token<'c, E>(executor: E, new_token: NewToken) -> Result<TokenRecord, sqlx::Error>
where
    E: sqlx::Executor<'c, Database = sqlx::Postgres>,
{
    let now = Utc::now();
    let record = TokenRecord {
        id: Uuid::now_v7(),
        user_id: new_token.user_id,
        value: new_token.value,
        kind: new_token.kind,
        status: TokenStatus::Active,
        expires_at: new_token.expires_at,
        created_at: now,
        paired_refresh: new_token.paired_refresh,
    };

    sqlx::query(
        "INSERT INTO auth_tokens (id, user_id, token, token_type, status, expires_at, refresh_token, created_at, updated_at)
         VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $8)",
    )
    .bind(record.id)
    .bind(record.user_id)
    .bind(&record.value)
    .bind(record.kind.as_str())
    .bind(record.status.as_str())
    .bind(record.expires_at)
    .bind(record.paired_refresh.as_deref())
    .bind(now)
    .execute(executor)
    .await?;

    Ok(record)
}

#[async_trait]
impl TokenRepository for PgTokenRepository {
    async fn create(&self, new_token: NewToken) -> Result<TokenRecord, StorageError> {
        insert_token(&self.pool, new_token)
            .await
            .map_err(|error| StorageError::QueryError {
                command: "create_token".to_string(),
                error,
            })
    }

    async fn find_by_value(&self, value: &str) -> Result<Option<TokenRecord>, StorageError> {
        let row: Option<TokenRow> =
            sqlx::query_as(&format!("SELECT {TOKEN_COLUMNS} FROM auth_tokens WHERE token = $1"))
                .bind(value)
                .fetch_optional(&self.pool)
                .await
                .map_err(|error| StorageError::QueryError {
                    command: "find_token_by_value".to_string(),
                    error,
                })?;

        row.map(TokenRecord::try_from).transpose()
    }

    async fn revoke(&self, value: &str, user_id: Uuid) -> Result<bool, StorageError> {
        let result = sqlx::query(
            "UPDATE auth_tokens SET status = 'revoked', updated_at = $1
             WHERE token = $2 AND user_id = $3 AND status = 'active'",
        )
        .bind(Utc::now())
        .bind(value)
        .bind(user_id)
        .execute(&self.pool)
        .await
        .map_err(|error| StorageError::QueryError {
            command: "revoke_token".to_string(),
            error,
        })?;

        Ok(result.rows_affected() > 0)
    }

    async fn rotate(
        &self,
        refresh_value: &str,
        access: NewToken,
        refresh: NewToken,
    ) -> Result<Option<SessionPair>, StorageError> {
        let wrap = |error| StorageError::TransactionError {
            command: "rotate_refresh_token".to_string(),
            error,
        };

        let mut tx = self.pool.begin().await.map_err(wrap)?;

        let revoked = sqlx::query(
            "UPDATE auth_tokens SET status = 'revoked', updated_at = $1
             WHERE token = $2 AND user_id = $3 AND status = 'active'",
        )
        .bind(Utc::now())
        .bind(refresh_value)
        .bind(refresh.user_id)
        .execute(&mut *tx)
        .await
        .map_err(wrap)?;

        if revoked.rows_affected() == 0 {
            tx.rollback().await.map_err(wrap)?;
            return Ok(None);
        }

        let access = insert_token(&mut *tx, access).await.map_err(wrap)?;
        let refresh = insert_token(&mut *tx, refresh).await.map_err(wrap)?;

        tx.commit().await.map_err(wrap)?;
        Ok(Some(SessionPair { access, refresh }))
    }

    async fn delete_expired(&self, cutoff: DateTime<Utc>) -> Result<u64, StorageError> {
        let result = sqlx::query("DELETE FROM auth_tokens WHERE expires_at < $1")
            .bind(cutoff)
            .execute(&self.pool)
            .await
            .map_err(|error| StorageError::QueryError {
                command: "delete_expired_tokens".to_string(),
                error,
            })?;

        Ok(result.rows_affected())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::TokenKind;

    fn sample_row() -> TokenRow {
        TokenRow {
            id: Uuid::now_v7(),
            user_id: Uuid::now_v7(),
            token: "opaque-value".to_string(),
            token_type: "access".to_string(),
            status: "active".to_string(),
            expires_at: Utc::now(),
            created_at: Utc::now(),
            refresh_token: Some("paired-value".to_string()),
        }
    }

    #[test]
    fn row_decoding_maps_the_paired_refresh_column() {
        let record = TokenRecord::try_from(sample_row()).unwrap();

        assert_eq!(record.value, "opaque-value");
        assert_eq!(record.kind, TokenKind::Access);
        assert_eq!(record.status, TokenStatus::Active);
        assert_eq!(record.paired_refresh.as_deref(), Some("paired-value"));
    }

    #[test]
    fn row_decoding_rejects_unknown_stored_values() {
        let mut row = sample_row();
        row.token_type = "session".to_string();
        let result = TokenRecord::try_from(row);
        assert!(
            matches!(result, Err(StorageError::DecodeError { field, .. }) if field == "token type")
        );

        let mut row = sample_row();
        row.status = "burned".to_string();
        let result = TokenRecord::try_from(row);
        assert!(
            matches!(result, Err(StorageError::DecodeError { field, .. }) if field == "token status")
        );
    }
}
