use async_trait::async_trait;
use chrono::{DateTime, Utc};
#[cfg(test)]
use mockall::automock;
use sqlx::{PgPool, Postgres, QueryBuilder};
use uuid::Uuid;

use crate::error::StorageError;
use crate::users::{NewUser, User, UserListQuery, UserStatus};

const USER_COLUMNS: &str = "id, email, password_hash, name, role, status, created_at, updated_at";

/// Narrow storage seam for accounts. The update operations assume the caller
/// has already checked existence; a missing row is silently a no-op.
#[cfg_attr(test, automock)]
#[async_trait]
pub trait UserRepository: Send + Sync {
    async fn create(&self, new_user: NewUser) -> Result<User, StorageError>;
    async fn find_by_id(&self, id: Uuid) -> Result<Option<User>, StorageError>;
    async fn find_by_email(&self, email: &str) -> Result<Option<User>, StorageError>;
    /// Returns the matching page plus the unpaginated total.
    async fn list(&self, query: &UserListQuery) -> Result<(Vec<User>, i64), StorageError>;
    async fn update_profile(&self, id: Uuid, name: &str) -> Result<DateTime<Utc>, StorageError>;
    async fn update_password(
        &self,
        id: Uuid,
        password_hash: &str,
    ) -> Result<DateTime<Utc>, StorageError>;
    async fn update_status(
        &self,
        id: Uuid,
        status: UserStatus,
    ) -> Result<DateTime<Utc>, StorageError>;
}

#[derive(sqlx::FromRow)]
struct UserRow {
    id: Uuid,
    email: String,
    password_hash: String,
    name: String,
    role: String,
    status: String,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<UserRow> for User {
    type Error = StorageError;

    fn try_from(row: UserRow) -> Result<Self, StorageError> {
        Ok(User {
            id: row.id,
            email: row.email,
            password_hash: row.password_hash,
            name: row.name,
            role: row.role.parse()?,
            status: row.status.parse()?,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

pub struct PgUserRepository {
    pool: PgPool,
}

impl PgUserRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

fn push_filters(builder: &mut QueryBuilder<'_, Postgres>, query: &UserListQuery) {
    let mut any = false;
    if let Some(search) = &query.search {
        let pattern = format!("%{search}%");
        builder
            .push(" WHERE (name ILIKE ")
            .push_bind(pattern.clone())
            .push(" OR email ILIKE ")
            .push_bind(pattern)
            .push(")");
        any = true;
    }
    if let Some(status) = query.status {
        builder.push(if any { " AND " } else { " WHERE " });
        builder.push("status = ").push_bind(status.as_str());
        any = true;
    }
    if let Some(role) = query.role {
        builder.push(if any { " AND " } else { " WHERE " });
        builder.push("role = ").push_bind(role.as_str());
    }
}

#[async_trait]
impl UserRepository for PgUserRepository {
    async fn create(&self, new_user: NewUser) -> Result<User, StorageError> {
        let now = Utc::now();
        let user = User {
            id: Uuid::now_v7(),
            email: new_user.email,
            password_hash: new_user.password_hash,
            name: new_user.name,
            role: new_user.role,
            status: UserStatus::Active,
            created_at: now,
            updated_at: now,
        };

        sqlx::query(
            "INSERT INTO users (id, email, password_hash, name, role, status, created_at, updated_at)
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8)",
        )
        .bind(user.id)
        .bind(&user.email)
        .bind(&user.password_hash)
        .bind(&user.name)
        .bind(user.role.as_str())
        .bind(user.status.as_str())
        .bind(user.created_at)
        .bind(user.updated_at)
        .execute(&self.pool)
        .await
        .map_err(|error| StorageError::QueryError {
            command: "create_user".to_string(),
            error,
        })?;

        Ok(user)
    }

    async fn find_by_id(&self, id: Uuid) -> Result<Option<User>, StorageError> {
        let row: Option<UserRow> =
            sqlx::query_as(&format!("SELECT {USER_COLUMNS} FROM users WHERE id = $1"))
                .bind(id)
                .fetch_optional(&self.pool)
                .await
                .map_err(|error| StorageError::QueryError {
                    command: "find_user_by_id".to_string(),
                    error,
                })?;
        row.map(User::try_from).transpose()
    }

    async fn find_by_email(&self, email: &str) -> Result<Option<User>, StorageError> {
        let row: Option<UserRow> =
            sqlx::query_as(&format!("SELECT {USER_COLUMNS} FROM users WHERE email = $1"))
                .bind(email)
                .fetch_optional(&self.pool)
                .await
                .map_err(|error| StorageError::QueryError {
                    command: "find_user_by_email".to_string(),
                    error,
                })?;
        row.map(User::try_from).transpose()
    }

    async fn list(&self, query: &UserListQuery) -> Result<(Vec<User>, i64), StorageError> {
        let mut count_builder = QueryBuilder::new("SELECT COUNT(*) FROM users");
        push_filters(&mut count_builder, query);
        let total: i64 = count_builder
            .build_query_scalar()
            .fetch_one(&self.pool)
            .await
            .map_err(|error| StorageError::QueryError {
                command: "count_users".to_string(),
                error,
            })?;

        let mut list_builder = QueryBuilder::new(format!("SELECT {USER_COLUMNS} FROM users"));
        push_filters(&mut list_builder, query);
        list_builder.push(" ORDER BY created_at DESC");
        list_builder.push(" LIMIT ").push_bind(query.page_size);
        list_builder
            .push(" OFFSET ")
            .push_bind((query.page - 1) * query.page_size);

        let rows: Vec<UserRow> = list_builder
            .build_query_as()
            .fetch_all(&self.pool)
            .await
            .map_err(|error| StorageError::QueryError {
                command: "list_users".to_string(),
                error,
            })?;

        let users = rows
            .into_iter()
            .map(User::try_from)
            .collect::<Result<Vec<_>, _>>()?;
        Ok((users, total))
    }

    async fn update_profile(&self, id: Uuid, name: &str) -> Result<DateTime<Utc>, StorageError> {
        let updated_at = Utc::now();
        sqlx::query("UPDATE users SET name = $1, updated_at = $2 WHERE id = $3")
            .bind(name)
            .bind(updated_at)
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(|error| StorageError::QueryError {
                command: "update_user_profile".to_string(),
                error,
            })?;
        Ok(updated_at)
    }

    async fn update_password(
        &self,
        id: Uuid,
        password_hash: &str,
    ) -> Result<DateTime<Utc>, StorageError> {
        let updated_at = Utc::now();
        sqlx::query("UPDATE users SET password_hash = $1, updated_at = $2 WHERE id = $3")
            .bind(password_hash)
            .bind(updated_at)
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(|error| StorageError::QueryError {
                command: "update_user_password".to_string(),
                error,
            })?;
        Ok(updated_at)
    }

    async fn update_status(
        &self,
        id: Uuid,
        status: UserStatus,
    ) -> Result<DateTime<Utc>, StorageError> {
        let updated_at = Utc::now();
        sqlx::query("UPDATE users SET status = $1, updated_at = $2 WHERE id = $3")
            .bind(status.as_str())
            .bind(updated_at)
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(|error| StorageError::QueryError {
                command: "update_user_status".to_string(),
                error,
            })?;
        Ok(updated_at)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn filters_compose_with_where_and_and() {
        let query = UserListQuery {
            page: 1,
            page_size: 10,
            search: Some("ada".to_string()),
            status: Some(UserStatus::Active),
            role: None,
        };
        let mut builder = QueryBuilder::new("SELECT COUNT(*) FROM users");
        push_filters(&mut builder, &query);
        assert_eq!(
            builder.sql(),
            "SELECT COUNT(*) FROM users WHERE (name ILIKE $1 OR email ILIKE $2) AND status = $3"
        );
    }

    #[test]
    fn no_filters_means_no_where_clause() {
        let query = UserListQuery {
            page: 1,
            page_size: 10,
            ..Default::default()
        };
        let mut builder = QueryBuilder::new("SELECT COUNT(*) FROM users");
        push_filters(&mut builder, &query);
        assert_eq!(builder.sql(), "SELECT COUNT(*) FROM users");
    }

    #[test]
    fn unknown_status_value_fails_row_decoding() {
        let row = UserRow {
            id: Uuid::now_v7(),
            email: "ada@example.com".to_string(),
            password_hash: "$pbkdf2-sha256$stub".to_string(),
            name: "Ada".to_string(),
            role: "user".to_string(),
            status: "banned".to_string(),
            created_at: Utc::now(),
            updated_at: Utc::now(),
        };
        let decoded = User::try_from(row);
        assert!(matches!(
            decoded,
            Err(StorageError::DecodeError { field: "user status", .. })
        ));
    }
}
