//! Account operations on top of the [`UserRepository`] seam: registration,
//! profile reads and updates, password changes and status administration.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::info;
use uuid::Uuid;

use crate::error::UserError;
use crate::password::{hash_password, verify_password};
use crate::users::repository::UserRepository;
use crate::users::{
    NewUser, Pagination, RegisteredUser, UserListQuery, UserPage, UserProfile, UserRole, UserStatus,
};

const DEFAULT_PAGE: i64 = 1;
const DEFAULT_PAGE_SIZE: i64 = 10;

pub struct UserService {
    users: Arc<dyn UserRepository>,
}

impl UserService {
    pub fn new(users: Arc<dyn UserRepository>) -> Self {
        Self { users }
    }

    /// Creates an account with the default member role. The email precheck
    /// gives the common duplicate a clean rejection; the unique index on
    /// `users.email` catches the interleaved-registration race behind it.
    pub async fn register(
        &self,
        email: &str,
        password: &str,
        name: &str,
    ) -> Result<RegisteredUser, UserError> {
        if self.users.find_by_email(email).await?.is_some() {
            return Err(UserError::EmailTaken);
        }

        let password_hash = hash_password(password)?;
        let new_user = NewUser {
            email: email.to_string(),
            password_hash,
            name: name.to_string(),
            role: UserRole::User,
        };

        let user = match self.users.create(new_user).await {
            Ok(user) => user,
            Err(error) if error.is_unique_violation() => return Err(UserError::EmailTaken),
            Err(error) => return Err(error.into()),
        };

        info!(user_id = %user.id, "registered new user");
        Ok(RegisteredUser {
            user_id: user.id,
            email: user.email,
            name: user.name,
            created_at: user.created_at,
        })
    }

    pub async fn get_profile(&self, user_id: Uuid) -> Result<UserProfile, UserError> {
        let user = self
            .users
            .find_by_id(user_id)
            .await?
            .ok_or(UserError::NotFound)?;
        Ok(UserProfile::from(user))
    }

    /// Paginated directory listing. Out-of-range paging values fall back to
    /// the first page of ten rather than erroring.
    pub async fn get_list(&self, mut query: UserListQuery) -> Result<UserPage, UserError> {
        if query.page < 1 {
            query.page = DEFAULT_PAGE;
        }
        if query.page_size < 1 {
            query.page_size = DEFAULT_PAGE_SIZE;
        }

        let (users, total) = self.users.list(&query).await?;
        let total_pages = (total + query.page_size - 1) / query.page_size;

        Ok(UserPage {
            users: users.into_iter().map(UserProfile::from).collect(),
            pagination: Pagination {
                page: query.page,
                page_size: query.page_size,
                total,
                total_pages,
            },
        })
    }

    pub async fn update_profile(
        &self,
        user_id: Uuid,
        name: &str,
    ) -> Result<UserProfile, UserError> {
        let user = self
            .users
            .find_by_id(user_id)
            .await?
            .ok_or(UserError::NotFound)?;

        let updated_at = self.users.update_profile(user_id, name).await?;
        Ok(UserProfile {
            name: name.to_string(),
            updated_at,
            ..UserProfile::from(user)
        })
    }

    /// Swaps the stored hash after proving knowledge of the current password.
    pub async fn change_password(
        &self,
        user_id: Uuid,
        old_password: &str,
        new_password: &str,
    ) -> Result<DateTime<Utc>, UserError> {
        let user = self
            .users
            .find_by_id(user_id)
            .await?
            .ok_or(UserError::NotFound)?;

        if !verify_password(old_password, &user.password_hash)? {
            return Err(UserError::InvalidOldPassword);
        }

        let password_hash = hash_password(new_password)?;
        let updated_at = self.users.update_password(user_id, &password_hash).await?;
        info!(user_id = %user_id, "changed user password");
        Ok(updated_at)
    }

    pub async fn update_status(
        &self,
        user_id: Uuid,
        status: UserStatus,
    ) -> Result<DateTime<Utc>, UserError> {
        if self.users.find_by_id(user_id).await?.is_none() {
            return Err(UserError::NotFound);
        }

        let updated_at = self.users.update_status(user_id, status).await?;
        info!(user_id = %user_id, status = status.as_str(), "updated user status");
        Ok(updated_at)
    }
}
