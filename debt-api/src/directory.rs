//! User directory: validation, uniqueness and existence rules on top of [`UserRepository`].

use std::sync::Arc;

use crate::auth::AuthService;
use crate::models::{AppError, CreateUserRequest, NewUser, UpdateUserRequest, User, UserNameResponse, UserResponse, UserStatusResponse};
use crate::repository::{ListOptions, UserRepository};

#[derive(Clone)]
pub struct UserDirectory {
    users: Arc<dyn UserRepository>,
    auth: Arc<dyn AuthService>,
}

fn not_found(id: i64) -> AppError {
    AppError::NotFound(format!("user with id {id} not found"))
}

impl UserDirectory {
    pub fn new(users: Arc<dyn UserRepository>, auth: Arc<dyn AuthService>) -> Self {
        Self { users, auth }
    }

    pub async fn list(&self, opts: ListOptions) -> Result<Vec<UserResponse>, AppError> {
        let users = self.users.list(opts).await?;
        Ok(users.into_iter().map(UserResponse::from).collect())
    }

    pub async fn get(&self, id: i64) -> Result<UserResponse, AppError> {
        let user = self.users.find_by_id(id).await?.ok_or_else(|| not_found(id))?;
        Ok(UserResponse::from(user))
    }

    pub async fn get_by_email(&self, email: &str) -> Result<Option<User>, AppError> {
        self.users.find_by_email(email).await
    }

    /// Full names of every active user; an empty directory is reported as not found.
    pub async fn list_active(&self) -> Result<Vec<UserNameResponse>, AppError> {
        let users = self.users.list_active().await?;
        if users.is_empty() {
            return Err(AppError::NotFound("no active users found".into()));
        }
        Ok(users.iter().map(|u| UserNameResponse { full_name: u.full_name() }).collect())
    }

    pub async fn create(&self, request: CreateUserRequest) -> Result<UserResponse, AppError> {
        request.validate()?;
        let email = request.email.to_lowercase();
        if self.users.find_by_email(&email).await?.is_some() {
            return Err(AppError::DuplicateEmail(email));
        }
        let password_hash = self.auth.hash_password(request.password).await?;
        let user = self
            .users
            .create(NewUser { email, first_name: request.first_name, last_name: request.last_name, password_hash })
            .await?;
        tracing::info!(user_id = user.id, "user created");
        Ok(UserResponse::from(user))
    }

    /// Applies only the fields present in `patch`. Every check runs before the write.
    pub async fn update(&self, id: i64, mut patch: UpdateUserRequest) -> Result<UserResponse, AppError> {
        patch.validate()?;
        patch.email = patch.email.map(|e| e.to_lowercase());
        if let Some(email) = &patch.email {
            if let Some(existing) = self.users.find_by_email(email).await? {
                if existing.id != id {
                    return Err(AppError::DuplicateEmail(email.clone()));
                }
            }
        }
        let mut user = self.users.find_by_id(id).await?.ok_or_else(|| not_found(id))?;
        patch.apply_to(&mut user);
        let user = self.users.update(user).await?.ok_or_else(|| not_found(id))?;
        tracing::info!(user_id = id, "user updated");
        Ok(UserResponse::from(user))
    }

    pub async fn delete(&self, id: i64) -> Result<(), AppError> {
        if !self.users.delete(id).await? {
            return Err(not_found(id));
        }
        tracing::info!(user_id = id, "user deleted with its debts");
        Ok(())
    }

    pub async fn toggle_active(&self, id: i64) -> Result<UserStatusResponse, AppError> {
        let user = self.users.toggle_active(id).await?.ok_or_else(|| not_found(id))?;
        tracing::info!(user_id = id, is_active = user.is_active, "user status changed");
        Ok(UserStatusResponse::from(user))
    }
}
