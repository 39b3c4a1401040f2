//! Repository layer with async trait abstraction over users and debts.
//!
//! Two backends implement both traits: [`PostgresStore`] (sqlx) and
//! [`InMemoryStore`] (dev fallback and tests). Deleting a user removes all of
//! that user's debts in both backends.

use std::sync::Arc;

use async_trait::async_trait;
use sqlx::PgPool;

use crate::models::{AppError, Debt, DebtWithOwner, NewDebt, NewUser, User};

mod memory;
mod postgres;

pub use memory::InMemoryStore;
pub use postgres::PostgresStore;

pub const DEFAULT_LIMIT: u32 = 100;

/// Offset/limit paging, ordered by id (insertion order).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ListOptions {
    pub skip: u32,
    pub limit: u32,
}

impl Default for ListOptions {
    fn default() -> Self { Self { skip: 0, limit: DEFAULT_LIMIT } }
}

impl ListOptions {
    pub fn clamp(self, max_limit: u32) -> Self {
        Self { skip: self.skip, limit: self.limit.min(max_limit) }
    }
}

#[async_trait]
pub trait UserRepository: Send + Sync {
    async fn list(&self, opts: ListOptions) -> Result<Vec<User>, AppError>;
    async fn find_by_id(&self, id: i64) -> Result<Option<User>, AppError>;
    /// Case-insensitive lookup.
    async fn find_by_email(&self, email: &str) -> Result<Option<User>, AppError>;
    async fn list_active(&self) -> Result<Vec<User>, AppError>;
    /// Fails with `DuplicateEmail` when the email is taken.
    async fn create(&self, user: NewUser) -> Result<User, AppError>;
    /// Writes every field of `user` except the password hash. `Ok(None)` when the id is unknown.
    async fn update(&self, user: User) -> Result<Option<User>, AppError>;
    /// Deletes the user and all owned debts. `Ok(false)` when the id is unknown.
    async fn delete(&self, id: i64) -> Result<bool, AppError>;
    async fn toggle_active(&self, id: i64) -> Result<Option<User>, AppError>;
}

#[async_trait]
pub trait DebtRepository: Send + Sync {
    async fn list(&self, opts: ListOptions) -> Result<Vec<Debt>, AppError>;
    async fn find_by_id(&self, id: i64) -> Result<Option<Debt>, AppError>;
    async fn find_with_owner(&self, id: i64) -> Result<Option<DebtWithOwner>, AppError>;
    async fn list_by_user(&self, user_id: i64) -> Result<Vec<Debt>, AppError>;
    async fn list_unpaid_by_user(&self, user_id: i64) -> Result<Vec<Debt>, AppError>;
    /// Always stores `paid = false`. Fails with `UserNotFound` for an unknown owner.
    async fn create(&self, debt: NewDebt) -> Result<Debt, AppError>;
    async fn update(&self, debt: Debt) -> Result<Option<Debt>, AppError>;
    async fn delete(&self, id: i64) -> Result<bool, AppError>;
    async fn mark_paid(&self, id: i64) -> Result<Option<Debt>, AppError>;
}

/// Both repositories backed by the same store.
#[derive(Clone)]
pub struct Repositories {
    pub users: Arc<dyn UserRepository>,
    pub debts: Arc<dyn DebtRepository>,
}

/// Factory for repositories; selects between drivers.
#[derive(Debug, Clone)]
pub struct RepositoryFactory;

impl RepositoryFactory {
    pub fn postgres(pool: PgPool) -> Repositories {
        let store = Arc::new(PostgresStore::new(pool));
        Repositories { users: store.clone(), debts: store }
    }

    pub fn in_memory() -> Repositories {
        let store = Arc::new(InMemoryStore::new());
        Repositories { users: store.clone(), debts: store }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn list_options_clamp_limit_only() {
        let opts = ListOptions { skip: 7, limit: 500 }.clamp(100);
        assert_eq!(opts, ListOptions { skip: 7, limit: 100 });
        assert_eq!(ListOptions::default().clamp(100).limit, 100);
        assert_eq!(ListOptions { skip: 0, limit: 0 }.clamp(100).limit, 0);
    }
}
