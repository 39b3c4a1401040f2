// In-memory store for dev fallback and tests. Users and debts share one lock so
// the cascade on user deletion and the owner checks on debts are atomic.

use std::{collections::BTreeMap, sync::Arc};

use async_trait::async_trait;
use tokio::sync::RwLock;

use super::{DebtRepository, ListOptions, UserRepository};
use crate::models::{AppError, Debt, DebtWithOwner, NewDebt, NewUser, User};

#[derive(Debug, Default)]
struct StoreState {
    users: BTreeMap<i64, User>,
    debts: BTreeMap<i64, Debt>,
    last_user_id: i64,
    last_debt_id: i64,
}

impl StoreState {
    fn email_taken_by_other(&self, email: &str, id: Option<i64>) -> bool {
        self.users.values().any(|u| Some(u.id) != id && u.email.eq_ignore_ascii_case(email))
    }
}

fn page<T>(items: impl Iterator<Item = T>, opts: ListOptions) -> Vec<T> {
    items.skip(opts.skip as usize).take(opts.limit as usize).collect()
}

#[derive(Debug, Default, Clone)]
pub struct InMemoryStore {
    inner: Arc<RwLock<StoreState>>,
}

impl InMemoryStore {
    pub fn new() -> Self { Self::default() }
}

#[async_trait]
impl UserRepository for InMemoryStore {
    async fn list(&self, opts: ListOptions) -> Result<Vec<User>, AppError> {
        let state = self.inner.read().await;
        Ok(page(state.users.values().cloned(), opts))
    }

    async fn find_by_id(&self, id: i64) -> Result<Option<User>, AppError> {
        let state = self.inner.read().await;
        Ok(state.users.get(&id).cloned())
    }

    async fn find_by_email(&self, email: &str) -> Result<Option<User>, AppError> {
        let state = self.inner.read().await;
        Ok(state.users.values().find(|u| u.email.eq_ignore_ascii_case(email)).cloned())
    }

    async fn list_active(&self) -> Result<Vec<User>, AppError> {
        let state = self.inner.read().await;
        Ok(state.users.values().filter(|u| u.is_active).cloned().collect())
    }

    async fn create(&self, user: NewUser) -> Result<User, AppError> {
        let mut state = self.inner.write().await;
        if state.email_taken_by_other(&user.email, None) {
            return Err(AppError::DuplicateEmail(user.email));
        }
        state.last_user_id += 1;
        let user = User {
            id: state.last_user_id,
            email: user.email,
            first_name: user.first_name,
            last_name: user.last_name,
            password_hash: user.password_hash,
            is_active: true,
        };
        state.users.insert(user.id, user.clone());
        Ok(user)
    }

    async fn update(&self, user: User) -> Result<Option<User>, AppError> {
        let mut state = self.inner.write().await;
        if state.email_taken_by_other(&user.email, Some(user.id)) {
            return Err(AppError::DuplicateEmail(user.email));
        }
        let Some(stored) = state.users.get_mut(&user.id) else { return Ok(None) };
        stored.email = user.email;
        stored.first_name = user.first_name;
        stored.last_name = user.last_name;
        stored.is_active = user.is_active;
        Ok(Some(stored.clone()))
    }

    async fn delete(&self, id: i64) -> Result<bool, AppError> {
        let mut state = self.inner.write().await;
        if state.users.remove(&id).is_none() {
            return Ok(false);
        }
        state.debts.retain(|_, d| d.user_id != id);
        Ok(true)
    }

    async fn toggle_active(&self, id: i64) -> Result<Option<User>, AppError> {
        let mut state = self.inner.write().await;
        Ok(state.users.get_mut(&id).map(|u| {
            u.is_active = !u.is_active;
            u.clone()
        }))
    }
}

#[async_trait]
impl DebtRepository for InMemoryStore {
    async fn list(&self, opts: ListOptions) -> Result<Vec<Debt>, AppError> {
        let state = self.inner.read().await;
        Ok(page(state.debts.values().cloned(), opts))
    }

    async fn find_by_id(&self, id: i64) -> Result<Option<Debt>, AppError> {
        let state = self.inner.read().await;
        Ok(state.debts.get(&id).cloned())
    }

    async fn find_with_owner(&self, id: i64) -> Result<Option<DebtWithOwner>, AppError> {
        let state = self.inner.read().await;
        let Some(debt) = state.debts.get(&id) else { return Ok(None) };
        let owner = state
            .users
            .get(&debt.user_id)
            .ok_or_else(|| AppError::Repo(format!("debt {id} references missing user {}", debt.user_id)))?;
        Ok(Some(DebtWithOwner {
            debt: debt.clone(),
            owner_first_name: owner.first_name.clone(),
            owner_last_name: owner.last_name.clone(),
            owner_email: owner.email.clone(),
        }))
    }

    async fn list_by_user(&self, user_id: i64) -> Result<Vec<Debt>, AppError> {
        let state = self.inner.read().await;
        Ok(state.debts.values().filter(|d| d.user_id == user_id).cloned().collect())
    }

    async fn list_unpaid_by_user(&self, user_id: i64) -> Result<Vec<Debt>, AppError> {
        let state = self.inner.read().await;
        Ok(state.debts.values().filter(|d| d.user_id == user_id && !d.paid).cloned().collect())
    }

    async fn create(&self, debt: NewDebt) -> Result<Debt, AppError> {
        let mut state = self.inner.write().await;
        if !state.users.contains_key(&debt.user_id) {
            return Err(AppError::UserNotFound(debt.user_id));
        }
        state.last_debt_id += 1;
        let debt = Debt {
            id: state.last_debt_id,
            description: debt.description,
            value: debt.value,
            date: debt.date,
            paid: false,
            user_id: debt.user_id,
        };
        state.debts.insert(debt.id, debt.clone());
        Ok(debt)
    }

    async fn update(&self, debt: Debt) -> Result<Option<Debt>, AppError> {
        let mut state = self.inner.write().await;
        if !state.users.contains_key(&debt.user_id) {
            return Err(AppError::UserNotFound(debt.user_id));
        }
        let Some(stored) = state.debts.get_mut(&debt.id) else { return Ok(None) };
        *stored = debt;
        Ok(Some(stored.clone()))
    }

    async fn delete(&self, id: i64) -> Result<bool, AppError> {
        let mut state = self.inner.write().await;
        Ok(state.debts.remove(&id).is_some())
    }

    async fn mark_paid(&self, id: i64) -> Result<Option<Debt>, AppError> {
        let mut state = self.inner.write().await;
        Ok(state.debts.get_mut(&id).map(|d| {
            d.paid = true;
            d.clone()
        }))
    }
}

#[cfg(test)]
mod tests {
    use chrono::NaiveDate;

    use super::*;

    fn new_user(email: &str) -> NewUser {
        NewUser { email: email.into(), first_name: "Ana".into(), last_name: "Lopez".into(), password_hash: "hash".into() }
    }

    fn new_debt(user_id: i64, description: &str) -> NewDebt {
        NewDebt { description: description.into(), value: 10.0, date: NaiveDate::from_ymd_opt(2024, 1, 1).unwrap(), user_id }
    }

    #[tokio::test]
    async fn ids_are_sequential_and_listing_keeps_insertion_order() {
        let store = InMemoryStore::new();
        for i in 0..5 {
            UserRepository::create(&store, new_user(&format!("u{i}@x.com"))).await.unwrap();
        }
        let all = UserRepository::list(&store, ListOptions::default()).await.unwrap();
        assert_eq!(all.iter().map(|u| u.id).collect::<Vec<_>>(), vec![1, 2, 3, 4, 5]);
        let paged = UserRepository::list(&store, ListOptions { skip: 1, limit: 2 }).await.unwrap();
        assert_eq!(paged.iter().map(|u| u.id).collect::<Vec<_>>(), vec![2, 3]);
    }

    #[tokio::test]
    async fn duplicate_email_is_rejected_case_insensitively() {
        let store = InMemoryStore::new();
        UserRepository::create(&store, new_user("a@x.com")).await.unwrap();
        let err = UserRepository::create(&store, new_user("A@X.com")).await.unwrap_err();
        assert!(matches!(err, AppError::DuplicateEmail(_)));
        assert_eq!(UserRepository::list(&store, ListOptions::default()).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn deleting_user_cascades_to_debts() {
        let store = InMemoryStore::new();
        let ana = UserRepository::create(&store, new_user("a@x.com")).await.unwrap();
        let bob = UserRepository::create(&store, new_user("b@x.com")).await.unwrap();
        let d1 = DebtRepository::create(&store, new_debt(ana.id, "rent")).await.unwrap();
        let d2 = DebtRepository::create(&store, new_debt(bob.id, "food")).await.unwrap();
        assert!(UserRepository::delete(&store, ana.id).await.unwrap());
        assert!(DebtRepository::find_by_id(&store, d1.id).await.unwrap().is_none());
        assert!(DebtRepository::find_by_id(&store, d2.id).await.unwrap().is_some());
        assert!(!UserRepository::delete(&store, ana.id).await.unwrap());
    }

    #[tokio::test]
    async fn debts_require_an_existing_owner() {
        let store = InMemoryStore::new();
        let err = DebtRepository::create(&store, new_debt(42, "rent")).await.unwrap_err();
        assert!(matches!(err, AppError::UserNotFound(42)));
        assert!(DebtRepository::list(&store, ListOptions::default()).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn unpaid_listing_filters_paid_debts() {
        let store = InMemoryStore::new();
        let ana = UserRepository::create(&store, new_user("a@x.com")).await.unwrap();
        let rent = DebtRepository::create(&store, new_debt(ana.id, "rent")).await.unwrap();
        DebtRepository::create(&store, new_debt(ana.id, "food")).await.unwrap();
        store.mark_paid(rent.id).await.unwrap();
        let unpaid = store.list_unpaid_by_user(ana.id).await.unwrap();
        assert_eq!(unpaid.len(), 1);
        assert_eq!(unpaid[0].description, "food");
        assert_eq!(store.list_by_user(ana.id).await.unwrap().len(), 2);
    }
}
