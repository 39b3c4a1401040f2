//! Debt ledger: debts scoped to an owning user, with owner existence checks
//! running before any write.

use std::sync::Arc;

use crate::models::{AppError, CreateDebtRequest, DebtDetailResponse, DebtResponse, UpdateDebtRequest};
use crate::repository::{DebtRepository, ListOptions, UserRepository};

#[derive(Clone)]
pub struct DebtLedger {
    debts: Arc<dyn DebtRepository>,
    users: Arc<dyn UserRepository>,
}

impl DebtLedger {
    pub fn new(debts: Arc<dyn DebtRepository>, users: Arc<dyn UserRepository>) -> Self {
        Self { debts, users }
    }

    async fn ensure_user(&self, user_id: i64) -> Result<(), AppError> {
        match self.users.find_by_id(user_id).await? {
            Some(_) => Ok(()),
            None => Err(AppError::UserNotFound(user_id)),
        }
    }

    pub async fn list(&self, opts: ListOptions) -> Result<Vec<DebtResponse>, AppError> {
        let debts = self.debts.list(opts).await?;
        Ok(debts.into_iter().map(DebtResponse::from).collect())
    }

    /// Detail view including the owner's name and email.
    pub async fn get(&self, id: i64) -> Result<DebtDetailResponse, AppError> {
        let debt = self.debts.find_with_owner(id).await?.ok_or(AppError::DebtNotFound(id))?;
        Ok(DebtDetailResponse::from(debt))
    }

    pub async fn list_by_user(&self, user_id: i64) -> Result<Vec<DebtResponse>, AppError> {
        self.ensure_user(user_id).await?;
        let debts = self.debts.list_by_user(user_id).await?;
        Ok(debts.into_iter().map(DebtResponse::from).collect())
    }

    pub async fn list_unpaid_by_user(&self, user_id: i64) -> Result<Vec<DebtResponse>, AppError> {
        self.ensure_user(user_id).await?;
        let debts = self.debts.list_unpaid_by_user(user_id).await?;
        Ok(debts.into_iter().map(DebtResponse::from).collect())
    }

    pub async fn create(&self, request: CreateDebtRequest) -> Result<DebtResponse, AppError> {
        request.validate()?;
        self.ensure_user(request.user_id).await?;
        let debt = self.debts.create(request.into()).await?;
        tracing::info!(debt_id = debt.id, user_id = debt.user_id, "debt created");
        Ok(DebtResponse::from(debt))
    }

    pub async fn update(&self, id: i64, patch: UpdateDebtRequest) -> Result<DebtResponse, AppError> {
        patch.validate()?;
        let mut debt = self.debts.find_by_id(id).await?.ok_or(AppError::DebtNotFound(id))?;
        if let Some(user_id) = patch.user_id {
            self.ensure_user(user_id).await?;
        }
        patch.apply_to(&mut debt);
        let debt = self.debts.update(debt).await?.ok_or(AppError::DebtNotFound(id))?;
        tracing::info!(debt_id = id, "debt updated");
        Ok(DebtResponse::from(debt))
    }

    pub async fn delete(&self, id: i64) -> Result<(), AppError> {
        if !self.debts.delete(id).await? {
            return Err(AppError::DebtNotFound(id));
        }
        tracing::info!(debt_id = id, "debt deleted");
        Ok(())
    }

    /// Idempotent: paying an already paid debt succeeds.
    pub async fn mark_paid(&self, id: i64) -> Result<DebtResponse, AppError> {
        let debt = self.debts.mark_paid(id).await?.ok_or(AppError::DebtNotFound(id))?;
        tracing::info!(debt_id = id, "debt marked as paid");
        Ok(DebtResponse::from(debt))
    }
}

#[cfg(test)]
mod tests {
    use chrono::NaiveDate;

    use super::*;
    use crate::models::NewUser;
    use crate::repository::InMemoryStore;

    async fn ledger_with_user() -> (DebtLedger, Arc<InMemoryStore>, i64) {
        let store = Arc::new(InMemoryStore::new());
        let user = UserRepository::create(
            store.as_ref(),
            NewUser { email: "a@x.com".into(), first_name: "Ana".into(), last_name: "Lopez".into(), password_hash: "hash".into() },
        )
        .await
        .unwrap();
        (DebtLedger::new(store.clone(), store.clone()), store, user.id)
    }

    fn rent(user_id: i64) -> CreateDebtRequest {
        CreateDebtRequest { description: "rent".into(), value: 500.0, date: NaiveDate::from_ymd_opt(2024, 1, 1).unwrap(), user_id }
    }

    #[tokio::test]
    async fn create_starts_unpaid_and_requires_owner() {
        let (ledger, store, user_id) = ledger_with_user().await;
        let debt = ledger.create(rent(user_id)).await.unwrap();
        assert!(!debt.status);
        let err = ledger.create(rent(user_id + 100)).await.unwrap_err();
        assert!(matches!(err, AppError::UserNotFound(_)));
        assert_eq!(DebtRepository::list(store.as_ref(), ListOptions::default()).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn detail_view_joins_owner() {
        let (ledger, _, user_id) = ledger_with_user().await;
        let debt = ledger.create(rent(user_id)).await.unwrap();
        let detail = ledger.get(debt.id).await.unwrap();
        assert_eq!(detail.user_nombre, "Ana");
        assert_eq!(detail.user_apellido, "Lopez");
        assert_eq!(detail.user_email, "a@x.com");
        assert!(matches!(ledger.get(999).await, Err(AppError::DebtNotFound(999))));
    }

    #[tokio::test]
    async fn update_with_unknown_owner_changes_nothing() {
        let (ledger, _, user_id) = ledger_with_user().await;
        let debt = ledger.create(rent(user_id)).await.unwrap();
        let patch = UpdateDebtRequest { description: Some("food".into()), user_id: Some(77), ..Default::default() };
        assert!(matches!(ledger.update(debt.id, patch).await, Err(AppError::UserNotFound(77))));
        assert_eq!(ledger.get(debt.id).await.unwrap().debt.description, "rent");
    }

    #[tokio::test]
    async fn partial_update_keeps_absent_fields() {
        let (ledger, _, user_id) = ledger_with_user().await;
        let debt = ledger.create(rent(user_id)).await.unwrap();
        let patch = UpdateDebtRequest { value: Some(0.0), ..Default::default() };
        let updated = ledger.update(debt.id, patch).await.unwrap();
        assert_eq!(updated.value, 0.0);
        assert_eq!(updated.description, "rent");
        assert_eq!(updated.user_id, user_id);
        assert!(matches!(ledger.update(999, UpdateDebtRequest::default()).await, Err(AppError::DebtNotFound(999))));
    }

    #[tokio::test]
    async fn mark_paid_is_idempotent() {
        let (ledger, _, user_id) = ledger_with_user().await;
        let debt = ledger.create(rent(user_id)).await.unwrap();
        assert!(ledger.mark_paid(debt.id).await.unwrap().status);
        assert!(ledger.mark_paid(debt.id).await.unwrap().status);
        assert!(matches!(ledger.mark_paid(999).await, Err(AppError::DebtNotFound(999))));
    }

    #[tokio::test]
    async fn per_user_listings_require_the_user() {
        let (ledger, _, user_id) = ledger_with_user().await;
        assert!(ledger.list_by_user(user_id).await.unwrap().is_empty());
        assert!(matches!(ledger.list_by_user(404).await, Err(AppError::UserNotFound(404))));
        assert!(matches!(ledger.list_unpaid_by_user(404).await, Err(AppError::UserNotFound(404))));
        let debt = ledger.create(rent(user_id)).await.unwrap();
        ledger.create(rent(user_id)).await.unwrap();
        ledger.mark_paid(debt.id).await.unwrap();
        assert_eq!(ledger.list_unpaid_by_user(user_id).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn deleting_owner_removes_debts() {
        let (ledger, store, user_id) = ledger_with_user().await;
        let debt = ledger.create(rent(user_id)).await.unwrap();
        assert!(UserRepository::delete(store.as_ref(), user_id).await.unwrap());
        assert!(ledger.get(debt.id).await.unwrap_err().is_not_found());
        assert!(matches!(ledger.delete(debt.id).await, Err(AppError::DebtNotFound(_))));
    }
}
