use async_trait::async_trait;
use sqlx::{postgres::PgRow, PgPool, Row};

use super::{DebtRepository, ListOptions, UserRepository};
use crate::models::{AppError, Debt, DebtWithOwner, NewDebt, NewUser, User};

const USER_COLUMNS: &str = "id, email, first_name, last_name, password_hash, is_active";
const DEBT_COLUMNS: &str = "id, description, value, date, paid, user_id";

/// sqlx-backed store. The schema lives in `migrations/`; `debts.user_id`
/// references `users.id` with `ON DELETE CASCADE`.
#[derive(Clone)]
pub struct PostgresStore {
    pub pool: PgPool,
}

impl PostgresStore {
    pub fn new(pool: PgPool) -> Self { Self { pool } }
}

fn user_from_row(row: &PgRow) -> Result<User, AppError> {
    Ok(User {
        id: row.try_get("id")?,
        email: row.try_get("email")?,
        first_name: row.try_get("first_name")?,
        last_name: row.try_get("last_name")?,
        password_hash: row.try_get("password_hash")?,
        is_active: row.try_get("is_active")?,
    })
}

fn debt_from_row(row: &PgRow) -> Result<Debt, AppError> {
    Ok(Debt {
        id: row.try_get("id")?,
        description: row.try_get("description")?,
        value: row.try_get("value")?,
        date: row.try_get("date")?,
        paid: row.try_get("paid")?,
        user_id: row.try_get("user_id")?,
    })
}

fn map_user_write_error(e: sqlx::Error, email: &str) -> AppError {
    if let sqlx::Error::Database(db) = &e {
        if db.is_unique_violation() {
            return AppError::DuplicateEmail(email.to_string());
        }
    }
    AppError::Repo(e.to_string())
}

fn map_debt_write_error(e: sqlx::Error, user_id: i64) -> AppError {
    if let sqlx::Error::Database(db) = &e {
        if db.is_foreign_key_violation() {
            return AppError::UserNotFound(user_id);
        }
    }
    AppError::Repo(e.to_string())
}

#[async_trait]
impl UserRepository for PostgresStore {
    async fn list(&self, opts: ListOptions) -> Result<Vec<User>, AppError> {
        let rows = sqlx::query(&format!("SELECT {USER_COLUMNS} FROM users ORDER BY id ASC LIMIT $1 OFFSET $2"))
            .bind(i64::from(opts.limit))
            .bind(i64::from(opts.skip))
            .fetch_all(&self.pool)
            .await?;
        rows.iter().map(user_from_row).collect()
    }

    async fn find_by_id(&self, id: i64) -> Result<Option<User>, AppError> {
        let row = sqlx::query(&format!("SELECT {USER_COLUMNS} FROM users WHERE id = $1"))
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(user_from_row).transpose()
    }

    async fn find_by_email(&self, email: &str) -> Result<Option<User>, AppError> {
        let row = sqlx::query(&format!("SELECT {USER_COLUMNS} FROM users WHERE lower(email) = lower($1)"))
            .bind(email)
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(user_from_row).transpose()
    }

    async fn list_active(&self) -> Result<Vec<User>, AppError> {
        let rows = sqlx::query(&format!("SELECT {USER_COLUMNS} FROM users WHERE is_active ORDER BY id ASC"))
            .fetch_all(&self.pool)
            .await?;
        rows.iter().map(user_from_row).collect()
    }

    async fn create(&self, user: NewUser) -> Result<User, AppError> {
        let row = sqlx::query(&format!(
            "INSERT INTO users (email, first_name, last_name, password_hash, is_active)
             VALUES ($1, $2, $3, $4, TRUE)
             RETURNING {USER_COLUMNS}"
        ))
        .bind(&user.email)
        .bind(&user.first_name)
        .bind(&user.last_name)
        .bind(&user.password_hash)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| map_user_write_error(e, &user.email))?;
        user_from_row(&row)
    }

    async fn update(&self, user: User) -> Result<Option<User>, AppError> {
        let row = sqlx::query(&format!(
            "UPDATE users SET email = $2, first_name = $3, last_name = $4, is_active = $5
             WHERE id = $1
             RETURNING {USER_COLUMNS}"
        ))
        .bind(user.id)
        .bind(&user.email)
        .bind(&user.first_name)
        .bind(&user.last_name)
        .bind(user.is_active)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| map_user_write_error(e, &user.email))?;
        row.as_ref().map(user_from_row).transpose()
    }

    async fn delete(&self, id: i64) -> Result<bool, AppError> {
        // The foreign key cascades too; deleting debts first keeps the rule explicit.
        let mut tx = self.pool.begin().await?;
        sqlx::query("DELETE FROM debts WHERE user_id = $1").bind(id).execute(&mut *tx).await?;
        let deleted = sqlx::query("DELETE FROM users WHERE id = $1").bind(id).execute(&mut *tx).await?;
        if deleted.rows_affected() == 0 {
            tx.rollback().await?;
            return Ok(false);
        }
        tx.commit().await?;
        Ok(true)
    }

    async fn toggle_active(&self, id: i64) -> Result<Option<User>, AppError> {
        let row = sqlx::query(&format!("UPDATE users SET is_active = NOT is_active WHERE id = $1 RETURNING {USER_COLUMNS}"))
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(user_from_row).transpose()
    }
}

#[async_trait]
impl DebtRepository for PostgresStore {
    async fn list(&self, opts: ListOptions) -> Result<Vec<Debt>, AppError> {
        let rows = sqlx::query(&format!("SELECT {DEBT_COLUMNS} FROM debts ORDER BY id ASC LIMIT $1 OFFSET $2"))
            .bind(i64::from(opts.limit))
            .bind(i64::from(opts.skip))
            .fetch_all(&self.pool)
            .await?;
        rows.iter().map(debt_from_row).collect()
    }

    async fn find_by_id(&self, id: i64) -> Result<Option<Debt>, AppError> {
        let row = sqlx::query(&format!("SELECT {DEBT_COLUMNS} FROM debts WHERE id = $1"))
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(debt_from_row).transpose()
    }

    async fn find_with_owner(&self, id: i64) -> Result<Option<DebtWithOwner>, AppError> {
        let row = sqlx::query(
            r#"SELECT d.id, d.description, d.value, d.date, d.paid, d.user_id,
                      u.first_name AS owner_first_name, u.last_name AS owner_last_name, u.email AS owner_email
               FROM debts d JOIN users u ON u.id = d.user_id
               WHERE d.id = $1"#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        let Some(row) = row else { return Ok(None) };
        Ok(Some(DebtWithOwner {
            debt: debt_from_row(&row)?,
            owner_first_name: row.try_get("owner_first_name")?,
            owner_last_name: row.try_get("owner_last_name")?,
            owner_email: row.try_get("owner_email")?,
        }))
    }

    async fn list_by_user(&self, user_id: i64) -> Result<Vec<Debt>, AppError> {
        let rows = sqlx::query(&format!("SELECT {DEBT_COLUMNS} FROM debts WHERE user_id = $1 ORDER BY id ASC"))
            .bind(user_id)
            .fetch_all(&self.pool)
            .await?;
        rows.iter().map(debt_from_row).collect()
    }

    async fn list_unpaid_by_user(&self, user_id: i64) -> Result<Vec<Debt>, AppError> {
        let rows = sqlx::query(&format!("SELECT {DEBT_COLUMNS} FROM debts WHERE user_id = $1 AND NOT paid ORDER BY id ASC"))
            .bind(user_id)
            .fetch_all(&self.pool)
            .await?;
        rows.iter().map(debt_from_row).collect()
    }

    async fn create(&self, debt: NewDebt) -> Result<Debt, AppError> {
        let row = sqlx::query(&format!(
            "INSERT INTO debts (description, value, date, paid, user_id)
             VALUES ($1, $2, $3, FALSE, $4)
             RETURNING {DEBT_COLUMNS}"
        ))
        .bind(&debt.description)
        .bind(debt.value)
        .bind(debt.date)
        .bind(debt.user_id)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| map_debt_write_error(e, debt.user_id))?;
        debt_from_row(&row)
    }

    async fn update(&self, debt: Debt) -> Result<Option<Debt>, AppError> {
        let row = sqlx::query(&format!(
            "UPDATE debts SET description = $2, value = $3, date = $4, paid = $5, user_id = $6
             WHERE id = $1
             RETURNING {DEBT_COLUMNS}"
        ))
        .bind(debt.id)
        .bind(&debt.description)
        .bind(debt.value)
        .bind(debt.date)
        .bind(debt.paid)
        .bind(debt.user_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| map_debt_write_error(e, debt.user_id))?;
        row.as_ref().map(debt_from_row).transpose()
    }

    async fn delete(&self, id: i64) -> Result<bool, AppError> {
        let rows = sqlx::query("DELETE FROM debts WHERE id = $1").bind(id).execute(&self.pool).await?;
        Ok(rows.rows_affected() > 0)
    }

    async fn mark_paid(&self, id: i64) -> Result<Option<Debt>, AppError> {
        let row = sqlx::query(&format!("UPDATE debts SET paid = TRUE WHERE id = $1 RETURNING {DEBT_COLUMNS}"))
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(debt_from_row).transpose()
    }
}
