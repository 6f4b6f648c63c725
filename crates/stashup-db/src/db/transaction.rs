//! Database transaction utilities
//!
//! Multi-step writes (such as swapping a pending contribution for its completed
//! record) go through a [`TransactionGuard`] so they either all apply or none do.

use sqlx::{Sqlite, SqlitePool, Transaction};
use std::ops::{Deref, DerefMut};

use stashup_core::AppError;

/// A database transaction that must be finished explicitly.
///
/// Dropping the guard without calling [`commit`](Self::commit) rolls the
/// transaction back.
///
/// # Example
///
/// ```ignore
/// use stashup_db::TransactionGuard;
///
/// async fn example(pool: &sqlx::SqlitePool) -> Result<(), stashup_core::AppError> {
///     let mut tx = TransactionGuard::begin(pool).await?;
///     sqlx::query("DELETE FROM places").execute(&mut **tx).await?;
///     tx.commit().await
/// }
/// ```
pub struct TransactionGuard {
    transaction: Transaction<'static, Sqlite>,
}

impl TransactionGuard {
    pub async fn begin(pool: &SqlitePool) -> Result<Self, AppError> {
        let transaction = pool.begin().await.map_err(|e| {
            tracing::error!(error = %e, "Failed to begin database transaction");
            AppError::Database(e)
        })?;
        Ok(Self { transaction })
    }

    pub async fn commit(self) -> Result<(), AppError> {
        self.transaction.commit().await.map_err(|e| {
            tracing::error!(error = %e, "Failed to commit database transaction");
            AppError::Database(e)
        })
    }

    pub async fn rollback(self) -> Result<(), AppError> {
        self.transaction.rollback().await.map_err(|e| {
            tracing::error!(error = %e, "Failed to rollback database transaction");
            AppError::Database(e)
        })
    }
}

impl Deref for TransactionGuard {
    type Target = Transaction<'static, Sqlite>;

    fn deref(&self) -> &Self::Target {
        &self.transaction
    }
}

impl DerefMut for TransactionGuard {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.transaction
    }
}
