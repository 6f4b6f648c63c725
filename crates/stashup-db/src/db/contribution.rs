use async_trait::async_trait;
use chrono::Utc;
use sqlx::{Sqlite, SqlitePool};

use stashup_core::models::{Contribution, ContributionState};
use stashup_core::{AppError, ContributionStore};

use super::transaction::TransactionGuard;

const CONTRIBUTION_COLUMNS: &str = r#"
    page_id, filename, display_title, local_path, content_uri, state, transferred,
    chunk_info, place, wikitext, captions, depictions, error_info, image_sha1,
    canonical, date_created, date_upload_started, date_modified
"#;

fn to_json<T: serde::Serialize>(value: &T) -> Result<String, AppError> {
    Ok(serde_json::to_string(value)?)
}

fn to_json_opt<T: serde::Serialize>(value: Option<&T>) -> Result<Option<String>, AppError> {
    value.map(to_json).transpose()
}

#[derive(Clone)]
pub struct ContributionRepository {
    pool: SqlitePool,
}

impl ContributionRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    async fn insert_or_replace<'e, E>(
        executor: E,
        contribution: &Contribution,
    ) -> Result<(), AppError>
    where
        E: sqlx::Executor<'e, Database = Sqlite>,
    {
        let sql = format!(
            "INSERT OR REPLACE INTO contributions ({}) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
            CONTRIBUTION_COLUMNS
        );
        sqlx::query(&sql)
            .bind(&contribution.page_id)
            .bind(&contribution.filename)
            .bind(&contribution.display_title)
            .bind(&contribution.local_path)
            .bind(&contribution.content_uri)
            .bind(contribution.state.as_str())
            .bind(contribution.transferred)
            .bind(to_json_opt(contribution.chunk_info.as_ref())?)
            .bind(to_json_opt(contribution.place.as_ref())?)
            .bind(&contribution.wikitext)
            .bind(to_json(&contribution.captions)?)
            .bind(to_json(&contribution.depictions)?)
            .bind(&contribution.error_info)
            .bind(&contribution.image_sha1)
            .bind(to_json_opt(contribution.canonical.as_ref())?)
            .bind(contribution.date_created)
            .bind(contribution.date_upload_started)
            .bind(contribution.date_modified)
            .execute(executor)
            .await?;
        Ok(())
    }

    /// Puts a Failed or Paused contribution back in the queue. Returns false when
    /// the record is missing or in another state.
    #[tracing::instrument(skip(self), fields(db.table = "contributions", db.operation = "update"))]
    pub async fn requeue(&self, page_id: &str) -> Result<bool, AppError> {
        let result = sqlx::query(
            r#"
            UPDATE contributions
            SET state = 'queued',
                error_info = NULL,
                date_modified = ?
            WHERE page_id = ?
                AND state IN ('failed', 'paused')
            "#,
        )
        .bind(Utc::now())
        .bind(page_id)
        .execute(&self.pool)
        .await?;

        let requeued = result.rows_affected() > 0;
        if requeued {
            tracing::info!(page_id = %page_id, "Contribution re-queued");
        }
        Ok(requeued)
    }

    /// Puts a contribution left InProgress by an aborted drain back in the queue,
    /// dropping its chunk checkpoint. Only safe while no drain is running against
    /// this database.
    #[tracing::instrument(skip(self), fields(db.table = "contributions", db.operation = "update"))]
    pub async fn requeue_in_progress(&self, page_id: &str) -> Result<bool, AppError> {
        let result = sqlx::query(
            r#"
            UPDATE contributions
            SET state = 'queued',
                transferred = 0,
                chunk_info = NULL,
                error_info = NULL,
                date_modified = ?
            WHERE page_id = ?
                AND state = 'in_progress'
            "#,
        )
        .bind(Utc::now())
        .bind(page_id)
        .execute(&self.pool)
        .await?;

        let requeued = result.rows_affected() > 0;
        if requeued {
            tracing::warn!(page_id = %page_id, "In-progress contribution forced back to the queue");
        }
        Ok(requeued)
    }

    /// Re-queues every Failed contribution. Returns the number moved.
    #[tracing::instrument(skip(self), fields(db.table = "contributions", db.operation = "update"))]
    pub async fn requeue_all_failed(&self) -> Result<u64, AppError> {
        let result = sqlx::query(
            r#"
            UPDATE contributions
            SET state = 'queued',
                error_info = NULL,
                date_modified = ?
            WHERE state = 'failed'
            "#,
        )
        .bind(Utc::now())
        .execute(&self.pool)
        .await?;

        let count = result.rows_affected();
        if count > 0 {
            tracing::info!(count = count, "Failed contributions re-queued");
        }
        Ok(count)
    }

    /// Every contribution, newest first.
    #[tracing::instrument(skip(self), fields(db.table = "contributions", db.operation = "select"))]
    pub async fn list_all(&self) -> Result<Vec<Contribution>, AppError> {
        let sql = format!(
            "SELECT {} FROM contributions ORDER BY date_created DESC, page_id ASC",
            CONTRIBUTION_COLUMNS
        );
        let contributions = sqlx::query_as::<Sqlite, Contribution>(&sql)
            .fetch_all(&self.pool)
            .await?;
        Ok(contributions)
    }
}

#[async_trait]
impl ContributionStore for ContributionRepository {
    #[tracing::instrument(skip(self), fields(db.table = "contributions", db.operation = "select"))]
    async fn list_by_state(
        &self,
        states: &[ContributionState],
    ) -> Result<Vec<Contribution>, AppError> {
        if states.is_empty() {
            return Ok(Vec::new());
        }

        let placeholders = vec!["?"; states.len()].join(", ");
        let sql = format!(
            r#"
            SELECT {}
            FROM contributions
            WHERE state IN ({})
            ORDER BY COALESCE(date_upload_started, date_created) ASC, page_id ASC
            "#,
            CONTRIBUTION_COLUMNS, placeholders
        );

        let mut query = sqlx::query_as::<Sqlite, Contribution>(&sql);
        for state in states {
            query = query.bind(state.as_str());
        }
        let contributions = query.fetch_all(&self.pool).await?;
        Ok(contributions)
    }

    #[tracing::instrument(skip(self), fields(db.table = "contributions", db.operation = "select", db.record_id = %page_id))]
    async fn get(&self, page_id: &str) -> Result<Option<Contribution>, AppError> {
        let sql = format!(
            "SELECT {} FROM contributions WHERE page_id = ?",
            CONTRIBUTION_COLUMNS
        );
        let contribution = sqlx::query_as::<Sqlite, Contribution>(&sql)
            .bind(page_id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(contribution)
    }

    #[tracing::instrument(skip(self, contribution), fields(db.table = "contributions", db.operation = "upsert", db.record_id = %contribution.page_id))]
    async fn save(&self, contribution: &Contribution) -> Result<(), AppError> {
        Self::insert_or_replace(&self.pool, contribution).await
    }

    #[tracing::instrument(skip(self, old, new), fields(db.table = "contributions", db.operation = "replace", db.record_id = %old.page_id))]
    async fn delete_and_insert(
        &self,
        old: &Contribution,
        new: &Contribution,
    ) -> Result<(), AppError> {
        let mut tx = TransactionGuard::begin(&self.pool).await?;

        sqlx::query("DELETE FROM contributions WHERE page_id = ?")
            .bind(&old.page_id)
            .execute(&mut **tx)
            .await?;

        if let Err(e) = Self::insert_or_replace(&mut **tx, new).await {
            tx.rollback().await?;
            return Err(e);
        }

        tx.commit().await
    }

    #[tracing::instrument(skip(self), fields(db.table = "contributions", db.operation = "delete", db.record_id = %page_id))]
    async fn delete(&self, page_id: &str) -> Result<bool, AppError> {
        let result = sqlx::query("DELETE FROM contributions WHERE page_id = ?")
            .bind(page_id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    #[tracing::instrument(skip(self), fields(db.table = "contributions", db.operation = "update"))]
    async fn recover_stale(&self, grace: chrono::Duration) -> Result<u64, AppError> {
        let now = Utc::now();
        let cutoff = now - grace;
        let result = sqlx::query(
            r#"
            UPDATE contributions
            SET state = 'paused',
                date_modified = ?
            WHERE state = 'in_progress'
                AND date_modified < ?
            "#,
        )
        .bind(now)
        .bind(cutoff)
        .execute(&self.pool)
        .await?;

        let count = result.rows_affected();
        if count > 0 {
            tracing::warn!(
                count = count,
                grace_secs = grace.num_seconds(),
                "Recovered stale in-progress contributions"
            );
        }
        Ok(count)
    }
}
