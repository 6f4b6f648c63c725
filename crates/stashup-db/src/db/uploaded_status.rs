use async_trait::async_trait;
use chrono::Utc;
use sqlx::{Sqlite, SqlitePool};

use stashup_core::models::{NotForUploadStatus, UploadedStatus};
use stashup_core::{AppError, UploadedStatusStore};

/// Integrity audit records, one per uploaded original.
#[derive(Clone)]
pub struct UploadedStatusRepository {
    pool: SqlitePool,
}

impl UploadedStatusRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    #[tracing::instrument(skip(self), fields(db.table = "uploaded_status", db.operation = "select"))]
    pub async fn list_all(&self) -> Result<Vec<UploadedStatus>, AppError> {
        let statuses = sqlx::query_as::<Sqlite, UploadedStatus>(
            "SELECT original_sha1, modified_sha1, integrity_ok, uploaded, last_updated FROM uploaded_status ORDER BY last_updated DESC",
        )
        .fetch_all(&self.pool)
        .await?;
        Ok(statuses)
    }
}

#[async_trait]
impl UploadedStatusStore for UploadedStatusRepository {
    #[tracing::instrument(skip(self, status), fields(db.table = "uploaded_status", db.operation = "insert", db.record_id = %status.original_sha1))]
    async fn insert_uploaded(&self, status: &UploadedStatus) -> Result<bool, AppError> {
        let result = sqlx::query(
            r#"
            INSERT OR IGNORE INTO uploaded_status
                (original_sha1, modified_sha1, integrity_ok, uploaded, last_updated)
            VALUES (?, ?, ?, ?, ?)
            "#,
        )
        .bind(&status.original_sha1)
        .bind(&status.modified_sha1)
        .bind(status.integrity_ok)
        .bind(status.uploaded)
        .bind(status.last_updated)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    #[tracing::instrument(skip(self), fields(db.table = "uploaded_status", db.operation = "select"))]
    async fn get(&self, original_sha1: &str) -> Result<Option<UploadedStatus>, AppError> {
        let status = sqlx::query_as::<Sqlite, UploadedStatus>(
            "SELECT original_sha1, modified_sha1, integrity_ok, uploaded, last_updated FROM uploaded_status WHERE original_sha1 = ?",
        )
        .bind(original_sha1)
        .fetch_optional(&self.pool)
        .await?;
        Ok(status)
    }
}

/// Images the user excluded from uploading.
#[derive(Clone)]
pub struct NotForUploadRepository {
    pool: SqlitePool,
}

impl NotForUploadRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Marks an image hash. Marking twice keeps the first timestamp.
    #[tracing::instrument(skip(self), fields(db.table = "not_for_upload_status", db.operation = "insert"))]
    pub async fn mark(&self, image_sha1: &str) -> Result<NotForUploadStatus, AppError> {
        if image_sha1.trim().is_empty() {
            return Err(AppError::InvalidInput(
                "Image hash cannot be empty".to_string(),
            ));
        }

        sqlx::query(
            "INSERT OR IGNORE INTO not_for_upload_status (image_sha1, marked_at) VALUES (?, ?)",
        )
        .bind(image_sha1)
        .bind(Utc::now())
        .execute(&self.pool)
        .await?;

        let status = sqlx::query_as::<Sqlite, NotForUploadStatus>(
            "SELECT image_sha1, marked_at FROM not_for_upload_status WHERE image_sha1 = ?",
        )
        .bind(image_sha1)
        .fetch_one(&self.pool)
        .await?;
        Ok(status)
    }

    #[tracing::instrument(skip(self), fields(db.table = "not_for_upload_status", db.operation = "select"))]
    pub async fn list_all(&self) -> Result<Vec<NotForUploadStatus>, AppError> {
        let marks = sqlx::query_as::<Sqlite, NotForUploadStatus>(
            "SELECT image_sha1, marked_at FROM not_for_upload_status ORDER BY marked_at DESC",
        )
        .fetch_all(&self.pool)
        .await?;
        Ok(marks)
    }
}
