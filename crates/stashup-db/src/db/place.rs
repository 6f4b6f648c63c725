use async_trait::async_trait;
use sqlx::{Sqlite, SqlitePool};

use stashup_core::models::Place;
use stashup_core::{AppError, PlaceStore};

/// Local cache of structured-data places.
#[derive(Clone)]
pub struct PlaceRepository {
    pool: SqlitePool,
}

impl PlaceRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl PlaceStore for PlaceRepository {
    #[tracing::instrument(skip(self), fields(db.table = "places", db.operation = "select", db.record_id = %entity_id))]
    async fn fetch(&self, entity_id: &str) -> Result<Option<Place>, AppError> {
        let place = sqlx::query_as::<Sqlite, Place>(
            "SELECT entity_id, name, pic, updated_at FROM places WHERE entity_id = ?",
        )
        .bind(entity_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(place)
    }

    #[tracing::instrument(skip(self, place), fields(db.table = "places", db.operation = "upsert", db.record_id = %place.entity_id))]
    async fn save(&self, place: &Place) -> Result<(), AppError> {
        sqlx::query(
            r#"
            INSERT INTO places (entity_id, name, pic, updated_at)
            VALUES (?, ?, ?, ?)
            ON CONFLICT(entity_id) DO UPDATE SET
                name = excluded.name,
                pic = excluded.pic,
                updated_at = excluded.updated_at
            "#,
        )
        .bind(&place.entity_id)
        .bind(&place.name)
        .bind(&place.pic)
        .bind(place.updated_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}
