//! Photo index database operations

use serde::{Deserialize, Serialize};
use sqlx::SqlitePool;

/// Photo index row
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
pub struct PhotoRow {
    pub id: String,
    pub subject_id: String,
    pub location: String,
    pub batch_id: String,
    pub sequence: i64,
    pub blob_key: String,
    pub url: String,
    pub byte_size: i64,
    pub content_type: String,
    pub content_hash: String,
    pub metadata: String,
    pub created_at: String,
}

/// Photo index repository
pub struct PhotoRepository<'a> {
    pool: &'a SqlitePool,
}

impl<'a> PhotoRepository<'a> {
    pub fn new(pool: &'a SqlitePool) -> Self {
        Self { pool }
    }

    /// List the current batch at a location
    pub async fn list_for_location(
        &self,
        subject_id: &str,
        location: &str,
    ) -> sqlx::Result<Vec<PhotoRow>> {
        sqlx::query_as::<_, PhotoRow>(
            r#"
            SELECT id, subject_id, location, batch_id, sequence, blob_key, url,
                   byte_size, content_type, content_hash, metadata, created_at
            FROM photos
            WHERE subject_id = ? AND location = ?
            ORDER BY sequence ASC
            "#,
        )
        .bind(subject_id)
        .bind(location)
        .fetch_all(self.pool)
        .await
    }

    /// List every photo of a subject
    pub async fn list_for_subject(&self, subject_id: &str) -> sqlx::Result<Vec<PhotoRow>> {
        sqlx::query_as::<_, PhotoRow>(
            r#"
            SELECT id, subject_id, location, batch_id, sequence, blob_key, url,
                   byte_size, content_type, content_hash, metadata, created_at
            FROM photos
            WHERE subject_id = ?
            ORDER BY location ASC, sequence ASC
            "#,
        )
        .bind(subject_id)
        .fetch_all(self.pool)
        .await
    }

    /// Get one photo of a location's batch
    pub async fn get(
        &self,
        subject_id: &str,
        location: &str,
        sequence: i64,
    ) -> sqlx::Result<Option<PhotoRow>> {
        sqlx::query_as::<_, PhotoRow>(
            r#"
            SELECT id, subject_id, location, batch_id, sequence, blob_key, url,
                   byte_size, content_type, content_hash, metadata, created_at
            FROM photos
            WHERE subject_id = ? AND location = ? AND sequence = ?
            "#,
        )
        .bind(subject_id)
        .bind(location)
        .bind(sequence)
        .fetch_optional(self.pool)
        .await
    }

    /// Remove every index entry at a location
    pub async fn delete_for_location(&self, subject_id: &str, location: &str) -> sqlx::Result<u64> {
        let result = sqlx::query("DELETE FROM photos WHERE subject_id = ? AND location = ?")
            .bind(subject_id)
            .bind(location)
            .execute(self.pool)
            .await?;

        Ok(result.rows_affected())
    }

    /// Insert a whole batch atomically
    pub async fn insert_batch(&self, rows: &[PhotoRow]) -> sqlx::Result<()> {
        let mut tx = self.pool.begin().await?;

        for row in rows {
            sqlx::query(
                r#"
                INSERT INTO photos (id, subject_id, location, batch_id, sequence, blob_key, url,
                                    byte_size, content_type, content_hash, metadata, created_at)
                VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
                "#,
            )
            .bind(&row.id)
            .bind(&row.subject_id)
            .bind(&row.location)
            .bind(&row.batch_id)
            .bind(row.sequence)
            .bind(&row.blob_key)
            .bind(&row.url)
            .bind(row.byte_size)
            .bind(&row.content_type)
            .bind(&row.content_hash)
            .bind(&row.metadata)
            .bind(&row.created_at)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await
    }

    /// Count photos at a location
    pub async fn count_for_location(&self, subject_id: &str, location: &str) -> sqlx::Result<i64> {
        let result: (i64,) =
            sqlx::query_as("SELECT COUNT(*) FROM photos WHERE subject_id = ? AND location = ?")
                .bind(subject_id)
                .bind(location)
                .fetch_one(self.pool)
                .await?;

        Ok(result.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::memory_pool;

    fn row(subject: &str, location: &str, batch: &str, sequence: i64) -> PhotoRow {
        PhotoRow {
            id: format!("{}-{}-{}", subject, batch, sequence),
            subject_id: subject.to_string(),
            location: location.to_string(),
            batch_id: batch.to_string(),
            sequence,
            blob_key: format!("photos/{}/{}/{}.jpg", subject, location, sequence),
            url: String::new(),
            byte_size: 3,
            content_type: "image/jpeg".to_string(),
            content_hash: "abc".to_string(),
            metadata: "{}".to_string(),
            created_at: "2026-01-01T00:00:00Z".to_string(),
        }
    }

    #[tokio::test]
    async fn test_insert_and_list() {
        let pool = memory_pool().await;
        let repo = PhotoRepository::new(&pool);

        repo.insert_batch(&[row("TS1", "front-wall", "b1", 0)])
            .await
            .unwrap();
        repo.insert_batch(&[
            row("TS1", "damage@Roof", "b2", 1),
            row("TS1", "damage@Roof", "b2", 0),
        ])
        .await
        .unwrap();

        let roof = repo.list_for_location("TS1", "damage@Roof").await.unwrap();
        assert_eq!(roof.len(), 2);
        assert_eq!(roof[0].sequence, 0);

        assert_eq!(repo.list_for_subject("TS1").await.unwrap().len(), 3);
        assert!(repo.list_for_subject("TS2").await.unwrap().is_empty());

        let found = repo.get("TS1", "damage@Roof", 1).await.unwrap();
        assert_eq!(found.map(|r| r.batch_id), Some("b2".to_string()));
    }

    #[tokio::test]
    async fn test_delete_for_location() {
        let pool = memory_pool().await;
        let repo = PhotoRepository::new(&pool);

        repo.insert_batch(&[row("TS1", "front-wall", "b1", 0), row("TS1", "driver", "b2", 0)])
            .await
            .unwrap();

        assert_eq!(repo.delete_for_location("TS1", "front-wall").await.unwrap(), 1);
        assert_eq!(repo.count_for_location("TS1", "front-wall").await.unwrap(), 0);
        assert_eq!(repo.count_for_location("TS1", "driver").await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_batch_insert_is_atomic() {
        let pool = memory_pool().await;
        let repo = PhotoRepository::new(&pool);

        // Duplicate sequence violates the unique constraint
        let result = repo
            .insert_batch(&[row("TS1", "damage@Roof", "b1", 0), row("TS1", "damage@Roof", "b1x", 0)])
            .await;

        assert!(result.is_err());
        assert_eq!(repo.count_for_location("TS1", "damage@Roof").await.unwrap(), 0);
    }
}
