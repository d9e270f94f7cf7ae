//! Database schema initialization

use sqlx::SqlitePool;

use crate::error::Result;

/// Initialize the database schema
pub async fn initialize_schema(pool: &SqlitePool) -> Result<()> {
    sqlx::query(SCHEMA_SQL).execute(pool).await?;

    Ok(())
}

const SCHEMA_SQL: &str = r#"
-- Photo metadata index (one live batch per subject/location)
CREATE TABLE IF NOT EXISTS photos (
    id TEXT PRIMARY KEY,
    subject_id TEXT NOT NULL,
    -- Canonical label: 'front-wall', 'damage@Front Wall', ...
    location TEXT NOT NULL,
    batch_id TEXT NOT NULL,
    -- Position within the batch, 0-indexed
    sequence INTEGER NOT NULL,
    blob_key TEXT NOT NULL,
    url TEXT NOT NULL,
    byte_size INTEGER NOT NULL,
    content_type TEXT NOT NULL,
    content_hash TEXT NOT NULL,
    -- Operator-confirmed identifiers (JSON object)
    metadata TEXT NOT NULL DEFAULT '{}',
    created_at TEXT NOT NULL,

    UNIQUE(subject_id, location, sequence)
);

CREATE INDEX IF NOT EXISTS idx_photos_subject ON photos(subject_id);
CREATE INDEX IF NOT EXISTS idx_photos_subject_location ON photos(subject_id, location);
CREATE INDEX IF NOT EXISTS idx_photos_batch ON photos(batch_id);
"#;
