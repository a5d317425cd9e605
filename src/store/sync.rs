use chrono::{DateTime, Utc};
use sqlx::PgPool;

/// Per-source checkpoint used to skip recently-synced scopes and resume
/// pagination.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct SyncProgressRow {
    pub source: String,
    pub scope_key: String,
    pub last_synced_at: DateTime<Utc>,
    pub last_cursor: Option<String>,
}

pub async fn get(
    db: &PgPool,
    source: &str,
    scope_key: &str,
) -> Result<Option<SyncProgressRow>, sqlx::Error> {
    sqlx::query_as(
        r#"
        SELECT source, scope_key, last_synced_at, last_cursor
        FROM sync_progress
        WHERE source = $1 AND scope_key = $2
        "#,
    )
    .bind(source)
    .bind(scope_key)
    .fetch_optional(db)
    .await
}

/// `last_synced_at` only advances; a replayed older checkpoint cannot move
/// the watermark backwards.
pub async fn advance(
    db: &PgPool,
    source: &str,
    scope_key: &str,
    synced_at: DateTime<Utc>,
    cursor: Option<&str>,
) -> Result<(), sqlx::Error> {
    sqlx::query(
        r#"
        INSERT INTO sync_progress (source, scope_key, last_synced_at, last_cursor)
        VALUES ($1, $2, $3, $4)
        ON CONFLICT (source, scope_key)
        DO UPDATE SET
            last_synced_at = GREATEST(sync_progress.last_synced_at, EXCLUDED.last_synced_at),
            last_cursor = EXCLUDED.last_cursor
        "#,
    )
    .bind(source)
    .bind(scope_key)
    .bind(synced_at)
    .bind(cursor)
    .execute(db)
    .await?;
    Ok(())
}
