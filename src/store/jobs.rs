use chrono::{DateTime, Duration, Utc};
use sqlx::types::Json as SqlJson;
use sqlx::PgPool;
use uuid::Uuid;

pub const JOB_STATUS_RUNNING: &str = "running";
pub const JOB_STATUS_COMPLETED: &str = "completed";
pub const JOB_STATUS_FAILED: &str = "failed";

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct JobRunRow {
    pub id: Uuid,
    pub job_name: String,
    pub job_kind: String,
    pub status: String,
    pub total_items: i64,
    pub processed: i64,
    pub succeeded: i64,
    pub failed: i64,
    pub started_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
    pub error: Option<String>,
    pub metadata: SqlJson<serde_json::Value>,
}

const COLUMNS: &str = "id, job_name, job_kind, status, total_items, processed, succeeded, \
                       failed, started_at, completed_at, error, metadata";

pub async fn insert_running(
    db: &PgPool,
    job_name: &str,
    job_kind: &str,
    total_items: i64,
    metadata: serde_json::Value,
) -> Result<JobRunRow, sqlx::Error> {
    sqlx::query_as(&format!(
        r#"
        INSERT INTO job_runs (
            id, job_name, job_kind, status, total_items, processed, succeeded,
            failed, started_at, metadata
        )
        VALUES (gen_random_uuid(), $1, $2, '{JOB_STATUS_RUNNING}', $3, 0, 0, 0, now(), $4)
        RETURNING {COLUMNS}
        "#
    ))
    .bind(job_name)
    .bind(job_kind)
    .bind(total_items)
    .bind(SqlJson(metadata))
    .fetch_one(db)
    .await
}

/// Counter writes only land on a still-running row; terminal states are
/// immutable.
pub async fn update_progress(
    db: &PgPool,
    id: Uuid,
    processed: i64,
    succeeded: i64,
    failed: i64,
) -> Result<(), sqlx::Error> {
    sqlx::query(&format!(
        r#"
        UPDATE job_runs
        SET processed = $2, succeeded = $3, failed = $4
        WHERE id = $1 AND status = '{JOB_STATUS_RUNNING}'
        "#
    ))
    .bind(id)
    .bind(processed)
    .bind(succeeded)
    .bind(failed)
    .execute(db)
    .await?;
    Ok(())
}

pub async fn set_total_items(db: &PgPool, id: Uuid, total_items: i64) -> Result<(), sqlx::Error> {
    sqlx::query(&format!(
        r#"
        UPDATE job_runs
        SET total_items = $2
        WHERE id = $1 AND status = '{JOB_STATUS_RUNNING}'
        "#
    ))
    .bind(id)
    .bind(total_items)
    .execute(db)
    .await?;
    Ok(())
}

pub async fn mark_completed(db: &PgPool, id: Uuid) -> Result<(), sqlx::Error> {
    sqlx::query(&format!(
        r#"
        UPDATE job_runs
        SET status = '{JOB_STATUS_COMPLETED}', completed_at = now()
        WHERE id = $1 AND status = '{JOB_STATUS_RUNNING}'
        "#
    ))
    .bind(id)
    .execute(db)
    .await?;
    Ok(())
}

pub async fn mark_failed(db: &PgPool, id: Uuid, error: &str) -> Result<(), sqlx::Error> {
    sqlx::query(&format!(
        r#"
        UPDATE job_runs
        SET status = '{JOB_STATUS_FAILED}', completed_at = now(), error = $2
        WHERE id = $1 AND status = '{JOB_STATUS_RUNNING}'
        "#
    ))
    .bind(id)
    .bind(error)
    .execute(db)
    .await?;
    Ok(())
}

pub async fn was_completed_recently(
    db: &PgPool,
    job_name: &str,
    threshold: Duration,
) -> Result<bool, sqlx::Error> {
    let row: (bool,) = sqlx::query_as(&format!(
        r#"
        SELECT EXISTS (
            SELECT 1 FROM job_runs
            WHERE job_name = $1
              AND status = '{JOB_STATUS_COMPLETED}'
              AND completed_at >= now() - make_interval(secs => $2)
        )
        "#
    ))
    .bind(job_name)
    .bind(threshold.num_seconds() as f64)
    .fetch_one(db)
    .await?;
    Ok(row.0)
}

pub async fn get(db: &PgPool, id: Uuid) -> Result<Option<JobRunRow>, sqlx::Error> {
    sqlx::query_as(&format!("SELECT {COLUMNS} FROM job_runs WHERE id = $1"))
        .bind(id)
        .fetch_optional(db)
        .await
}

pub async fn active(db: &PgPool) -> Result<Vec<JobRunRow>, sqlx::Error> {
    sqlx::query_as(&format!(
        "SELECT {COLUMNS} FROM job_runs
         WHERE status = '{JOB_STATUS_RUNNING}'
         ORDER BY started_at DESC"
    ))
    .fetch_all(db)
    .await
}

pub async fn history(
    db: &PgPool,
    job_name: Option<&str>,
    limit: i64,
) -> Result<Vec<JobRunRow>, sqlx::Error> {
    sqlx::query_as(&format!(
        r#"
        SELECT {COLUMNS} FROM job_runs
        WHERE ($1::text IS NULL OR job_name = $1)
        ORDER BY started_at DESC
        LIMIT $2
        "#
    ))
    .bind(job_name)
    .bind(limit)
    .fetch_all(db)
    .await
}

/// Most recent run per job name, for the monitoring summary.
pub async fn latest_per_name(db: &PgPool) -> Result<Vec<JobRunRow>, sqlx::Error> {
    sqlx::query_as(&format!(
        r#"
        SELECT DISTINCT ON (job_name) {COLUMNS}
        FROM job_runs
        ORDER BY job_name, started_at DESC
        "#
    ))
    .fetch_all(db)
    .await
}
