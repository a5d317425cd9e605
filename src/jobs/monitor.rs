use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use sqlx::PgPool;
use uuid::Uuid;

use crate::store::jobs as jobs_store;
use crate::store::jobs::JobRunRow;

pub const KIND_INGESTION: &str = "ingestion";
pub const KIND_WEATHER: &str = "weather";
pub const KIND_MAINTENANCE: &str = "maintenance";

/// Records job lifecycle in the store. At-most-one-running per name is the
/// scheduler's job, not the monitor's; the monitor only refuses writes to
/// terminal rows.
#[derive(Clone)]
pub struct JobMonitor {
    db: PgPool,
}

#[derive(Debug, Clone, Serialize, utoipa::ToSchema)]
pub struct JobRunPublic {
    pub id: Uuid,
    pub job_name: String,
    pub job_kind: String,
    pub status: String,
    pub total_items: i64,
    pub processed: i64,
    pub succeeded: i64,
    pub failed: i64,
    pub started_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub metadata: crate::json::JsonValue,
    pub elapsed_seconds: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub progress_percent: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub items_per_second: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub estimated_remaining_seconds: Option<f64>,
}

impl JobMonitor {
    pub fn new(db: PgPool) -> Self {
        Self { db }
    }

    pub async fn start_job(
        &self,
        job_name: &str,
        job_kind: &str,
        total_items: i64,
        metadata: serde_json::Value,
    ) -> Result<JobRunRow, sqlx::Error> {
        let row = jobs_store::insert_running(&self.db, job_name, job_kind, total_items, metadata).await?;
        tracing::info!(job = job_name, run_id = %row.id, total_items, "job started");
        Ok(row)
    }

    /// Idempotent counter write; callers should batch (per remote page, not
    /// per item) to bound write rate.
    pub async fn update_progress(
        &self,
        id: Uuid,
        processed: i64,
        succeeded: i64,
        failed: i64,
    ) -> Result<(), sqlx::Error> {
        jobs_store::update_progress(&self.db, id, processed, succeeded, failed).await
    }

    pub async fn set_total_items(&self, id: Uuid, total_items: i64) -> Result<(), sqlx::Error> {
        jobs_store::set_total_items(&self.db, id, total_items).await
    }

    pub async fn complete_job(&self, id: Uuid) -> Result<(), sqlx::Error> {
        tracing::info!(run_id = %id, "job completed");
        jobs_store::mark_completed(&self.db, id).await
    }

    pub async fn fail_job(&self, id: Uuid, error: &str) -> Result<(), sqlx::Error> {
        tracing::warn!(run_id = %id, error, "job failed");
        jobs_store::mark_failed(&self.db, id, error).await
    }

    pub async fn was_job_completed_recently(
        &self,
        job_name: &str,
        threshold: Duration,
    ) -> Result<bool, sqlx::Error> {
        jobs_store::was_completed_recently(&self.db, job_name, threshold).await
    }

    pub async fn get(&self, id: Uuid) -> Result<Option<JobRunPublic>, sqlx::Error> {
        let now = Utc::now();
        Ok(jobs_store::get(&self.db, id).await?.map(|row| to_public(&row, now)))
    }

    pub async fn active_jobs(&self) -> Result<Vec<JobRunPublic>, sqlx::Error> {
        let now = Utc::now();
        Ok(jobs_store::active(&self.db)
            .await?
            .iter()
            .map(|row| to_public(row, now))
            .collect())
    }

    pub async fn recent_history(
        &self,
        job_name: Option<&str>,
        limit: i64,
    ) -> Result<Vec<JobRunPublic>, sqlx::Error> {
        let now = Utc::now();
        Ok(jobs_store::history(&self.db, job_name, limit)
            .await?
            .iter()
            .map(|row| to_public(row, now))
            .collect())
    }

    pub async fn latest_per_name(&self) -> Result<Vec<JobRunPublic>, sqlx::Error> {
        let now = Utc::now();
        Ok(jobs_store::latest_per_name(&self.db)
            .await?
            .iter()
            .map(|row| to_public(row, now))
            .collect())
    }
}

/// Derive rate and remaining-time estimates. Rates are undefined until some
/// work is recorded; the ETA is undefined once processed reaches the total.
pub fn to_public(row: &JobRunRow, now: DateTime<Utc>) -> JobRunPublic {
    let reference = row.completed_at.unwrap_or(now);
    let elapsed_seconds = ((reference - row.started_at).num_milliseconds() as f64 / 1000.0).max(0.0);

    let items_per_second = if row.processed > 0 && elapsed_seconds > 0.0 {
        Some(row.processed as f64 / elapsed_seconds)
    } else {
        None
    };

    let progress_percent = if row.total_items > 0 {
        Some((row.processed as f64 / row.total_items as f64 * 100.0).min(100.0))
    } else {
        None
    };

    let estimated_remaining_seconds = match items_per_second {
        Some(rate) if rate > 0.0 && row.total_items > 0 && row.processed < row.total_items => {
            Some((row.total_items - row.processed) as f64 / rate)
        }
        Some(_) if row.total_items > 0 && row.processed >= row.total_items => Some(0.0),
        _ => None,
    };

    JobRunPublic {
        id: row.id,
        job_name: row.job_name.clone(),
        job_kind: row.job_kind.clone(),
        status: row.status.clone(),
        total_items: row.total_items,
        processed: row.processed,
        succeeded: row.succeeded,
        failed: row.failed,
        started_at: row.started_at,
        completed_at: row.completed_at,
        error: row.error.clone(),
        metadata: row.metadata.0.clone().into(),
        elapsed_seconds,
        progress_percent,
        items_per_second,
        estimated_remaining_seconds,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sqlx::types::Json as SqlJson;

    fn run_row(
        total: i64,
        processed: i64,
        started_secs_ago: i64,
        completed: bool,
    ) -> JobRunRow {
        let now = Utc::now();
        JobRunRow {
            id: Uuid::new_v4(),
            job_name: "ascent_sync_high".to_string(),
            job_kind: KIND_INGESTION.to_string(),
            status: if completed {
                jobs_store::JOB_STATUS_COMPLETED.to_string()
            } else {
                jobs_store::JOB_STATUS_RUNNING.to_string()
            },
            total_items: total,
            processed,
            succeeded: processed,
            failed: 0,
            started_at: now - Duration::seconds(started_secs_ago),
            completed_at: completed.then_some(now),
            error: None,
            metadata: SqlJson(serde_json::json!({})),
        }
    }

    #[test]
    fn finished_run_reports_rate_and_zero_eta() {
        let row = run_row(100, 100, 50, true);
        let public = to_public(&row, Utc::now());
        assert!(public.items_per_second.unwrap() > 0.0);
        assert_eq!(public.estimated_remaining_seconds, Some(0.0));
        assert_eq!(public.progress_percent, Some(100.0));
    }

    #[test]
    fn unknown_total_leaves_progress_undefined() {
        let row = run_row(0, 40, 20, false);
        let public = to_public(&row, Utc::now());
        assert_eq!(public.progress_percent, None);
        assert_eq!(public.estimated_remaining_seconds, None);
        assert!(public.items_per_second.unwrap() > 0.0);
    }

    #[test]
    fn zero_elapsed_guards_against_division() {
        let mut row = run_row(10, 5, 0, false);
        row.started_at = Utc::now() + Duration::seconds(5);
        let public = to_public(&row, Utc::now());
        assert_eq!(public.elapsed_seconds, 0.0);
        assert_eq!(public.items_per_second, None);
    }

    #[test]
    fn midway_run_estimates_remaining_time() {
        let row = run_row(200, 100, 100, false);
        let public = to_public(&row, Utc::now());
        let rate = public.items_per_second.unwrap();
        assert!((rate - 1.0).abs() < 0.1);
        let eta = public.estimated_remaining_seconds.unwrap();
        assert!((eta - 100.0).abs() < 10.0);
    }
}
