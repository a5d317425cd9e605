use axum::extract::{Path, Query, State};
use axum::routing::get;
use axum::{Json, Router};
use chrono::{DateTime, Utc};
use std::collections::BTreeMap;
use uuid::Uuid;

use crate::error::{AppError, AppResult};
use crate::jobs::monitor::JobRunPublic;
use crate::jobs::scheduler;
use crate::routes::validate_limit;
use crate::state::AppState;

#[derive(Debug, Clone, serde::Serialize, utoipa::ToSchema)]
pub struct JobsResponse {
    pub jobs: Vec<JobRunPublic>,
}

#[derive(Debug, Clone, serde::Serialize, utoipa::ToSchema)]
pub struct JobSummaryEntry {
    pub latest: JobRunPublic,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub next_run_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, serde::Serialize, utoipa::ToSchema)]
pub struct JobSummaryResponse {
    pub summary: BTreeMap<String, JobSummaryEntry>,
}

#[derive(Debug, serde::Deserialize, utoipa::IntoParams)]
pub struct HistoryQuery {
    pub job_name: Option<String>,
    pub limit: Option<i64>,
}

#[utoipa::path(
    get,
    path = "/api/monitoring/jobs/active",
    tag = "monitoring",
    responses((status = 200, description = "Currently running jobs", body = JobsResponse))
)]
pub(crate) async fn active_jobs(State(state): State<AppState>) -> AppResult<Json<JobsResponse>> {
    let jobs = state.monitor.active_jobs().await?;
    Ok(Json(JobsResponse { jobs }))
}

#[utoipa::path(
    get,
    path = "/api/monitoring/jobs/history",
    tag = "monitoring",
    params(HistoryQuery),
    responses((status = 200, description = "Recent job runs, newest first", body = JobsResponse))
)]
pub(crate) async fn job_history(
    State(state): State<AppState>,
    Query(query): Query<HistoryQuery>,
) -> AppResult<Json<JobsResponse>> {
    let limit = validate_limit(query.limit)?;
    let jobs = state
        .monitor
        .recent_history(query.job_name.as_deref(), limit)
        .await?;
    Ok(Json(JobsResponse { jobs }))
}

#[utoipa::path(
    get,
    path = "/api/monitoring/jobs/summary",
    tag = "monitoring",
    responses((status = 200, description = "Latest run and next scheduled fire per job", body = JobSummaryResponse))
)]
pub(crate) async fn job_summary(State(state): State<AppState>) -> AppResult<Json<JobSummaryResponse>> {
    let now = Utc::now();
    let mut summary = BTreeMap::new();
    for latest in state.monitor.latest_per_name().await? {
        let next_run_at = scheduler::cadence_for(&latest.job_name)
            .and_then(|cadence| scheduler::next_occurrence(cadence, now));
        summary.insert(
            latest.job_name.clone(),
            JobSummaryEntry {
                latest,
                next_run_at,
            },
        );
    }
    Ok(Json(JobSummaryResponse { summary }))
}

#[utoipa::path(
    get,
    path = "/api/monitoring/jobs/{id}",
    tag = "monitoring",
    params(("id" = Uuid, Path, description = "Job run id")),
    responses(
        (status = 200, description = "One job run", body = JobRunPublic),
        (status = 404, description = "Unknown job run")
    )
)]
pub(crate) async fn get_job(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> AppResult<Json<JobRunPublic>> {
    let job = state
        .monitor
        .get(id)
        .await?
        .ok_or_else(|| AppError::not_found("job run not found"))?;
    Ok(Json(job))
}

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/monitoring/jobs/active", get(active_jobs))
        .route("/monitoring/jobs/history", get(job_history))
        .route("/monitoring/jobs/summary", get(job_summary))
        .route("/monitoring/jobs/{id}", get(get_job))
}
