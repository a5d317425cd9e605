use axum::routing::get;
use axum::{Json, Router};
use chrono::{DateTime, Utc};

use crate::state::AppState;

#[derive(Debug, Clone, serde::Serialize, utoipa::ToSchema)]
pub struct HealthResponse {
    pub status: String,
    pub time: DateTime<Utc>,
}

#[utoipa::path(
    get,
    path = "/api/health",
    tag = "health",
    responses((status = 200, description = "OK", body = HealthResponse))
)]
pub(crate) async fn health_handler() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        time: Utc::now(),
    })
}

pub fn router() -> Router<AppState> {
    Router::new().route("/health", get(health_handler))
}
