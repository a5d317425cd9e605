use axum::extract::{Query, State};
use axum::routing::get;
use axum::{Json, Router};
use chrono::{NaiveDate, Utc};

use crate::error::{AppError, AppResult};
use crate::routes::{validate_bounds, validate_limit};
use crate::state::AppState;
use crate::store::ticks::{self, HeatMapFilter, HeatMapPointRow};
use crate::time;

#[derive(Debug, serde::Deserialize, utoipa::IntoParams)]
pub struct HeatMapQuery {
    pub start_date: String,
    pub end_date: String,
    pub min_lat: Option<f64>,
    pub max_lat: Option<f64>,
    pub min_lon: Option<f64>,
    pub max_lon: Option<f64>,
    pub min_activity: Option<i64>,
    pub limit: Option<i64>,
}

#[derive(Debug, Clone, serde::Serialize, utoipa::ToSchema)]
pub struct HeatMapFilters {
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub min_lat: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_lat: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub min_lon: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_lon: Option<f64>,
    pub min_activity: i64,
    pub limit: i64,
}

#[derive(Debug, Clone, serde::Serialize, utoipa::ToSchema)]
pub struct HeatMapResponse {
    pub points: Vec<HeatMapPointRow>,
    pub count: usize,
    pub filters: HeatMapFilters,
}

#[utoipa::path(
    get,
    path = "/api/heat-map/activity",
    tag = "heat-map",
    params(HeatMapQuery),
    responses(
        (status = 200, description = "Tick activity points for the map", body = HeatMapResponse),
        (status = 400, description = "Invalid dates, bounds, or limit")
    )
)]
pub(crate) async fn activity_heat_map(
    State(state): State<AppState>,
    Query(query): Query<HeatMapQuery>,
) -> AppResult<Json<HeatMapResponse>> {
    let start_date = time::parse_date_param(&query.start_date).map_err(AppError::validation)?;
    let end_date = time::parse_date_param(&query.end_date).map_err(AppError::validation)?;
    if start_date > end_date {
        return Err(AppError::validation("start_date must not be after end_date"));
    }
    let bounds = validate_bounds(query.min_lat, query.max_lat, query.min_lon, query.max_lon)?;
    let limit = validate_limit(query.limit)?;
    let min_activity = query.min_activity.unwrap_or(1);
    if min_activity < 1 {
        return Err(AppError::validation("min_activity must be at least 1"));
    }

    let start = start_date
        .and_hms_opt(0, 0, 0)
        .map(|naive| chrono::DateTime::from_naive_utc_and_offset(naive, Utc))
        .ok_or_else(|| AppError::internal("invalid start instant"))?;
    // End date is inclusive.
    let end = (end_date + chrono::Duration::days(1))
        .and_hms_opt(0, 0, 0)
        .map(|naive| chrono::DateTime::from_naive_utc_and_offset(naive, Utc))
        .ok_or_else(|| AppError::internal("invalid end instant"))?;

    let points = ticks::heat_map_points(
        &state.db,
        &HeatMapFilter {
            start,
            end,
            bounds,
            min_activity,
            limit,
        },
    )
    .await?;

    Ok(Json(HeatMapResponse {
        count: points.len(),
        points,
        filters: HeatMapFilters {
            start_date,
            end_date,
            min_lat: bounds.map(|bounds| bounds.0),
            max_lat: bounds.map(|bounds| bounds.1),
            min_lon: bounds.map(|bounds| bounds.2),
            max_lon: bounds.map(|bounds| bounds.3),
            min_activity,
            limit,
        },
    }))
}

pub fn router() -> Router<AppState> {
    Router::new().route("/heat-map/activity", get(activity_heat_map))
}
