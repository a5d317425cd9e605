use axum::extract::{Path, Query, State};
use axum::routing::get;
use axum::{Json, Router};
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::error::{AppError, AppResult};
use crate::routes::validate_limit;
use crate::state::AppState;
use crate::store::routes::{self, RouteRow, RouteSearchRow};
use crate::store::ticks::{self, AreaActivityRow, RouteActivityRow, TickRow};
use crate::store::{areas, locations};

#[derive(Debug, Clone, serde::Serialize, utoipa::ToSchema)]
pub struct AreaActivitySummary {
    pub area_id: Uuid,
    pub name: String,
    pub route_count: i64,
    pub tick_count: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_climbed_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub days_since_climb: Option<i64>,
}

#[derive(Debug, Clone, serde::Serialize, utoipa::ToSchema)]
pub struct RouteActivitySummary {
    pub route_id: Uuid,
    pub name: String,
    pub grade: Option<String>,
    pub kind: String,
    pub tick_count: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_climbed_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub days_since_climb: Option<i64>,
}

#[derive(Debug, serde::Deserialize, utoipa::IntoParams)]
pub struct LimitQuery {
    pub limit: Option<i64>,
}

#[derive(Debug, serde::Deserialize, utoipa::IntoParams)]
pub struct SearchQuery {
    pub q: String,
    pub limit: Option<i64>,
}

/// Whole days elapsed since the last recorded ascent.
pub(crate) fn days_since_climb(now: DateTime<Utc>, last: Option<DateTime<Utc>>) -> Option<i64> {
    last.map(|last| ((now - last).num_seconds() / 86_400).max(0))
}

fn area_summary(now: DateTime<Utc>, row: AreaActivityRow) -> AreaActivitySummary {
    AreaActivitySummary {
        area_id: row.area_id,
        name: row.area_name,
        route_count: row.route_count,
        tick_count: row.tick_count,
        days_since_climb: days_since_climb(now, row.last_climbed_at),
        last_climbed_at: row.last_climbed_at,
    }
}

fn route_summary(now: DateTime<Utc>, row: RouteActivityRow) -> RouteActivitySummary {
    RouteActivitySummary {
        route_id: row.route_id,
        name: row.route_name,
        grade: row.grade,
        kind: row.kind,
        tick_count: row.tick_count,
        days_since_climb: days_since_climb(now, row.last_climbed_at),
        last_climbed_at: row.last_climbed_at,
    }
}

async fn require_location(state: &AppState, id: Uuid) -> Result<(), AppError> {
    locations::get(&state.db, id)
        .await?
        .map(|_| ())
        .ok_or_else(|| AppError::not_found("location not found"))
}

async fn require_area_in_location(
    state: &AppState,
    location_id: Uuid,
    area_id: Uuid,
) -> Result<(), AppError> {
    let area = areas::get(&state.db, area_id)
        .await?
        .ok_or_else(|| AppError::not_found("area not found"))?;
    if area.location_id != Some(location_id) {
        return Err(AppError::not_found("area is not part of this location"));
    }
    Ok(())
}

#[utoipa::path(
    get,
    path = "/api/climbs/location/{location_id}/areas",
    tag = "climbs",
    params(("location_id" = Uuid, Path, description = "Location id")),
    responses((status = 200, description = "Root areas by recent activity", body = [AreaActivitySummary]))
)]
pub(crate) async fn areas_by_activity(
    State(state): State<AppState>,
    Path(location_id): Path<Uuid>,
) -> AppResult<Json<Vec<AreaActivitySummary>>> {
    require_location(&state, location_id).await?;
    let now = Utc::now();
    let rows = ticks::area_activity(&state.db, location_id, None).await?;
    Ok(Json(rows.into_iter().map(|row| area_summary(now, row)).collect()))
}

#[utoipa::path(
    get,
    path = "/api/climbs/location/{location_id}/areas/{area_id}/subareas",
    tag = "climbs",
    params(
        ("location_id" = Uuid, Path, description = "Location id"),
        ("area_id" = Uuid, Path, description = "Parent area id")
    ),
    responses((status = 200, description = "Child areas by recent activity", body = [AreaActivitySummary]))
)]
pub(crate) async fn subareas_by_activity(
    State(state): State<AppState>,
    Path((location_id, area_id)): Path<(Uuid, Uuid)>,
) -> AppResult<Json<Vec<AreaActivitySummary>>> {
    require_area_in_location(&state, location_id, area_id).await?;
    let now = Utc::now();
    let rows = ticks::area_activity(&state.db, location_id, Some(area_id)).await?;
    Ok(Json(rows.into_iter().map(|row| area_summary(now, row)).collect()))
}

#[utoipa::path(
    get,
    path = "/api/climbs/location/{location_id}/areas/{area_id}/routes",
    tag = "climbs",
    params(
        ("location_id" = Uuid, Path, description = "Location id"),
        ("area_id" = Uuid, Path, description = "Area id"),
        LimitQuery
    ),
    responses((status = 200, description = "Routes under the area by recent activity", body = [RouteActivitySummary]))
)]
pub(crate) async fn routes_by_activity(
    State(state): State<AppState>,
    Path((location_id, area_id)): Path<(Uuid, Uuid)>,
    Query(query): Query<LimitQuery>,
) -> AppResult<Json<Vec<RouteActivitySummary>>> {
    let limit = validate_limit(query.limit)?;
    require_area_in_location(&state, location_id, area_id).await?;
    let now = Utc::now();
    let subtree = areas::subtree_ids(&state.db, area_id).await?;
    let rows = ticks::route_activity(&state.db, &subtree, limit).await?;
    Ok(Json(rows.into_iter().map(|row| route_summary(now, row)).collect()))
}

#[utoipa::path(
    get,
    path = "/api/climbs/routes/{id}",
    tag = "climbs",
    params(("id" = Uuid, Path, description = "Route id")),
    responses(
        (status = 200, description = "Route detail", body = RouteRow),
        (status = 404, description = "Unknown route")
    )
)]
pub(crate) async fn get_route(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> AppResult<Json<RouteRow>> {
    let route = routes::get(&state.db, id)
        .await?
        .ok_or_else(|| AppError::not_found("route not found"))?;
    Ok(Json(route))
}

#[utoipa::path(
    get,
    path = "/api/climbs/routes/{id}/ticks",
    tag = "climbs",
    params(("id" = Uuid, Path, description = "Route id"), LimitQuery),
    responses((status = 200, description = "Recent ticks, newest first", body = [TickRow]))
)]
pub(crate) async fn route_ticks(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Query(query): Query<LimitQuery>,
) -> AppResult<Json<Vec<TickRow>>> {
    let limit = validate_limit(query.limit)?;
    routes::get(&state.db, id)
        .await?
        .ok_or_else(|| AppError::not_found("route not found"))?;
    let rows = ticks::recent_for_route(&state.db, id, limit).await?;
    Ok(Json(rows))
}

#[utoipa::path(
    get,
    path = "/api/climbs/location/{location_id}/search",
    tag = "climbs",
    params(("location_id" = Uuid, Path, description = "Location id"), SearchQuery),
    responses((status = 200, description = "Route name search", body = [RouteSearchRow]))
)]
pub(crate) async fn search_routes(
    State(state): State<AppState>,
    Path(location_id): Path<Uuid>,
    Query(query): Query<SearchQuery>,
) -> AppResult<Json<Vec<RouteSearchRow>>> {
    let limit = validate_limit(query.limit)?;
    let needle = query.q.trim();
    if needle.is_empty() {
        return Err(AppError::validation("q must not be empty"));
    }
    require_location(&state, location_id).await?;
    let rows = routes::search(&state.db, location_id, needle, limit).await?;
    Ok(Json(rows))
}

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/climbs/location/{location_id}/areas", get(areas_by_activity))
        .route(
            "/climbs/location/{location_id}/areas/{area_id}/subareas",
            get(subareas_by_activity),
        )
        .route(
            "/climbs/location/{location_id}/areas/{area_id}/routes",
            get(routes_by_activity),
        )
        .route("/climbs/location/{location_id}/search", get(search_routes))
        .route("/climbs/routes/{id}", get(get_route))
        .route("/climbs/routes/{id}/ticks", get(route_ticks))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};

    #[test]
    fn days_since_climb_floors_partial_days() {
        let now = Utc.with_ymd_and_hms(2026, 8, 1, 12, 0, 0).unwrap();
        assert_eq!(days_since_climb(now, None), None);
        assert_eq!(
            days_since_climb(now, Some(now - Duration::hours(23))),
            Some(0)
        );
        assert_eq!(
            days_since_climb(now, Some(now - Duration::hours(25))),
            Some(1)
        );
        assert_eq!(
            days_since_climb(now, Some(now - Duration::days(10))),
            Some(10)
        );
        // A clock-skewed future tick never reports negative days.
        assert_eq!(
            days_since_climb(now, Some(now + Duration::hours(3))),
            Some(0)
        );
    }
}
