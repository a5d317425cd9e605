use axum::extract::{Path, State};
use axum::routing::get;
use axum::{Json, Router};
use uuid::Uuid;

use crate::error::{AppError, AppResult};
use crate::state::AppState;
use crate::store::areas::{self, AreaRow, RegionAreaRow};
use crate::store::locations::{self, LocationRow};

#[derive(Debug, Clone, serde::Serialize, utoipa::ToSchema)]
pub struct AreasResponse {
    pub areas: Vec<RegionAreaRow>,
}

#[derive(Debug, Clone, serde::Serialize, utoipa::ToSchema)]
pub struct AreaLocationsResponse {
    pub area: AreaRow,
    pub locations: Vec<LocationRow>,
}

#[utoipa::path(
    get,
    path = "/api/areas",
    tag = "areas",
    responses((status = 200, description = "Region areas with location counts", body = AreasResponse))
)]
pub(crate) async fn list_areas(State(state): State<AppState>) -> AppResult<Json<AreasResponse>> {
    let areas = areas::list_regions(&state.db).await?;
    Ok(Json(AreasResponse { areas }))
}

#[utoipa::path(
    get,
    path = "/api/areas/{id}/locations",
    tag = "areas",
    params(("id" = Uuid, Path, description = "Area id")),
    responses(
        (status = 200, description = "Locations hosted by the area", body = AreaLocationsResponse),
        (status = 404, description = "Unknown area")
    )
)]
pub(crate) async fn area_locations(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> AppResult<Json<AreaLocationsResponse>> {
    let area = areas::get(&state.db, id)
        .await?
        .ok_or_else(|| AppError::not_found("area not found"))?;
    let locations = locations::list_in_area(&state.db, id).await?;
    Ok(Json(AreaLocationsResponse { area, locations }))
}

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/areas", get(list_areas))
        .route("/areas/{id}/locations", get(area_locations))
}
