use axum::extract::{Path, State};
use axum::routing::get;
use axum::{Json, Router};
use uuid::Uuid;

use crate::error::{AppError, AppResult};
use crate::state::AppState;
use crate::store::locations::{self, LocationRow};

#[derive(Debug, Clone, serde::Serialize, utoipa::ToSchema)]
pub struct LocationsResponse {
    pub locations: Vec<LocationRow>,
}

#[utoipa::path(
    get,
    path = "/api/locations",
    tag = "locations",
    responses((status = 200, description = "All climbing locations", body = LocationsResponse))
)]
pub(crate) async fn list_locations(State(state): State<AppState>) -> AppResult<Json<LocationsResponse>> {
    let locations = locations::list(&state.db).await?;
    Ok(Json(LocationsResponse { locations }))
}

#[utoipa::path(
    get,
    path = "/api/locations/{id}",
    tag = "locations",
    params(("id" = Uuid, Path, description = "Location id")),
    responses(
        (status = 200, description = "One location", body = LocationRow),
        (status = 404, description = "Unknown location")
    )
)]
pub(crate) async fn get_location(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> AppResult<Json<LocationRow>> {
    let location = locations::get(&state.db, id)
        .await?
        .ok_or_else(|| AppError::not_found("location not found"))?;
    Ok(Json(location))
}

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/locations", get(list_locations))
        .route("/locations/{id}", get(get_location))
}
