use axum::routing::get;
use axum::{Json, Router};
use utoipa::OpenApi;

use crate::state::AppState;

#[derive(OpenApi)]
#[openapi(
    info(
        title = "crag-server",
        description = "Climbing-route ingestion and weather-driven climbability API"
    ),
    paths(
        crate::routes::health::health_handler,
        crate::routes::locations::list_locations,
        crate::routes::locations::get_location,
        crate::routes::areas::list_areas,
        crate::routes::areas::area_locations,
        crate::routes::weather::location_weather,
        crate::routes::weather::all_weather,
        crate::routes::climbs::areas_by_activity,
        crate::routes::climbs::subareas_by_activity,
        crate::routes::climbs::routes_by_activity,
        crate::routes::climbs::get_route,
        crate::routes::climbs::route_ticks,
        crate::routes::climbs::search_routes,
        crate::routes::drying::route_drying_status,
        crate::routes::drying::batch_drying_status,
        crate::routes::drying::area_drying_stats,
        crate::routes::drying::batch_area_drying_stats,
        crate::routes::monitoring::active_jobs,
        crate::routes::monitoring::job_history,
        crate::routes::monitoring::job_summary,
        crate::routes::monitoring::get_job,
        crate::routes::heat_map::activity_heat_map,
    ),
    components(schemas(
        crate::routes::health::HealthResponse,
        crate::routes::locations::LocationsResponse,
        crate::routes::areas::AreasResponse,
        crate::routes::areas::AreaLocationsResponse,
        crate::routes::weather::LocationWeatherResponse,
        crate::routes::weather::AllWeatherResponse,
        crate::routes::climbs::AreaActivitySummary,
        crate::routes::climbs::RouteActivitySummary,
        crate::routes::drying::AreaDryingStats,
        crate::routes::monitoring::JobsResponse,
        crate::routes::monitoring::JobSummaryEntry,
        crate::routes::monitoring::JobSummaryResponse,
        crate::routes::heat_map::HeatMapFilters,
        crate::routes::heat_map::HeatMapResponse,
        crate::store::locations::LocationRow,
        crate::store::areas::AreaRow,
        crate::store::areas::RegionAreaRow,
        crate::store::routes::RouteRow,
        crate::store::routes::RouteSearchRow,
        crate::store::ticks::TickRow,
        crate::store::ticks::HeatMapPointRow,
        crate::store::weather::WeatherSampleRow,
        crate::store::weather::DailySunRow,
        crate::conditions::drying::DryingStatus,
        crate::conditions::drying::DryingPeriod,
        crate::conditions::drying::DryingState,
        crate::conditions::snow::DailySnowDepth,
        crate::jobs::monitor::JobRunPublic,
        crate::json::JsonValue,
    ))
)]
struct ApiDoc;

pub fn openapi_json() -> serde_json::Value {
    serde_json::to_value(ApiDoc::openapi()).unwrap_or_default()
}

async fn serve_openapi() -> Json<serde_json::Value> {
    Json(openapi_json())
}

pub fn router() -> Router<AppState> {
    Router::new().route("/openapi.json", get(serve_openapi))
}
