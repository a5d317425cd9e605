use axum::extract::{Path, Query, State};
use axum::routing::get;
use axum::{Json, Router};
use chrono::{DateTime, Duration, Utc};
use uuid::Uuid;

use crate::conditions::snow::{self, DailySnowDepth, SnowHour};
use crate::error::{AppError, AppResult};
use crate::state::AppState;
use crate::store::locations::{self, LocationRow};
use crate::store::weather::{self, DailySunRow, WeatherSampleRow};
use crate::time;

#[derive(Debug, Clone, serde::Serialize, utoipa::ToSchema)]
pub struct LocationWeatherResponse {
    pub location: LocationRow,
    pub current: WeatherSampleRow,
    pub hourly: Vec<WeatherSampleRow>,
    pub historical: Vec<WeatherSampleRow>,
    pub daily_sun_times: Vec<DailySunRow>,
    pub snow_daily: Vec<DailySnowDepth>,
}

#[derive(Debug, Clone, serde::Serialize, utoipa::ToSchema)]
pub struct AllWeatherResponse {
    pub forecasts: Vec<LocationWeatherResponse>,
    pub count: usize,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, serde::Deserialize, utoipa::IntoParams)]
pub struct AllWeatherQuery {
    pub area_id: Option<Uuid>,
}

async fn build_payload(
    state: &AppState,
    location: LocationRow,
    now: DateTime<Utc>,
) -> Result<Option<LocationWeatherResponse>, AppError> {
    let from = now - Duration::days(7);
    let to = now + Duration::days(7);
    let samples = weather::samples_in_range(&state.db, location.id, from, to).await?;
    let Some(current) = weather::latest_sample_at_or_before(&state.db, location.id, now).await? else {
        return Ok(None);
    };

    let tz = time::resolve_timezone(&location.timezone);
    let snow_daily = snow::simulate_daily_max(
        samples.iter().map(|sample| {
            (
                sample.ts,
                SnowHour {
                    temperature_f: sample.temperature_f,
                    precip_in: sample.precip_in_hr,
                    wind_mph: sample.wind_mph,
                    humidity_pct: sample.humidity_pct,
                },
            )
        }),
        tz,
    );

    let (historical, hourly): (Vec<_>, Vec<_>) =
        samples.into_iter().partition(|sample| sample.ts <= now);
    let daily_sun_times =
        weather::daily_sun_in_range(&state.db, location.id, from.date_naive(), to.date_naive())
            .await?;

    Ok(Some(LocationWeatherResponse {
        location,
        current,
        hourly,
        historical,
        daily_sun_times,
        snow_daily,
    }))
}

#[utoipa::path(
    get,
    path = "/api/weather/{location_id}",
    tag = "weather",
    params(("location_id" = Uuid, Path, description = "Location id")),
    responses(
        (status = 200, description = "Stored weather for a location", body = LocationWeatherResponse),
        (status = 404, description = "Unknown location or no weather ingested yet")
    )
)]
pub(crate) async fn location_weather(
    State(state): State<AppState>,
    Path(location_id): Path<Uuid>,
) -> AppResult<Json<LocationWeatherResponse>> {
    let location = locations::get(&state.db, location_id)
        .await?
        .ok_or_else(|| AppError::not_found("location not found"))?;
    let payload = build_payload(&state, location, Utc::now())
        .await?
        .ok_or_else(|| AppError::not_found("no weather data for location yet"))?;
    Ok(Json(payload))
}

#[utoipa::path(
    get,
    path = "/api/weather/all",
    tag = "weather",
    params(AllWeatherQuery),
    responses((status = 200, description = "Stored weather for all locations", body = AllWeatherResponse))
)]
pub(crate) async fn all_weather(
    State(state): State<AppState>,
    Query(query): Query<AllWeatherQuery>,
) -> AppResult<Json<AllWeatherResponse>> {
    let now = Utc::now();
    let targets = match query.area_id {
        Some(area_id) => locations::list_in_area(&state.db, area_id).await?,
        None => locations::list(&state.db).await?,
    };

    let mut forecasts = Vec::new();
    for location in targets {
        if let Some(payload) = build_payload(&state, location, now).await? {
            forecasts.push(payload);
        }
    }

    Ok(Json(AllWeatherResponse {
        count: forecasts.len(),
        forecasts,
        updated_at: now,
    }))
}

pub fn router() -> Router<AppState> {
    Router::new()
        // Register the static segment first so "all" never parses as an id.
        .route("/weather/all", get(all_weather))
        .route("/weather/{location_id}", get(location_weather))
}
