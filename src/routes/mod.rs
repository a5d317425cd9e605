pub mod areas;
pub mod climbs;
pub mod drying;
pub mod health;
pub mod heat_map;
pub mod locations;
pub mod monitoring;
pub mod weather;

use axum::Router;
use uuid::Uuid;

use crate::error::AppError;
use crate::state::AppState;

pub fn router(state: AppState) -> Router {
    Router::new()
        .nest(
            "/api",
            Router::new()
                .merge(health::router())
                .merge(locations::router())
                .merge(areas::router())
                .merge(weather::router())
                .merge(climbs::router())
                .merge(drying::router())
                .merge(monitoring::router())
                .merge(heat_map::router())
                .merge(crate::openapi::router()),
        )
        .with_state(state)
}

pub(crate) const DEFAULT_LIMIT: i64 = 200;
pub(crate) const MAX_LIMIT: i64 = 500;
pub(crate) const MAX_BATCH_IDS: usize = 500;

/// Pagination limit: bounded 1..=500, defaulting to 200.
pub(crate) fn validate_limit(raw: Option<i64>) -> Result<i64, AppError> {
    match raw {
        None => Ok(DEFAULT_LIMIT),
        Some(value) if (1..=MAX_LIMIT).contains(&value) => Ok(value),
        Some(value) => Err(AppError::validation(format!(
            "limit must be between 1 and {MAX_LIMIT}, got {value}"
        ))),
    }
}

/// Geographic bounds arrive as four optional fields that must be given
/// together, each minimum strictly below its maximum.
pub(crate) fn validate_bounds(
    min_lat: Option<f64>,
    max_lat: Option<f64>,
    min_lon: Option<f64>,
    max_lon: Option<f64>,
) -> Result<Option<(f64, f64, f64, f64)>, AppError> {
    match (min_lat, max_lat, min_lon, max_lon) {
        (None, None, None, None) => Ok(None),
        (Some(min_lat), Some(max_lat), Some(min_lon), Some(max_lon)) => {
            if min_lat >= max_lat {
                return Err(AppError::validation("min_lat must be below max_lat"));
            }
            if min_lon >= max_lon {
                return Err(AppError::validation("min_lon must be below max_lon"));
            }
            if !(-90.0..=90.0).contains(&min_lat) || !(-90.0..=90.0).contains(&max_lat) {
                return Err(AppError::validation("latitudes must be within [-90, 90]"));
            }
            if !(-180.0..=180.0).contains(&min_lon) || !(-180.0..=180.0).contains(&max_lon) {
                return Err(AppError::validation("longitudes must be within [-180, 180]"));
            }
            Ok(Some((min_lat, max_lat, min_lon, max_lon)))
        }
        _ => Err(AppError::validation(
            "bounds require all of min_lat, max_lat, min_lon, max_lon",
        )),
    }
}

/// CSV id list for batch endpoints, deduplicated, capped.
pub(crate) fn parse_id_csv(raw: &str, cap: usize) -> Result<Vec<Uuid>, AppError> {
    let mut ids = Vec::new();
    for part in raw.split(',') {
        let part = part.trim();
        if part.is_empty() {
            continue;
        }
        let id = part
            .parse::<Uuid>()
            .map_err(|_| AppError::validation(format!("invalid id {part:?}")))?;
        if !ids.contains(&id) {
            ids.push(id);
        }
        if ids.len() > cap {
            return Err(AppError::validation(format!("at most {cap} ids per request")));
        }
    }
    if ids.is_empty() {
        return Err(AppError::validation("at least one id is required"));
    }
    Ok(ids)
}
