use axum::extract::{Path, Query, State};
use axum::routing::get;
use axum::{Json, Router};
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use uuid::Uuid;

use crate::clients::{retry_transient, WeatherProvider};
use crate::conditions::drying::{compute_drying_status, DryingInputs, DryingStatus};
use crate::conditions::Aspect;
use crate::error::{AppError, AppResult, ErrorKind};
use crate::routes::{parse_id_csv, MAX_BATCH_IDS};
use crate::state::AppState;
use crate::store::locations::LocationRow;
use crate::store::routes::RouteRow;
use crate::store::{areas, locations, routes};
use crate::time;

#[derive(Debug, Clone)]
pub(crate) struct ComputeTarget {
    pub route: RouteRow,
    pub location: LocationRow,
}

/// Shared compute path for the single, batch, and area-stats endpoints:
/// weather is fetched exactly once per distinct location, then every route
/// in that location runs through the drying engine against the same bundle.
/// Routes whose location weather cannot be fetched are omitted.
pub(crate) async fn compute_for_targets(
    provider: &dyn WeatherProvider,
    targets: &[ComputeTarget],
    now: DateTime<Utc>,
) -> HashMap<Uuid, DryingStatus> {
    let mut by_location: Vec<(Uuid, Vec<usize>)> = Vec::new();
    for (idx, target) in targets.iter().enumerate() {
        match by_location
            .iter_mut()
            .find(|(location_id, _)| *location_id == target.location.id)
        {
            Some((_, indexes)) => indexes.push(idx),
            None => by_location.push((target.location.id, vec![idx])),
        }
    }

    let mut statuses = HashMap::new();
    for (_, indexes) in by_location {
        let location = &targets[indexes[0]].location;
        let tz = time::resolve_timezone(&location.timezone);
        let bundle = match retry_transient("drying weather", || {
            provider.fetch(location.latitude, location.longitude, tz)
        })
        .await
        {
            Ok(bundle) => bundle,
            Err(err) => {
                tracing::warn!(location = %location.name, error = %err, "weather fetch failed, omitting routes");
                continue;
            }
        };

        for idx in indexes {
            let target = &targets[idx];
            let route = &target.route;
            let inputs = DryingInputs {
                latitude: route.latitude.unwrap_or(target.location.latitude),
                longitude: route.longitude.unwrap_or(target.location.longitude),
                aspect: Aspect::parse(&route.aspect),
                tree_coverage: (route.tree_coverage_percent / 100.0).clamp(0.0, 1.0),
                coverage_estimated: route.coverage_estimated,
                wet_sensitive: route.wet_sensitive,
                porosity_hours: route.porosity_hours,
                rock_group: &route.rock_group,
                historical: &bundle.historical,
                forecast: &bundle.hourly,
                now,
            };
            statuses.insert(route.id, compute_drying_status(&inputs));
        }
    }
    statuses
}

#[derive(Debug, Clone, PartialEq, serde::Serialize, utoipa::ToSchema)]
pub struct AreaDryingStats {
    pub total_routes: i64,
    pub dry_count: i64,
    pub wet_count: i64,
    pub percent_dry: f64,
    pub dry_sensitive_count: i64,
}

/// Reduce per-route drying results into area statistics. The inputs are the
/// same per-route statuses the batch endpoint serves, so the two surfaces
/// can never disagree about an area.
pub(crate) fn reduce_area_stats<'a>(
    results: impl Iterator<Item = (&'a RouteRow, &'a DryingStatus)>,
) -> AreaDryingStats {
    let mut stats = AreaDryingStats {
        total_routes: 0,
        dry_count: 0,
        wet_count: 0,
        percent_dry: 0.0,
        dry_sensitive_count: 0,
    };
    for (route, status) in results {
        stats.total_routes += 1;
        if status.is_wet {
            stats.wet_count += 1;
        } else {
            stats.dry_count += 1;
            if route.wet_sensitive {
                stats.dry_sensitive_count += 1;
            }
        }
    }
    if stats.total_routes > 0 {
        stats.percent_dry = stats.dry_count as f64 / stats.total_routes as f64 * 100.0;
    }
    stats
}

async fn targets_for_route_ids(
    state: &AppState,
    route_ids: &[Uuid],
) -> Result<Vec<ComputeTarget>, AppError> {
    let rows = routes::get_many(&state.db, route_ids).await?;
    let location_rows = locations::for_routes(&state.db, route_ids).await?;
    let location_by_route: HashMap<Uuid, LocationRow> = location_rows
        .into_iter()
        .map(|row| (row.route_id, row.location))
        .collect();

    let mut targets = Vec::with_capacity(rows.len());
    for route in rows {
        let Some(location) = location_by_route.get(&route.id) else {
            tracing::warn!(route_id = %route.id, "route has no owning location, skipping");
            continue;
        };
        targets.push(ComputeTarget {
            location: location.clone(),
            route,
        });
    }
    Ok(targets)
}

#[utoipa::path(
    get,
    path = "/api/climbs/routes/{id}/drying-status",
    tag = "drying",
    params(("id" = Uuid, Path, description = "Route id")),
    responses(
        (status = 200, description = "Drying status for one route", body = DryingStatus),
        (status = 404, description = "Unknown route"),
        (status = 500, description = "Weather upstream unavailable")
    )
)]
pub(crate) async fn route_drying_status(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> AppResult<Json<DryingStatus>> {
    routes::get(&state.db, id)
        .await?
        .ok_or_else(|| AppError::not_found("route not found"))?;
    let targets = targets_for_route_ids(&state, &[id]).await?;
    let mut statuses = compute_for_targets(&*state.weather, &targets, Utc::now()).await;
    let status = statuses.remove(&id).ok_or_else(|| {
        AppError::new(ErrorKind::UpstreamTransient, "weather data unavailable for route")
    })?;
    Ok(Json(status))
}

#[derive(Debug, serde::Deserialize, utoipa::IntoParams)]
pub struct BatchDryingQuery {
    /// CSV of route ids, at most 500.
    pub route_ids: String,
}

#[utoipa::path(
    get,
    path = "/api/climbs/routes/batch-drying-status",
    tag = "drying",
    params(BatchDryingQuery),
    responses(
        (status = 200, description = "Drying status per requested route; unfetchable routes are omitted"),
        (status = 400, description = "Bad id list")
    )
)]
pub(crate) async fn batch_drying_status(
    State(state): State<AppState>,
    Query(query): Query<BatchDryingQuery>,
) -> AppResult<Json<HashMap<Uuid, DryingStatus>>> {
    let route_ids = parse_id_csv(&query.route_ids, MAX_BATCH_IDS)?;
    let targets = targets_for_route_ids(&state, &route_ids).await?;
    let statuses = compute_for_targets(&*state.weather, &targets, Utc::now()).await;
    Ok(Json(statuses))
}

async fn boulder_targets_for_area(
    state: &AppState,
    location: &LocationRow,
    area_id: Uuid,
) -> Result<Vec<ComputeTarget>, AppError> {
    let subtree = areas::subtree_ids(&state.db, area_id).await?;
    let boulders = routes::boulders_in_areas(&state.db, &subtree).await?;
    Ok(boulders
        .into_iter()
        .map(|route| ComputeTarget {
            route,
            location: location.clone(),
        })
        .collect())
}

fn stats_from_statuses(
    targets: &[ComputeTarget],
    statuses: &HashMap<Uuid, DryingStatus>,
) -> AreaDryingStats {
    reduce_area_stats(targets.iter().filter_map(|target| {
        statuses
            .get(&target.route.id)
            .map(|status| (&target.route, status))
    }))
}

#[utoipa::path(
    get,
    path = "/api/climbs/location/{location_id}/areas/{area_id}/drying-stats",
    tag = "drying",
    params(
        ("location_id" = Uuid, Path, description = "Location id"),
        ("area_id" = Uuid, Path, description = "Area id")
    ),
    responses(
        (status = 200, description = "Aggregated boulder drying stats", body = AreaDryingStats),
        (status = 404, description = "Unknown location or area")
    )
)]
pub(crate) async fn area_drying_stats(
    State(state): State<AppState>,
    Path((location_id, area_id)): Path<(Uuid, Uuid)>,
) -> AppResult<Json<AreaDryingStats>> {
    let location = locations::get(&state.db, location_id)
        .await?
        .ok_or_else(|| AppError::not_found("location not found"))?;
    let area = areas::get(&state.db, area_id)
        .await?
        .ok_or_else(|| AppError::not_found("area not found"))?;
    if area.location_id != Some(location_id) {
        return Err(AppError::not_found("area is not part of this location"));
    }

    let targets = boulder_targets_for_area(&state, &location, area_id).await?;
    let statuses = compute_for_targets(&*state.weather, &targets, Utc::now()).await;
    Ok(Json(stats_from_statuses(&targets, &statuses)))
}

#[derive(Debug, serde::Deserialize, utoipa::IntoParams)]
pub struct BatchAreaStatsQuery {
    /// CSV of area ids, at most 500.
    pub area_ids: String,
}

#[utoipa::path(
    get,
    path = "/api/climbs/location/{location_id}/batch-area-drying-stats",
    tag = "drying",
    params(("location_id" = Uuid, Path, description = "Location id"), BatchAreaStatsQuery),
    responses(
        (status = 200, description = "Aggregated drying stats per area"),
        (status = 400, description = "Bad id list"),
        (status = 404, description = "Unknown location")
    )
)]
pub(crate) async fn batch_area_drying_stats(
    State(state): State<AppState>,
    Path(location_id): Path<Uuid>,
    Query(query): Query<BatchAreaStatsQuery>,
) -> AppResult<Json<HashMap<Uuid, AreaDryingStats>>> {
    let area_ids = parse_id_csv(&query.area_ids, MAX_BATCH_IDS)?;
    let location = locations::get(&state.db, location_id)
        .await?
        .ok_or_else(|| AppError::not_found("location not found"))?;

    let mut per_area: Vec<(Uuid, Vec<ComputeTarget>)> = Vec::with_capacity(area_ids.len());
    let mut all_targets: Vec<ComputeTarget> = Vec::new();
    for area_id in area_ids {
        let area = areas::get(&state.db, area_id)
            .await?
            .ok_or_else(|| AppError::not_found(format!("area {area_id} not found")))?;
        if area.location_id != Some(location_id) {
            return Err(AppError::not_found(format!(
                "area {area_id} is not part of this location"
            )));
        }
        let targets = boulder_targets_for_area(&state, &location, area_id).await?;
        all_targets.extend(targets.iter().cloned());
        per_area.push((area_id, targets));
    }

    // One engine pass over the union; every area's weather is fetched once
    // even when areas share a location.
    let statuses = compute_for_targets(&*state.weather, &all_targets, Utc::now()).await;

    let mut response = HashMap::new();
    for (area_id, targets) in per_area {
        response.insert(area_id, stats_from_statuses(&targets, &statuses));
    }
    Ok(Json(response))
}

pub fn router() -> Router<AppState> {
    Router::new()
        // Static segment before the id-parameterized sibling.
        .route("/climbs/routes/batch-drying-status", get(batch_drying_status))
        .route("/climbs/routes/{id}/drying-status", get(route_drying_status))
        .route(
            "/climbs/location/{location_id}/areas/{area_id}/drying-stats",
            get(area_drying_stats),
        )
        .route(
            "/climbs/location/{location_id}/batch-area-drying-stats",
            get(batch_area_drying_stats),
        )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clients::{
        CurrentConditions, DailySun, HourlyPoint, UpstreamError, WeatherBundle,
    };
    use chrono::{Duration, TimeZone};
    use chrono_tz::Tz;
    use futures::future::BoxFuture;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn fixture_now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 10, 15, 18, 0, 0).unwrap()
    }

    fn hour_at(ts: DateTime<Utc>, temperature_f: f64, precip_in_hr: f64) -> HourlyPoint {
        HourlyPoint {
            ts,
            temperature_f,
            feels_like_f: temperature_f,
            precip_in_hr,
            humidity_pct: 50.0,
            wind_mph: 5.0,
            wind_dir_deg: 180.0,
            cloud_cover_pct: 40.0,
            pressure_hpa: 1013.0,
            description: "fixture".to_string(),
            icon_code: "01d".to_string(),
        }
    }

    fn fixture_bundle(now: DateTime<Utc>) -> WeatherBundle {
        let historical = (0..7 * 24)
            .map(|offset| {
                let ts = now - Duration::hours(7 * 24 - 1 - offset);
                let precip = if now - ts == Duration::hours(2) { 0.5 } else { 0.0 };
                hour_at(ts, 45.0, precip)
            })
            .collect();
        let hourly = (1..=144)
            .map(|offset| hour_at(now + Duration::hours(offset), 60.0, 0.0))
            .collect();
        WeatherBundle {
            current: CurrentConditions {
                ts: now,
                temperature_f: 58.0,
                feels_like_f: 58.0,
                precip_in_hr: 0.0,
                humidity_pct: 50.0,
                wind_mph: 5.0,
                wind_dir_deg: 180.0,
                cloud_cover_pct: 40.0,
                pressure_hpa: 1013.0,
                description: "fixture".to_string(),
                icon_code: "01d".to_string(),
            },
            hourly,
            historical,
            daily_sun: vec![DailySun {
                date: now.date_naive(),
                sunrise: now - Duration::hours(4),
                sunset: now + Duration::hours(4),
            }],
        }
    }

    /// Counts fetches and optionally refuses a configured location.
    struct CountingProvider {
        calls: AtomicUsize,
        bundle: WeatherBundle,
        fail_for_latitude: Option<f64>,
    }

    impl CountingProvider {
        fn new(bundle: WeatherBundle) -> Self {
            Self {
                calls: AtomicUsize::new(0),
                bundle,
                fail_for_latitude: None,
            }
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    impl WeatherProvider for CountingProvider {
        fn fetch(
            &self,
            lat: f64,
            _lon: f64,
            _tz: Tz,
        ) -> BoxFuture<'_, Result<WeatherBundle, UpstreamError>> {
            Box::pin(async move {
                self.calls.fetch_add(1, Ordering::SeqCst);
                if self.fail_for_latitude.is_some_and(|bad| (bad - lat).abs() < 1e-9) {
                    return Err(UpstreamError::Permanent("no weather here".to_string()));
                }
                Ok(self.bundle.clone())
            })
        }
    }

    fn location(name: &str, latitude: f64) -> LocationRow {
        LocationRow {
            id: Uuid::new_v4(),
            name: name.to_string(),
            latitude,
            longitude: -121.5601,
            elevation_ft: 1000.0,
            timezone: "America/Los_Angeles".to_string(),
            area_id: None,
        }
    }

    fn boulder(name: &str, wet_sensitive: bool) -> RouteRow {
        RouteRow {
            id: Uuid::new_v4(),
            external_route_id: 1,
            area_id: Uuid::new_v4(),
            name: name.to_string(),
            grade: Some("V4".to_string()),
            kind: "Boulder".to_string(),
            latitude: None,
            longitude: None,
            aspect: "S".to_string(),
            tree_coverage_percent: 10.0,
            coverage_estimated: false,
            rock_group: if wet_sensitive { "sandstone" } else { "granite" }.to_string(),
            wet_sensitive,
            porosity_hours: if wet_sensitive { 18.0 } else { 6.0 },
            active: true,
            priority_tier: 0,
        }
    }

    fn target(location: &LocationRow, route: RouteRow) -> ComputeTarget {
        ComputeTarget {
            route,
            location: location.clone(),
        }
    }

    #[tokio::test]
    async fn batch_fetches_weather_once_per_location() {
        let now = fixture_now();
        let provider = CountingProvider::new(fixture_bundle(now));
        let gold_bar = location("Gold Bar", 47.8213);
        let leavenworth = location("Leavenworth", 47.5962);

        let targets = vec![
            target(&gold_bar, boulder("Five Star Arete", false)),
            target(&gold_bar, boulder("The Seam", false)),
            target(&gold_bar, boulder("Harvest", true)),
            target(&leavenworth, boulder("The Sword", false)),
            target(&leavenworth, boulder("Chacos", false)),
        ];

        let statuses = compute_for_targets(&provider, &targets, now).await;
        assert_eq!(provider.calls(), 2);
        assert_eq!(statuses.len(), 5);
    }

    #[tokio::test]
    async fn single_and_batch_results_are_byte_identical() {
        let now = fixture_now();
        let provider = CountingProvider::new(fixture_bundle(now));
        let gold_bar = location("Gold Bar", 47.8213);
        let route = boulder("Five Star Arete", false);
        let route_id = route.id;

        let single = compute_for_targets(&provider, &[target(&gold_bar, route.clone())], now).await;
        let batch = compute_for_targets(
            &provider,
            &[
                target(&gold_bar, route),
                target(&gold_bar, boulder("The Seam", true)),
            ],
            now,
        )
        .await;

        let single_json = serde_json::to_string(&single[&route_id]).unwrap();
        let batch_json = serde_json::to_string(&batch[&route_id]).unwrap();
        assert_eq!(single_json, batch_json);
    }

    #[tokio::test]
    async fn unfetchable_location_omits_only_its_routes() {
        let now = fixture_now();
        let mut provider = CountingProvider::new(fixture_bundle(now));
        provider.fail_for_latitude = Some(46.9);
        let good = location("Gold Bar", 47.8213);
        let bad = location("Vantage", 46.9);

        let good_route = boulder("Five Star Arete", false);
        let good_id = good_route.id;
        let targets = vec![
            target(&good, good_route),
            target(&bad, boulder("Air Guitar", false)),
        ];
        let statuses = compute_for_targets(&provider, &targets, now).await;
        assert_eq!(statuses.len(), 1);
        assert!(statuses.contains_key(&good_id));
    }

    #[tokio::test]
    async fn area_stats_agree_with_per_route_batch_results() {
        let now = fixture_now();
        let provider = CountingProvider::new(fixture_bundle(now));
        let gold_bar = location("Gold Bar", 47.8213);
        let targets = vec![
            target(&gold_bar, boulder("Five Star Arete", false)),
            target(&gold_bar, boulder("Harvest", true)),
            target(&gold_bar, boulder("The Seam", false)),
        ];

        let statuses = compute_for_targets(&provider, &targets, now).await;
        let stats = stats_from_statuses(&targets, &statuses);

        // Recompute the aggregate straight from the per-route results the
        // batch endpoint would serve.
        let wet = targets
            .iter()
            .filter(|t| statuses[&t.route.id].is_wet)
            .count() as i64;
        assert_eq!(stats.total_routes, 3);
        assert_eq!(stats.wet_count, wet);
        assert_eq!(stats.dry_count, 3 - wet);
    }

    #[test]
    fn reduce_handles_the_empty_area() {
        let stats = reduce_area_stats(std::iter::empty());
        assert_eq!(stats.total_routes, 0);
        assert_eq!(stats.percent_dry, 0.0);
    }
}
