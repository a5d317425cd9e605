use chrono::{DateTime, Utc};
use sqlx::PgPool;
use uuid::Uuid;

#[derive(Debug, Clone, sqlx::FromRow, serde::Serialize, utoipa::ToSchema)]
pub struct TickRow {
    pub id: Uuid,
    pub route_id: Uuid,
    pub external_tick_id: String,
    pub climber_name: Option<String>,
    pub style: Option<String>,
    pub comment: Option<String>,
    pub climbed_at: DateTime<Utc>,
}

pub struct TickUpsert<'a> {
    pub route_id: Uuid,
    pub external_tick_id: &'a str,
    pub climber_name: Option<&'a str>,
    pub style: Option<&'a str>,
    pub comment: Option<&'a str>,
    pub climbed_at: DateTime<Utc>,
}

/// Ticks are insert-only; an external-id collision updates style and comment
/// only when they actually changed.
pub async fn upsert(db: &PgPool, tick: &TickUpsert<'_>) -> Result<(), sqlx::Error> {
    sqlx::query(
        r#"
        INSERT INTO ticks (
            id, route_id, external_tick_id, climber_name, style, comment,
            climbed_at, first_seen_at
        )
        VALUES (gen_random_uuid(), $1, $2, $3, $4, $5, $6, now())
        ON CONFLICT (route_id, external_tick_id)
        DO UPDATE SET
            style = EXCLUDED.style,
            comment = EXCLUDED.comment
        WHERE ticks.style IS DISTINCT FROM EXCLUDED.style
           OR ticks.comment IS DISTINCT FROM EXCLUDED.comment
        "#,
    )
    .bind(tick.route_id)
    .bind(tick.external_tick_id)
    .bind(tick.climber_name)
    .bind(tick.style)
    .bind(tick.comment)
    .bind(tick.climbed_at)
    .execute(db)
    .await?;
    Ok(())
}

pub async fn recent_for_route(
    db: &PgPool,
    route_id: Uuid,
    limit: i64,
) -> Result<Vec<TickRow>, sqlx::Error> {
    sqlx::query_as(
        r#"
        SELECT id, route_id, external_tick_id, climber_name, style, comment, climbed_at
        FROM ticks
        WHERE route_id = $1
        ORDER BY climbed_at DESC
        LIMIT $2
        "#,
    )
    .bind(route_id)
    .bind(limit)
    .fetch_all(db)
    .await
}

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct AreaActivityRow {
    pub area_id: Uuid,
    pub area_name: String,
    pub route_count: i64,
    pub tick_count: i64,
    pub last_climbed_at: Option<DateTime<Utc>>,
}

/// Activity rollup for the direct children of `parent` (or the location's
/// root areas when `parent` is None), ordered most recently climbed first.
pub async fn area_activity(
    db: &PgPool,
    location_id: Uuid,
    parent: Option<Uuid>,
) -> Result<Vec<AreaActivityRow>, sqlx::Error> {
    sqlx::query_as(
        r#"
        SELECT a.id AS area_id,
               a.name AS area_name,
               COUNT(DISTINCT r.id)::BIGINT AS route_count,
               COUNT(t.id)::BIGINT AS tick_count,
               MAX(t.climbed_at) AS last_climbed_at
        FROM areas a
        LEFT JOIN routes r ON r.area_id = a.id AND r.active
        LEFT JOIN ticks t ON t.route_id = r.id
        WHERE a.location_id = $1
          AND ($2::uuid IS NULL AND a.parent_area_id IS NULL
               OR a.parent_area_id = $2)
        GROUP BY a.id, a.name
        ORDER BY MAX(t.climbed_at) DESC NULLS LAST, a.name
        "#,
    )
    .bind(location_id)
    .bind(parent)
    .fetch_all(db)
    .await
}

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct RouteActivityRow {
    pub route_id: Uuid,
    pub route_name: String,
    pub grade: Option<String>,
    pub kind: String,
    pub tick_count: i64,
    pub last_climbed_at: Option<DateTime<Utc>>,
}

pub async fn route_activity(
    db: &PgPool,
    area_ids: &[Uuid],
    limit: i64,
) -> Result<Vec<RouteActivityRow>, sqlx::Error> {
    sqlx::query_as(
        r#"
        SELECT r.id AS route_id,
               r.name AS route_name,
               r.grade,
               r.kind,
               COUNT(t.id)::BIGINT AS tick_count,
               MAX(t.climbed_at) AS last_climbed_at
        FROM routes r
        LEFT JOIN ticks t ON t.route_id = r.id
        WHERE r.area_id = ANY($1) AND r.active
        GROUP BY r.id, r.name, r.grade, r.kind
        ORDER BY MAX(t.climbed_at) DESC NULLS LAST, r.name
        LIMIT $2
        "#,
    )
    .bind(area_ids)
    .bind(limit)
    .fetch_all(db)
    .await
}

#[derive(Debug, Clone, sqlx::FromRow, serde::Serialize, utoipa::ToSchema)]
pub struct HeatMapPointRow {
    pub route_id: Uuid,
    pub latitude: f64,
    pub longitude: f64,
    pub tick_count: i64,
    pub last_climbed_at: Option<DateTime<Utc>>,
}

pub struct HeatMapFilter {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    pub bounds: Option<(f64, f64, f64, f64)>,
    pub min_activity: i64,
    pub limit: i64,
}

pub async fn heat_map_points(
    db: &PgPool,
    filter: &HeatMapFilter,
) -> Result<Vec<HeatMapPointRow>, sqlx::Error> {
    let (min_lat, max_lat, min_lon, max_lon) = filter
        .bounds
        .unwrap_or((-90.0, 90.0, -180.0, 180.0));
    sqlx::query_as(
        r#"
        SELECT r.id AS route_id,
               r.latitude,
               r.longitude,
               COUNT(t.id)::BIGINT AS tick_count,
               MAX(t.climbed_at) AS last_climbed_at
        FROM routes r
        JOIN ticks t ON t.route_id = r.id
        WHERE r.latitude IS NOT NULL AND r.longitude IS NOT NULL
          AND t.climbed_at >= $1 AND t.climbed_at < $2
          AND r.latitude BETWEEN $3 AND $4
          AND r.longitude BETWEEN $5 AND $6
        GROUP BY r.id, r.latitude, r.longitude
        HAVING COUNT(t.id) >= $7
        ORDER BY COUNT(t.id) DESC
        LIMIT $8
        "#,
    )
    .bind(filter.start)
    .bind(filter.end)
    .bind(min_lat)
    .bind(max_lat)
    .bind(min_lon)
    .bind(max_lon)
    .bind(filter.min_activity)
    .bind(filter.limit)
    .fetch_all(db)
    .await
}
