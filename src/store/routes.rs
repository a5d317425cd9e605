use chrono::{DateTime, Utc};
use sqlx::PgPool;
use uuid::Uuid;

#[derive(Debug, Clone, sqlx::FromRow, serde::Serialize, utoipa::ToSchema)]
pub struct RouteRow {
    pub id: Uuid,
    pub external_route_id: i64,
    pub area_id: Uuid,
    pub name: String,
    pub grade: Option<String>,
    pub kind: String,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    pub aspect: String,
    pub tree_coverage_percent: f64,
    pub coverage_estimated: bool,
    pub rock_group: String,
    pub wet_sensitive: bool,
    pub porosity_hours: f64,
    pub active: bool,
    pub priority_tier: i16,
}

const COLUMNS: &str = "id, external_route_id, area_id, name, grade, kind, latitude, longitude, \
                       aspect, tree_coverage_percent, coverage_estimated, rock_group, \
                       wet_sensitive, porosity_hours, active, priority_tier";

pub struct RouteUpsert<'a> {
    pub external_route_id: i64,
    pub area_id: Uuid,
    pub name: &'a str,
    pub grade: Option<&'a str>,
    pub kind: &'a str,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    pub aspect: &'a str,
    pub tree_coverage_percent: f64,
    pub coverage_estimated: bool,
    pub rock_group: &'a str,
    pub wet_sensitive: bool,
    pub porosity_hours: f64,
}

pub async fn get(db: &PgPool, id: Uuid) -> Result<Option<RouteRow>, sqlx::Error> {
    sqlx::query_as(&format!("SELECT {COLUMNS} FROM routes WHERE id = $1"))
        .bind(id)
        .fetch_optional(db)
        .await
}

pub async fn get_many(db: &PgPool, ids: &[Uuid]) -> Result<Vec<RouteRow>, sqlx::Error> {
    sqlx::query_as(&format!(
        "SELECT {COLUMNS} FROM routes WHERE id = ANY($1) AND active"
    ))
    .bind(ids)
    .fetch_all(db)
    .await
}

pub async fn get_by_external_id(
    db: &PgPool,
    external_route_id: i64,
) -> Result<Option<RouteRow>, sqlx::Error> {
    sqlx::query_as(&format!(
        "SELECT {COLUMNS} FROM routes WHERE external_route_id = $1"
    ))
    .bind(external_route_id)
    .fetch_optional(db)
    .await
}

/// Boulder-kind routes in any of the given areas, for drying aggregation.
pub async fn boulders_in_areas(db: &PgPool, area_ids: &[Uuid]) -> Result<Vec<RouteRow>, sqlx::Error> {
    sqlx::query_as(&format!(
        "SELECT {COLUMNS} FROM routes
         WHERE area_id = ANY($1) AND kind = 'Boulder' AND active
         ORDER BY name"
    ))
    .bind(area_ids)
    .fetch_all(db)
    .await
}

/// Upsert by the catalog's stable route id. Weather-model metadata (aspect,
/// coverage, rock) is only overwritten when the incoming value is measured,
/// so estimated defaults never clobber curated data.
pub async fn upsert(db: &PgPool, route: &RouteUpsert<'_>) -> Result<Uuid, sqlx::Error> {
    let row: (Uuid,) = sqlx::query_as(
        r#"
        INSERT INTO routes (
            id, external_route_id, area_id, name, grade, kind, latitude, longitude,
            aspect, tree_coverage_percent, coverage_estimated, rock_group,
            wet_sensitive, porosity_hours, active, priority_tier, updated_at
        )
        VALUES (
            gen_random_uuid(), $1, $2, $3, $4, $5, $6, $7,
            $8, $9, $10, $11, $12, $13, TRUE, 2, now()
        )
        ON CONFLICT (external_route_id)
        DO UPDATE SET
            area_id = EXCLUDED.area_id,
            name = EXCLUDED.name,
            grade = EXCLUDED.grade,
            kind = EXCLUDED.kind,
            latitude = COALESCE(EXCLUDED.latitude, routes.latitude),
            longitude = COALESCE(EXCLUDED.longitude, routes.longitude),
            aspect = CASE WHEN EXCLUDED.coverage_estimated THEN routes.aspect ELSE EXCLUDED.aspect END,
            tree_coverage_percent = CASE
                WHEN EXCLUDED.coverage_estimated AND NOT routes.coverage_estimated
                THEN routes.tree_coverage_percent
                ELSE EXCLUDED.tree_coverage_percent
            END,
            coverage_estimated = routes.coverage_estimated AND EXCLUDED.coverage_estimated,
            rock_group = EXCLUDED.rock_group,
            wet_sensitive = EXCLUDED.wet_sensitive,
            porosity_hours = EXCLUDED.porosity_hours,
            active = TRUE,
            updated_at = now()
        RETURNING id
        "#,
    )
    .bind(route.external_route_id)
    .bind(route.area_id)
    .bind(route.name)
    .bind(route.grade)
    .bind(route.kind)
    .bind(route.latitude)
    .bind(route.longitude)
    .bind(route.aspect)
    .bind(route.tree_coverage_percent)
    .bind(route.coverage_estimated)
    .bind(route.rock_group)
    .bind(route.wet_sensitive)
    .bind(route.porosity_hours)
    .fetch_one(db)
    .await?;
    Ok(row.0)
}

/// Case-insensitive name match within one location, used to pair
/// social-ascent climbs with catalog routes.
pub async fn find_by_name_in_location(
    db: &PgPool,
    location_id: Uuid,
    name: &str,
) -> Result<Option<RouteRow>, sqlx::Error> {
    sqlx::query_as(&format!(
        r#"
        SELECT {COLUMNS} FROM routes r
        WHERE r.active
          AND lower(r.name) = lower($2)
          AND r.area_id IN (SELECT id FROM areas WHERE location_id = $1)
        LIMIT 1
        "#
    ))
    .bind(location_id)
    .bind(name)
    .fetch_optional(db)
    .await
}

/// Soft-mark routes the upstream no longer lists under an area. Orphans are
/// never hard-deleted.
pub async fn deactivate_missing(
    db: &PgPool,
    area_id: Uuid,
    seen_external_ids: &[i64],
) -> Result<u64, sqlx::Error> {
    let result = sqlx::query(
        r#"
        UPDATE routes
        SET active = FALSE, updated_at = now()
        WHERE area_id = $1 AND active AND NOT (external_route_id = ANY($2))
        "#,
    )
    .bind(area_id)
    .bind(seen_external_ids)
    .execute(db)
    .await?;
    Ok(result.rows_affected())
}

/// Daily tier reassignment from recent tick volume: tier 0 for routes with
/// activity in the last 30 days, tier 1 inside 180 days, tier 2 otherwise.
pub async fn recalculate_priority_tiers(db: &PgPool) -> Result<u64, sqlx::Error> {
    let result = sqlx::query(
        r#"
        WITH scored AS (
            SELECT r.id,
                   CASE
                       WHEN MAX(t.climbed_at) >= now() - INTERVAL '30 days' THEN 0
                       WHEN MAX(t.climbed_at) >= now() - INTERVAL '180 days' THEN 1
                       ELSE 2
                   END::SMALLINT AS tier
            FROM routes r
            LEFT JOIN ticks t ON t.route_id = r.id
            GROUP BY r.id
        )
        UPDATE routes
        SET priority_tier = scored.tier, updated_at = now()
        FROM scored
        WHERE routes.id = scored.id AND routes.priority_tier IS DISTINCT FROM scored.tier
        "#,
    )
    .execute(db)
    .await?;
    Ok(result.rows_affected())
}

/// Recompute the denormalized per-area route counts.
pub async fn refresh_route_counts(db: &PgPool) -> Result<u64, sqlx::Error> {
    let result = sqlx::query(
        r#"
        WITH counts AS (
            SELECT a.id AS area_id, COUNT(r.id)::BIGINT AS route_count
            FROM areas a
            LEFT JOIN routes r ON r.area_id = a.id AND r.active
            GROUP BY a.id
        )
        UPDATE areas
        SET route_count = counts.route_count
        FROM counts
        WHERE areas.id = counts.area_id
          AND areas.route_count IS DISTINCT FROM counts.route_count
        "#,
    )
    .execute(db)
    .await?;
    Ok(result.rows_affected())
}

#[derive(Debug, Clone, sqlx::FromRow, serde::Serialize, utoipa::ToSchema)]
pub struct RouteSearchRow {
    pub id: Uuid,
    pub name: String,
    pub grade: Option<String>,
    pub kind: String,
    pub area_id: Uuid,
    pub area_name: String,
    pub last_climbed_at: Option<DateTime<Utc>>,
}

pub async fn search(
    db: &PgPool,
    location_id: Uuid,
    query: &str,
    limit: i64,
) -> Result<Vec<RouteSearchRow>, sqlx::Error> {
    sqlx::query_as(
        r#"
        SELECT r.id, r.name, r.grade, r.kind, r.area_id, a.name AS area_name,
               MAX(t.climbed_at) AS last_climbed_at
        FROM routes r
        JOIN areas a ON a.id = r.area_id
        LEFT JOIN ticks t ON t.route_id = r.id
        WHERE a.location_id = $1 AND r.active AND r.name ILIKE '%' || $2 || '%'
        GROUP BY r.id, r.name, r.grade, r.kind, r.area_id, a.name
        ORDER BY MAX(t.climbed_at) DESC NULLS LAST, r.name
        LIMIT $3
        "#,
    )
    .bind(location_id)
    .bind(query)
    .bind(limit)
    .fetch_all(db)
    .await
}
