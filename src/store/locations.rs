use sqlx::PgPool;
use uuid::Uuid;

/// A climbing destination. Rows are created by bootstrap tooling; the core
/// only reads them.
#[derive(Debug, Clone, sqlx::FromRow, serde::Serialize, utoipa::ToSchema)]
pub struct LocationRow {
    pub id: Uuid,
    pub name: String,
    pub latitude: f64,
    pub longitude: f64,
    pub elevation_ft: f64,
    pub timezone: String,
    pub area_id: Option<Uuid>,
}

const COLUMNS: &str = "id, name, latitude, longitude, elevation_ft, timezone, area_id";

pub async fn list(db: &PgPool) -> Result<Vec<LocationRow>, sqlx::Error> {
    sqlx::query_as(&format!(
        "SELECT {COLUMNS} FROM locations ORDER BY name"
    ))
    .fetch_all(db)
    .await
}

pub async fn get(db: &PgPool, id: Uuid) -> Result<Option<LocationRow>, sqlx::Error> {
    sqlx::query_as(&format!("SELECT {COLUMNS} FROM locations WHERE id = $1"))
        .bind(id)
        .fetch_optional(db)
        .await
}

pub async fn list_in_area(db: &PgPool, area_id: Uuid) -> Result<Vec<LocationRow>, sqlx::Error> {
    sqlx::query_as(&format!(
        "SELECT {COLUMNS} FROM locations WHERE area_id = $1 ORDER BY name"
    ))
    .bind(area_id)
    .fetch_all(db)
    .await
}

/// Owning location of each route, resolved through its area. Routes whose
/// area is not attached to a location are omitted.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct RouteLocationRow {
    pub route_id: Uuid,
    #[sqlx(flatten)]
    pub location: LocationRow,
}

pub async fn for_routes(
    db: &PgPool,
    route_ids: &[Uuid],
) -> Result<Vec<RouteLocationRow>, sqlx::Error> {
    sqlx::query_as(
        r#"
        SELECT r.id AS route_id,
               l.id, l.name, l.latitude, l.longitude, l.elevation_ft, l.timezone, l.area_id
        FROM routes r
        JOIN areas a ON a.id = r.area_id
        JOIN locations l ON l.id = a.location_id
        WHERE r.id = ANY($1)
        "#,
    )
    .bind(route_ids)
    .fetch_all(db)
    .await
}

pub async fn get_by_name(db: &PgPool, name: &str) -> Result<Option<LocationRow>, sqlx::Error> {
    sqlx::query_as(&format!(
        "SELECT {COLUMNS} FROM locations WHERE lower(name) = lower($1)"
    ))
    .bind(name)
    .fetch_optional(db)
    .await
}
