use sqlx::PgPool;
use uuid::Uuid;

/// A node in the route tree. Region areas (groupings of whole locations)
/// carry no `location_id`; catalog areas belong to exactly one location and
/// form an acyclic forest under it via `parent_area_id`.
#[derive(Debug, Clone, sqlx::FromRow, serde::Serialize, utoipa::ToSchema)]
pub struct AreaRow {
    pub id: Uuid,
    pub external_area_id: Option<i64>,
    pub location_id: Option<Uuid>,
    pub parent_area_id: Option<Uuid>,
    pub name: String,
}

#[derive(Debug, Clone, sqlx::FromRow, serde::Serialize, utoipa::ToSchema)]
pub struct RegionAreaRow {
    pub id: Uuid,
    pub name: String,
    pub location_count: i64,
}

const COLUMNS: &str = "id, external_area_id, location_id, parent_area_id, name";

pub async fn get(db: &PgPool, id: Uuid) -> Result<Option<AreaRow>, sqlx::Error> {
    sqlx::query_as(&format!("SELECT {COLUMNS} FROM areas WHERE id = $1"))
        .bind(id)
        .fetch_optional(db)
        .await
}

/// Region areas with how many locations each hosts.
pub async fn list_regions(db: &PgPool) -> Result<Vec<RegionAreaRow>, sqlx::Error> {
    sqlx::query_as(
        r#"
        SELECT a.id, a.name, COUNT(l.id)::BIGINT AS location_count
        FROM areas a
        LEFT JOIN locations l ON l.area_id = a.id
        WHERE a.location_id IS NULL
        GROUP BY a.id, a.name
        ORDER BY a.name
        "#,
    )
    .fetch_all(db)
    .await
}

/// Root areas of a location's route tree.
pub async fn roots_for_location(db: &PgPool, location_id: Uuid) -> Result<Vec<AreaRow>, sqlx::Error> {
    sqlx::query_as(&format!(
        "SELECT {COLUMNS} FROM areas
         WHERE location_id = $1 AND parent_area_id IS NULL
         ORDER BY name"
    ))
    .bind(location_id)
    .fetch_all(db)
    .await
}

pub async fn children_of(db: &PgPool, area_id: Uuid) -> Result<Vec<AreaRow>, sqlx::Error> {
    sqlx::query_as(&format!(
        "SELECT {COLUMNS} FROM areas WHERE parent_area_id = $1 ORDER BY name"
    ))
    .bind(area_id)
    .fetch_all(db)
    .await
}

pub async fn upsert_catalog_area(
    db: &PgPool,
    location_id: Uuid,
    external_area_id: i64,
    parent_area_id: Option<Uuid>,
    name: &str,
) -> Result<Uuid, sqlx::Error> {
    let row: (Uuid,) = sqlx::query_as(
        r#"
        INSERT INTO areas (id, external_area_id, location_id, parent_area_id, name, updated_at)
        VALUES (gen_random_uuid(), $1, $2, $3, $4, now())
        ON CONFLICT (location_id, external_area_id)
        DO UPDATE SET
            parent_area_id = EXCLUDED.parent_area_id,
            name = EXCLUDED.name,
            updated_at = now()
        RETURNING id
        "#,
    )
    .bind(external_area_id)
    .bind(location_id)
    .bind(parent_area_id)
    .bind(name)
    .fetch_one(db)
    .await?;
    Ok(row.0)
}

/// All area ids in the subtree rooted at `root`, root included. The visited
/// set tolerates malformed upstream data that would otherwise cycle forever.
pub async fn subtree_ids(db: &PgPool, root: Uuid) -> Result<Vec<Uuid>, sqlx::Error> {
    let mut visited = std::collections::HashSet::new();
    let mut ordered = Vec::new();
    let mut pending = vec![root];
    while let Some(id) = pending.pop() {
        if !visited.insert(id) {
            tracing::warn!(area_id = %id, "cycle detected in area tree, skipping revisit");
            continue;
        }
        ordered.push(id);
        let rows: Vec<(Uuid,)> = sqlx::query_as("SELECT id FROM areas WHERE parent_area_id = $1")
            .bind(id)
            .fetch_all(db)
            .await?;
        pending.extend(rows.into_iter().map(|row| row.0));
    }
    Ok(ordered)
}
