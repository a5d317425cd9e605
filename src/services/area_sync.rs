use anyhow::{Context, Result};
use serde_json::json;
use std::collections::HashSet;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::clients::area_catalog::{CatalogChild, CatalogRoute};
use crate::clients::retry_transient;
use crate::conditions::rock::RockGroup;
use crate::conditions::Aspect;
use crate::jobs::monitor;
use crate::services::destinations::{Destination, DESTINATIONS};
use crate::state::AppState;
use crate::store::{areas, locations, routes};

pub const JOB_NAME: &str = "area_catalog_sync";

#[derive(Debug, Default)]
struct TreeStats {
    areas_upserted: u64,
    routes_upserted: u64,
    subtrees_aborted: u64,
}

/// Walk each configured catalog root depth-first, upserting areas and
/// routes. A network failure aborts that subtree but its siblings continue;
/// a store failure fails the whole run.
pub async fn run(state: AppState, cancel: CancellationToken) -> Result<()> {
    let run = state
        .monitor
        .start_job(
            JOB_NAME,
            monitor::KIND_INGESTION,
            DESTINATIONS.len() as i64,
            json!({}),
        )
        .await
        .context("failed to record area sync start")?;

    let mut processed = 0i64;
    let mut succeeded = 0i64;
    let mut failed = 0i64;

    for destination in DESTINATIONS {
        if cancel.is_cancelled() {
            let _ = state.monitor.fail_job(run.id, "cancelled").await;
            return Ok(());
        }

        match sync_root(&state, destination, &cancel).await {
            Ok(stats) => {
                tracing::info!(
                    location = destination.location_name,
                    areas = stats.areas_upserted,
                    routes = stats.routes_upserted,
                    aborted_subtrees = stats.subtrees_aborted,
                    "catalog root synced"
                );
                succeeded += 1;
            }
            Err(err) if err.to_string().contains("cancelled") => {
                let _ = state.monitor.fail_job(run.id, "cancelled").await;
                return Ok(());
            }
            Err(err) => {
                tracing::warn!(location = destination.location_name, error = %err, "catalog root sync failed");
                failed += 1;
            }
        }

        processed += 1;
        let _ = state
            .monitor
            .update_progress(run.id, processed, succeeded, failed)
            .await;
    }

    state
        .monitor
        .complete_job(run.id)
        .await
        .context("failed to record area sync completion")?;
    Ok(())
}

async fn sync_root(
    state: &AppState,
    destination: &Destination,
    cancel: &CancellationToken,
) -> Result<TreeStats> {
    let location = locations::get_by_name(&state.db, destination.location_name)
        .await
        .context("failed to look up sync location")?
        .with_context(|| format!("location {:?} is not bootstrapped", destination.location_name))?;

    let mut stats = TreeStats::default();
    let mut visited: HashSet<i64> = HashSet::new();
    let mut pending: Vec<(i64, Option<Uuid>)> = vec![(destination.catalog_root_area_id, None)];

    while let Some((external_id, parent)) = pending.pop() {
        if cancel.is_cancelled() {
            anyhow::bail!("cancelled");
        }
        if !visited.insert(external_id) {
            tracing::warn!(external_id, "catalog returned a cycle, skipping revisit");
            continue;
        }

        let area = match retry_transient("catalog area", || state.catalog.get_area(external_id)).await
        {
            Ok(area) => area,
            Err(err) => {
                // Abort this subtree only; siblings already queued continue.
                tracing::warn!(external_id, error = %err, "catalog area fetch failed, skipping subtree");
                stats.subtrees_aborted += 1;
                continue;
            }
        };

        let area_id =
            areas::upsert_catalog_area(&state.db, location.id, external_id, parent, &area.title)
                .await
                .context("failed to upsert catalog area")?;
        stats.areas_upserted += 1;

        let mut seen_routes: Vec<i64> = Vec::new();
        for child in &area.children {
            match child {
                CatalogChild::Area { external_id, .. } => {
                    pending.push((*external_id, Some(area_id)));
                }
                CatalogChild::Route(route) => {
                    upsert_route(state, area_id, route, destination.default_rock)
                        .await
                        .context("failed to upsert catalog route")?;
                    seen_routes.push(route.external_id);
                    stats.routes_upserted += 1;
                }
            }
        }

        routes::deactivate_missing(&state.db, area_id, &seen_routes)
            .await
            .context("failed to deactivate orphan routes")?;
    }

    Ok(stats)
}

async fn upsert_route(
    state: &AppState,
    area_id: Uuid,
    route: &CatalogRoute,
    default_rock: RockGroup,
) -> Result<Uuid> {
    // The catalog carries no aspect, coverage, or geology; those default to
    // estimated values that curated data is allowed to overwrite later.
    let upsert = routes::RouteUpsert {
        external_route_id: route.external_id,
        area_id,
        name: &route.title,
        grade: route.grade.as_deref(),
        kind: route.kind.as_deref().unwrap_or("Boulder"),
        latitude: route.latitude,
        longitude: route.longitude,
        aspect: Aspect::Unknown.as_str(),
        tree_coverage_percent: 0.0,
        coverage_estimated: true,
        rock_group: default_rock.as_str(),
        wet_sensitive: default_rock.wet_sensitive(),
        porosity_hours: default_rock.default_porosity_hours(),
    };
    Ok(routes::upsert(&state.db, &upsert).await?)
}
