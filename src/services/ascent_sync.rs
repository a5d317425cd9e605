use anyhow::{Context, Result};
use chrono::{DateTime, Duration, NaiveDate, NaiveDateTime, Utc};
use chrono_tz::Tz;
use serde_json::json;
use std::collections::HashMap;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::clients::retry_transient;
use crate::jobs::monitor;
use crate::services::destinations::{self, Destination};
use crate::state::AppState;
use crate::store::{locations, routes, sync, ticks};
use crate::time;

pub const SOURCE: &str = "kaya";

/// Hard ceiling on pagination per destination; a persistently failing or
/// lying upstream cannot wedge the job in an endless page loop.
const MAX_PAGES: u32 = 200;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PriorityTier {
    High,
    Medium,
    Low,
}

impl PriorityTier {
    pub fn job_name(self) -> &'static str {
        match self {
            PriorityTier::High => "ascent_sync_high",
            PriorityTier::Medium => "ascent_sync_medium",
            PriorityTier::Low => "ascent_sync_low",
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            PriorityTier::High => "high",
            PriorityTier::Medium => "medium",
            PriorityTier::Low => "low",
        }
    }

    /// A destination synced more recently than this is skipped outright.
    pub fn freshness_window(self) -> Duration {
        match self {
            PriorityTier::High => Duration::hours(12),
            PriorityTier::Medium => Duration::days(3),
            PriorityTier::Low => Duration::days(14),
        }
    }
}

#[derive(Debug, Default)]
struct DestinationStats {
    climbs_seen: u64,
    climbs_matched: u64,
    ticks_upserted: u64,
    pages_failed: u64,
}

/// Paginate climbs and ascents for every destination in the tier, upserting
/// ticks. Destinations with a fresh SyncProgress checkpoint are skipped;
/// partial-page failures are logged and the cursor advances.
pub async fn run(state: AppState, cancel: CancellationToken, tier: PriorityTier) -> Result<()> {
    let targets: Vec<&Destination> = destinations::for_tier(tier).collect();

    let run = state
        .monitor
        .start_job(
            tier.job_name(),
            monitor::KIND_INGESTION,
            targets.len() as i64,
            json!({ "tier": tier.as_str() }),
        )
        .await
        .context("failed to record ascent sync start")?;

    let mut processed = 0i64;
    let mut succeeded = 0i64;
    let mut failed = 0i64;

    for destination in targets {
        if cancel.is_cancelled() {
            let _ = state.monitor.fail_job(run.id, "cancelled").await;
            return Ok(());
        }

        let fresh = match sync::get(&state.db, SOURCE, destination.kaya_slug).await {
            Ok(Some(progress)) => {
                Utc::now() - progress.last_synced_at < tier.freshness_window()
            }
            Ok(None) => false,
            Err(err) => {
                tracing::warn!(slug = destination.kaya_slug, error = %err, "sync progress lookup failed");
                false
            }
        };
        if fresh {
            tracing::debug!(slug = destination.kaya_slug, "checkpoint is fresh, skipping");
            processed += 1;
            succeeded += 1;
            let _ = state
                .monitor
                .update_progress(run.id, processed, succeeded, failed)
                .await;
            continue;
        }

        match sync_destination(&state, destination, &cancel).await {
            Ok(stats) => {
                tracing::info!(
                    slug = destination.kaya_slug,
                    climbs = stats.climbs_seen,
                    matched = stats.climbs_matched,
                    ticks = stats.ticks_upserted,
                    failed_pages = stats.pages_failed,
                    "destination synced"
                );
                let _ = sync::advance(&state.db, SOURCE, destination.kaya_slug, Utc::now(), None).await;
                succeeded += 1;
            }
            Err(err) if err.to_string().contains("cancelled") => {
                let _ = state.monitor.fail_job(run.id, "cancelled").await;
                return Ok(());
            }
            Err(err) => {
                tracing::warn!(slug = destination.kaya_slug, error = %err, "destination sync failed");
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
        .context("failed to record ascent sync completion")?;
    Ok(())
}

async fn sync_destination(
    state: &AppState,
    destination: &Destination,
    cancel: &CancellationToken,
) -> Result<DestinationStats> {
    let location = locations::get_by_name(&state.db, destination.location_name)
        .await
        .context("failed to look up sync location")?
        .with_context(|| format!("location {:?} is not bootstrapped", destination.location_name))?;
    let tz = time::resolve_timezone(&location.timezone);

    let kaya_location = retry_transient("kaya location", || {
        state.kaya.get_location(destination.kaya_slug)
    })
    .await
    .context("failed to resolve kaya location")?;

    let mut stats = DestinationStats::default();

    // The upstream models a destination as a root location plus one level
    // of sub-locations; climbs and ascents hang off each of them.
    let mut kaya_location_ids = vec![kaya_location.id.clone()];
    match retry_transient("kaya sub-locations", || {
        state.kaya.get_sub_locations(&kaya_location.id, 1)
    })
    .await
    {
        Ok(sub_locations) => {
            kaya_location_ids.extend(sub_locations.into_iter().map(|sub| sub.id));
        }
        Err(err) => {
            tracing::warn!(slug = destination.kaya_slug, error = %err, "sub-location listing failed, syncing root only");
            stats.pages_failed += 1;
        }
    }

    let mut climb_routes: HashMap<String, Uuid> = HashMap::new();
    for kaya_id in &kaya_location_ids {
        sync_climb_pages(state, &location, kaya_id, &mut climb_routes, &mut stats, cancel).await?;
    }
    for kaya_id in &kaya_location_ids {
        sync_ascent_pages(state, kaya_id, &climb_routes, tz, &mut stats, cancel).await?;
    }

    Ok(stats)
}

/// Climbs pair with catalog routes by name; unmatched climbs are counted
/// and skipped rather than minted as routes of their own.
async fn sync_climb_pages(
    state: &AppState,
    location: &locations::LocationRow,
    kaya_location_id: &str,
    climb_routes: &mut HashMap<String, Uuid>,
    stats: &mut DestinationStats,
    cancel: &CancellationToken,
) -> Result<()> {
    let mut page = 1u32;
    while page <= MAX_PAGES {
        if cancel.is_cancelled() {
            anyhow::bail!("cancelled");
        }
        let climbs = match retry_transient("kaya climbs", || {
            state.kaya.get_climbs(kaya_location_id, page)
        })
        .await
        {
            Ok(climbs) => climbs,
            Err(err) => {
                tracing::warn!(kaya_location_id, page, error = %err, "climbs page failed, advancing");
                stats.pages_failed += 1;
                page += 1;
                continue;
            }
        };

        for climb in &climbs.items {
            stats.climbs_seen += 1;
            let matched = routes::find_by_name_in_location(&state.db, location.id, &climb.name)
                .await
                .context("failed to match climb to route")?;
            if let Some(route) = matched {
                climb_routes.insert(climb.id.clone(), route.id);
                stats.climbs_matched += 1;
            }
        }

        if !climbs.has_more {
            break;
        }
        page += 1;
    }
    Ok(())
}

async fn sync_ascent_pages(
    state: &AppState,
    kaya_location_id: &str,
    climb_routes: &HashMap<String, Uuid>,
    tz: Tz,
    stats: &mut DestinationStats,
    cancel: &CancellationToken,
) -> Result<()> {
    let mut page = 1u32;
    while page <= MAX_PAGES {
        if cancel.is_cancelled() {
            anyhow::bail!("cancelled");
        }
        let ascents = match retry_transient("kaya ascents", || {
            state.kaya.get_ascents(kaya_location_id, page)
        })
        .await
        {
            Ok(ascents) => ascents,
            Err(err) => {
                tracing::warn!(kaya_location_id, page, error = %err, "ascents page failed, advancing");
                stats.pages_failed += 1;
                page += 1;
                continue;
            }
        };

        for ascent in &ascents.items {
            let Some(route_id) = climb_routes.get(&ascent.climb_id) else {
                continue;
            };
            let Some(climbed_at) = parse_ascent_date(ascent.date.as_deref(), tz) else {
                tracing::debug!(ascent = %ascent.id, "ascent without a usable date, skipping");
                continue;
            };
            ticks::upsert(
                &state.db,
                &ticks::TickUpsert {
                    route_id: *route_id,
                    external_tick_id: &ascent.id,
                    climber_name: ascent.climber_name.as_deref(),
                    style: ascent.style.as_deref(),
                    comment: ascent.comment.as_deref(),
                    climbed_at,
                },
            )
            .await
            .context("failed to upsert tick")?;
            stats.ticks_upserted += 1;
        }

        if !ascents.has_more {
            break;
        }
        page += 1;
    }
    Ok(())
}

/// Ascent dates arrive as bare dates or local datetimes; interpret them in
/// the location's civic timezone and normalize to UTC.
fn parse_ascent_date(raw: Option<&str>, tz: Tz) -> Option<DateTime<Utc>> {
    let trimmed = raw?.trim();
    if let Ok(parsed) = DateTime::parse_from_rfc3339(trimmed) {
        return Some(parsed.with_timezone(&Utc));
    }
    let naive = NaiveDateTime::parse_from_str(trimmed, "%Y-%m-%d %H:%M:%S")
        .or_else(|_| NaiveDateTime::parse_from_str(trimmed, "%Y-%m-%dT%H:%M:%S"))
        .ok()
        .or_else(|| {
            NaiveDate::parse_from_str(trimmed, "%Y-%m-%d")
                .ok()
                .and_then(|date| date.and_hms_opt(12, 0, 0))
        })?;
    Some(time::naive_local_to_utc(tz, naive))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tiers_order_freshness_windows() {
        assert!(PriorityTier::High.freshness_window() < PriorityTier::Medium.freshness_window());
        assert!(PriorityTier::Medium.freshness_window() < PriorityTier::Low.freshness_window());
    }

    #[test]
    fn ascent_dates_resolve_in_civic_time() {
        let tz = chrono_tz::America::Los_Angeles;
        let parsed = parse_ascent_date(Some("2026-07-04"), tz).unwrap();
        // Noon local on the Fourth is 19:00 UTC during PDT.
        assert_eq!(parsed.to_rfc3339(), "2026-07-04T19:00:00+00:00");

        let parsed = parse_ascent_date(Some("2026-07-04T18:30:00"), tz).unwrap();
        assert_eq!(parsed.to_rfc3339(), "2026-07-05T01:30:00+00:00");

        let parsed = parse_ascent_date(Some("2026-07-04T10:00:00Z"), tz).unwrap();
        assert_eq!(parsed.to_rfc3339(), "2026-07-04T10:00:00+00:00");

        assert!(parse_ascent_date(Some("yesterday"), tz).is_none());
        assert!(parse_ascent_date(None, tz).is_none());
    }
}
