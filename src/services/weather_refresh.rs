use anyhow::{Context, Result};
use chrono::{Duration, Utc};
use serde_json::json;
use tokio_util::sync::CancellationToken;

use crate::clients::retry_transient;
use crate::jobs::monitor;
use crate::state::AppState;
use crate::store::{locations, weather};
use crate::time;

pub const JOB_NAME: &str = "weather_refresh";
pub const CLEANUP_JOB_NAME: &str = "weather_cleanup";

/// Fetch and persist a fresh weather bundle for every location. Per-location
/// fetch failures are counted and skipped; a store failure fails the run.
pub async fn run(state: AppState, cancel: CancellationToken) -> Result<()> {
    let targets = locations::list(&state.db)
        .await
        .context("failed to enumerate locations for weather refresh")?;

    let run = state
        .monitor
        .start_job(JOB_NAME, monitor::KIND_WEATHER, targets.len() as i64, json!({}))
        .await
        .context("failed to record weather refresh start")?;

    let mut processed = 0i64;
    let mut succeeded = 0i64;
    let mut failed = 0i64;

    for location in targets {
        if cancel.is_cancelled() {
            let _ = state.monitor.fail_job(run.id, "cancelled").await;
            return Ok(());
        }

        let tz = time::resolve_timezone(&location.timezone);
        let fetched = retry_transient("weather fetch", || {
            state.weather.fetch(location.latitude, location.longitude, tz)
        })
        .await;

        match fetched {
            Ok(bundle) => {
                let stored = weather::store_bundle(&state.db, location.id, &bundle).await;
                match stored {
                    Ok(written) => {
                        tracing::debug!(location = %location.name, samples = written, "weather snapshot stored");
                        succeeded += 1;
                    }
                    Err(err) => {
                        let _ = state
                            .monitor
                            .fail_job(run.id, &format!("store failure: {err}"))
                            .await;
                        return Err(err).context("failed to store weather bundle");
                    }
                }
            }
            Err(err) => {
                tracing::warn!(location = %location.name, error = %err, "weather fetch failed");
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
        .context("failed to record weather refresh completion")?;
    Ok(())
}

/// Drop weather samples that fell out of the rolling retention window.
pub async fn cleanup(state: AppState) -> Result<()> {
    let run = state
        .monitor
        .start_job(CLEANUP_JOB_NAME, monitor::KIND_MAINTENANCE, 1, json!({}))
        .await
        .context("failed to record weather cleanup start")?;

    let cutoff = Utc::now() - Duration::days(state.config.weather_retention_days as i64);
    match weather::delete_older_than(&state.db, cutoff).await {
        Ok(deleted) => {
            tracing::info!(deleted, %cutoff, "weather retention cleanup");
            let _ = state.monitor.update_progress(run.id, 1, 1, 0).await;
            state.monitor.complete_job(run.id).await?;
            Ok(())
        }
        Err(err) => {
            let _ = state
                .monitor
                .fail_job(run.id, &format!("store failure: {err}"))
                .await;
            Err(err).context("weather retention cleanup failed")
        }
    }
}
