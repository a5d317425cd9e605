use anyhow::{Context, Result};
use serde_json::json;

use crate::jobs::monitor;
use crate::state::AppState;
use crate::store::routes;

pub const JOB_NAME: &str = "route_counts";

/// Refresh the denormalized per-area active-route counts the activity
/// endpoints read.
pub async fn run(state: AppState) -> Result<()> {
    let run = state
        .monitor
        .start_job(JOB_NAME, monitor::KIND_MAINTENANCE, 1, json!({}))
        .await
        .context("failed to record route count refresh start")?;

    match routes::refresh_route_counts(&state.db).await {
        Ok(updated) => {
            tracing::info!(updated, "area route counts refreshed");
            let _ = state.monitor.update_progress(run.id, 1, 1, 0).await;
            state.monitor.complete_job(run.id).await?;
            Ok(())
        }
        Err(err) => {
            let _ = state
                .monitor
                .fail_job(run.id, &format!("store failure: {err}"))
                .await;
            Err(err).context("route count refresh failed")
        }
    }
}
