use anyhow::{Context, Result};
use serde_json::json;

use crate::jobs::monitor;
use crate::state::AppState;
use crate::store::routes;

pub const JOB_NAME: &str = "priority_recalc";

/// Daily pure-SQL pass that rescores routes into sync tiers from recent tick
/// activity.
pub async fn run(state: AppState) -> Result<()> {
    let run = state
        .monitor
        .start_job(JOB_NAME, monitor::KIND_MAINTENANCE, 1, json!({}))
        .await
        .context("failed to record priority recalculation start")?;

    match routes::recalculate_priority_tiers(&state.db).await {
        Ok(reassigned) => {
            tracing::info!(reassigned, "route priority tiers recalculated");
            let _ = state.monitor.update_progress(run.id, 1, 1, 0).await;
            state.monitor.complete_job(run.id).await?;
            Ok(())
        }
        Err(err) => {
            let _ = state
                .monitor
                .fail_job(run.id, &format!("store failure: {err}"))
                .await;
            Err(err).context("priority recalculation failed")
        }
    }
}
