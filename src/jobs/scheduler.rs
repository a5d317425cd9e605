use chrono::{DateTime, Duration, Utc};
use futures::future::BoxFuture;
use rrule::RRuleSet;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

use crate::jobs::monitor;
use crate::services;
use crate::services::ascent_sync::PriorityTier;
use crate::state::AppState;

/// Job cadences are anchored rrules from a fixed wall-clock epoch, so a
/// restart inside a period lands on the same occurrence grid instead of
/// re-firing from boot time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Cadence {
    Hourly,
    Daily,
    Weekly,
    Monthly,
}

impl Cadence {
    fn rule_text(self) -> &'static str {
        match self {
            Cadence::Hourly => "DTSTART:20240101T000000Z\nRRULE:FREQ=HOURLY",
            Cadence::Daily => "DTSTART:20240101T000000Z\nRRULE:FREQ=DAILY",
            Cadence::Weekly => "DTSTART:20240101T000000Z\nRRULE:FREQ=WEEKLY",
            Cadence::Monthly => "DTSTART:20240101T000000Z\nRRULE:FREQ=MONTHLY",
        }
    }
}

/// First anchored occurrence strictly after `after`.
pub fn next_occurrence(cadence: Cadence, after: DateTime<Utc>) -> Option<DateTime<Utc>> {
    let rule: RRuleSet = cadence.rule_text().parse().ok()?;
    let after_tz = (after + Duration::seconds(1)).with_timezone(&rrule::Tz::UTC);
    rule.after(after_tz)
        .all(1)
        .dates
        .first()
        .map(|date| date.with_timezone(&Utc))
}

type JobFn = Arc<dyn Fn(AppState, CancellationToken) -> BoxFuture<'static, anyhow::Result<()>> + Send + Sync>;

pub struct ScheduledJob {
    pub name: &'static str,
    pub kind: &'static str,
    pub cadence: Cadence,
    run: JobFn,
}

fn job(
    name: &'static str,
    kind: &'static str,
    cadence: Cadence,
    run: JobFn,
) -> ScheduledJob {
    ScheduledJob {
        name,
        kind,
        cadence,
        run,
    }
}

pub fn default_jobs() -> Vec<ScheduledJob> {
    vec![
        job(
            services::weather_refresh::JOB_NAME,
            monitor::KIND_WEATHER,
            Cadence::Hourly,
            Arc::new(|state, cancel| Box::pin(services::weather_refresh::run(state, cancel))),
        ),
        job(
            services::weather_refresh::CLEANUP_JOB_NAME,
            monitor::KIND_MAINTENANCE,
            Cadence::Daily,
            Arc::new(|state, _cancel| Box::pin(services::weather_refresh::cleanup(state))),
        ),
        job(
            services::area_sync::JOB_NAME,
            monitor::KIND_INGESTION,
            Cadence::Weekly,
            Arc::new(|state, cancel| Box::pin(services::area_sync::run(state, cancel))),
        ),
        job(
            PriorityTier::High.job_name(),
            monitor::KIND_INGESTION,
            Cadence::Daily,
            Arc::new(|state, cancel| {
                Box::pin(services::ascent_sync::run(state, cancel, PriorityTier::High))
            }),
        ),
        job(
            PriorityTier::Medium.job_name(),
            monitor::KIND_INGESTION,
            Cadence::Weekly,
            Arc::new(|state, cancel| {
                Box::pin(services::ascent_sync::run(state, cancel, PriorityTier::Medium))
            }),
        ),
        job(
            PriorityTier::Low.job_name(),
            monitor::KIND_INGESTION,
            Cadence::Monthly,
            Arc::new(|state, cancel| {
                Box::pin(services::ascent_sync::run(state, cancel, PriorityTier::Low))
            }),
        ),
        job(
            services::priority::JOB_NAME,
            monitor::KIND_MAINTENANCE,
            Cadence::Daily,
            Arc::new(|state, _cancel| Box::pin(services::priority::run(state))),
        ),
        job(
            services::route_counts::JOB_NAME,
            monitor::KIND_MAINTENANCE,
            Cadence::Daily,
            Arc::new(|state, _cancel| Box::pin(services::route_counts::run(state))),
        ),
    ]
}

/// Cadence lookup for the monitoring summary's next-run column.
pub fn cadence_for(job_name: &str) -> Option<Cadence> {
    default_jobs()
        .into_iter()
        .find(|job| job.name == job_name)
        .map(|job| job.cadence)
}

pub struct Scheduler {
    state: AppState,
    jobs: Vec<ScheduledJob>,
    skip_window: Duration,
}

impl Scheduler {
    pub fn new(state: AppState) -> Self {
        let skip_window = Duration::seconds(state.config.startup_skip_window_seconds as i64);
        Self {
            state,
            jobs: default_jobs(),
            skip_window,
        }
    }

    pub fn start(self, cancel: CancellationToken) {
        for job in self.jobs {
            let state = self.state.clone();
            let skip_window = self.skip_window;
            let cancel = cancel.clone();
            tokio::spawn(run_job_loop(state, job, skip_window, cancel));
        }
    }
}

async fn run_job_loop(
    state: AppState,
    job: ScheduledJob,
    skip_window: Duration,
    cancel: CancellationToken,
) {
    // Startup-skip consults the monitor once; a store error runs the job
    // anyway (fail-open).
    let mut suppress_next = match state
        .monitor
        .was_job_completed_recently(job.name, skip_window)
        .await
    {
        Ok(recent) => recent,
        Err(err) => {
            tracing::warn!(job = job.name, error = %err, "startup-skip check failed, running anyway");
            false
        }
    };

    // Guards against overlapping runs of the same job; a tick that arrives
    // while the previous run still holds the lock is dropped, not queued.
    let overlap = tokio::sync::Mutex::new(());

    loop {
        let now = Utc::now();
        let Some(next) = next_occurrence(job.cadence, now) else {
            tracing::warn!(job = job.name, "no next occurrence, stopping job loop");
            return;
        };
        let wait = (next - now).to_std().unwrap_or_default();
        tokio::select! {
            _ = cancel.cancelled() => return,
            _ = tokio::time::sleep(wait) => {}
        }

        if suppress_next {
            tracing::info!(
                job = job.name,
                "skipping first tick, last completion is within the skip window"
            );
            suppress_next = false;
            continue;
        }

        let Ok(_guard) = overlap.try_lock() else {
            tracing::warn!(job = job.name, "previous run still in progress, dropping tick");
            continue;
        };

        let started = Utc::now();
        if let Err(err) = (job.run)(state.clone(), cancel.child_token()).await {
            tracing::warn!(job = job.name, error = %err, "scheduled run failed");
        }

        if let Some(first_missed) = next_occurrence(job.cadence, started) {
            if Utc::now() > first_missed {
                tracing::warn!(job = job.name, "run exceeded its period, dropping missed ticks");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn occurrences_align_to_the_anchor_not_boot_time() {
        let now = Utc.with_ymd_and_hms(2026, 8, 1, 10, 17, 23).unwrap();
        let next = next_occurrence(Cadence::Hourly, now).unwrap();
        assert_eq!(next, Utc.with_ymd_and_hms(2026, 8, 1, 11, 0, 0).unwrap());

        let next = next_occurrence(Cadence::Daily, now).unwrap();
        assert_eq!(next, Utc.with_ymd_and_hms(2026, 8, 2, 0, 0, 0).unwrap());
    }

    #[test]
    fn two_instants_in_one_period_share_the_next_occurrence() {
        // Restarting within a period must not double-fire.
        let boot_a = Utc.with_ymd_and_hms(2026, 8, 1, 0, 5, 0).unwrap();
        let boot_b = Utc.with_ymd_and_hms(2026, 8, 1, 17, 45, 0).unwrap();
        assert_eq!(
            next_occurrence(Cadence::Daily, boot_a),
            next_occurrence(Cadence::Daily, boot_b)
        );
    }

    #[test]
    fn weekly_fires_on_the_anchor_weekday() {
        // The 2024-01-01 anchor is a Monday.
        let now = Utc.with_ymd_and_hms(2026, 8, 1, 0, 0, 0).unwrap();
        let next = next_occurrence(Cadence::Weekly, now).unwrap();
        assert_eq!(next.format("%A").to_string(), "Monday");
        assert!(next > now);
        assert!(next - now <= Duration::weeks(1));
    }

    #[test]
    fn occurrence_is_strictly_after_the_reference() {
        let exactly_midnight = Utc.with_ymd_and_hms(2026, 8, 1, 0, 0, 0).unwrap();
        let next = next_occurrence(Cadence::Daily, exactly_midnight).unwrap();
        assert!(next > exactly_midnight);
    }

    #[test]
    fn every_default_job_has_a_distinct_name() {
        let jobs = default_jobs();
        let mut names: Vec<_> = jobs.iter().map(|job| job.name).collect();
        names.sort_unstable();
        names.dedup();
        assert_eq!(names.len(), jobs.len());
    }
}
