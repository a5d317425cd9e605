pub mod area_catalog;
pub mod kaya;
pub mod open_meteo;

use chrono::{DateTime, NaiveDate, Utc};
use chrono_tz::Tz;
use futures::future::BoxFuture;
use rand::Rng;
use serde::Serialize;
use std::future::Future;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::Instant;

const RETRY_MAX_ATTEMPTS: u32 = 3;
const RETRY_BASE_DELAY_MS: u64 = 500;

#[derive(Debug)]
pub enum UpstreamError {
    /// Network failure, 5xx, or throttling. Retryable.
    Transient(String),
    /// Non-throttling 4xx or a structured upstream error. Not retried.
    Permanent(String),
    /// Payload did not decode into the expected shape.
    Decode(String),
    Cancelled,
}

impl std::fmt::Display for UpstreamError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            UpstreamError::Transient(message) => write!(f, "transient upstream error: {message}"),
            UpstreamError::Permanent(message) => write!(f, "upstream error: {message}"),
            UpstreamError::Decode(message) => write!(f, "upstream decode error: {message}"),
            UpstreamError::Cancelled => write!(f, "cancelled"),
        }
    }
}

impl std::error::Error for UpstreamError {}

impl From<reqwest::Error> for UpstreamError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_decode() {
            UpstreamError::Decode(err.to_string())
        } else {
            UpstreamError::Transient(err.to_string())
        }
    }
}

impl UpstreamError {
    pub fn from_status(status: reqwest::StatusCode, body: &str) -> Self {
        let detail = format!("HTTP {status}: {}", body.chars().take(200).collect::<String>());
        if status.is_server_error() || status == reqwest::StatusCode::TOO_MANY_REQUESTS {
            UpstreamError::Transient(detail)
        } else {
            UpstreamError::Permanent(detail)
        }
    }

    pub fn is_transient(&self) -> bool {
        matches!(self, UpstreamError::Transient(_))
    }
}

/// Retry an upstream call on transient failures only: base 500 ms, factor 2,
/// jitter ±20 %, at most 3 attempts.
pub async fn retry_transient<T, F, Fut>(op_name: &str, mut op: F) -> Result<T, UpstreamError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, UpstreamError>>,
{
    let mut delay_ms = RETRY_BASE_DELAY_MS;
    let mut attempt = 1;
    loop {
        match op().await {
            Ok(value) => return Ok(value),
            Err(err) if err.is_transient() && attempt < RETRY_MAX_ATTEMPTS => {
                let jitter = rand::thread_rng().gen_range(0.8..=1.2);
                let sleep_ms = (delay_ms as f64 * jitter) as u64;
                tracing::warn!(op = op_name, attempt, error = %err, "retrying after transient failure");
                tokio::time::sleep(Duration::from_millis(sleep_ms)).await;
                delay_ms *= 2;
                attempt += 1;
            }
            Err(err) => return Err(err),
        }
    }
}

/// Serializes requests to one upstream and enforces a minimum inter-request
/// delay. The lock is held across the sleep so callers are strictly ordered.
pub struct RateGate {
    min_delay: Duration,
    last_request: Mutex<Option<Instant>>,
}

impl RateGate {
    pub fn new(min_delay: Duration) -> Self {
        Self {
            min_delay,
            last_request: Mutex::new(None),
        }
    }

    pub async fn wait(&self) {
        let mut last = self.last_request.lock().await;
        if let Some(previous) = *last {
            let elapsed = previous.elapsed();
            if elapsed < self.min_delay {
                tokio::time::sleep(self.min_delay - elapsed).await;
            }
        }
        *last = Some(Instant::now());
    }
}

#[derive(Debug, Clone, Serialize, utoipa::ToSchema)]
pub struct HourlyPoint {
    pub ts: DateTime<Utc>,
    pub temperature_f: f64,
    pub feels_like_f: f64,
    pub precip_in_hr: f64,
    pub humidity_pct: f64,
    pub wind_mph: f64,
    pub wind_dir_deg: f64,
    pub cloud_cover_pct: f64,
    pub pressure_hpa: f64,
    pub description: String,
    pub icon_code: String,
}

#[derive(Debug, Clone, Serialize, utoipa::ToSchema)]
pub struct CurrentConditions {
    pub ts: DateTime<Utc>,
    pub temperature_f: f64,
    pub feels_like_f: f64,
    pub precip_in_hr: f64,
    pub humidity_pct: f64,
    pub wind_mph: f64,
    pub wind_dir_deg: f64,
    pub cloud_cover_pct: f64,
    pub pressure_hpa: f64,
    pub description: String,
    pub icon_code: String,
}

#[derive(Debug, Clone, Serialize, utoipa::ToSchema)]
pub struct DailySun {
    pub date: NaiveDate,
    pub sunrise: DateTime<Utc>,
    pub sunset: DateTime<Utc>,
}

/// Everything the drying model and the weather endpoints need for one
/// coordinate pair: current conditions, ≥6 days of hourly forecast, 7 days of
/// hourly history, and per-day sunrise/sunset.
#[derive(Debug, Clone, Serialize, utoipa::ToSchema)]
pub struct WeatherBundle {
    pub current: CurrentConditions,
    pub hourly: Vec<HourlyPoint>,
    pub historical: Vec<HourlyPoint>,
    pub daily_sun: Vec<DailySun>,
}

/// Weather access behind a trait so batch handlers and tests can substitute
/// a counting or canned implementation.
pub trait WeatherProvider: Send + Sync {
    fn fetch(&self, lat: f64, lon: f64, tz: Tz) -> BoxFuture<'_, Result<WeatherBundle, UpstreamError>>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[tokio::test]
    async fn rate_gate_enforces_minimum_spacing() {
        tokio::time::pause();
        let gate = RateGate::new(Duration::from_millis(500));
        let start = Instant::now();
        gate.wait().await;
        gate.wait().await;
        gate.wait().await;
        assert!(start.elapsed() >= Duration::from_millis(1000));
    }

    #[tokio::test]
    async fn retry_gives_up_after_three_transient_attempts() {
        tokio::time::pause();
        let calls = AtomicU32::new(0);
        let result: Result<(), _> = retry_transient("test", || {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Err(UpstreamError::Transient("boom".to_string())) }
        })
        .await;
        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn retry_does_not_repeat_permanent_failures() {
        let calls = AtomicU32::new(0);
        let result: Result<(), _> = retry_transient("test", || {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Err(UpstreamError::Permanent("bad request".to_string())) }
        })
        .await;
        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn status_classification() {
        let transient = UpstreamError::from_status(reqwest::StatusCode::TOO_MANY_REQUESTS, "slow down");
        assert!(transient.is_transient());
        let permanent = UpstreamError::from_status(reqwest::StatusCode::FORBIDDEN, "nope");
        assert!(!permanent.is_transient());
    }
}
