use chrono::{DateTime, NaiveDate, Utc};
use sqlx::PgPool;
use uuid::Uuid;

use crate::clients::{DailySun, HourlyPoint, WeatherBundle};

#[derive(Debug, Clone, sqlx::FromRow, serde::Serialize, utoipa::ToSchema)]
pub struct WeatherSampleRow {
    pub location_id: Uuid,
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

#[derive(Debug, Clone, sqlx::FromRow, serde::Serialize, utoipa::ToSchema)]
pub struct DailySunRow {
    pub location_id: Uuid,
    pub date: NaiveDate,
    pub sunrise: DateTime<Utc>,
    pub sunset: DateTime<Utc>,
}

const SAMPLE_COLUMNS: &str = "location_id, ts, temperature_f, feels_like_f, precip_in_hr, \
                              humidity_pct, wind_mph, wind_dir_deg, cloud_cover_pct, \
                              pressure_hpa, description, icon_code";

/// Persist one fetched bundle for a location. Hourly samples replace on
/// (location_id, ts); forecast rows are overwritten by fresher model runs
/// and eventually by observations as the window slides.
pub async fn store_bundle(
    db: &PgPool,
    location_id: Uuid,
    bundle: &WeatherBundle,
) -> Result<usize, sqlx::Error> {
    let mut tx = db.begin().await?;
    let mut written = 0usize;
    for point in bundle.historical.iter().chain(bundle.hourly.iter()) {
        upsert_sample(&mut tx, location_id, point).await?;
        written += 1;
    }
    for sun in &bundle.daily_sun {
        upsert_daily_sun(&mut tx, location_id, sun).await?;
    }
    tx.commit().await?;
    Ok(written)
}

async fn upsert_sample(
    tx: &mut sqlx::Transaction<'_, sqlx::Postgres>,
    location_id: Uuid,
    point: &HourlyPoint,
) -> Result<(), sqlx::Error> {
    sqlx::query(
        r#"
        INSERT INTO weather_samples (
            location_id, ts, temperature_f, feels_like_f, precip_in_hr, humidity_pct,
            wind_mph, wind_dir_deg, cloud_cover_pct, pressure_hpa, description, icon_code
        )
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12)
        ON CONFLICT (location_id, ts)
        DO UPDATE SET
            temperature_f = EXCLUDED.temperature_f,
            feels_like_f = EXCLUDED.feels_like_f,
            precip_in_hr = EXCLUDED.precip_in_hr,
            humidity_pct = EXCLUDED.humidity_pct,
            wind_mph = EXCLUDED.wind_mph,
            wind_dir_deg = EXCLUDED.wind_dir_deg,
            cloud_cover_pct = EXCLUDED.cloud_cover_pct,
            pressure_hpa = EXCLUDED.pressure_hpa,
            description = EXCLUDED.description,
            icon_code = EXCLUDED.icon_code
        "#,
    )
    .bind(location_id)
    .bind(point.ts)
    .bind(point.temperature_f)
    .bind(point.feels_like_f)
    .bind(point.precip_in_hr)
    .bind(point.humidity_pct)
    .bind(point.wind_mph)
    .bind(point.wind_dir_deg)
    .bind(point.cloud_cover_pct)
    .bind(point.pressure_hpa)
    .bind(&point.description)
    .bind(&point.icon_code)
    .execute(&mut **tx)
    .await?;
    Ok(())
}

async fn upsert_daily_sun(
    tx: &mut sqlx::Transaction<'_, sqlx::Postgres>,
    location_id: Uuid,
    sun: &DailySun,
) -> Result<(), sqlx::Error> {
    sqlx::query(
        r#"
        INSERT INTO daily_sun_times (location_id, date, sunrise, sunset)
        VALUES ($1, $2, $3, $4)
        ON CONFLICT (location_id, date)
        DO UPDATE SET sunrise = EXCLUDED.sunrise, sunset = EXCLUDED.sunset
        "#,
    )
    .bind(location_id)
    .bind(sun.date)
    .bind(sun.sunrise)
    .bind(sun.sunset)
    .execute(&mut **tx)
    .await?;
    Ok(())
}

pub async fn samples_in_range(
    db: &PgPool,
    location_id: Uuid,
    from: DateTime<Utc>,
    to: DateTime<Utc>,
) -> Result<Vec<WeatherSampleRow>, sqlx::Error> {
    sqlx::query_as(&format!(
        "SELECT {SAMPLE_COLUMNS} FROM weather_samples
         WHERE location_id = $1 AND ts >= $2 AND ts < $3
         ORDER BY ts"
    ))
    .bind(location_id)
    .bind(from)
    .bind(to)
    .fetch_all(db)
    .await
}

pub async fn latest_sample_at_or_before(
    db: &PgPool,
    location_id: Uuid,
    at: DateTime<Utc>,
) -> Result<Option<WeatherSampleRow>, sqlx::Error> {
    sqlx::query_as(&format!(
        "SELECT {SAMPLE_COLUMNS} FROM weather_samples
         WHERE location_id = $1 AND ts <= $2
         ORDER BY ts DESC
         LIMIT 1"
    ))
    .bind(location_id)
    .bind(at)
    .fetch_optional(db)
    .await
}

pub async fn daily_sun_in_range(
    db: &PgPool,
    location_id: Uuid,
    from: NaiveDate,
    to: NaiveDate,
) -> Result<Vec<DailySunRow>, sqlx::Error> {
    sqlx::query_as(
        r#"
        SELECT location_id, date, sunrise, sunset
        FROM daily_sun_times
        WHERE location_id = $1 AND date >= $2 AND date <= $3
        ORDER BY date
        "#,
    )
    .bind(location_id)
    .bind(from)
    .bind(to)
    .fetch_all(db)
    .await
}

/// Retention cleanup: samples and sun times older than the rolling window.
pub async fn delete_older_than(db: &PgPool, cutoff: DateTime<Utc>) -> Result<u64, sqlx::Error> {
    let samples = sqlx::query("DELETE FROM weather_samples WHERE ts < $1")
        .bind(cutoff)
        .execute(db)
        .await?;
    sqlx::query("DELETE FROM daily_sun_times WHERE date < $1")
        .bind(cutoff.date_naive())
        .execute(db)
        .await?;
    Ok(samples.rows_affected())
}
