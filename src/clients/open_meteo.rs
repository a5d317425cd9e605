use chrono::{DateTime, NaiveDate, NaiveDateTime, TimeZone, Utc};
use chrono_tz::Tz;
use futures::future::BoxFuture;
use serde::Deserialize;
use std::time::Duration;

use super::{
    CurrentConditions, DailySun, HourlyPoint, UpstreamError, WeatherBundle, WeatherProvider,
};

const FORECAST_URL: &str = "https://api.open-meteo.com/v1/forecast";
const OWM_CURRENT_URL: &str = "https://api.openweathermap.org/data/2.5/weather";

const HOURLY_VARS: &str = "temperature_2m,apparent_temperature,precipitation,relative_humidity_2m,wind_speed_10m,wind_direction_10m,cloudcover,pressure_msl,weathercode";
const CURRENT_VARS: &str = "temperature_2m,apparent_temperature,precipitation,relative_humidity_2m,wind_speed_10m,wind_direction_10m,cloudcover,pressure_msl,weathercode";

pub struct OpenMeteoClient {
    http: reqwest::Client,
    openweathermap_api_key: Option<String>,
}

impl OpenMeteoClient {
    pub fn new(http: reqwest::Client, openweathermap_api_key: Option<String>) -> Self {
        Self {
            http,
            openweathermap_api_key,
        }
    }

    async fn fetch_forecast(&self, lat: f64, lon: f64) -> Result<ForecastPayload, UpstreamError> {
        let response = self
            .http
            .get(FORECAST_URL)
            .query(&[
                ("latitude", lat.to_string()),
                ("longitude", lon.to_string()),
                ("hourly", HOURLY_VARS.to_string()),
                ("daily", "sunrise,sunset".to_string()),
                // The HRRR series is the short-range high-resolution
                // precipitation model; entries are null beyond its ~60 h
                // horizon and for past hours it returns stale values.
                ("models", "best_match,gfs_hrrr".to_string()),
                ("past_days", "7".to_string()),
                ("forecast_days", "7".to_string()),
                ("timezone", "UTC".to_string()),
                ("temperature_unit", "fahrenheit".to_string()),
                ("wind_speed_unit", "mph".to_string()),
                ("precipitation_unit", "inch".to_string()),
            ])
            .timeout(Duration::from_secs(20))
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(UpstreamError::from_status(status, &body));
        }
        response
            .json::<ForecastPayload>()
            .await
            .map_err(|err| UpstreamError::Decode(format!("Open-Meteo forecast: {err}")))
    }

    async fn fetch_current(&self, lat: f64, lon: f64) -> Result<CurrentConditions, UpstreamError> {
        let response = self
            .http
            .get(FORECAST_URL)
            .query(&[
                ("latitude", lat.to_string()),
                ("longitude", lon.to_string()),
                ("current", CURRENT_VARS.to_string()),
                ("timezone", "UTC".to_string()),
                ("temperature_unit", "fahrenheit".to_string()),
                ("wind_speed_unit", "mph".to_string()),
                ("precipitation_unit", "inch".to_string()),
            ])
            .timeout(Duration::from_secs(12))
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(UpstreamError::from_status(status, &body));
        }
        let payload: CurrentPayload = response
            .json()
            .await
            .map_err(|err| UpstreamError::Decode(format!("Open-Meteo current: {err}")))?;
        let current = payload
            .current
            .ok_or_else(|| UpstreamError::Decode("Open-Meteo current block missing".to_string()))?;
        let ts = parse_open_meteo_hour(&current.time)
            .ok_or_else(|| UpstreamError::Decode(format!("bad current time {:?}", current.time)))?;
        let code = current.weathercode.unwrap_or(0) as u32;
        Ok(CurrentConditions {
            ts,
            temperature_f: current.temperature_2m.unwrap_or(0.0),
            feels_like_f: current
                .apparent_temperature
                .or(current.temperature_2m)
                .unwrap_or(0.0),
            precip_in_hr: current.precipitation.unwrap_or(0.0).max(0.0),
            humidity_pct: current.relative_humidity_2m.unwrap_or(0.0),
            wind_mph: current.wind_speed_10m.unwrap_or(0.0),
            wind_dir_deg: current.wind_direction_10m.unwrap_or(0.0),
            cloud_cover_pct: current.cloudcover.unwrap_or(0.0),
            pressure_hpa: current.pressure_msl.unwrap_or(0.0),
            description: describe_wmo(code).to_string(),
            icon_code: format!("{}d", icon_base_for_wmo(code)),
        })
    }

    async fn fetch_current_openweathermap(
        &self,
        lat: f64,
        lon: f64,
        api_key: &str,
    ) -> Result<CurrentConditions, UpstreamError> {
        let response = self
            .http
            .get(OWM_CURRENT_URL)
            .query(&[
                ("lat", lat.to_string()),
                ("lon", lon.to_string()),
                ("appid", api_key.to_string()),
                ("units", "imperial".to_string()),
            ])
            .timeout(Duration::from_secs(12))
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(UpstreamError::from_status(status, &body));
        }
        let payload: OwmCurrentPayload = response
            .json()
            .await
            .map_err(|err| UpstreamError::Decode(format!("OpenWeatherMap current: {err}")))?;
        Ok(owm_to_current(payload))
    }
}

impl WeatherProvider for OpenMeteoClient {
    // All series are requested in UTC, so the location's civic timezone is
    // not needed here; it matters to callers binning by calendar day.
    fn fetch(&self, lat: f64, lon: f64, _tz: Tz) -> BoxFuture<'_, Result<WeatherBundle, UpstreamError>> {
        Box::pin(async move {
            let payload = self.fetch_forecast(lat, lon).await?;
            let now = Utc::now();
            let (hourly, historical, daily_sun) = build_bundle(&payload, now)?;

            let current = match self.fetch_current(lat, lon).await {
                Ok(current) => current,
                Err(err) => {
                    let Some(api_key) = self.openweathermap_api_key.as_deref() else {
                        return Err(err);
                    };
                    tracing::warn!(error = %err, "Open-Meteo current failed, falling back to OpenWeatherMap");
                    self.fetch_current_openweathermap(lat, lon, api_key).await?
                }
            };

            Ok(WeatherBundle {
                current,
                hourly,
                historical,
                daily_sun,
            })
        })
    }
}

#[derive(Debug, Deserialize)]
pub(crate) struct ForecastPayload {
    hourly: Option<ForecastHourly>,
    daily: Option<ForecastDaily>,
}

/// Requesting two models suffixes every hourly variable with the model name;
/// the aliases keep single-model responses decodable too.
#[derive(Debug, Deserialize)]
struct ForecastHourly {
    time: Vec<String>,
    #[serde(rename = "temperature_2m_best_match", alias = "temperature_2m", default)]
    temperature_2m: Vec<Option<f64>>,
    #[serde(
        rename = "apparent_temperature_best_match",
        alias = "apparent_temperature",
        default
    )]
    apparent_temperature: Vec<Option<f64>>,
    #[serde(rename = "precipitation_best_match", alias = "precipitation", default)]
    precipitation: Vec<Option<f64>>,
    #[serde(rename = "precipitation_gfs_hrrr", default)]
    precipitation_short_range: Vec<Option<f64>>,
    #[serde(
        rename = "relative_humidity_2m_best_match",
        alias = "relative_humidity_2m",
        default
    )]
    relative_humidity_2m: Vec<Option<f64>>,
    #[serde(rename = "wind_speed_10m_best_match", alias = "wind_speed_10m", default)]
    wind_speed_10m: Vec<Option<f64>>,
    #[serde(
        rename = "wind_direction_10m_best_match",
        alias = "wind_direction_10m",
        default
    )]
    wind_direction_10m: Vec<Option<f64>>,
    #[serde(rename = "cloudcover_best_match", alias = "cloudcover", default)]
    cloudcover: Vec<Option<f64>>,
    #[serde(rename = "pressure_msl_best_match", alias = "pressure_msl", default)]
    pressure_msl: Vec<Option<f64>>,
    #[serde(rename = "weathercode_best_match", alias = "weathercode", default)]
    weathercode: Vec<Option<i64>>,
}

#[derive(Debug, Deserialize)]
struct ForecastDaily {
    time: Vec<String>,
    #[serde(default)]
    sunrise: Vec<Option<String>>,
    #[serde(default)]
    sunset: Vec<Option<String>>,
}

#[derive(Debug, Deserialize)]
struct CurrentPayload {
    current: Option<CurrentBlock>,
}

#[derive(Debug, Deserialize)]
struct CurrentBlock {
    time: String,
    #[serde(default)]
    temperature_2m: Option<f64>,
    #[serde(default)]
    apparent_temperature: Option<f64>,
    #[serde(default)]
    precipitation: Option<f64>,
    #[serde(default)]
    relative_humidity_2m: Option<f64>,
    #[serde(default)]
    wind_speed_10m: Option<f64>,
    #[serde(default)]
    wind_direction_10m: Option<f64>,
    #[serde(default)]
    cloudcover: Option<f64>,
    #[serde(default)]
    pressure_msl: Option<f64>,
    #[serde(default)]
    weathercode: Option<i64>,
}

#[derive(Debug, Deserialize)]
struct OwmCurrentPayload {
    #[serde(default)]
    weather: Vec<OwmWeatherEntry>,
    main: OwmMain,
    #[serde(default)]
    wind: Option<OwmWind>,
    #[serde(default)]
    clouds: Option<OwmClouds>,
    dt: i64,
}

#[derive(Debug, Deserialize)]
struct OwmWeatherEntry {
    description: String,
    icon: String,
}

#[derive(Debug, Deserialize)]
struct OwmMain {
    temp: f64,
    feels_like: f64,
    humidity: f64,
    pressure: f64,
}

#[derive(Debug, Deserialize)]
struct OwmWind {
    #[serde(default)]
    speed: f64,
    #[serde(default)]
    deg: f64,
}

#[derive(Debug, Deserialize)]
struct OwmClouds {
    #[serde(default)]
    all: f64,
}

fn owm_to_current(payload: OwmCurrentPayload) -> CurrentConditions {
    let entry = payload.weather.first();
    CurrentConditions {
        ts: Utc
            .timestamp_opt(payload.dt, 0)
            .single()
            .unwrap_or_else(Utc::now),
        temperature_f: payload.main.temp,
        feels_like_f: payload.main.feels_like,
        precip_in_hr: 0.0,
        humidity_pct: payload.main.humidity,
        wind_mph: payload.wind.as_ref().map(|wind| wind.speed).unwrap_or(0.0),
        wind_dir_deg: payload.wind.as_ref().map(|wind| wind.deg).unwrap_or(0.0),
        cloud_cover_pct: payload.clouds.as_ref().map(|clouds| clouds.all).unwrap_or(0.0),
        pressure_hpa: payload.main.pressure,
        description: entry
            .map(|entry| entry.description.clone())
            .unwrap_or_else(|| "unknown".to_string()),
        icon_code: entry
            .map(|entry| entry.icon.clone())
            .unwrap_or_else(|| "01d".to_string()),
    }
}

/// Split a forecast payload (past_days + forecast_days) into historical and
/// forecast hours around `now`, applying the precipitation model merge and
/// day/night icon suffixes.
pub(crate) fn build_bundle(
    payload: &ForecastPayload,
    now: DateTime<Utc>,
) -> Result<(Vec<HourlyPoint>, Vec<HourlyPoint>, Vec<DailySun>), UpstreamError> {
    let hourly = payload
        .hourly
        .as_ref()
        .ok_or_else(|| UpstreamError::Decode("Open-Meteo hourly block missing".to_string()))?;

    let mut daily_sun = Vec::new();
    if let Some(daily) = payload.daily.as_ref() {
        for (idx, raw_date) in daily.time.iter().enumerate() {
            let Ok(date) = NaiveDate::parse_from_str(raw_date.trim(), "%Y-%m-%d") else {
                continue;
            };
            let sunrise = daily
                .sunrise
                .get(idx)
                .and_then(|value| value.as_deref())
                .and_then(parse_open_meteo_hour);
            let sunset = daily
                .sunset
                .get(idx)
                .and_then(|value| value.as_deref())
                .and_then(parse_open_meteo_hour);
            if let (Some(sunrise), Some(sunset)) = (sunrise, sunset) {
                daily_sun.push(DailySun {
                    date,
                    sunrise,
                    sunset,
                });
            }
        }
    }

    let mut forecast = Vec::new();
    let mut historical = Vec::new();
    for (idx, raw_ts) in hourly.time.iter().enumerate() {
        let Some(ts) = parse_open_meteo_hour(raw_ts) else {
            continue;
        };
        let is_past = ts < now;

        let default_precip = value_at(&hourly.precipitation, idx);
        let short_precip = value_at(&hourly.precipitation_short_range, idx);
        // Short-range model wins inside its horizon; for past hours it serves
        // stale forecasts, so history sticks to the default series.
        let precip = if is_past {
            default_precip
        } else {
            short_precip.or(default_precip)
        }
        .unwrap_or(0.0)
        .max(0.0);

        let code = value_at(&hourly.weathercode, idx).unwrap_or(0).max(0) as u32;
        let temperature_f = value_at(&hourly.temperature_2m, idx).unwrap_or(0.0);
        let point = HourlyPoint {
            ts,
            temperature_f,
            feels_like_f: value_at(&hourly.apparent_temperature, idx).unwrap_or(temperature_f),
            precip_in_hr: precip,
            humidity_pct: value_at(&hourly.relative_humidity_2m, idx).unwrap_or(0.0),
            wind_mph: value_at(&hourly.wind_speed_10m, idx).unwrap_or(0.0),
            wind_dir_deg: value_at(&hourly.wind_direction_10m, idx).unwrap_or(0.0),
            cloud_cover_pct: value_at(&hourly.cloudcover, idx).unwrap_or(0.0),
            pressure_hpa: value_at(&hourly.pressure_msl, idx).unwrap_or(0.0),
            description: describe_wmo(code).to_string(),
            icon_code: icon_for_hour(code, ts, &daily_sun),
        };
        if is_past {
            historical.push(point);
        } else {
            forecast.push(point);
        }
    }

    Ok((forecast, historical, daily_sun))
}

fn value_at<T: Copy>(series: &[Option<T>], idx: usize) -> Option<T> {
    series.get(idx).copied().flatten()
}

fn parse_open_meteo_hour(raw: &str) -> Option<DateTime<Utc>> {
    let trimmed = raw.trim();
    if let Ok(parsed) = DateTime::parse_from_rfc3339(trimmed) {
        return Some(parsed.with_timezone(&Utc));
    }
    let naive = NaiveDateTime::parse_from_str(trimmed, "%Y-%m-%dT%H:%M").ok()?;
    Some(Utc.from_utc_datetime(&naive))
}

/// WMO weather code → two-character base icon code.
pub fn icon_base_for_wmo(code: u32) -> &'static str {
    match code {
        0 => "01",
        1 => "02",
        2 => "03",
        3 => "04",
        45 | 48 => "50",
        51 | 53 | 55 => "09",
        61 | 63 | 65 => "10",
        71..=77 => "13",
        80..=82 => "09",
        85 | 86 => "13",
        95 | 96 | 99 => "11",
        _ => "01",
    }
}

pub fn describe_wmo(code: u32) -> &'static str {
    match code {
        0 => "clear sky",
        1 => "mainly clear",
        2 => "partly cloudy",
        3 => "overcast",
        45 | 48 => "fog",
        51 | 53 | 55 => "drizzle",
        61 => "light rain",
        63 => "rain",
        65 => "heavy rain",
        66 | 67 => "freezing rain",
        71 | 73 | 75 | 77 => "snow",
        80 | 81 | 82 => "rain showers",
        85 | 86 => "snow showers",
        95 => "thunderstorm",
        96 | 99 => "thunderstorm with hail",
        _ => "unknown",
    }
}

/// An hour outside (sunrise, sunset) of its own calendar day gets the night
/// suffix. Hours on days without sun data default to daytime.
pub(crate) fn icon_for_hour(code: u32, ts: DateTime<Utc>, daily_sun: &[DailySun]) -> String {
    let date = ts.date_naive();
    let is_night = daily_sun
        .iter()
        .find(|sun| sun.date == date)
        .map(|sun| ts < sun.sunrise || ts > sun.sunset)
        .unwrap_or(false);
    let suffix = if is_night { 'n' } else { 'd' };
    format!("{}{suffix}", icon_base_for_wmo(code))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn sun_for(date: &str, sunrise_hour: u32, sunset_hour: u32) -> DailySun {
        let date = NaiveDate::parse_from_str(date, "%Y-%m-%d").unwrap();
        DailySun {
            date,
            sunrise: Utc.from_utc_datetime(&date.and_hms_opt(sunrise_hour, 0, 0).unwrap()),
            sunset: Utc.from_utc_datetime(&date.and_hms_opt(sunset_hour, 0, 0).unwrap()),
        }
    }

    #[test]
    fn icon_table_matches_wmo_classes() {
        assert_eq!(icon_base_for_wmo(0), "01");
        assert_eq!(icon_base_for_wmo(45), "50");
        assert_eq!(icon_base_for_wmo(55), "09");
        assert_eq!(icon_base_for_wmo(63), "10");
        assert_eq!(icon_base_for_wmo(75), "13");
        assert_eq!(icon_base_for_wmo(81), "09");
        assert_eq!(icon_base_for_wmo(86), "13");
        assert_eq!(icon_base_for_wmo(95), "11");
        assert_eq!(icon_base_for_wmo(1234), "01");
    }

    #[test]
    fn icon_mapping_is_idempotent_per_code_class() {
        // Codes sharing a base icon keep sharing it when re-derived.
        for code in [51u32, 53, 55, 80, 81, 82] {
            assert_eq!(icon_base_for_wmo(code), "09");
        }
        for code in [71u32, 73, 75, 77, 85, 86] {
            assert_eq!(icon_base_for_wmo(code), "13");
        }
    }

    #[test]
    fn night_suffix_outside_sun_window() {
        let sun = vec![sun_for("2026-08-01", 13, 23)];
        // 05:00 UTC is before the 13:00 UTC sunrise on that date.
        let night = Utc.with_ymd_and_hms(2026, 8, 1, 5, 0, 0).unwrap();
        assert_eq!(icon_for_hour(0, night, &sun), "01n");
        let day = Utc.with_ymd_and_hms(2026, 8, 1, 18, 0, 0).unwrap();
        assert_eq!(icon_for_hour(0, day, &sun), "01d");
    }

    #[test]
    fn bundle_merges_short_range_precipitation_for_forecast_only() {
        let payload: ForecastPayload = serde_json::from_value(serde_json::json!({
            "hourly": {
                "time": [
                    "2026-08-01T10:00", "2026-08-01T11:00",
                    "2026-08-01T13:00", "2026-08-01T14:00"
                ],
                "temperature_2m_best_match": [55.0, 56.0, 60.0, 61.0],
                "precipitation_best_match": [0.05, 0.02, 0.10, 0.20],
                "precipitation_gfs_hrrr": [0.50, 0.40, 0.30, null],
                "weathercode_best_match": [61, 61, 61, 61]
            },
            "daily": {
                "time": ["2026-08-01"],
                "sunrise": ["2026-08-01T12:43"],
                "sunset": ["2026-08-02T03:56"]
            }
        }))
        .unwrap();

        let now = Utc.with_ymd_and_hms(2026, 8, 1, 12, 0, 0).unwrap();
        let (forecast, historical, daily_sun) = build_bundle(&payload, now).unwrap();

        assert_eq!(historical.len(), 2);
        assert_eq!(forecast.len(), 2);
        assert_eq!(daily_sun.len(), 1);

        // Past hours ignore the short-range model entirely.
        assert!((historical[0].precip_in_hr - 0.05).abs() < 1e-9);
        assert!((historical[1].precip_in_hr - 0.02).abs() < 1e-9);
        // Forecast hours prefer the short-range model while it has values.
        assert!((forecast[0].precip_in_hr - 0.30).abs() < 1e-9);
        assert!((forecast[1].precip_in_hr - 0.20).abs() < 1e-9);
    }

    #[test]
    fn bundle_flags_night_hours_before_sunrise() {
        let payload: ForecastPayload = serde_json::from_value(serde_json::json!({
            "hourly": {
                "time": ["2026-08-01T05:00"],
                "temperature_2m_best_match": [50.0],
                "precipitation_best_match": [0.0],
                "weathercode_best_match": [0]
            },
            "daily": {
                "time": ["2026-08-01"],
                "sunrise": ["2026-08-01T12:43"],
                "sunset": ["2026-08-01T20:56"]
            }
        }))
        .unwrap();
        let now = Utc.with_ymd_and_hms(2026, 8, 1, 0, 0, 0).unwrap();
        let (forecast, _, _) = build_bundle(&payload, now).unwrap();
        assert_eq!(forecast[0].icon_code, "01n");
    }
}
