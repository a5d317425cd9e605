use chrono::{DateTime, Duration, Utc};
use serde::Serialize;

use super::{sun, Aspect};
use crate::clients::HourlyPoint;

/// Precipitation below this rate is noise, not wetting.
pub const WETTING_THRESHOLD_IN_HR: f64 = 0.01;
const FREEZING_F: f64 = 32.0;
const CONFIDENCE_FLOOR: i32 = 30;
const FORECAST_HORIZON_HOURS: usize = 144;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, utoipa::ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum DryingState {
    Dry,
    Drying,
    Wet,
    VeryWet,
    Critical,
}

#[derive(Debug, Clone)]
pub struct DryingInputs<'a> {
    pub latitude: f64,
    pub longitude: f64,
    pub aspect: Aspect,
    /// Tree coverage as a fraction in [0, 1].
    pub tree_coverage: f64,
    pub coverage_estimated: bool,
    pub wet_sensitive: bool,
    pub porosity_hours: f64,
    pub rock_group: &'a str,
    /// Past seven days of hourly weather, oldest first.
    pub historical: &'a [HourlyPoint],
    /// Next six days of hourly weather, oldest first.
    pub forecast: &'a [HourlyPoint],
    pub now: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, utoipa::ToSchema)]
pub struct DryingPeriod {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    pub is_dry: bool,
    pub rain_amount_in: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, utoipa::ToSchema)]
pub struct DryingStatus {
    pub is_wet: bool,
    pub status: DryingState,
    pub hours_until_dry: f64,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_rain_timestamp: Option<DateTime<Utc>>,
    pub recent_rain_in: f64,
    pub sun_exposure_hours: f64,
    pub confidence_score: i32,
    pub forecast: Vec<DryingPeriod>,
}

fn wets(hour: &HourlyPoint) -> bool {
    hour.precip_in_hr > WETTING_THRESHOLD_IN_HR && hour.temperature_f > FREEZING_F
}

/// Monotonic piecewise-linear scaling of drying time with accumulated rain.
pub fn rain_scale(recent_rain_in: f64) -> f64 {
    const KNOTS: [(f64, f64); 5] = [
        (0.1, 0.5),
        (0.5, 1.0),
        (1.0, 1.4),
        (2.0, 1.9),
        (3.0, 2.5),
    ];
    if recent_rain_in <= KNOTS[0].0 {
        return KNOTS[0].1;
    }
    for window in KNOTS.windows(2) {
        let (x0, y0) = window[0];
        let (x1, y1) = window[1];
        if recent_rain_in <= x1 {
            return y0 + (recent_rain_in - x0) / (x1 - x0) * (y1 - y0);
        }
    }
    KNOTS[KNOTS.len() - 1].1
}

struct EnvironmentalFactors {
    multiplier: f64,
    sun_exposure_hours: f64,
}

fn environmental_factors(inputs: &DryingInputs, horizon: &[HourlyPoint]) -> EnvironmentalFactors {
    let sun_exposure_hours = sun::aspect_sun_hours(
        inputs.latitude,
        inputs.longitude,
        inputs.aspect,
        inputs.tree_coverage,
        horizon.iter().map(|hour| hour.ts),
    );

    if horizon.is_empty() {
        return EnvironmentalFactors {
            multiplier: 1.0,
            sun_exposure_hours,
        };
    }

    let count = horizon.len() as f64;
    let avg_wind = horizon.iter().map(|hour| hour.wind_mph).sum::<f64>() / count;
    let avg_humidity = horizon.iter().map(|hour| hour.humidity_pct).sum::<f64>() / count;
    let avg_cloud = horizon.iter().map(|hour| hour.cloud_cover_pct).sum::<f64>() / count;
    let avg_temp = horizon.iter().map(|hour| hour.temperature_f).sum::<f64>() / count;

    let sun_factor = (1.4 - sun_exposure_hours / 24.0).max(0.4);
    let wind_factor = (1.2 - avg_wind / 25.0).clamp(0.6, 1.2);
    let humidity_factor = (0.8 + avg_humidity / 200.0).clamp(0.8, 1.3);
    let cloud_factor = 1.0 + avg_cloud / 400.0;
    let temp_factor = if avg_temp <= 40.0 {
        1.5
    } else if avg_temp >= 70.0 {
        0.8
    } else {
        1.0
    };

    EnvironmentalFactors {
        multiplier: sun_factor * wind_factor * humidity_factor * cloud_factor * temp_factor,
        sun_exposure_hours,
    }
}

fn effective_hours(porosity_hours: f64, recent_rain_in: f64, multiplier: f64) -> f64 {
    porosity_hours * rain_scale(recent_rain_in) * multiplier
}

fn history_has_gaps(historical: &[HourlyPoint]) -> bool {
    if historical.len() < 6 * 24 {
        return true;
    }
    historical
        .windows(2)
        .any(|pair| pair[1].ts - pair[0].ts > Duration::hours(2))
}

pub fn compute_drying_status(inputs: &DryingInputs) -> DryingStatus {
    let horizon = &inputs.forecast[..inputs.forecast.len().min(FORECAST_HORIZON_HOURS)];
    let env = environmental_factors(inputs, horizon);

    // Step 1: most recent wetting hour. Snowfall does not wet for drying
    // purposes, so sub-freezing precipitation is skipped.
    let last_rain = inputs
        .historical
        .iter()
        .rev()
        .filter(|hour| hour.ts <= inputs.now)
        .find(|hour| wets(hour))
        .map(|hour| hour.ts);

    // Step 2: rain accumulated since that instant.
    let recent_rain_in: f64 = match last_rain {
        Some(since) => inputs
            .historical
            .iter()
            .filter(|hour| hour.ts >= since && hour.temperature_f > FREEZING_F)
            .map(|hour| hour.precip_in_hr)
            .sum(),
        None => 0.0,
    };

    // Steps 3–5.
    let mut wet_until = last_rain.map(|since| {
        since + hours_duration(effective_hours(inputs.porosity_hours, recent_rain_in, env.multiplier))
    });
    let hours_until_dry = wet_until
        .map(|until| ((until - inputs.now).num_seconds() as f64 / 3600.0).max(0.0))
        .unwrap_or(0.0);

    // Step 6: period segmentation over the forecast horizon. Forecast rain
    // re-anchors the wet window with the grown accumulation.
    let mut periods: Vec<DryingPeriod> = Vec::new();
    let mut running_rain_in = recent_rain_in;
    let mut current_start: Option<DateTime<Utc>> = None;
    let mut current_is_dry = true;
    let mut current_rain = 0.0;
    let mut last_ts = inputs.now;
    for hour in horizon {
        if wets(hour) {
            running_rain_in += hour.precip_in_hr;
            wet_until = Some(
                hour.ts
                    + hours_duration(effective_hours(
                        inputs.porosity_hours,
                        running_rain_in,
                        env.multiplier,
                    )),
            );
        }
        let is_dry = wet_until.map(|until| hour.ts >= until).unwrap_or(true);
        let rain = if hour.temperature_f > FREEZING_F {
            hour.precip_in_hr
        } else {
            0.0
        };
        match current_start {
            None => {
                current_start = Some(hour.ts);
                current_is_dry = is_dry;
                current_rain = rain;
            }
            Some(start) if is_dry != current_is_dry => {
                periods.push(DryingPeriod {
                    start,
                    end: hour.ts,
                    is_dry: current_is_dry,
                    rain_amount_in: current_rain,
                });
                current_start = Some(hour.ts);
                current_is_dry = is_dry;
                current_rain = rain;
            }
            Some(_) => current_rain += rain,
        }
        last_ts = hour.ts;
    }
    if let Some(start) = current_start {
        periods.push(DryingPeriod {
            start,
            end: last_ts + Duration::hours(1),
            is_dry: current_is_dry,
            rain_amount_in: current_rain,
        });
    }

    let status = classify(hours_until_dry, inputs.wet_sensitive);
    let message = message_for(status, hours_until_dry, last_rain.is_some(), inputs.rock_group);

    let mut confidence = 100i32;
    if inputs.aspect == Aspect::Unknown {
        confidence -= 20;
    }
    if inputs.coverage_estimated {
        confidence -= 15;
    }
    if history_has_gaps(inputs.historical) {
        confidence -= 10;
    }
    let forecast_days = (horizon.len() as i32 + 23) / 24;
    confidence -= 5 * (forecast_days - 3).max(0);
    confidence = confidence.max(CONFIDENCE_FLOOR);

    DryingStatus {
        is_wet: hours_until_dry > 0.0,
        status,
        hours_until_dry,
        message,
        last_rain_timestamp: last_rain,
        recent_rain_in,
        sun_exposure_hours: env.sun_exposure_hours,
        confidence_score: confidence,
        forecast: periods,
    }
}

fn hours_duration(hours: f64) -> Duration {
    Duration::seconds((hours * 3600.0) as i64)
}

fn classify(hours_until_dry: f64, wet_sensitive: bool) -> DryingState {
    if hours_until_dry <= 0.0 {
        return DryingState::Dry;
    }
    if wet_sensitive {
        return DryingState::Critical;
    }
    if hours_until_dry < 4.0 {
        DryingState::Drying
    } else if hours_until_dry < 24.0 {
        DryingState::Wet
    } else {
        DryingState::VeryWet
    }
}

fn message_for(status: DryingState, hours_until_dry: f64, saw_rain: bool, rock_group: &str) -> String {
    match status {
        DryingState::Dry if saw_rain => "Dry and climbable.".to_string(),
        DryingState::Dry => "Dry. No wetting rain in the past 7 days.".to_string(),
        DryingState::Drying => format!(
            "Drying out, roughly {:.0} h until climbable.",
            hours_until_dry.ceil()
        ),
        DryingState::Wet => format!("Wet. Expect about {:.0} h before it dries.", hours_until_dry.ceil()),
        DryingState::VeryWet => format!(
            "Soaked. Around {:.0} h before it dries.",
            hours_until_dry.ceil()
        ),
        DryingState::Critical => format!(
            "Wet {rock_group} is fragile, do not climb until fully dry (~{:.0} h).",
            hours_until_dry.ceil()
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use proptest::prelude::*;

    const LAT: f64 = 47.8213;
    const LON: f64 = -121.5601;

    fn fixture_now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 10, 15, 18, 0, 0).unwrap()
    }

    fn hour_at(ts: DateTime<Utc>, temperature_f: f64, precip_in_hr: f64) -> HourlyPoint {
        HourlyPoint {
            ts,
            temperature_f,
            feels_like_f: temperature_f,
            precip_in_hr,
            humidity_pct: 50.0,
            wind_mph: 5.0,
            wind_dir_deg: 180.0,
            cloud_cover_pct: 40.0,
            pressure_hpa: 1013.0,
            description: "fixture".to_string(),
            icon_code: "01d".to_string(),
        }
    }

    /// Seven days of dry 45°F history ending at `now`, with one rain hour.
    fn history_with_rain(now: DateTime<Utc>, rain_hours_ago: i64, rain_in: f64) -> Vec<HourlyPoint> {
        (0..7 * 24)
            .map(|offset| {
                let ts = now - Duration::hours(7 * 24 - 1 - offset);
                let precip = if now - ts == Duration::hours(rain_hours_ago) {
                    rain_in
                } else {
                    0.0
                };
                hour_at(ts, 45.0, precip)
            })
            .collect()
    }

    fn dry_forecast(now: DateTime<Utc>) -> Vec<HourlyPoint> {
        (1..=144)
            .map(|offset| hour_at(now + Duration::hours(offset), 60.0, 0.0))
            .collect()
    }

    fn granite_inputs<'a>(
        historical: &'a [HourlyPoint],
        forecast: &'a [HourlyPoint],
        now: DateTime<Utc>,
    ) -> DryingInputs<'a> {
        DryingInputs {
            latitude: LAT,
            longitude: LON,
            aspect: Aspect::S,
            tree_coverage: 0.10,
            coverage_estimated: false,
            wet_sensitive: false,
            porosity_hours: 6.0,
            rock_group: "granite",
            historical,
            forecast,
            now,
        }
    }

    #[test]
    fn recent_rain_leaves_granite_wet_but_drying_within_half_a_day() {
        let now = fixture_now();
        let historical = history_with_rain(now, 1, 0.5);
        let forecast = dry_forecast(now);
        let status = compute_drying_status(&granite_inputs(&historical, &forecast, now));

        assert!(status.is_wet);
        assert!(status.hours_until_dry > 0.0);
        assert!(status.hours_until_dry <= 12.0, "got {}", status.hours_until_dry);
        assert!((status.recent_rain_in - 0.5).abs() < 1e-9);
        assert_eq!(status.last_rain_timestamp, Some(now - Duration::hours(1)));

        // Forecast opens wet and flips dry within 12 hours.
        assert!(!status.forecast[0].is_dry);
        let flip = status
            .forecast
            .iter()
            .find(|period| period.is_dry)
            .expect("a dry period");
        assert!(flip.start - now <= Duration::hours(12));

        // Six-day horizon: only the beyond-day-3 penalty applies.
        assert_eq!(status.confidence_score, 85);
    }

    #[test]
    fn wet_sandstone_is_critical_and_dries_much_slower() {
        let now = fixture_now();
        let historical = history_with_rain(now, 1, 0.5);
        let forecast = dry_forecast(now);

        let granite = compute_drying_status(&granite_inputs(&historical, &forecast, now));

        let mut inputs = granite_inputs(&historical, &forecast, now);
        inputs.wet_sensitive = true;
        inputs.porosity_hours = 18.0;
        inputs.rock_group = "sandstone";
        let sandstone = compute_drying_status(&inputs);

        assert_eq!(sandstone.status, DryingState::Critical);
        assert!(sandstone.message.contains("do not climb"));
        assert!(sandstone.hours_until_dry >= granite.hours_until_dry * 2.5);
    }

    #[test]
    fn no_rain_in_window_reports_dry_with_old_rain_message() {
        let now = fixture_now();
        let historical: Vec<_> = (0..7 * 24)
            .map(|offset| hour_at(now - Duration::hours(7 * 24 - 1 - offset), 45.0, 0.0))
            .collect();
        let forecast = dry_forecast(now);
        let status = compute_drying_status(&granite_inputs(&historical, &forecast, now));

        assert!(!status.is_wet);
        assert_eq!(status.status, DryingState::Dry);
        assert_eq!(status.last_rain_timestamp, None);
        assert!(status.message.contains("7 days"));
        assert!(status.forecast.iter().all(|period| period.is_dry));
    }

    #[test]
    fn sub_freezing_precipitation_does_not_wet() {
        let now = fixture_now();
        let mut historical = history_with_rain(now, 1, 0.5);
        // Turn the rain hour into snow.
        let len = historical.len();
        historical[len - 2].temperature_f = 28.0;
        let forecast = dry_forecast(now);
        let status = compute_drying_status(&granite_inputs(&historical, &forecast, now));
        assert!(!status.is_wet);
        assert_eq!(status.last_rain_timestamp, None);
    }

    #[test]
    fn forecast_rain_creates_a_wet_period_after_a_dry_start() {
        let now = fixture_now();
        let historical: Vec<_> = (0..7 * 24)
            .map(|offset| hour_at(now - Duration::hours(7 * 24 - 1 - offset), 45.0, 0.0))
            .collect();
        let mut forecast = dry_forecast(now);
        forecast[48].precip_in_hr = 0.30;
        let status = compute_drying_status(&granite_inputs(&historical, &forecast, now));

        assert!(!status.is_wet);
        assert!(status.forecast[0].is_dry);
        let wet = status
            .forecast
            .iter()
            .find(|period| !period.is_dry)
            .expect("a wet period after forecast rain");
        assert_eq!(wet.start, forecast[48].ts);
        assert!(wet.rain_amount_in > 0.29);

        // Periods tile the horizon without holes.
        for pair in status.forecast.windows(2) {
            assert_eq!(pair[0].end, pair[1].start);
        }
    }

    #[test]
    fn unknown_aspect_and_estimated_coverage_lower_confidence() {
        let now = fixture_now();
        let historical = history_with_rain(now, 1, 0.5);
        let forecast = dry_forecast(now);
        let mut inputs = granite_inputs(&historical, &forecast, now);
        inputs.aspect = Aspect::Unknown;
        inputs.coverage_estimated = true;
        let status = compute_drying_status(&inputs);
        assert_eq!(status.confidence_score, 100 - 20 - 15 - 15);
    }

    #[test]
    fn confidence_never_drops_below_floor() {
        let now = fixture_now();
        // Gappy two-day history, unknown aspect, estimated coverage.
        let historical: Vec<_> = (0..48)
            .map(|offset| hour_at(now - Duration::hours(48 - offset), 45.0, 0.0))
            .collect();
        let forecast = dry_forecast(now);
        let mut inputs = granite_inputs(&historical, &forecast, now);
        inputs.aspect = Aspect::Unknown;
        inputs.coverage_estimated = true;
        let status = compute_drying_status(&inputs);
        assert!(status.confidence_score >= CONFIDENCE_FLOOR);
    }

    #[test]
    fn rain_scale_is_piecewise_linear() {
        assert!((rain_scale(0.05) - 0.5).abs() < 1e-9);
        assert!((rain_scale(0.5) - 1.0).abs() < 1e-9);
        assert!((rain_scale(0.75) - 1.2).abs() < 1e-9);
        assert!((rain_scale(1.0) - 1.4).abs() < 1e-9);
        assert!((rain_scale(2.0) - 1.9).abs() < 1e-9);
        assert!((rain_scale(5.0) - 2.5).abs() < 1e-9);
    }

    proptest! {
        // The drying computation sweeps 144 solar positions per case; a
        // smaller case count keeps the suite quick.
        #![proptest_config(ProptestConfig::with_cases(48))]

        #[test]
        fn more_rain_never_dries_faster(
            smaller in 0.02f64..1.5,
            extra in 0.0f64..1.5,
        ) {
            let now = fixture_now();
            let forecast = dry_forecast(now);

            let wet_a = history_with_rain(now, 2, smaller + extra);
            let wet_b = history_with_rain(now, 2, smaller);
            let status_a = compute_drying_status(&granite_inputs(&wet_a, &forecast, now));
            let status_b = compute_drying_status(&granite_inputs(&wet_b, &forecast, now));
            prop_assert!(status_a.hours_until_dry >= status_b.hours_until_dry - 1e-9);
        }

        #[test]
        fn rain_scale_is_monotonic(a in 0.0f64..4.0, b in 0.0f64..4.0) {
            let (low, high) = if a <= b { (a, b) } else { (b, a) };
            prop_assert!(rain_scale(low) <= rain_scale(high) + 1e-12);
        }
    }
}
