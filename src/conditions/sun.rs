use chrono::{DateTime, Duration, NaiveDate, Utc};
use chrono_tz::Tz;

use super::{angular_difference, Aspect};

/// Azimuth is measured from true north, clockwise; elevation from the
/// horizon. Derived from the mean-longitude / mean-anomaly / obliquity model
/// (low-precision solar ephemeris, good to roughly a hundredth of a degree
/// over the decades this service cares about).
#[derive(Debug, Clone, Copy)]
pub struct SunPosition {
    pub azimuth_deg: f64,
    pub elevation_deg: f64,
}

const UNIX_EPOCH_JD: f64 = 2440587.5;
const J2000_JD: f64 = 2451545.0;

pub fn sun_position(lat: f64, lon: f64, at: DateTime<Utc>) -> SunPosition {
    let jd = UNIX_EPOCH_JD + at.timestamp() as f64 / 86_400.0;
    let n = jd - J2000_JD;

    // Mean longitude and mean anomaly of the sun, degrees.
    let mean_longitude = (280.460 + 0.985_647_4 * n).rem_euclid(360.0);
    let mean_anomaly = (357.528 + 0.985_600_3 * n).rem_euclid(360.0).to_radians();

    // Ecliptic longitude with the equation-of-center correction.
    let ecliptic_longitude = (mean_longitude
        + 1.915 * mean_anomaly.sin()
        + 0.020 * (2.0 * mean_anomaly).sin())
    .rem_euclid(360.0)
    .to_radians();

    let obliquity = (23.439 - 0.000_000_4 * n).to_radians();

    let right_ascension = (obliquity.cos() * ecliptic_longitude.sin())
        .atan2(ecliptic_longitude.cos());
    let declination = (obliquity.sin() * ecliptic_longitude.sin()).asin();

    // Local sidereal time → hour angle.
    let gmst_deg = (280.460_618_37 + 360.985_647_366_29 * n).rem_euclid(360.0);
    let lst = (gmst_deg + lon).to_radians();
    let hour_angle = lst - right_ascension;

    let lat_rad = lat.to_radians();
    let elevation = (lat_rad.sin() * declination.sin()
        + lat_rad.cos() * declination.cos() * hour_angle.cos())
    .asin();

    // atan2 form gives azimuth from south, westward positive; rotate to a
    // north-referenced clockwise bearing.
    let azimuth_south = hour_angle
        .sin()
        .atan2(hour_angle.cos() * lat_rad.sin() - declination.tan() * lat_rad.cos());
    let azimuth_deg = (azimuth_south.to_degrees() + 180.0).rem_euclid(360.0);

    SunPosition {
        azimuth_deg,
        elevation_deg: elevation.to_degrees(),
    }
}

/// Sunrise and sunset for the location's civic calendar day, found by
/// scanning elevation at 30-minute steps across a 30-hour window from local
/// midnight. The wide window keeps high-latitude summer sunsets that land in
/// the next UTC day inside the scan. Returns None when the sun never crosses
/// the horizon (polar day/night).
pub fn sunrise_sunset(
    lat: f64,
    lon: f64,
    date: NaiveDate,
    tz: Tz,
) -> Option<(DateTime<Utc>, DateTime<Utc>)> {
    let midnight_local = date.and_hms_opt(0, 0, 0)?;
    let start = crate::time::naive_local_to_utc(tz, midnight_local);
    let steps = 60; // 30 h at 30-minute resolution

    let mut sunrise = None;
    let mut previous = sun_position(lat, lon, start).elevation_deg;
    for step in 1..=steps {
        let at = start + Duration::minutes(30 * step);
        let elevation = sun_position(lat, lon, at).elevation_deg;
        if sunrise.is_none() && previous <= 0.0 && elevation > 0.0 {
            sunrise = Some(interpolate_crossing(at - Duration::minutes(30), previous, at, elevation));
        } else if let Some(sunrise_at) = sunrise {
            if previous > 0.0 && elevation <= 0.0 {
                let sunset_at =
                    interpolate_crossing(at - Duration::minutes(30), previous, at, elevation);
                return Some((sunrise_at, sunset_at));
            }
        }
        previous = elevation;
    }
    None
}

fn interpolate_crossing(
    before: DateTime<Utc>,
    elevation_before: f64,
    after: DateTime<Utc>,
    elevation_after: f64,
) -> DateTime<Utc> {
    let span = elevation_after - elevation_before;
    if span.abs() < f64::EPSILON {
        return before;
    }
    let fraction = (-elevation_before / span).clamp(0.0, 1.0);
    let seconds = (after - before).num_seconds() as f64 * fraction;
    before + Duration::seconds(seconds as i64)
}

/// Aspect-weighted sun hours over a sequence of hourly instants: for each
/// hour with the sun above the horizon and within ±90° of the facing
/// direction, accumulate `cos(Δazimuth) · (1 − tree_cover)`. Unknown aspects
/// use due south as a neutral default.
pub fn aspect_sun_hours(
    lat: f64,
    lon: f64,
    aspect: Aspect,
    tree_coverage: f64,
    hours: impl Iterator<Item = DateTime<Utc>>,
) -> f64 {
    let facing = aspect.degrees().unwrap_or(180.0);
    let openness = (1.0 - tree_coverage).clamp(0.0, 1.0);
    let mut total = 0.0;
    for at in hours {
        let position = sun_position(lat, lon, at);
        if position.elevation_deg <= 0.0 {
            continue;
        }
        let delta = angular_difference(position.azimuth_deg, facing);
        if delta <= 90.0 {
            total += delta.to_radians().cos().max(0.0) * openness;
        }
    }
    total
}

/// Hourly instants of a civic day, for exposure sums that follow the
/// location's clock rather than UTC.
pub fn day_hours(date: NaiveDate, tz: Tz) -> impl Iterator<Item = DateTime<Utc>> {
    let midnight = date.and_hms_opt(0, 0, 0).expect("midnight exists");
    let start = crate::time::naive_local_to_utc(tz, midnight);
    (0..24).map(move |hour| start + Duration::hours(hour))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use proptest::prelude::*;

    fn summer_day() -> NaiveDate {
        NaiveDate::from_ymd_opt(2026, 6, 21).unwrap()
    }

    fn noon_utc(date: NaiveDate) -> DateTime<Utc> {
        Utc.from_utc_datetime(&date.and_hms_opt(12, 0, 0).unwrap())
    }

    #[test]
    fn equinox_noon_elevation_matches_latitude() {
        // At the March equinox the solar declination is ~0°, so the noon
        // elevation at longitude 0 is close to 90° − |lat|.
        let date = NaiveDate::from_ymd_opt(2026, 3, 20).unwrap();
        let noon = noon_utc(date);
        for lat in [0.0, 30.0, 47.8, -33.0] {
            let position = sun_position(lat, 0.0, noon);
            let expected = 90.0 - lat.abs();
            assert!(
                (position.elevation_deg - expected).abs() < 2.0,
                "lat {lat}: got {}, expected ≈{expected}",
                position.elevation_deg
            );
        }
    }

    #[test]
    fn northern_noon_sun_bears_south() {
        let noon = noon_utc(summer_day());
        let position = sun_position(47.8, 0.0, noon);
        assert!(
            angular_difference(position.azimuth_deg, 180.0) < 15.0,
            "azimuth {}",
            position.azimuth_deg
        );
    }

    #[test]
    fn sunrise_precedes_sunset_at_mid_latitudes() {
        let (sunrise, sunset) =
            sunrise_sunset(47.8213, -121.5601, summer_day(), chrono_tz::America::Los_Angeles)
                .expect("sun rises at 47.8°N");
        assert!(sunrise < sunset);
        let daylight = sunset - sunrise;
        assert!(daylight > Duration::hours(14), "daylight {daylight}");
        assert!(daylight < Duration::hours(18), "daylight {daylight}");
    }

    #[test]
    fn south_facing_collects_more_sun_than_north_facing() {
        let hours: Vec<_> = day_hours(summer_day(), chrono_tz::America::Los_Angeles).collect();
        let south = aspect_sun_hours(47.8, -121.56, Aspect::S, 0.0, hours.iter().copied());
        let north = aspect_sun_hours(47.8, -121.56, Aspect::N, 0.0, hours.iter().copied());
        assert!(
            south > north,
            "south {south} should exceed north {north} at 47.8°N in summer"
        );
    }

    #[test]
    fn tree_cover_attenuates_exposure() {
        let hours: Vec<_> = day_hours(summer_day(), chrono_tz::America::Los_Angeles).collect();
        let open = aspect_sun_hours(47.8, -121.56, Aspect::S, 0.0, hours.iter().copied());
        let shaded = aspect_sun_hours(47.8, -121.56, Aspect::S, 0.6, hours.iter().copied());
        assert!((shaded - open * 0.4).abs() < 1e-9);
    }

    proptest! {
        #[test]
        fn sunrise_before_sunset_below_polar_circles(
            lat in -60.0f64..60.0,
            day_offset in 0i64..365,
        ) {
            let date = NaiveDate::from_ymd_opt(2026, 1, 1).unwrap()
                + Duration::days(day_offset);
            if let Some((sunrise, sunset)) = sunrise_sunset(lat, 0.0, date, Tz::UTC) {
                prop_assert!(sunrise < sunset);
            } else {
                // Below |66.5°| the scan must always find a crossing.
                prop_assert!(false, "no sunrise found at lat {lat} on {date}");
            }
        }
    }
}
