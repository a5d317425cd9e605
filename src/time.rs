use chrono::{DateTime, Duration, NaiveDate, NaiveDateTime, TimeZone, Utc};
use chrono_tz::Tz;

/// Resolve a location's IANA timezone name, falling back to UTC for
/// unrecognized names rather than failing the whole computation.
pub fn resolve_timezone(name: &str) -> Tz {
    match name.trim().parse::<Tz>() {
        Ok(tz) => tz,
        Err(_) => {
            tracing::warn!(timezone = name, "unknown IANA timezone, falling back to UTC");
            Tz::UTC
        }
    }
}

/// Interpret a timezone-naive wall-clock instant in the given civic timezone
/// and normalize to UTC. DST ambiguity resolves to the earlier instance; a
/// nonexistent instant (spring-forward gap) shifts forward to the next valid
/// local minute.
pub fn naive_local_to_utc(tz: Tz, naive: NaiveDateTime) -> DateTime<Utc> {
    match tz.from_local_datetime(&naive) {
        chrono::LocalResult::Single(dt) => dt.with_timezone(&Utc),
        chrono::LocalResult::Ambiguous(a, b) => {
            let (a, b) = (a.with_timezone(&Utc), b.with_timezone(&Utc));
            if a <= b {
                a
            } else {
                b
            }
        }
        chrono::LocalResult::None => {
            for minutes in 1..=180 {
                let candidate = naive + Duration::minutes(minutes);
                if let chrono::LocalResult::Single(dt) = tz.from_local_datetime(&candidate) {
                    return dt.with_timezone(&Utc);
                }
            }
            Utc.from_utc_datetime(&naive)
        }
    }
}

/// Calendar date of an instant as seen in the location's civic timezone.
pub fn civic_date(tz: Tz, instant: DateTime<Utc>) -> NaiveDate {
    instant.with_timezone(&tz).date_naive()
}

pub fn celsius_to_fahrenheit(celsius: f64) -> f64 {
    celsius * 9.0 / 5.0 + 32.0
}

pub fn fahrenheit_to_celsius(fahrenheit: f64) -> f64 {
    (fahrenheit - 32.0) * 5.0 / 9.0
}

/// Strict `YYYY-MM-DD` parse for query-string dates.
pub fn parse_date_param(raw: &str) -> Result<NaiveDate, String> {
    NaiveDate::parse_from_str(raw.trim(), "%Y-%m-%d")
        .map_err(|_| format!("invalid date {raw:?}, expected YYYY-MM-DD"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    #[test]
    fn resolves_dst_gap_by_shifting_forward() {
        let tz = chrono_tz::US::Pacific;
        // 2026-03-08 02:30 does not exist in US/Pacific.
        let naive = NaiveDate::from_ymd_opt(2026, 3, 8)
            .unwrap()
            .and_hms_opt(2, 30, 0)
            .unwrap();
        let utc = naive_local_to_utc(tz, naive);
        assert_eq!(utc, Utc.with_ymd_and_hms(2026, 3, 8, 10, 30, 0).unwrap());
    }

    #[test]
    fn resolves_dst_ambiguity_to_earlier_instance() {
        let tz = chrono_tz::US::Pacific;
        // 2026-11-01 01:30 occurs twice; the earlier instance is PDT (UTC-7).
        let naive = NaiveDate::from_ymd_opt(2026, 11, 1)
            .unwrap()
            .and_hms_opt(1, 30, 0)
            .unwrap();
        let utc = naive_local_to_utc(tz, naive);
        assert_eq!(utc, Utc.with_ymd_and_hms(2026, 11, 1, 8, 30, 0).unwrap());
    }

    #[test]
    fn civic_date_crosses_midnight() {
        let tz = chrono_tz::US::Pacific;
        let instant = Utc.with_ymd_and_hms(2026, 7, 4, 5, 0, 0).unwrap();
        assert_eq!(
            civic_date(tz, instant),
            NaiveDate::from_ymd_opt(2026, 7, 3).unwrap()
        );
    }

    #[test]
    fn temperature_round_trip() {
        for value in [-40.0, 0.0, 32.0, 58.3, 100.0] {
            let round = fahrenheit_to_celsius(celsius_to_fahrenheit(value));
            assert!((round - value).abs() < 1e-6);
        }
    }

    #[test]
    fn rejects_malformed_dates() {
        assert!(parse_date_param("2026-02-30").is_err());
        assert!(parse_date_param("02/03/2026").is_err());
        assert!(parse_date_param("2026-7-4").is_err());
        assert!(parse_date_param("2026-07-04").is_ok());
    }

    #[test]
    fn unknown_timezone_falls_back_to_utc() {
        assert_eq!(resolve_timezone("Not/AZone"), Tz::UTC);
        assert_eq!(resolve_timezone("America/Los_Angeles"), chrono_tz::America::Los_Angeles);
    }
}
