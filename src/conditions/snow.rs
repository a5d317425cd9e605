use chrono::{DateTime, NaiveDate, Utc};
use chrono_tz::Tz;

const DENSITY_MIN: f64 = 0.08;
const DENSITY_MAX: f64 = 0.40;

/// Hourly inputs the snowpack simulation consumes.
#[derive(Debug, Clone, Copy)]
pub struct SnowHour {
    pub temperature_f: f64,
    pub precip_in: f64,
    pub wind_mph: f64,
    pub humidity_pct: f64,
}

/// Snowpack state carried hour to hour: snow water equivalent in inches and
/// bulk density as a fraction of water.
#[derive(Debug, Clone, Copy)]
pub struct SnowState {
    pub swe_in: f64,
    pub density: f64,
}

impl Default for SnowState {
    fn default() -> Self {
        Self {
            swe_in: 0.0,
            density: 0.10,
        }
    }
}

/// Fraction of precipitation falling as snow: all of it at or below 30°F,
/// none at or above 34°F, linear in between.
pub fn snow_fraction(temperature_f: f64) -> f64 {
    if temperature_f <= 30.0 {
        1.0
    } else if temperature_f >= 34.0 {
        0.0
    } else {
        (34.0 - temperature_f) / 4.0
    }
}

fn new_snow_density(temperature_f: f64) -> f64 {
    if temperature_f <= 20.0 {
        0.08
    } else if temperature_f <= 28.0 {
        0.12
    } else if temperature_f <= 32.0 {
        0.18
    } else {
        0.20
    }
}

fn compaction_rate(temperature_f: f64) -> f64 {
    if temperature_f < 20.0 {
        0.0003
    } else if temperature_f < 28.0 {
        0.0006
    } else if temperature_f < 32.0 {
        0.0012
    } else {
        0.0025
    }
}

impl SnowState {
    /// Advance the pack by one hour of weather.
    pub fn step(&mut self, hour: &SnowHour) {
        let temp = hour.temperature_f;
        let precip = hour.precip_in.max(0.0);
        let fraction = snow_fraction(temp);

        // Snowfall accumulates and its density blends into the pack by mass.
        let snow_water = precip * fraction;
        if snow_water > 0.0 {
            let fresh_density = new_snow_density(temp);
            let total = self.swe_in + snow_water;
            self.density =
                (self.swe_in * self.density + snow_water * fresh_density) / total;
            self.swe_in = total;
        }

        // Rain on an existing pack: most of it is retained, the pack warms,
        // densifies, and sheds an energy-melt term.
        if self.swe_in > 0.0 && fraction < 1.0 {
            let rain_portion = precip * (1.0 - fraction);
            if rain_portion > 0.0 {
                self.swe_in += 0.7 * rain_portion;
                self.density = (self.density + 0.03).min(0.35);
                let melt = rain_portion * (temp.max(32.0) - 32.0) * 0.01;
                self.swe_in = (self.swe_in - melt).max(0.0);
            }
        }

        // Temperature-index melt above 34°F; slow radiative loss 30–34°F.
        if self.swe_in > 0.0 {
            if temp > 34.0 {
                let delta = temp - 34.0;
                self.swe_in = (self.swe_in - (0.02 * delta + 0.0003 * delta * delta)).max(0.0);
            } else if temp > 30.0 {
                self.swe_in = (self.swe_in - 0.001 * (temp - 30.0)).max(0.0);
            }
        }

        // Wind-enhanced sublimation.
        if self.swe_in > 0.0 && hour.wind_mph > 10.0 {
            self.swe_in = (self.swe_in - (hour.wind_mph - 10.0) * 0.002).max(0.0);
        }

        // Dry-air sublimation.
        if self.swe_in > 0.0 && hour.humidity_pct < 60.0 {
            self.swe_in = (self.swe_in - (60.0 - hour.humidity_pct) * 0.0005).max(0.0);
        }

        // Settling compacts the pack only through hours without fresh
        // snowfall; new loft offsets it while snow is still falling, so an
        // ongoing cold storm can never lose depth to compaction.
        if self.swe_in > 0.0 && snow_water <= 0.0 {
            self.density = (self.density + compaction_rate(temp)).min(DENSITY_MAX);
        }
        self.density = self.density.clamp(DENSITY_MIN, DENSITY_MAX);
    }

    pub fn depth_in(&self) -> f64 {
        if self.swe_in <= 0.0 {
            0.0
        } else {
            self.swe_in / self.density
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, serde::Serialize, utoipa::ToSchema)]
pub struct DailySnowDepth {
    pub date: NaiveDate,
    pub max_depth_in: f64,
}

/// Run the hourly simulation and bin depths by the location's civic calendar
/// day, keeping each day's maximum so afternoon melt cannot erase a real
/// morning reading.
pub fn simulate_daily_max<I>(hours: I, tz: Tz) -> Vec<DailySnowDepth>
where
    I: IntoIterator<Item = (DateTime<Utc>, SnowHour)>,
{
    let mut state = SnowState::default();
    let mut days: Vec<DailySnowDepth> = Vec::new();
    for (ts, hour) in hours {
        state.step(&hour);
        let date = crate::time::civic_date(tz, ts);
        let depth = state.depth_in();
        match days.last_mut() {
            Some(last) if last.date == date => {
                last.max_depth_in = last.max_depth_in.max(depth);
            }
            _ => days.push(DailySnowDepth {
                date,
                max_depth_in: depth,
            }),
        }
    }
    days
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};
    use proptest::prelude::*;

    fn cold_storm_hour() -> SnowHour {
        SnowHour {
            temperature_f: 28.0,
            precip_in: 0.05,
            wind_mph: 5.0,
            humidity_pct: 90.0,
        }
    }

    fn warm_dry_hour() -> SnowHour {
        SnowHour {
            temperature_f: 50.0,
            precip_in: 0.0,
            wind_mph: 5.0,
            humidity_pct: 50.0,
        }
    }

    fn hourly_series(hours: &[SnowHour]) -> Vec<(DateTime<Utc>, SnowHour)> {
        let start = Utc.with_ymd_and_hms(2026, 1, 5, 0, 0, 0).unwrap();
        hours
            .iter()
            .enumerate()
            .map(|(idx, hour)| (start + Duration::hours(idx as i64), *hour))
            .collect()
    }

    #[test]
    fn phase_fraction_boundaries() {
        assert_eq!(snow_fraction(25.0), 1.0);
        assert_eq!(snow_fraction(30.0), 1.0);
        assert_eq!(snow_fraction(34.0), 0.0);
        assert_eq!(snow_fraction(40.0), 0.0);
        assert!((snow_fraction(32.0) - 0.5).abs() < 1e-9);
    }

    #[test]
    fn storm_builds_then_warm_spell_strips_the_pack() {
        let mut hours = vec![cold_storm_hour(); 72];
        hours.extend(vec![warm_dry_hour(); 48]);
        let days = simulate_daily_max(hourly_series(&hours), Tz::UTC);

        // Three storm days of increasing pack, then two melt days.
        assert_eq!(days.len(), 5);
        assert!(days[2].max_depth_in > days[0].max_depth_in);
        assert!(days[2].max_depth_in > 10.0, "day 3 max {}", days[2].max_depth_in);
        assert!(
            days[4].max_depth_in < 1.0,
            "pack should be gone by hour 120, got {}",
            days[4].max_depth_in
        );
    }

    #[test]
    fn light_storm_day_three_depth() {
        let hour = SnowHour {
            temperature_f: 28.0,
            precip_in: 0.009,
            wind_mph: 5.0,
            humidity_pct: 90.0,
        };
        let days = simulate_daily_max(hourly_series(&vec![hour; 72]), Tz::UTC);
        assert_eq!(days.len(), 3);
        assert!(
            days[2].max_depth_in > 3.0 && days[2].max_depth_in < 6.0,
            "day 3 max {}",
            days[2].max_depth_in
        );
    }

    #[test]
    fn rain_on_snow_densifies_and_melts() {
        let mut state = SnowState::default();
        for _ in 0..24 {
            state.step(&cold_storm_hour());
        }
        let before = state;
        state.step(&SnowHour {
            temperature_f: 38.0,
            precip_in: 0.10,
            wind_mph: 5.0,
            humidity_pct: 95.0,
        });
        assert!(state.density > before.density);
        assert!(state.depth_in() < before.depth_in());
    }

    #[test]
    fn daily_max_keeps_morning_peak() {
        // Cold snowy night, warm afternoon: the day's bin must record the
        // pre-melt peak, not the end-of-day remnant.
        let mut hours = vec![cold_storm_hour(); 8];
        hours.extend(vec![warm_dry_hour(); 16]);
        let days = simulate_daily_max(hourly_series(&hours), Tz::UTC);
        assert_eq!(days.len(), 1);
        let mut state = SnowState::default();
        for hour in &hours {
            state.step(hour);
        }
        assert!(days[0].max_depth_in > state.depth_in());
    }

    proptest! {
        #[test]
        fn swe_and_density_stay_bounded(
            temps in proptest::collection::vec(-20.0f64..80.0, 1..200),
            precip in proptest::collection::vec(0.0f64..0.5, 1..200),
            wind in proptest::collection::vec(0.0f64..60.0, 1..200),
            humidity in proptest::collection::vec(0.0f64..100.0, 1..200),
        ) {
            let mut state = SnowState::default();
            let len = temps.len().min(precip.len()).min(wind.len()).min(humidity.len());
            for idx in 0..len {
                state.step(&SnowHour {
                    temperature_f: temps[idx],
                    precip_in: precip[idx],
                    wind_mph: wind[idx],
                    humidity_pct: humidity[idx],
                });
                prop_assert!(state.swe_in >= 0.0);
                prop_assert!(state.density >= DENSITY_MIN - 1e-9);
                prop_assert!(state.density <= DENSITY_MAX + 1e-9);
            }
        }

        #[test]
        fn cold_snowfall_strictly_accumulates(
            temps in proptest::collection::vec(0.0f64..28.0, 1..100),
            precip in proptest::collection::vec(0.001f64..0.3, 1..100),
        ) {
            let mut state = SnowState::default();
            let mut previous_swe = 0.0;
            let mut previous_depth = 0.0;
            let len = temps.len().min(precip.len());
            for idx in 0..len {
                state.step(&SnowHour {
                    temperature_f: temps[idx],
                    precip_in: precip[idx],
                    wind_mph: 0.0,
                    humidity_pct: 80.0,
                });
                prop_assert!(state.swe_in > previous_swe);
                prop_assert!(state.depth_in() >= previous_depth - 1e-9);
                previous_swe = state.swe_in;
                previous_depth = state.depth_in();
            }
        }
    }
}
