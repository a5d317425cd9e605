pub mod drying;
pub mod rock;
pub mod snow;
pub mod sun;

use serde::{Deserialize, Serialize};

/// Compass direction a climbing surface faces. Unknown is a first-class
/// value: remote data frequently omits it and the drying model substitutes a
/// neutral due-south default.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, utoipa::ToSchema)]
pub enum Aspect {
    N,
    NE,
    E,
    SE,
    S,
    SW,
    W,
    NW,
    Unknown,
}

impl Aspect {
    pub const ALL_KNOWN: [Aspect; 8] = [
        Aspect::N,
        Aspect::NE,
        Aspect::E,
        Aspect::SE,
        Aspect::S,
        Aspect::SW,
        Aspect::W,
        Aspect::NW,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Aspect::N => "N",
            Aspect::NE => "NE",
            Aspect::E => "E",
            Aspect::SE => "SE",
            Aspect::S => "S",
            Aspect::SW => "SW",
            Aspect::W => "W",
            Aspect::NW => "NW",
            Aspect::Unknown => "Unknown",
        }
    }

    pub fn parse(raw: &str) -> Aspect {
        match raw.trim().to_uppercase().as_str() {
            "N" | "NORTH" => Aspect::N,
            "NE" | "NORTHEAST" => Aspect::NE,
            "E" | "EAST" => Aspect::E,
            "SE" | "SOUTHEAST" => Aspect::SE,
            "S" | "SOUTH" => Aspect::S,
            "SW" | "SOUTHWEST" => Aspect::SW,
            "W" | "WEST" => Aspect::W,
            "NW" | "NORTHWEST" => Aspect::NW,
            _ => Aspect::Unknown,
        }
    }

    /// Facing direction in degrees (0 = N, clockwise). Unknown has none.
    pub fn degrees(self) -> Option<f64> {
        match self {
            Aspect::N => Some(0.0),
            Aspect::NE => Some(45.0),
            Aspect::E => Some(90.0),
            Aspect::SE => Some(135.0),
            Aspect::S => Some(180.0),
            Aspect::SW => Some(225.0),
            Aspect::W => Some(270.0),
            Aspect::NW => Some(315.0),
            Aspect::Unknown => None,
        }
    }

    pub fn from_degrees(degrees: f64) -> Aspect {
        if !degrees.is_finite() {
            return Aspect::Unknown;
        }
        let normalized = degrees.rem_euclid(360.0);
        let sector = ((normalized + 22.5) / 45.0).floor() as usize % 8;
        Aspect::ALL_KNOWN[sector]
    }
}

/// Smallest absolute difference between two bearings, in [0, 180].
pub fn angular_difference(a_deg: f64, b_deg: f64) -> f64 {
    let diff = (a_deg - b_deg).rem_euclid(360.0);
    if diff > 180.0 {
        360.0 - diff
    } else {
        diff
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn parse_accepts_long_and_short_names() {
        assert_eq!(Aspect::parse("south"), Aspect::S);
        assert_eq!(Aspect::parse("NE"), Aspect::NE);
        assert_eq!(Aspect::parse("upside down"), Aspect::Unknown);
    }

    #[test]
    fn angular_difference_wraps() {
        assert_eq!(angular_difference(350.0, 10.0), 20.0);
        assert_eq!(angular_difference(0.0, 180.0), 180.0);
        assert_eq!(angular_difference(90.0, 90.0), 0.0);
    }

    proptest! {
        #[test]
        fn compass_round_trip_within_half_sector(degrees in 0.0f64..360.0) {
            let aspect = Aspect::from_degrees(degrees);
            let back = aspect.degrees().unwrap();
            prop_assert!(angular_difference(degrees, back) <= 22.5);
        }
    }
}
