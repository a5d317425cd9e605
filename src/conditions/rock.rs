use serde::{Deserialize, Serialize};

/// Rock groups this service knows drying characteristics for. Porosity hours
/// is the nominal time for a light soaking to leave the surface; the
/// wet-sensitive groups lose enough strength when saturated that climbing
/// them wet breaks holds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, utoipa::ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum RockGroup {
    Granite,
    Gneiss,
    Basalt,
    Limestone,
    Sandstone,
    Arkose,
    Graywacke,
    Schist,
    Unknown,
}

impl RockGroup {
    pub fn parse(raw: &str) -> RockGroup {
        match raw.trim().to_lowercase().as_str() {
            "granite" | "granodiorite" => RockGroup::Granite,
            "gneiss" => RockGroup::Gneiss,
            "basalt" | "andesite" => RockGroup::Basalt,
            "limestone" | "dolomite" => RockGroup::Limestone,
            "sandstone" => RockGroup::Sandstone,
            "arkose" => RockGroup::Arkose,
            "graywacke" | "greywacke" => RockGroup::Graywacke,
            "schist" => RockGroup::Schist,
            _ => RockGroup::Unknown,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            RockGroup::Granite => "granite",
            RockGroup::Gneiss => "gneiss",
            RockGroup::Basalt => "basalt",
            RockGroup::Limestone => "limestone",
            RockGroup::Sandstone => "sandstone",
            RockGroup::Arkose => "arkose",
            RockGroup::Graywacke => "graywacke",
            RockGroup::Schist => "schist",
            RockGroup::Unknown => "unknown",
        }
    }

    pub fn wet_sensitive(self) -> bool {
        matches!(
            self,
            RockGroup::Sandstone | RockGroup::Arkose | RockGroup::Graywacke
        )
    }

    /// Nominal drying hours for a light soaking, before environmental
    /// multipliers.
    pub fn default_porosity_hours(self) -> f64 {
        match self {
            RockGroup::Granite | RockGroup::Gneiss => 6.0,
            RockGroup::Basalt => 8.0,
            RockGroup::Limestone => 10.0,
            RockGroup::Schist => 9.0,
            RockGroup::Sandstone => 18.0,
            RockGroup::Arkose => 16.0,
            RockGroup::Graywacke => 14.0,
            RockGroup::Unknown => 10.0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sedimentary_groups_are_wet_sensitive() {
        assert!(RockGroup::Sandstone.wet_sensitive());
        assert!(RockGroup::Arkose.wet_sensitive());
        assert!(RockGroup::Graywacke.wet_sensitive());
        assert!(!RockGroup::Granite.wet_sensitive());
        assert!(!RockGroup::Unknown.wet_sensitive());
    }

    #[test]
    fn parse_tolerates_spelling_variants() {
        assert_eq!(RockGroup::parse("Greywacke"), RockGroup::Graywacke);
        assert_eq!(RockGroup::parse("GRANITE"), RockGroup::Granite);
        assert_eq!(RockGroup::parse("chalk"), RockGroup::Unknown);
    }

    #[test]
    fn wet_sensitive_rock_dries_slower_than_granite() {
        assert!(
            RockGroup::Sandstone.default_porosity_hours()
                > RockGroup::Granite.default_porosity_hours() * 2.0
        );
    }
}
