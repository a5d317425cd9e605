use crate::conditions::rock::RockGroup;
use crate::services::ascent_sync::PriorityTier;

/// One configured sync target: a bootstrap-created location, its social-
/// ascent slug, the catalog root of its route tree, the sync tier, and the
/// rock group assumed for routes that arrive without geology metadata.
///
/// The list is embedded rather than read from a data file so a deployed
/// binary and its configuration cannot drift apart.
#[derive(Debug, Clone, Copy)]
pub struct Destination {
    pub location_name: &'static str,
    pub kaya_slug: &'static str,
    pub catalog_root_area_id: i64,
    pub tier: PriorityTier,
    pub default_rock: RockGroup,
}

pub const DESTINATIONS: &[Destination] = &[
    Destination {
        location_name: "Gold Bar",
        kaya_slug: "gold-bar",
        catalog_root_area_id: 105805788,
        tier: PriorityTier::High,
        default_rock: RockGroup::Granite,
    },
    Destination {
        location_name: "Index",
        kaya_slug: "index",
        catalog_root_area_id: 108471374,
        tier: PriorityTier::High,
        default_rock: RockGroup::Granite,
    },
    Destination {
        location_name: "Leavenworth",
        kaya_slug: "leavenworth",
        catalog_root_area_id: 105790784,
        tier: PriorityTier::High,
        default_rock: RockGroup::Granite,
    },
    Destination {
        location_name: "Skykomish Valley",
        kaya_slug: "skykomish",
        catalog_root_area_id: 110869685,
        tier: PriorityTier::Medium,
        default_rock: RockGroup::Granite,
    },
    Destination {
        location_name: "Gold Bar Sandstone",
        kaya_slug: "gold-bar-sandstone",
        catalog_root_area_id: 119214925,
        tier: PriorityTier::Medium,
        default_rock: RockGroup::Sandstone,
    },
    Destination {
        location_name: "Vantage",
        kaya_slug: "vantage",
        catalog_root_area_id: 105788730,
        tier: PriorityTier::Low,
        default_rock: RockGroup::Basalt,
    },
    Destination {
        location_name: "Larrabee",
        kaya_slug: "larrabee",
        catalog_root_area_id: 113567295,
        tier: PriorityTier::Low,
        default_rock: RockGroup::Sandstone,
    },
];

pub fn for_tier(tier: PriorityTier) -> impl Iterator<Item = &'static Destination> {
    DESTINATIONS
        .iter()
        .filter(move |destination| destination.tier == tier)
}
