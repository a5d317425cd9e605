pub mod area_sync;
pub mod ascent_sync;
pub mod destinations;
pub mod priority;
pub mod route_counts;
pub mod weather_refresh;
