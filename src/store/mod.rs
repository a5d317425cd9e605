pub mod areas;
pub mod jobs;
pub mod locations;
pub mod routes;
pub mod sync;
pub mod ticks;
pub mod weather;
