use std::sync::Arc;

use chrono_tz::Tz;
use futures::future::BoxFuture;

use crate::clients::area_catalog::AreaCatalogClient;
use crate::clients::kaya::KayaClient;
use crate::clients::{UpstreamError, WeatherBundle, WeatherProvider};
use crate::config::Config;
use crate::db;
use crate::jobs::JobMonitor;
use crate::state::AppState;

pub fn test_config() -> Config {
    Config {
        database_url: "postgresql://postgres@localhost/postgres".to_string(),
        area_catalog_base_url: "http://127.0.0.1:9/catalog".to_string(),
        kaya_base_url: "http://127.0.0.1:9/graphql".to_string(),
        kaya_auth_token: None,
        openweathermap_api_key: None,
        enable_ingestion: false,
        startup_skip_window_seconds: 3600,
        weather_retention_days: 7,
    }
}

/// A provider that refuses every fetch; handler tests that must not touch
/// the network use it to prove weather is never consulted on their path.
pub struct RefusingWeather;

impl WeatherProvider for RefusingWeather {
    fn fetch(&self, _lat: f64, _lon: f64, _tz: Tz) -> BoxFuture<'_, Result<WeatherBundle, UpstreamError>> {
        Box::pin(async { Err(UpstreamError::Permanent("no weather in tests".to_string())) })
    }
}

pub fn test_state() -> AppState {
    let config = test_config();
    let pool = db::connect_lazy(&config.database_url).expect("connect_lazy");
    let http = reqwest::Client::new();
    let catalog = Arc::new(AreaCatalogClient::new(
        http.clone(),
        config.area_catalog_base_url.clone(),
    ));
    let kaya = Arc::new(KayaClient::new(
        http.clone(),
        config.kaya_base_url.clone(),
        config.kaya_auth_token.clone(),
    ));
    let monitor = JobMonitor::new(pool.clone());

    AppState {
        config,
        db: pool,
        http,
        weather: Arc::new(RefusingWeather),
        catalog,
        kaya,
        monitor,
    }
}
