use axum::extract::FromRef;
use reqwest::Client;
use sqlx::PgPool;
use std::sync::Arc;

use crate::clients::area_catalog::AreaCatalogClient;
use crate::clients::kaya::KayaClient;
use crate::clients::WeatherProvider;
use crate::config::Config;
use crate::jobs::JobMonitor;

#[derive(Clone)]
pub struct AppState {
    pub config: Config,
    pub db: PgPool,
    pub http: Client,
    pub weather: Arc<dyn WeatherProvider>,
    pub catalog: Arc<AreaCatalogClient>,
    pub kaya: Arc<KayaClient>,
    pub monitor: JobMonitor,
}

impl FromRef<AppState> for PgPool {
    fn from_ref(state: &AppState) -> PgPool {
        state.db.clone()
    }
}
