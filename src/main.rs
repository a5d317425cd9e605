use anyhow::{Context, Result};
use clap::Parser;
use crag_server::clients::area_catalog::AreaCatalogClient;
use crag_server::clients::kaya::KayaClient;
use crag_server::clients::open_meteo::OpenMeteoClient;
use crag_server::clients::WeatherProvider;
use crag_server::jobs::{JobMonitor, Scheduler};
use crag_server::{cli, config, db, openapi, routes, state};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tower_http::cors::CorsLayer;
use tower_governor::{governor::GovernorConfigBuilder, GovernorLayer};

async fn bind_listener(addr: &str) -> Result<TcpListener> {
    match TcpListener::bind(addr).await {
        Ok(listener) => Ok(listener),
        Err(err) if err.kind() == std::io::ErrorKind::AddrInUse => {
            anyhow::bail!(
                "Failed to bind crag-server listener on {addr}: port already in use. Stop the other service using this port or re-run with --port to choose another port.",
            );
        }
        Err(err) => Err(err).with_context(|| format!("failed to bind crag-server listener on {addr}")),
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = cli::Args::parse();
    if args.print_openapi {
        println!("{}", serde_json::to_string_pretty(&openapi::openapi_json())?);
        return Ok(());
    }

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let config = config::Config::from_env()?;
    let pool = db::connect_lazy(&config.database_url)?;

    let http = reqwest::Client::new();
    let weather: Arc<dyn WeatherProvider> = Arc::new(OpenMeteoClient::new(
        http.clone(),
        config.openweathermap_api_key.clone(),
    ));
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

    let state = state::AppState {
        config: config.clone(),
        db: pool,
        http,
        weather,
        catalog,
        kaya,
        monitor,
    };

    let cancel = CancellationToken::new();
    if config.enable_ingestion {
        Scheduler::new(state.clone()).start(cancel.clone());
    } else {
        tracing::info!("ingestion scheduler disabled by configuration");
    }

    let governor_conf = Arc::new(
        GovernorConfigBuilder::default()
            .per_second(50)
            .burst_size(200)
            .use_headers()
            .finish()
            .context("failed to build rate limiter config")?,
    );
    let governor_limiter = governor_conf.limiter().clone();
    std::thread::spawn(move || loop {
        std::thread::sleep(std::time::Duration::from_secs(60));
        governor_limiter.retain_recent();
    });

    let app = routes::router(state)
        .layer(GovernorLayer::new(governor_conf))
        .layer(CorsLayer::permissive());

    let addr = format!("{}:{}", args.host, args.port);
    let listener = bind_listener(&addr).await?;
    tracing::info!(%addr, "crag-server listening");

    let shutdown_cancel = cancel.clone();
    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(async move {
        let _ = tokio::signal::ctrl_c().await;
        shutdown_cancel.cancel();
    })
    .await?;
    cancel.cancel();
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::bind_listener;
    use anyhow::Result;

    #[tokio::test]
    async fn reports_port_in_use_with_actionable_message() -> Result<()> {
        let listener = match std::net::TcpListener::bind("127.0.0.1:0") {
            Ok(listener) => listener,
            Err(err) if err.kind() == std::io::ErrorKind::PermissionDenied => {
                // Sandbox environments can block binding attempts.
                return Ok(());
            }
            Err(err) => return Err(err.into()),
        };
        let addr = listener.local_addr()?;

        let err = bind_listener(&addr.to_string()).await.unwrap_err();
        if err.to_string().to_lowercase().contains("operation not permitted") {
            // Sandbox environments can block binding attempts; skip assertions in that case.
            return Ok(());
        }
        let message = err.to_string().to_lowercase();

        assert!(message.contains(&addr.to_string()));
        assert!(message.contains("port already in use"));
        assert!(message.contains("--port"));

        drop(listener);
        Ok(())
    }
}
