use anyhow::Result;
use itinera::api::{self, AppState};
use itinera::config::Config;
use log::{info, warn};

#[tokio::main]
async fn main() -> Result<()> {
    env_logger::builder()
        .filter_level(log::LevelFilter::Info)
        .parse_default_env()
        .format_target(false)
        .target(env_logger::Target::Stderr)
        .init();
    info!("Starting Itinera proxy");

    let config = Config::from_env()?;
    if config.mappls.api_key.is_none() {
        warn!("MAPPLS_API_KEY is not set; directions and place details will fail");
    }
    if config.mappls.client_id.is_none() || config.mappls.client_secret.is_none() {
        warn!("Mappls client credentials are not set; token requests will fail");
    }

    let state = AppState::new(&config)?;
    let app = api::router(state, config.cors_origin.as_deref())?;

    info!("Listening on {}", config.bind_addr);
    let listener = tokio::net::TcpListener::bind(config.bind_addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("Proxy stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
}
