//! Monita API server

mod error;
mod routes;

use anyhow::{Context, Result};
use monita_data::{ResourceService, Settings};
use tokio::net::TcpListener;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let settings = Settings::from_env().context("failed to load settings")?;
    let bind_addr = settings.bind_addr.clone();
    info!(
        ckan = %settings.ckan_base_url,
        allowed_domains = ?settings.allowed_domains,
        max_file_size_mb = settings.max_file_size_mb,
        "starting Monita API"
    );

    let service =
        ResourceService::from_settings(settings).context("failed to build resource service")?;
    let app = routes::router(service);

    let listener = TcpListener::bind(&bind_addr)
        .await
        .with_context(|| format!("failed to bind {bind_addr}"))?;
    info!(addr = %bind_addr, "listening");
    axum::serve(listener, app).await.context("server error")?;
    Ok(())
}
