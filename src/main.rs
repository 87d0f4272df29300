//! Storefront gateway server.

#![forbid(unsafe_code)]

use anyhow::Context;
use storefront_gateway::{Downstream, GatewayConfig, gateway_router};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use url::Url;

const DEFAULT_ADDR: &str = "0.0.0.0:4000";

#[tokio::main]
async fn main() {
    let _ = dotenvy::dotenv();

    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "info".into()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();

    if let Err(e) = run().await {
        tracing::error!(error = %format!("{e:#}"), "Storefront gateway stopped");
        std::process::exit(1);
    }
}

async fn run() -> anyhow::Result<()> {
    let config = GatewayConfig::from_env()?;

    let downstream_url: Url = std::env::var("DOWNSTREAM_URL")
        .context("DOWNSTREAM_URL is required")?
        .parse()
        .context("DOWNSTREAM_URL")?;
    let downstream = Downstream::new(downstream_url.clone())?;

    let addr = std::env::var("GATEWAY_ADDR").unwrap_or_else(|_| DEFAULT_ADDR.into());
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("binding {addr}"))?;

    let app = gateway_router(config, downstream.into_router());

    tracing::info!(addr = %addr, downstream = %downstream_url, "Storefront gateway listening");
    axum::serve(listener, app).await?;

    Ok(())
}
