use std::sync::Arc;

use anyhow::Context;

use pansoft_api::app::{build_app, services::AppServices};
use pansoft_infra::AppConfig;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = AppConfig::from_env().context("invalid configuration")?;
    pansoft_observability::init(config.log_format);

    let services = AppServices::from_config(&config)
        .await
        .context("failed to open the store")?;
    let app = build_app(Arc::new(services));

    let listener = tokio::net::TcpListener::bind(config.bind_addr)
        .await
        .with_context(|| format!("failed to bind {}", config.bind_addr))?;

    tracing::info!(addr = %listener.local_addr()?, "listening");

    axum::serve(listener, app).await.context("server error")?;
    Ok(())
}
