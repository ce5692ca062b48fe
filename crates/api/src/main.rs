use std::sync::Arc;

use anyhow::Context;

use warehousex_infra::Config;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    warehousex_observability::init();

    let config = Config::from_env().context("invalid configuration")?;
    let services = warehousex_api::app::services::build_services(&config)
        .await
        .context("failed to initialize backends")?;

    let app = warehousex_api::app::build_app(Arc::new(services));

    let listener = tokio::net::TcpListener::bind(config.bind_addr)
        .await
        .with_context(|| format!("failed to bind {}", config.bind_addr))?;

    tracing::info!(addr = %listener.local_addr()?, "listening");

    axum::serve(listener, app).await.context("server error")?;
    Ok(())
}
