use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Context;

use campus_api::app::{build_app, services::build_services};
use campus_api::middleware::Hs256ClaimsVerifier;
use campus_infra::AppConfig;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    campus_observability::init();

    let config = AppConfig::from_env().context("invalid configuration")?;
    let services = Arc::new(build_services(&config).await?);
    let verifier = Arc::new(Hs256ClaimsVerifier::new(config.jwt_secret.as_bytes()));

    let app = build_app(services, verifier);

    let listener = tokio::net::TcpListener::bind(config.bind_addr)
        .await
        .with_context(|| format!("failed to bind {}", config.bind_addr))?;

    tracing::info!("listening on {}", listener.local_addr()?);

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .await
    .context("server error")?;

    Ok(())
}
