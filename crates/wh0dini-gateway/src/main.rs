//! Wh0Dini Gateway - entry point

use std::sync::Arc;

use axum::Router;
use tower_http::trace::TraceLayer;
use wh0dini_gateway::{
    build_routes, cors_layer, logging, metrics, ApiKeyConfig, AppState, Relay, Settings,
};
use wh0dini_runtime::OpenAIProvider;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let settings = Settings::load()?;
    logging::init_tracing(&settings.log_level, settings.log_format)?;
    metrics::init_metrics();

    tracing::info!(
        version = wh0dini_gateway::GATEWAY_VERSION,
        model = %settings.model_name,
        "Starting Wh0Dini Gateway"
    );

    let provider = OpenAIProvider::new(
        settings.openai_api_key.clone(),
        settings.openai_api_base.clone(),
        settings.model_name.clone(),
    )?
    .with_timeout(settings.upstream_timeout())?;

    let relay = Relay::new(Arc::new(provider), settings.relay_settings());
    let auth = if settings.require_auth {
        ApiKeyConfig::required(settings.api_key.clone())
    } else {
        ApiKeyConfig::disabled()
    };

    let app = Router::new()
        .merge(build_routes(AppState::new(relay, auth)))
        .layer(cors_layer(&settings.allowed_origins))
        .layer(TraceLayer::new_for_http());

    let addr = settings.bind_addr()?;
    tracing::info!("Listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    Ok(())
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        tracing::warn!(error = %err, "failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutting down");
}
