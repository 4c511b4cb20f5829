use alarmcall::config::AppConfig;
use alarmcall::logging::init_tracing;
use alarmcall::server::{app, build_processor};
use tracing::info;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    dotenv::dotenv().ok();

    let config = AppConfig::load()?;
    init_tracing(&config.logging)?;
    config.validate()?;

    let processor = build_processor(&config)?;
    let app = app(processor, &config);

    let listener = tokio::net::TcpListener::bind((config.server.host.as_str(), config.server.port)).await?;
    info!(
        "Server running on {}:{}, webhook at {}",
        config.server.host, config.server.port, config.webhook.path
    );

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;
    info!("Server stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for shutdown signal: {}", e);
    }
}
