use std::env;
use tokio::net::TcpListener;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use quickscan::handlers::{create_router, AppState};
use quickscan::services::ScanPipeline;
use quickscan::Config;

const TRACKED_ANALYSES: usize = 1024;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenvy::dotenv().ok();
    init_tracing();

    let config = Config::from_env()?;

    tracing::info!("Starting quickscan document scanner");
    tracing::info!("Max file size: {}MB", config.max_file_size_mb);
    tracing::info!("Max concurrent scans: {}", config.max_concurrent_scans);

    let pipeline = ScanPipeline::from_config(&config)?;
    let state = AppState::new(pipeline, TRACKED_ANALYSES, config.max_concurrent_scans);
    let shutdown = state.shutdown.clone();
    let app = create_router(state, config.body_limit_bytes());

    // PORT wins over SERVER_PORT for hosted deployments.
    let port = env::var("PORT")
        .ok()
        .and_then(|p| p.parse::<u16>().ok())
        .unwrap_or(config.server_port);
    let addr = format!("{}:{}", config.server_host, port);

    tracing::info!("Server listening on {}", addr);

    let listener = TcpListener::bind(&addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            if let Err(e) = tokio::signal::ctrl_c().await {
                tracing::error!(error = %e, "Failed to listen for shutdown signal");
            }
            tracing::info!("Shutdown requested, cancelling in-flight scans");
            shutdown.cancel();
        })
        .await?;

    Ok(())
}

fn init_tracing() {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "quickscan=debug,tower_http=debug".into());

    if env::var("LOG_FORMAT").map(|f| f == "json").unwrap_or(false) {
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer().json())
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer().with_target(false))
            .init();
    }
}
