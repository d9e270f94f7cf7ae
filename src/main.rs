//! Yardcam Server
//!
//! Receives yard captures, extracts container numbers, ISO codes, plates and
//! colors, and keeps one photo batch per subject and location.

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Context;
use tokio::signal;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use yardcam_server::config::{Config, StorageProvider};
use yardcam_server::db;
use yardcam_server::recognition::ExtractionGateway;
use yardcam_server::routes;
use yardcam_server::state::AppState;
use yardcam_server::storage::{BlobStorage, LocalBlobStorage, S3BlobStorage, S3Client};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "yardcam_server=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Load configuration
    dotenvy::dotenv().ok();

    let config = Config::from_env().unwrap_or_else(|e| {
        tracing::warn!("Failed to load config from env: {}, using defaults", e);
        Config::default()
    });

    tracing::info!("Starting Yardcam Server v{}", env!("CARGO_PKG_VERSION"));

    // Initialize blob storage
    let blobs: Arc<dyn BlobStorage> = match config.storage.provider {
        StorageProvider::Local => {
            tracing::info!("Blob storage: local at {}", config.storage.local_path.display());
            Arc::new(LocalBlobStorage::new(config.storage.local_path.clone()))
        }
        _ => {
            tracing::info!("S3 endpoint: {}", config.storage.endpoint);
            tracing::info!("S3 bucket: {}", config.storage.bucket);
            let client = S3Client::new(&config.storage)
                .await
                .context("Failed to initialize S3 client")?;
            Arc::new(S3BlobStorage::new(client))
        }
    };

    // Initialize database
    let db_pool = db::create_pool(&config.database.url)
        .await
        .context("Failed to initialize database")?;
    tracing::info!("Database initialized at {}", config.database.url);

    let gateway = ExtractionGateway::from_config(&config.providers);

    let addr: SocketAddr = format!("{}:{}", config.server.host, config.server.port)
        .parse()
        .context("Invalid server address")?;

    let app_state = AppState::new(config, blobs, db_pool, gateway);
    let app = routes::app(app_state);

    // Start server with graceful shutdown
    tracing::info!("Yardcam Server listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind {}", addr))?;

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!("Server shutdown complete");
    Ok(())
}

/// Graceful shutdown signal handler
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!("Failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                tracing::error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            tracing::info!("Received Ctrl+C, starting graceful shutdown...");
        },
        _ = terminate => {
            tracing::info!("Received SIGTERM, starting graceful shutdown...");
        },
    }
}
