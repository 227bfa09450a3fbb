use std::panic;

use colab_sync::config::Config;
use colab_sync::db::Storage;
use colab_sync::{build_app, AppState};
use tracing::{error, info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[tokio::main]
async fn main() {
    // Set panic hook for better error messages
    panic::set_hook(Box::new(|info| {
        eprintln!("PANIC: {info}");
    }));

    let loaded = Config::load();
    let log_level = loaded
        .as_ref()
        .map(|config| config.log_level.clone())
        .unwrap_or_else(|_| Config::default().log_level);

    // Initialize tracing
    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| {
            format!("colab_sync={},tower_http=debug,axum::rejection=trace,info", log_level).into()
        }))
        .init();

    info!("Starting server...");

    // Load configuration
    let config = loaded.unwrap_or_else(|e| {
        error!("Failed to load configuration: {}", e);
        warn!("Using default configuration");
        Config::default()
    });
    if config.is_development() {
        info!("Running in {} mode", config.environment);
    }

    // Connect to the database if a URL is provided
    let storage = match &config.db_url {
        Some(db_url) => match Storage::connect(db_url, config.db_max_connections).await {
            Ok(storage) => {
                info!("Database initialized successfully");
                storage
            }
            Err(e) => {
                error!("Failed to initialize database: {}", e);
                std::process::exit(1);
            }
        },
        None => {
            warn!("No database URL configured - file content and versions are kept in memory only");
            Storage::memory()
        }
    };

    let address = config.server_address();
    let app = build_app(AppState::new(config, storage));

    let listener = tokio::net::TcpListener::bind(&address)
        .await
        .unwrap_or_else(|_| panic!("Failed to bind to {}", address));

    info!("🚀 Server running on http://{}", address);
    info!("📡 WebSocket available at ws://{}/ws/files/{{file_id}}", address);
    info!("📚 Swagger UI available at http://{}/swagger", address);

    if let Err(e) = axum::serve(listener, app).await {
        error!("Server failed: {}", e);
    }
}
