pub mod config;
pub mod db;
pub mod docs;
pub mod handlers;
pub mod models;
pub mod routes;
pub mod services;
pub mod websocket;
pub mod ws;

use std::sync::Arc;

use axum::{http::HeaderValue, routing::get, Router};
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::warn;
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

use config::Config;
use db::Storage;
use docs::ApiDoc;
use routes::create_api_routes;
use services::{FileService, VersionStore};
use websocket::websocket_handler;
use ws::HubRegistry;

/// Shared state handed to every handler
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub storage: Storage,
    pub registry: Arc<HubRegistry>,
    pub versions: VersionStore,
    pub files: FileService,
}

impl AppState {
    pub fn new(config: Config, storage: Storage) -> Self {
        let registry = Arc::new(HubRegistry::new(config.session_queue_capacity.max(1)));
        let versions = VersionStore::new(storage.clone());
        let files = FileService::new(storage.clone(), versions.clone());
        Self {
            config: Arc::new(config),
            storage,
            registry,
            versions,
            files,
        }
    }
}

fn cors_layer(config: &Config) -> CorsLayer {
    let origins: Vec<HeaderValue> = config
        .cors_origin_list()
        .into_iter()
        .filter_map(|origin| match origin.parse() {
            Ok(value) => Some(value),
            Err(_) => {
                warn!("Ignoring invalid CORS origin '{}'", origin);
                None
            }
        })
        .collect();
    if origins.is_empty() {
        CorsLayer::permissive()
    } else {
        CorsLayer::new()
            .allow_origin(origins)
            .allow_methods(tower_http::cors::Any)
            .allow_headers(tower_http::cors::Any)
    }
}

/// Build the full router: REST under `/api`, file sockets under `/ws/files`, and Swagger UI
pub fn build_app(state: AppState) -> Router {
    let cors = cors_layer(&state.config);
    let api_routes = create_api_routes(state.clone());
    let ws_routes = Router::new()
        .route("/ws/files/:file_id", get(websocket_handler))
        .with_state(state);

    Router::new()
        // Mount API routes
        .nest("/api", api_routes)
        .merge(ws_routes)
        // Mount Swagger UI
        .merge(SwaggerUi::new("/swagger").url("/api-docs/openapi.json", ApiDoc::openapi()))
        .layer(cors)
        // Add tracing layer
        .layer(TraceLayer::new_for_http())
}
