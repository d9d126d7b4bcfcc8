mod clients;
mod config;
mod db;
mod docs;
mod handlers;
mod models;
mod routes;
mod services;
mod state;
mod ws;

use clients::auth_client::HttpAuthGateway;
use config::Config;
use db::docstore::PgDocStore;
use routes::api::create_app;
use state::AppState;
use std::panic;
use std::sync::Arc;
use tracing::{error, info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[tokio::main(flavor = "current_thread")]
async fn main() {

    // Set panic hook for better error messages
    panic::set_hook(Box::new(|info| {
        eprintln!("PANIC: {info}");
    }));

    // Initialize tracing
    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| {
            // Default to info level, but allow debug for our app
            "docsync=debug,tower_http=debug,axum::rejection=trace,info".into()
        }))
        .init();

    info!("Starting server...");

    // Load configuration
    let config = Config::load().unwrap_or_else(|e| {
        error!("Failed to load configuration: {}", e);
        warn!("Using default configuration");
        Config::default()
    });

    // The realtime core cannot run without its two collaborators
    let db_url = config.db_url.clone().unwrap_or_else(|| {
        error!("DB_URL is not configured - the document store is required");
        std::process::exit(1);
    });
    let auth_service_url = config.auth_service_url.clone().unwrap_or_else(|| {
        error!("AUTH_SERVICE_URL is not configured - the auth service is required");
        std::process::exit(1);
    });
    let auth_jwt_secret = config.auth_jwt_secret.clone().unwrap_or_else(|| {
        error!("AUTH_JWT_SECRET is not configured - outbound service tokens cannot be signed");
        std::process::exit(1);
    });

    // Initialize the document store connection
    let store = match PgDocStore::connect(&db_url).await {
        Ok(store) => {
            info!("Database initialized successfully");
            Arc::new(store)
        }
        Err(e) => {
            error!("Failed to initialize database: {}", e);
            std::process::exit(1);
        }
    };

    // Auth gateway client for handshake credential checks
    let auth = Arc::new(HttpAuthGateway::new(
        auth_service_url,
        auth_jwt_secret,
        config.service_name.clone(),
    ));

    // Shared state: room registry, membership cache and collaborators
    let app_state = Arc::new(AppState::new(config.clone(), auth, store));
    let app_routes = create_app(Arc::clone(&app_state));

    // Start the server
    let listener = tokio::net::TcpListener::bind(config.server_address())
        .await
        .unwrap_or_else(|_| panic!("Failed to bind to {}", config.server_address()));

    info!("🚀 Server running on http://{}", config.server_address());
    info!("📡 WebSocket available at ws://{}/ws", config.server_address());
    info!("📚 Swagger UI available at http://{}/swagger", config.server_address());

    axum::serve(listener, app_routes)
        .await
        .expect("Server failed to start");
}
