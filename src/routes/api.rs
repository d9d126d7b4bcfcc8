use crate::docs::ApiDoc;
use crate::handlers::{diagnostics, health_check, ready_check};
use crate::routes::auth_middleware::auth_middleware;
use crate::state::AppState;
use crate::ws::handler::ws_handler;
use axum::http::HeaderValue;
use axum::{middleware, routing::get, Router};
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

/// Create API routes
pub fn create_api_routes(app_state: Arc<AppState>) -> Router {
    Router::new()
        .route("/v1/diagnostics", get(diagnostics))
        .route_layer(middleware::from_fn_with_state(
            Arc::clone(&app_state),
            auth_middleware,
        )) // Applies to all routes added above
        .route("/health", get(health_check))
        .route("/ready", get(ready_check))
        .with_state(app_state)
}

/// Assemble the full application: realtime endpoints, API routes, docs.
pub fn create_app(app_state: Arc<AppState>) -> Router {
    let api_routes = create_api_routes(Arc::clone(&app_state));

    let cors_layer = match &app_state.config.cors_origins {
        Some(origins) => {
            let origins: Vec<HeaderValue> = origins
                .split(',')
                .filter_map(|origin| origin.trim().parse().ok())
                .collect();
            CorsLayer::new()
                .allow_origin(origins)
                .allow_methods(Any)
                .allow_headers(Any)
        }
        None => CorsLayer::permissive(),
    };

    Router::new()
        // Realtime upgrade endpoints
        .route("/ws", get(ws_handler))
        .route("/websocket", get(ws_handler))
        .with_state(app_state)
        // Mount API routes
        .nest("/api", api_routes)
        // Mount Swagger UI
        .merge(SwaggerUi::new("/swagger").url("/api-docs/openapi.json", ApiDoc::openapi()))
        .layer(cors_layer)
        // Add tracing layer
        .layer(TraceLayer::new_for_http())
}
