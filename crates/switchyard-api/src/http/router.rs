//! Axum router configuration with middleware.
//!
//! All routes are under `/api/v1/`.
//! Middleware: CORS, tracing.

use axum::Router;
use axum::routing::{get, post};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::http::handlers;
use crate::state::AppState;

/// Build the complete API router with all routes and middleware.
pub fn build_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let api_routes = Router::new()
        .route("/health", get(handlers::health::health))
        // Providers
        .route("/providers", get(handlers::providers::list_providers))
        .route("/providers/{name}", get(handlers::providers::get_provider))
        // Routing
        .route("/routing/{operation}", get(handlers::routing::rank_operation))
        .route("/execute", post(handlers::execute::execute))
        // Analytics
        .route(
            "/analytics/rate-limits",
            get(handlers::analytics::rate_limits),
        )
        .route(
            "/analytics/load-balancing",
            get(handlers::analytics::load_balancing),
        )
        .route(
            "/analytics/suggestions",
            get(handlers::analytics::suggestions),
        )
        // Audit
        .route("/audit", get(handlers::audit::list_records))
        .route("/audit/counts", get(handlers::audit::counts));

    Router::new()
        .nest("/api/v1", api_routes)
        .route("/health", get(handlers::health::health))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}
