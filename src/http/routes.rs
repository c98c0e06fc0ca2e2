use super::handlers;
use super::state::AppState;
use crate::config::StorageBackend;
use axum::{
    routing::{get, post},
    Router,
};
use tower_http::cors::CorsLayer;
use tower_http::services::ServeDir;
use tower_http::trace::TraceLayer;

/// Create the HTTP router with all routes
pub fn create_router(state: AppState) -> Router {
    let mut router = Router::new()
        // Health check
        .route("/health", get(handlers::health_check))
        // Recording control
        .route("/recordings/start", post(handlers::start_recording))
        .route(
            "/recordings/:recording_id/stop",
            post(handlers::stop_recording),
        )
        .route(
            "/recordings/:recording_id/cancel",
            post(handlers::cancel_recording),
        )
        // Recording queries
        .route(
            "/recordings/:recording_id/status",
            get(handlers::get_recording_status),
        );

    // Objects of the local store are served back from here
    if state.storage.backend == StorageBackend::Local {
        router = router.nest_service("/objects", ServeDir::new(state.storage.root_path()));
    }

    router
        .layer(CorsLayer::permissive())
        // Add tracing middleware for request logging
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
