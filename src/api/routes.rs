use axum::{
    middleware,
    routing::{get, post},
    Router,
};
use tower_http::{cors::CorsLayer, trace::TraceLayer};

use super::handlers;
use super::AppState;
use crate::middleware::{make_span_with_request_id, request_id_middleware};

/// Creates the main API router with all routes
pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(handlers::health_check))
        .nest("/api/v1", api_routes())
        .layer(TraceLayer::new_for_http().make_span_with(make_span_with_request_id))
        // Outermost, so the id exists before the trace span is made
        .layer(middleware::from_fn(request_id_middleware))
        .layer(CorsLayer::permissive())
        .with_state(state)
}

/// API routes under /api/v1
fn api_routes() -> Router<AppState> {
    Router::new()
        // Pipeline
        .route("/pipeline/run", post(handlers::run_pipeline))
        // History
        .route("/history/append", post(handlers::append_history))
        .route("/history/bootstrap", post(handlers::bootstrap_history))
        .route("/history/backfill", post(handlers::backfill_history))
        // Recommendations
        .route(
            "/recommendations",
            get(handlers::get_recommendations).post(handlers::rebuild_recommendations),
        )
        // Storage
        .route("/files", get(handlers::list_files))
        .route("/files/raw", get(handlers::list_raw_files))
        .route("/files/processed", get(handlers::list_processed_files))
}
