use axum::{
    middleware,
    routing::{get, post},
    Router,
};
use tower_http::{cors::CorsLayer, trace::TraceLayer};

use super::handlers;
use super::AppState;
use crate::middleware::{make_span_with_request_id, request_id_middleware};

/// Creates the application router with all routes
pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(handlers::health_check))
        .nest("/api", api_routes())
        .layer(TraceLayer::new_for_http().make_span_with(make_span_with_request_id))
        .layer(middleware::from_fn(request_id_middleware))
        .layer(CorsLayer::permissive())
        .with_state(state)
}

/// API routes under /api
fn api_routes() -> Router<AppState> {
    Router::new()
        // Catalog
        .route("/courses", get(handlers::list_courses))
        .route("/courses/:id", get(handlers::get_course))
        .route("/courses/:id/evaluate", post(handlers::evaluate_course))
        // Students
        .route("/users/:student_id", get(handlers::get_user))
        .route("/users/:student_id/history", get(handlers::get_user_history))
        // Evaluation and recommendation
        .route("/evaluate", post(handlers::evaluate))
}
