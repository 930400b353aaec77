use crate::state::AppState;
use axum::{
    routing::{get, post},
    Router,
};

pub fn create_routes(state: AppState) -> Router {
    Router::new()
        // Pages
        .route("/", get(super::handlers::pages::index))
        // API endpoints
        .route("/api/predict", post(super::handlers::api::predict))
        .route("/api/append", post(super::handlers::api::append_word))
        .route("/api/generate", post(super::handlers::api::start_generation))
        .route(
            "/api/stream/{session_id}",
            get(super::handlers::api::stream_events),
        )
        .route("/api/stop", post(super::handlers::api::stop_generation))
        .route("/api/reset", post(super::handlers::api::reset_prompt))
        .route("/api/status", get(super::handlers::api::system_status))
        // Health check
        .route("/health", get(super::handlers::health::health_check))
        .with_state(state)
}
