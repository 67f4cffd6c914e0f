pub mod health;

use axum::{
    routing::{get, post},
    Router,
};

use crate::pipeline::handlers;
use crate::state::AppState;

pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health::health_handler))
        // Generation API
        .route(
            "/api/v1/generations/resume",
            post(handlers::handle_start_resume),
        )
        .route(
            "/api/v1/generations/cover-letter",
            post(handlers::handle_start_cover_letter),
        )
        .route("/api/v1/generations", get(handlers::handle_list_generations))
        .route(
            "/api/v1/generations/:id",
            get(handlers::handle_get_generation),
        )
        .route(
            "/api/v1/generations/:id/cancel",
            post(handlers::handle_cancel_generation),
        )
        .route(
            "/api/v1/generations/:id/regenerate",
            post(handlers::handle_regenerate),
        )
        .route(
            "/api/v1/generations/:id/content",
            get(handlers::handle_get_content),
        )
        .with_state(state)
}
