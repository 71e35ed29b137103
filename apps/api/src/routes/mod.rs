pub mod health;

use axum::{
    routing::{get, post},
    Router,
};

use crate::credits;
use crate::generation;
use crate::pitches;
use crate::state::AppState;

pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health::health_handler))
        // Pitch CRUD
        .route(
            "/api/v1/pitches",
            post(pitches::handlers::handle_create_pitch).get(pitches::handlers::handle_list_pitches),
        )
        .route(
            "/api/v1/pitches/:id",
            get(pitches::handlers::handle_get_pitch).patch(pitches::handlers::handle_update_pitch),
        )
        .route(
            "/api/v1/pitches/:id/submit",
            post(pitches::handlers::handle_submit_pitch),
        )
        // Async generation protocol
        .route(
            "/api/v1/pitches/:id/generate",
            post(generation::handlers::handle_generate_pitch),
        )
        .route(
            "/api/v1/pitches/:id/guidance",
            post(generation::handlers::handle_generate_guidance),
        )
        .route(
            "/api/v1/generation/status",
            get(generation::handlers::handle_generation_status),
        )
        .route(
            "/api/v1/callbacks/generation",
            post(generation::handlers::handle_generation_callback),
        )
        // Usage balance
        .route("/api/v1/credits", get(credits::handle_get_credits))
        .with_state(state)
}
