//! API route definitions

use axum::{
    routing::{get, post},
    Router,
};
use quizgen_worker::TokenVerifier;

use crate::api::{
    handlers,
    middleware::{cors_layer, logging_layer},
};
use crate::db::{DatabaseConnection, QuizRepository};
use crate::poll::PollController;

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub db: DatabaseConnection,
    pub controller: PollController,
    pub quizzes: QuizRepository,
    pub verifier: TokenVerifier,
}

/// Build the complete API router
///
/// `cors_origins` lists the browser origins allowed to call the API; empty
/// allows any.
pub fn create_router(state: AppState, cors_origins: &[String]) -> Router {
    Router::new()
        // Health check endpoints
        .route("/health", get(handlers::health))
        .route("/api/v1/system/health", get(handlers::health_detailed))
        // Job creation and batch polling
        .route("/functions/v1/generate-quiz", post(handlers::generate_quiz))
        // Worker completion callback
        .route("/webhooks/worker-callback", post(handlers::worker_callback))
        // Checkpoint history
        .route(
            "/api/v1/jobs/:job_id/checkpoints",
            get(handlers::list_job_checkpoints),
        )
        .layer(cors_layer(cors_origins))
        .layer(logging_layer())
        .with_state(state)
}
