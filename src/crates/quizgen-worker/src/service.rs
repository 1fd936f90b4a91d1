//! Worker HTTP service
//!
//! `POST /generate_quiz` accepts a [`DispatchBatch`], answers immediately and
//! generates each task in the background. Results go back to the batch's
//! callback URL as a [`WorkerCallback`] carrying the caller's credential.

use axum::{
    extract::State,
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use quizgen_core::{DispatchBatch, DispatchTask, WorkerCallback};
use reqwest::Client;
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use tower_http::trace::TraceLayer;
use tracing::{error, info, warn};

use crate::auth::TokenVerifier;
use crate::error::{Result, WorkerError};
use crate::generator::QuizGenerator;
use crate::transport::GENERATE_PATH;

/// Shared worker state
#[derive(Clone)]
pub struct WorkerState {
    verifier: TokenVerifier,
    generator: Arc<dyn QuizGenerator>,
    client: Client,
}

impl WorkerState {
    pub fn new(
        verifier: TokenVerifier,
        generator: Arc<dyn QuizGenerator>,
        callback_timeout: Duration,
    ) -> Result<Self> {
        let client = Client::builder()
            .timeout(callback_timeout)
            .build()
            .map_err(|e| WorkerError::ConfigError(format!("Failed to create HTTP client: {}", e)))?;
        Ok(Self {
            verifier,
            generator,
            client,
        })
    }
}

/// Worker API error
#[derive(Debug)]
pub enum WorkerApiError {
    Unauthorized(String),
    Forbidden(String),
}

impl IntoResponse for WorkerApiError {
    fn into_response(self) -> Response {
        let (status, error, code, message) = match self {
            WorkerApiError::Unauthorized(message) => {
                (StatusCode::UNAUTHORIZED, "Unauthorized", "UNAUTHORIZED", message)
            }
            WorkerApiError::Forbidden(message) => {
                (StatusCode::FORBIDDEN, "Forbidden", "FORBIDDEN", message)
            }
        };
        let body = json!({ "error": error, "message": message, "code": code });
        (status, Json(body)).into_response()
    }
}

/// Build the worker router
pub fn worker_router(state: WorkerState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route(GENERATE_PATH, post(generate_quiz))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn health() -> Json<serde_json::Value> {
    Json(json!({ "status": "healthy" }))
}

async fn generate_quiz(
    State(state): State<WorkerState>,
    headers: HeaderMap,
    Json(batch): Json<DispatchBatch>,
) -> std::result::Result<(StatusCode, Json<serde_json::Value>), WorkerApiError> {
    let (claims, _) = state
        .verifier
        .verify_headers(&headers)
        .map_err(|e| WorkerApiError::Unauthorized(e.to_string()))?;

    if claims.sub != batch.owner_id {
        warn!(sub = %claims.sub, owner_id = %batch.owner_id, "batch owner does not match token subject");
        return Err(WorkerApiError::Forbidden(
            "owner_id does not match the authenticated user".to_string(),
        ));
    }

    info!(owner_id = %batch.owner_id, tasks = batch.tasks.len(), "batch accepted");
    let DispatchBatch {
        owner_id,
        callback_url,
        callback_credential,
        tasks,
    } = batch;

    for (task_id, task) in tasks {
        let state = state.clone();
        let owner_id = owner_id.clone();
        let callback_url = callback_url.clone();
        let credential = callback_credential.clone();
        tokio::spawn(async move {
            let job_id = task.job_id.clone();
            if let Err(err) =
                process_task(&state, &owner_id, &callback_url, &credential, task).await
            {
                error!(%task_id, %job_id, error = %err, "failed to deliver worker callback");
            }
        });
    }

    Ok((StatusCode::ACCEPTED, Json(json!({ "status": "processing" }))))
}

/// Generate one task and report the result to the callback URL
pub async fn process_task(
    state: &WorkerState,
    owner_id: &str,
    callback_url: &str,
    credential: &str,
    task: DispatchTask,
) -> Result<()> {
    let callback = match state.generator.generate(&task.prompt).await {
        Ok(questions) => {
            info!(job_id = %task.job_id, count = questions.len(), "quiz generated");
            WorkerCallback::ready(owner_id, &task.job_id, serde_json::to_value(questions)?)
        }
        Err(err) => {
            warn!(job_id = %task.job_id, error = %err, "quiz generation failed");
            WorkerCallback::failed(owner_id, &task.job_id, err.to_string())
        }
    };

    let response = state
        .client
        .post(callback_url)
        .bearer_auth(credential)
        .json(&callback)
        .send()
        .await?;

    if !response.status().is_success() {
        let status = response.status().as_u16();
        let message = response.text().await.unwrap_or_default();
        return Err(WorkerError::CallbackRejected { status, message });
    }
    Ok(())
}
