//! Job creation and batch polling
//!
//! One endpoint serves both: a body with a `new_job` key creates a job, any
//! other object is a poll batch mapping job ids to `"poll"` or a payload.

use axum::{
    extract::{rejection::JsonRejection, State},
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use quizgen_core::{JobReport, JobRequest};
use serde_json::Value;
use std::collections::BTreeMap;
use tracing::info;

use crate::api::{
    auth::AuthUser,
    error::{ApiError, ApiResult},
    routes::AppState,
};

const NEW_JOB_KEY: &str = "new_job";

/// Create a job or poll a batch of jobs
pub async fn generate_quiz(
    State(state): State<AppState>,
    user: AuthUser,
    body: Result<Json<BTreeMap<String, Value>>, JsonRejection>,
) -> ApiResult<impl IntoResponse> {
    let Json(mut body) = body.map_err(|e| ApiError::BadRequest(e.body_text()))?;

    if let Some(raw) = body.remove(NEW_JOB_KEY) {
        let request: JobRequest = serde_json::from_value(raw)
            .map_err(|e| ApiError::BadRequest(format!("invalid new_job: {}", e)))?;
        request
            .validate()
            .map_err(|e| ApiError::ValidationError(e.to_string()))?;

        let (job_id, report) = state
            .controller
            .create(&user.user_id, request, user.token)
            .await?;
        info!(owner_id = %user.user_id, %job_id, status = ?report.status, "job created");

        let response: BTreeMap<String, JobReport> = BTreeMap::from([(job_id, report)]);
        return Ok((StatusCode::OK, Json(response)));
    }

    if body.is_empty() {
        return Err(ApiError::BadRequest(
            "expected new_job or a map of job ids to poll".to_string(),
        ));
    }

    let reports = state
        .controller
        .poll_batch(&user.user_id, body, &user.token)
        .await;
    Ok((StatusCode::OK, Json(reports)))
}
