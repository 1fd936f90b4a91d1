//! Worker completion callback
//!
//! The worker posts here with the caller's credential once a quiz is ready or
//! has failed. Only the quiz record is completed; the job itself picks the
//! result up on its next poll.

use axum::{extract::State, response::IntoResponse, Json};
use quizgen_core::{CallbackStatus, JobId, QuizOutcome, WorkerCallback};
use serde_json::json;
use tracing::{info, warn};

use crate::api::{
    auth::AuthUser,
    error::{ApiError, ApiResult},
    routes::AppState,
};

pub async fn worker_callback(
    State(state): State<AppState>,
    user: AuthUser,
    Json(callback): Json<WorkerCallback>,
) -> ApiResult<impl IntoResponse> {
    if callback.owner_id != user.user_id || !JobId::from_raw(&callback.job_id).is_owned_by(&user.user_id) {
        warn!(
            caller = %user.user_id,
            owner_id = %callback.owner_id,
            job_id = %callback.job_id,
            "callback for a job the caller does not own"
        );
        return Err(ApiError::Forbidden("job does not belong to caller".to_string()));
    }

    let outcome = match (callback.status, callback.result) {
        (CallbackStatus::Ready, Some(result)) => QuizOutcome::Ready(result),
        (CallbackStatus::Ready, None) => {
            QuizOutcome::Failed("Worker reported ready without questions".to_string())
        }
        (CallbackStatus::Error, _) => QuizOutcome::Failed(
            callback
                .error_detail
                .unwrap_or_else(|| "Worker reported an error".to_string()),
        ),
    };

    let updated = state
        .quizzes
        .finish(&callback.owner_id, &callback.job_id, &outcome)
        .await?;
    info!(job_id = %callback.job_id, updated, "worker callback applied");

    Ok(Json(json!({ "status": "ok", "updated": updated })))
}
