//! Checkpoint history of a job

use axum::{
    extract::{Path, Query, State},
    response::IntoResponse,
    Json,
};
use quizgen_checkpoint::CheckpointTuple;
use quizgen_core::JobId;
use serde::{Deserialize, Serialize};

use crate::api::{
    auth::AuthUser,
    error::{ApiError, ApiResult},
    routes::AppState,
};

const DEFAULT_LIMIT: usize = 20;
const MAX_LIMIT: usize = 100;

#[derive(Debug, Deserialize)]
pub struct HistoryQuery {
    pub before: Option<String>,
    pub limit: Option<usize>,
}

/// One checkpoint, without its state
#[derive(Debug, Serialize, Deserialize)]
pub struct CheckpointSummary {
    pub checkpoint_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parent_checkpoint_id: Option<String>,
    pub ts: String,
    pub next: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub step: Option<i32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub node: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub run: Option<u32>,
}

impl From<CheckpointTuple> for CheckpointSummary {
    fn from(tuple: CheckpointTuple) -> Self {
        Self {
            checkpoint_id: tuple.checkpoint.id,
            parent_checkpoint_id: tuple.parent_config.and_then(|c| c.checkpoint_id),
            ts: tuple.checkpoint.ts.to_rfc3339(),
            next: tuple.checkpoint.next,
            source: tuple.metadata.source.map(|s| s.as_str().to_string()),
            step: tuple.metadata.step,
            node: tuple.metadata.node,
            run: tuple.metadata.run,
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct HistoryResponse {
    pub job_id: String,
    pub checkpoints: Vec<CheckpointSummary>,
}

/// List a job's checkpoints, newest first
pub async fn list_job_checkpoints(
    State(state): State<AppState>,
    user: AuthUser,
    Path(job_id): Path<String>,
    Query(query): Query<HistoryQuery>,
) -> ApiResult<impl IntoResponse> {
    if !JobId::from_raw(&job_id).is_owned_by(&user.user_id) {
        return Err(ApiError::Forbidden("job does not belong to caller".to_string()));
    }

    let limit = query.limit.unwrap_or(DEFAULT_LIMIT).clamp(1, MAX_LIMIT);
    let tuples = state
        .controller
        .runner()
        .history(&job_id, query.before.as_deref(), Some(limit))
        .await?;

    if tuples.is_empty() && query.before.is_none() {
        return Err(ApiError::NotFound(format!("job {}", job_id)));
    }

    Ok(Json(HistoryResponse {
        job_id,
        checkpoints: tuples.into_iter().map(CheckpointSummary::from).collect(),
    }))
}
