//! Batch poll controller
//!
//! Resolves a client's batch of `{job_id: "poll" | payload}` entries into one
//! [`JobReport`] per id. Entries run concurrently and independently:
//!
//! ```text
//! id not owned by caller ──────────→ forbidden       (store untouched)
//! latest checkpoint terminal ──────→ report as is    (nothing re-runs)
//! otherwise ─→ resume ─→ re-read latest ─→ completed | processing | error
//! ```

use futures::future::join_all;
use quizgen_core::{
    GraphError, JobId, JobReport, JobRequest, JobRunner, ResumeError, ResumeValue,
};
use std::collections::BTreeMap;
use tracing::{error, info, warn};

/// Detail reported when a job cannot be read or advanced
pub const INTERNAL_ERROR_DETAIL: &str = "internal error while processing job";

/// Detail reported for an id with no checkpoints
pub const UNKNOWN_JOB_DETAIL: &str = "unknown job";

/// Starts jobs and answers batch polls
#[derive(Clone)]
pub struct PollController {
    runner: JobRunner,
}

impl PollController {
    pub fn new(runner: JobRunner) -> Self {
        Self { runner }
    }

    pub fn runner(&self) -> &JobRunner {
        &self.runner
    }

    /// Create a job and run it until it first suspends or ends
    pub async fn create(
        &self,
        owner_id: &str,
        request: JobRequest,
        credential: String,
    ) -> Result<(String, JobReport), GraphError> {
        let snapshot = self.runner.start(owner_id, request, Some(credential)).await?;
        Ok((snapshot.job_id().to_string(), snapshot.report()))
    }

    /// Resolve every entry of a poll batch concurrently
    pub async fn poll_batch(
        &self,
        owner_id: &str,
        batch: BTreeMap<String, serde_json::Value>,
        credential: &str,
    ) -> BTreeMap<String, JobReport> {
        let polls = batch.into_iter().map(|(job_id, raw)| async move {
            let report = self.poll_one(owner_id, &job_id, raw, credential).await;
            (job_id, report)
        });
        join_all(polls).await.into_iter().collect()
    }

    /// Resolve one entry
    pub async fn poll_one(
        &self,
        owner_id: &str,
        job_id: &str,
        raw: serde_json::Value,
        credential: &str,
    ) -> JobReport {
        if !JobId::from_raw(job_id).is_owned_by(owner_id) {
            warn!(owner_id, job_id, "poll for job not owned by caller");
            return JobReport::forbidden();
        }

        let value: ResumeValue = match serde_json::from_value(raw) {
            Ok(value) => value,
            Err(err) => return JobReport::error(format!("invalid resume value: {}", err)),
        };

        match self.runner.snapshot(job_id).await {
            Ok(Some(snapshot)) if snapshot.phase.is_terminal() => return snapshot.report(),
            Ok(Some(_)) => {}
            Ok(None) => return JobReport::error(UNKNOWN_JOB_DETAIL),
            Err(err) => {
                error!(job_id, error = %err, "failed to read job");
                return JobReport::error(INTERNAL_ERROR_DETAIL);
            }
        }

        match self
            .runner
            .resume(job_id, value, Some(credential.to_string()))
            .await
        {
            Ok(_) => {}
            Err(err) if err.is_conflict() => {
                info!(job_id, "job advanced concurrently, reporting latest state");
            }
            Err(GraphError::Resume(ResumeError::UnknownJob(_))) => {
                return JobReport::error(UNKNOWN_JOB_DETAIL);
            }
            Err(GraphError::Resume(err)) => return JobReport::error(err.to_string()),
            Err(err) => {
                error!(job_id, error = %err, "resume failed");
                return JobReport::error(INTERNAL_ERROR_DETAIL);
            }
        }

        match self.runner.snapshot(job_id).await {
            Ok(Some(snapshot)) => snapshot.report(),
            Ok(None) => JobReport::error(UNKNOWN_JOB_DETAIL),
            Err(err) => {
                error!(job_id, error = %err, "failed to re-read job");
                JobReport::error(INTERNAL_ERROR_DETAIL)
            }
        }
    }
}
