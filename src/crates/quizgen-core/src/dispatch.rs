//! Worker dispatch contract and the grace-window race
//!
//! Generating a quiz takes seconds to minutes, so the `trigger_worker` step
//! hands the prompt to an external worker through a [`Dispatcher`] and returns.
//! [`dispatch_with_grace`] gives the call a short window to fail fast; once the
//! window closes the call is left running in the background and only logged.
//!
//! ```text
//!   spawn(dispatch) ──┬── finishes within grace ──→ Ok(Completed) / Err(e)
//!                     └── grace elapses ──────────→ Ok(Detached)
//!                                                    └─ watcher logs late errors
//! ```

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, warn};

/// One unit of work for the worker
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DispatchTask {
    pub prompt: String,
    pub job_id: String,
}

/// Worker dispatch payload
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DispatchBatch {
    pub owner_id: String,
    /// Where the worker posts its [`WorkerCallback`]
    pub callback_url: String,
    /// Bearer credential the worker presents on the callback
    pub callback_credential: String,
    /// Keyed by task id
    pub tasks: BTreeMap<String, DispatchTask>,
}

impl DispatchBatch {
    pub fn job_ids(&self) -> Vec<&str> {
        self.tasks.values().map(|task| task.job_id.as_str()).collect()
    }
}

/// Result status reported by the worker
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CallbackStatus {
    Ready,
    Error,
}

/// Worker completion callback; also the terminal resume payload
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkerCallback {
    pub owner_id: String,
    pub job_id: String,
    #[serde(default)]
    pub result: Option<serde_json::Value>,
    pub status: CallbackStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_detail: Option<String>,
}

impl WorkerCallback {
    pub fn ready(owner_id: impl Into<String>, job_id: impl Into<String>, result: serde_json::Value) -> Self {
        Self {
            owner_id: owner_id.into(),
            job_id: job_id.into(),
            result: Some(result),
            status: CallbackStatus::Ready,
            error_detail: None,
        }
    }

    pub fn failed(
        owner_id: impl Into<String>,
        job_id: impl Into<String>,
        detail: impl Into<String>,
    ) -> Self {
        Self {
            owner_id: owner_id.into(),
            job_id: job_id.into(),
            result: None,
            status: CallbackStatus::Error,
            error_detail: Some(detail.into()),
        }
    }
}

/// Errors raised while handing work to the worker
#[derive(Error, Debug)]
pub enum DispatchError {
    /// The request never got an answer (connection, DNS, timeout)
    #[error("Dispatch transport error: {0}")]
    Transport(String),

    /// The worker answered and refused the batch
    #[error("Worker rejected dispatch with status {status}: {message}")]
    Rejected { status: u16, message: String },

    /// Misconfigured dispatcher
    #[error("Dispatch configuration error: {0}")]
    Config(String),
}

/// Hands batches to an external compute resource
#[async_trait]
pub trait Dispatcher: Send + Sync + 'static {
    /// Deliver the batch. Returns once the worker has accepted it; the result
    /// arrives later through the callback.
    async fn dispatch(&self, batch: DispatchBatch) -> Result<(), DispatchError>;
}

/// How a graced dispatch ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatchOutcome {
    /// The worker accepted the batch within the grace window
    Completed,
    /// The window elapsed; the call continues in the background
    Detached,
}

/// Dispatch `batch`, waiting at most `grace` for the call to finish.
///
/// Errors that arrive within the window are returned. After it, the call is
/// detached: its eventual error is logged and `Ok(Detached)` is returned.
pub async fn dispatch_with_grace(
    dispatcher: Arc<dyn Dispatcher>,
    batch: DispatchBatch,
    grace: Duration,
) -> Result<DispatchOutcome, DispatchError> {
    let job_ids = batch.job_ids().join(",");
    let mut handle = tokio::spawn(async move { dispatcher.dispatch(batch).await });

    match tokio::time::timeout(grace, &mut handle).await {
        Ok(Ok(result)) => result.map(|()| DispatchOutcome::Completed),
        Ok(Err(join_err)) => Err(DispatchError::Transport(format!(
            "dispatch task aborted: {}",
            join_err
        ))),
        Err(_) => {
            debug!(jobs = %job_ids, grace_ms = grace.as_millis() as u64, "dispatch detached");
            tokio::spawn(async move {
                match handle.await {
                    Ok(Ok(())) => debug!(jobs = %job_ids, "detached dispatch accepted"),
                    Ok(Err(err)) => warn!(jobs = %job_ids, error = %err, "detached dispatch failed"),
                    Err(err) => warn!(jobs = %job_ids, error = %err, "detached dispatch aborted"),
                }
            });
            Ok(DispatchOutcome::Detached)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct SlowDispatcher {
        delay: Duration,
        fail: bool,
        finished: Arc<AtomicUsize>,
    }

    #[async_trait]
    impl Dispatcher for SlowDispatcher {
        async fn dispatch(&self, _batch: DispatchBatch) -> Result<(), DispatchError> {
            tokio::time::sleep(self.delay).await;
            self.finished.fetch_add(1, Ordering::SeqCst);
            if self.fail {
                Err(DispatchError::Rejected {
                    status: 500,
                    message: "worker down".into(),
                })
            } else {
                Ok(())
            }
        }
    }

    fn batch() -> DispatchBatch {
        DispatchBatch {
            owner_id: "u1".into(),
            callback_url: "http://localhost/webhooks/worker-callback".into(),
            callback_credential: "token".into(),
            tasks: BTreeMap::from([(
                "task-1".to_string(),
                DispatchTask {
                    prompt: "maak een quiz".into(),
                    job_id: "u1:job".into(),
                },
            )]),
        }
    }

    fn dispatcher(delay_ms: u64, fail: bool) -> (Arc<dyn Dispatcher>, Arc<AtomicUsize>) {
        let finished = Arc::new(AtomicUsize::new(0));
        let dispatcher = Arc::new(SlowDispatcher {
            delay: Duration::from_millis(delay_ms),
            fail,
            finished: finished.clone(),
        });
        (dispatcher, finished)
    }

    #[tokio::test(start_paused = true)]
    async fn test_fast_success_completes() {
        let (dispatcher, _) = dispatcher(10, false);
        let outcome = dispatch_with_grace(dispatcher, batch(), Duration::from_millis(300))
            .await
            .unwrap();
        assert_eq!(outcome, DispatchOutcome::Completed);
    }

    #[tokio::test(start_paused = true)]
    async fn test_fast_failure_surfaces() {
        let (dispatcher, _) = dispatcher(10, true);
        let err = dispatch_with_grace(dispatcher, batch(), Duration::from_millis(300))
            .await
            .unwrap_err();
        assert!(matches!(err, DispatchError::Rejected { status: 500, .. }));
    }

    #[tokio::test(start_paused = true)]
    async fn test_slow_call_detaches_and_keeps_running() {
        let (dispatcher, finished) = dispatcher(5_000, true);
        let outcome = dispatch_with_grace(dispatcher, batch(), Duration::from_millis(300))
            .await
            .unwrap();
        assert_eq!(outcome, DispatchOutcome::Detached);
        assert_eq!(finished.load(Ordering::SeqCst), 0);

        tokio::time::sleep(Duration::from_secs(10)).await;
        assert_eq!(finished.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_callback_wire_format() {
        let callback: WorkerCallback = serde_json::from_value(json!({
            "owner_id": "u1",
            "job_id": "u1:job",
            "result": null,
            "status": "error",
            "error_detail": "model overloaded"
        }))
        .unwrap();
        assert_eq!(callback, WorkerCallback::failed("u1", "u1:job", "model overloaded"));
    }
}
