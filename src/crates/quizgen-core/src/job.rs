//! Job identity and externally visible status

use quizgen_checkpoint::Checkpoint;
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

use crate::graph::Step;
use crate::state::JobState;

/// Globally unique job identifier of the form `{owner_id}:{uuid}`.
///
/// The owner prefix lets ownership be checked without touching storage.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct JobId(String);

impl JobId {
    /// Mint a fresh id for `owner_id`
    pub fn generate(owner_id: &str) -> Self {
        Self(format!("{}:{}", owner_id, Uuid::now_v7()))
    }

    /// Wrap a client-supplied id without validating it
    pub fn from_raw(raw: impl Into<String>) -> Self {
        Self(raw.into())
    }

    /// Owner prefix, `None` when the id has no separator
    pub fn owner(&self) -> Option<&str> {
        self.0
            .rsplit_once(':')
            .map(|(owner, _)| owner)
            .filter(|owner| !owner.is_empty())
    }

    pub fn is_owned_by(&self, owner_id: &str) -> bool {
        self.owner() == Some(owner_id)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<JobId> for String {
    fn from(id: JobId) -> Self {
        id.0
    }
}

/// Lifecycle position of a job, derived from its latest checkpoint
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobPhase {
    /// Only the input checkpoint exists
    Created,
    /// Steps remain and the job is not waiting on anything
    Running,
    /// Waiting for the worker result
    Suspended,
    Completed,
    Failed,
}

impl JobPhase {
    pub fn of(checkpoint: &Checkpoint, state: &JobState) -> Self {
        match checkpoint.next.first().map(String::as_str) {
            None if state.error.is_some() || state.generated.is_none() => JobPhase::Failed,
            None => JobPhase::Completed,
            Some(next) if next == Step::Wait.name() => JobPhase::Suspended,
            Some(next) if next == Step::FetchWords.name() => JobPhase::Created,
            Some(_) => JobPhase::Running,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, JobPhase::Completed | JobPhase::Failed)
    }
}

/// Status string reported to clients
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    Processing,
    Completed,
    Error,
    Forbidden,
}

/// Per-job entry of a creation or poll response
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobReport {
    pub status: JobStatus,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<serde_json::Value>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_detail: Option<String>,
}

impl JobReport {
    pub fn processing() -> Self {
        Self {
            status: JobStatus::Processing,
            result: None,
            error_detail: None,
        }
    }

    pub fn completed(result: serde_json::Value) -> Self {
        Self {
            status: JobStatus::Completed,
            result: Some(result),
            error_detail: None,
        }
    }

    pub fn error(detail: impl Into<String>) -> Self {
        Self {
            status: JobStatus::Error,
            result: None,
            error_detail: Some(detail.into()),
        }
    }

    pub fn forbidden() -> Self {
        Self {
            status: JobStatus::Forbidden,
            result: None,
            error_detail: None,
        }
    }

    /// Report for a job given its latest checkpoint
    pub fn from_state(phase: JobPhase, state: &JobState) -> Self {
        match phase {
            JobPhase::Completed => match &state.generated {
                Some(result) => Self::completed(result.clone()),
                None => Self::error("job finished without a result"),
            },
            JobPhase::Failed => Self::error(
                state
                    .error
                    .clone()
                    .unwrap_or_else(|| "job finished without a result".to_string()),
            ),
            _ => Self::processing(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_job_id_owner_prefix() {
        let id = JobId::generate("user-1");
        assert_eq!(id.owner(), Some("user-1"));
        assert!(id.is_owned_by("user-1"));
        assert!(!id.is_owned_by("user-2"));
    }

    #[test]
    fn test_owner_with_colon_uses_last_separator() {
        let id = JobId::from_raw("tenant:user:0190");
        assert_eq!(id.owner(), Some("tenant:user"));
    }

    #[test]
    fn test_malformed_job_id_has_no_owner() {
        assert_eq!(JobId::from_raw("no-separator").owner(), None);
        assert_eq!(JobId::from_raw(":abc").owner(), None);
    }

    #[test]
    fn test_report_serialization_omits_empty_fields() {
        let report = serde_json::to_value(JobReport::processing()).unwrap();
        assert_eq!(report, json!({"status": "processing"}));

        let report = serde_json::to_value(JobReport::error("boom")).unwrap();
        assert_eq!(report, json!({"status": "error", "error_detail": "boom"}));
    }

    #[test]
    fn test_phase_from_checkpoint() {
        let mut state = JobState::new("u1", "u1:j", Default::default());
        let created = Checkpoint::new(json!({}), vec!["fetch_words".into()]);
        assert_eq!(JobPhase::of(&created, &state), JobPhase::Created);

        let suspended = Checkpoint::new(json!({}), vec!["wait".into()]);
        assert_eq!(JobPhase::of(&suspended, &state), JobPhase::Suspended);

        let done = Checkpoint::new(json!({}), vec![]);
        assert_eq!(JobPhase::of(&done, &state), JobPhase::Failed);

        state.generated = Some(json!([]));
        assert_eq!(JobPhase::of(&done, &state), JobPhase::Completed);
    }
}
