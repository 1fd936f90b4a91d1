//! Resume commands for suspended jobs
//!
//! A suspended job is continued with either the `"poll"` sentinel ("check
//! whether the result has landed") or a terminal [`WorkerCallback`] payload
//! that delivers the result directly. Payloads are validated against the job
//! they are addressed to before anything runs.

use serde::{Deserialize, Serialize};

use crate::dispatch::WorkerCallback;
use crate::error::ResumeError;
use crate::state::JobState;

const POLL_SENTINEL: &str = "poll";

/// Value a suspended job is resumed with
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "RawResumeValue", into = "RawResumeValue")]
pub enum ResumeValue {
    Poll,
    Payload(WorkerCallback),
}

#[derive(Serialize, Deserialize)]
#[serde(untagged)]
enum RawResumeValue {
    Sentinel(String),
    Payload(WorkerCallback),
}

impl TryFrom<RawResumeValue> for ResumeValue {
    type Error = String;

    fn try_from(raw: RawResumeValue) -> Result<Self, Self::Error> {
        match raw {
            RawResumeValue::Sentinel(s) if s == POLL_SENTINEL => Ok(ResumeValue::Poll),
            RawResumeValue::Sentinel(s) => Err(format!(
                "unknown resume value '{}', expected \"{}\" or a callback payload",
                s, POLL_SENTINEL
            )),
            RawResumeValue::Payload(payload) => Ok(ResumeValue::Payload(payload)),
        }
    }
}

impl From<ResumeValue> for RawResumeValue {
    fn from(value: ResumeValue) -> Self {
        match value {
            ResumeValue::Poll => RawResumeValue::Sentinel(POLL_SENTINEL.to_string()),
            ResumeValue::Payload(payload) => RawResumeValue::Payload(payload),
        }
    }
}

impl ResumeValue {
    pub fn is_poll(&self) -> bool {
        matches!(self, ResumeValue::Poll)
    }

    /// Check a payload's identity against the job it resumes.
    ///
    /// `Poll` always passes.
    pub fn validate_for(&self, state: &JobState) -> Result<(), ResumeError> {
        let ResumeValue::Payload(payload) = self else {
            return Ok(());
        };

        if payload.job_id != state.job_id {
            return Err(ResumeError::Mismatch {
                field: "job_id",
                expected: state.job_id.clone(),
                actual: payload.job_id.clone(),
            });
        }
        if payload.owner_id != state.owner_id {
            return Err(ResumeError::Mismatch {
                field: "owner_id",
                expected: state.owner_id.clone(),
                actual: payload.owner_id.clone(),
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::JobRequest;
    use serde_json::json;

    #[test]
    fn test_parse_poll_sentinel() {
        let value: ResumeValue = serde_json::from_value(json!("poll")).unwrap();
        assert!(value.is_poll());
        assert_eq!(serde_json::to_value(&value).unwrap(), json!("poll"));
    }

    #[test]
    fn test_reject_unknown_sentinel() {
        let result: Result<ResumeValue, _> = serde_json::from_value(json!("cancel"));
        assert!(result.is_err());
    }

    #[test]
    fn test_parse_payload() {
        let value: ResumeValue = serde_json::from_value(json!({
            "owner_id": "u1",
            "job_id": "u1:job",
            "result": [{"question": "Wat?", "answer": "dit", "english": "this"}],
            "status": "ready"
        }))
        .unwrap();
        assert!(matches!(value, ResumeValue::Payload(ref p) if p.job_id == "u1:job"));
    }

    #[test]
    fn test_payload_identity_must_match() {
        let state = JobState::new("u1", "u1:job", JobRequest::default());

        let ok = ResumeValue::Payload(WorkerCallback::ready("u1", "u1:job", json!([])));
        assert!(ok.validate_for(&state).is_ok());

        let wrong_job = ResumeValue::Payload(WorkerCallback::ready("u1", "u1:other", json!([])));
        assert!(matches!(
            wrong_job.validate_for(&state),
            Err(ResumeError::Mismatch { field: "job_id", .. })
        ));

        let wrong_owner = ResumeValue::Payload(WorkerCallback::ready("u2", "u1:job", json!([])));
        assert!(matches!(
            wrong_owner.validate_for(&state),
            Err(ResumeError::Mismatch { field: "owner_id", .. })
        ));

        assert!(ResumeValue::Poll.validate_for(&state).is_ok());
    }
}
