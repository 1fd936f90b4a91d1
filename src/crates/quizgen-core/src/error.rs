//! Error types for job execution
//!
//! Step failures are not errors at this level: the executor captures them into
//! the job state and the job fails normally. [`GraphError`] covers what is left:
//! a broken graph, a misbehaving store, and resume calls that must be refused.
//!
//! ```text
//! GraphError
//! ├── Validation        - Static graph is malformed
//! ├── UnknownStep       - Checkpoint names a step the graph does not have
//! ├── StepLimit         - One invocation ran too many steps
//! ├── Resume            - Resume refused (mismatch, unknown job, not suspended)
//! ├── Checkpoint        - Storage failure or consistency conflict
//! └── Serialization     - State could not be encoded or decoded
//! ```

use quizgen_checkpoint::CheckpointError;
use thiserror::Error;

/// Result type for job execution
pub type Result<T> = std::result::Result<T, GraphError>;

/// Errors that stop a job invocation
#[derive(Error, Debug)]
pub enum GraphError {
    /// The static graph failed validation
    ///
    /// Raised by [`JobGraph::validate`](crate::graph::JobGraph::validate) when a
    /// step is unreachable or a route names a step outside its declared targets.
    #[error("Graph validation failed: {0}")]
    Validation(String),

    /// A checkpoint refers to a step name the graph does not define
    #[error("Unknown step '{0}'")]
    UnknownStep(String),

    /// A single invocation exceeded its step budget
    ///
    /// Guards against a router that never leaves the polling loop.
    #[error("Step limit of {limit} reached for job {job_id}")]
    StepLimit {
        /// Job that ran away
        job_id: String,
        /// Configured maximum steps per invocation
        limit: usize,
    },

    /// Resume was refused
    #[error(transparent)]
    Resume(#[from] ResumeError),

    /// Checkpoint persistence failed
    ///
    /// A [`CheckpointError::Conflict`] here means another invocation advanced
    /// the same job concurrently.
    #[error("Checkpoint error: {0}")]
    Checkpoint(#[from] CheckpointError),

    /// Job state could not be encoded or decoded
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl GraphError {
    /// Whether this error reports a concurrent writer on the same job
    pub fn is_conflict(&self) -> bool {
        matches!(self, GraphError::Checkpoint(err) if err.is_conflict())
    }
}

/// Reasons a resume command is refused
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ResumeError {
    /// No checkpoint exists for the job
    #[error("unknown job {0}")]
    UnknownJob(String),

    /// A payload field disagrees with the job it was delivered to
    #[error("resume payload {field} '{actual}' does not match job ({expected})")]
    Mismatch {
        field: &'static str,
        expected: String,
        actual: String,
    },

    /// A payload arrived while the job was not waiting for one
    #[error("job {0} is not suspended")]
    NotSuspended(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_conflict_detection() {
        let err: GraphError = CheckpointError::Conflict("advanced".into()).into();
        assert!(err.is_conflict());

        let err: GraphError = CheckpointError::Storage("disk full".into()).into();
        assert!(!err.is_conflict());
    }

    #[test]
    fn test_resume_error_display() {
        let err = GraphError::from(ResumeError::Mismatch {
            field: "job_id",
            expected: "u1:a".into(),
            actual: "u1:b".into(),
        });
        assert_eq!(
            err.to_string(),
            "resume payload job_id 'u1:b' does not match job (u1:a)"
        );
    }
}
