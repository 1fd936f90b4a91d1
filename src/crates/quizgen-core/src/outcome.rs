//! Tagged result of running one step

use serde::{Deserialize, Serialize};

use crate::state::JobUpdate;

/// What a step asks the executor to do next.
///
/// Serialized with an `outcome` tag so a completed step's result can be
/// recorded as a pending write and replayed after a crash.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum StepOutcome {
    /// Merge the update, persist, and follow the graph edge
    Continue { update: JobUpdate },

    /// Stop this invocation; the job waits for an external event
    Suspend { reason: String },

    /// Merge the update, persist, and end the job
    Terminal { update: JobUpdate },
}

impl StepOutcome {
    pub fn proceed(update: JobUpdate) -> Self {
        StepOutcome::Continue { update }
    }

    /// Continue with an empty delta
    pub fn pass() -> Self {
        StepOutcome::Continue {
            update: JobUpdate::none(),
        }
    }

    pub fn suspend(reason: impl Into<String>) -> Self {
        StepOutcome::Suspend {
            reason: reason.into(),
        }
    }

    pub fn terminal(update: JobUpdate) -> Self {
        StepOutcome::Terminal { update }
    }

    pub fn is_suspend(&self) -> bool {
        matches!(self, StepOutcome::Suspend { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_outcome_tagging() {
        let encoded = serde_json::to_value(StepOutcome::proceed(JobUpdate::failed("boom"))).unwrap();
        assert_eq!(
            encoded,
            json!({"outcome": "continue", "update": {"error": "boom"}})
        );

        let decoded: StepOutcome =
            serde_json::from_value(json!({"outcome": "suspend", "reason": "waiting"})).unwrap();
        assert!(decoded.is_suspend());
    }
}
