//! The fixed quiz job graph
//!
//! Steps are an enum and transitions a static table: each step has either an
//! unconditional successor or a typed router that inspects the state and picks
//! one of a declared set of targets.
//!
//! ```text
//!                  ┌──────────────┐
//!                  │ fetch_words  │
//!                  └──────┬───────┘
//!         url ┌───────────┼────────────┬──────────┐ error
//!             │      none │       text │          │
//!             │    ┌──────▼───────┐    │          │
//!             │    │ pick_article │    │          │
//!             │    └──────┬───────┘    │          │
//!             │    ┌──────▼───────┐    │          │
//!             └───→│scrape_content│    │          │
//!                  └──────┬───────┘    │          │
//!                  ┌──────▼───────┐    │          │
//!                  │trigger_worker│←───┘          │
//!                  └──────┬───────┘               │
//!                  ┌──────▼───────┐   done/error  │
//!             ┌───→│ check_status ├────────────┐  │
//!             │    └──────┬───────┘            │  │
//!             │    ┌──────▼───────┐     ┌──────▼──▼┐
//!             └────┤     wait     │     │ finalize │──→ END
//!                  └──────────────┘     └──────────┘
//! ```
//!
//! The only cycle is `check_status ⇄ wait`, and `wait` is the only step that
//! suspends.

use serde::{Deserialize, Serialize};
use std::collections::{HashSet, VecDeque};
use std::fmt;
use std::str::FromStr;

use crate::error::{GraphError, Result};
use crate::state::JobState;

/// A named step of the job graph
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Step {
    FetchWords,
    PickArticle,
    ScrapeContent,
    TriggerWorker,
    CheckStatus,
    Wait,
    Finalize,
}

impl Step {
    pub const ALL: [Step; 7] = [
        Step::FetchWords,
        Step::PickArticle,
        Step::ScrapeContent,
        Step::TriggerWorker,
        Step::CheckStatus,
        Step::Wait,
        Step::Finalize,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            Step::FetchWords => "fetch_words",
            Step::PickArticle => "pick_article",
            Step::ScrapeContent => "scrape_content",
            Step::TriggerWorker => "trigger_worker",
            Step::CheckStatus => "check_status",
            Step::Wait => "wait",
            Step::Finalize => "finalize",
        }
    }

    /// Whether a recorded outcome of this step may be replayed on recovery.
    ///
    /// `wait` depends on the resume value of the invocation that runs it.
    pub fn is_replayable(&self) -> bool {
        !matches!(self, Step::Wait)
    }
}

impl fmt::Display for Step {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Step {
    type Err = GraphError;

    fn from_str(s: &str) -> Result<Self> {
        Step::ALL
            .into_iter()
            .find(|step| step.name() == s)
            .ok_or_else(|| GraphError::UnknownStep(s.to_string()))
    }
}

/// Where control goes after a step
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Next {
    Step(Step),
    End,
}

impl Next {
    /// The checkpoint's `next` list for this transition
    pub fn pending(&self) -> Vec<String> {
        match self {
            Next::Step(step) => vec![step.name().to_string()],
            Next::End => Vec::new(),
        }
    }
}

/// Chooses a successor from the job state
pub type Router = fn(&JobState) -> Next;

/// Outgoing edge of a step
#[derive(Clone, Copy)]
pub enum Edge {
    Always(Next),
    Route {
        router: Router,
        targets: &'static [Next],
    },
}

impl Edge {
    fn targets(&self) -> Vec<Next> {
        match self {
            Edge::Always(next) => vec![*next],
            Edge::Route { targets, .. } => targets.to_vec(),
        }
    }
}

impl fmt::Debug for Edge {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Edge::Always(next) => f.debug_tuple("Always").field(next).finish(),
            Edge::Route { targets, .. } => f.debug_struct("Route").field("targets", targets).finish(),
        }
    }
}

const SOURCE_TARGETS: &[Next] = &[
    Next::Step(Step::PickArticle),
    Next::Step(Step::ScrapeContent),
    Next::Step(Step::TriggerWorker),
    Next::Step(Step::Finalize),
];

const STATUS_TARGETS: &[Next] = &[Next::Step(Step::Wait), Next::Step(Step::Finalize)];

/// Route after `fetch_words` on how the article text will be obtained
pub fn route_source(state: &JobState) -> Next {
    if state.is_failed() {
        return Next::Step(Step::Finalize);
    }
    let has_text = state
        .request
        .source_text
        .as_deref()
        .is_some_and(|text| !text.trim().is_empty());
    if has_text {
        Next::Step(Step::TriggerWorker)
    } else if state.request.source_url.is_some() {
        Next::Step(Step::ScrapeContent)
    } else {
        Next::Step(Step::PickArticle)
    }
}

/// Route after `check_status`: leave the polling loop once there is an outcome
pub fn route_status(state: &JobState) -> Next {
    if state.is_settled() {
        Next::Step(Step::Finalize)
    } else {
        Next::Step(Step::Wait)
    }
}

/// The static job graph
#[derive(Debug, Clone, Copy, Default)]
pub struct JobGraph;

impl JobGraph {
    pub const ENTRY: Step = Step::FetchWords;

    /// Step at which jobs suspend awaiting the worker
    pub const SUSPENSION_POINT: Step = Step::Wait;

    pub fn edge(step: Step) -> Edge {
        match step {
            Step::FetchWords => Edge::Route {
                router: route_source,
                targets: SOURCE_TARGETS,
            },
            Step::PickArticle => Edge::Always(Next::Step(Step::ScrapeContent)),
            Step::ScrapeContent => Edge::Always(Next::Step(Step::TriggerWorker)),
            Step::TriggerWorker => Edge::Always(Next::Step(Step::CheckStatus)),
            Step::CheckStatus => Edge::Route {
                router: route_status,
                targets: STATUS_TARGETS,
            },
            Step::Wait => Edge::Always(Next::Step(Step::CheckStatus)),
            Step::Finalize => Edge::Always(Next::End),
        }
    }

    /// Successor of `step` given the state after it ran
    pub fn next(step: Step, state: &JobState) -> Result<Next> {
        match Self::edge(step) {
            Edge::Always(next) => Ok(next),
            Edge::Route { router, targets } => {
                let next = router(state);
                if targets.contains(&next) {
                    Ok(next)
                } else {
                    Err(GraphError::Validation(format!(
                        "router for '{}' chose undeclared target {:?}",
                        step, next
                    )))
                }
            }
        }
    }

    /// Check that every step is reachable from the entry and that END is reachable
    pub fn validate() -> Result<()> {
        let mut seen = HashSet::new();
        let mut reaches_end = false;
        let mut queue = VecDeque::from([Self::ENTRY]);

        while let Some(step) = queue.pop_front() {
            if !seen.insert(step) {
                continue;
            }
            for target in Self::edge(step).targets() {
                match target {
                    Next::Step(next) => queue.push_back(next),
                    Next::End => reaches_end = true,
                }
            }
        }

        if let Some(orphan) = Step::ALL.iter().find(|step| !seen.contains(*step)) {
            return Err(GraphError::Validation(format!(
                "step '{}' is unreachable",
                orphan
            )));
        }
        if !reaches_end {
            return Err(GraphError::Validation("no path reaches END".to_string()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::{JobRequest, JobUpdate};
    use serde_json::json;

    fn state_with(request: JobRequest) -> JobState {
        JobState::new("u1", "u1:job", request)
    }

    #[test]
    fn test_graph_is_valid() {
        JobGraph::validate().unwrap();
    }

    #[test]
    fn test_step_names_round_trip() {
        for step in Step::ALL {
            assert_eq!(step.name().parse::<Step>().unwrap(), step);
        }
        assert!(matches!(
            "generate".parse::<Step>(),
            Err(GraphError::UnknownStep(_))
        ));
    }

    #[test]
    fn test_route_without_source_picks_article() {
        let state = state_with(JobRequest::default());
        assert_eq!(route_source(&state), Next::Step(Step::PickArticle));
    }

    #[test]
    fn test_route_with_url_scrapes() {
        let state = state_with(JobRequest {
            source_url: Some("https://nos.nl/artikel/1".into()),
            ..Default::default()
        });
        assert_eq!(route_source(&state), Next::Step(Step::ScrapeContent));
    }

    #[test]
    fn test_route_with_text_dispatches() {
        let state = state_with(JobRequest {
            source_text: Some("tekst".into()),
            source_title: Some("titel".into()),
            source_url: Some("https://nos.nl/artikel/1".into()),
            ..Default::default()
        });
        assert_eq!(route_source(&state), Next::Step(Step::TriggerWorker));
    }

    #[test]
    fn test_route_on_error_finalizes() {
        let mut state = state_with(JobRequest::default());
        state.apply(JobUpdate::failed("no words"));
        assert_eq!(route_source(&state), Next::Step(Step::Finalize));
        assert_eq!(route_status(&state), Next::Step(Step::Finalize));
    }

    #[test]
    fn test_status_loop() {
        let mut state = state_with(JobRequest::default());
        assert_eq!(JobGraph::next(Step::CheckStatus, &state).unwrap(), Next::Step(Step::Wait));
        assert_eq!(JobGraph::next(Step::Wait, &state).unwrap(), Next::Step(Step::CheckStatus));

        state.generated = Some(json!([]));
        assert_eq!(
            JobGraph::next(Step::CheckStatus, &state).unwrap(),
            Next::Step(Step::Finalize)
        );
        assert_eq!(JobGraph::next(Step::Finalize, &state).unwrap(), Next::End);
    }
}
