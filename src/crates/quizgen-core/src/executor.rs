//! Step executor and suspend/resume controller
//!
//! [`JobRunner`] drives a job through the [`JobGraph`](crate::graph::JobGraph)
//! one step at a time, persisting a checkpoint after every step:
//!
//! ```text
//! latest checkpoint (next = [step])
//!   │ run step (or replay its recorded outcome)
//!   │ put_writes(latest, outcome)          crash here → outcome replayed
//!   │ state.apply(update)
//!   │ put(parent = latest, new checkpoint) conflict → another writer won
//!   ↓
//! new checkpoint (next = [successor])      … until suspend or END
//! ```
//!
//! A step that returns an error does not abort the invocation: the error text
//! is captured into `state.error` and the job flows to `finalize`.
//!
//! Each invocation (`start` or `resume`) increments the run counter recorded in
//! checkpoint metadata and may run at most `max_steps_per_run` steps.

use async_trait::async_trait;
use futures::TryStreamExt;
use quizgen_checkpoint::{
    Checkpoint, CheckpointConfig, CheckpointMetadata, CheckpointSaver, CheckpointSource,
    CheckpointTuple,
};
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::error::{GraphError, ResumeError, Result};
use crate::graph::{JobGraph, Next, Step};
use crate::job::{JobId, JobPhase, JobReport};
use crate::outcome::StepOutcome;
use crate::resume::ResumeValue;
use crate::state::{JobRequest, JobState, JobUpdate};

/// Channel under which a step's outcome is recorded as a pending write
pub const OUTCOME_CHANNEL: &str = "__outcome__";

/// Error type returned by step implementations
pub type StepError = Box<dyn std::error::Error + Send + Sync>;

/// Runs individual steps against job state
#[async_trait]
pub trait StepHandler: Send + Sync {
    /// Run `step`. `resume` is set only for the first step of a resumed
    /// invocation.
    async fn run(
        &self,
        step: Step,
        state: &JobState,
        resume: Option<&ResumeValue>,
    ) -> std::result::Result<StepOutcome, StepError>;
}

/// Executor settings
#[derive(Debug, Clone)]
pub struct RunnerConfig {
    pub max_steps_per_run: usize,
    pub checkpoint_ns: String,
}

impl Default for RunnerConfig {
    fn default() -> Self {
        Self {
            max_steps_per_run: 25,
            checkpoint_ns: String::new(),
        }
    }
}

/// A job as of its latest checkpoint
#[derive(Debug, Clone)]
pub struct JobSnapshot {
    pub config: CheckpointConfig,
    pub checkpoint: Checkpoint,
    pub metadata: CheckpointMetadata,
    pub state: JobState,
    pub phase: JobPhase,
}

impl JobSnapshot {
    fn from_tuple(tuple: CheckpointTuple) -> Result<Self> {
        let state: JobState = serde_json::from_value(tuple.checkpoint.state.clone())?;
        let phase = JobPhase::of(&tuple.checkpoint, &state);
        Ok(Self {
            config: tuple.config,
            checkpoint: tuple.checkpoint,
            metadata: tuple.metadata,
            state,
            phase,
        })
    }

    pub fn job_id(&self) -> &str {
        &self.state.job_id
    }

    pub fn report(&self) -> JobReport {
        JobReport::from_state(self.phase, &self.state)
    }
}

/// Starts, resumes and inspects jobs
#[derive(Clone)]
pub struct JobRunner {
    saver: Arc<dyn CheckpointSaver>,
    steps: Arc<dyn StepHandler>,
    config: RunnerConfig,
}

impl JobRunner {
    pub fn new(saver: Arc<dyn CheckpointSaver>, steps: Arc<dyn StepHandler>) -> Self {
        Self {
            saver,
            steps,
            config: RunnerConfig::default(),
        }
    }

    pub fn with_config(mut self, config: RunnerConfig) -> Self {
        self.config = config;
        self
    }

    pub fn saver(&self) -> &Arc<dyn CheckpointSaver> {
        &self.saver
    }

    fn chain(&self, job_id: &str) -> CheckpointConfig {
        CheckpointConfig::new(job_id).with_checkpoint_ns(self.config.checkpoint_ns.clone())
    }

    /// Create a job for `owner_id` and run it until it suspends or ends.
    ///
    /// The request must already be validated.
    pub async fn start(
        &self,
        owner_id: &str,
        request: JobRequest,
        credential: Option<String>,
    ) -> Result<JobSnapshot> {
        let job_id = JobId::generate(owner_id);
        let state = JobState::new(owner_id, job_id.as_str(), request);
        let checkpoint = Checkpoint::new(
            serde_json::to_value(&state)?,
            Next::Step(JobGraph::ENTRY).pending(),
        );
        let metadata = CheckpointMetadata::new()
            .with_source(CheckpointSource::Input)
            .with_step(-1)
            .with_run(1);

        let config = self
            .saver
            .put(&self.chain(job_id.as_str()), checkpoint.clone(), metadata.clone())
            .await?;
        info!(job_id = %job_id, owner_id, "job created");

        let tuple = CheckpointTuple::new(config, checkpoint, metadata);
        self.drive(tuple, state.with_credential(credential), None, 1)
            .await
    }

    /// Resume a job.
    ///
    /// Terminal jobs are returned unchanged without running anything. A payload
    /// must match the job's identity and may only be delivered while the job is
    /// suspended.
    pub async fn resume(
        &self,
        job_id: &str,
        value: ResumeValue,
        credential: Option<String>,
    ) -> Result<JobSnapshot> {
        let tuple = self
            .saver
            .get_tuple(&self.chain(job_id))
            .await?
            .ok_or_else(|| ResumeError::UnknownJob(job_id.to_string()))?;
        let snapshot = JobSnapshot::from_tuple(tuple.clone())?;

        if snapshot.phase.is_terminal() {
            debug!(job_id, phase = ?snapshot.phase, "resume of terminal job is a no-op");
            return Ok(snapshot);
        }

        if let Err(err) = value.validate_for(&snapshot.state) {
            warn!(job_id, error = %err, "resume payload rejected");
            return Err(err.into());
        }
        if !value.is_poll() && snapshot.phase != JobPhase::Suspended {
            return Err(ResumeError::NotSuspended(job_id.to_string()).into());
        }

        let run = snapshot.metadata.run.unwrap_or(0) + 1;
        let state = snapshot.state.with_credential(credential);
        self.drive(tuple, state, Some(value), run).await
    }

    /// The job as of its latest checkpoint
    pub async fn snapshot(&self, job_id: &str) -> Result<Option<JobSnapshot>> {
        match self.saver.get_tuple(&self.chain(job_id)).await? {
            Some(tuple) => Ok(Some(JobSnapshot::from_tuple(tuple)?)),
            None => Ok(None),
        }
    }

    /// Checkpoint history of a job, newest first
    ///
    /// `before` pages backwards from a checkpoint id; an unknown id yields
    /// nothing.
    pub async fn history(
        &self,
        job_id: &str,
        before: Option<&str>,
        limit: Option<usize>,
    ) -> Result<Vec<CheckpointTuple>> {
        let before = before.map(|id| self.chain(job_id).with_checkpoint_id(id));
        let stream = self
            .saver
            .list(&self.chain(job_id), before.as_ref(), limit)
            .await?;
        let tuples: Vec<CheckpointTuple> = stream.try_collect().await?;
        Ok(tuples)
    }

    async fn drive(
        &self,
        mut tuple: CheckpointTuple,
        mut state: JobState,
        mut resume: Option<ResumeValue>,
        run: u32,
    ) -> Result<JobSnapshot> {
        let mut steps_run = 0;

        loop {
            let Some(step_name) = tuple.checkpoint.next.first() else {
                info!(job_id = %state.job_id, failed = state.is_failed(), "job finished");
                return JobSnapshot::from_tuple(tuple);
            };
            let step: Step = step_name.parse()?;

            if steps_run >= self.config.max_steps_per_run {
                return Err(GraphError::StepLimit {
                    job_id: state.job_id.clone(),
                    limit: self.config.max_steps_per_run,
                });
            }
            steps_run += 1;

            let task_id = format!("{}:{}", tuple.checkpoint.id, step);
            let resume_value = resume.take();
            let outcome: StepOutcome = match tuple.pending_write(&task_id, OUTCOME_CHANNEL) {
                Some(recorded) if step.is_replayable() => {
                    debug!(job_id = %state.job_id, %step, "replaying recorded outcome");
                    serde_json::from_value(recorded.value.clone())?
                }
                _ => {
                    let outcome = self.run_step(step, &state, resume_value.as_ref()).await;
                    if !outcome.is_suspend() && step.is_replayable() {
                        self.saver
                            .put_writes(
                                &tuple.config,
                                vec![(OUTCOME_CHANNEL.to_string(), serde_json::to_value(&outcome)?)],
                                task_id,
                            )
                            .await?;
                    }
                    outcome
                }
            };

            let (update, terminal) = match outcome {
                StepOutcome::Suspend { reason } => {
                    info!(job_id = %state.job_id, %step, reason, "job suspended");
                    return JobSnapshot::from_tuple(tuple);
                }
                StepOutcome::Continue { update } => (update, false),
                StepOutcome::Terminal { update } => (update, true),
            };

            state.apply(update);
            let next = if terminal {
                Next::End
            } else {
                JobGraph::next(step, &state)?
            };

            let source = match resume_value {
                Some(ResumeValue::Payload(_)) => CheckpointSource::Update,
                _ => CheckpointSource::Loop,
            };
            let checkpoint = Checkpoint::new(serde_json::to_value(&state)?, next.pending());
            let metadata = CheckpointMetadata::new()
                .with_source(source)
                .with_step(tuple.metadata.step.unwrap_or(-1) + 1)
                .with_node(step.name())
                .with_run(run);

            let config = self
                .saver
                .put(&tuple.config, checkpoint.clone(), metadata.clone())
                .await?;
            debug!(job_id = %state.job_id, %step, next = ?next, "step persisted");

            tuple = CheckpointTuple::new(config, checkpoint, metadata)
                .with_parent_config(tuple.config);
        }
    }

    async fn run_step(
        &self,
        step: Step,
        state: &JobState,
        resume: Option<&ResumeValue>,
    ) -> StepOutcome {
        match self.steps.run(step, state, resume).await {
            Ok(outcome) => outcome,
            Err(err) => {
                warn!(job_id = %state.job_id, %step, error = %err, "step failed");
                StepOutcome::proceed(JobUpdate::failed(err.to_string()))
            }
        }
    }
}
