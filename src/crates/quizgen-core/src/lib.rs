//! # quizgen-core - Resumable Quiz Generation Jobs
//!
//! A quiz job pulls target words, sources an article, hands the expensive
//! generation step to an external worker, and waits for the result without
//! holding a client request open. This crate holds everything about how such
//! a job runs; storage and the outside world are behind traits.
//!
//! ## Components
//!
//! - [`graph`] - the fixed step graph with typed routers
//! - [`executor`] - [`JobRunner`]: runs steps, checkpoints after each, suspends and resumes
//! - [`resume`] - `"poll"` / payload resume values and their validation
//! - [`dispatch`] - worker dispatch contract and the grace-window race
//! - [`steps`] - [`QuizSteps`], the step implementations
//! - [`services`] - word, article and result-store collaborator traits
//!
//! ## Lifecycle
//!
//! ```text
//! CREATED → RUNNING → SUSPENDED ⇄ RUNNING → COMPLETED | FAILED
//! ```
//!
//! Terminal jobs ignore further resumes and keep reporting their outcome.

pub mod dispatch;
pub mod error;
pub mod executor;
pub mod graph;
pub mod job;
pub mod outcome;
pub mod resume;
pub mod services;
pub mod state;
pub mod steps;

pub use dispatch::{
    dispatch_with_grace, CallbackStatus, DispatchBatch, DispatchError, DispatchOutcome,
    DispatchTask, Dispatcher, WorkerCallback,
};
pub use error::{GraphError, ResumeError, Result};
pub use executor::{JobRunner, JobSnapshot, RunnerConfig, StepError, StepHandler};
pub use graph::{JobGraph, Next, Step};
pub use job::{JobId, JobPhase, JobReport, JobStatus};
pub use outcome::StepOutcome;
pub use resume::ResumeValue;
pub use services::{
    ArticleSource, NewQuiz, QuizOutcome, QuizRecord, QuizStatus, ResultStore, ServiceError,
    WordSource,
};
pub use state::{Article, JobRequest, JobState, JobUpdate, RequestError, Word};
pub use steps::{QuizSteps, StepSettings};
