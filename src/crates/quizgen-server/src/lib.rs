//! # quizgen-server
//!
//! HTTP front of the quiz job system. Clients create jobs and poll batches of
//! them through a single endpoint; the worker reports results through a
//! callback. Jobs, checkpoints and quiz records live in SQLite.
//!
//! ```text
//! client ──POST /functions/v1/generate-quiz──→ PollController ─→ JobRunner ─→ SqliteCheckpointSaver
//!                                                                   │
//!                                                                   └─ dispatch ─→ worker
//! worker ──POST /webhooks/worker-callback───→ QuizRepository (record completed)
//! ```

pub mod api;
pub mod articles;
pub mod config;
pub mod db;
pub mod poll;

pub use api::{create_router, AppState};
pub use articles::WebArticleSource;
pub use config::{ServerConfig, ServerConfigError};
pub use poll::PollController;
