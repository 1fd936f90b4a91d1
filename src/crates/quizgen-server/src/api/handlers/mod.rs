//! Request handlers

pub mod callback;
pub mod checkpoints;
pub mod health;
pub mod jobs;

pub use callback::worker_callback;
pub use checkpoints::list_job_checkpoints;
pub use health::{health, health_detailed};
pub use jobs::generate_quiz;
