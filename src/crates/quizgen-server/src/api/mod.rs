//! HTTP API
//!
//! - `POST /functions/v1/generate-quiz` - create a job or poll a batch of jobs
//! - `POST /webhooks/worker-callback` - worker completion callback
//! - `GET /api/v1/jobs/:job_id/checkpoints` - checkpoint history of an owned job
//! - `GET /health`, `GET /api/v1/system/health`
//!
//! Every route except health requires a bearer token.

pub mod auth;
pub mod error;
pub mod handlers;
pub mod middleware;
pub mod routes;

pub use auth::AuthUser;
pub use error::{ApiError, ApiErrorResponse, ApiResult};
pub use routes::{create_router, AppState};
