//! # quizgen-worker - Quiz Generation Worker
//!
//! The expensive half of a quiz job, and the plumbing that reaches it:
//!
//! - [`transport`] - [`HttpDispatcher`] and [`FunctionDispatcher`], the
//!   [`Dispatcher`](quizgen_core::Dispatcher) implementations used by the server
//! - [`service`] - the worker's own HTTP service (`POST /generate_quiz`)
//! - [`generator`] - [`QuizGenerator`] and the OpenAI-compatible client
//! - [`auth`] - HS256 bearer token verification shared with the server
//!
//! ```rust,ignore
//! use quizgen_worker::{build_dispatcher, DispatchConfig};
//!
//! let dispatcher = build_dispatcher(&DispatchConfig::http("http://worker:8090"))?;
//! ```

pub mod auth;
pub mod config;
pub mod error;
pub mod generator;
pub mod service;
pub mod transport;

pub use auth::{bearer_token, AuthError, Claims, JwtConfig, TokenVerifier, DEFAULT_AUDIENCE};
pub use config::{DispatchConfig, GeneratorConfig, Transport, WorkerConfig};
pub use error::{Result, WorkerError};
pub use generator::{parse_exercises, OpenAiGenerator, QuizGenerator, QuizQuestion};
pub use service::{process_task, worker_router, WorkerApiError, WorkerState};
pub use transport::{build_dispatcher, FunctionDispatcher, HttpDispatcher, GENERATE_PATH};
