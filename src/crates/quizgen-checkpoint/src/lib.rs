//! # quizgen-checkpoint - Durable Job Snapshots
//!
//! Trait-based checkpoint abstractions for persisting and restoring quiz job
//! state between invocations. A job runs a few steps per request, suspends while
//! an external worker generates content, and is resumed by later polls; the
//! checkpoint chain is what lets each invocation continue exactly where the
//! previous one stopped.
//!
//! ## Core Types
//!
//! - [`Checkpoint`] - state snapshot plus the steps still to run
//! - [`CheckpointConfig`] - `(job_id, checkpoint_ns, checkpoint_id?)` address
//! - [`CheckpointMetadata`] - source, step index, step name, run count
//! - [`CheckpointTuple`] - checkpoint with parent link and pending writes
//! - [`CheckpointSaver`] - storage backend trait
//! - [`InMemoryCheckpointSaver`] - reference backend for tests and development
//!
//! ## Guarantees
//!
//! All backends implement idempotent upserts, reject conflicting content under
//! an existing key, and keep each job's history linear. See [`traits`] for the
//! full contract.

pub mod checkpoint;
pub mod error;
pub mod memory;
pub mod serializer;
pub mod traits;

pub use checkpoint::{
    Checkpoint, CheckpointConfig, CheckpointId, CheckpointMetadata, CheckpointSource,
    CheckpointTuple, PendingWrite,
};
pub use error::{CheckpointError, Result};
pub use memory::InMemoryCheckpointSaver;
pub use serializer::{JsonSerializer, SerializerProtocol};
pub use traits::{CheckpointSaver, CheckpointStream};
