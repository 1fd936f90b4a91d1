//! Checkpoint storage trait for pluggable backends
//!
//! [`CheckpointSaver`] is the only seam between job execution and durable
//! storage. The executor calls it once per step; the batch poll controller reads
//! through it to decide what to report. Backends exist for memory
//! ([`InMemoryCheckpointSaver`](crate::InMemoryCheckpointSaver)) and SQLite (in
//! `quizgen-server`).
//!
//! # Consistency contract
//!
//! Every backend must provide the same guarantees:
//!
//! 1. **Idempotent upsert** - putting a checkpoint whose key
//!    `(job_id, checkpoint_ns, checkpoint.id)` already exists with the same
//!    content and parent succeeds and returns the stored config.
//! 2. **No silent overwrite** - putting different content under an existing key
//!    fails with [`CheckpointError::Conflict`](crate::CheckpointError::Conflict).
//! 3. **Linear history** - a new checkpoint must name the current latest
//!    checkpoint as its parent (or none, for the first checkpoint). Anything else
//!    means another writer advanced the job first, and is a conflict.
//! 4. **Latest = childless** - with no `checkpoint_id`, reads resolve to the
//!    checkpoint that no other checkpoint in the chain names as parent.
//!
//! ```text
//! executor step N                          CheckpointSaver
//!   │ put_writes(cp_N, [("outcome", ..)])  ──→  pending write on cp_N
//!   │ put(parent = cp_N, cp_N+1)           ──→  conflict check, append
//!   ↓
//! executor step N+1 ...
//! ```

use crate::checkpoint::{Checkpoint, CheckpointConfig, CheckpointMetadata, CheckpointTuple};
use crate::error::Result;
use async_trait::async_trait;
use futures::stream::Stream;
use std::pin::Pin;

/// Finite stream of checkpoint tuples, newest first
///
/// Backends may load the requested page up front and yield from memory; pass
/// `limit` to bound what is read.
pub type CheckpointStream = Pin<Box<dyn Stream<Item = Result<CheckpointTuple>> + Send>>;

/// Storage backend for job checkpoints
#[async_trait]
pub trait CheckpointSaver: Send + Sync {
    /// Fetch a checkpoint without its metadata
    async fn get(&self, config: &CheckpointConfig) -> Result<Option<Checkpoint>> {
        Ok(self.get_tuple(config).await?.map(|tuple| tuple.checkpoint))
    }

    /// Fetch a checkpoint tuple.
    ///
    /// With `config.checkpoint_id` set the exact checkpoint is returned; without
    /// it, the latest checkpoint of the chain. `Ok(None)` when nothing matches.
    /// The returned tuple carries the pending writes recorded against it.
    async fn get_tuple(&self, config: &CheckpointConfig) -> Result<Option<CheckpointTuple>>;

    /// List a chain's checkpoints, newest first.
    ///
    /// `before` restricts the listing to checkpoints strictly older than the one
    /// it names, so the last item of one page is the cursor for the next.
    /// An unknown `before` id yields an empty stream.
    async fn list(
        &self,
        config: &CheckpointConfig,
        before: Option<&CheckpointConfig>,
        limit: Option<usize>,
    ) -> Result<CheckpointStream>;

    /// Store a checkpoint.
    ///
    /// `config.checkpoint_id` names the parent (the checkpoint the new one was
    /// derived from); `None` starts a new chain. Returns the config addressing
    /// the stored checkpoint.
    ///
    /// # Errors
    ///
    /// [`CheckpointError::Conflict`](crate::CheckpointError::Conflict) when the
    /// key exists with different content, or when the parent is not the chain's
    /// latest checkpoint.
    async fn put(
        &self,
        config: &CheckpointConfig,
        checkpoint: Checkpoint,
        metadata: CheckpointMetadata,
    ) -> Result<CheckpointConfig>;

    /// Record writes against an existing checkpoint.
    ///
    /// `task_id` has the form `"{checkpoint_id}:{step}"`. A write already
    /// recorded for the same `(task_id, channel)` is kept; the first write wins.
    async fn put_writes(
        &self,
        config: &CheckpointConfig,
        writes: Vec<(String, serde_json::Value)>,
        task_id: String,
    ) -> Result<()>;
}
