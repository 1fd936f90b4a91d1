//! In-memory checkpoint storage for development and testing
//!
//! [`InMemoryCheckpointSaver`] keeps every chain in a `HashMap` behind a tokio
//! `RwLock`. It enforces the full [`CheckpointSaver`] consistency contract, so
//! the executor and poll controller behave identically against it and against
//! the SQLite backend. Data is lost on restart.
//!
//! ```text
//! Arc<RwLock<HashMap>>
//!   ("user-1:0190..", "") ─→ [cp-1, cp-2, cp-3]    insertion order = chain order
//!   ("user-2:0190..", "") ─→ [cp-1]
//! ```
//!
//! Clones share the same storage.

use crate::{
    checkpoint::{
        Checkpoint, CheckpointConfig, CheckpointId, CheckpointMetadata, CheckpointTuple,
        PendingWrite,
    },
    error::{CheckpointError, Result},
    traits::{CheckpointSaver, CheckpointStream},
};
use async_trait::async_trait;
use futures::stream;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tokio::sync::RwLock;

/// Storage entry for in-memory checkpoints
#[derive(Debug, Clone)]
struct CheckpointEntry {
    checkpoint: Checkpoint,
    metadata: CheckpointMetadata,
    config: CheckpointConfig,
    parent_config: Option<CheckpointConfig>,
    writes: Vec<PendingWrite>,
}

impl CheckpointEntry {
    fn parent_id(&self) -> Option<&CheckpointId> {
        self.parent_config
            .as_ref()
            .and_then(|parent| parent.checkpoint_id.as_ref())
    }

    fn to_tuple(&self) -> CheckpointTuple {
        CheckpointTuple {
            config: self.config.clone(),
            checkpoint: self.checkpoint.clone(),
            metadata: self.metadata.clone(),
            parent_config: self.parent_config.clone(),
            pending_writes: self.writes.clone(),
        }
    }
}

/// (job_id, checkpoint_ns)
type ChainKey = (String, String);

type CheckpointStorage = Arc<RwLock<HashMap<ChainKey, Vec<CheckpointEntry>>>>;

fn chain_key(config: &CheckpointConfig) -> ChainKey {
    (config.job_id.clone(), config.checkpoint_ns.clone())
}

/// The entry no other entry names as its parent
fn latest(entries: &[CheckpointEntry]) -> Option<&CheckpointEntry> {
    let parents: HashSet<&CheckpointId> = entries.iter().filter_map(|e| e.parent_id()).collect();
    entries
        .iter()
        .rev()
        .find(|e| !parents.contains(&e.checkpoint.id))
}

/// In-memory checkpoint saver
///
/// # Example
///
/// ```rust
/// use quizgen_checkpoint::{Checkpoint, CheckpointConfig, CheckpointMetadata, CheckpointSaver, InMemoryCheckpointSaver};
///
/// # #[tokio::main]
/// # async fn main() -> Result<(), Box<dyn std::error::Error>> {
/// let saver = InMemoryCheckpointSaver::new();
/// let config = CheckpointConfig::new("user-1:job-1");
/// let stored = saver
///     .put(&config, Checkpoint::empty(), CheckpointMetadata::new().with_step(-1))
///     .await?;
/// assert!(saver.get_tuple(&stored).await?.is_some());
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone)]
pub struct InMemoryCheckpointSaver {
    storage: CheckpointStorage,
}

impl InMemoryCheckpointSaver {
    /// Create a new in-memory checkpoint saver
    pub fn new() -> Self {
        Self {
            storage: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    /// Number of chains being tracked
    pub async fn job_count(&self) -> usize {
        self.storage.read().await.len()
    }

    /// Total number of checkpoints across all chains
    pub async fn checkpoint_count(&self) -> usize {
        self.storage
            .read()
            .await
            .values()
            .map(|entries| entries.len())
            .sum()
    }

    /// Clear all checkpoints (useful for testing)
    pub async fn clear(&self) {
        self.storage.write().await.clear();
    }
}

impl Default for InMemoryCheckpointSaver {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl CheckpointSaver for InMemoryCheckpointSaver {
    async fn get_tuple(&self, config: &CheckpointConfig) -> Result<Option<CheckpointTuple>> {
        let storage = self.storage.read().await;

        let Some(entries) = storage.get(&chain_key(config)) else {
            return Ok(None);
        };

        let entry = match &config.checkpoint_id {
            Some(checkpoint_id) => entries.iter().find(|e| &e.checkpoint.id == checkpoint_id),
            None => latest(entries),
        };

        Ok(entry.map(CheckpointEntry::to_tuple))
    }

    async fn list(
        &self,
        config: &CheckpointConfig,
        before: Option<&CheckpointConfig>,
        limit: Option<usize>,
    ) -> Result<CheckpointStream> {
        let storage = self.storage.read().await;
        let entries = storage
            .get(&chain_key(config))
            .map(Vec::as_slice)
            .unwrap_or_default();

        let end = match before.and_then(|b| b.checkpoint_id.as_ref()) {
            Some(before_id) => entries
                .iter()
                .position(|e| &e.checkpoint.id == before_id)
                .unwrap_or(0),
            None => entries.len(),
        };

        let results: Vec<Result<CheckpointTuple>> = entries[..end]
            .iter()
            .rev()
            .take(limit.unwrap_or(usize::MAX))
            .map(|entry| Ok(entry.to_tuple()))
            .collect();

        Ok(Box::pin(stream::iter(results)))
    }

    async fn put(
        &self,
        config: &CheckpointConfig,
        checkpoint: Checkpoint,
        metadata: CheckpointMetadata,
    ) -> Result<CheckpointConfig> {
        let mut storage = self.storage.write().await;
        let entries = storage.entry(chain_key(config)).or_default();
        let parent_id = config.checkpoint_id.as_ref();

        if let Some(existing) = entries.iter().find(|e| e.checkpoint.id == checkpoint.id) {
            if existing.checkpoint.same_content(&checkpoint) && existing.parent_id() == parent_id
            {
                return Ok(existing.config.clone());
            }
            return Err(CheckpointError::Conflict(format!(
                "checkpoint {} of job {} already stored with different content",
                checkpoint.id, config.job_id
            )));
        }

        let latest_id = latest(entries.as_slice()).map(|e| &e.checkpoint.id);
        if latest_id != parent_id {
            return Err(CheckpointError::Conflict(format!(
                "job {} has advanced to {:?}, cannot append after {:?}",
                config.job_id, latest_id, parent_id
            )));
        }

        let checkpoint_config = config.latest().with_checkpoint_id(checkpoint.id.clone());

        entries.push(CheckpointEntry {
            checkpoint,
            metadata,
            config: checkpoint_config.clone(),
            parent_config: parent_id.map(|_| config.clone()),
            writes: Vec::new(),
        });

        Ok(checkpoint_config)
    }

    async fn put_writes(
        &self,
        config: &CheckpointConfig,
        writes: Vec<(String, serde_json::Value)>,
        task_id: String,
    ) -> Result<()> {
        let checkpoint_id = config
            .checkpoint_id
            .as_ref()
            .ok_or_else(|| CheckpointError::Invalid("checkpoint_id is required".to_string()))?;

        let mut storage = self.storage.write().await;

        let entry = storage
            .get_mut(&chain_key(config))
            .and_then(|entries| entries.iter_mut().find(|e| &e.checkpoint.id == checkpoint_id))
            .ok_or_else(|| CheckpointError::NotFound(checkpoint_id.clone()))?;

        for (channel, value) in writes {
            let recorded = entry
                .writes
                .iter()
                .any(|w| w.task_id == task_id && w.channel == channel);
            if !recorded {
                entry.writes.push(PendingWrite {
                    task_id: task_id.clone(),
                    channel,
                    value,
                });
            }
        }

        Ok(())
    }
}
