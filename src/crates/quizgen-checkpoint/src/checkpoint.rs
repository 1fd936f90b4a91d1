//! Checkpoint data structures
//!
//! A [`Checkpoint`] is an immutable snapshot of one job's state together with the
//! steps that still have to run from it. Checkpoints of the same `(job_id,
//! checkpoint_ns)` pair form a single linear chain through their parent links;
//! the latest checkpoint is the one no other checkpoint names as its parent.
//!
//! ```text
//!  job "user-1:0190..."
//!  ┌──────────────┐    ┌──────────────┐    ┌──────────────┐
//!  │ cp-1 (input) │ ←─ │ cp-2 (loop)  │ ←─ │ cp-3 (loop)  │  ← latest
//!  │ next: fetch  │    │ next: pick   │    │ next: scrape │
//!  └──────────────┘    └──────────────┘    └──────────────┘
//! ```

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use uuid::Uuid;

/// Checkpoint identifier.
///
/// Generated as a UUIDv7 so identifiers sort by creation time.
pub type CheckpointId = String;

/// How a checkpoint came to exist
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum CheckpointSource {
    /// Created from the job's initial input
    Input,
    /// Created by the executor after running a step
    Loop,
    /// Created by an external update (e.g. a delivered worker result)
    Update,
}

impl CheckpointSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            CheckpointSource::Input => "input",
            CheckpointSource::Loop => "loop",
            CheckpointSource::Update => "update",
        }
    }
}

/// Metadata recorded alongside each checkpoint
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct CheckpointMetadata {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source: Option<CheckpointSource>,

    /// Position in the chain: -1 for the input checkpoint, then 0, 1, 2...
    #[serde(skip_serializing_if = "Option::is_none")]
    pub step: Option<i32>,

    /// Name of the step whose result produced this checkpoint
    #[serde(skip_serializing_if = "Option::is_none")]
    pub node: Option<String>,

    /// How many invocations (create or resume) the job has seen so far
    #[serde(skip_serializing_if = "Option::is_none")]
    pub run: Option<u32>,

    #[serde(flatten)]
    pub extra: HashMap<String, serde_json::Value>,
}

impl CheckpointMetadata {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_source(mut self, source: CheckpointSource) -> Self {
        self.source = Some(source);
        self
    }

    pub fn with_step(mut self, step: i32) -> Self {
        self.step = Some(step);
        self
    }

    pub fn with_node(mut self, node: impl Into<String>) -> Self {
        self.node = Some(node.into());
        self
    }

    pub fn with_run(mut self, run: u32) -> Self {
        self.run = Some(run);
        self
    }

    pub fn with_extra(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.extra.insert(key.into(), value);
        self
    }
}

/// Snapshot of job state at a point in time
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Checkpoint {
    /// Format version
    pub v: i32,

    pub id: CheckpointId,

    pub ts: DateTime<Utc>,

    /// Full job state
    pub state: serde_json::Value,

    /// Steps still to run from this checkpoint. Empty once the job is terminal.
    #[serde(default)]
    pub next: Vec<String>,
}

impl Checkpoint {
    pub const CURRENT_VERSION: i32 = 1;

    pub fn new(state: serde_json::Value, next: Vec<String>) -> Self {
        Self {
            v: Self::CURRENT_VERSION,
            id: Uuid::now_v7().to_string(),
            ts: Utc::now(),
            state,
            next,
        }
    }

    pub fn empty() -> Self {
        Self::new(serde_json::Value::Null, Vec::new())
    }

    /// True when no step remains to be run from this checkpoint
    pub fn is_terminal(&self) -> bool {
        self.next.is_empty()
    }

    /// Whether two checkpoints carry the same content under the same key.
    ///
    /// The timestamp is not part of the content: a retried write of the same
    /// snapshot may have been re-serialized.
    pub fn same_content(&self, other: &Checkpoint) -> bool {
        self.id == other.id && self.v == other.v && self.state == other.state && self.next == other.next
    }
}

/// Identifies a job's checkpoint chain and, optionally, one checkpoint in it
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub struct CheckpointConfig {
    pub job_id: String,

    #[serde(default)]
    pub checkpoint_ns: String,

    /// `None` addresses the latest checkpoint
    #[serde(skip_serializing_if = "Option::is_none")]
    pub checkpoint_id: Option<CheckpointId>,
}

impl CheckpointConfig {
    pub fn new(job_id: impl Into<String>) -> Self {
        Self {
            job_id: job_id.into(),
            checkpoint_ns: String::new(),
            checkpoint_id: None,
        }
    }

    pub fn with_checkpoint_ns(mut self, checkpoint_ns: impl Into<String>) -> Self {
        self.checkpoint_ns = checkpoint_ns.into();
        self
    }

    pub fn with_checkpoint_id(mut self, checkpoint_id: impl Into<CheckpointId>) -> Self {
        self.checkpoint_id = Some(checkpoint_id.into());
        self
    }

    /// The same chain, addressing its latest checkpoint
    pub fn latest(&self) -> Self {
        Self {
            job_id: self.job_id.clone(),
            checkpoint_ns: self.checkpoint_ns.clone(),
            checkpoint_id: None,
        }
    }
}

/// A write recorded against a checkpoint before its successor is persisted
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PendingWrite {
    /// `"{checkpoint_id}:{step}"` of the task that produced the write
    pub task_id: String,
    pub channel: String,
    pub value: serde_json::Value,
}

/// A checkpoint with its addressing, metadata, parent link and pending writes
#[derive(Debug, Clone)]
pub struct CheckpointTuple {
    pub config: CheckpointConfig,

    pub checkpoint: Checkpoint,

    pub metadata: CheckpointMetadata,

    pub parent_config: Option<CheckpointConfig>,

    pub pending_writes: Vec<PendingWrite>,
}

impl CheckpointTuple {
    pub fn new(
        config: CheckpointConfig,
        checkpoint: Checkpoint,
        metadata: CheckpointMetadata,
    ) -> Self {
        Self {
            config,
            checkpoint,
            metadata,
            parent_config: None,
            pending_writes: Vec::new(),
        }
    }

    pub fn with_parent_config(mut self, parent_config: CheckpointConfig) -> Self {
        self.parent_config = Some(parent_config);
        self
    }

    pub fn with_pending_writes(mut self, writes: Vec<PendingWrite>) -> Self {
        self.pending_writes = writes;
        self
    }

    /// The pending write recorded by `task_id` on `channel`, if any
    pub fn pending_write(&self, task_id: &str, channel: &str) -> Option<&PendingWrite> {
        self.pending_writes
            .iter()
            .find(|w| w.task_id == task_id && w.channel == channel)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_checkpoint_creation() {
        let checkpoint = Checkpoint::new(json!({"owner_id": "u1"}), vec!["fetch_words".into()]);
        assert_eq!(checkpoint.v, Checkpoint::CURRENT_VERSION);
        assert!(!checkpoint.is_terminal());
        assert!(Checkpoint::empty().is_terminal());
    }

    #[test]
    fn test_ids_are_time_ordered() {
        let first = Checkpoint::empty();
        std::thread::sleep(std::time::Duration::from_millis(2));
        let second = Checkpoint::empty();
        assert!(first.id < second.id);
    }

    #[test]
    fn test_same_content_ignores_timestamp() {
        let a = Checkpoint::new(json!({"n": 1}), vec!["wait".into()]);
        let mut b = a.clone();
        b.ts = b.ts + chrono::Duration::seconds(5);
        assert!(a.same_content(&b));

        b.state = json!({"n": 2});
        assert!(!a.same_content(&b));
    }

    #[test]
    fn test_checkpoint_metadata() {
        let metadata = CheckpointMetadata::new()
            .with_source(CheckpointSource::Input)
            .with_step(-1)
            .with_run(1)
            .with_extra("key", json!("value"));

        assert_eq!(metadata.source, Some(CheckpointSource::Input));
        assert_eq!(metadata.step, Some(-1));
        assert_eq!(metadata.extra.get("key"), Some(&json!("value")));

        let encoded = serde_json::to_value(&metadata).unwrap();
        assert_eq!(encoded["source"], "input");
        assert_eq!(encoded["key"], "value");
    }

    #[test]
    fn test_checkpoint_config() {
        let config = CheckpointConfig::new("u1:job")
            .with_checkpoint_ns("quiz")
            .with_checkpoint_id("checkpoint-1");

        assert_eq!(config.checkpoint_id.as_deref(), Some("checkpoint-1"));
        assert_eq!(config.latest().checkpoint_id, None);
        assert_eq!(config.latest().checkpoint_ns, "quiz");
    }
}
