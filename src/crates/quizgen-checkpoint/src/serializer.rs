//! Serialization protocol for checkpoints

use crate::error::Result;
use serde::{Deserialize, Serialize};

/// Protocol for serializing and deserializing checkpoint data
///
/// Storage backends that persist opaque bytes go through this trait so the
/// encoding can change without touching the backend.
pub trait SerializerProtocol: Send + Sync {
    /// Serialize a value to bytes
    fn dumps<T: Serialize>(&self, value: &T) -> Result<Vec<u8>>;

    /// Deserialize a value from bytes
    fn loads<T: for<'de> Deserialize<'de>>(&self, data: &[u8]) -> Result<T>;
}

/// JSON-based serializer (default)
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonSerializer;

impl JsonSerializer {
    pub fn new() -> Self {
        Self
    }
}

impl SerializerProtocol for JsonSerializer {
    fn dumps<T: Serialize>(&self, value: &T) -> Result<Vec<u8>> {
        Ok(serde_json::to_vec(value)?)
    }

    fn loads<T: for<'de> Deserialize<'de>>(&self, data: &[u8]) -> Result<T> {
        Ok(serde_json::from_slice(data)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::checkpoint::{Checkpoint, CheckpointMetadata, CheckpointSource};
    use crate::error::CheckpointError;
    use serde_json::json;

    #[test]
    fn test_checkpoint_survives_json_encoding() {
        let serializer = JsonSerializer::new();
        let checkpoint = Checkpoint::new(json!({"words": ["huis", "boom"]}), vec!["wait".into()]);

        let bytes = serializer.dumps(&checkpoint).unwrap();
        let decoded: Checkpoint = serializer.loads(&bytes).unwrap();
        assert!(decoded.same_content(&checkpoint));
        assert_eq!(decoded.ts, checkpoint.ts);
    }

    #[test]
    fn test_metadata_extra_is_flattened() {
        let serializer = JsonSerializer::new();
        let metadata = CheckpointMetadata::new()
            .with_source(CheckpointSource::Update)
            .with_extra("resume", json!("payload"));

        let bytes = serializer.dumps(&metadata).unwrap();
        let raw: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(raw, json!({"source": "update", "resume": "payload"}));
    }

    #[test]
    fn test_garbage_is_a_serialization_error() {
        let result: Result<Checkpoint> = JsonSerializer::new().loads(b"not json");
        assert!(matches!(result, Err(CheckpointError::Serialization(_))));
    }
}
