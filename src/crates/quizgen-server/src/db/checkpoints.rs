//! SQLite checkpoint saver
//!
//! Checkpoints are stored one row per checkpoint with a parent link; the latest
//! checkpoint of a chain is the one no row names as its parent. `put` runs in a
//! `BEGIN IMMEDIATE` transaction so the identity check, the parent check and the
//! insert see the same chain.

use async_stream::try_stream;
use async_trait::async_trait;
use chrono::Utc;
use quizgen_checkpoint::{
    Checkpoint, CheckpointConfig, CheckpointError, CheckpointMetadata, CheckpointSaver,
    CheckpointStream, CheckpointTuple, JsonSerializer, PendingWrite, SerializerProtocol,
};
use sqlx::sqlite::SqliteConnection;
use tracing::{debug, error};

use super::connection::DatabasePool;
use super::error::DatabaseError;

type Result<T> = std::result::Result<T, CheckpointError>;

const LATEST_SQL: &str = "
    SELECT c.checkpoint_id, c.parent_checkpoint_id, c.checkpoint, c.metadata
    FROM checkpoints c
    WHERE c.job_id = ? AND c.checkpoint_ns = ?
      AND NOT EXISTS (
          SELECT 1 FROM checkpoints k
          WHERE k.job_id = c.job_id
            AND k.checkpoint_ns = c.checkpoint_ns
            AND k.parent_checkpoint_id = c.checkpoint_id
      )
    ORDER BY c.seq DESC
    LIMIT 1";

const BY_ID_SQL: &str = "
    SELECT checkpoint_id, parent_checkpoint_id, checkpoint, metadata
    FROM checkpoints
    WHERE job_id = ? AND checkpoint_ns = ? AND checkpoint_id = ?";

const LIST_SQL: &str = "
    SELECT checkpoint_id, parent_checkpoint_id, checkpoint, metadata
    FROM checkpoints
    WHERE job_id = ? AND checkpoint_ns = ?
    ORDER BY seq DESC
    LIMIT ?";

const LIST_BEFORE_SQL: &str = "
    SELECT checkpoint_id, parent_checkpoint_id, checkpoint, metadata
    FROM checkpoints
    WHERE job_id = ? AND checkpoint_ns = ?
      AND seq < (
          SELECT seq FROM checkpoints
          WHERE job_id = ? AND checkpoint_ns = ? AND checkpoint_id = ?
      )
    ORDER BY seq DESC
    LIMIT ?";

/// (checkpoint_id, parent_checkpoint_id, checkpoint, metadata)
type CheckpointRow = (String, Option<String>, Vec<u8>, Vec<u8>);

fn storage(err: sqlx::Error) -> CheckpointError {
    DatabaseError::from(err).into()
}

/// Durable checkpoint saver on the server's SQLite pool
#[derive(Clone)]
pub struct SqliteCheckpointSaver {
    pool: DatabasePool,
    serializer: JsonSerializer,
}

impl SqliteCheckpointSaver {
    pub fn new(pool: DatabasePool) -> Self {
        Self {
            pool,
            serializer: JsonSerializer::new(),
        }
    }

    async fn writes_for(
        pool: &DatabasePool,
        serializer: &JsonSerializer,
        config: &CheckpointConfig,
        checkpoint_id: &str,
    ) -> Result<Vec<PendingWrite>> {
        let rows: Vec<(String, String, Vec<u8>)> = sqlx::query_as(
            "SELECT task_id, channel, value FROM checkpoint_writes
             WHERE job_id = ? AND checkpoint_ns = ? AND checkpoint_id = ?
             ORDER BY seq ASC",
        )
        .bind(&config.job_id)
        .bind(&config.checkpoint_ns)
        .bind(checkpoint_id)
        .fetch_all(pool)
        .await
        .map_err(storage)?;

        rows.into_iter()
            .map(|(task_id, channel, value)| {
                Ok(PendingWrite {
                    task_id,
                    channel,
                    value: serializer.loads(&value)?,
                })
            })
            .collect()
    }

    async fn load_tuple(
        pool: &DatabasePool,
        serializer: &JsonSerializer,
        chain: &CheckpointConfig,
        row: CheckpointRow,
    ) -> Result<CheckpointTuple> {
        let (checkpoint_id, parent_id, checkpoint, metadata) = row;
        let checkpoint: Checkpoint = serializer.loads(&checkpoint)?;
        let metadata: CheckpointMetadata = serializer.loads(&metadata)?;
        let writes = Self::writes_for(pool, serializer, chain, &checkpoint_id).await?;

        let mut tuple = CheckpointTuple::new(
            chain.latest().with_checkpoint_id(checkpoint_id),
            checkpoint,
            metadata,
        )
        .with_pending_writes(writes);
        if let Some(parent_id) = parent_id {
            tuple = tuple.with_parent_config(chain.latest().with_checkpoint_id(parent_id));
        }
        Ok(tuple)
    }

    async fn put_in_transaction(
        &self,
        config: &CheckpointConfig,
        checkpoint: Checkpoint,
        metadata: CheckpointMetadata,
    ) -> Result<CheckpointConfig> {
        let mut conn = self.pool.acquire().await.map_err(storage)?;
        sqlx::query("BEGIN IMMEDIATE")
            .execute(&mut *conn)
            .await
            .map_err(storage)?;

        let result = self.put_locked(&mut *conn, config, &checkpoint, &metadata).await;
        let finish = if result.is_ok() { "COMMIT" } else { "ROLLBACK" };
        if let Err(err) = sqlx::query(finish).execute(&mut *conn).await {
            error!(job_id = %config.job_id, error = %err, "failed to finish checkpoint transaction");
            return Err(storage(err));
        }

        if let Err(CheckpointError::Conflict(reason)) = &result {
            error!(job_id = %config.job_id, %reason, "checkpoint conflict");
        }
        result
    }

    async fn put_locked(
        &self,
        conn: &mut SqliteConnection,
        config: &CheckpointConfig,
        checkpoint: &Checkpoint,
        metadata: &CheckpointMetadata,
    ) -> Result<CheckpointConfig> {
        let parent_id = config.checkpoint_id.as_deref();
        let stored = config.latest().with_checkpoint_id(checkpoint.id.clone());

        let existing: Option<(Vec<u8>, Option<String>)> = sqlx::query_as(
            "SELECT checkpoint, parent_checkpoint_id FROM checkpoints
             WHERE job_id = ? AND checkpoint_ns = ? AND checkpoint_id = ?",
        )
        .bind(&config.job_id)
        .bind(&config.checkpoint_ns)
        .bind(&checkpoint.id)
        .fetch_optional(&mut *conn)
        .await
        .map_err(storage)?;

        if let Some((bytes, existing_parent)) = existing {
            let existing: Checkpoint = self.serializer.loads(&bytes)?;
            if existing.same_content(checkpoint) && existing_parent.as_deref() == parent_id {
                debug!(job_id = %config.job_id, checkpoint_id = %checkpoint.id, "idempotent checkpoint put");
                return Ok(stored);
            }
            return Err(CheckpointError::Conflict(format!(
                "checkpoint {} of job {} already stored with different content",
                checkpoint.id, config.job_id
            )));
        }

        let latest: Option<CheckpointRow> = sqlx::query_as(LATEST_SQL)
            .bind(&config.job_id)
            .bind(&config.checkpoint_ns)
            .fetch_optional(&mut *conn)
            .await
            .map_err(storage)?;
        let latest_id = latest.as_ref().map(|(id, ..)| id.as_str());
        if latest_id != parent_id {
            return Err(CheckpointError::Conflict(format!(
                "job {} has advanced to {:?}, cannot append after {:?}",
                config.job_id, latest_id, parent_id
            )));
        }

        sqlx::query(
            "INSERT INTO checkpoints
             (job_id, checkpoint_ns, checkpoint_id, parent_checkpoint_id, checkpoint, metadata, created_at)
             VALUES (?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(&config.job_id)
        .bind(&config.checkpoint_ns)
        .bind(&checkpoint.id)
        .bind(parent_id)
        .bind(self.serializer.dumps(checkpoint)?)
        .bind(self.serializer.dumps(metadata)?)
        .bind(Utc::now().to_rfc3339())
        .execute(&mut *conn)
        .await
        .map_err(storage)?;

        Ok(stored)
    }
}

#[async_trait]
impl CheckpointSaver for SqliteCheckpointSaver {
    async fn get_tuple(&self, config: &CheckpointConfig) -> Result<Option<CheckpointTuple>> {
        let row: Option<CheckpointRow> = match &config.checkpoint_id {
            Some(checkpoint_id) => sqlx::query_as(BY_ID_SQL)
                .bind(&config.job_id)
                .bind(&config.checkpoint_ns)
                .bind(checkpoint_id)
                .fetch_optional(&self.pool)
                .await
                .map_err(storage)?,
            None => sqlx::query_as(LATEST_SQL)
                .bind(&config.job_id)
                .bind(&config.checkpoint_ns)
                .fetch_optional(&self.pool)
                .await
                .map_err(storage)?,
        };

        match row {
            Some(row) => Ok(Some(
                Self::load_tuple(&self.pool, &self.serializer, config, row).await?,
            )),
            None => Ok(None),
        }
    }

    async fn list(
        &self,
        config: &CheckpointConfig,
        before: Option<&CheckpointConfig>,
        limit: Option<usize>,
    ) -> Result<CheckpointStream> {
        // SQLite reads a negative LIMIT as unbounded
        let limit = limit.map(|l| l as i64).unwrap_or(-1);

        let rows: Vec<CheckpointRow> = match before.and_then(|b| b.checkpoint_id.as_ref()) {
            Some(before_id) => sqlx::query_as(LIST_BEFORE_SQL)
                .bind(&config.job_id)
                .bind(&config.checkpoint_ns)
                .bind(&config.job_id)
                .bind(&config.checkpoint_ns)
                .bind(before_id)
                .bind(limit)
                .fetch_all(&self.pool)
                .await
                .map_err(storage)?,
            None => sqlx::query_as(LIST_SQL)
                .bind(&config.job_id)
                .bind(&config.checkpoint_ns)
                .bind(limit)
                .fetch_all(&self.pool)
                .await
                .map_err(storage)?,
        };

        let pool = self.pool.clone();
        let serializer = self.serializer;
        let chain = config.latest();
        let stream = try_stream! {
            for row in rows {
                let tuple = Self::load_tuple(&pool, &serializer, &chain, row).await?;
                yield tuple;
            }
        };
        Ok(Box::pin(stream))
    }

    async fn put(
        &self,
        config: &CheckpointConfig,
        checkpoint: Checkpoint,
        metadata: CheckpointMetadata,
    ) -> Result<CheckpointConfig> {
        // The transaction runs on its own task so it always reaches COMMIT or
        // ROLLBACK, even when the calling future is dropped.
        let saver = self.clone();
        let config = config.clone();
        tokio::spawn(async move { saver.put_in_transaction(&config, checkpoint, metadata).await })
            .await
            .map_err(|e| CheckpointError::Storage(format!("checkpoint write task failed: {}", e)))?
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

        let known: Option<(i64,)> = sqlx::query_as(
            "SELECT seq FROM checkpoints WHERE job_id = ? AND checkpoint_ns = ? AND checkpoint_id = ?",
        )
        .bind(&config.job_id)
        .bind(&config.checkpoint_ns)
        .bind(checkpoint_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(storage)?;
        if known.is_none() {
            return Err(CheckpointError::NotFound(checkpoint_id.clone()));
        }

        for (channel, value) in writes {
            // First write per (task, channel) wins
            sqlx::query(
                "INSERT OR IGNORE INTO checkpoint_writes
                 (job_id, checkpoint_ns, checkpoint_id, task_id, channel, value)
                 VALUES (?, ?, ?, ?, ?, ?)",
            )
            .bind(&config.job_id)
            .bind(&config.checkpoint_ns)
            .bind(checkpoint_id)
            .bind(&task_id)
            .bind(&channel)
            .bind(self.serializer.dumps(&value)?)
            .execute(&self.pool)
            .await
            .map_err(storage)?;
        }
        Ok(())
    }
}
