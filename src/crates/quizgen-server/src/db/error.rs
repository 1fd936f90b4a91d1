//! SQLite error classification
//!
//! Repositories return [`DatabaseError`]; it converts into the error types of
//! the traits they implement ([`ServiceError`] and [`CheckpointError`]).

use quizgen_checkpoint::CheckpointError;
use quizgen_core::ServiceError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum DatabaseError {
    #[error("Record not found: {0}")]
    NotFound(String),

    /// A unique or foreign key constraint rejected the write
    #[error("Constraint violated: {0}")]
    Constraint(String),

    /// A stored value could not be read back into its Rust type
    #[error("Malformed stored value: {0}")]
    Decode(String),

    /// The pool is closed, exhausted or cannot reach the file
    #[error("Database unavailable: {0}")]
    Unavailable(String),

    #[error("Query failed: {0}")]
    Query(String),
}

impl DatabaseError {
    pub fn not_found(context: impl Into<String>) -> Self {
        DatabaseError::NotFound(context.into())
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, DatabaseError::NotFound(_))
    }
}

pub type DbResult<T> = std::result::Result<T, DatabaseError>;

impl From<sqlx::Error> for DatabaseError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::RowNotFound => DatabaseError::NotFound("no matching row".to_string()),
            sqlx::Error::Database(db_err)
                if db_err.is_unique_violation() || db_err.is_foreign_key_violation() =>
            {
                DatabaseError::Constraint(db_err.to_string())
            }
            err @ (sqlx::Error::ColumnNotFound(_)
            | sqlx::Error::ColumnDecode { .. }
            | sqlx::Error::Decode(_)) => DatabaseError::Decode(err.to_string()),
            err @ (sqlx::Error::PoolTimedOut
            | sqlx::Error::PoolClosed
            | sqlx::Error::Io(_)
            | sqlx::Error::Configuration(_)) => DatabaseError::Unavailable(err.to_string()),
            err => DatabaseError::Query(err.to_string()),
        }
    }
}

impl From<DatabaseError> for ServiceError {
    fn from(err: DatabaseError) -> Self {
        match err {
            DatabaseError::NotFound(msg) => ServiceError::NotFound(msg),
            other => ServiceError::Storage(other.to_string()),
        }
    }
}

impl From<DatabaseError> for CheckpointError {
    fn from(err: DatabaseError) -> Self {
        match err {
            DatabaseError::NotFound(msg) => CheckpointError::NotFound(msg),
            other => CheckpointError::Storage(other.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_row_not_found_is_not_found() {
        let err: DatabaseError = sqlx::Error::RowNotFound.into();
        assert!(err.is_not_found());
    }

    #[test]
    fn test_pool_closed_is_unavailable() {
        let err: DatabaseError = sqlx::Error::PoolClosed.into();
        assert!(matches!(err, DatabaseError::Unavailable(_)));
    }

    #[test]
    fn test_service_error_mapping() {
        let err: ServiceError = DatabaseError::not_found("quiz").into();
        assert!(matches!(err, ServiceError::NotFound(_)));

        let err: ServiceError = DatabaseError::Unavailable("closed".into()).into();
        assert!(matches!(err, ServiceError::Storage(_)));
    }

    #[test]
    fn test_checkpoint_error_mapping() {
        let err: CheckpointError = DatabaseError::Query("boom".into()).into();
        assert!(matches!(err, CheckpointError::Storage(_)));
    }

    #[tokio::test]
    async fn test_duplicate_key_is_constraint() {
        let db = crate::db::DatabaseConnection::in_memory().await.unwrap();
        db.run_migrations().await.unwrap();
        let insert = "INSERT INTO quizzes (job_id, owner_id, status, created_at) VALUES ('u:j', 'u', 'pending', 'now')";
        sqlx::query(insert).execute(db.pool()).await.unwrap();

        let err: DatabaseError = sqlx::query(insert).execute(db.pool()).await.unwrap_err().into();
        assert!(matches!(err, DatabaseError::Constraint(_)));
    }
}
