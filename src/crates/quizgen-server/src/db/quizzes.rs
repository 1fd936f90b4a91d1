//! Quiz record repository

use async_trait::async_trait;
use chrono::Utc;
use quizgen_core::{NewQuiz, QuizOutcome, QuizRecord, QuizStatus, ResultStore, ServiceError};

use super::connection::DatabasePool;
use super::error::{DatabaseError, DbResult};

/// (owner_id, job_id, status, questions, error_detail)
type QuizRow = (String, String, String, Option<String>, Option<String>);

/// Quiz records keyed by job id
#[derive(Clone)]
pub struct QuizRepository {
    pool: DatabasePool,
}

impl QuizRepository {
    pub fn new(pool: DatabasePool) -> Self {
        Self { pool }
    }

    /// Insert a pending record unless the job already has one
    pub async fn insert_pending(&self, quiz: &NewQuiz) -> DbResult<()> {
        sqlx::query(
            "INSERT OR IGNORE INTO quizzes (job_id, owner_id, status, context, created_at)
             VALUES (?, ?, 'pending', ?, ?)",
        )
        .bind(&quiz.job_id)
        .bind(&quiz.owner_id)
        .bind(quiz.context.to_string())
        .bind(Utc::now().to_rfc3339())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// The owner's record for `job_id`
    pub async fn find(&self, owner_id: &str, job_id: &str) -> DbResult<Option<QuizRecord>> {
        let row: Option<QuizRow> = sqlx::query_as(
            "SELECT owner_id, job_id, status, questions, error_detail
             FROM quizzes WHERE owner_id = ? AND job_id = ?",
        )
        .bind(owner_id)
        .bind(job_id)
        .fetch_optional(&self.pool)
        .await?;

        row.map(|(owner_id, job_id, status, questions, error_detail)| -> DbResult<QuizRecord> {
            let status = QuizStatus::parse(&status)
                .ok_or_else(|| DatabaseError::Decode(format!("Unknown quiz status: {}", status)))?;
            let questions = questions
                .map(|raw| serde_json::from_str(&raw))
                .transpose()
                .map_err(|e| DatabaseError::Decode(format!("Invalid questions JSON: {}", e)))?;
            Ok(QuizRecord {
                owner_id,
                job_id,
                status,
                questions,
                error_detail,
            })
        })
        .transpose()
    }

    /// Complete a pending record; returns whether a row changed
    pub async fn finish(&self, owner_id: &str, job_id: &str, outcome: &QuizOutcome) -> DbResult<bool> {
        let (status, questions, error_detail) = match outcome {
            QuizOutcome::Ready(questions) => (QuizStatus::Ready, Some(questions.to_string()), None),
            QuizOutcome::Failed(detail) => (QuizStatus::Error, None, Some(detail.as_str())),
        };

        let result = sqlx::query(
            "UPDATE quizzes
             SET status = ?, questions = ?, error_detail = ?, completed_at = ?
             WHERE owner_id = ? AND job_id = ? AND status = 'pending'",
        )
        .bind(status.as_str())
        .bind(questions)
        .bind(error_detail)
        .bind(Utc::now().to_rfc3339())
        .bind(owner_id)
        .bind(job_id)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }
}

#[async_trait]
impl ResultStore for QuizRepository {
    async fn create_pending(&self, quiz: NewQuiz) -> Result<(), ServiceError> {
        Ok(self.insert_pending(&quiz).await?)
    }

    async fn lookup(&self, owner_id: &str, job_id: &str) -> Result<Option<QuizRecord>, ServiceError> {
        Ok(self.find(owner_id, job_id).await?)
    }

    async fn complete(
        &self,
        owner_id: &str,
        job_id: &str,
        outcome: QuizOutcome,
    ) -> Result<bool, ServiceError> {
        Ok(self.finish(owner_id, job_id, &outcome).await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::DatabaseConnection;
    use serde_json::json;

    async fn setup() -> QuizRepository {
        let db = DatabaseConnection::in_memory().await.unwrap();
        db.run_migrations().await.unwrap();
        QuizRepository::new(db.pool().clone())
    }

    fn pending(job_id: &str) -> NewQuiz {
        NewQuiz {
            owner_id: "user-1".to_string(),
            job_id: job_id.to_string(),
            context: json!({"meta": {"lesson": 3}}),
        }
    }

    #[tokio::test]
    async fn test_create_and_lookup_pending() {
        let repo = setup().await;
        repo.create_pending(pending("user-1:a")).await.unwrap();
        repo.create_pending(pending("user-1:a")).await.unwrap();

        let record = repo.lookup("user-1", "user-1:a").await.unwrap().unwrap();
        assert_eq!(record.status, QuizStatus::Pending);
        assert!(record.questions.is_none());
    }

    #[tokio::test]
    async fn test_lookup_is_owner_scoped() {
        let repo = setup().await;
        repo.create_pending(pending("user-1:a")).await.unwrap();
        assert!(repo.lookup("user-2", "user-1:a").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_first_completion_wins() {
        let repo = setup().await;
        repo.create_pending(pending("user-1:a")).await.unwrap();

        let questions = json!([{"question": "q", "answer": "a"}]);
        assert!(repo
            .complete("user-1", "user-1:a", QuizOutcome::Ready(questions.clone()))
            .await
            .unwrap());
        assert!(!repo
            .complete("user-1", "user-1:a", QuizOutcome::Failed("late".into()))
            .await
            .unwrap());

        let record = repo.lookup("user-1", "user-1:a").await.unwrap().unwrap();
        assert_eq!(record.status, QuizStatus::Ready);
        assert_eq!(record.questions, Some(questions));
        assert!(record.error_detail.is_none());
    }

    #[tokio::test]
    async fn test_complete_missing_or_foreign_record_is_noop() {
        let repo = setup().await;
        assert!(!repo
            .complete("user-1", "user-1:none", QuizOutcome::Failed("x".into()))
            .await
            .unwrap());

        repo.create_pending(pending("user-1:a")).await.unwrap();
        assert!(!repo
            .complete("user-2", "user-1:a", QuizOutcome::Failed("x".into()))
            .await
            .unwrap());
    }
}
