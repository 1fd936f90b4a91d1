//! External collaborators the quiz steps depend on
//!
//! Steps reach storage and the web only through these traits; the server
//! crate provides SQLite- and HTTP-backed implementations, tests provide fakes.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::state::{Article, Word};

/// Errors from an external collaborator
#[derive(Error, Debug)]
pub enum ServiceError {
    /// Nothing matched the request
    #[error("{0}")]
    NotFound(String),

    /// Remote service or network failure
    #[error("Upstream error: {0}")]
    Upstream(String),

    /// Local persistence failure
    #[error("Storage error: {0}")]
    Storage(String),
}

/// Reads the owner's vocabulary
#[async_trait]
pub trait WordSource: Send + Sync {
    /// Words from `word_list_ids` (all of the owner's lists when empty),
    /// restricted to `language` when given.
    async fn words(
        &self,
        owner_id: &str,
        word_list_ids: &[i64],
        language: Option<&str>,
    ) -> Result<Vec<Word>, ServiceError>;
}

/// Finds and downloads articles
#[async_trait]
pub trait ArticleSource: Send + Sync {
    /// URL of a randomly chosen current article
    async fn pick_article(&self) -> Result<String, ServiceError>;

    /// Title and body text of the article at `url`
    async fn extract(&self, url: &str) -> Result<Article, ServiceError>;
}

/// Lifecycle of a stored quiz
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum QuizStatus {
    Pending,
    Ready,
    Error,
}

impl QuizStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            QuizStatus::Pending => "pending",
            QuizStatus::Ready => "ready",
            QuizStatus::Error => "error",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "pending" => Some(QuizStatus::Pending),
            "ready" => Some(QuizStatus::Ready),
            "error" => Some(QuizStatus::Error),
            _ => None,
        }
    }
}

/// Quiz record created before dispatch
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewQuiz {
    pub owner_id: String,
    pub job_id: String,
    /// Article, words and client `meta` the quiz was generated from
    pub context: serde_json::Value,
}

/// Stored quiz as read back by `check_status`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QuizRecord {
    pub owner_id: String,
    pub job_id: String,
    pub status: QuizStatus,
    pub questions: Option<serde_json::Value>,
    pub error_detail: Option<String>,
}

/// Terminal outcome written to a quiz record
#[derive(Debug, Clone, PartialEq)]
pub enum QuizOutcome {
    Ready(serde_json::Value),
    Failed(String),
}

/// Persists quiz records and worker results
#[async_trait]
pub trait ResultStore: Send + Sync {
    /// Create the pending record for a job. Creating it again is a no-op.
    async fn create_pending(&self, quiz: NewQuiz) -> Result<(), ServiceError>;

    async fn lookup(&self, owner_id: &str, job_id: &str) -> Result<Option<QuizRecord>, ServiceError>;

    /// Move a pending record to its terminal outcome.
    ///
    /// Returns `false` without changing anything when the record is missing or
    /// already terminal; the first completion wins.
    async fn complete(
        &self,
        owner_id: &str,
        job_id: &str,
        outcome: QuizOutcome,
    ) -> Result<bool, ServiceError>;
}
