//! Job state and partial updates
//!
//! [`JobState`] is the whole of what a job knows: the validated creation request,
//! what each step has contributed so far, and a single `error` slot. Steps never
//! mutate it directly; they return a [`JobUpdate`] that the executor merges.
//!
//! Once `error` is set the state is frozen. Every later update is ignored, so a
//! failure can only be reported, never overwritten by a late result.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Upper bound on the serialized size of a request's `meta` object
pub const MAX_META_BYTES: usize = 512;

/// Validated `new_job` payload
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct JobRequest {
    #[serde(default)]
    pub word_list_ids: Vec<i64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub language: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_text: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_title: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_url: Option<String>,

    /// Opaque client context, stored with the quiz record
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub meta: Option<serde_json::Value>,
}

/// Reasons a creation request is rejected before any job exists
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RequestError {
    #[error("source_title is required when source_text is provided")]
    MissingSourceTitle,

    #[error("meta must serialize to at most {MAX_META_BYTES} bytes, got {0}")]
    MetaTooLarge(usize),

    #[error("source_url must be an http(s) URL")]
    InvalidSourceUrl,
}

impl JobRequest {
    pub fn validate(&self) -> Result<(), RequestError> {
        let has_text = self.source_text.as_deref().is_some_and(|t| !t.trim().is_empty());
        let has_title = self.source_title.as_deref().is_some_and(|t| !t.trim().is_empty());
        if has_text && !has_title {
            return Err(RequestError::MissingSourceTitle);
        }

        if let Some(meta) = &self.meta {
            let size = meta.to_string().len();
            if size > MAX_META_BYTES {
                return Err(RequestError::MetaTooLarge(size));
            }
        }

        if let Some(url) = &self.source_url {
            if !(url.starts_with("http://") || url.starts_with("https://")) {
                return Err(RequestError::InvalidSourceUrl);
            }
        }

        Ok(())
    }
}

/// A vocabulary entry selected for the quiz
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Word {
    pub id: i64,
    pub term: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub translation: Option<String>,
}

/// Source article the quiz is built around
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Article {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
}

/// Full state of one job
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobState {
    pub owner_id: String,
    pub job_id: String,

    /// Caller-scoped bearer credential. Never persisted; re-supplied on every
    /// invocation and forwarded to the worker for its callback.
    #[serde(skip)]
    pub credential: Option<String>,

    pub request: JobRequest,

    #[serde(default)]
    pub words: Vec<Word>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub article: Option<Article>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub prompt: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dispatched_at: Option<DateTime<Utc>>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub generated: Option<serde_json::Value>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl JobState {
    pub fn new(owner_id: impl Into<String>, job_id: impl Into<String>, request: JobRequest) -> Self {
        let article = request.source_text.as_ref().map(|text| Article {
            title: request.source_title.clone(),
            url: request.source_url.clone(),
            text: Some(text.clone()),
        });

        Self {
            owner_id: owner_id.into(),
            job_id: job_id.into(),
            credential: None,
            request,
            words: Vec::new(),
            article,
            prompt: None,
            dispatched_at: None,
            generated: None,
            error: None,
        }
    }

    pub fn with_credential(mut self, credential: Option<String>) -> Self {
        self.credential = credential;
        self
    }

    pub fn is_failed(&self) -> bool {
        self.error.is_some()
    }

    /// Whether a step still has work to do. Every step checks this first.
    pub fn is_settled(&self) -> bool {
        self.error.is_some() || self.generated.is_some()
    }

    /// Merge a step's delta into the state.
    ///
    /// Ignored entirely once `error` is set. An update carrying both an error
    /// and a result keeps only the error.
    pub fn apply(&mut self, update: JobUpdate) {
        if self.error.is_some() {
            return;
        }

        if let Some(error) = update.error {
            self.error = Some(error);
            self.generated = None;
            return;
        }

        if let Some(words) = update.words {
            self.words = words;
        }
        if let Some(article) = update.article {
            self.article = Some(article);
        }
        if let Some(prompt) = update.prompt {
            self.prompt = Some(prompt);
        }
        if let Some(dispatched_at) = update.dispatched_at {
            self.dispatched_at = Some(dispatched_at);
        }
        if let Some(generated) = update.generated {
            self.generated = Some(generated);
        }
    }
}

/// Partial state produced by one step
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct JobUpdate {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub words: Option<Vec<Word>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub article: Option<Article>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub prompt: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dispatched_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub generated: Option<serde_json::Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl JobUpdate {
    /// The empty delta
    pub fn none() -> Self {
        Self::default()
    }

    pub fn failed(error: impl Into<String>) -> Self {
        Self {
            error: Some(error.into()),
            ..Self::default()
        }
    }

    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn state() -> JobState {
        JobState::new("u1", "u1:job", JobRequest::default())
    }

    #[test]
    fn test_source_text_requires_title() {
        let request = JobRequest {
            source_text: Some("Het weer is mooi.".into()),
            ..Default::default()
        };
        assert_eq!(request.validate(), Err(RequestError::MissingSourceTitle));

        let request = JobRequest {
            source_text: Some("Het weer is mooi.".into()),
            source_title: Some("Weer".into()),
            ..Default::default()
        };
        assert_eq!(request.validate(), Ok(()));
    }

    #[test]
    fn test_meta_size_limit() {
        let request = JobRequest {
            meta: Some(json!({ "note": "x".repeat(600) })),
            ..Default::default()
        };
        assert!(matches!(request.validate(), Err(RequestError::MetaTooLarge(_))));

        let request = JobRequest {
            meta: Some(json!({ "source": "eval" })),
            ..Default::default()
        };
        assert!(request.validate().is_ok());
    }

    #[test]
    fn test_source_text_becomes_article() {
        let request = JobRequest {
            source_text: Some("tekst".into()),
            source_title: Some("titel".into()),
            ..Default::default()
        };
        let state = JobState::new("u1", "u1:job", request);
        let article = state.article.unwrap();
        assert_eq!(article.text.as_deref(), Some("tekst"));
        assert_eq!(article.title.as_deref(), Some("titel"));
    }

    #[test]
    fn test_error_freezes_state() {
        let mut state = state();
        state.apply(JobUpdate::failed("No articles found"));
        state.apply(JobUpdate {
            generated: Some(json!([{"question": "q"}])),
            ..Default::default()
        });

        assert_eq!(state.error.as_deref(), Some("No articles found"));
        assert!(state.generated.is_none());
    }

    #[test]
    fn test_error_wins_over_result_in_same_update() {
        let mut state = state();
        state.apply(JobUpdate {
            generated: Some(json!([])),
            error: Some("worker failed".into()),
            ..Default::default()
        });
        assert!(state.is_failed());
        assert!(state.generated.is_none());
    }

    #[test]
    fn test_credential_is_never_serialized() {
        let state = state().with_credential(Some("secret-token".into()));
        let encoded = serde_json::to_string(&state).unwrap();
        assert!(!encoded.contains("secret-token"));

        let decoded: JobState = serde_json::from_str(&encoded).unwrap();
        assert!(decoded.credential.is_none());
    }
}
