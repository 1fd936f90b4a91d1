//! Test application on an in-memory database

#![allow(dead_code)]

use async_trait::async_trait;
use axum::{
    body::{to_bytes, Body},
    http::{header, Method, Request, StatusCode},
    Router,
};
use parking_lot::Mutex;
use quizgen_core::{
    Article, ArticleSource, DispatchBatch, DispatchError, Dispatcher, JobRunner, QuizSteps,
    RunnerConfig, ServiceError, StepSettings,
};
use quizgen_server::{
    create_router,
    db::{DatabaseConnection, QuizRepository, SqliteCheckpointSaver, WordRepository},
    AppState, PollController,
};
use quizgen_worker::{JwtConfig, TokenVerifier};
use serde_json::Value;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tower::ServiceExt;

pub const OWNER: &str = "user-1";
pub const OTHER: &str = "user-2";
pub const SECRET: &str = "test-secret-with-enough-entropy";

pub struct StaticArticles {
    pub extracts: AtomicUsize,
}

#[async_trait]
impl ArticleSource for StaticArticles {
    async fn pick_article(&self) -> Result<String, ServiceError> {
        Ok("https://nos.nl/artikel/2500000".to_string())
    }

    async fn extract(&self, url: &str) -> Result<Article, ServiceError> {
        self.extracts.fetch_add(1, Ordering::SeqCst);
        Ok(Article {
            title: Some("Nieuwe fietsbrug geopend".to_string()),
            url: Some(url.to_string()),
            text: Some("De nieuwe brug over het kanaal is vandaag geopend.".to_string()),
        })
    }
}

#[derive(Default)]
pub struct RecordingDispatcher {
    pub batches: Mutex<Vec<DispatchBatch>>,
}

impl RecordingDispatcher {
    pub fn count(&self) -> usize {
        self.batches.lock().len()
    }

    pub fn last_credential(&self) -> Option<String> {
        self.batches
            .lock()
            .last()
            .map(|batch| batch.callback_credential.clone())
    }
}

#[async_trait]
impl Dispatcher for RecordingDispatcher {
    async fn dispatch(&self, batch: DispatchBatch) -> Result<(), DispatchError> {
        self.batches.lock().push(batch);
        Ok(())
    }
}

pub struct TestApp {
    pub router: Router,
    pub db: DatabaseConnection,
    pub controller: PollController,
    pub quizzes: QuizRepository,
    pub verifier: TokenVerifier,
    pub dispatcher: Arc<RecordingDispatcher>,
    pub articles: Arc<StaticArticles>,
    pub word_list_id: i64,
}

impl TestApp {
    pub async fn new() -> Self {
        let db = DatabaseConnection::in_memory().await.unwrap();
        db.run_migrations().await.unwrap();

        let words = WordRepository::new(db.pool().clone());
        let word_list_id = words.create_list(OWNER, "Week 1", Some("nl")).await.unwrap();
        for (term, translation) in [("brug", "bridge"), ("kanaal", "canal"), ("fiets", "bicycle")] {
            words.add_word(word_list_id, term, Some(translation)).await.unwrap();
        }

        let quizzes = QuizRepository::new(db.pool().clone());
        let dispatcher = Arc::new(RecordingDispatcher::default());
        let articles = Arc::new(StaticArticles {
            extracts: AtomicUsize::new(0),
        });

        let steps = QuizSteps::new(
            Arc::new(words),
            articles.clone(),
            Arc::new(quizzes.clone()),
            dispatcher.clone(),
        )
        .with_settings(StepSettings {
            callback_url: "http://quizgen.test/webhooks/worker-callback".to_string(),
            ..StepSettings::default()
        });
        let runner = JobRunner::new(
            Arc::new(SqliteCheckpointSaver::new(db.pool().clone())),
            Arc::new(steps),
        )
        .with_config(RunnerConfig::default());

        let controller = PollController::new(runner);
        let verifier = TokenVerifier::new(JwtConfig::new(SECRET));
        let router = create_router(
            AppState {
                db: db.clone(),
                controller: controller.clone(),
                quizzes: quizzes.clone(),
                verifier: verifier.clone(),
            },
            &[],
        );

        Self {
            router,
            db,
            controller,
            quizzes,
            verifier,
            dispatcher,
            articles,
            word_list_id,
        }
    }

    pub fn token(&self, user_id: &str) -> String {
        self.verifier.issue(user_id, 3600).unwrap()
    }

    pub async fn send(
        &self,
        method: Method,
        uri: &str,
        token: Option<&str>,
        body: Option<Value>,
    ) -> (StatusCode, Value) {
        let mut request = Request::builder().method(method).uri(uri);
        if let Some(token) = token {
            request = request.header(header::AUTHORIZATION, format!("Bearer {}", token));
        }
        let body = match body {
            Some(json) => {
                request = request.header(header::CONTENT_TYPE, "application/json");
                Body::from(json.to_string())
            }
            None => Body::empty(),
        };

        let response = self
            .router
            .clone()
            .oneshot(request.body(body).unwrap())
            .await
            .unwrap();
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let json = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap_or(Value::Null)
        };
        (status, json)
    }

    pub async fn generate(&self, token: &str, body: Value) -> (StatusCode, Value) {
        self.send(Method::POST, "/functions/v1/generate-quiz", Some(token), Some(body))
            .await
    }

    /// Create a job as `OWNER` and return its id
    pub async fn create_job(&self) -> String {
        let token = self.token(OWNER);
        let (status, body) = self
            .generate(
                &token,
                serde_json::json!({ "new_job": { "word_list_ids": [self.word_list_id] } }),
            )
            .await;
        assert_eq!(status, StatusCode::OK, "{}", body);
        let entries = body.as_object().unwrap();
        assert_eq!(entries.len(), 1);
        entries.keys().next().unwrap().clone()
    }

    pub async fn checkpoint_count(&self, job_id: &str) -> i64 {
        let (count,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM checkpoints WHERE job_id = ?")
            .bind(job_id)
            .fetch_one(self.db.pool())
            .await
            .unwrap();
        count
    }
}
