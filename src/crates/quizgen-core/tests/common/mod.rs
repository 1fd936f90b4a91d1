//! In-memory collaborators for exercising the job runner end to end

#![allow(dead_code)]

use async_trait::async_trait;
use parking_lot::Mutex;
use quizgen_checkpoint::{
    Checkpoint, CheckpointConfig, CheckpointError, CheckpointMetadata, CheckpointSaver,
    CheckpointStream, CheckpointTuple, InMemoryCheckpointSaver,
};
use quizgen_core::{
    Article, ArticleSource, DispatchBatch, DispatchError, Dispatcher, JobRunner, NewQuiz,
    QuizOutcome, QuizRecord, QuizStatus, QuizSteps, ResultStore, RunnerConfig, ServiceError,
    StepSettings, Word, WordSource,
};
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

pub const OWNER: &str = "user-1";
pub const TOKEN: &str = "caller-token";

pub struct FakeWords(pub Vec<Word>);

#[async_trait]
impl WordSource for FakeWords {
    async fn words(
        &self,
        _owner_id: &str,
        _word_list_ids: &[i64],
        _language: Option<&str>,
    ) -> Result<Vec<Word>, ServiceError> {
        Ok(self.0.clone())
    }
}

pub fn sample_words() -> Vec<Word> {
    ["huis", "boom", "fiets", "regen"]
        .iter()
        .enumerate()
        .map(|(i, term)| Word {
            id: i as i64 + 1,
            term: term.to_string(),
            translation: None,
        })
        .collect()
}

#[derive(Default)]
pub struct FakeArticles {
    pub links: Vec<String>,
    pub picks: AtomicUsize,
    pub extracts: AtomicUsize,
}

impl FakeArticles {
    pub fn with_links(links: &[&str]) -> Self {
        Self {
            links: links.iter().map(|l| l.to_string()).collect(),
            ..Default::default()
        }
    }
}

#[async_trait]
impl ArticleSource for FakeArticles {
    async fn pick_article(&self) -> Result<String, ServiceError> {
        self.picks.fetch_add(1, Ordering::SeqCst);
        self.links
            .first()
            .cloned()
            .ok_or_else(|| ServiceError::NotFound("No articles found".to_string()))
    }

    async fn extract(&self, url: &str) -> Result<Article, ServiceError> {
        self.extracts.fetch_add(1, Ordering::SeqCst);
        Ok(Article {
            title: Some("Storm op komst".to_string()),
            url: Some(url.to_string()),
            text: Some("Morgen waait het hard. Zet je fiets binnen.".to_string()),
        })
    }
}

#[derive(Default)]
pub struct MemoryResults {
    records: Mutex<HashMap<String, QuizRecord>>,
}

impl MemoryResults {
    pub fn record(&self, job_id: &str) -> Option<QuizRecord> {
        self.records.lock().get(job_id).cloned()
    }

    pub fn len(&self) -> usize {
        self.records.lock().len()
    }
}

#[async_trait]
impl ResultStore for MemoryResults {
    async fn create_pending(&self, quiz: NewQuiz) -> Result<(), ServiceError> {
        self.records
            .lock()
            .entry(quiz.job_id.clone())
            .or_insert(QuizRecord {
                owner_id: quiz.owner_id,
                job_id: quiz.job_id,
                status: QuizStatus::Pending,
                questions: None,
                error_detail: None,
            });
        Ok(())
    }

    async fn lookup(&self, owner_id: &str, job_id: &str) -> Result<Option<QuizRecord>, ServiceError> {
        Ok(self
            .records
            .lock()
            .get(job_id)
            .filter(|record| record.owner_id == owner_id)
            .cloned())
    }

    async fn complete(
        &self,
        owner_id: &str,
        job_id: &str,
        outcome: QuizOutcome,
    ) -> Result<bool, ServiceError> {
        let mut records = self.records.lock();
        let Some(record) = records.get_mut(job_id) else {
            return Ok(false);
        };
        if record.owner_id != owner_id || record.status != QuizStatus::Pending {
            return Ok(false);
        }
        match outcome {
            QuizOutcome::Ready(questions) => {
                record.status = QuizStatus::Ready;
                record.questions = Some(questions);
            }
            QuizOutcome::Failed(detail) => {
                record.status = QuizStatus::Error;
                record.error_detail = Some(detail);
            }
        }
        Ok(true)
    }
}

#[derive(Default)]
pub struct RecordingDispatcher {
    pub delay: Duration,
    pub reject_with: Option<u16>,
    pub batches: Mutex<Vec<DispatchBatch>>,
}

impl RecordingDispatcher {
    pub fn count(&self) -> usize {
        self.batches.lock().len()
    }

    pub fn job_ids(&self) -> Vec<String> {
        self.batches
            .lock()
            .iter()
            .flat_map(|batch| batch.tasks.values().map(|task| task.job_id.clone()))
            .collect()
    }
}

#[async_trait]
impl Dispatcher for RecordingDispatcher {
    async fn dispatch(&self, batch: DispatchBatch) -> Result<(), DispatchError> {
        tokio::time::sleep(self.delay).await;
        self.batches.lock().push(batch);
        match self.reject_with {
            Some(status) => Err(DispatchError::Rejected {
                status,
                message: "worker unavailable".to_string(),
            }),
            None => Ok(()),
        }
    }
}

/// Fails the first `put` of a checkpoint produced by the named step
pub struct FlakySaver {
    pub inner: InMemoryCheckpointSaver,
    fail_after: Mutex<Option<String>>,
}

impl FlakySaver {
    pub fn failing_after(step: &str) -> Self {
        Self {
            inner: InMemoryCheckpointSaver::new(),
            fail_after: Mutex::new(Some(step.to_string())),
        }
    }
}

#[async_trait]
impl CheckpointSaver for FlakySaver {
    async fn get_tuple(
        &self,
        config: &CheckpointConfig,
    ) -> quizgen_checkpoint::Result<Option<CheckpointTuple>> {
        self.inner.get_tuple(config).await
    }

    async fn list(
        &self,
        config: &CheckpointConfig,
        before: Option<&CheckpointConfig>,
        limit: Option<usize>,
    ) -> quizgen_checkpoint::Result<CheckpointStream> {
        self.inner.list(config, before, limit).await
    }

    async fn put(
        &self,
        config: &CheckpointConfig,
        checkpoint: Checkpoint,
        metadata: CheckpointMetadata,
    ) -> quizgen_checkpoint::Result<CheckpointConfig> {
        let fail = {
            let mut pending = self.fail_after.lock();
            if pending.is_some() && pending.as_deref() == metadata.node.as_deref() {
                pending.take();
                true
            } else {
                false
            }
        };
        if fail {
            return Err(CheckpointError::Storage("simulated crash".to_string()));
        }
        self.inner.put(config, checkpoint, metadata).await
    }

    async fn put_writes(
        &self,
        config: &CheckpointConfig,
        writes: Vec<(String, serde_json::Value)>,
        task_id: String,
    ) -> quizgen_checkpoint::Result<()> {
        self.inner.put_writes(config, writes, task_id).await
    }
}

pub struct Harness {
    pub runner: JobRunner,
    pub articles: Arc<FakeArticles>,
    pub results: Arc<MemoryResults>,
    pub dispatcher: Arc<RecordingDispatcher>,
}

pub struct HarnessBuilder {
    pub saver: Arc<dyn CheckpointSaver>,
    pub words: Vec<Word>,
    pub articles: FakeArticles,
    pub dispatcher: RecordingDispatcher,
    pub settings: StepSettings,
    pub runner: RunnerConfig,
}

impl Default for HarnessBuilder {
    fn default() -> Self {
        Self {
            saver: Arc::new(InMemoryCheckpointSaver::new()),
            words: sample_words(),
            articles: FakeArticles::with_links(&["https://nos.nl/artikel/1"]),
            dispatcher: RecordingDispatcher::default(),
            settings: StepSettings {
                callback_url: "http://quizgen.test/webhooks/worker-callback".to_string(),
                ..StepSettings::default()
            },
            runner: RunnerConfig::default(),
        }
    }
}

impl HarnessBuilder {
    pub fn build(self) -> Harness {
        let articles = Arc::new(self.articles);
        let results = Arc::new(MemoryResults::default());
        let dispatcher = Arc::new(self.dispatcher);

        let steps = QuizSteps::new(
            Arc::new(FakeWords(self.words)),
            articles.clone(),
            results.clone(),
            dispatcher.clone(),
        )
        .with_settings(self.settings);

        Harness {
            runner: JobRunner::new(self.saver, Arc::new(steps)).with_config(self.runner),
            articles,
            results,
            dispatcher,
        }
    }
}

pub fn harness() -> Harness {
    HarnessBuilder::default().build()
}
