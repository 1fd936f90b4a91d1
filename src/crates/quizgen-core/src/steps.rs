//! The quiz generation steps
//!
//! Every step first checks whether the job already has an outcome (error or
//! result) and passes through untouched if so.

use async_trait::async_trait;
use chrono::Utc;
use rand::seq::SliceRandom;
use serde_json::json;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};
use uuid::Uuid;

use crate::dispatch::{
    dispatch_with_grace, CallbackStatus, DispatchBatch, DispatchTask, Dispatcher,
};
use crate::executor::{StepError, StepHandler};
use crate::graph::Step;
use crate::outcome::StepOutcome;
use crate::resume::ResumeValue;
use crate::services::{ArticleSource, NewQuiz, QuizOutcome, QuizStatus, ResultStore, WordSource};
use crate::state::{Article, JobState, JobUpdate};

type StepResult = Result<StepOutcome, StepError>;

/// Tunables for the quiz steps
#[derive(Debug, Clone)]
pub struct StepSettings {
    /// URL the worker posts its result to
    pub callback_url: String,
    /// How long `trigger_worker` waits for the dispatch call before detaching
    pub dispatch_grace: Duration,
    /// How long after dispatch a missing result fails the job
    pub result_timeout: Duration,
    /// Maximum number of target words sent to the worker
    pub max_words: usize,
}

impl Default for StepSettings {
    fn default() -> Self {
        Self {
            callback_url: "http://127.0.0.1:8080/webhooks/worker-callback".to_string(),
            dispatch_grace: Duration::from_millis(300),
            result_timeout: Duration::from_secs(900),
            max_words: 20,
        }
    }
}

/// [`StepHandler`] for the quiz graph
#[derive(Clone)]
pub struct QuizSteps {
    words: Arc<dyn WordSource>,
    articles: Arc<dyn ArticleSource>,
    results: Arc<dyn ResultStore>,
    dispatcher: Arc<dyn Dispatcher>,
    settings: StepSettings,
}

impl QuizSteps {
    pub fn new(
        words: Arc<dyn WordSource>,
        articles: Arc<dyn ArticleSource>,
        results: Arc<dyn ResultStore>,
        dispatcher: Arc<dyn Dispatcher>,
    ) -> Self {
        Self {
            words,
            articles,
            results,
            dispatcher,
            settings: StepSettings::default(),
        }
    }

    pub fn with_settings(mut self, settings: StepSettings) -> Self {
        self.settings = settings;
        self
    }

    async fn fetch_words(&self, state: &JobState) -> StepResult {
        let request = &state.request;
        let words = self
            .words
            .words(&state.owner_id, &request.word_list_ids, request.language.as_deref())
            .await?;
        // Target words are optional; the prompt then asks for words from the text
        if words.is_empty() {
            debug!(job_id = %state.job_id, "no target words, continuing without them");
        }

        let selected: Vec<_> = words
            .choose_multiple(&mut rand::thread_rng(), self.settings.max_words)
            .cloned()
            .collect();
        debug!(job_id = %state.job_id, available = words.len(), selected = selected.len(), "words selected");

        Ok(StepOutcome::proceed(JobUpdate {
            words: Some(selected),
            ..Default::default()
        }))
    }

    async fn pick_article(&self, state: &JobState) -> StepResult {
        let url = self.articles.pick_article().await?;
        debug!(job_id = %state.job_id, %url, "article picked");

        Ok(StepOutcome::proceed(JobUpdate {
            article: Some(Article {
                url: Some(url),
                ..Default::default()
            }),
            ..Default::default()
        }))
    }

    async fn scrape_content(&self, state: &JobState) -> StepResult {
        let url = state
            .article
            .as_ref()
            .and_then(|article| article.url.clone())
            .or_else(|| state.request.source_url.clone())
            .ok_or("No article URL to scrape")?;

        let scraped = self.articles.extract(&url).await?;
        if scraped.text.as_deref().map_or(true, |text| text.trim().is_empty()) {
            return Err(format!("No article text found at {}", url).into());
        }

        Ok(StepOutcome::proceed(JobUpdate {
            article: Some(Article {
                title: scraped.title.or_else(|| state.request.source_title.clone()),
                url: Some(url),
                text: scraped.text,
            }),
            ..Default::default()
        }))
    }

    async fn trigger_worker(&self, state: &JobState) -> StepResult {
        if state.dispatched_at.is_some() {
            debug!(job_id = %state.job_id, "already dispatched");
            return Ok(StepOutcome::pass());
        }

        let credential = state
            .credential
            .clone()
            .ok_or("Missing caller credential for worker callback")?;
        let article = state
            .article
            .as_ref()
            .filter(|article| article.text.is_some())
            .ok_or("No article text to build a quiz from")?;
        let prompt = build_prompt(state, article);

        self.results
            .create_pending(NewQuiz {
                owner_id: state.owner_id.clone(),
                job_id: state.job_id.clone(),
                context: json!({
                    "article": { "title": article.title, "url": article.url },
                    "words": state.words,
                    "meta": state.request.meta,
                }),
            })
            .await?;

        let batch = DispatchBatch {
            owner_id: state.owner_id.clone(),
            callback_url: self.settings.callback_url.clone(),
            callback_credential: credential,
            tasks: BTreeMap::from([(
                Uuid::new_v4().to_string(),
                DispatchTask {
                    prompt: prompt.clone(),
                    job_id: state.job_id.clone(),
                },
            )]),
        };

        let outcome =
            dispatch_with_grace(self.dispatcher.clone(), batch, self.settings.dispatch_grace)
                .await?;
        info!(job_id = %state.job_id, ?outcome, "worker dispatched");

        Ok(StepOutcome::proceed(JobUpdate {
            prompt: Some(prompt),
            dispatched_at: Some(Utc::now()),
            ..Default::default()
        }))
    }

    async fn check_status(&self, state: &JobState) -> StepResult {
        let record = self.results.lookup(&state.owner_id, &state.job_id).await?;

        let update = match record {
            Some(record) if record.status == QuizStatus::Ready => match record.questions {
                Some(questions) => JobUpdate {
                    generated: Some(questions),
                    ..Default::default()
                },
                None => JobUpdate::failed("Worker reported ready without questions"),
            },
            Some(record) if record.status == QuizStatus::Error => JobUpdate::failed(
                record
                    .error_detail
                    .unwrap_or_else(|| "Worker reported an error".to_string()),
            ),
            _ => self.expire_if_overdue(state),
        };

        Ok(StepOutcome::proceed(update))
    }

    fn expire_if_overdue(&self, state: &JobState) -> JobUpdate {
        let Some(dispatched_at) = state.dispatched_at else {
            return JobUpdate::none();
        };
        let waited = (Utc::now() - dispatched_at).to_std().unwrap_or_default();
        if waited >= self.settings.result_timeout {
            JobUpdate::failed(format!(
                "Worker did not report a result within {} seconds",
                self.settings.result_timeout.as_secs()
            ))
        } else {
            JobUpdate::none()
        }
    }

    fn wait(&self, resume: Option<&ResumeValue>) -> StepResult {
        let update = match resume {
            None => return Ok(StepOutcome::suspend("awaiting worker result")),
            Some(ResumeValue::Poll) => JobUpdate::none(),
            Some(ResumeValue::Payload(payload)) => match (payload.status, &payload.result) {
                (CallbackStatus::Ready, Some(result)) => JobUpdate {
                    generated: Some(result.clone()),
                    ..Default::default()
                },
                (CallbackStatus::Ready, None) => {
                    JobUpdate::failed("Worker reported ready without questions")
                }
                (CallbackStatus::Error, _) => JobUpdate::failed(
                    payload
                        .error_detail
                        .clone()
                        .unwrap_or_else(|| "Worker reported an error".to_string()),
                ),
            },
        };
        Ok(StepOutcome::proceed(update))
    }

    async fn finalize(&self, state: &JobState) -> StepResult {
        let outcome = match (&state.error, &state.generated) {
            (Some(error), _) => QuizOutcome::Failed(error.clone()),
            (None, Some(generated)) => QuizOutcome::Ready(generated.clone()),
            (None, None) => return Ok(StepOutcome::terminal(JobUpdate::none())),
        };

        // No-op when no record exists or a callback already completed it.
        let changed = self
            .results
            .complete(&state.owner_id, &state.job_id, outcome)
            .await?;
        debug!(job_id = %state.job_id, changed, "quiz record finalized");

        Ok(StepOutcome::terminal(JobUpdate::none()))
    }
}

#[async_trait]
impl StepHandler for QuizSteps {
    async fn run(
        &self,
        step: Step,
        state: &JobState,
        resume: Option<&ResumeValue>,
    ) -> StepResult {
        if state.is_settled() && !matches!(step, Step::Finalize) {
            return Ok(StepOutcome::pass());
        }

        match step {
            Step::FetchWords => self.fetch_words(state).await,
            Step::PickArticle => self.pick_article(state).await,
            Step::ScrapeContent => self.scrape_content(state).await,
            Step::TriggerWorker => self.trigger_worker(state).await,
            Step::CheckStatus => self.check_status(state).await,
            Step::Wait => self.wait(resume),
            Step::Finalize => self.finalize(state).await,
        }
    }
}

fn build_prompt(state: &JobState, article: &Article) -> String {
    let language = state.request.language.as_deref().unwrap_or("Dutch");
    let words = state
        .words
        .iter()
        .map(|word| word.term.as_str())
        .collect::<Vec<_>>()
        .join(", ");

    format!(
        "You are a {language} language teacher creating vocabulary exercises.\n\n\
         CONTEXT ARTICLE: {title}\n{text}\n\n\
         TARGET WORDS TO INCLUDE (if possible, otherwise select relevant words from the text):\n{words}\n\n\
         TASK:\n\
         1. Write 20 simplified sentences based on the context of the article.\n\
         2. Use at least 5 of the target words.\n\
         3. In each sentence blank out one word that is evident from context; that word is the answer.\n\
         4. Give an English translation of each full sentence.\n\
         Respond only with JSON of the form \
         {{\"exercises\": [{{\"question\": \"...\", \"answer\": \"...\", \"english\": \"...\"}}]}}",
        language = language,
        title = article.title.as_deref().unwrap_or("(untitled)"),
        text = article.text.as_deref().unwrap_or_default(),
        words = words,
    )
}
