//! Quiz generation against an OpenAI-compatible chat completions API.

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, warn};

use crate::config::GeneratorConfig;
use crate::error::{Result, WorkerError};

const SYSTEM_PROMPT: &str =
    "You write fill-in-the-blank vocabulary exercises. Reply with a single JSON object and nothing else.";

/// A single fill-in-the-blank exercise
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QuizQuestion {
    pub question: String,
    pub answer: String,
    #[serde(default)]
    pub english: String,
}

#[derive(Debug, Deserialize)]
struct Exercises {
    exercises: Vec<QuizQuestion>,
}

/// Turns a prompt into quiz questions
#[async_trait]
pub trait QuizGenerator: Send + Sync {
    async fn generate(&self, prompt: &str) -> Result<Vec<QuizQuestion>>;
}

#[derive(Debug, Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Debug, Serialize)]
struct ResponseFormat {
    #[serde(rename = "type")]
    kind: &'static str,
}

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    temperature: f32,
    response_format: ResponseFormat,
    stream: bool,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatResponseMessage,
}

#[derive(Debug, Deserialize)]
struct ChatResponseMessage {
    content: Option<String>,
}

/// Generator backed by any `/chat/completions` endpoint
#[derive(Clone)]
pub struct OpenAiGenerator {
    config: GeneratorConfig,
    client: Client,
}

impl OpenAiGenerator {
    pub fn new(config: GeneratorConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| WorkerError::ConfigError(format!("Failed to create HTTP client: {}", e)))?;
        Ok(Self { config, client })
    }

    async fn complete(&self, prompt: &str) -> Result<String> {
        let url = format!("{}/chat/completions", self.config.base_url.trim_end_matches('/'));
        let body = ChatRequest {
            model: &self.config.model,
            messages: vec![
                ChatMessage { role: "system", content: SYSTEM_PROMPT },
                ChatMessage { role: "user", content: prompt },
            ],
            temperature: self.config.temperature,
            response_format: ResponseFormat { kind: "json_object" },
            stream: false,
        };

        let response = self
            .client
            .post(&url)
            .bearer_auth(&self.config.api_key)
            .json(&body)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response.text().await.unwrap_or_default();
            return Err(match status.as_u16() {
                401 => WorkerError::AuthenticationError(error_text),
                429 => WorkerError::RateLimitExceeded(error_text),
                _ => WorkerError::ProviderError(format!("Model API error {}: {}", status, error_text)),
            });
        }

        let parsed: ChatResponse = response.json().await?;
        parsed
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .ok_or_else(|| WorkerError::InvalidResponse("No choices in response".to_string()))
    }
}

#[async_trait]
impl QuizGenerator for OpenAiGenerator {
    async fn generate(&self, prompt: &str) -> Result<Vec<QuizQuestion>> {
        let mut attempt = 0;
        loop {
            match self.complete(prompt).await {
                Ok(content) => return parse_exercises(&content),
                Err(err) if err.is_retryable() && attempt < self.config.max_retries => {
                    attempt += 1;
                    warn!(attempt, error = %err, "model call failed, retrying");
                    tokio::time::sleep(Duration::from_millis(500 * u64::from(attempt))).await;
                }
                Err(err) => return Err(err),
            }
        }
    }
}

/// Parse the model's reply, tolerating a fenced code block around the JSON
pub fn parse_exercises(content: &str) -> Result<Vec<QuizQuestion>> {
    let trimmed = content.trim();
    let json = trimmed
        .strip_prefix("```json")
        .or_else(|| trimmed.strip_prefix("```"))
        .and_then(|rest| rest.trim_end().strip_suffix("```"))
        .unwrap_or(trimmed);

    let exercises: Exercises = serde_json::from_str(json.trim())
        .map_err(|e| WorkerError::InvalidResponse(format!("Reply is not an exercise list: {}", e)))?;
    if exercises.exercises.is_empty() {
        return Err(WorkerError::InvalidResponse("Reply contains no exercises".to_string()));
    }
    debug!(count = exercises.exercises.len(), "exercises parsed");
    Ok(exercises.exercises)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_plain_json() {
        let questions = parse_exercises(
            r#"{"exercises":[{"question":"Het ___ is groot.","answer":"huis","english":"The house is big."}]}"#,
        )
        .unwrap();
        assert_eq!(questions.len(), 1);
        assert_eq!(questions[0].answer, "huis");
    }

    #[test]
    fn test_parse_fenced_json() {
        let content = "```json\n{\"exercises\":[{\"question\":\"q\",\"answer\":\"a\"}]}\n```";
        let questions = parse_exercises(content).unwrap();
        assert_eq!(questions[0].english, "");
    }

    #[test]
    fn test_parse_rejects_garbage_and_empty() {
        assert!(matches!(parse_exercises("Sure! Here you go"), Err(WorkerError::InvalidResponse(_))));
        assert!(matches!(parse_exercises(r#"{"exercises":[]}"#), Err(WorkerError::InvalidResponse(_))));
    }
}
