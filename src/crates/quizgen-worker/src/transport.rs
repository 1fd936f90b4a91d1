//! Dispatcher transports
//!
//! - [`HttpDispatcher`] posts the batch to a running worker service, using the
//!   caller's credential so the worker can check the batch owner.
//! - [`FunctionDispatcher`] queues an asynchronous serverless invocation and
//!   expects `202 Accepted`.

use async_trait::async_trait;
use quizgen_core::{DispatchBatch, DispatchError, Dispatcher};
use reqwest::{Client, Response, StatusCode};
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

use crate::config::{DispatchConfig, Transport};

/// Path the worker service accepts batches on
pub const GENERATE_PATH: &str = "/generate_quiz";

fn build_client(timeout: Duration) -> Result<Client, DispatchError> {
    Client::builder()
        .timeout(timeout)
        .build()
        .map_err(|e| DispatchError::Config(format!("Failed to create HTTP client: {}", e)))
}

fn transport_error(err: reqwest::Error) -> DispatchError {
    DispatchError::Transport(err.to_string())
}

async fn rejected(response: Response) -> DispatchError {
    let status = response.status().as_u16();
    let message = response.text().await.unwrap_or_default();
    DispatchError::Rejected { status, message }
}

/// Posts batches to the worker service
#[derive(Clone)]
pub struct HttpDispatcher {
    url: String,
    client: Client,
}

impl HttpDispatcher {
    pub fn new(endpoint: &str, timeout: Duration) -> Result<Self, DispatchError> {
        Ok(Self {
            url: format!("{}{}", endpoint.trim_end_matches('/'), GENERATE_PATH),
            client: build_client(timeout)?,
        })
    }
}

#[async_trait]
impl Dispatcher for HttpDispatcher {
    async fn dispatch(&self, batch: DispatchBatch) -> Result<(), DispatchError> {
        let response = self
            .client
            .post(&self.url)
            .bearer_auth(&batch.callback_credential)
            .json(&batch)
            .send()
            .await
            .map_err(transport_error)?;

        if !response.status().is_success() {
            return Err(rejected(response).await);
        }
        debug!(url = %self.url, jobs = ?batch.job_ids(), "batch accepted by worker");
        Ok(())
    }
}

/// Queues batches as asynchronous function invocations
#[derive(Clone)]
pub struct FunctionDispatcher {
    url: String,
    api_key: String,
    client: Client,
}

impl FunctionDispatcher {
    pub fn new(url: &str, api_key: &str, timeout: Duration) -> Result<Self, DispatchError> {
        if api_key.is_empty() {
            return Err(DispatchError::Config("Function transport needs an api_key".to_string()));
        }
        Ok(Self {
            url: url.to_string(),
            api_key: api_key.to_string(),
            client: build_client(timeout)?,
        })
    }
}

#[async_trait]
impl Dispatcher for FunctionDispatcher {
    async fn dispatch(&self, batch: DispatchBatch) -> Result<(), DispatchError> {
        let response = self
            .client
            .post(&self.url)
            .bearer_auth(&self.api_key)
            .header("X-Invocation-Type", "Event")
            .json(&batch)
            .send()
            .await
            .map_err(transport_error)?;

        if response.status() != StatusCode::ACCEPTED {
            return Err(rejected(response).await);
        }
        debug!(url = %self.url, jobs = ?batch.job_ids(), "function invocation queued");
        Ok(())
    }
}

/// Build the dispatcher selected by `config`
pub fn build_dispatcher(config: &DispatchConfig) -> Result<Arc<dyn Dispatcher>, DispatchError> {
    match config.transport {
        Transport::Http => Ok(Arc::new(HttpDispatcher::new(&config.endpoint, config.timeout)?)),
        Transport::Function => {
            let api_key = config.api_key.as_deref().unwrap_or_default();
            Ok(Arc::new(FunctionDispatcher::new(&config.endpoint, api_key, config.timeout)?))
        }
    }
}
