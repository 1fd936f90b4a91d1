//! Worker, generator and dispatch configuration.

use crate::auth::JwtConfig;
use crate::error::{Result, WorkerError};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Configuration for the OpenAI-compatible model behind the worker.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GeneratorConfig {
    /// API key for authentication.
    pub api_key: String,

    /// Base URL for the API.
    ///
    /// Examples:
    /// - OpenAI: "https://api.openai.com/v1"
    /// - LM Studio: "http://localhost:1234/v1"
    pub base_url: String,

    /// Model name/identifier.
    pub model: String,

    /// Request timeout duration.
    #[serde(default = "default_timeout")]
    pub timeout: Duration,

    /// Maximum retries for failed requests.
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    #[serde(default = "default_temperature")]
    pub temperature: f32,
}

impl GeneratorConfig {
    /// Create a new generator configuration.
    pub fn new(
        api_key: impl Into<String>,
        base_url: impl Into<String>,
        model: impl Into<String>,
    ) -> Self {
        Self {
            api_key: api_key.into(),
            base_url: base_url.into(),
            model: model.into(),
            timeout: default_timeout(),
            max_retries: default_max_retries(),
            temperature: default_temperature(),
        }
    }

    /// Read `LLM_BASE_URL`, `LLM_MODEL` and `LLM_API_KEY`.
    ///
    /// Defaults point at a local LM Studio server.
    pub fn from_env() -> Self {
        Self::new(
            env_or("LLM_API_KEY", "lm-studio"),
            env_or("LLM_BASE_URL", "http://localhost:1234/v1"),
            env_or("LLM_MODEL", "local-model"),
        )
    }

    /// Set the request timeout.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Set the maximum number of retries.
    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature;
        self
    }
}

/// How batches reach the worker
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Transport {
    /// Plain HTTP POST to a long-running worker service
    #[default]
    Http,
    /// Asynchronous invocation of a serverless function
    Function,
}

/// Dispatcher settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DispatchConfig {
    #[serde(default)]
    pub transport: Transport,

    /// Worker base URL (http) or function invocation URL (function)
    pub endpoint: String,

    /// Key for the function invocation API
    #[serde(default)]
    pub api_key: Option<String>,

    /// Upper bound on a single dispatch request
    #[serde(default = "default_dispatch_timeout")]
    pub timeout: Duration,
}

impl DispatchConfig {
    pub fn http(endpoint: impl Into<String>) -> Self {
        Self {
            transport: Transport::Http,
            endpoint: endpoint.into(),
            api_key: None,
            timeout: default_dispatch_timeout(),
        }
    }

    pub fn function(endpoint: impl Into<String>, api_key: impl Into<String>) -> Self {
        Self {
            transport: Transport::Function,
            endpoint: endpoint.into(),
            api_key: Some(api_key.into()),
            timeout: default_dispatch_timeout(),
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

/// Worker service settings
#[derive(Debug, Clone)]
pub struct WorkerConfig {
    pub host: String,
    pub port: u16,
    pub jwt: JwtConfig,
    pub generator: GeneratorConfig,
    /// Timeout for posting results back to the callback URL
    pub callback_timeout: Duration,
}

impl WorkerConfig {
    /// Read `WORKER_HOST`, `WORKER_PORT`, `JWT_SECRET` and the generator variables.
    pub fn from_env() -> Result<Self> {
        let secret = std::env::var("JWT_SECRET")
            .map_err(|_| WorkerError::ConfigError("JWT_SECRET must be set".to_string()))?;
        let port = env_or("WORKER_PORT", "8090")
            .parse()
            .map_err(|e| WorkerError::ConfigError(format!("Invalid WORKER_PORT: {}", e)))?;

        Ok(Self {
            host: env_or("WORKER_HOST", "0.0.0.0"),
            port,
            jwt: JwtConfig::new(secret),
            generator: GeneratorConfig::from_env(),
            callback_timeout: Duration::from_secs(30),
        })
    }

    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

fn env_or(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_string())
}

fn default_timeout() -> Duration {
    Duration::from_secs(60)
}

fn default_max_retries() -> u32 {
    3
}

fn default_temperature() -> f32 {
    0.7
}

fn default_dispatch_timeout() -> Duration {
    Duration::from_secs(30)
}
