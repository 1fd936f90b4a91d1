//! Server configuration for quizgen-server
//!
//! Loads and parses `quizgen-server.toml`, then applies environment overrides
//! (`JWT_SECRET`, `HOST`, `PORT`, `WORKER_API_KEY`).

use quizgen_core::{RunnerConfig, StepSettings};
use quizgen_worker::{DispatchConfig, JwtConfig, Transport, DEFAULT_AUDIENCE};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ServerConfigError {
    #[error("Failed to read config file: {0}")]
    ReadError(std::io::Error),
    #[error("Failed to parse TOML: {0}")]
    ParseError(toml::de::Error),
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
}

/// Server identification and bind address
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerInfoConfig {
    #[serde(default = "default_server_name")]
    pub name: String,
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    /// Browser origins allowed by CORS; empty allows any
    #[serde(default)]
    pub cors_origins: Vec<String>,
}

impl Default for ServerInfoConfig {
    fn default() -> Self {
        Self {
            name: default_server_name(),
            host: default_host(),
            port: default_port(),
            cors_origins: Vec::new(),
        }
    }
}

/// Database configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    /// SQLite database file path
    pub path: String,
}

/// Token verification
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AuthConfig {
    /// HS256 secret (can be overridden by the JWT_SECRET environment variable)
    #[serde(default)]
    pub jwt_secret: Option<String>,
    #[serde(default = "default_audience")]
    pub audience: String,
}

/// Worker dispatch settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkerSection {
    #[serde(default)]
    pub transport: Transport,
    /// Worker base URL or function invocation URL
    pub endpoint: String,
    /// Function invocation key (can be overridden by WORKER_API_KEY)
    #[serde(default)]
    pub api_key: Option<String>,
    /// Public URL of this server's callback endpoint
    pub callback_url: String,
    #[serde(default = "default_dispatch_grace_ms")]
    pub dispatch_grace_ms: u64,
    #[serde(default = "default_result_timeout_secs")]
    pub result_timeout_secs: u64,
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
}

/// Article sourcing
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ArticlesConfig {
    #[serde(default = "default_homepage_url")]
    pub homepage_url: String,
    /// Regex an href must match to count as an article link
    #[serde(default = "default_link_pattern")]
    pub link_pattern: String,
    #[serde(default = "default_max_chars")]
    pub max_chars: usize,
}

impl Default for ArticlesConfig {
    fn default() -> Self {
        Self {
            homepage_url: default_homepage_url(),
            link_pattern: default_link_pattern(),
            max_chars: default_max_chars(),
        }
    }
}

/// Executor limits
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobsConfig {
    #[serde(default = "default_max_steps_per_run")]
    pub max_steps_per_run: usize,
}

impl Default for JobsConfig {
    fn default() -> Self {
        Self {
            max_steps_per_run: default_max_steps_per_run(),
        }
    }
}

/// Complete server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default)]
    pub server: ServerInfoConfig,
    pub database: DatabaseConfig,
    #[serde(default)]
    pub auth: AuthConfig,
    pub worker: WorkerSection,
    #[serde(default)]
    pub articles: ArticlesConfig,
    #[serde(default)]
    pub jobs: JobsConfig,
}

impl ServerConfig {
    /// Load configuration from a TOML file
    pub fn from_file<P: AsRef<std::path::Path>>(path: P) -> Result<Self, ServerConfigError> {
        let content =
            std::fs::read_to_string(path.as_ref()).map_err(ServerConfigError::ReadError)?;
        Self::from_str(&content)
    }

    /// Load configuration from TOML string
    pub fn from_str(content: &str) -> Result<Self, ServerConfigError> {
        toml::from_str(content).map_err(ServerConfigError::ParseError)
    }

    /// Load configuration from default location or environment
    ///
    /// Searches for config in:
    /// 1. CONFIG_PATH environment variable
    /// 2. ./config/quizgen-server.toml
    /// 3. ../config/quizgen-server.toml (for development)
    /// 4. ./quizgen-server.toml
    pub fn load() -> Result<Self, ServerConfigError> {
        let mut config = match std::env::var("CONFIG_PATH") {
            Ok(config_path) => Self::from_file(config_path)?,
            Err(_) => {
                let paths = [
                    PathBuf::from("config/quizgen-server.toml"),
                    PathBuf::from("../config/quizgen-server.toml"),
                    PathBuf::from("./quizgen-server.toml"),
                ];
                let path = paths.iter().find(|path| path.exists()).ok_or_else(|| {
                    ServerConfigError::InvalidConfig(
                        "Configuration file not found. Set CONFIG_PATH or place quizgen-server.toml in config/".to_string(),
                    )
                })?;
                Self::from_file(path)?
            }
        };
        config.apply_env_overrides()?;
        Ok(config)
    }

    fn apply_env_overrides(&mut self) -> Result<(), ServerConfigError> {
        if let Ok(secret) = std::env::var("JWT_SECRET") {
            self.auth.jwt_secret = Some(secret);
        }
        if let Ok(host) = std::env::var("HOST") {
            self.server.host = host;
        }
        if let Ok(port) = std::env::var("PORT") {
            self.server.port = port
                .parse()
                .map_err(|e| ServerConfigError::InvalidConfig(format!("PORT: {}", e)))?;
        }
        if let Ok(key) = std::env::var("WORKER_API_KEY") {
            self.worker.api_key = Some(key);
        }
        Ok(())
    }

    /// Get database URL from configuration
    pub fn database_url(&self) -> String {
        format!("sqlite://{}", self.database.path)
    }

    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.server.host, self.server.port)
    }

    pub fn jwt_config(&self) -> Result<JwtConfig, ServerConfigError> {
        let secret = self
            .auth
            .jwt_secret
            .clone()
            .filter(|secret| !secret.is_empty())
            .ok_or_else(|| {
                ServerConfigError::InvalidConfig(
                    "auth.jwt_secret or JWT_SECRET is required".to_string(),
                )
            })?;
        Ok(JwtConfig::new(secret).with_audience(self.auth.audience.clone()))
    }

    pub fn dispatch_config(&self) -> DispatchConfig {
        DispatchConfig {
            transport: self.worker.transport,
            endpoint: self.worker.endpoint.clone(),
            api_key: self.worker.api_key.clone(),
            timeout: Duration::from_secs(self.worker.request_timeout_secs),
        }
    }

    pub fn step_settings(&self) -> StepSettings {
        StepSettings {
            callback_url: self.worker.callback_url.clone(),
            dispatch_grace: Duration::from_millis(self.worker.dispatch_grace_ms),
            result_timeout: Duration::from_secs(self.worker.result_timeout_secs),
            ..StepSettings::default()
        }
    }

    pub fn runner_config(&self) -> RunnerConfig {
        RunnerConfig {
            max_steps_per_run: self.jobs.max_steps_per_run,
            ..RunnerConfig::default()
        }
    }
}

fn default_server_name() -> String {
    "quizgen-server".to_string()
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    8080
}

fn default_audience() -> String {
    DEFAULT_AUDIENCE.to_string()
}

fn default_dispatch_grace_ms() -> u64 {
    300
}

fn default_result_timeout_secs() -> u64 {
    900
}

fn default_request_timeout_secs() -> u64 {
    30
}

fn default_homepage_url() -> String {
    "https://nos.nl".to_string()
}

fn default_link_pattern() -> String {
    r"^/artikel/\d+".to_string()
}

fn default_max_chars() -> usize {
    8000
}

fn default_max_steps_per_run() -> usize {
    25
}
