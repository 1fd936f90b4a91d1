//! Quiz worker binary
//!
//! Accepts dispatch batches over HTTP and posts generated quizzes back to the
//! server's callback endpoint.

use anyhow::Context;
use quizgen_worker::{OpenAiGenerator, TokenVerifier, WorkerConfig, WorkerState, worker_router};
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let config = WorkerConfig::from_env().context("Worker configuration required")?;
    tracing::info!("Model endpoint: {} ({})", config.generator.base_url, config.generator.model);

    let generator = Arc::new(OpenAiGenerator::new(config.generator.clone())?);
    let state = WorkerState::new(
        TokenVerifier::new(config.jwt.clone()),
        generator,
        config.callback_timeout,
    )?;
    let app = worker_router(state);

    let addr = config.bind_address();
    tracing::info!("Starting quiz worker on {}", addr);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind {}", addr))?;

    axum::serve(listener, app.into_make_service())
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!("Quiz worker shut down gracefully");
    Ok(())
}

/// Signal for graceful shutdown (Ctrl-C or SIGTERM)
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!("Failed to listen for CTRL-C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => tracing::info!("Received CTRL-C signal, shutting down"),
        _ = terminate => tracing::info!("Received SIGTERM signal, shutting down"),
    }
}
