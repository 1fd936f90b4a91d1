//! Quiz server binary

use anyhow::Context;
use quizgen_core::{JobRunner, QuizSteps};
use quizgen_server::{
    create_router,
    db::{DatabaseConnection, QuizRepository, SqliteCheckpointSaver, WordRepository},
    AppState, PollController, ServerConfig, WebArticleSource,
};
use quizgen_worker::{build_dispatcher, TokenVerifier};
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info,sqlx=warn")),
        )
        .init();

    let config = ServerConfig::load().context("Failed to load configuration")?;
    tracing::info!("Starting {}", config.server.name);

    let database_url = config.database_url();
    tracing::info!("Connecting to database: {}", database_url);
    let db = DatabaseConnection::new(&database_url)
        .await
        .context("Failed to open database")?;
    db.run_migrations().await.context("Failed to run migrations")?;
    db.health_check().await.context("Database health check failed")?;
    tracing::info!("Database ready");

    let verifier = TokenVerifier::new(config.jwt_config()?);
    let quizzes = QuizRepository::new(db.pool().clone());
    let words = WordRepository::new(db.pool().clone());
    let articles = WebArticleSource::new(&config.articles)?;
    let dispatcher = build_dispatcher(&config.dispatch_config())?;
    tracing::info!(
        "Worker dispatch: {:?} -> {}",
        config.worker.transport,
        config.worker.endpoint
    );

    let steps = QuizSteps::new(
        Arc::new(words),
        Arc::new(articles),
        Arc::new(quizzes.clone()),
        dispatcher,
    )
    .with_settings(config.step_settings());
    let runner = JobRunner::new(
        Arc::new(SqliteCheckpointSaver::new(db.pool().clone())),
        Arc::new(steps),
    )
    .with_config(config.runner_config());

    let state = AppState {
        db: db.clone(),
        controller: PollController::new(runner),
        quizzes,
        verifier,
    };
    let app = create_router(state, &config.server.cors_origins);

    let addr = config.bind_address();
    tracing::info!("Listening on {}", addr);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind {}", addr))?;

    axum::serve(listener, app.into_make_service())
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    db.close().await;
    tracing::info!("Server shut down gracefully");
    Ok(())
}

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
        _ = ctrl_c => tracing::info!("Received CTRL-C, shutting down"),
        _ = terminate => tracing::info!("Received SIGTERM, shutting down"),
    }
}
