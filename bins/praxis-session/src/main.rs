mod adapters;
mod clients;
mod config;
mod engine;
mod evaluator;
mod handlers;
mod harness;
mod interpreter;
mod reporter;
mod routes;
mod session;

#[cfg(test)]
mod test_support;

use crate::adapters::ExerciseController;
use crate::clients::{ContentApi, HttpServices};
use crate::config::Settings;
use crate::engine::ExecutionEngine;
use crate::interpreter::DockerProvider;
use crate::reporter::{OrchestrationApi, SuccessReporter};
use crate::session::SessionOrchestrator;
use axum::Router;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::signal;
use tokio::sync::RwLock;
use tracing::{info, warn};
use uuid::Uuid;

pub struct AppState {
    pub engine: Arc<ExecutionEngine>,
    pub reporter: SuccessReporter,
    pub controller: Arc<ExerciseController>,
    pub content: Arc<dyn ContentApi>,
    pub redirect_delay: Duration,
    pub sessions: RwLock<HashMap<Uuid, SessionOrchestrator>>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing subscriber
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_target(false)
        .init();

    info!("Praxis session service booting...");

    let settings = Settings::load_default()?;
    info!(
        content = %settings.services.content_url,
        orchestrator = %settings.services.orchestrator_url,
        debugger = %settings.services.debugger_url,
        "Service endpoints configured"
    );

    let services = Arc::new(HttpServices::new(settings.services.clone()));
    let content: Arc<dyn ContentApi> = services.clone();
    let orchestration: Arc<dyn OrchestrationApi> = services;

    let provider = Arc::new(DockerProvider::new(settings.sandbox.clone()));
    let engine = Arc::new(ExecutionEngine::new(provider));

    // Warm the sandbox up front; a failure here is not fatal, the first
    // code or debug session retries acquisition
    if let Err(e) = engine.initialize().await {
        warn!(error = %e, "sandbox warmup failed, will retry on first session");
    }

    let state = Arc::new(AppState {
        engine: engine.clone(),
        reporter: SuccessReporter::new(orchestration),
        controller: Arc::new(ExerciseController::new(
            content.clone(),
            settings.challenge_batch,
        )),
        content,
        redirect_delay: Duration::from_millis(settings.redirect_delay_ms),
        sessions: RwLock::new(HashMap::new()),
    });

    let app = Router::new().merge(routes::routes()).with_state(state);

    let listener = TcpListener::bind(&settings.listen_addr).await?;
    info!("HTTP server listening on {}", settings.listen_addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    engine.shutdown().await;
    info!("Session service shutdown complete");
    Ok(())
}

async fn shutdown_signal() {
    signal::ctrl_c()
        .await
        .expect("failed to install CTRL+C signal handler");
    warn!("Received shutdown signal");
}
