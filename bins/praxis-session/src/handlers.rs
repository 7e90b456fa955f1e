// HTTP route handlers for the Praxis session service

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Json},
};
use praxis_common::errors::{EngineError, SessionError};
use praxis_common::types::{ExerciseKind, ExerciseSession};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{error, info};
use uuid::Uuid;

use crate::session::SessionOrchestrator;
use crate::AppState;

#[derive(Debug, Deserialize)]
pub struct OpenSessionRequest {
    pub kind: ExerciseKind,
    #[serde(default)]
    pub topic: Option<String>,
    #[serde(default)]
    pub seed_message: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct SessionResponse {
    pub session_id: String,
    pub session: ExerciseSession,
}

#[derive(Debug, Deserialize)]
pub struct RunRequest {
    pub source_code: String,
}

#[derive(Debug, Deserialize)]
pub struct QuizResultRequest {
    #[serde(default)]
    pub failed_topics: Vec<String>,
}

#[derive(Debug, Deserialize)]
pub struct ExplainRequest {
    pub explanation: String,
}

#[derive(Debug, Deserialize)]
pub struct PhaseRequest {
    pub index: usize,
}

#[derive(Debug, Deserialize)]
pub struct NavigateRequest {
    pub kind: ExerciseKind,
    #[serde(default)]
    pub topic: Option<String>,
    #[serde(default)]
    pub seed_message: Option<String>,
}

fn error_response(err: SessionError) -> axum::response::Response {
    let status = match &err {
        SessionError::RunInFlight => StatusCode::CONFLICT,
        SessionError::InvalidTransition { .. } => StatusCode::CONFLICT,
        SessionError::NotFound => StatusCode::NOT_FOUND,
        SessionError::PhaseOutOfRange(_) => StatusCode::NOT_FOUND,
        SessionError::Engine(EngineError::Busy) => StatusCode::CONFLICT,
        SessionError::Engine(EngineError::Unavailable(_)) => StatusCode::SERVICE_UNAVAILABLE,
        SessionError::Service(_) => StatusCode::BAD_GATEWAY,
    };
    (status, Json(serde_json::json!({ "error": err.to_string() }))).into_response()
}

async fn orchestrator_for(
    state: &AppState,
    id: &str,
) -> Result<SessionOrchestrator, SessionError> {
    let session_id = Uuid::parse_str(id).map_err(|_| SessionError::NotFound)?;
    state
        .sessions
        .read()
        .await
        .get(&session_id)
        .cloned()
        .ok_or(SessionError::NotFound)
}

/// POST /session - Open a new exercise session
pub async fn open_session(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<OpenSessionRequest>,
) -> impl IntoResponse {
    let session = state
        .controller
        .build(
            payload.kind,
            payload.topic.as_deref(),
            payload.seed_message.as_deref(),
        )
        .await;

    let orchestrator = SessionOrchestrator::new(
        state.engine.clone(),
        state.reporter.clone(),
        state.controller.clone(),
        state.content.clone(),
        state.redirect_delay,
        session,
    );
    orchestrator.bootstrap().await;

    // The map key outlives session replacements; the session's own id
    // changes on every hand-off
    let session_id = Uuid::new_v4();
    let snapshot = orchestrator.snapshot().await;
    state
        .sessions
        .write()
        .await
        .insert(session_id, orchestrator);

    info!(
        session_id = %session_id,
        kind = %payload.kind,
        topic = ?payload.topic,
        "session opened"
    );

    (
        StatusCode::CREATED,
        Json(SessionResponse {
            session_id: session_id.to_string(),
            session: snapshot,
        }),
    )
}

/// GET /session/{id} - Current session snapshot
pub async fn get_session(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> axum::response::Response {
    match orchestrator_for(&state, &id).await {
        Ok(orchestrator) => {
            let session = orchestrator.snapshot().await;
            (
                StatusCode::OK,
                Json(SessionResponse {
                    session_id: id,
                    session,
                }),
            )
                .into_response()
        }
        Err(e) => error_response(e),
    }
}

/// POST /session/{id}/run - Execute the learner's code
pub async fn run_code(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    Json(payload): Json<RunRequest>,
) -> axum::response::Response {
    let orchestrator = match orchestrator_for(&state, &id).await {
        Ok(orchestrator) => orchestrator,
        Err(e) => return error_response(e),
    };

    match orchestrator.run(&payload.source_code).await {
        Ok(session) => (
            StatusCode::OK,
            Json(SessionResponse {
                session_id: id,
                session,
            }),
        )
            .into_response(),
        Err(e) => {
            error!(session_id = %id, error = %e, "run failed");
            error_response(e)
        }
    }
}

/// POST /session/{id}/quiz - Record a passed quiz
pub async fn quiz_result(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    Json(payload): Json<QuizResultRequest>,
) -> axum::response::Response {
    let orchestrator = match orchestrator_for(&state, &id).await {
        Ok(orchestrator) => orchestrator,
        Err(e) => return error_response(e),
    };

    match orchestrator.complete_quiz(payload.failed_topics).await {
        Ok(session) => (
            StatusCode::OK,
            Json(SessionResponse {
                session_id: id,
                session,
            }),
        )
            .into_response(),
        Err(e) => error_response(e),
    }
}

/// POST /session/{id}/phase - Switch the active phase of a coding plan
pub async fn select_phase(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    Json(payload): Json<PhaseRequest>,
) -> axum::response::Response {
    let orchestrator = match orchestrator_for(&state, &id).await {
        Ok(orchestrator) => orchestrator,
        Err(e) => return error_response(e),
    };

    match orchestrator.select_phase(payload.index).await {
        Ok(session) => (
            StatusCode::OK,
            Json(SessionResponse {
                session_id: id,
                session,
            }),
        )
            .into_response(),
        Err(e) => error_response(e),
    }
}

/// POST /session/{id}/explain - Submit a debug-challenge explanation
pub async fn submit_explanation(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    Json(payload): Json<ExplainRequest>,
) -> axum::response::Response {
    let orchestrator = match orchestrator_for(&state, &id).await {
        Ok(orchestrator) => orchestrator,
        Err(e) => return error_response(e),
    };

    match orchestrator.submit_explanation(&payload.explanation).await {
        Ok(session) => (
            StatusCode::OK,
            Json(SessionResponse {
                session_id: id,
                session,
            }),
        )
            .into_response(),
        Err(e) => error_response(e),
    }
}

/// POST /session/{id}/retry - Re-trigger a failed engine acquisition
pub async fn retry_session(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> axum::response::Response {
    let orchestrator = match orchestrator_for(&state, &id).await {
        Ok(orchestrator) => orchestrator,
        Err(e) => return error_response(e),
    };

    orchestrator.retry_bootstrap().await;
    let session = orchestrator.snapshot().await;
    (
        StatusCode::OK,
        Json(SessionResponse {
            session_id: id,
            session,
        }),
    )
        .into_response()
}

/// POST /session/{id}/navigate - Replace the session with a new exercise
pub async fn navigate_session(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    Json(payload): Json<NavigateRequest>,
) -> axum::response::Response {
    let orchestrator = match orchestrator_for(&state, &id).await {
        Ok(orchestrator) => orchestrator,
        Err(e) => return error_response(e),
    };

    let session = orchestrator
        .replace(
            payload.kind,
            payload.topic.as_deref(),
            payload.seed_message.as_deref(),
        )
        .await;
    info!(session_id = %id, kind = %payload.kind, "session navigated");
    (
        StatusCode::OK,
        Json(SessionResponse {
            session_id: id,
            session,
        }),
    )
        .into_response()
}

/// DELETE /session/{id} - Close a session and drop its state
pub async fn close_session(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> axum::response::Response {
    let session_id = match Uuid::parse_str(&id) {
        Ok(session_id) => session_id,
        Err(_) => return error_response(SessionError::NotFound),
    };

    match state.sessions.write().await.remove(&session_id) {
        Some(_) => {
            info!(session_id = %id, "session closed");
            StatusCode::NO_CONTENT.into_response()
        }
        None => error_response(SessionError::NotFound),
    }
}

/// GET /status - Health check endpoint
pub async fn health_check(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let sessions = state.sessions.read().await.len();
    (
        StatusCode::OK,
        Json(serde_json::json!({
            "status": "ok",
            "engine_initialized": state.engine.is_initialized(),
            "sessions": sessions,
        })),
    )
}
