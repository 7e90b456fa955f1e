// Route table for the Praxis session service

use crate::handlers;
use crate::AppState;
use axum::{
    routing::{get, post},
    Router,
};
use std::sync::Arc;

pub fn routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/session", post(handlers::open_session))
        .route(
            "/session/:id",
            get(handlers::get_session).delete(handlers::close_session),
        )
        .route("/session/:id/retry", post(handlers::retry_session))
        .route("/session/:id/navigate", post(handlers::navigate_session))
        .route("/session/:id/run", post(handlers::run_code))
        .route("/session/:id/phase", post(handlers::select_phase))
        .route("/session/:id/quiz", post(handlers::quiz_result))
        .route("/session/:id/explain", post(handlers::submit_explanation))
        .route("/status", get(handlers::health_check))
}
