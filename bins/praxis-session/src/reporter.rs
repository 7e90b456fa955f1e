//! Success reporter.
//!
//! Called only from the ReportingSuccess state, after a fully-passing
//! evaluation (or its quiz/debug equivalent). Sends the accumulated context
//! to the orchestration service and turns the reply into the next
//! `OrchestrationAction`. A reply without an explicit action is not an
//! error: the default fallback is the Tutor view seeded with the reply text.

use async_trait::async_trait;
use praxis_common::errors::ServiceError;
use praxis_common::types::{OrchestrationAction, ViewKind};
use serde::Deserialize;
use std::sync::Arc;
use tracing::info;

/// Wire shape of the orchestration service's reply.
#[derive(Debug, Clone, Deserialize)]
pub struct ReportReply {
    #[serde(default)]
    pub reply: Option<String>,
    #[serde(default)]
    pub action: Option<ActionPayload>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ActionPayload {
    pub view: ViewKind,
    #[serde(default)]
    pub data: Option<ActionData>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ActionData {
    #[serde(default)]
    pub topic: Option<String>,
}

/// Orchestration service boundary; implemented over HTTP in production and
/// mocked in tests.
#[async_trait]
pub trait OrchestrationApi: Send + Sync {
    async fn report_success(&self, failed_topics: &[String]) -> Result<ReportReply, ServiceError>;
}

#[derive(Clone)]
pub struct SuccessReporter {
    api: Arc<dyn OrchestrationApi>,
}

impl SuccessReporter {
    pub fn new(api: Arc<dyn OrchestrationApi>) -> Self {
        SuccessReporter { api }
    }

    /// Report a success and resolve the next action. `failed_topics` carries
    /// whatever context the exercise type accumulated (failed prerequisite
    /// topics for quizzes, empty for coding and debugging).
    pub async fn report(
        &self,
        failed_topics: &[String],
    ) -> Result<OrchestrationAction, ServiceError> {
        let reply = self.api.report_success(failed_topics).await?;
        let action = resolve_action(reply);
        info!(view = %action.view, topic = ?action.topic, "orchestration action resolved");
        Ok(action)
    }
}

/// Default-fallback law: no explicit action means "go to the Tutor view with
/// the service's free-text reply as the opening message".
fn resolve_action(reply: ReportReply) -> OrchestrationAction {
    match reply.action {
        Some(action) => OrchestrationAction {
            view: action.view,
            topic: action.data.and_then(|d| d.topic),
            reply_text: reply.reply,
        },
        None => OrchestrationAction {
            view: ViewKind::Tutor,
            topic: None,
            reply_text: reply.reply,
        },
    }
}
