//! HTTP clients for the external collaborator services.
//!
//! Three collaborators sit behind this module: the exercise-content service,
//! the orchestration service, and the debug-challenge service. All of them
//! speak JSON over HTTP with bearer-token auth supplied via config. Failures
//! map into the service error taxonomy; nothing here retries.

use async_trait::async_trait;
use praxis_common::errors::ServiceError;
use praxis_common::types::{DebugChallenge, Exercise, VerifyOutcome};
use reqwest::{Client, RequestBuilder};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, error};

use crate::config::ServiceEndpoints;
use crate::reporter::{OrchestrationApi, ReportReply};

/// Content-service response: a single exercise or a multi-phase plan.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ExercisePayload {
    Single {
        question: Exercise,
    },
    Plan {
        #[serde(default)]
        plan: Option<String>,
        #[serde(default)]
        questions: Vec<Exercise>,
    },
}

/// Exercise-content and debug-challenge boundary.
#[async_trait]
pub trait ContentApi: Send + Sync {
    async fn fetch_exercise(&self, topic: &str) -> Result<ExercisePayload, ServiceError>;
    async fn fetch_debug_challenges(
        &self,
        topic: &str,
        count: u32,
    ) -> Result<Vec<DebugChallenge>, ServiceError>;
    async fn verify_explanation(
        &self,
        challenge_id: &str,
        explanation: &str,
    ) -> Result<VerifyOutcome, ServiceError>;
}

#[derive(Debug, Serialize)]
struct ExerciseRequest<'a> {
    topic: &'a str,
}

#[derive(Debug, Serialize)]
struct VerifyRequest<'a> {
    challenge_id: &'a str,
    explanation: &'a str,
}

#[derive(Debug, Serialize)]
struct ReportRequest<'a> {
    failed_topics: &'a [String],
}

/// The debug-challenge service returns a single object for count=1 and an
/// array otherwise.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum OneOrMany {
    Many(Vec<DebugChallenge>),
    One(DebugChallenge),
}

pub struct HttpServices {
    http: Client,
    endpoints: ServiceEndpoints,
}

impl HttpServices {
    pub fn new(endpoints: ServiceEndpoints) -> Self {
        let http = Client::builder()
            .timeout(Duration::from_secs(15))
            .build()
            .unwrap_or_else(|_| Client::new());
        HttpServices { http, endpoints }
    }

    fn authorized(&self, builder: RequestBuilder) -> RequestBuilder {
        match &self.endpoints.bearer_token {
            Some(token) => builder.bearer_auth(token),
            None => builder,
        }
    }
}

#[async_trait]
impl ContentApi for HttpServices {
    async fn fetch_exercise(&self, topic: &str) -> Result<ExercisePayload, ServiceError> {
        let url = format!("{}/", self.endpoints.content_url);
        debug!(topic = %topic, "fetching exercise content");

        let response = self
            .authorized(self.http.post(&url).json(&ExerciseRequest { topic }))
            .send()
            .await
            .map_err(|e| ServiceError::ContentFetchFailure(e.to_string()))?;

        if !response.status().is_success() {
            error!(status = %response.status(), "content service rejected request");
            return Err(ServiceError::ContentFetchFailure(format!(
                "content service returned {}",
                response.status()
            )));
        }

        response
            .json::<ExercisePayload>()
            .await
            .map_err(|e| ServiceError::ContentFetchFailure(format!("malformed payload: {}", e)))
    }

    async fn fetch_debug_challenges(
        &self,
        topic: &str,
        count: u32,
    ) -> Result<Vec<DebugChallenge>, ServiceError> {
        let url = format!("{}/get-challenge/", self.endpoints.debugger_url);
        debug!(topic = %topic, count = count, "fetching debug challenges");

        let response = self
            .authorized(
                self.http
                    .get(&url)
                    .query(&[("topic", topic), ("count", &count.to_string())]),
            )
            .send()
            .await
            .map_err(|e| ServiceError::ContentFetchFailure(e.to_string()))?;

        if !response.status().is_success() {
            return Err(ServiceError::ContentFetchFailure(format!(
                "debug-challenge service returned {}",
                response.status()
            )));
        }

        let payload = response
            .json::<OneOrMany>()
            .await
            .map_err(|e| ServiceError::ContentFetchFailure(format!("malformed payload: {}", e)))?;

        Ok(match payload {
            OneOrMany::Many(challenges) => challenges,
            OneOrMany::One(challenge) => vec![challenge],
        })
    }

    async fn verify_explanation(
        &self,
        challenge_id: &str,
        explanation: &str,
    ) -> Result<VerifyOutcome, ServiceError> {
        let url = format!("{}/verify/", self.endpoints.debugger_url);

        let response = self
            .authorized(self.http.post(&url).json(&VerifyRequest {
                challenge_id,
                explanation,
            }))
            .send()
            .await
            .map_err(|e| ServiceError::ContentFetchFailure(e.to_string()))?;

        if !response.status().is_success() {
            return Err(ServiceError::ContentFetchFailure(format!(
                "verify endpoint returned {}",
                response.status()
            )));
        }

        response
            .json::<VerifyOutcome>()
            .await
            .map_err(|e| ServiceError::ContentFetchFailure(format!("malformed payload: {}", e)))
    }
}

#[async_trait]
impl OrchestrationApi for HttpServices {
    async fn report_success(&self, failed_topics: &[String]) -> Result<ReportReply, ServiceError> {
        let url = format!("{}/report_success/", self.endpoints.orchestrator_url);
        debug!(failed_topics = failed_topics.len(), "reporting success to orchestrator");

        let response = self
            .authorized(self.http.post(&url).json(&ReportRequest { failed_topics }))
            .send()
            .await
            .map_err(|e| ServiceError::ReportUnreachable(e.to_string()))?;

        if !response.status().is_success() {
            error!(status = %response.status(), "orchestration service rejected report");
            return Err(ServiceError::ReportUnreachable(format!(
                "orchestration service returned {}",
                response.status()
            )));
        }

        response
            .json::<ReportReply>()
            .await
            .map_err(|e| ServiceError::ReportUnreachable(format!("malformed reply: {}", e)))
    }
}
