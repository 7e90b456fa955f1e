//! Exercise session controller.
//!
//! One adapter per exercise kind. An adapter builds the next
//! `ExerciseSession` for its kind from a topic and optional seed text; the
//! controller routes an `OrchestrationAction` to the adapter owning the
//! action's view, so a non-matching view is a hand-off between exercise
//! types, not an error. Adapters never mutate a live session; they only
//! construct replacements.

use crate::clients::{ContentApi, ExercisePayload};
use async_trait::async_trait;
use praxis_common::types::{
    Exercise, ExerciseKind, ExerciseSession, OrchestrationAction, SessionStatus,
};
use std::sync::Arc;
use tracing::{info, warn};

const DEFAULT_STARTER_CODE: &str = "# Write your solution here\nprint(\"Hello, World!\")";

#[async_trait]
pub trait ExerciseAdapter: Send + Sync {
    fn kind(&self) -> ExerciseKind;

    /// Build a fresh session for this exercise kind. Content failures and
    /// missing topics come back as explicit terminal display states, never
    /// as errors.
    async fn build_session(&self, topic: Option<&str>, seed: Option<&str>) -> ExerciseSession;
}

/// Tutor conversations need no content fetch; they start from the seed text
/// (typically the orchestrator's reply). A missing topic is tolerated here.
pub struct TeachAdapter;

#[async_trait]
impl ExerciseAdapter for TeachAdapter {
    fn kind(&self) -> ExerciseKind {
        ExerciseKind::Teach
    }

    async fn build_session(&self, topic: Option<&str>, seed: Option<&str>) -> ExerciseSession {
        let mut session = ExerciseSession::new(ExerciseKind::Teach, topic.map(str::to_string));
        session.seed_message = seed.map(str::to_string);
        session.status = SessionStatus::Idle;
        session
    }
}

/// Quiz generation and grading are external; the session only tracks the
/// topic and, later, the failed prerequisite topics delivered with the
/// completion signal.
pub struct QuizAdapter;

#[async_trait]
impl ExerciseAdapter for QuizAdapter {
    fn kind(&self) -> ExerciseKind {
        ExerciseKind::Quiz
    }

    async fn build_session(&self, topic: Option<&str>, seed: Option<&str>) -> ExerciseSession {
        let Some(topic) = topic else {
            return ExerciseSession::no_mission(ExerciseKind::Quiz);
        };
        let mut session = ExerciseSession::new(ExerciseKind::Quiz, Some(topic.to_string()));
        session.seed_message = seed.map(str::to_string);
        session
    }
}

pub struct CodeAdapter {
    content: Arc<dyn ContentApi>,
}

impl CodeAdapter {
    pub fn new(content: Arc<dyn ContentApi>) -> Self {
        CodeAdapter { content }
    }

    fn seed_from_exercise(
        topic: &str,
        seed: Option<&str>,
        exercise: Exercise,
        phases: Vec<Exercise>,
    ) -> ExerciseSession {
        let mut session = ExerciseSession::new(ExerciseKind::Code, Some(topic.to_string()));
        session.title = Some(exercise.title);
        session.description = Some(exercise.description);
        session.difficulty = exercise.difficulty;
        session.source_code = exercise
            .starter_code
            .unwrap_or_else(|| DEFAULT_STARTER_CODE.to_string());
        session.test_cases = exercise.test_cases;
        session.phases = phases;
        session.seed_message = seed.map(str::to_string);
        session
    }
}

#[async_trait]
impl ExerciseAdapter for CodeAdapter {
    fn kind(&self) -> ExerciseKind {
        ExerciseKind::Code
    }

    async fn build_session(&self, topic: Option<&str>, seed: Option<&str>) -> ExerciseSession {
        let Some(topic) = topic else {
            return ExerciseSession::no_mission(ExerciseKind::Code);
        };

        match self.content.fetch_exercise(topic).await {
            Ok(ExercisePayload::Single { question }) => {
                info!(topic = %topic, title = %question.title, "code session seeded");
                Self::seed_from_exercise(topic, seed, question, Vec::new())
            }
            Ok(ExercisePayload::Plan { questions, .. }) => {
                let phases: Vec<Exercise> = questions
                    .into_iter()
                    .filter(Exercise::is_substantial)
                    .collect();
                let Some(first) = phases.first().cloned() else {
                    warn!(topic = %topic, "plan contained no usable phases");
                    return ExerciseSession::failed_to_load(
                        ExerciseKind::Code,
                        Some(topic.to_string()),
                        "plan contained no usable phases".to_string(),
                    );
                };
                info!(topic = %topic, phases = phases.len(), "code session seeded from plan");
                Self::seed_from_exercise(topic, seed, first, phases)
            }
            Err(e) => {
                warn!(topic = %topic, error = %e, "failed to fetch exercise");
                ExerciseSession::failed_to_load(
                    ExerciseKind::Code,
                    Some(topic.to_string()),
                    e.to_string(),
                )
            }
        }
    }
}

pub struct DebugAdapter {
    content: Arc<dyn ContentApi>,
    batch: u32,
}

impl DebugAdapter {
    pub fn new(content: Arc<dyn ContentApi>, batch: u32) -> Self {
        DebugAdapter { content, batch }
    }
}

#[async_trait]
impl ExerciseAdapter for DebugAdapter {
    fn kind(&self) -> ExerciseKind {
        ExerciseKind::Debug
    }

    async fn build_session(&self, topic: Option<&str>, seed: Option<&str>) -> ExerciseSession {
        let Some(topic) = topic else {
            return ExerciseSession::no_mission(ExerciseKind::Debug);
        };

        match self.content.fetch_debug_challenges(topic, self.batch).await {
            Ok(challenges) if challenges.is_empty() => ExerciseSession::failed_to_load(
                ExerciseKind::Debug,
                Some(topic.to_string()),
                "no challenges available for topic".to_string(),
            ),
            Ok(challenges) => {
                let mut session =
                    ExerciseSession::new(ExerciseKind::Debug, Some(topic.to_string()));
                session.description = Some(challenges[0].description.clone());
                session.source_code = challenges[0].buggy_code.clone();
                session.challenges = challenges;
                session.seed_message = seed.map(str::to_string);
                info!(topic = %topic, challenges = session.challenges.len(), "debug session seeded");
                session
            }
            Err(e) => {
                warn!(topic = %topic, error = %e, "failed to fetch debug challenges");
                ExerciseSession::failed_to_load(
                    ExerciseKind::Debug,
                    Some(topic.to_string()),
                    e.to_string(),
                )
            }
        }
    }
}

/// Routes session construction to the adapter owning an exercise kind.
pub struct ExerciseController {
    adapters: Vec<Arc<dyn ExerciseAdapter>>,
}

impl ExerciseController {
    pub fn new(content: Arc<dyn ContentApi>, challenge_batch: u32) -> Self {
        ExerciseController {
            adapters: vec![
                Arc::new(TeachAdapter),
                Arc::new(QuizAdapter),
                Arc::new(CodeAdapter::new(content.clone())),
                Arc::new(DebugAdapter::new(content, challenge_batch)),
            ],
        }
    }

    fn adapter_for(&self, kind: ExerciseKind) -> &Arc<dyn ExerciseAdapter> {
        self.adapters
            .iter()
            .find(|a| a.kind() == kind)
            .expect("an adapter exists for every exercise kind")
    }

    pub async fn build(
        &self,
        kind: ExerciseKind,
        topic: Option<&str>,
        seed: Option<&str>,
    ) -> ExerciseSession {
        self.adapter_for(kind).build_session(topic, seed).await
    }

    /// Consume an orchestration action: hand off to the adapter matching the
    /// action's view, passing topic and reply text as session-seed data.
    pub async fn apply(&self, action: &OrchestrationAction) -> ExerciseSession {
        self.build(
            action.view.exercise_kind(),
            action.topic.as_deref(),
            action.reply_text.as_deref(),
        )
        .await
    }
}
