//! Shared test doubles: an in-memory interpreter with scripted outcomes and
//! mock service boundaries. Compiled for tests only.

use crate::clients::{ContentApi, ExercisePayload};
use crate::interpreter::{Interpreter, InterpreterOutcome, InterpreterProvider};
use crate::reporter::{ActionData, ActionPayload, OrchestrationApi, ReportReply};
use async_trait::async_trait;
use praxis_common::errors::{EngineError, ServiceError};
use praxis_common::types::{DebugChallenge, Exercise, VerifyOutcome, ViewKind};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::Notify;

/// Interpreter double that records every `(source, stdin)` call and replays
/// either a fixed outcome or a scripted queue of outcomes.
#[derive(Clone)]
pub struct StubInterpreter {
    state: Arc<StubState>,
}

struct StubState {
    fixed: Option<InterpreterOutcome>,
    scripted: Mutex<VecDeque<InterpreterOutcome>>,
    calls: Mutex<Vec<(String, String)>>,
    hold: Mutex<Option<Arc<Notify>>>,
}

impl StubInterpreter {
    fn with_fixed(fixed: Option<InterpreterOutcome>) -> Self {
        StubInterpreter {
            state: Arc::new(StubState {
                fixed,
                scripted: Mutex::new(VecDeque::new()),
                calls: Mutex::new(Vec::new()),
                hold: Mutex::new(None),
            }),
        }
    }

    /// Every execution completes with the given stdout.
    pub fn completing(stdout: &str) -> Self {
        Self::with_fixed(Some(InterpreterOutcome::Completed {
            stdout: stdout.to_string(),
        }))
    }

    /// Every execution faults with the given error.
    pub fn faulting(error: &str) -> Self {
        Self::with_fixed(Some(InterpreterOutcome::Faulted {
            error: error.to_string(),
        }))
    }

    /// Executions consume the queue in order.
    pub fn scripted(outcomes: Vec<InterpreterOutcome>) -> Self {
        let stub = Self::with_fixed(None);
        *stub.state.scripted.lock().unwrap() = outcomes.into();
        stub
    }

    /// Park the next execution until the returned handle is notified.
    pub fn hold(&self) -> Arc<Notify> {
        let notify = Arc::new(Notify::new());
        *self.state.hold.lock().unwrap() = Some(notify.clone());
        notify
    }

    pub fn calls(&self) -> Vec<(String, String)> {
        self.state.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl Interpreter for StubInterpreter {
    async fn execute(&self, source: &str, stdin: &str) -> InterpreterOutcome {
        self.state
            .calls
            .lock()
            .unwrap()
            .push((source.to_string(), stdin.to_string()));

        let gate = self.state.hold.lock().unwrap().take();
        if let Some(notify) = gate {
            notify.notified().await;
        }

        if let Some(outcome) = self.state.scripted.lock().unwrap().pop_front() {
            return outcome;
        }
        self.state
            .fixed
            .clone()
            .unwrap_or(InterpreterOutcome::Completed {
                stdout: String::new(),
            })
    }
}

/// Provider that hands out clones of one stub and counts acquisitions.
pub struct StubProvider {
    stub: StubInterpreter,
    pub acquisitions: AtomicUsize,
}

impl StubProvider {
    pub fn new(stub: StubInterpreter) -> Self {
        StubProvider {
            stub,
            acquisitions: AtomicUsize::new(0),
        }
    }
}

#[async_trait]
impl InterpreterProvider for StubProvider {
    async fn acquire(&self) -> Result<Arc<dyn Interpreter>, EngineError> {
        self.acquisitions.fetch_add(1, Ordering::SeqCst);
        Ok(Arc::new(self.stub.clone()))
    }
}

/// Provider whose acquisitions always fail, counting the attempts.
#[derive(Default)]
pub struct FailingProvider {
    pub attempts: AtomicUsize,
}

#[async_trait]
impl InterpreterProvider for FailingProvider {
    async fn acquire(&self) -> Result<Arc<dyn Interpreter>, EngineError> {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        Err(EngineError::Unavailable(
            "sandbox runtime not available".to_string(),
        ))
    }
}

/// Orchestration double that records reported `failed_topics` and replies
/// with a canned payload.
pub struct MockOrchestration {
    reply: Option<ReportReply>,
    calls: Mutex<Vec<Vec<String>>>,
    hold: Mutex<Option<Arc<Notify>>>,
}

impl MockOrchestration {
    fn with_reply(reply: Option<ReportReply>) -> Self {
        MockOrchestration {
            reply,
            calls: Mutex::new(Vec::new()),
            hold: Mutex::new(None),
        }
    }

    /// Park the next report until the returned handle is notified.
    pub fn hold(&self) -> Arc<Notify> {
        let notify = Arc::new(Notify::new());
        *self.hold.lock().unwrap() = Some(notify.clone());
        notify
    }

    /// Reply with free text and no explicit action.
    pub fn replying_tutor(text: &str) -> Self {
        Self::with_reply(Some(ReportReply {
            reply: Some(text.to_string()),
            action: None,
        }))
    }

    /// Reply with an explicit action directing the given view and topic.
    pub fn replying_with_action(text: &str, view: ViewKind, topic: Option<&str>) -> Self {
        Self::with_reply(Some(ReportReply {
            reply: Some(text.to_string()),
            action: Some(ActionPayload {
                view,
                data: Some(ActionData {
                    topic: topic.map(str::to_string),
                }),
            }),
        }))
    }

    /// Every report fails as unreachable.
    pub fn unreachable() -> Self {
        Self::with_reply(None)
    }

    pub fn calls(&self) -> Vec<Vec<String>> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl OrchestrationApi for MockOrchestration {
    async fn report_success(&self, failed_topics: &[String]) -> Result<ReportReply, ServiceError> {
        self.calls.lock().unwrap().push(failed_topics.to_vec());
        let gate = self.hold.lock().unwrap().take();
        if let Some(notify) = gate {
            notify.notified().await;
        }
        self.reply.clone().ok_or_else(|| {
            ServiceError::ReportUnreachable("orchestration service unreachable".to_string())
        })
    }
}

/// Content-service double with canned exercise, challenge, and verify data.
#[derive(Default)]
pub struct MockContent {
    exercise: Option<ExercisePayload>,
    challenges: Option<Vec<DebugChallenge>>,
    verify: Option<VerifyOutcome>,
    fail: bool,
    verify_hold: Mutex<Option<Arc<Notify>>>,
}

impl MockContent {
    pub fn with_single(exercise: Exercise) -> Self {
        MockContent {
            exercise: Some(ExercisePayload::Single { question: exercise }),
            ..Default::default()
        }
    }

    pub fn with_plan(questions: Vec<Exercise>) -> Self {
        MockContent {
            exercise: Some(ExercisePayload::Plan {
                plan: Some("generated plan".to_string()),
                questions,
            }),
            ..Default::default()
        }
    }

    pub fn with_challenges(count: usize) -> Self {
        let challenges = (0..count)
            .map(|i| DebugChallenge {
                id: format!("chal-{}", i + 1),
                buggy_code: format!("print(values[{}])", i + 10),
                description: format!("Challenge {} crashes on an index error.", i + 1),
                error_output: Some("IndexError: list index out of range".to_string()),
            })
            .collect();
        MockContent {
            challenges: Some(challenges),
            ..Default::default()
        }
    }

    pub fn failing() -> Self {
        MockContent {
            fail: true,
            ..Default::default()
        }
    }

    pub fn verifying(mut self, outcome: VerifyOutcome) -> Self {
        self.verify = Some(outcome);
        self
    }

    /// Park the next verify call until the returned handle is notified.
    pub fn hold_verify(&self) -> Arc<Notify> {
        let notify = Arc::new(Notify::new());
        *self.verify_hold.lock().unwrap() = Some(notify.clone());
        notify
    }
}

#[async_trait]
impl ContentApi for MockContent {
    async fn fetch_exercise(&self, _topic: &str) -> Result<ExercisePayload, ServiceError> {
        if self.fail {
            return Err(ServiceError::ContentFetchFailure(
                "content service unreachable".to_string(),
            ));
        }
        self.exercise
            .clone()
            .ok_or_else(|| ServiceError::ContentFetchFailure("no content configured".to_string()))
    }

    async fn fetch_debug_challenges(
        &self,
        _topic: &str,
        count: u32,
    ) -> Result<Vec<DebugChallenge>, ServiceError> {
        if self.fail {
            return Err(ServiceError::ContentFetchFailure(
                "debug-challenge service unreachable".to_string(),
            ));
        }
        let challenges = self.challenges.clone().ok_or_else(|| {
            ServiceError::ContentFetchFailure("no challenges configured".to_string())
        })?;
        Ok(challenges.into_iter().take(count as usize).collect())
    }

    async fn verify_explanation(
        &self,
        _challenge_id: &str,
        _explanation: &str,
    ) -> Result<VerifyOutcome, ServiceError> {
        let gate = self.verify_hold.lock().unwrap().take();
        if let Some(notify) = gate {
            notify.notified().await;
        }
        if self.fail {
            return Err(ServiceError::ContentFetchFailure(
                "verify endpoint unreachable".to_string(),
            ));
        }
        self.verify
            .clone()
            .ok_or_else(|| ServiceError::ContentFetchFailure("no verify configured".to_string()))
    }
}
