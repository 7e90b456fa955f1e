//! Session orchestrator.
//!
//! Owns the live `ExerciseSession` and drives its lifecycle: bootstrap,
//! run/evaluate cycles, quiz completion, debug explanations, success
//! reporting, and the delayed hand-off to the next exercise. The session is
//! replaced wholesale on hand-off, never merged; an epoch counter makes any
//! still-pending redirect from the previous exercise a no-op.

use crate::adapters::ExerciseController;
use crate::clients::ContentApi;
use crate::engine::ExecutionEngine;
use crate::evaluator;
use crate::harness::HarnessOutcome;
use crate::reporter::SuccessReporter;
use praxis_common::errors::SessionError;
use praxis_common::types::{ExerciseKind, ExerciseSession, OrchestrationAction, SessionStatus};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

/// Cheap-to-clone handle; clones share the same live session. Scheduled
/// redirect tasks hold one of these, so the session outlives any single
/// request handler.
#[derive(Clone)]
pub struct SessionOrchestrator {
    inner: Arc<Inner>,
}

struct Inner {
    engine: Arc<ExecutionEngine>,
    reporter: SuccessReporter,
    controller: Arc<ExerciseController>,
    content: Arc<dyn ContentApi>,
    redirect_delay: Duration,
    state: Mutex<ExerciseSession>,
    /// Bumped on every session replacement; a redirect scheduled under an
    /// older epoch is discarded when it fires.
    epoch: AtomicU64,
    /// One run in flight at a time; a second submit is rejected, not queued.
    run_flag: AtomicBool,
}

fn status_name(status: &SessionStatus) -> String {
    match status {
        SessionStatus::Idle => "idle",
        SessionStatus::Loading => "loading",
        SessionStatus::Ready => "ready",
        SessionStatus::Running => "running",
        SessionStatus::Evaluated => "evaluated",
        SessionStatus::ReportingSuccess => "reporting_success",
        SessionStatus::Redirecting { .. } => "redirecting",
        SessionStatus::FailedToLoad { .. } => "failed_to_load",
        SessionStatus::NoMission => "no_mission",
    }
    .to_string()
}

impl SessionOrchestrator {
    pub fn new(
        engine: Arc<ExecutionEngine>,
        reporter: SuccessReporter,
        controller: Arc<ExerciseController>,
        content: Arc<dyn ContentApi>,
        redirect_delay: Duration,
        initial: ExerciseSession,
    ) -> Self {
        SessionOrchestrator {
            inner: Arc::new(Inner {
                engine,
                reporter,
                controller,
                content,
                redirect_delay,
                state: Mutex::new(initial),
                epoch: AtomicU64::new(0),
                run_flag: AtomicBool::new(false),
            }),
        }
    }

    pub async fn snapshot(&self) -> ExerciseSession {
        self.inner.state.lock().await.clone()
    }

    /// Bring an Idle session to Ready. Code and debug sessions acquire the
    /// execution engine first; an acquisition failure drops the session back
    /// to Idle with a fatal message, so an explicit re-trigger can try again.
    pub async fn bootstrap(&self) {
        let kind = {
            let mut session = self.inner.state.lock().await;
            if session.status != SessionStatus::Idle || session.fatal.is_some() {
                return;
            }
            session.status = SessionStatus::Loading;
            session.kind
        };

        if matches!(kind, ExerciseKind::Code | ExerciseKind::Debug) {
            if let Err(e) = self.inner.engine.initialize().await {
                warn!(error = %e, "engine acquisition failed during bootstrap");
                let mut session = self.inner.state.lock().await;
                session.status = SessionStatus::Idle;
                session.fatal = Some(e.to_string());
                return;
            }
        }

        let mut session = self.inner.state.lock().await;
        if session.status == SessionStatus::Loading {
            session.status = SessionStatus::Ready;
        }
    }

    /// Clear a failed bootstrap and try again.
    pub async fn retry_bootstrap(&self) {
        {
            let mut session = self.inner.state.lock().await;
            session.fatal = None;
        }
        self.bootstrap().await;
    }

    /// Run the learner's source through the harness and evaluate. On a
    /// fully-passing report this also reports the success and schedules the
    /// hand-off to whatever the orchestration service directs.
    pub async fn run(&self, source: &str) -> Result<ExerciseSession, SessionError> {
        if self
            .inner
            .run_flag
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            return Err(SessionError::RunInFlight);
        }
        let result = self.run_inner(source).await;
        self.inner.run_flag.store(false, Ordering::SeqCst);
        result
    }

    async fn run_inner(&self, source: &str) -> Result<ExerciseSession, SessionError> {
        let cases = {
            let mut session = self.inner.state.lock().await;
            match session.status {
                SessionStatus::Ready | SessionStatus::Evaluated => {}
                ref other => {
                    return Err(SessionError::InvalidTransition {
                        state: status_name(other),
                        operation: "run",
                    })
                }
            }
            session.status = SessionStatus::Running;
            session.source_code = source.to_string();
            session.warning = None;
            session.feedback = None;
            session.test_cases.clone()
        };

        info!(cases = cases.len(), "executing submission");

        // The session lock is released while the sandbox runs; the run flag
        // keeps this cycle exclusive.
        let outcome = match self.inner.engine.run_with_harness(source, &cases).await {
            Ok(outcome) => outcome,
            Err(e) => {
                let mut session = self.inner.state.lock().await;
                session.status = SessionStatus::Ready;
                return Err(SessionError::Engine(e));
            }
        };

        let (all_passed, scheduled, failed_topics) = {
            let mut session = self.inner.state.lock().await;
            let passed = match outcome {
                HarnessOutcome::Console(text) => {
                    // Interactive branch: raw output, no report, no scoring
                    session.report = None;
                    session.console = Some(text);
                    session.status = SessionStatus::Evaluated;
                    false
                }
                HarnessOutcome::Cases(results) => {
                    let report = evaluator::evaluate(&results);
                    info!(passed = report.pass_count, total = report.total, "submission evaluated");
                    session.console = Some(evaluator::render_report(&report));
                    let passed = report.all_passed();
                    session.report = Some(report);
                    session.status = if passed {
                        SessionStatus::ReportingSuccess
                    } else {
                        SessionStatus::Evaluated
                    };
                    passed
                }
            };
            // Epoch read under the same lock that entered ReportingSuccess;
            // a replacement bumps the epoch under this lock, so a reply
            // resolved against an older epoch is provably stale
            let scheduled = self.inner.epoch.load(Ordering::SeqCst);
            let failed_topics = session.failed_topics.clone();
            (passed, scheduled, failed_topics)
        };

        if all_passed {
            self.report_and_redirect(scheduled, failed_topics).await;
        }

        Ok(self.snapshot().await)
    }

    /// Record an externally graded quiz result. Only a clean pass reaches
    /// this operation; `failed_topics` carries the prerequisite topics the
    /// learner stumbled on along the way.
    pub async fn complete_quiz(
        &self,
        failed_topics: Vec<String>,
    ) -> Result<ExerciseSession, SessionError> {
        // Same exclusion as `run`: a duplicate completion signal while one
        // is being reported would fire a second success report
        if self
            .inner
            .run_flag
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            return Err(SessionError::RunInFlight);
        }
        let result = self.complete_quiz_inner(failed_topics).await;
        self.inner.run_flag.store(false, Ordering::SeqCst);
        result
    }

    async fn complete_quiz_inner(
        &self,
        failed_topics: Vec<String>,
    ) -> Result<ExerciseSession, SessionError> {
        let scheduled = {
            let mut session = self.inner.state.lock().await;
            if session.kind != ExerciseKind::Quiz || session.is_terminal() {
                return Err(SessionError::InvalidTransition {
                    state: status_name(&session.status),
                    operation: "complete_quiz",
                });
            }
            session.failed_topics = failed_topics.clone();
            session.status = SessionStatus::ReportingSuccess;
            self.inner.epoch.load(Ordering::SeqCst)
        };
        self.report_and_redirect(scheduled, failed_topics).await;
        Ok(self.snapshot().await)
    }

    /// Submit a prose explanation for the current debug challenge. A correct
    /// explanation advances to the next challenge; clearing the last one
    /// reports success and hands off.
    pub async fn submit_explanation(
        &self,
        explanation: &str,
    ) -> Result<ExerciseSession, SessionError> {
        // Same exclusion as `run`: two concurrent explanations for the last
        // challenge would both clear it and both report success
        if self
            .inner
            .run_flag
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            return Err(SessionError::RunInFlight);
        }
        let result = self.submit_explanation_inner(explanation).await;
        self.inner.run_flag.store(false, Ordering::SeqCst);
        result
    }

    async fn submit_explanation_inner(
        &self,
        explanation: &str,
    ) -> Result<ExerciseSession, SessionError> {
        let challenge_id = {
            let session = self.inner.state.lock().await;
            if session.kind != ExerciseKind::Debug || session.is_terminal() {
                return Err(SessionError::InvalidTransition {
                    state: status_name(&session.status),
                    operation: "submit_explanation",
                });
            }
            match session.current_challenge() {
                Some(challenge) => challenge.id.clone(),
                None => {
                    return Err(SessionError::InvalidTransition {
                        state: status_name(&session.status),
                        operation: "submit_explanation",
                    })
                }
            }
        };

        let verdict = self
            .inner
            .content
            .verify_explanation(&challenge_id, explanation)
            .await?;

        let report_epoch = {
            let mut session = self.inner.state.lock().await;
            session.feedback = Some(verdict.feedback.clone());
            if !verdict.is_correct {
                None
            } else {
                session.challenge_index += 1;
                match session.challenges.get(session.challenge_index).cloned() {
                    Some(next) => {
                        info!(challenge = %next.id, "advancing to next debug challenge");
                        session.source_code = next.buggy_code;
                        session.description = Some(next.description);
                        None
                    }
                    None => {
                        session.status = SessionStatus::ReportingSuccess;
                        Some(self.inner.epoch.load(Ordering::SeqCst))
                    }
                }
            }
        };

        if let Some(scheduled) = report_epoch {
            self.report_and_redirect(scheduled, Vec::new()).await;
        }
        Ok(self.snapshot().await)
    }

    /// Switch the active phase of a multi-phase coding plan. The editor
    /// content is shared across phases; only the exercise fields and test
    /// cases swap, and any previous evaluation is cleared.
    pub async fn select_phase(&self, index: usize) -> Result<ExerciseSession, SessionError> {
        let mut session = self.inner.state.lock().await;
        if session.kind != ExerciseKind::Code {
            return Err(SessionError::InvalidTransition {
                state: status_name(&session.status),
                operation: "select_phase",
            });
        }
        match session.status {
            SessionStatus::Ready | SessionStatus::Evaluated => {}
            ref other => {
                return Err(SessionError::InvalidTransition {
                    state: status_name(other),
                    operation: "select_phase",
                })
            }
        }
        let phase = session
            .phases
            .get(index)
            .cloned()
            .ok_or(SessionError::PhaseOutOfRange(index))?;

        info!(phase = index, title = %phase.title, "phase selected");
        session.phase_index = index;
        session.title = Some(phase.title);
        session.description = Some(phase.description);
        session.difficulty = phase.difficulty;
        session.test_cases = phase.test_cases;
        session.report = None;
        session.console = None;
        session.status = SessionStatus::Ready;
        Ok(session.clone())
    }

    /// Replace the live session with a fresh one for the given exercise.
    /// Any pending redirect from the previous session becomes stale.
    pub async fn replace(
        &self,
        kind: ExerciseKind,
        topic: Option<&str>,
        seed: Option<&str>,
    ) -> ExerciseSession {
        let replacement = self.inner.controller.build(kind, topic, seed).await;
        {
            let mut session = self.inner.state.lock().await;
            self.inner.epoch.fetch_add(1, Ordering::SeqCst);
            *session = replacement;
            self.inner.run_flag.store(false, Ordering::SeqCst);
        }
        self.bootstrap().await;
        self.snapshot().await
    }

    /// `scheduled` is the epoch captured under the lock that entered
    /// ReportingSuccess; a reply or redirect resolved under any other epoch
    /// belongs to a session that no longer exists and is dropped.
    async fn report_and_redirect(&self, scheduled: u64, failed_topics: Vec<String>) {
        match self.inner.reporter.report(&failed_topics).await {
            Ok(action) => {
                {
                    let mut session = self.inner.state.lock().await;
                    // A reply that arrives after the learner moved on must
                    // not be applied to the replacement session
                    if self.inner.epoch.load(Ordering::SeqCst) != scheduled {
                        debug!("orchestration reply arrived for a superseded session");
                        return;
                    }
                    session.status = SessionStatus::Redirecting { view: action.view };
                    session.feedback = action.reply_text.clone();
                }
                let this = self.clone();
                tokio::spawn(async move {
                    tokio::time::sleep(this.inner.redirect_delay).await;
                    this.complete_redirect(scheduled, action).await;
                });
            }
            Err(e) => {
                // Degraded outcome: the learner keeps their local result,
                // only the hand-off is lost
                warn!(error = %e, "success report failed");
                let mut session = self.inner.state.lock().await;
                if self.inner.epoch.load(Ordering::SeqCst) != scheduled {
                    return;
                }
                session.status = SessionStatus::Evaluated;
                session.warning = Some(format!("progress was not recorded: {}", e));
            }
        }
    }

    async fn complete_redirect(&self, scheduled: u64, action: OrchestrationAction) {
        if self.inner.epoch.load(Ordering::SeqCst) != scheduled {
            debug!("redirect superseded before firing");
            return;
        }
        let replacement = self.inner.controller.apply(&action).await;
        {
            let mut session = self.inner.state.lock().await;
            if self.inner.epoch.load(Ordering::SeqCst) != scheduled {
                debug!("redirect superseded during hand-off");
                return;
            }
            self.inner.epoch.fetch_add(1, Ordering::SeqCst);
            info!(view = %action.view, "session handed off");
            *session = replacement;
            self.inner.run_flag.store(false, Ordering::SeqCst);
        }
        self.bootstrap().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::interpreter::InterpreterOutcome;
    use crate::test_support::{MockContent, MockOrchestration, StubInterpreter, StubProvider};
    use praxis_common::types::{Exercise, TestCase, VerifyOutcome, ViewKind};

    fn code_session(cases: &[(&str, &str)]) -> ExerciseSession {
        let mut session = ExerciseSession::new(ExerciseKind::Code, Some("loops".to_string()));
        session.test_cases = cases
            .iter()
            .map(|(input, expected)| TestCase {
                input: input.to_string(),
                expected_output: expected.to_string(),
            })
            .collect();
        session
    }

    fn debug_session(challenges: usize) -> ExerciseSession {
        let mut session = ExerciseSession::new(ExerciseKind::Debug, Some("indexing".to_string()));
        session.challenges = (0..challenges)
            .map(|i| praxis_common::types::DebugChallenge {
                id: format!("chal-{}", i + 1),
                buggy_code: format!("bug {}", i + 1),
                description: format!("challenge {}", i + 1),
                error_output: None,
            })
            .collect();
        if let Some(first) = session.challenges.first() {
            session.source_code = first.buggy_code.clone();
        }
        session
    }

    struct Fixture {
        orchestrator: SessionOrchestrator,
        interpreter: StubInterpreter,
        orchestration: Arc<MockOrchestration>,
    }

    fn fixture(
        interpreter: StubInterpreter,
        orchestration: MockOrchestration,
        content: MockContent,
        redirect_delay_ms: u64,
        initial: ExerciseSession,
    ) -> Fixture {
        let orchestration = Arc::new(orchestration);
        let content: Arc<dyn ContentApi> = Arc::new(content);
        let engine = Arc::new(ExecutionEngine::new(Arc::new(StubProvider::new(
            interpreter.clone(),
        ))));
        let orchestrator = SessionOrchestrator::new(
            engine,
            SuccessReporter::new(orchestration.clone()),
            Arc::new(ExerciseController::new(content.clone(), 5)),
            content,
            Duration::from_millis(redirect_delay_ms),
            initial,
        );
        Fixture {
            orchestrator,
            interpreter,
            orchestration,
        }
    }

    #[tokio::test]
    async fn test_bootstrap_brings_code_session_ready() {
        let f = fixture(
            StubInterpreter::completing("ok"),
            MockOrchestration::replying_tutor("done"),
            MockContent::default(),
            1000,
            code_session(&[("1", "1")]),
        );

        f.orchestrator.bootstrap().await;
        assert_eq!(f.orchestrator.snapshot().await.status, SessionStatus::Ready);
    }

    #[tokio::test]
    async fn test_run_before_bootstrap_is_invalid() {
        let f = fixture(
            StubInterpreter::completing("ok"),
            MockOrchestration::replying_tutor("done"),
            MockContent::default(),
            1000,
            code_session(&[("1", "1")]),
        );

        let err = f.orchestrator.run("print(1)").await.unwrap_err();
        assert!(matches!(
            err,
            SessionError::InvalidTransition { operation: "run", .. }
        ));
    }

    #[tokio::test]
    async fn test_partial_pass_stays_evaluated_without_report() {
        let f = fixture(
            StubInterpreter::scripted(vec![
                InterpreterOutcome::Completed { stdout: "1\n".into() },
                InterpreterOutcome::Completed { stdout: "wrong\n".into() },
            ]),
            MockOrchestration::replying_tutor("never"),
            MockContent::default(),
            1000,
            code_session(&[("1", "1"), ("2", "2")]),
        );
        f.orchestrator.bootstrap().await;

        let session = f.orchestrator.run("print(input())").await.unwrap();

        assert_eq!(session.status, SessionStatus::Evaluated);
        let report = session.report.unwrap();
        assert_eq!(report.pass_count, 1);
        assert!(session.console.unwrap().starts_with("Result: 1/2 passed"));
        assert!(f.orchestration.calls().is_empty());
    }

    #[tokio::test]
    async fn test_full_pass_reports_once_and_redirects() {
        let f = fixture(
            StubInterpreter::completing("1"),
            MockOrchestration::replying_tutor("Great job!"),
            MockContent::default(),
            1000,
            code_session(&[("1", "1")]),
        );
        f.orchestrator.bootstrap().await;

        let session = f.orchestrator.run("print(1)").await.unwrap();

        // Null action falls back to the tutor view, reply text preserved
        assert_eq!(
            session.status,
            SessionStatus::Redirecting { view: ViewKind::Tutor }
        );
        assert_eq!(session.feedback.as_deref(), Some("Great job!"));
        assert_eq!(f.orchestration.calls().len(), 1);
    }

    #[tokio::test]
    async fn test_zero_cases_is_interactive_console_run() {
        let f = fixture(
            StubInterpreter::completing("Hello, World!\n"),
            MockOrchestration::replying_tutor("never"),
            MockContent::default(),
            1000,
            code_session(&[]),
        );
        f.orchestrator.bootstrap().await;

        let session = f.orchestrator.run("print('Hello, World!')").await.unwrap();

        assert_eq!(session.status, SessionStatus::Evaluated);
        assert_eq!(session.console.as_deref(), Some("Hello, World!\n"));
        assert!(session.report.is_none());
        // Interactive output never counts as success
        assert!(f.orchestration.calls().is_empty());
    }

    #[tokio::test]
    async fn test_second_run_rejected_while_first_in_flight() {
        let f = fixture(
            StubInterpreter::completing("1"),
            MockOrchestration::replying_tutor("done"),
            MockContent::default(),
            1000,
            code_session(&[("1", "1")]),
        );
        f.orchestrator.bootstrap().await;
        let release = f.interpreter.hold();

        let first = {
            let orchestrator = f.orchestrator.clone();
            tokio::spawn(async move { orchestrator.run("print(1)").await })
        };
        tokio::time::sleep(Duration::from_millis(20)).await;

        assert!(matches!(
            f.orchestrator.run("print(2)").await,
            Err(SessionError::RunInFlight)
        ));

        release.notify_one();
        assert!(first.await.unwrap().is_ok());
    }

    #[tokio::test]
    async fn test_unreachable_reporter_degrades_to_evaluated_with_warning() {
        let f = fixture(
            StubInterpreter::completing("1"),
            MockOrchestration::unreachable(),
            MockContent::default(),
            1000,
            code_session(&[("1", "1")]),
        );
        f.orchestrator.bootstrap().await;

        let session = f.orchestrator.run("print(1)").await.unwrap();

        assert_eq!(session.status, SessionStatus::Evaluated);
        assert!(session.report.unwrap().all_passed());
        assert!(session.warning.unwrap().contains("progress was not recorded"));
    }

    #[tokio::test]
    async fn test_redirect_replaces_session_after_delay() {
        let next = Exercise {
            title: "Next exercise".into(),
            description: "Try slicing.".into(),
            difficulty: None,
            starter_code: None,
            test_cases: vec![TestCase {
                input: "".into(),
                expected_output: "ok".into(),
            }],
        };
        let f = fixture(
            StubInterpreter::completing("1"),
            MockOrchestration::replying_with_action("Onward!", ViewKind::Code, Some("slicing")),
            MockContent::with_single(next),
            10,
            code_session(&[("1", "1")]),
        );
        f.orchestrator.bootstrap().await;

        let session = f.orchestrator.run("print(1)").await.unwrap();
        assert_eq!(
            session.status,
            SessionStatus::Redirecting { view: ViewKind::Code }
        );

        tokio::time::sleep(Duration::from_millis(100)).await;

        let replaced = f.orchestrator.snapshot().await;
        assert_eq!(replaced.topic.as_deref(), Some("slicing"));
        assert_eq!(replaced.title.as_deref(), Some("Next exercise"));
        assert_eq!(replaced.status, SessionStatus::Ready);
    }

    #[tokio::test]
    async fn test_stale_redirect_is_discarded() {
        let f = fixture(
            StubInterpreter::completing("1"),
            MockOrchestration::replying_with_action("Onward!", ViewKind::Quiz, Some("loops")),
            MockContent::default(),
            50,
            code_session(&[("1", "1")]),
        );
        f.orchestrator.bootstrap().await;

        f.orchestrator.run("print(1)").await.unwrap();

        // An explicit replacement lands before the redirect delay elapses
        let replaced = f
            .orchestrator
            .replace(ExerciseKind::Teach, None, Some("manual switch"))
            .await;
        assert_eq!(replaced.kind, ExerciseKind::Teach);

        tokio::time::sleep(Duration::from_millis(150)).await;

        // The stale redirect did not overwrite the manual replacement
        let current = f.orchestrator.snapshot().await;
        assert_eq!(current.kind, ExerciseKind::Teach);
        assert_eq!(current.seed_message.as_deref(), Some("manual switch"));
    }

    #[tokio::test]
    async fn test_late_report_reply_is_discarded_after_replacement() {
        let orchestration = MockOrchestration::replying_tutor("late reply");
        let release = orchestration.hold();
        let f = fixture(
            StubInterpreter::completing("1"),
            orchestration,
            MockContent::default(),
            1000,
            code_session(&[("1", "1")]),
        );
        f.orchestrator.bootstrap().await;

        let run = {
            let orchestrator = f.orchestrator.clone();
            tokio::spawn(async move { orchestrator.run("print(1)").await })
        };
        tokio::time::sleep(Duration::from_millis(20)).await;

        // The learner navigates away while the report call is still pending
        f.orchestrator
            .replace(ExerciseKind::Teach, None, Some("moved on"))
            .await;

        release.notify_one();
        assert!(run.await.unwrap().is_ok());

        // The reply landed after the replacement and was not applied
        let current = f.orchestrator.snapshot().await;
        assert_eq!(current.kind, ExerciseKind::Teach);
        assert_eq!(current.status, SessionStatus::Ready);
        assert_eq!(current.seed_message.as_deref(), Some("moved on"));
    }

    #[tokio::test]
    async fn test_select_phase_swaps_cases_and_keeps_editor_content() {
        let mut initial = code_session(&[("1", "1")]);
        initial.phases = vec![
            Exercise {
                title: "Phase 1".into(),
                description: "First.".into(),
                difficulty: None,
                starter_code: None,
                test_cases: vec![TestCase {
                    input: "1".into(),
                    expected_output: "1".into(),
                }],
            },
            Exercise {
                title: "Phase 2".into(),
                description: "Second.".into(),
                difficulty: Some("Hard".into()),
                starter_code: None,
                test_cases: vec![TestCase {
                    input: "2".into(),
                    expected_output: "4".into(),
                }],
            },
        ];
        initial.title = Some("Phase 1".into());
        initial.source_code = "work in progress".into();
        let f = fixture(
            StubInterpreter::completing("unused"),
            MockOrchestration::replying_tutor("never"),
            MockContent::default(),
            1000,
            initial,
        );
        f.orchestrator.bootstrap().await;

        let session = f.orchestrator.select_phase(1).await.unwrap();
        assert_eq!(session.phase_index, 1);
        assert_eq!(session.title.as_deref(), Some("Phase 2"));
        assert_eq!(session.test_cases[0].expected_output, "4");
        assert_eq!(session.source_code, "work in progress");
        assert!(session.report.is_none());

        let err = f.orchestrator.select_phase(5).await.unwrap_err();
        assert!(matches!(err, SessionError::PhaseOutOfRange(5)));
    }

    #[tokio::test]
    async fn test_quiz_completion_forwards_failed_topics() {
        let mut initial = ExerciseSession::new(ExerciseKind::Quiz, Some("loops".to_string()));
        initial.status = SessionStatus::Ready;
        let f = fixture(
            StubInterpreter::completing("unused"),
            MockOrchestration::replying_tutor("Quiz done."),
            MockContent::default(),
            1000,
            initial,
        );

        let failed = vec!["slicing".to_string()];
        let session = f.orchestrator.complete_quiz(failed.clone()).await.unwrap();

        assert_eq!(
            session.status,
            SessionStatus::Redirecting { view: ViewKind::Tutor }
        );
        assert_eq!(f.orchestration.calls(), vec![failed]);
    }

    #[tokio::test]
    async fn test_complete_quiz_on_code_session_is_invalid() {
        let f = fixture(
            StubInterpreter::completing("1"),
            MockOrchestration::replying_tutor("never"),
            MockContent::default(),
            1000,
            code_session(&[("1", "1")]),
        );
        f.orchestrator.bootstrap().await;

        let err = f.orchestrator.complete_quiz(vec![]).await.unwrap_err();
        assert!(matches!(
            err,
            SessionError::InvalidTransition {
                operation: "complete_quiz",
                ..
            }
        ));
        assert!(f.orchestration.calls().is_empty());
    }

    #[tokio::test]
    async fn test_incorrect_explanation_keeps_current_challenge() {
        let f = fixture(
            StubInterpreter::completing("unused"),
            MockOrchestration::replying_tutor("never"),
            MockContent::default().verifying(VerifyOutcome {
                is_correct: false,
                feedback: "Not quite: look at the loop bound.".to_string(),
            }),
            1000,
            debug_session(2),
        );
        f.orchestrator.bootstrap().await;

        let session = f.orchestrator.submit_explanation("off by one?").await.unwrap();

        assert_eq!(session.challenge_index, 0);
        assert_eq!(session.source_code, "bug 1");
        assert!(session.feedback.unwrap().starts_with("Not quite"));
        assert!(f.orchestration.calls().is_empty());
    }

    #[tokio::test]
    async fn test_correct_explanation_advances_challenge() {
        let f = fixture(
            StubInterpreter::completing("unused"),
            MockOrchestration::replying_tutor("never"),
            MockContent::default().verifying(VerifyOutcome {
                is_correct: true,
                feedback: "Exactly right.".to_string(),
            }),
            1000,
            debug_session(2),
        );
        f.orchestrator.bootstrap().await;

        let session = f
            .orchestrator
            .submit_explanation("the loop runs one step too far")
            .await
            .unwrap();

        assert_eq!(session.challenge_index, 1);
        assert_eq!(session.source_code, "bug 2");
        assert_eq!(session.status, SessionStatus::Ready);
        assert!(f.orchestration.calls().is_empty());
    }

    #[tokio::test]
    async fn test_concurrent_explanations_report_once() {
        let content = MockContent::default().verifying(VerifyOutcome {
            is_correct: true,
            feedback: "Correct.".to_string(),
        });
        let release = content.hold_verify();
        let f = fixture(
            StubInterpreter::completing("unused"),
            MockOrchestration::replying_tutor("All bugs squashed."),
            content,
            1000,
            debug_session(1),
        );
        f.orchestrator.bootstrap().await;

        let first = {
            let orchestrator = f.orchestrator.clone();
            tokio::spawn(async move {
                orchestrator
                    .submit_explanation("the index is off by one")
                    .await
            })
        };
        tokio::time::sleep(Duration::from_millis(20)).await;

        // A duplicate submission while the first is still being verified is
        // rejected instead of racing it into the success path
        assert!(matches!(
            f.orchestrator
                .submit_explanation("the index is off by one")
                .await,
            Err(SessionError::RunInFlight)
        ));

        release.notify_one();
        let session = first.await.unwrap().unwrap();
        assert_eq!(
            session.status,
            SessionStatus::Redirecting { view: ViewKind::Tutor }
        );
        assert_eq!(f.orchestration.calls().len(), 1);
    }

    #[tokio::test]
    async fn test_second_quiz_completion_rejected_while_reporting() {
        let orchestration = MockOrchestration::replying_tutor("Quiz done.");
        let release = orchestration.hold();
        let mut initial = ExerciseSession::new(ExerciseKind::Quiz, Some("loops".to_string()));
        initial.status = SessionStatus::Ready;
        let f = fixture(
            StubInterpreter::completing("unused"),
            orchestration,
            MockContent::default(),
            1000,
            initial,
        );

        let first = {
            let orchestrator = f.orchestrator.clone();
            tokio::spawn(async move { orchestrator.complete_quiz(vec![]).await })
        };
        tokio::time::sleep(Duration::from_millis(20)).await;

        assert!(matches!(
            f.orchestrator.complete_quiz(vec![]).await,
            Err(SessionError::RunInFlight)
        ));

        release.notify_one();
        assert!(first.await.unwrap().is_ok());
        assert_eq!(f.orchestration.calls().len(), 1);
    }

    #[tokio::test]
    async fn test_reply_for_superseded_epoch_is_not_applied() {
        let f = fixture(
            StubInterpreter::completing("1"),
            MockOrchestration::replying_tutor("late"),
            MockContent::default(),
            1000,
            code_session(&[("1", "1")]),
        );
        f.orchestrator.bootstrap().await;

        // The replacement bumps the epoch, so a report scheduled under the
        // old epoch resolves against a session that no longer exists
        f.orchestrator.replace(ExerciseKind::Teach, None, None).await;
        f.orchestrator.report_and_redirect(0, Vec::new()).await;

        let current = f.orchestrator.snapshot().await;
        assert_eq!(current.kind, ExerciseKind::Teach);
        assert_eq!(current.status, SessionStatus::Ready);
        assert!(current.feedback.is_none());
    }

    #[tokio::test]
    async fn test_clearing_last_challenge_reports_success() {
        let f = fixture(
            StubInterpreter::completing("unused"),
            MockOrchestration::replying_tutor("All bugs squashed."),
            MockContent::default().verifying(VerifyOutcome {
                is_correct: true,
                feedback: "Correct.".to_string(),
            }),
            1000,
            debug_session(1),
        );
        f.orchestrator.bootstrap().await;

        let session = f
            .orchestrator
            .submit_explanation("the index is off by one")
            .await
            .unwrap();

        assert_eq!(
            session.status,
            SessionStatus::Redirecting { view: ViewKind::Tutor }
        );
        assert_eq!(f.orchestration.calls(), vec![Vec::<String>::new()]);
    }

    #[tokio::test]
    async fn test_failed_bootstrap_sets_fatal_and_allows_retry() {
        let engine = Arc::new(ExecutionEngine::new(Arc::new(
            crate::test_support::FailingProvider::default(),
        )));
        let orchestration = Arc::new(MockOrchestration::replying_tutor("never"));
        let content: Arc<dyn ContentApi> = Arc::new(MockContent::default());
        let orchestrator = SessionOrchestrator::new(
            engine,
            SuccessReporter::new(orchestration),
            Arc::new(ExerciseController::new(content.clone(), 5)),
            content,
            Duration::from_millis(1000),
            code_session(&[("1", "1")]),
        );

        orchestrator.bootstrap().await;
        let session = orchestrator.snapshot().await;
        assert_eq!(session.status, SessionStatus::Idle);
        assert!(session.fatal.is_some());

        // Still failing, but the retry clears fatal and attempts again
        orchestrator.retry_bootstrap().await;
        let session = orchestrator.snapshot().await;
        assert_eq!(session.status, SessionStatus::Idle);
        assert!(session.fatal.is_some());

        let err = orchestrator.run("print(1)").await.unwrap_err();
        assert!(matches!(err, SessionError::InvalidTransition { .. }));
    }
}
