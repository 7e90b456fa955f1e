use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// One input/expected-output pair for a coding exercise.
/// Immutable once fetched from the content service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TestCase {
    pub input: String,
    pub expected_output: String,
}

/// Outcome of running the learner's source against a single test case.
///
/// Created once per harness run and never mutated afterward; a re-run
/// supersedes the whole set. `id` is the stable 1-based index into the
/// original test-case list.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TestResult {
    pub id: u32,
    pub input: String,
    pub expected: String,
    pub actual: String,
    pub passed: bool,
    pub error: Option<String>,
}

/// Aggregate verdict over one complete harness run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecutionReport {
    pub results: Vec<TestResult>,
    pub pass_count: usize,
    pub total: usize,
}

impl ExecutionReport {
    /// All-pass law: a report with zero cases never counts as passing.
    pub fn all_passed(&self) -> bool {
        self.total > 0 && self.pass_count == self.total
    }
}

/// The four exercise types a learner session can be in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExerciseKind {
    Teach,
    Quiz,
    Code,
    Debug,
}

impl fmt::Display for ExerciseKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExerciseKind::Teach => write!(f, "teach"),
            ExerciseKind::Quiz => write!(f, "quiz"),
            ExerciseKind::Code => write!(f, "code"),
            ExerciseKind::Debug => write!(f, "debug"),
        }
    }
}

/// View names used on the wire by the orchestration service.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ViewKind {
    Code,
    Debugger,
    Quiz,
    Tutor,
}

impl ViewKind {
    /// The exercise type that owns this view.
    pub fn exercise_kind(&self) -> ExerciseKind {
        match self {
            ViewKind::Code => ExerciseKind::Code,
            ViewKind::Debugger => ExerciseKind::Debug,
            ViewKind::Quiz => ExerciseKind::Quiz,
            ViewKind::Tutor => ExerciseKind::Teach,
        }
    }
}

impl fmt::Display for ViewKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ViewKind::Code => write!(f, "code"),
            ViewKind::Debugger => write!(f, "debugger"),
            ViewKind::Quiz => write!(f, "quiz"),
            ViewKind::Tutor => write!(f, "tutor"),
        }
    }
}

/// Lifecycle state of an exercise session.
///
/// Transitions are monotonic within one execution cycle:
/// Ready -> Running -> Evaluated -> (ReportingSuccess -> Redirecting).
/// `FailedToLoad` and `NoMission` are terminal display states.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum SessionStatus {
    Idle,
    Loading,
    Ready,
    Running,
    Evaluated,
    ReportingSuccess,
    Redirecting { view: ViewKind },
    FailedToLoad { message: String },
    NoMission,
}

/// Next-step instruction returned by the orchestration service after a
/// success report. Consumed exactly once by the session controller.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrchestrationAction {
    pub view: ViewKind,
    pub topic: Option<String>,
    pub reply_text: Option<String>,
}

/// One coding exercise as delivered by the content service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Exercise {
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub difficulty: Option<String>,
    #[serde(default)]
    pub starter_code: Option<String>,
    #[serde(default)]
    pub test_cases: Vec<TestCase>,
}

impl Exercise {
    /// Content-service plans occasionally contain empty placeholder phases.
    pub fn is_substantial(&self) -> bool {
        !self.title.trim().is_empty() || !self.description.trim().is_empty()
    }
}

/// One debugging challenge: code with a planted bug, plus the failure it
/// produces. The learner explains the bug in prose.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DebugChallenge {
    pub id: String,
    pub buggy_code: String,
    pub description: String,
    #[serde(default)]
    pub error_output: Option<String>,
}

/// Verdict from the debug-challenge verify endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VerifyOutcome {
    pub is_correct: bool,
    pub feedback: String,
}

/// The live state of one learning task instance.
///
/// Owned exclusively by the session orchestrator and replaced wholesale
/// (never merged) when a new exercise arrives.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExerciseSession {
    pub id: Uuid,
    pub kind: ExerciseKind,
    pub topic: Option<String>,
    pub title: Option<String>,
    pub description: Option<String>,
    pub difficulty: Option<String>,
    pub source_code: String,
    pub test_cases: Vec<TestCase>,
    /// All phases of a multi-phase plan (empty for a single exercise); the
    /// active phase also seeds the session fields directly.
    pub phases: Vec<Exercise>,
    pub phase_index: usize,
    pub challenges: Vec<DebugChallenge>,
    pub challenge_index: usize,
    pub report: Option<ExecutionReport>,
    /// Raw interactive output from the zero-test-case path, or the rendered
    /// pass/fail breakdown after an evaluated run.
    pub console: Option<String>,
    pub seed_message: Option<String>,
    pub feedback: Option<String>,
    pub warning: Option<String>,
    pub fatal: Option<String>,
    pub failed_topics: Vec<String>,
    pub status: SessionStatus,
    pub created_at: DateTime<Utc>,
}

impl ExerciseSession {
    pub fn new(kind: ExerciseKind, topic: Option<String>) -> Self {
        ExerciseSession {
            id: Uuid::new_v4(),
            kind,
            topic,
            title: None,
            description: None,
            difficulty: None,
            source_code: String::new(),
            test_cases: Vec::new(),
            phases: Vec::new(),
            phase_index: 0,
            challenges: Vec::new(),
            challenge_index: 0,
            report: None,
            console: None,
            seed_message: None,
            feedback: None,
            warning: None,
            fatal: None,
            failed_topics: Vec::new(),
            status: SessionStatus::Idle,
            created_at: Utc::now(),
        }
    }

    /// Terminal state for adapters invoked without a topic.
    pub fn no_mission(kind: ExerciseKind) -> Self {
        let mut session = Self::new(kind, None);
        session.status = SessionStatus::NoMission;
        session
    }

    /// Terminal state for content-fetch failures.
    pub fn failed_to_load(kind: ExerciseKind, topic: Option<String>, message: String) -> Self {
        let mut session = Self::new(kind, topic);
        session.status = SessionStatus::FailedToLoad { message };
        session
    }

    /// The debug challenge currently in front of the learner.
    pub fn current_challenge(&self) -> Option<&DebugChallenge> {
        self.challenges.get(self.challenge_index)
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self.status,
            SessionStatus::NoMission
                | SessionStatus::FailedToLoad { .. }
                | SessionStatus::Redirecting { .. }
        )
    }
}
