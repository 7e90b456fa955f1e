use thiserror::Error;

/// Failures of the execution engine itself, as opposed to failures of the
/// learner's code (those are data, recorded per test case).
#[derive(Debug, Error)]
pub enum EngineError {
    /// The interpreter capability could not be acquired. Fatal for the
    /// session; the user must explicitly re-trigger, there is no auto-retry.
    #[error("execution engine unavailable: {0}")]
    Unavailable(String),

    /// An execution is already in flight on this engine. Requests are
    /// rejected, never queued.
    #[error("an execution is already in flight")]
    Busy,
}

/// Failures talking to the external collaborator services.
#[derive(Debug, Error)]
pub enum ServiceError {
    /// The orchestration service could not be reached. Non-fatal: the pass
    /// result stays displayed and the orchestration step is skipped.
    #[error("orchestration service unreachable: {0}")]
    ReportUnreachable(String),

    /// Exercise or challenge content could not be fetched.
    #[error("failed to fetch exercise content: {0}")]
    ContentFetchFailure(String),
}

/// Failures surfaced by the session orchestrator.
#[derive(Debug, Error)]
pub enum SessionError {
    #[error("a run is already in flight for this session")]
    RunInFlight,

    #[error("operation '{operation}' is not valid in state {state}")]
    InvalidTransition {
        state: String,
        operation: &'static str,
    },

    #[error("session not found")]
    NotFound,

    #[error("phase {0} does not exist")]
    PhaseOutOfRange(usize),

    #[error(transparent)]
    Engine(#[from] EngineError),

    #[error(transparent)]
    Service(#[from] ServiceError),
}
