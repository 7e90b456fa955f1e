//! Execution engine.
//!
//! Wraps the embedded interpreter capability behind a process-wide
//! acquire-once lifecycle. The engine knows how to execute; it does not know
//! scoring rules, and it never evaluates correctness. Raw outcomes flow to
//! the harness and evaluator.
//!
//! The engine is an explicitly owned resource: it is constructed in `main`
//! and injected into every session orchestrator, never reached through
//! ambient global state.

use crate::harness::{self, HarnessOutcome};
use crate::interpreter::{Interpreter, InterpreterOutcome, InterpreterProvider};
use praxis_common::errors::EngineError;
use praxis_common::types::TestCase;
use std::sync::Arc;
use tokio::sync::{Mutex, OnceCell};
use tracing::info;

pub struct ExecutionEngine {
    provider: Arc<dyn InterpreterProvider>,
    handle: OnceCell<Arc<dyn Interpreter>>,
    /// Mutual exclusion between `run` and `run_with_harness`: only one
    /// execution may be in flight; a second caller is rejected, not queued.
    gate: Mutex<()>,
}

impl ExecutionEngine {
    pub fn new(provider: Arc<dyn InterpreterProvider>) -> Self {
        ExecutionEngine {
            provider,
            handle: OnceCell::new(),
            gate: Mutex::new(()),
        }
    }

    /// Acquire the interpreter capability. Idempotent: the first successful
    /// call caches the handle for the process lifetime, later calls are
    /// no-ops. On failure nothing is cached, so an explicit user re-trigger
    /// attempts acquisition again; the engine itself never retries.
    pub async fn initialize(&self) -> Result<(), EngineError> {
        let fresh = !self.handle.initialized();
        self.handle
            .get_or_try_init(|| async { self.provider.acquire().await })
            .await?;
        if fresh {
            info!("execution engine initialized");
        }
        Ok(())
    }

    pub fn is_initialized(&self) -> bool {
        self.handle.initialized()
    }

    fn interpreter(&self) -> Result<&Arc<dyn Interpreter>, EngineError> {
        self.handle
            .get()
            .ok_or_else(|| EngineError::Unavailable("engine not initialized".to_string()))
    }

    /// Execute source once in interactive mode with a fresh output buffer.
    /// An unhandled exception inside the source comes back as a
    /// `Faulted` value, never as an `Err`.
    pub async fn run(&self, source: &str) -> Result<InterpreterOutcome, EngineError> {
        let _gate = self.gate.try_lock().map_err(|_| EngineError::Busy)?;
        let interpreter = self.interpreter()?;
        Ok(interpreter.execute(source, "").await)
    }

    /// Execute source against a set of test cases through the harness.
    pub async fn run_with_harness(
        &self,
        source: &str,
        cases: &[TestCase],
    ) -> Result<HarnessOutcome, EngineError> {
        let _gate = self.gate.try_lock().map_err(|_| EngineError::Busy)?;
        let interpreter = self.interpreter()?;
        Ok(harness::run_harness(interpreter.as_ref(), source, cases).await)
    }

    /// Release the interpreter capability.
    pub async fn shutdown(&self) {
        if let Some(interpreter) = self.handle.get() {
            interpreter.shutdown().await;
            info!("execution engine shut down");
        }
    }
}
