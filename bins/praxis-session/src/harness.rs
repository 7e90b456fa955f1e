//! Test harness.
//!
//! Builds and runs the per-test-case execution plan: one interpreter call
//! per case, each with a preset stdin, a fresh capture buffer, and a fresh
//! execution scope. A per-case fault is recorded as data and never aborts
//! the loop, so a harness run over N cases always yields exactly N results
//! in the original order.

use crate::interpreter::{Interpreter, InterpreterOutcome};
use praxis_common::types::{TestCase, TestResult};
use tracing::debug;

/// What a harness run produced.
///
/// `Console` is the explicit zero-test-case branch: the source ran once in
/// interactive mode and the raw captured output goes straight to the console,
/// bypassing the evaluator. It is not a report with zero cases.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HarnessOutcome {
    Console(String),
    Cases(Vec<TestResult>),
}

pub async fn run_harness(
    interpreter: &dyn Interpreter,
    source: &str,
    cases: &[TestCase],
) -> HarnessOutcome {
    if cases.is_empty() {
        let text = match interpreter.execute(source, "").await {
            InterpreterOutcome::Completed { stdout } => stdout,
            InterpreterOutcome::Faulted { error } => format!("Error: {}", error),
        };
        return HarnessOutcome::Console(text);
    }

    let mut results = Vec::with_capacity(cases.len());

    for (index, case) in cases.iter().enumerate() {
        let id = (index + 1) as u32;
        debug!(test_id = id, "executing test case");

        let result = match interpreter.execute(source, &case.input).await {
            InterpreterOutcome::Completed { stdout } => {
                let actual = stdout.trim().to_string();
                let passed = actual == case.expected_output.trim();
                TestResult {
                    id,
                    input: case.input.clone(),
                    expected: case.expected_output.clone(),
                    actual,
                    passed,
                    error: None,
                }
            }
            InterpreterOutcome::Faulted { error } => TestResult {
                id,
                input: case.input.clone(),
                expected: case.expected_output.clone(),
                actual: String::new(),
                passed: false,
                error: Some(error),
            },
        };

        results.push(result);
    }

    HarnessOutcome::Cases(results)
}
