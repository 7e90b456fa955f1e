//! Result evaluator.
//!
//! Pure aggregation over a completed harness run. Knows nothing about the
//! sandbox, nothing about sessions, nothing about the wire: test results in,
//! execution report out. Calling it twice on the same input produces the
//! same report.

use praxis_common::types::{ExecutionReport, TestResult};

/// Aggregate a completed harness run into a report.
///
/// `pass_count` is derived entirely from the per-case `passed` flags set by
/// the harness; the evaluator re-derives nothing about execution and does
/// not depend on result order beyond the stable ids already assigned.
pub fn evaluate(results: &[TestResult]) -> ExecutionReport {
    let pass_count = results.iter().filter(|r| r.passed).count();
    ExecutionReport {
        results: results.to_vec(),
        pass_count,
        total: results.len(),
    }
}

/// Render the user-visible console breakdown: the aggregate banner followed
/// by one block per test case.
pub fn render_report(report: &ExecutionReport) -> String {
    let mut out = format!("Result: {}/{} passed\n\n", report.pass_count, report.total);

    for result in &report.results {
        if let Some(error) = &result.error {
            out.push_str(&format!("Test {} error:\n{}\n\n", result.id, error));
        } else if result.passed {
            out.push_str(&format!(
                "Test {} passed\nInput: {}\nExpected: {}\nActual: {}\n\n",
                result.id, result.input, result.expected, result.actual
            ));
        } else {
            out.push_str(&format!(
                "Test {} failed\nInput: {}\nExpected: {}\nActual: {}\n\n",
                result.id, result.input, result.expected, result.actual
            ));
        }
    }

    out.trim_end().to_string()
}
