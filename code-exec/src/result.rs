//! Normalization of engine outcomes into the canonical result shape.

use crate::{
    error::Error,
    types::{ExecutionMetrics, ExecutionOutcome, ExecutionResult, Termination},
};

pub const TIME_LIMIT_MESSAGE: &str = "execution exceeded time limit";
pub const MEMORY_LIMIT_MESSAGE: &str = "execution exceeded memory limit";

const BYTES_PER_MB: f64 = 1024.0 * 1024.0;

pub fn build_result(outcome: ExecutionOutcome) -> ExecutionResult {
    let metrics = ExecutionMetrics {
        execution_time_ms: outcome.elapsed.as_millis() as u64,
        memory_used_mb: megabytes(outcome.peak_memory_bytes),
    };

    let error = match outcome.termination {
        Termination::Completed => outcome.error.map(|e| e.message),
        Termination::TimedOut => Some(TIME_LIMIT_MESSAGE.to_string()),
        Termination::MemoryExceeded => Some(MEMORY_LIMIT_MESSAGE.to_string()),
    };

    ExecutionResult {
        success: error.is_none(),
        output: outcome.stdout,
        error,
        metrics,
    }
}

/// Result for a request that never reached a running engine.
pub fn failure_result(error: &Error) -> ExecutionResult {
    ExecutionResult {
        success: false,
        output: String::new(),
        error: Some(error.to_string()),
        metrics: ExecutionMetrics::default(),
    }
}

fn megabytes(bytes: u64) -> f64 {
    (bytes as f64 / BYTES_PER_MB * 100.0).round() / 100.0
}
