//! Error taxonomy for the measurement core.
//!
//! The driver binary works in `anyhow::Result`; everything below the driver
//! reports through [`BenchError`] so callers can tell a skipped scenario
//! (`UnsupportedCapability`) apart from a real failure.

use std::fmt;
use thiserror::Error;

/// Result alias used throughout the measurement core.
pub type Result<T> = std::result::Result<T, BenchError>;

/// A single failed task inside a parallel strategy run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaskFailure {
    /// Iteration index (or pipeline token) that failed.
    pub index: usize,
    pub message: String,
}

impl fmt::Display for TaskFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "unit {}: {}", self.index, self.message)
    }
}

#[derive(Debug, Error)]
pub enum BenchError {
    /// The host cannot perform the requested control (e.g. core pinning).
    #[error("unsupported capability: {0}")]
    UnsupportedCapability(String),

    /// One or more tasks of a parallel run failed. Reported only after every
    /// sibling task finished.
    #[error("{} of {total} tasks failed (first: {})", .failures.len(), first_failure(.failures))]
    AggregateTaskFailure {
        failures: Vec<TaskFailure>,
        total: usize,
    },

    /// A workload buffer could not be allocated.
    #[error("failed to allocate a workload buffer of {requested} bytes")]
    ResourceExhaustion { requested: usize },

    /// The host rejected a query or control request.
    #[error("host error: {0}")]
    Host(String),

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
}

fn first_failure(failures: &[TaskFailure]) -> String {
    failures
        .first()
        .map(|f| f.to_string())
        .unwrap_or_else(|| "none".to_string())
}

impl BenchError {
    /// Whether this error means "skip the scenario" rather than "fail the run".
    pub fn is_unsupported(&self) -> bool {
        matches!(self, BenchError::UnsupportedCapability(_))
    }

    /// Builds an aggregate failure, or `None` when nothing failed.
    pub fn aggregate(mut failures: Vec<TaskFailure>, total: usize) -> Option<Self> {
        if failures.is_empty() {
            return None;
        }
        failures.sort_by_key(|f| f.index);
        Some(BenchError::AggregateTaskFailure { failures, total })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_aggregate_empty_is_none() {
        assert!(BenchError::aggregate(Vec::new(), 10).is_none());
    }

    #[test]
    fn test_aggregate_sorts_and_formats() {
        let err = BenchError::aggregate(
            vec![
                TaskFailure {
                    index: 7,
                    message: "boom".to_string(),
                },
                TaskFailure {
                    index: 2,
                    message: "bang".to_string(),
                },
            ],
            10,
        )
        .unwrap();

        match &err {
            BenchError::AggregateTaskFailure { failures, total } => {
                assert_eq!(*total, 10);
                assert_eq!(failures[0].index, 2);
                assert_eq!(failures[1].index, 7);
            }
            other => panic!("unexpected error: {:?}", other),
        }
        assert_eq!(err.to_string(), "2 of 10 tasks failed (first: unit 2: bang)");
    }

    #[test]
    fn test_is_unsupported() {
        assert!(BenchError::UnsupportedCapability("pinning".into()).is_unsupported());
        assert!(!BenchError::ResourceExhaustion { requested: 1 }.is_unsupported());
    }
}
