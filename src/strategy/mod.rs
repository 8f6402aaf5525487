//! # Execution Strategies
//!
//! A strategy decides how the `N` iterations of a scenario are scheduled.
//! Each iteration is one call to [`Workload::process`]; every strategy
//! guarantees that each index in `[0, N)` is processed exactly once.
//!
//! | strategy        | scheduling                                          |
//! |-----------------|-----------------------------------------------------|
//! | Sequential      | invoking thread, strict index order                 |
//! | Parallel-For    | rayon pool sized to the core count, barrier join    |
//! | Affinity-Pinned | Parallel-For with the process pinned to one core    |
//! | Queue-Pipeline  | one producer, `cores` consumers, bounded queue      |
//!
//! `N == 0` completes immediately with an empty report on every strategy.
//! Parallel strategies let every task run even when siblings fail, then
//! report all failures together as [`BenchError::AggregateTaskFailure`].

use crate::error::{BenchError, Result, TaskFailure};
use crate::host::HostCapability;
use crate::workload::Workload;
use serde::{Deserialize, Serialize};
use std::panic::{catch_unwind, AssertUnwindSafe};
use tracing::debug;

pub mod parallel;
pub mod pinned;
pub mod pipeline;
pub mod sequential;

pub use pinned::AffinityGuard;
pub use pipeline::{PipelineItem, PipelineStats};

/// Capacity of the pipeline queue unless configured otherwise.
pub const DEFAULT_QUEUE_CAPACITY: usize = 100;

/// How a scenario's iterations are scheduled.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum ExecutionStrategy {
    Sequential,
    ParallelFor,
    AffinityPinned { core: usize },
    QueuePipeline { capacity: usize },
}

impl std::fmt::Display for ExecutionStrategy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ExecutionStrategy::Sequential => write!(f, "Sequential"),
            ExecutionStrategy::ParallelFor => write!(f, "Parallel-For"),
            ExecutionStrategy::AffinityPinned { core } => {
                write!(f, "Affinity-Pinned (core {})", core)
            }
            ExecutionStrategy::QueuePipeline { capacity } => {
                write!(f, "Queue-Pipeline (capacity {})", capacity)
            }
        }
    }
}

impl ExecutionStrategy {
    /// Whether running this strategy needs host affinity control.
    pub fn requires_affinity(&self) -> bool {
        matches!(self, ExecutionStrategy::AffinityPinned { .. })
    }
}

/// What a strategy run did, independent of timing.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunReport {
    pub units_processed: usize,
    pub pipeline: Option<PipelineStats>,
}

impl RunReport {
    pub fn processed(units: usize) -> Self {
        Self {
            units_processed: units,
            pipeline: None,
        }
    }
}

/// Host and sizing shared by all strategy invocations of a runner.
#[derive(Clone, Copy)]
pub struct StrategyContext<'a> {
    pub host: &'a dyn HostCapability,
    /// Worker pool size for Parallel-For and Affinity-Pinned, consumer count
    /// for Queue-Pipeline.
    pub workers: usize,
}

impl<'a> StrategyContext<'a> {
    /// Context whose pool matches the host's core count.
    pub fn for_host(host: &'a dyn HostCapability) -> Self {
        Self {
            host,
            workers: host.available_cores().max(1),
        }
    }

    pub fn with_workers(mut self, workers: usize) -> Self {
        self.workers = workers;
        self
    }
}

/// Runs `iterations` units of `workload` under `strategy`.
pub fn execute(
    strategy: ExecutionStrategy,
    ctx: StrategyContext<'_>,
    workload: &dyn Workload,
    iterations: usize,
) -> Result<RunReport> {
    if ctx.workers == 0 {
        return Err(BenchError::InvalidConfig(
            "worker count must be at least 1".to_string(),
        ));
    }
    debug!(
        "Executing {} with {} iterations on {} workers",
        strategy, iterations, ctx.workers
    );
    match strategy {
        ExecutionStrategy::Sequential => sequential::run(workload, iterations),
        ExecutionStrategy::ParallelFor => parallel::run(workload, iterations, ctx.workers),
        ExecutionStrategy::AffinityPinned { core } => {
            pinned::run(ctx.host, core, workload, iterations, ctx.workers)
        }
        ExecutionStrategy::QueuePipeline { capacity } => {
            pipeline::run(workload, iterations, ctx.workers, capacity)
        }
    }
}

/// Processes one index inside a parallel task, turning both errors and
/// panics into a [`TaskFailure`] so siblings keep running.
pub(crate) fn run_unit(workload: &dyn Workload, index: usize) -> std::result::Result<(), TaskFailure> {
    match catch_unwind(AssertUnwindSafe(|| workload.process(index))) {
        Ok(Ok(())) => Ok(()),
        Ok(Err(e)) => Err(TaskFailure {
            index,
            message: e.to_string(),
        }),
        Err(payload) => Err(TaskFailure {
            index,
            message: panic_message(payload.as_ref()),
        }),
    }
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        format!("panicked: {}", s)
    } else if let Some(s) = payload.downcast_ref::<String>() {
        format!("panicked: {}", s)
    } else {
        "panicked".to_string()
    }
}

/// Shared test workloads for the strategy tests.
#[cfg(test)]
pub(crate) mod test_support {
    use crate::error::{BenchError, Result};
    use crate::workload::{PhotoWorkload, Transform, Workload};
    use std::collections::HashSet;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Wraps a real photo workload and counts how often each index ran.
    pub struct CountingWorkload {
        inner: PhotoWorkload,
        hits: Vec<AtomicUsize>,
        fail_on: HashSet<usize>,
        panic_on: HashSet<usize>,
    }

    impl CountingWorkload {
        pub fn new(iterations: usize) -> Self {
            Self {
                inner: PhotoWorkload::new(256, Transform::Vectorized, 1),
                hits: (0..iterations).map(|_| AtomicUsize::new(0)).collect(),
                fail_on: HashSet::new(),
                panic_on: HashSet::new(),
            }
        }

        pub fn failing_on(mut self, indices: &[usize]) -> Self {
            self.fail_on.extend(indices.iter().copied());
            self
        }

        pub fn panicking_on(mut self, indices: &[usize]) -> Self {
            self.panic_on.extend(indices.iter().copied());
            self
        }

        pub fn hits(&self) -> Vec<usize> {
            self.hits.iter().map(|h| h.load(Ordering::SeqCst)).collect()
        }

        pub fn total(&self) -> usize {
            self.hits().iter().sum()
        }

        pub fn assert_exactly_once(&self) {
            for (index, count) in self.hits().into_iter().enumerate() {
                assert_eq!(count, 1, "index {} processed {} times", index, count);
            }
        }
    }

    impl Workload for CountingWorkload {
        fn process(&self, index: usize) -> Result<()> {
            self.hits[index].fetch_add(1, Ordering::SeqCst);
            if self.panic_on.contains(&index) {
                panic!("unit {} exploded", index);
            }
            if self.fail_on.contains(&index) {
                return Err(BenchError::ResourceExhaustion { requested: index });
            }
            self.inner.process(index)
        }

        fn unit_size(&self) -> usize {
            self.inner.unit_size()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::test_support::CountingWorkload;
    use super::*;
    use crate::host::{CoreSet, SimulatedHost};

    fn all_strategies() -> Vec<ExecutionStrategy> {
        vec![
            ExecutionStrategy::Sequential,
            ExecutionStrategy::ParallelFor,
            ExecutionStrategy::AffinityPinned { core: 1 },
            ExecutionStrategy::QueuePipeline {
                capacity: DEFAULT_QUEUE_CAPACITY,
            },
        ]
    }

    #[test]
    fn test_every_strategy_processes_each_unit_once() {
        let host = SimulatedHost::new(4);
        let ctx = StrategyContext::for_host(&host);
        for strategy in all_strategies() {
            for iterations in [0usize, 1, 7, 250] {
                let workload = CountingWorkload::new(iterations);
                let report = execute(strategy, ctx, &workload, iterations).unwrap();
                assert_eq!(report.units_processed, iterations, "{}", strategy);
                workload.assert_exactly_once();
            }
        }
        assert_eq!(host.current_affinity().unwrap(), CoreSet::first_n(4));
    }

    #[test]
    fn test_zero_workers_rejected() {
        let host = SimulatedHost::new(2);
        let ctx = StrategyContext::for_host(&host).with_workers(0);
        let workload = CountingWorkload::new(1);
        assert!(matches!(
            execute(ExecutionStrategy::Sequential, ctx, &workload, 1),
            Err(BenchError::InvalidConfig(_))
        ));
        assert_eq!(workload.total(), 0);
    }

    #[test]
    fn test_run_unit_converts_panics() {
        let workload = CountingWorkload::new(2).panicking_on(&[1]);
        assert!(run_unit(&workload, 0).is_ok());
        let failure = run_unit(&workload, 1).unwrap_err();
        assert_eq!(failure.index, 1);
        assert_eq!(failure.message, "panicked: unit 1 exploded");
    }

    #[test]
    fn test_strategy_display() {
        assert_eq!(ExecutionStrategy::Sequential.to_string(), "Sequential");
        assert_eq!(ExecutionStrategy::ParallelFor.to_string(), "Parallel-For");
        assert_eq!(
            ExecutionStrategy::AffinityPinned { core: 0 }.to_string(),
            "Affinity-Pinned (core 0)"
        );
        assert!(ExecutionStrategy::AffinityPinned { core: 0 }.requires_affinity());
        assert!(!ExecutionStrategy::ParallelFor.requires_affinity());
    }
}
