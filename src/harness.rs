//! # Measurement Harness
//!
//! Wraps one strategy run with the measurement protocol:
//!
//! 1. force a full reclamation pass on the host
//! 2. snapshot memory usage and per-tier collection counts
//! 3. start the monotonic timer, run, stop the timer
//! 4. read memory usage again *without* reclaiming
//! 5. emit a [`BenchmarkResult`] with the deltas
//!
//! The reclaim-before/live-read-after asymmetry is part of the measurement:
//! garbage the run leaves behind shows up in the delta.
//!
//! A failed run is re-raised unchanged and produces no result.

use crate::error::Result;
use crate::host::HostCapability;
use crate::metrics::{BenchmarkResult, MemorySnapshot};
use crate::strategy::{self, ExecutionStrategy, RunReport, StrategyContext};
use crate::workload::Workload;
use std::time::Instant;
use tracing::{debug, warn};

pub struct MeasurementHarness<'h> {
    host: &'h dyn HostCapability,
}

impl<'h> MeasurementHarness<'h> {
    pub fn new(host: &'h dyn HostCapability) -> Self {
        Self { host }
    }

    fn snapshot(&self) -> MemorySnapshot {
        MemorySnapshot {
            memory_bytes: self.host.current_memory_usage(),
            collections: self.host.collection_event_counts(),
        }
    }

    /// Measures an arbitrary run closure.
    ///
    /// ## Returns
    ///
    /// The result, with `units_processed` taken from the closure's report.
    /// Any error from the closure is returned as is.
    pub fn measure<F>(&self, run: F) -> Result<BenchmarkResult>
    where
        F: FnOnce() -> Result<RunReport>,
    {
        self.host.force_reclaim();
        let before = self.snapshot();

        let start = Instant::now();
        let report = run()?;
        let elapsed = start.elapsed();

        let after = self.snapshot();
        let delta = after.memory_delta(&before);
        let collections = after.collections.since(&before.collections);

        debug!(
            "Measured {} units in {:?} (memory {} -> {} bytes)",
            report.units_processed, elapsed, before.memory_bytes, after.memory_bytes
        );
        if let Some(stats) = &report.pipeline {
            debug!(
                "Pipeline: produced {}, consumed {}, peak depth {}/{}",
                stats.produced, stats.consumed, stats.peak_depth, stats.capacity
            );
        }

        Ok(BenchmarkResult::new(
            elapsed,
            delta,
            report.units_processed,
            collections,
        ))
    }

    /// Measures `iterations` units of `workload` under `strategy`.
    pub fn measure_strategy(
        &self,
        strategy: ExecutionStrategy,
        workload: &dyn Workload,
        iterations: usize,
        workers: usize,
    ) -> Result<(BenchmarkResult, RunReport)> {
        let ctx = StrategyContext::for_host(self.host).with_workers(workers);
        let mut captured = RunReport::default();
        let result = self.measure(|| {
            let report = strategy::execute(strategy, ctx, workload, iterations)?;
            captured = report.clone();
            Ok(report)
        });
        if let Err(e) = &result {
            if !e.is_unsupported() {
                warn!("{} run failed: {}", strategy, e);
            }
        }
        Ok((result?, captured))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::BenchError;
    use crate::host::{CoreSet, SimulatedHost};
    use crate::metrics::CollectionCounts;
    use crate::strategy::test_support::CountingWorkload;
    use std::time::Duration;

    #[test]
    fn test_measure_empty_run() {
        let host = SimulatedHost::new(2);
        host.allocate(4096);
        let harness = MeasurementHarness::new(&host);

        let result = harness.measure(|| Ok(RunReport::processed(0))).unwrap();
        assert!(result.elapsed < Duration::from_millis(50));
        assert_eq!(result.memory_delta_bytes, 0);
        assert_eq!(result.units_processed, 0);
        assert!(result.collections.is_none());
        assert_eq!(host.state().reclaim_calls, 1);
    }

    #[test]
    fn test_reclaims_before_but_not_after() {
        let host = SimulatedHost::new(2);
        // Stale garbage from an earlier run is reclaimed before the baseline.
        host.leave_garbage(10_000);
        let harness = MeasurementHarness::new(&host);

        let result = harness
            .measure(|| {
                host.allocate(1_000);
                host.leave_garbage(3_000);
                Ok(RunReport::processed(1))
            })
            .unwrap();

        assert_eq!(result.memory_delta_bytes, 4_000);
        assert_eq!(host.state().reclaim_calls, 1);
        assert_eq!(host.state().garbage_bytes, 3_000);
    }

    #[test]
    fn test_negative_memory_delta() {
        let host = SimulatedHost::new(1);
        host.allocate(8_000);
        let harness = MeasurementHarness::new(&host);
        let result = harness
            .measure(|| {
                host.free(2_000);
                Ok(RunReport::processed(1))
            })
            .unwrap();
        assert_eq!(result.memory_delta_bytes, -2_000);
    }

    #[test]
    fn test_collection_deltas() {
        let host = SimulatedHost::new(1);
        host.record_collections(100, 10, 1);
        let harness = MeasurementHarness::new(&host);
        let result = harness
            .measure(|| {
                host.record_collections(5, 0, 2);
                Ok(RunReport::processed(3))
            })
            .unwrap();
        assert_eq!(result.collections, Some(CollectionCounts::new(5, 0, 2)));
        assert_eq!(result.units_processed, 3);
    }

    #[test]
    fn test_failure_is_reraised() {
        let host = SimulatedHost::new(1);
        let harness = MeasurementHarness::new(&host);
        let err = harness
            .measure(|| Err(BenchError::ResourceExhaustion { requested: 42 }))
            .unwrap_err();
        assert!(matches!(err, BenchError::ResourceExhaustion { requested: 42 }));
    }

    #[test]
    fn test_measure_strategy_pipeline_report() {
        let host = SimulatedHost::new(4);
        let harness = MeasurementHarness::new(&host);
        let workload = CountingWorkload::new(300);
        let (result, report) = harness
            .measure_strategy(
                ExecutionStrategy::QueuePipeline { capacity: 10 },
                &workload,
                300,
                4,
            )
            .unwrap();
        assert_eq!(result.units_processed, 300);
        assert_eq!(report.pipeline.unwrap().consumed, 300);
        workload.assert_exactly_once();
    }

    #[test]
    fn test_measure_strategy_unsupported_affinity() {
        let host = SimulatedHost::new(2).without_affinity();
        let harness = MeasurementHarness::new(&host);
        let workload = CountingWorkload::new(10);
        let err = harness
            .measure_strategy(
                ExecutionStrategy::AffinityPinned { core: 0 },
                &workload,
                10,
                2,
            )
            .unwrap_err();
        assert!(err.is_unsupported());
        assert_eq!(host.current_affinity().unwrap(), CoreSet::first_n(2));
    }
}
