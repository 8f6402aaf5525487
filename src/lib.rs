//! # Photo Benchmark Library
//!
//! A micro-benchmark harness measuring how allocation size, vectorization,
//! thread-level parallelism, core affinity and a bounded producer/consumer
//! queue affect throughput and memory footprint when repeatedly processing
//! synthetic "photo" buffers.
//!
//! ## Architecture Overview
//!
//! - `workload`: the unit of work (allocate, transform, release) and the
//!   [`Workload`] trait strategies drive
//! - `simd`: runtime-detected vector kernels behind the vectorized transform
//! - `strategy`: Sequential, Parallel-For, Affinity-Pinned and Queue-Pipeline
//! - `harness`: reclaim, snapshot, time, snapshot, diff
//! - `host`: process-wide controls (affinity, reclamation, memory readings)
//! - `alloc_tracking`: counting global allocator feeding the memory readings
//! - `benchmark`, `cli`, `results`: the scenario driver and its output
//!
//! ## Usage Example
//!
//! ```rust,no_run
//! use photo_bench::{
//!     ExecutionStrategy, MeasurementHarness, PhotoWorkload, SystemHost, Transform,
//! };
//!
//! fn main() -> photo_bench::error::Result<()> {
//!     let host = SystemHost::new();
//!     let harness = MeasurementHarness::new(&host);
//!     let workload = PhotoWorkload::new(1_000_000, Transform::Vectorized, 42);
//!
//!     let (result, _) =
//!         harness.measure_strategy(ExecutionStrategy::ParallelFor, &workload, 3000, 8)?;
//!     println!("{}", result);
//!     Ok(())
//! }
//! ```

pub mod alloc_tracking;

/// Scenario definitions, configuration and the runner that executes them.
pub mod benchmark;

/// Command-line interface
///
/// Argument parsing with clap. Every flag has a default, so running the
/// binary without arguments executes the full scenario suite.
pub mod cli;

pub mod error;
pub mod harness;
pub mod host;
pub mod logging;
pub mod metrics;

/// Summary table, system information and the JSON report.
pub mod results;

pub mod simd;
pub mod strategy;
pub mod utils;
pub mod workload;

pub use benchmark::{BenchmarkConfig, BenchmarkRunner, Scenario, ScenarioOutcome};
pub use cli::{Args, ScenarioKind};
pub use error::{BenchError, TaskFailure};
pub use harness::MeasurementHarness;
pub use host::{CoreSet, HostCapability, SimulatedHost, SystemHost};
pub use metrics::{BenchmarkResult, CollectionCounts};
pub use results::{ResultsManager, ScenarioReport};
pub use strategy::{ExecutionStrategy, PipelineStats, RunReport};
pub use workload::{PhotoWorkload, Transform, Workload, WorkloadUnit};

/// The current version of the benchmark, recorded in every report.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Default configuration values
pub mod defaults {
    /// Bytes per photo buffer in the large-buffer scenarios.
    pub const UNIT_SIZE: usize = 1_000_000;

    /// Bytes per buffer in the small-buffer scenario, just below
    /// [`LARGE_OBJECT_THRESHOLD`].
    pub const SMALL_UNIT_SIZE: usize = 80_000;

    /// Iterations (units processed) per scenario.
    pub const ITERATIONS: usize = 3000;

    /// Bounded queue capacity of the pipeline scenario.
    pub const QUEUE_CAPACITY: usize = crate::strategy::DEFAULT_QUEUE_CAPACITY;

    /// Size at which an allocation counts as a large object.
    pub const LARGE_OBJECT_THRESHOLD: usize = 85_000;

    /// Seed for the random fill of small buffers.
    pub const SEED: u64 = 42;

    /// Upper bound for `--workers`.
    pub const MAX_WORKERS: usize = 1024;

    /// Upper bound for `--unit-size` (1 GiB).
    pub const MAX_UNIT_SIZE: usize = 1024 * 1024 * 1024;
}
