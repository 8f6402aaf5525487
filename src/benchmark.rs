//! # Benchmark Engine Module
//!
//! Turns the validated configuration into the fixed scenario list and runs
//! each scenario through the [`MeasurementHarness`].
//!
//! ## Scenario Suite
//!
//! | order | scenario              | strategy        | transform  | unit size        |
//! |-------|-----------------------|-----------------|------------|------------------|
//! | 1     | Small Sequential      | Sequential      | scalar     | small unit size  |
//! | 2     | Sequential Scalar     | Sequential      | scalar     | unit size        |
//! | 3     | Sequential Vectorized | Sequential      | vectorized | unit size        |
//! | 4     | Parallel-For          | Parallel-For    | scalar     | unit size        |
//! | 5     | Affinity-Pinned       | Affinity-Pinned | scalar     | unit size        |
//! | 6     | Queue-Pipeline        | Queue-Pipeline  | scalar     | unit size        |
//!
//! The small-buffer scenario sits just below the large-object class and the
//! rest above it, so the tier counts of the two groups differ.
//!
//! ## Failure Handling
//!
//! A scenario whose host lacks a capability (core pinning) is reported as
//! [`ScenarioOutcome::Skipped`]. Every other failure is returned to the caller,
//! which decides whether to continue.

use crate::{
    cli::{Args, ScenarioKind},
    error::BenchError,
    harness::MeasurementHarness,
    host::HostCapability,
    metrics::BenchmarkResult,
    strategy::{ExecutionStrategy, RunReport},
    utils,
    workload::{PhotoWorkload, Transform, Workload},
};
use anyhow::Result;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Single source of truth for printing a scenario's parameters.
struct ScenarioDisplay<'a> {
    scenario: &'a Scenario,
    workers: usize,
}

impl<'a> std::fmt::Display for ScenarioDisplay<'a> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(
            f,
            "-----------------------------------------------------------------"
        )?;
        writeln!(f, "Starting Scenario: {}", self.scenario.name)?;
        writeln!(f, "  Strategy:           {}", self.scenario.strategy)?;
        writeln!(f, "  Transform:          {}", self.scenario.transform)?;
        writeln!(
            f,
            "  Unit Size:          {} bytes ({})",
            self.scenario.unit_size,
            utils::format_bytes(self.scenario.unit_size)
        )?;
        writeln!(f, "  Iterations:         {}", self.scenario.iterations)?;
        if self.scenario.strategy != ExecutionStrategy::Sequential {
            writeln!(f, "  Workers:            {}", self.workers)?;
        }
        write!(
            f,
            "-----------------------------------------------------------------"
        )
    }
}

/// Validated configuration for a benchmark run
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BenchmarkConfig {
    /// Scenarios to run, already expanded and in the fixed order
    pub scenarios: Vec<ScenarioKind>,

    /// Buffer size for the large-buffer scenarios
    pub unit_size: usize,

    /// Buffer size for the small-buffer scenario
    pub small_unit_size: usize,

    /// Units processed per scenario
    pub iterations: usize,

    /// Pool size of Parallel-For and Affinity-Pinned, consumer count of
    /// Queue-Pipeline
    pub workers: usize,

    /// Core for Affinity-Pinned; `None` picks the first allowed core
    pub pin_core: Option<usize>,

    pub queue_capacity: usize,
    pub seed: u64,
    pub continue_on_error: bool,
}

impl Default for BenchmarkConfig {
    fn default() -> Self {
        Self {
            scenarios: ScenarioKind::ORDER.to_vec(),
            unit_size: crate::defaults::UNIT_SIZE,
            small_unit_size: crate::defaults::SMALL_UNIT_SIZE,
            iterations: crate::defaults::ITERATIONS,
            workers: utils::get_cpu_cores(),
            pin_core: None,
            queue_capacity: crate::defaults::QUEUE_CAPACITY,
            seed: crate::defaults::SEED,
            continue_on_error: false,
        }
    }
}

impl BenchmarkConfig {
    /// Create benchmark configuration from CLI arguments
    ///
    /// ## Parameters
    /// - `args`: Parsed command-line arguments
    ///
    /// ## Returns
    /// - `Ok(BenchmarkConfig)`: Valid configuration ready for use
    /// - `Err(anyhow::Error)`: Configuration validation failure
    ///
    /// ## Validation
    /// - Both unit sizes are non-zero and at most 1 GiB
    /// - Worker count is between 1 and 1024 (defaults to the core count)
    /// - Queue capacity is at least 1
    ///
    /// Zero iterations is valid; every scenario then completes immediately.
    pub fn from_args(args: &Args) -> Result<Self> {
        utils::validate_unit_size(args.unit_size)?;
        utils::validate_unit_size(args.small_unit_size)?;
        utils::validate_iterations(args.iterations)?;
        let workers = args.workers.unwrap_or_else(utils::get_cpu_cores);
        utils::validate_concurrency(workers)?;
        utils::validate_queue_capacity(args.queue_capacity)?;

        if args.small_unit_size >= crate::defaults::LARGE_OBJECT_THRESHOLD {
            warn!(
                "Small unit size {} is not below the large-object class ({} bytes)",
                args.small_unit_size,
                crate::defaults::LARGE_OBJECT_THRESHOLD
            );
        }

        Ok(Self {
            scenarios: ScenarioKind::expand_all(args.scenarios.clone()),
            unit_size: args.unit_size,
            small_unit_size: args.small_unit_size,
            iterations: args.iterations,
            workers,
            pin_core: args.pin_core,
            queue_capacity: args.queue_capacity,
            seed: args.seed,
            continue_on_error: args.continue_on_error,
        })
    }
}

/// One named benchmark invocation.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Scenario {
    pub kind: ScenarioKind,
    pub name: String,
    pub strategy: ExecutionStrategy,
    pub transform: Transform,
    pub unit_size: usize,
    pub iterations: usize,
}

impl Scenario {
    pub fn workload(&self, seed: u64) -> PhotoWorkload {
        PhotoWorkload::new(self.unit_size, self.transform, seed)
    }
}

/// What happened to a scenario that did not fail.
#[derive(Clone, Debug)]
pub enum ScenarioOutcome {
    Completed {
        scenario: Scenario,
        result: BenchmarkResult,
        report: RunReport,
    },
    /// The host lacks a capability the scenario needs.
    Skipped { scenario: Scenario, reason: String },
}

impl ScenarioOutcome {
    pub fn scenario(&self) -> &Scenario {
        match self {
            ScenarioOutcome::Completed { scenario, .. } => scenario,
            ScenarioOutcome::Skipped { scenario, .. } => scenario,
        }
    }

    pub fn result(&self) -> Option<&BenchmarkResult> {
        match self {
            ScenarioOutcome::Completed { result, .. } => Some(result),
            ScenarioOutcome::Skipped { .. } => None,
        }
    }
}

/// Runs scenarios against a host.
///
/// The runner owns the host handle; every strategy run and every measurement
/// goes through it, so the same runner works with [`crate::SystemHost`] and
/// [`crate::SimulatedHost`].
pub struct BenchmarkRunner {
    config: BenchmarkConfig,
    host: Arc<dyn HostCapability>,
}

impl BenchmarkRunner {
    pub fn new(config: BenchmarkConfig, host: Arc<dyn HostCapability>) -> Self {
        Self { config, host }
    }

    pub fn config(&self) -> &BenchmarkConfig {
        &self.config
    }

    pub fn host(&self) -> &dyn HostCapability {
        self.host.as_ref()
    }

    /// Core used by Affinity-Pinned: the configured one, else the first core
    /// the process may currently run on, else core 0.
    pub fn pin_core(&self) -> usize {
        if let Some(core) = self.config.pin_core {
            return core;
        }
        match self.host.current_affinity() {
            Ok(cores) => cores.first().unwrap_or(0),
            Err(e) => {
                debug!("Could not read affinity, pinning to core 0: {}", e);
                0
            }
        }
    }

    /// Builds the scenarios selected in the configuration, in the fixed order.
    pub fn scenarios(&self) -> Vec<Scenario> {
        let config = &self.config;
        config
            .scenarios
            .iter()
            .filter(|kind| **kind != ScenarioKind::All)
            .map(|&kind| {
                let (strategy, transform, unit_size) = match kind {
                    ScenarioKind::SmallSequential => (
                        ExecutionStrategy::Sequential,
                        Transform::Scalar,
                        config.small_unit_size,
                    ),
                    ScenarioKind::SequentialScalar => (
                        ExecutionStrategy::Sequential,
                        Transform::Scalar,
                        config.unit_size,
                    ),
                    ScenarioKind::SequentialVectorized => (
                        ExecutionStrategy::Sequential,
                        Transform::Vectorized,
                        config.unit_size,
                    ),
                    ScenarioKind::ParallelFor => (
                        ExecutionStrategy::ParallelFor,
                        Transform::Scalar,
                        config.unit_size,
                    ),
                    ScenarioKind::AffinityPinned => (
                        ExecutionStrategy::AffinityPinned {
                            core: self.pin_core(),
                        },
                        Transform::Scalar,
                        config.unit_size,
                    ),
                    // `All` is filtered out above.
                    ScenarioKind::QueuePipeline | ScenarioKind::All => (
                        ExecutionStrategy::QueuePipeline {
                            capacity: config.queue_capacity,
                        },
                        Transform::Scalar,
                        config.unit_size,
                    ),
                };
                Scenario {
                    kind,
                    name: format!("{} ({})", kind, utils::format_bytes(unit_size)),
                    strategy,
                    transform,
                    unit_size,
                    iterations: config.iterations,
                }
            })
            .collect()
    }

    /// Wraps an arbitrary run with the measurement protocol.
    pub fn measure<F>(&self, run: F) -> crate::error::Result<BenchmarkResult>
    where
        F: FnOnce() -> crate::error::Result<RunReport>,
    {
        MeasurementHarness::new(self.host()).measure(run)
    }

    pub fn run_sequential(
        &self,
        workload: &dyn Workload,
        iterations: usize,
    ) -> crate::error::Result<BenchmarkResult> {
        self.run_strategy(ExecutionStrategy::Sequential, workload, iterations)
    }

    pub fn run_parallel_for(
        &self,
        workload: &dyn Workload,
        iterations: usize,
    ) -> crate::error::Result<BenchmarkResult> {
        self.run_strategy(ExecutionStrategy::ParallelFor, workload, iterations)
    }

    pub fn run_affinity_pinned(
        &self,
        workload: &dyn Workload,
        iterations: usize,
    ) -> crate::error::Result<BenchmarkResult> {
        let core = self.pin_core();
        self.run_strategy(ExecutionStrategy::AffinityPinned { core }, workload, iterations)
    }

    pub fn run_queue_pipeline(
        &self,
        workload: &dyn Workload,
        iterations: usize,
    ) -> crate::error::Result<BenchmarkResult> {
        let capacity = self.config.queue_capacity;
        self.run_strategy(
            ExecutionStrategy::QueuePipeline { capacity },
            workload,
            iterations,
        )
    }

    fn run_strategy(
        &self,
        strategy: ExecutionStrategy,
        workload: &dyn Workload,
        iterations: usize,
    ) -> crate::error::Result<BenchmarkResult> {
        MeasurementHarness::new(self.host())
            .measure_strategy(strategy, workload, iterations, self.config.workers)
            .map(|(result, _)| result)
    }

    /// Runs one scenario.
    ///
    /// ## Returns
    /// - `Ok(Completed)`: the measured result
    /// - `Ok(Skipped)`: the host cannot run this scenario
    /// - `Err(BenchError)`: the run failed; affinity is already restored
    pub fn run_scenario(&self, scenario: &Scenario) -> crate::error::Result<ScenarioOutcome> {
        info!(
            "{}",
            ScenarioDisplay {
                scenario,
                workers: self.config.workers,
            }
        );

        if scenario.strategy.requires_affinity() && !self.host.supports_affinity() {
            let reason = format!("host '{}' has no CPU affinity control", self.host.name());
            warn!("Skipping {}: {}", scenario.name, reason);
            return Ok(ScenarioOutcome::Skipped {
                scenario: scenario.clone(),
                reason,
            });
        }

        let workload = scenario.workload(self.config.seed);
        let harness = MeasurementHarness::new(self.host());
        match harness.measure_strategy(
            scenario.strategy,
            &workload,
            scenario.iterations,
            self.config.workers,
        ) {
            Ok((result, report)) => {
                info!("{}: {}", scenario.name, result);
                Ok(ScenarioOutcome::Completed {
                    scenario: scenario.clone(),
                    result,
                    report,
                })
            }
            Err(BenchError::UnsupportedCapability(reason)) => {
                warn!("Skipping {}: {}", scenario.name, reason);
                Ok(ScenarioOutcome::Skipped {
                    scenario: scenario.clone(),
                    reason,
                })
            }
            Err(e) => Err(e),
        }
    }

    /// Runs every configured scenario in order, handing each outcome to
    /// `on_outcome` as soon as it is known.
    ///
    /// Stops at the first failure unless `continue_on_error` is set, in which
    /// case failures are logged and the count of failed scenarios returned.
    pub fn run_all<F>(&self, mut on_outcome: F) -> Result<usize>
    where
        F: FnMut(&ScenarioOutcome) -> Result<()>,
    {
        let mut failed = 0;
        for scenario in self.scenarios() {
            match self.run_scenario(&scenario) {
                Ok(outcome) => on_outcome(&outcome)?,
                Err(e) => {
                    if !self.config.continue_on_error {
                        return Err(anyhow::Error::new(e)
                            .context(format!("scenario '{}' failed", scenario.name)));
                    }
                    tracing::error!("Scenario {} failed: {}", scenario.name, e);
                    failed += 1;
                }
            }
        }
        Ok(failed)
    }
}
