//! Parallel-For strategy: a rayon pool sized to the core count processes the
//! whole index range and the caller blocks until every task finished.

use super::{run_unit, RunReport};
use crate::error::{BenchError, Result, TaskFailure};
use crate::workload::Workload;
use rayon::prelude::*;
use rayon::{ThreadPool, ThreadPoolBuilder};

/// Builds a pool of `workers` threads named `{label}-worker-{i}`.
///
/// Threads are spawned on the calling thread, so they inherit its current
/// CPU affinity mask.
pub fn build_pool(workers: usize, label: &str) -> Result<ThreadPool> {
    let label = label.to_string();
    ThreadPoolBuilder::new()
        .num_threads(workers)
        .thread_name(move |i| format!("{}-worker-{}", label, i))
        .build()
        .map_err(|e| BenchError::Host(format!("failed to build worker pool: {}", e)))
}

pub fn run(workload: &dyn Workload, iterations: usize, workers: usize) -> Result<RunReport> {
    if iterations == 0 {
        return Ok(RunReport::processed(0));
    }
    let pool = build_pool(workers, "parallel")?;
    run_in_pool(&pool, workload, iterations)
}

/// Runs every index on `pool`. A failing task never cancels its siblings;
/// all failures are reported together once the pool is idle again.
pub fn run_in_pool(
    pool: &ThreadPool,
    workload: &dyn Workload,
    iterations: usize,
) -> Result<RunReport> {
    let failures: Vec<TaskFailure> = pool.install(|| {
        (0..iterations)
            .into_par_iter()
            .filter_map(|index| run_unit(workload, index).err())
            .collect()
    });

    match BenchError::aggregate(failures, iterations) {
        Some(err) => Err(err),
        None => Ok(RunReport::processed(iterations)),
    }
}
