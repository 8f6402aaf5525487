//! Affinity-Pinned strategy: the Parallel-For workload with the process
//! restricted to a single core for the duration of the run.
//!
//! Pinning happens before the worker pool is built, so every worker thread
//! inherits the single-core mask. The previous mask is restored on every exit
//! path: explicitly on normal completion and failure, and by
//! [`AffinityGuard`]'s `Drop` if the run unwinds.

use super::{parallel, RunReport};
use crate::error::{BenchError, Result};
use crate::host::{CoreSet, HostCapability};
use crate::workload::Workload;
use tracing::{error, warn};

/// Holds a single-core pin and undoes it when restored or dropped.
pub struct AffinityGuard<'h> {
    host: &'h dyn HostCapability,
    previous: Option<CoreSet>,
}

impl<'h> AffinityGuard<'h> {
    /// Pins the process to `core`, remembering the current mask.
    pub fn pin(host: &'h dyn HostCapability, core: usize) -> Result<Self> {
        let previous = host.set_single_core_affinity(core)?;
        Ok(Self {
            host,
            previous: Some(previous),
        })
    }

    /// Mask in effect before pinning.
    pub fn previous(&self) -> Option<&CoreSet> {
        self.previous.as_ref()
    }

    /// Restores the previous mask, reporting failure to the caller.
    pub fn restore(mut self) -> Result<()> {
        match self.previous.take() {
            Some(previous) => self.host.restore_affinity(&previous),
            None => Ok(()),
        }
    }
}

impl Drop for AffinityGuard<'_> {
    fn drop(&mut self) {
        if let Some(previous) = self.previous.take() {
            if let Err(e) = self.host.restore_affinity(&previous) {
                warn!("Failed to restore affinity to {}: {}", previous, e);
            }
        }
    }
}

pub fn run(
    host: &dyn HostCapability,
    core: usize,
    workload: &dyn Workload,
    iterations: usize,
    workers: usize,
) -> Result<RunReport> {
    if !host.supports_affinity() {
        return Err(BenchError::UnsupportedCapability(format!(
            "host '{}' cannot pin the process to a core",
            host.name()
        )));
    }
    if iterations == 0 {
        return Ok(RunReport::processed(0));
    }

    let guard = AffinityGuard::pin(host, core)?;
    let outcome = parallel::build_pool(workers, "pinned")
        .and_then(|pool| parallel::run_in_pool(&pool, workload, iterations));
    let restored = guard.restore();

    match (outcome, restored) {
        (Ok(report), Ok(())) => Ok(report),
        (Ok(_), Err(restore_err)) => Err(restore_err),
        (Err(run_err), Ok(())) => Err(run_err),
        (Err(run_err), Err(restore_err)) => {
            error!(
                "Affinity restore failed after a failed run: {}",
                restore_err
            );
            Err(run_err)
        }
    }
}
