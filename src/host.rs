//! # Host Capabilities
//!
//! Everything process-wide that the measurement core touches goes through
//! [`HostCapability`]: core affinity, forced reclamation, memory usage and
//! collection-event counters. Strategies and the harness receive the host as
//! a parameter, never reach for global state directly.
//!
//! Two implementations are provided:
//!
//! - [`SystemHost`]: the real process. Affinity via `sched_setaffinity` on
//!   Linux (unsupported elsewhere), reclamation via `malloc_trim` on glibc,
//!   memory from the tracking allocator when installed, otherwise the
//!   resident set size.
//! - [`SimulatedHost`]: an in-memory host whose readings are set by the
//!   caller, for tests and dry runs.

use crate::alloc_tracking;
use crate::error::{BenchError, Result};
use crate::metrics::CollectionCounts;
use parking_lot::Mutex;
use std::fmt;
use tracing::debug;

/// Sorted, de-duplicated set of core indices a process may run on.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct CoreSet(Vec<usize>);

impl CoreSet {
    pub fn new(cores: impl IntoIterator<Item = usize>) -> Self {
        let mut cores: Vec<usize> = cores.into_iter().collect();
        cores.sort_unstable();
        cores.dedup();
        Self(cores)
    }

    pub fn single(core: usize) -> Self {
        Self(vec![core])
    }

    /// Cores `0..count`.
    pub fn first_n(count: usize) -> Self {
        Self((0..count).collect())
    }

    pub fn contains(&self, core: usize) -> bool {
        self.0.binary_search(&core).is_ok()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn first(&self) -> Option<usize> {
        self.0.first().copied()
    }

    pub fn iter(&self) -> impl Iterator<Item = usize> + '_ {
        self.0.iter().copied()
    }
}

impl fmt::Display for CoreSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let cores: Vec<String> = self.0.iter().map(|c| c.to_string()).collect();
        write!(f, "{{{}}}", cores.join(","))
    }
}

/// Process-wide controls and readings used by strategies and the harness.
pub trait HostCapability: Send + Sync {
    /// Short identifier used in logs.
    fn name(&self) -> &'static str;

    /// Whether [`set_single_core_affinity`](Self::set_single_core_affinity)
    /// can work on this host at all.
    fn supports_affinity(&self) -> bool;

    fn current_affinity(&self) -> Result<CoreSet>;

    /// Restricts the process to `core` and returns the set it had before.
    ///
    /// Fails with [`BenchError::UnsupportedCapability`] when the host has no
    /// affinity control.
    fn set_single_core_affinity(&self, core: usize) -> Result<CoreSet>;

    fn restore_affinity(&self, previous: &CoreSet) -> Result<()>;

    /// Full synchronous reclamation pass.
    fn force_reclaim(&self);

    /// Current memory usage in bytes, read without reclaiming first.
    fn current_memory_usage(&self) -> u64;

    /// Cumulative collection events per tier.
    fn collection_event_counts(&self) -> CollectionCounts;

    fn available_cores(&self) -> usize;
}

/// The running process.
#[derive(Debug, Default)]
pub struct SystemHost;

impl SystemHost {
    pub fn new() -> Self {
        Self
    }
}

#[cfg(target_os = "linux")]
mod linux {
    use super::CoreSet;
    use crate::error::{BenchError, Result};
    use nix::sched::{sched_getaffinity, sched_setaffinity, CpuSet};
    use nix::unistd::Pid;

    pub(super) fn get() -> Result<CoreSet> {
        let set = sched_getaffinity(Pid::from_raw(0))
            .map_err(|e| BenchError::Host(format!("sched_getaffinity failed: {}", e)))?;
        Ok(CoreSet::new(
            (0..CpuSet::count()).filter(|&core| set.is_set(core).unwrap_or(false)),
        ))
    }

    pub(super) fn set(cores: &CoreSet) -> Result<()> {
        let mut set = CpuSet::new();
        for core in cores.iter() {
            set.set(core).map_err(|e| {
                BenchError::Host(format!(
                    "core {} exceeds the affinity mask capacity ({}): {}",
                    core,
                    CpuSet::count(),
                    e
                ))
            })?;
        }
        sched_setaffinity(Pid::from_raw(0), &set).map_err(|e| {
            BenchError::Host(format!("sched_setaffinity to {} failed: {}", cores, e))
        })
    }
}

/// Resident set size from `/proc/self/statm`, when available.
fn resident_set_bytes() -> Option<u64> {
    let statm = std::fs::read_to_string("/proc/self/statm").ok()?;
    let pages: u64 = statm.split_whitespace().nth(1)?.parse().ok()?;
    Some(pages * page_size())
}

fn page_size() -> u64 {
    #[cfg(unix)]
    {
        // SAFETY: sysconf has no memory-safety preconditions.
        let size = unsafe { libc::sysconf(libc::_SC_PAGESIZE) };
        if size > 0 {
            return size as u64;
        }
    }
    4096
}

impl HostCapability for SystemHost {
    fn name(&self) -> &'static str {
        "system"
    }

    fn supports_affinity(&self) -> bool {
        cfg!(target_os = "linux")
    }

    fn current_affinity(&self) -> Result<CoreSet> {
        #[cfg(target_os = "linux")]
        {
            linux::get()
        }
        #[cfg(not(target_os = "linux"))]
        {
            Err(BenchError::UnsupportedCapability(format!(
                "reading CPU affinity is not supported on {}",
                std::env::consts::OS
            )))
        }
    }

    fn set_single_core_affinity(&self, core: usize) -> Result<CoreSet> {
        #[cfg(target_os = "linux")]
        {
            let previous = linux::get()?;
            linux::set(&CoreSet::single(core))?;
            debug!("Pinned process to core {} (was {})", core, previous);
            Ok(previous)
        }
        #[cfg(not(target_os = "linux"))]
        {
            let _ = core;
            Err(BenchError::UnsupportedCapability(format!(
                "CPU affinity is not supported on {}",
                std::env::consts::OS
            )))
        }
    }

    fn restore_affinity(&self, previous: &CoreSet) -> Result<()> {
        #[cfg(target_os = "linux")]
        {
            linux::set(previous)?;
            debug!("Restored process affinity to {}", previous);
            Ok(())
        }
        #[cfg(not(target_os = "linux"))]
        {
            let _ = previous;
            Err(BenchError::UnsupportedCapability(format!(
                "CPU affinity is not supported on {}",
                std::env::consts::OS
            )))
        }
    }

    fn force_reclaim(&self) {
        #[cfg(all(target_os = "linux", target_env = "gnu"))]
        {
            // SAFETY: malloc_trim only returns free arena memory to the OS.
            let trimmed = unsafe { libc::malloc_trim(0) };
            debug!("malloc_trim released memory: {}", trimmed != 0);
        }
    }

    fn current_memory_usage(&self) -> u64 {
        if alloc_tracking::is_active() {
            alloc_tracking::heap_stats().live_bytes()
        } else {
            resident_set_bytes().unwrap_or(0)
        }
    }

    fn collection_event_counts(&self) -> CollectionCounts {
        alloc_tracking::heap_stats().releases
    }

    fn available_cores(&self) -> usize {
        num_cpus::get()
    }
}

/// Observable state of a [`SimulatedHost`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SimulatedState {
    pub affinity: CoreSet,
    pub cores: usize,
    pub supports_affinity: bool,
    pub memory_bytes: u64,
    /// Bytes that the next reclamation pass frees.
    pub garbage_bytes: u64,
    pub collections: CollectionCounts,
    pub reclaim_calls: usize,
    /// Every core passed to `set_single_core_affinity`, in order.
    pub pin_history: Vec<usize>,
}

/// In-memory host whose readings are driven by the caller.
#[derive(Debug)]
pub struct SimulatedHost {
    state: Mutex<SimulatedState>,
}

impl SimulatedHost {
    pub fn new(cores: usize) -> Self {
        Self {
            state: Mutex::new(SimulatedState {
                affinity: CoreSet::first_n(cores),
                cores,
                supports_affinity: true,
                memory_bytes: 0,
                garbage_bytes: 0,
                collections: CollectionCounts::default(),
                reclaim_calls: 0,
                pin_history: Vec::new(),
            }),
        }
    }

    /// A host on which pinning is reported as unsupported.
    pub fn without_affinity(self) -> Self {
        self.state.lock().supports_affinity = false;
        self
    }

    pub fn state(&self) -> SimulatedState {
        self.state.lock().clone()
    }

    /// Live memory grows by `bytes`.
    pub fn allocate(&self, bytes: u64) {
        self.state.lock().memory_bytes += bytes;
    }

    /// Live memory that stays counted until the next reclamation pass.
    pub fn leave_garbage(&self, bytes: u64) {
        let mut state = self.state.lock();
        state.memory_bytes += bytes;
        state.garbage_bytes += bytes;
    }

    pub fn free(&self, bytes: u64) {
        let mut state = self.state.lock();
        state.memory_bytes = state.memory_bytes.saturating_sub(bytes);
    }

    pub fn record_collections(&self, gen0: u64, gen1: u64, gen2: u64) {
        let mut state = self.state.lock();
        state.collections.gen0 += gen0;
        state.collections.gen1 += gen1;
        state.collections.gen2 += gen2;
    }
}

impl HostCapability for SimulatedHost {
    fn name(&self) -> &'static str {
        "simulated"
    }

    fn supports_affinity(&self) -> bool {
        self.state.lock().supports_affinity
    }

    fn current_affinity(&self) -> Result<CoreSet> {
        Ok(self.state.lock().affinity.clone())
    }

    fn set_single_core_affinity(&self, core: usize) -> Result<CoreSet> {
        let mut state = self.state.lock();
        if !state.supports_affinity {
            return Err(BenchError::UnsupportedCapability(
                "simulated host has no affinity control".to_string(),
            ));
        }
        if core >= state.cores {
            return Err(BenchError::Host(format!(
                "core {} is outside the simulated {} cores",
                core, state.cores
            )));
        }
        state.pin_history.push(core);
        Ok(std::mem::replace(&mut state.affinity, CoreSet::single(core)))
    }

    fn restore_affinity(&self, previous: &CoreSet) -> Result<()> {
        let mut state = self.state.lock();
        if !state.supports_affinity {
            return Err(BenchError::UnsupportedCapability(
                "simulated host has no affinity control".to_string(),
            ));
        }
        state.affinity = previous.clone();
        Ok(())
    }

    fn force_reclaim(&self) {
        let mut state = self.state.lock();
        state.reclaim_calls += 1;
        state.memory_bytes = state.memory_bytes.saturating_sub(state.garbage_bytes);
        state.garbage_bytes = 0;
    }

    fn current_memory_usage(&self) -> u64 {
        self.state.lock().memory_bytes
    }

    fn collection_event_counts(&self) -> CollectionCounts {
        self.state.lock().collections
    }

    fn available_cores(&self) -> usize {
        self.state.lock().cores
    }
}
