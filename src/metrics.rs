use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

/// Cumulative per-tier collection events (tier 0 = shortest lived).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CollectionCounts {
    pub gen0: u64,
    pub gen1: u64,
    pub gen2: u64,
}

impl CollectionCounts {
    pub fn new(gen0: u64, gen1: u64, gen2: u64) -> Self {
        Self { gen0, gen1, gen2 }
    }

    /// Per-tier events between `earlier` and `self`.
    pub fn since(&self, earlier: &CollectionCounts) -> CollectionCounts {
        CollectionCounts {
            gen0: self.gen0.saturating_sub(earlier.gen0),
            gen1: self.gen1.saturating_sub(earlier.gen1),
            gen2: self.gen2.saturating_sub(earlier.gen2),
        }
    }

    pub fn is_zero(&self) -> bool {
        self.gen0 == 0 && self.gen1 == 0 && self.gen2 == 0
    }

    pub fn total(&self) -> u64 {
        self.gen0 + self.gen1 + self.gen2
    }
}

impl fmt::Display for CollectionCounts {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "gen0={} gen1={} gen2={}", self.gen0, self.gen1, self.gen2)
    }
}

/// Host memory reading taken by the harness before or after a run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MemorySnapshot {
    pub memory_bytes: u64,
    pub collections: CollectionCounts,
}

impl MemorySnapshot {
    /// Signed memory change from `earlier` to `self`.
    pub fn memory_delta(&self, earlier: &MemorySnapshot) -> i64 {
        self.memory_bytes as i64 - earlier.memory_bytes as i64
    }
}

/// Normalized outcome of one measured strategy run. Immutable once built.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BenchmarkResult {
    pub elapsed: Duration,
    /// End minus start memory usage, in bytes.
    pub memory_delta_bytes: i64,
    pub units_processed: usize,
    /// Present only when at least one tier changed during the run.
    pub collections: Option<CollectionCounts>,
}

impl BenchmarkResult {
    pub fn new(
        elapsed: Duration,
        memory_delta_bytes: i64,
        units_processed: usize,
        collections: CollectionCounts,
    ) -> Self {
        Self {
            elapsed,
            memory_delta_bytes,
            units_processed,
            collections: if collections.is_zero() {
                None
            } else {
                Some(collections)
            },
        }
    }

    pub fn elapsed_ms(&self) -> f64 {
        self.elapsed.as_secs_f64() * 1_000.0
    }

    /// Memory delta in megabytes (2^20 bytes).
    pub fn memory_delta_mb(&self) -> f64 {
        self.memory_delta_bytes as f64 / (1024.0 * 1024.0)
    }

    pub fn units_per_second(&self) -> f64 {
        let secs = self.elapsed.as_secs_f64();
        if secs > 0.0 {
            self.units_processed as f64 / secs
        } else {
            0.0
        }
    }

    /// Bytes transformed per second given the unit size of the run.
    pub fn bytes_per_second(&self, unit_size: usize) -> f64 {
        self.units_per_second() * unit_size as f64
    }
}

impl fmt::Display for BenchmarkResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{:.0} ms, memory delta {:.2} MB",
            self.elapsed_ms(),
            self.memory_delta_mb()
        )?;
        if let Some(collections) = &self.collections {
            write!(f, ", collections {}", collections)?;
        }
        Ok(())
    }
}
