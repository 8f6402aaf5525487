//! # Workload Units
//!
//! A [`WorkloadUnit`] is one synthetic "photo": a fixed-length byte buffer
//! that is allocated, transformed in place, and released within a single
//! iteration. Two transforms are provided and must agree byte for byte:
//!
//! - **Scalar**: add [`PIXEL_DELTA`] to every byte, in index order
//! - **Vectorized**: the same addition over whole SIMD lanes, with the scalar
//!   rule applied to the tail shorter than one lane
//!
//! Release is scoped: [`WorkloadUnit::release`] frees the buffer explicitly,
//! and `Drop` does the same on any other exit path (error or panic). Releasing
//! twice is a no-op.
//!
//! Strategies never see units directly. They call [`Workload::process`] once
//! per iteration index, which keeps the create/transform/release cycle in one
//! place and lets tests wrap it with counting side channels.

use crate::defaults::LARGE_OBJECT_THRESHOLD;
use crate::error::{BenchError, Result};
use crate::simd;
use rand::{rngs::StdRng, RngCore, SeedableRng};
use serde::{Deserialize, Serialize};
use std::hint::black_box;

/// Constant added to every byte by both transforms.
pub const PIXEL_DELTA: u8 = 10;

/// Initial contents of a freshly created unit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FillPattern {
    Zeroed,
    /// Bytes drawn from a PRNG seeded with the given value.
    Random { seed: u64 },
}

impl FillPattern {
    /// Random fill below the large-object class, zeroes at or above it.
    pub fn for_size(size: usize, seed: u64) -> Self {
        if size < LARGE_OBJECT_THRESHOLD {
            FillPattern::Random { seed }
        } else {
            FillPattern::Zeroed
        }
    }
}

/// Processing applied to each unit.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Transform {
    Scalar,
    Vectorized,
}

impl std::fmt::Display for Transform {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Transform::Scalar => write!(f, "scalar"),
            Transform::Vectorized => write!(f, "vectorized"),
        }
    }
}

impl Transform {
    pub fn apply(self, unit: &mut WorkloadUnit) {
        match self {
            Transform::Scalar => unit.apply_scalar(),
            Transform::Vectorized => unit.apply_vectorized(),
        }
    }
}

/// Scalar rule shared by the baseline transform and the vectorized tail.
#[inline]
pub fn add_scalar(bytes: &mut [u8], delta: u8) {
    for b in bytes.iter_mut() {
        *b = b.wrapping_add(delta);
    }
}

/// One synthetic buffer, exclusively owned by the iteration that created it.
#[derive(Debug)]
pub struct WorkloadUnit {
    buffer: Vec<u8>,
    size: usize,
    released: bool,
}

impl WorkloadUnit {
    /// Allocates exactly `size` bytes filled according to `fill`.
    ///
    /// Allocation goes through a fallible reservation, so an exhausted heap
    /// surfaces as [`BenchError::ResourceExhaustion`] instead of aborting.
    pub fn create(size: usize, fill: FillPattern) -> Result<Self> {
        let mut buffer = Vec::new();
        buffer
            .try_reserve_exact(size)
            .map_err(|_| BenchError::ResourceExhaustion { requested: size })?;
        buffer.resize(size, 0);

        if let FillPattern::Random { seed } = fill {
            StdRng::seed_from_u64(seed).fill_bytes(&mut buffer);
        }

        Ok(Self {
            buffer,
            size,
            released: false,
        })
    }

    /// Buffer length fixed at creation (unchanged by release).
    pub fn size(&self) -> usize {
        self.size
    }

    pub fn is_released(&self) -> bool {
        self.released
    }

    /// Current contents; empty once released.
    pub fn bytes(&self) -> &[u8] {
        &self.buffer
    }

    pub fn apply_scalar(&mut self) {
        add_scalar(&mut self.buffer, PIXEL_DELTA);
    }

    pub fn apply_vectorized(&mut self) {
        let processed = simd::add_packed(&mut self.buffer, PIXEL_DELTA);
        add_scalar(&mut self.buffer[processed..], PIXEL_DELTA);
    }

    /// Frees the buffer now. Calling it again does nothing.
    pub fn release(&mut self) {
        if self.released {
            return;
        }
        self.buffer = Vec::new();
        self.released = true;
    }
}

impl Drop for WorkloadUnit {
    fn drop(&mut self) {
        self.release();
    }
}

/// Per-iteration work driven by an execution strategy.
///
/// `process` is called exactly once per index in `[0, N)`; implementations
/// must be callable from many threads at once.
pub trait Workload: Send + Sync {
    fn process(&self, index: usize) -> Result<()>;

    /// Bytes handled per call, used for throughput reporting.
    fn unit_size(&self) -> usize;
}

/// The benchmark's workload: create a photo-sized unit, transform it,
/// release it.
#[derive(Debug, Clone)]
pub struct PhotoWorkload {
    size: usize,
    transform: Transform,
    seed: u64,
}

impl PhotoWorkload {
    pub fn new(size: usize, transform: Transform, seed: u64) -> Self {
        Self {
            size,
            transform,
            seed,
        }
    }

    pub fn transform(&self) -> Transform {
        self.transform
    }

    /// Fill used for the unit of iteration `index`.
    pub fn fill_for(&self, index: usize) -> FillPattern {
        FillPattern::for_size(self.size, self.seed.wrapping_add(index as u64))
    }
}

impl Workload for PhotoWorkload {
    fn process(&self, index: usize) -> Result<()> {
        let mut unit = WorkloadUnit::create(self.size, self.fill_for(index))?;
        self.transform.apply(&mut unit);
        // Keep the transform from being optimized away.
        black_box(unit.bytes().first());
        unit.release();
        Ok(())
    }

    fn unit_size(&self) -> usize {
        self.size
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scalar_copy(bytes: &[u8]) -> Vec<u8> {
        bytes.iter().map(|b| b.wrapping_add(PIXEL_DELTA)).collect()
    }

    #[test]
    fn test_create_zeroed_has_exact_size() {
        let unit = WorkloadUnit::create(1000, FillPattern::Zeroed).unwrap();
        assert_eq!(unit.size(), 1000);
        assert_eq!(unit.bytes().len(), 1000);
        assert!(unit.bytes().iter().all(|&b| b == 0));
        assert!(!unit.is_released());
    }

    #[test]
    fn test_random_fill_is_seeded() {
        let a = WorkloadUnit::create(4096, FillPattern::Random { seed: 7 }).unwrap();
        let b = WorkloadUnit::create(4096, FillPattern::Random { seed: 7 }).unwrap();
        let c = WorkloadUnit::create(4096, FillPattern::Random { seed: 8 }).unwrap();
        assert_eq!(a.bytes(), b.bytes());
        assert_ne!(a.bytes(), c.bytes());
    }

    #[test]
    fn test_fill_pattern_by_size_class() {
        assert_eq!(
            FillPattern::for_size(LARGE_OBJECT_THRESHOLD - 1, 3),
            FillPattern::Random { seed: 3 }
        );
        assert_eq!(
            FillPattern::for_size(LARGE_OBJECT_THRESHOLD, 3),
            FillPattern::Zeroed
        );
    }

    #[test]
    fn test_scalar_wraps() {
        let mut unit = WorkloadUnit::create(3, FillPattern::Zeroed).unwrap();
        unit.buffer.copy_from_slice(&[0, 245, 255]);
        unit.apply_scalar();
        assert_eq!(unit.bytes(), &[10, 255, 9]);
    }

    /// Every byte value, at sizes on and off lane boundaries.
    #[test]
    fn test_vectorized_matches_scalar() {
        let lane = simd::lane_width();
        let sizes = [
            0,
            1,
            lane - 1,
            lane,
            lane + 1,
            2 * lane + 3,
            255,
            256,
            257,
            4096 + 7,
        ];
        for size in sizes {
            for seed in 0..4u64 {
                let mut unit = WorkloadUnit::create(size, FillPattern::Random { seed }).unwrap();
                for (i, b) in unit.buffer.iter_mut().enumerate().take(256) {
                    *b = i as u8;
                }
                let expected = scalar_copy(unit.bytes());
                unit.apply_vectorized();
                assert_eq!(unit.bytes(), expected.as_slice(), "size {}", size);
            }
        }
    }

    #[test]
    fn test_release_is_idempotent() {
        let mut unit = WorkloadUnit::create(128, FillPattern::Zeroed).unwrap();
        unit.release();
        assert!(unit.is_released());
        assert!(unit.bytes().is_empty());
        assert_eq!(unit.size(), 128);
        unit.release();
        assert!(unit.is_released());
    }

    #[test]
    fn test_impossible_allocation_is_resource_exhaustion() {
        let err = WorkloadUnit::create(usize::MAX, FillPattern::Zeroed).unwrap_err();
        match err {
            BenchError::ResourceExhaustion { requested } => assert_eq!(requested, usize::MAX),
            other => panic!("unexpected error: {:?}", other),
        }
    }

    #[test]
    fn test_photo_workload_transforms_agree() {
        let scalar = PhotoWorkload::new(50_000, Transform::Scalar, 42);
        let vectorized = PhotoWorkload::new(50_000, Transform::Vectorized, 42);
        assert_eq!(scalar.fill_for(3), vectorized.fill_for(3));
        assert!(scalar.process(3).is_ok());
        assert!(vectorized.process(3).is_ok());
        assert_eq!(scalar.unit_size(), 50_000);
    }

    #[test]
    fn test_transform_display() {
        assert_eq!(Transform::Scalar.to_string(), "scalar");
        assert_eq!(Transform::Vectorized.to_string(), "vectorized");
    }

    #[test]
    fn test_transform_serializes_like_display() {
        for transform in [Transform::Scalar, Transform::Vectorized] {
            let json = serde_json::to_string(&transform).unwrap();
            assert_eq!(json, format!("\"{}\"", transform));
            assert_eq!(serde_json::from_str::<Transform>(&json).unwrap(), transform);
        }
    }
}
