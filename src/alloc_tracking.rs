//! Heap accounting through a counting global allocator.
//!
//! Rust has no tracing collector, so the "collection events" the harness
//! reports are release events counted per allocation size tier:
//!
//! | tier | sizes                         |
//! |------|-------------------------------|
//! | 0    | below one page (4 KiB)        |
//! | 1    | below the large-object class  |
//! | 2    | large-object class and above  |
//!
//! The binary installs the allocator:
//!
//! ```rust,ignore
//! #[global_allocator]
//! static ALLOC: photo_bench::alloc_tracking::TrackingAllocator =
//!     photo_bench::alloc_tracking::TrackingAllocator;
//! ```
//!
//! Counters are global and relaxed; readings taken while other threads
//! allocate are approximate.

use crate::defaults::LARGE_OBJECT_THRESHOLD;
use crate::metrics::CollectionCounts;
use std::alloc::{GlobalAlloc, Layout, System};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

/// Upper bound (exclusive) of tier 0.
pub const PAGE_TIER_LIMIT: usize = 4096;

/// Cache-line padded counter so hot counters do not share a line.
#[repr(align(64))]
struct PaddedCounter(AtomicU64);

impl PaddedCounter {
    const fn new() -> Self {
        Self(AtomicU64::new(0))
    }

    #[inline]
    fn add(&self, value: u64) {
        self.0.fetch_add(value, Ordering::Relaxed);
    }

    #[inline]
    fn get(&self) -> u64 {
        self.0.load(Ordering::Relaxed)
    }
}

static ACTIVE: AtomicBool = AtomicBool::new(false);
static ALLOCATED_BYTES: PaddedCounter = PaddedCounter::new();
static FREED_BYTES: PaddedCounter = PaddedCounter::new();
static ALLOCATIONS: PaddedCounter = PaddedCounter::new();
static RELEASES: [PaddedCounter; 3] = [
    PaddedCounter::new(),
    PaddedCounter::new(),
    PaddedCounter::new(),
];

/// Size tier used for release counting.
#[inline]
pub fn size_tier(size: usize) -> usize {
    if size < PAGE_TIER_LIMIT {
        0
    } else if size < LARGE_OBJECT_THRESHOLD {
        1
    } else {
        2
    }
}

/// Point-in-time copy of the global counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct HeapStats {
    pub allocated_bytes: u64,
    pub freed_bytes: u64,
    pub allocations: u64,
    pub releases: CollectionCounts,
}

impl HeapStats {
    /// Bytes currently live on the heap (as seen by the tracker).
    pub fn live_bytes(&self) -> u64 {
        self.allocated_bytes.saturating_sub(self.freed_bytes)
    }
}

/// Whether a [`TrackingAllocator`] is installed and has served a request.
pub fn is_active() -> bool {
    ACTIVE.load(Ordering::Relaxed)
}

pub fn heap_stats() -> HeapStats {
    HeapStats {
        allocated_bytes: ALLOCATED_BYTES.get(),
        freed_bytes: FREED_BYTES.get(),
        allocations: ALLOCATIONS.get(),
        releases: CollectionCounts {
            gen0: RELEASES[0].get(),
            gen1: RELEASES[1].get(),
            gen2: RELEASES[2].get(),
        },
    }
}

/// System allocator wrapper feeding the global counters.
pub struct TrackingAllocator;

#[inline]
fn record_alloc(size: usize) {
    if !ACTIVE.load(Ordering::Relaxed) {
        ACTIVE.store(true, Ordering::Relaxed);
    }
    ALLOCATIONS.add(1);
    ALLOCATED_BYTES.add(size as u64);
}

#[inline]
fn record_release(size: usize) {
    FREED_BYTES.add(size as u64);
    RELEASES[size_tier(size)].add(1);
}

// SAFETY: every method delegates to `System`, which upholds the
// `GlobalAlloc` contract; the counters are only touched after the system
// call reports success.
unsafe impl GlobalAlloc for TrackingAllocator {
    unsafe fn alloc(&self, layout: Layout) -> *mut u8 {
        let ptr = System.alloc(layout);
        if !ptr.is_null() {
            record_alloc(layout.size());
        }
        ptr
    }

    unsafe fn alloc_zeroed(&self, layout: Layout) -> *mut u8 {
        let ptr = System.alloc_zeroed(layout);
        if !ptr.is_null() {
            record_alloc(layout.size());
        }
        ptr
    }

    unsafe fn dealloc(&self, ptr: *mut u8, layout: Layout) {
        System.dealloc(ptr, layout);
        record_release(layout.size());
    }

    /// A successful realloc counts as releasing the old block and allocating
    /// the new one, in place or not.
    unsafe fn realloc(&self, ptr: *mut u8, layout: Layout, new_size: usize) -> *mut u8 {
        let new_ptr = System.realloc(ptr, layout, new_size);
        if !new_ptr.is_null() {
            record_release(layout.size());
            record_alloc(new_size);
        }
        new_ptr
    }
}
