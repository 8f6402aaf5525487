//! Packed byte arithmetic backing the vectorized transform.
//!
//! The widest instruction set available at runtime is detected once and
//! cached. Every kernel only touches whole lanes and returns how many leading
//! bytes it processed; the caller finishes the tail with the scalar rule.

#[cfg(target_arch = "aarch64")]
use std::arch::aarch64::*;
#[cfg(target_arch = "x86_64")]
use std::arch::x86_64::*;
use serde::{Deserialize, Serialize};
use std::sync::OnceLock;

/// Lanes of the portable fallback, which packs bytes into a `u64`.
const WORD_LANES: usize = std::mem::size_of::<u64>();

const LOW_SEVEN: u64 = 0x7f7f_7f7f_7f7f_7f7f;
const HIGH_BIT: u64 = 0x8080_8080_8080_8080;

/// Instruction set used for packed byte addition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SimdLevel {
    Avx2,
    Sse2,
    Neon,
    /// Bytes packed into a machine word (SWAR), available everywhere.
    Word,
}

impl SimdLevel {
    /// Number of byte elements one packed operation handles.
    pub fn lane_width(self) -> usize {
        match self {
            SimdLevel::Avx2 => 32,
            SimdLevel::Sse2 | SimdLevel::Neon => 16,
            SimdLevel::Word => WORD_LANES,
        }
    }

    /// Whether the current CPU can execute this level.
    pub fn is_available(self) -> bool {
        match self {
            SimdLevel::Word => true,
            #[cfg(target_arch = "x86_64")]
            SimdLevel::Sse2 => true,
            #[cfg(target_arch = "x86_64")]
            SimdLevel::Avx2 => is_x86_feature_detected!("avx2"),
            #[cfg(target_arch = "aarch64")]
            SimdLevel::Neon => true,
            #[allow(unreachable_patterns)]
            _ => false,
        }
    }
}

impl std::fmt::Display for SimdLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SimdLevel::Avx2 => write!(f, "AVX2"),
            SimdLevel::Sse2 => write!(f, "SSE2"),
            SimdLevel::Neon => write!(f, "NEON"),
            SimdLevel::Word => write!(f, "SWAR u64"),
        }
    }
}

static SIMD_LEVEL: OnceLock<SimdLevel> = OnceLock::new();

/// Widest level supported by this CPU, detected on first use.
pub fn detect() -> SimdLevel {
    *SIMD_LEVEL.get_or_init(detect_level)
}

fn detect_level() -> SimdLevel {
    #[cfg(target_arch = "x86_64")]
    {
        if is_x86_feature_detected!("avx2") {
            SimdLevel::Avx2
        } else {
            SimdLevel::Sse2
        }
    }
    #[cfg(target_arch = "aarch64")]
    {
        SimdLevel::Neon
    }
    #[cfg(not(any(target_arch = "x86_64", target_arch = "aarch64")))]
    {
        SimdLevel::Word
    }
}

/// Native lane width for byte elements on this host.
pub fn lane_width() -> usize {
    detect().lane_width()
}

/// Adds `delta` (wrapping) to every whole lane of `buf` using the detected level.
///
/// Returns the number of leading bytes processed, always a multiple of the
/// lane width. The remaining `buf.len() - n` bytes are left untouched.
pub fn add_packed(buf: &mut [u8], delta: u8) -> usize {
    add_packed_with(detect(), buf, delta).unwrap_or(0)
}

/// Same as [`add_packed`] with an explicit level; `None` if the CPU lacks it.
pub fn add_packed_with(level: SimdLevel, buf: &mut [u8], delta: u8) -> Option<usize> {
    if !level.is_available() {
        return None;
    }
    let processed = match level {
        SimdLevel::Word => add_words(buf, delta),
        // SAFETY: availability was checked above.
        #[cfg(target_arch = "x86_64")]
        SimdLevel::Avx2 => unsafe { add_avx2(buf, delta) },
        #[cfg(target_arch = "x86_64")]
        SimdLevel::Sse2 => unsafe { add_sse2(buf, delta) },
        #[cfg(target_arch = "aarch64")]
        SimdLevel::Neon => unsafe { add_neon(buf, delta) },
        #[allow(unreachable_patterns)]
        _ => return None,
    };
    Some(processed)
}

#[cfg(target_arch = "x86_64")]
#[target_feature(enable = "avx2")]
unsafe fn add_avx2(buf: &mut [u8], delta: u8) -> usize {
    let full = buf.len() / 32 * 32;
    let lanes = _mm256_set1_epi8(delta as i8);
    for chunk in buf[..full].chunks_exact_mut(32) {
        let ptr = chunk.as_mut_ptr() as *mut __m256i;
        let v = _mm256_loadu_si256(ptr as *const __m256i);
        _mm256_storeu_si256(ptr, _mm256_add_epi8(v, lanes));
    }
    full
}

#[cfg(target_arch = "x86_64")]
#[target_feature(enable = "sse2")]
unsafe fn add_sse2(buf: &mut [u8], delta: u8) -> usize {
    let full = buf.len() / 16 * 16;
    let lanes = _mm_set1_epi8(delta as i8);
    for chunk in buf[..full].chunks_exact_mut(16) {
        let ptr = chunk.as_mut_ptr() as *mut __m128i;
        let v = _mm_loadu_si128(ptr as *const __m128i);
        _mm_storeu_si128(ptr, _mm_add_epi8(v, lanes));
    }
    full
}

#[cfg(target_arch = "aarch64")]
#[target_feature(enable = "neon")]
unsafe fn add_neon(buf: &mut [u8], delta: u8) -> usize {
    let full = buf.len() / 16 * 16;
    let lanes = vdupq_n_u8(delta);
    for chunk in buf[..full].chunks_exact_mut(16) {
        let ptr = chunk.as_mut_ptr();
        let v = vld1q_u8(ptr);
        vst1q_u8(ptr, vaddq_u8(v, lanes));
    }
    full
}

/// Carry-free byte addition inside a `u64`: add the low seven bits of each
/// byte, then restore the top bit with an xor so no carry crosses a byte.
fn add_words(buf: &mut [u8], delta: u8) -> usize {
    let full = buf.len() / WORD_LANES * WORD_LANES;
    let splat = u64::from_ne_bytes([delta; WORD_LANES]);
    for chunk in buf[..full].chunks_exact_mut(WORD_LANES) {
        let mut bytes = [0u8; WORD_LANES];
        bytes.copy_from_slice(chunk);
        let word = u64::from_ne_bytes(bytes);
        let sum = ((word & LOW_SEVEN) + (splat & LOW_SEVEN)) ^ ((word ^ splat) & HIGH_BIT);
        chunk.copy_from_slice(&sum.to_ne_bytes());
    }
    full
}

#[cfg(test)]
mod tests {
    use super::*;

    const ALL_LEVELS: [SimdLevel; 4] = [
        SimdLevel::Avx2,
        SimdLevel::Sse2,
        SimdLevel::Neon,
        SimdLevel::Word,
    ];

    fn every_byte(len: usize) -> Vec<u8> {
        (0..len).map(|i| (i % 256) as u8).collect()
    }

    #[test]
    fn test_detected_level_is_available() {
        let level = detect();
        assert!(level.is_available());
        assert_eq!(lane_width(), level.lane_width());
    }

    #[test]
    fn test_word_level_always_available() {
        assert!(SimdLevel::Word.is_available());
        assert_eq!(SimdLevel::Word.lane_width(), 8);
    }

    /// Each available level must agree with plain wrapping addition on
    /// every byte value, and must leave the tail untouched.
    #[test]
    fn test_levels_match_wrapping_add() {
        for level in ALL_LEVELS.iter().copied().filter(|l| l.is_available()) {
            for delta in [0u8, 1, 10, 127, 128, 200, 255] {
                let len = 256 * 3 + level.lane_width() - 1;
                let mut buf = every_byte(len);
                let processed = add_packed_with(level, &mut buf, delta).unwrap();

                assert_eq!(processed % level.lane_width(), 0);
                assert!(len - processed < level.lane_width());
                for (i, &b) in buf.iter().enumerate() {
                    let original = (i % 256) as u8;
                    let expected = if i < processed {
                        original.wrapping_add(delta)
                    } else {
                        original
                    };
                    assert_eq!(b, expected, "level {} delta {} index {}", level, delta, i);
                }
            }
        }
    }

    #[test]
    fn test_short_buffer_processes_nothing() {
        let mut buf = vec![1u8; 3];
        assert_eq!(add_packed(&mut buf, 10), 0);
        assert_eq!(buf, vec![1u8; 3]);
    }

    #[test]
    fn test_unavailable_level_returns_none() {
        #[cfg(target_arch = "x86_64")]
        assert!(add_packed_with(SimdLevel::Neon, &mut [0u8; 64], 1).is_none());
        #[cfg(target_arch = "aarch64")]
        assert!(add_packed_with(SimdLevel::Avx2, &mut [0u8; 64], 1).is_none());
    }
}
