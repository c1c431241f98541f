//! Frame delta kernel
//!
//! The delta between two frames is the sum of absolute per-pixel differences
//! normalized by `pixels * 255`, so identical frames give 0.0 and a frame
//! compared to its inverse gives 1.0. Every path accumulates in integers, so
//! the SIMD variants return exactly what the scalar loop returns.

/// Normalized mean absolute difference of two equal-length buffers, in `[0, 1]`.
///
/// Empty buffers give 0.0.
pub fn mean_abs_delta(a: &[u8], b: &[u8]) -> f64 {
    debug_assert_eq!(a.len(), b.len());
    let pixels = a.len().min(b.len());
    if pixels == 0 {
        return 0.0;
    }
    sum_abs_diff(&a[..pixels], &b[..pixels]) as f64 / (pixels as f64 * 255.0)
}

/// Sum of absolute differences using the fastest path for this target
#[cfg(target_arch = "x86_64")]
pub fn sum_abs_diff(a: &[u8], b: &[u8]) -> u64 {
    sse2::sum_abs_diff(a, b)
}

/// Sum of absolute differences using the fastest path for this target
#[cfg(target_arch = "aarch64")]
pub fn sum_abs_diff(a: &[u8], b: &[u8]) -> u64 {
    neon::sum_abs_diff(a, b)
}

/// Sum of absolute differences using the fastest path for this target
#[cfg(not(any(target_arch = "x86_64", target_arch = "aarch64")))]
pub fn sum_abs_diff(a: &[u8], b: &[u8]) -> u64 {
    sum_abs_diff_chunked(a, b)
}

/// Reference implementation
pub fn sum_abs_diff_scalar(a: &[u8], b: &[u8]) -> u64 {
    a.iter()
        .zip(b)
        .map(|(&x, &y)| u64::from(x.abs_diff(y)))
        .sum()
}

/// Portable 16-byte chunked loop the compiler can auto-vectorize
pub fn sum_abs_diff_chunked(a: &[u8], b: &[u8]) -> u64 {
    let mut a_chunks = a.chunks_exact(16);
    let mut b_chunks = b.chunks_exact(16);
    let mut sum = 0u64;

    for (ca, cb) in a_chunks.by_ref().zip(b_chunks.by_ref()) {
        // 16 * 255 fits comfortably in u32
        let chunk: u32 = ca
            .iter()
            .zip(cb)
            .map(|(&x, &y)| u32::from(x.abs_diff(y)))
            .sum();
        sum += u64::from(chunk);
    }

    sum + sum_abs_diff_scalar(a_chunks.remainder(), b_chunks.remainder())
}

#[cfg(target_arch = "x86_64")]
mod sse2 {
    use std::arch::x86_64::{
        __m128i, _mm_add_epi64, _mm_loadu_si128, _mm_sad_epu8, _mm_setzero_si128,
        _mm_storeu_si128,
    };

    pub fn sum_abs_diff(a: &[u8], b: &[u8]) -> u64 {
        let len = a.len().min(b.len());
        let chunks = len / 16;

        // SAFETY: SSE2 is part of the x86_64 baseline. Every load reads 16 bytes
        // starting at i * 16 with i < len / 16, inside both slices, and the
        // unaligned load/store variants have no alignment requirement.
        let (lo, hi) = unsafe {
            let mut acc = _mm_setzero_si128();
            for i in 0..chunks {
                let va = _mm_loadu_si128(a.as_ptr().add(i * 16) as *const __m128i);
                let vb = _mm_loadu_si128(b.as_ptr().add(i * 16) as *const __m128i);
                // psadbw leaves two 16-bit sums in the low bits of each 64-bit lane
                acc = _mm_add_epi64(acc, _mm_sad_epu8(va, vb));
            }
            let mut lanes = [0u64; 2];
            _mm_storeu_si128(lanes.as_mut_ptr() as *mut __m128i, acc);
            (lanes[0], lanes[1])
        };

        let tail = chunks * 16;
        lo + hi + super::sum_abs_diff_scalar(&a[tail..len], &b[tail..len])
    }
}

#[cfg(target_arch = "aarch64")]
mod neon {
    use std::arch::aarch64::{
        vabdq_u8, vaddlvq_u32, vdupq_n_u32, vld1q_u8, vpadalq_u16, vpaddlq_u8,
    };

    /// Chunks folded into one u32x4 accumulator before it is drained.
    /// Each chunk adds at most 4 * 255 per lane.
    const CHUNKS_PER_FLUSH: usize = 1 << 20;

    pub fn sum_abs_diff(a: &[u8], b: &[u8]) -> u64 {
        let len = a.len().min(b.len());
        let chunks = len / 16;
        let mut sum = 0u64;

        let mut start = 0;
        while start < chunks {
            let end = (start + CHUNKS_PER_FLUSH).min(chunks);
            // SAFETY: NEON is mandatory on aarch64 and every 16-byte load
            // starts at i * 16 with i < len / 16, inside both slices.
            sum += unsafe {
                let mut acc = vdupq_n_u32(0);
                for i in start..end {
                    let va = vld1q_u8(a.as_ptr().add(i * 16));
                    let vb = vld1q_u8(b.as_ptr().add(i * 16));
                    acc = vpadalq_u16(acc, vpaddlq_u8(vabdq_u8(va, vb)));
                }
                vaddlvq_u32(acc)
            };
            start = end;
        }

        let tail = chunks * 16;
        sum + super::sum_abs_diff_scalar(&a[tail..len], &b[tail..len])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Deterministic byte pattern with plenty of variation
    fn pattern(len: usize, seed: u32) -> Vec<u8> {
        let mut state = seed.wrapping_mul(2654435761).wrapping_add(1);
        (0..len)
            .map(|_| {
                state = state.wrapping_mul(1103515245).wrapping_add(12345);
                (state >> 16) as u8
            })
            .collect()
    }

    #[test]
    fn identical_buffers_have_zero_delta() {
        let a = pattern(1000, 1);
        assert_eq!(mean_abs_delta(&a, &a), 0.0);
    }

    #[test]
    fn delta_is_symmetric() {
        for len in [1, 15, 16, 17, 255, 4096 + 7] {
            let a = pattern(len, 3);
            let b = pattern(len, 4);
            assert_eq!(mean_abs_delta(&a, &b), mean_abs_delta(&b, &a), "len {}", len);
        }
    }

    #[test]
    fn inverse_frame_has_unit_delta() {
        let black = vec![0u8; 333];
        let white = vec![255u8; 333];
        assert_eq!(mean_abs_delta(&black, &white), 1.0);
    }

    #[test]
    fn delta_matches_formula() {
        let a = vec![10u8, 20, 30, 40];
        let b = vec![20u8, 10, 30, 0];
        // (10 + 10 + 0 + 40) / (4 * 255)
        let expected = 60.0 / 1020.0;
        assert!((mean_abs_delta(&a, &b) - expected).abs() < 1e-12);
    }

    #[test]
    fn empty_buffers_have_zero_delta() {
        assert_eq!(mean_abs_delta(&[], &[]), 0.0);
    }

    #[test]
    fn all_paths_agree_with_scalar() {
        for len in [0, 1, 15, 16, 31, 32, 100, 1280 * 3 + 5] {
            let a = pattern(len, 7);
            let b = pattern(len, 9);
            let scalar = sum_abs_diff_scalar(&a, &b);
            assert_eq!(sum_abs_diff(&a, &b), scalar, "dispatch, len {}", len);
            assert_eq!(sum_abs_diff_chunked(&a, &b), scalar, "chunked, len {}", len);
        }
    }

    #[test]
    fn full_hd_extremes_do_not_overflow() {
        let black = vec![0u8; 1920 * 1080];
        let white = vec![255u8; 1920 * 1080];
        assert_eq!(sum_abs_diff(&black, &white), 255 * 1920 * 1080);
    }
}
