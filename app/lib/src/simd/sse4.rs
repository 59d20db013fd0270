//! SSE4.1 kernels for x86_64.
//!
//! SSE4.1 adds a zero-extending 32-to-64-bit widen, which is all the checksum
//! accumulator needs; the other families gain nothing over SSE2.
//!
//! # Safety
//!
//! All functions in this module are unsafe and require SSE4.1 support.

use std::arch::x86_64::*;

use super::scalar;

const WIDTH: usize = 16;

/// Raw ones'-complement sum of `buf`.
///
/// # Safety
///
/// The caller must ensure that SSE4.1 is available on the current CPU.
#[target_feature(enable = "sse4.1")]
pub unsafe fn checksum_sse4(buf: &[u8]) -> u64 {
    let mut lo = _mm_setzero_si128();
    let mut hi = _mm_setzero_si128();
    let mut chunks = buf.chunks_exact(WIDTH);
    for chunk in chunks.by_ref() {
        let v = _mm_loadu_si128(chunk.as_ptr() as *const __m128i);
        lo = _mm_add_epi64(lo, _mm_cvtepu32_epi64(v));
        hi = _mm_add_epi64(hi, _mm_cvtepu32_epi64(_mm_srli_si128::<8>(v)));
    }
    let mut lanes = [0u64; 2];
    _mm_storeu_si128(lanes.as_mut_ptr() as *mut __m128i, _mm_add_epi64(lo, hi));
    lanes[0] + lanes[1] + scalar::checksum_scalar(chunks.remainder())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kernels::checksum::fold;

    #[test]
    fn test_checksum_matches_scalar() {
        if !std::arch::is_x86_feature_detected!("sse4.1") {
            return;
        }
        let data: Vec<u8> = (0..517u32).map(|i| (i ^ (i >> 3)) as u8).collect();
        for start in 0..4 {
            let slice = &data[start..];
            let sum = unsafe { checksum_sse4(slice) };
            assert_eq!(fold(sum), fold(scalar::checksum_scalar(slice)));
        }
    }
}
