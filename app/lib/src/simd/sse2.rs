//! SSE2 kernels for x86_64.
//!
//! 128-bit vectors. PRBS fill uses the 16-byte lag recurrence; verify checks
//! four words per step.
//!
//! # Safety
//!
//! All functions in this module are unsafe and require SSE2 support.
//! The caller must verify that SSE2 is available before calling these functions.

use std::arch::x86_64::*;

use super::scalar;
use crate::kernels::prbs::{LAG_16, SEED_MASK};

const LANES: usize = 4;
const WIDTH: usize = 16;

/// Fill `buf` with PRBS23 from `seed`; returns the continuation seed.
///
/// # Safety
///
/// The caller must ensure that SSE2 is available on the current CPU.
#[target_feature(enable = "sse2")]
pub unsafe fn prbs_fill_sse2(buf: &mut [u8], seed: u32) -> u32 {
    let (near, far) = LAG_16;
    let len = buf.len();
    if len < far + WIDTH {
        return scalar::prbs_fill_scalar(buf, seed);
    }

    scalar::prbs_fill_scalar(&mut buf[..far], seed);
    let ones = _mm_set1_epi8(-1);
    let ptr = buf.as_mut_ptr();
    let mut i = far;
    while i + WIDTH <= len {
        let a = _mm_loadu_si128(ptr.add(i - near) as *const __m128i);
        let b = _mm_loadu_si128(ptr.add(i - far) as *const __m128i);
        _mm_storeu_si128(ptr.add(i) as *mut __m128i, _mm_xor_si128(_mm_xor_si128(a, b), ones));
        i += WIDTH;
    }
    scalar::prbs_resume(buf, i)
}

#[inline]
#[target_feature(enable = "sse2")]
unsafe fn bswap32(x: __m128i) -> __m128i {
    let halves = _mm_or_si128(_mm_slli_epi16::<8>(x), _mm_srli_epi16::<8>(x));
    _mm_or_si128(_mm_slli_epi32::<16>(halves), _mm_srli_epi32::<16>(halves))
}

#[inline]
#[target_feature(enable = "sse2")]
unsafe fn step32(seed: __m128i) -> __m128i {
    let s = _mm_and_si128(seed, _mm_set1_epi32(SEED_MASK as i32));
    let a = _mm_xor_si128(_mm_slli_epi32::<9>(s), _mm_slli_epi32::<14>(s));
    let b = _mm_and_si128(_mm_srli_epi32::<4>(s), _mm_set1_epi32(0x3fff));
    let c = _mm_and_si128(_mm_srli_epi32::<9>(s), _mm_set1_epi32(0x3e00));
    let d = _mm_srli_epi32::<14>(s);
    _mm_xor_si128(_mm_xor_si128(a, b), _mm_xor_si128(c, d))
}

/// Received pattern bits of stored words.
#[inline]
#[target_feature(enable = "sse2")]
unsafe fn received(raw: __m128i) -> __m128i {
    _mm_xor_si128(bswap32(raw), _mm_set1_epi32(-1))
}

/// Count PRBS23 bit errors in `buf`.
///
/// # Safety
///
/// The caller must ensure that SSE2 is available on the current CPU.
#[target_feature(enable = "sse2")]
pub unsafe fn prbs_verify_sse2(buf: &[u8]) -> u32 {
    let Some(parts) = scalar::verify_parts(buf) else {
        return 0;
    };
    let words = parts.words;
    let mut errors = 0;
    if words.len() <= LANES {
        let seed = scalar::verify_words(parts.seed, words, &mut errors);
        scalar::verify_tail(seed, parts.tail, &mut errors);
        return errors;
    }

    scalar::verify_words(parts.seed, &words[..1], &mut errors);
    let ptr = words.as_ptr();
    let mut diffs = [0u32; LANES];
    let mut i = 1;
    while i + LANES <= words.len() {
        let prev = received(_mm_loadu_si128(ptr.add(i - 1) as *const __m128i));
        let cur = received(_mm_loadu_si128(ptr.add(i) as *const __m128i));
        _mm_storeu_si128(diffs.as_mut_ptr() as *mut __m128i, _mm_xor_si128(step32(prev), cur));
        errors += diffs.iter().map(|d| d.count_ones()).sum::<u32>();
        i += LANES;
    }

    let seed = !u32::from_be(words[i - 1]);
    let seed = scalar::verify_words(seed, &words[i..], &mut errors);
    scalar::verify_tail(seed, parts.tail, &mut errors);
    errors
}

/// Raw ones'-complement sum of `buf`.
///
/// # Safety
///
/// The caller must ensure that SSE2 is available on the current CPU.
#[target_feature(enable = "sse2")]
pub unsafe fn checksum_sse2(buf: &[u8]) -> u64 {
    let zero = _mm_setzero_si128();
    let mut acc = zero;
    let mut chunks = buf.chunks_exact(WIDTH);
    for chunk in chunks.by_ref() {
        let v = _mm_loadu_si128(chunk.as_ptr() as *const __m128i);
        acc = _mm_add_epi64(acc, _mm_unpacklo_epi32(v, zero));
        acc = _mm_add_epi64(acc, _mm_unpackhi_epi32(v, zero));
    }
    let mut lanes = [0u64; 2];
    _mm_storeu_si128(lanes.as_mut_ptr() as *mut __m128i, acc);
    lanes[0] + lanes[1] + scalar::checksum_scalar(chunks.remainder())
}

/// Fill `buf` with `value`.
///
/// # Safety
///
/// The caller must ensure that SSE2 is available on the current CPU.
#[target_feature(enable = "sse2")]
pub unsafe fn fill_const_sse2(buf: &mut [u8], value: u8) {
    let v = _mm_set1_epi8(value as i8);
    let mut blocks = buf.chunks_exact_mut(WIDTH);
    for block in blocks.by_ref() {
        _mm_storeu_si128(block.as_mut_ptr() as *mut __m128i, v);
    }
    scalar::fill_const_scalar(blocks.into_remainder(), value);
}

#[inline]
#[target_feature(enable = "sse2")]
unsafe fn fill_step_sse2(buf: &mut [u8], value: u8, step: u8) -> u8 {
    let pattern = scalar::step_pattern::<WIDTH>(value, step);
    let mut v = _mm_loadu_si128(pattern.as_ptr() as *const __m128i);
    let stride = _mm_set1_epi8(step.wrapping_mul(WIDTH as u8) as i8);

    let mut blocks = buf.chunks_exact_mut(WIDTH);
    let mut written = 0usize;
    for block in blocks.by_ref() {
        _mm_storeu_si128(block.as_mut_ptr() as *mut __m128i, v);
        v = _mm_add_epi8(v, stride);
        written += WIDTH;
    }
    let next = value.wrapping_add(step.wrapping_mul(written as u8));
    scalar::fill_step_scalar(blocks.into_remainder(), next, step)
}

/// Incrementing fill; returns the next value.
///
/// # Safety
///
/// The caller must ensure that SSE2 is available on the current CPU.
#[target_feature(enable = "sse2")]
pub unsafe fn fill_incr_sse2(buf: &mut [u8], value: u8) -> u8 {
    fill_step_sse2(buf, value, 1)
}

/// Decrementing fill; returns the next value.
///
/// # Safety
///
/// The caller must ensure that SSE2 is available on the current CPU.
#[target_feature(enable = "sse2")]
pub unsafe fn fill_decr_sse2(buf: &mut [u8], value: u8) -> u8 {
    fill_step_sse2(buf, value, u8::MAX)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bswap32() {
        unsafe {
            let words = [0x0102_0304u32, 0xa0b0_c0d0, 0, u32::MAX];
            let mut out = [0u32; 4];
            let v = bswap32(_mm_loadu_si128(words.as_ptr() as *const __m128i));
            _mm_storeu_si128(out.as_mut_ptr() as *mut __m128i, v);
            assert_eq!(out, words.map(u32::swap_bytes));
        }
    }

    #[test]
    fn test_step32_matches_scalar() {
        unsafe {
            let seeds = [1u32, 0xdead_beef, 0x007f_ffff, 0x1234_5678];
            let mut out = [0u32; 4];
            let v = step32(_mm_loadu_si128(seeds.as_ptr() as *const __m128i));
            _mm_storeu_si128(out.as_mut_ptr() as *mut __m128i, v);
            assert_eq!(out, seeds.map(crate::kernels::prbs::step32));
        }
    }

    #[test]
    fn test_prbs_round_trip() {
        let mut buf = vec![0u8; 333];
        unsafe {
            let seed = prbs_fill_sse2(&mut buf[1..], 0x0abc_def1);
            assert_eq!(seed, crate::kernels::prbs::advance(0x0abc_def1, 332));
            assert_eq!(prbs_verify_sse2(&buf[1..]), 0);
        }
    }
}
