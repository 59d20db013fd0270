//! AVX-512 implementations for x86_64.
//!
//! 512-bit vectors: PRBS fill moves 64 bytes per step using the 64-byte lag
//! recurrence, verify checks sixteen words at a time.
//!
//! # Safety
//!
//! All functions in this module are unsafe and require AVX-512F and AVX-512BW.
//! The caller must verify that both are available before calling these functions.

use std::arch::x86_64::*;

use super::scalar;
use crate::kernels::prbs::{LAG_64, SEED_MASK};

const LANES: usize = 16;
const WIDTH: usize = 64;

/// Fill `buf` with PRBS23 from `seed`; returns the continuation seed.
///
/// # Safety
///
/// The caller must ensure that AVX-512F and AVX-512BW are available on the current CPU.
#[target_feature(enable = "avx512f,avx512bw")]
pub unsafe fn prbs_fill_avx512(buf: &mut [u8], seed: u32) -> u32 {
    let (near, far) = LAG_64;
    let len = buf.len();
    if len < far + WIDTH {
        return scalar::prbs_fill_scalar(buf, seed);
    }

    scalar::prbs_fill_scalar(&mut buf[..far], seed);
    let ones = _mm512_set1_epi32(-1);
    let ptr = buf.as_mut_ptr();
    let mut i = far;
    while i + WIDTH <= len {
        let a = _mm512_loadu_epi32(ptr.add(i - near) as *const i32);
        let b = _mm512_loadu_epi32(ptr.add(i - far) as *const i32);
        _mm512_storeu_epi32(
            ptr.add(i) as *mut i32,
            _mm512_xor_si512(_mm512_xor_si512(a, b), ones),
        );
        i += WIDTH;
    }
    scalar::prbs_resume(buf, i)
}

#[inline]
#[target_feature(enable = "avx512f")]
unsafe fn step32(seed: __m512i) -> __m512i {
    let s = _mm512_and_si512(seed, _mm512_set1_epi32(SEED_MASK as i32));
    let a = _mm512_xor_si512(_mm512_slli_epi32::<9>(s), _mm512_slli_epi32::<14>(s));
    let b = _mm512_and_si512(_mm512_srli_epi32::<4>(s), _mm512_set1_epi32(0x3fff));
    let c = _mm512_and_si512(_mm512_srli_epi32::<9>(s), _mm512_set1_epi32(0x3e00));
    let d = _mm512_srli_epi32::<14>(s);
    _mm512_xor_si512(_mm512_xor_si512(a, b), _mm512_xor_si512(c, d))
}

/// Received pattern bits of stored words: byte swap, then complement.
#[inline]
#[target_feature(enable = "avx512f")]
unsafe fn received(raw: __m512i) -> __m512i {
    let odd = _mm512_and_si512(_mm512_ror_epi32::<8>(raw), _mm512_set1_epi32(0xff00_ff00u32 as i32));
    let even = _mm512_and_si512(_mm512_rol_epi32::<8>(raw), _mm512_set1_epi32(0x00ff_00ff));
    _mm512_xor_si512(_mm512_or_si512(odd, even), _mm512_set1_epi32(-1))
}

/// Count PRBS23 bit errors in `buf`.
///
/// # Safety
///
/// The caller must ensure that AVX-512F and AVX-512BW are available on the current CPU.
#[target_feature(enable = "avx512f,avx512bw")]
pub unsafe fn prbs_verify_avx512(buf: &[u8]) -> u32 {
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
        let prev = received(_mm512_loadu_epi32(ptr.add(i - 1) as *const i32));
        let cur = received(_mm512_loadu_epi32(ptr.add(i) as *const i32));
        _mm512_storeu_epi32(diffs.as_mut_ptr() as *mut i32, _mm512_xor_si512(step32(prev), cur));
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
/// The caller must ensure that AVX-512F and AVX-512BW are available on the current CPU.
#[target_feature(enable = "avx512f,avx512bw")]
pub unsafe fn checksum_avx512(buf: &[u8]) -> u64 {
    let zero = _mm512_setzero_si512();
    let mut acc = zero;
    let mut chunks = buf.chunks_exact(WIDTH);
    for chunk in chunks.by_ref() {
        let v = _mm512_loadu_epi32(chunk.as_ptr() as *const i32);
        acc = _mm512_add_epi64(acc, _mm512_unpacklo_epi32(v, zero));
        acc = _mm512_add_epi64(acc, _mm512_unpackhi_epi32(v, zero));
    }
    _mm512_reduce_add_epi64(acc) as u64 + scalar::checksum_scalar(chunks.remainder())
}

/// Fill `buf` with `value`.
///
/// # Safety
///
/// The caller must ensure that AVX-512F and AVX-512BW are available on the current CPU.
#[target_feature(enable = "avx512f,avx512bw")]
pub unsafe fn fill_const_avx512(buf: &mut [u8], value: u8) {
    let v = _mm512_set1_epi8(value as i8);
    let mut blocks = buf.chunks_exact_mut(WIDTH);
    for block in blocks.by_ref() {
        _mm512_storeu_epi32(block.as_mut_ptr() as *mut i32, v);
    }
    scalar::fill_const_scalar(blocks.into_remainder(), value);
}
