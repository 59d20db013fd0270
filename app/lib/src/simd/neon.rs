//! NEON implementations for ARM64.
//!
//! 128-bit vectors, the same shapes as the SSE2 kernels. NEON has a byte
//! reverse and a per-byte popcount, so verify needs no scalar popcount.
//!
//! # Safety
//!
//! All functions in this module are unsafe and require NEON support.
//! NEON is mandatory on ARM64, so this is always satisfied on that platform.

use std::arch::aarch64::*;

use super::scalar;
use crate::kernels::prbs::{LAG_16, SEED_MASK};

const LANES: usize = 4;
const WIDTH: usize = 16;

/// Fill `buf` with PRBS23 from `seed`; returns the continuation seed.
///
/// # Safety
///
/// The caller must ensure that NEON is available on the current CPU.
#[target_feature(enable = "neon")]
pub unsafe fn prbs_fill_neon(buf: &mut [u8], seed: u32) -> u32 {
    let (near, far) = LAG_16;
    let len = buf.len();
    if len < far + WIDTH {
        return scalar::prbs_fill_scalar(buf, seed);
    }

    scalar::prbs_fill_scalar(&mut buf[..far], seed);
    let ptr = buf.as_mut_ptr();
    let mut i = far;
    while i + WIDTH <= len {
        let a = vld1q_u8(ptr.add(i - near));
        let b = vld1q_u8(ptr.add(i - far));
        vst1q_u8(ptr.add(i), vmvnq_u8(veorq_u8(a, b)));
        i += WIDTH;
    }
    scalar::prbs_resume(buf, i)
}

#[inline]
#[target_feature(enable = "neon")]
unsafe fn step32(seed: uint32x4_t) -> uint32x4_t {
    let s = vandq_u32(seed, vdupq_n_u32(SEED_MASK));
    let a = veorq_u32(vshlq_n_u32::<9>(s), vshlq_n_u32::<14>(s));
    let b = vandq_u32(vshrq_n_u32::<4>(s), vdupq_n_u32(0x3fff));
    let c = vandq_u32(vshrq_n_u32::<9>(s), vdupq_n_u32(0x3e00));
    let d = vshrq_n_u32::<14>(s);
    veorq_u32(veorq_u32(a, b), veorq_u32(c, d))
}

/// Received pattern bits of four stored words.
#[inline]
#[target_feature(enable = "neon")]
unsafe fn received(ptr: *const u32) -> uint32x4_t {
    let bytes = vrev32q_u8(vld1q_u8(ptr as *const u8));
    vmvnq_u32(vreinterpretq_u32_u8(bytes))
}

/// Count PRBS23 bit errors in `buf`.
///
/// # Safety
///
/// The caller must ensure that NEON is available on the current CPU.
#[target_feature(enable = "neon")]
pub unsafe fn prbs_verify_neon(buf: &[u8]) -> u32 {
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
    let mut i = 1;
    while i + LANES <= words.len() {
        let prev = received(ptr.add(i - 1));
        let cur = received(ptr.add(i));
        let diff = vreinterpretq_u8_u32(veorq_u32(step32(prev), cur));
        errors += vaddlvq_u8(vcntq_u8(diff)) as u32;
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
/// The caller must ensure that NEON is available on the current CPU.
#[target_feature(enable = "neon")]
pub unsafe fn checksum_neon(buf: &[u8]) -> u64 {
    let mut acc = vdupq_n_u64(0);
    let mut chunks = buf.chunks_exact(WIDTH);
    for chunk in chunks.by_ref() {
        let v = vreinterpretq_u32_u8(vld1q_u8(chunk.as_ptr()));
        acc = vpadalq_u32(acc, v);
    }
    vaddvq_u64(acc) + scalar::checksum_scalar(chunks.remainder())
}

/// Fill `buf` with `value`.
///
/// # Safety
///
/// The caller must ensure that NEON is available on the current CPU.
#[target_feature(enable = "neon")]
pub unsafe fn fill_const_neon(buf: &mut [u8], value: u8) {
    let v = vdupq_n_u8(value);
    let mut blocks = buf.chunks_exact_mut(WIDTH);
    for block in blocks.by_ref() {
        vst1q_u8(block.as_mut_ptr(), v);
    }
    scalar::fill_const_scalar(blocks.into_remainder(), value);
}

#[inline]
#[target_feature(enable = "neon")]
unsafe fn fill_step_neon(buf: &mut [u8], value: u8, step: u8) -> u8 {
    let pattern = scalar::step_pattern::<WIDTH>(value, step);
    let mut v = vld1q_u8(pattern.as_ptr());
    let stride = vdupq_n_u8(step.wrapping_mul(WIDTH as u8));

    let mut blocks = buf.chunks_exact_mut(WIDTH);
    let mut written = 0usize;
    for block in blocks.by_ref() {
        vst1q_u8(block.as_mut_ptr(), v);
        v = vaddq_u8(v, stride);
        written += WIDTH;
    }
    let next = value.wrapping_add(step.wrapping_mul(written as u8));
    scalar::fill_step_scalar(blocks.into_remainder(), next, step)
}

/// Incrementing fill; returns the next value.
///
/// # Safety
///
/// The caller must ensure that NEON is available on the current CPU.
#[target_feature(enable = "neon")]
pub unsafe fn fill_incr_neon(buf: &mut [u8], value: u8) -> u8 {
    fill_step_neon(buf, value, 1)
}

/// Decrementing fill; returns the next value.
///
/// # Safety
///
/// The caller must ensure that NEON is available on the current CPU.
#[target_feature(enable = "neon")]
pub unsafe fn fill_decr_neon(buf: &mut [u8], value: u8) -> u8 {
    fill_step_neon(buf, value, u8::MAX)
}
