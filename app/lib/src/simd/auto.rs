//! Portable kernels shaped for the compiler's auto-vectorizer.
//!
//! No intrinsics: fixed-size blocks with no loop-carried dependency inside a
//! block, so whatever vector width the build targets gets used. The results
//! are identical to the scalar kernels.

use super::scalar;
use crate::kernels::indexical;
use crate::kernels::prbs::LAG_32;

const PRBS_BLOCK: usize = 32;
const CHECKSUM_BLOCK: usize = 32;
const FILL_BLOCK: usize = 32;
const UNPACK_BLOCK: usize = 64;

/// PRBS fill using the 32-byte byte-lag recurrence.
pub fn prbs_fill_auto(buf: &mut [u8], seed: u32) -> u32 {
    let (near, far) = LAG_32;
    if buf.len() < far + PRBS_BLOCK {
        return scalar::prbs_fill_scalar(buf, seed);
    }

    scalar::prbs_fill_scalar(&mut buf[..far], seed);
    let mut i = far;
    while i + PRBS_BLOCK <= buf.len() {
        let (done, rest) = buf.split_at_mut(i);
        let a = &done[i - near..i - near + PRBS_BLOCK];
        let b = &done[i - far..i - far + PRBS_BLOCK];
        for ((out, &x), &y) in rest[..PRBS_BLOCK].iter_mut().zip(a).zip(b) {
            *out = !(x ^ y);
        }
        i += PRBS_BLOCK;
    }
    scalar::prbs_resume(buf, i)
}

/// Raw checksum sum with independent accumulators per word lane.
pub fn checksum_auto(buf: &[u8]) -> u64 {
    let mut lanes = [0u64; CHECKSUM_BLOCK / 4];
    let mut blocks = buf.chunks_exact(CHECKSUM_BLOCK);
    for block in blocks.by_ref() {
        for (lane, word) in lanes.iter_mut().zip(block.chunks_exact(4)) {
            *lane += u32::from_ne_bytes([word[0], word[1], word[2], word[3]]) as u64;
        }
    }
    lanes.iter().sum::<u64>() + scalar::checksum_scalar(blocks.remainder())
}

/// Constant fill in 32-byte blocks.
pub fn fill_const_auto(buf: &mut [u8], value: u8) {
    let mut blocks = buf.chunks_exact_mut(FILL_BLOCK);
    for block in blocks.by_ref() {
        block.copy_from_slice(&[value; FILL_BLOCK]);
    }
    scalar::fill_const_scalar(blocks.into_remainder(), value);
}

fn fill_step_auto(buf: &mut [u8], value: u8, step: u8) -> u8 {
    let mut pattern = [0u8; FILL_BLOCK];
    let mut v = value;
    for b in pattern.iter_mut() {
        *b = v;
        v = v.wrapping_add(step);
    }
    let stride = step.wrapping_mul(FILL_BLOCK as u8);

    let mut blocks = buf.chunks_exact_mut(FILL_BLOCK);
    for block in blocks.by_ref() {
        block.copy_from_slice(&pattern);
        for b in pattern.iter_mut() {
            *b = b.wrapping_add(stride);
        }
    }
    scalar::fill_step_scalar(blocks.into_remainder(), pattern[0], step)
}

/// Incrementing fill.
pub fn fill_incr_auto(buf: &mut [u8], value: u8) -> u8 {
    fill_step_auto(buf, value, 1)
}

/// Decrementing fill.
pub fn fill_decr_auto(buf: &mut [u8], value: u8) -> u8 {
    fill_step_auto(buf, value, u8::MAX)
}

/// Histogram accumulation: buckets for a block are computed first, then
/// counted.
pub fn unpack_and_sum_auto(values: &[u32], masks: &[u32], counters: &mut [&mut [u32]]) {
    let mut buckets = [0u32; UNPACK_BLOCK];
    for chunk in values.chunks(UNPACK_BLOCK) {
        for (&mask, hist) in masks.iter().zip(counters.iter_mut()) {
            let shift = indexical::shift(mask);
            for (bucket, &value) in buckets.iter_mut().zip(chunk) {
                *bucket = (value & mask) >> shift;
            }
            for &bucket in &buckets[..chunk.len()] {
                let slot = &mut hist[bucket as usize];
                *slot = slot.wrapping_add(1);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_prbs_fill_matches_scalar() {
        for len in [0usize, 7, 77, 78, 79, 100, 1000, 1003] {
            let mut expected = vec![0u8; len];
            let mut actual = vec![0u8; len];
            let seed_expected = scalar::prbs_fill_scalar(&mut expected, 0x0031_4159);
            let seed_actual = prbs_fill_auto(&mut actual, 0x0031_4159);
            assert_eq!(actual, expected, "len {len}");
            assert_eq!(seed_actual, seed_expected, "len {len}");
        }
    }

    #[test]
    fn test_checksum_matches_scalar() {
        let data: Vec<u8> = (0..1001u32).map(|i| (i * 7) as u8).collect();
        for len in [0usize, 31, 32, 33, 1001] {
            assert_eq!(
                crate::kernels::checksum::fold(checksum_auto(&data[..len])),
                crate::kernels::checksum::fold(scalar::checksum_scalar(&data[..len]))
            );
        }
    }

    #[test]
    fn test_fills_match_scalar() {
        for len in [0usize, 5, 32, 70] {
            let mut a = vec![0u8; len];
            let mut b = vec![0u8; len];
            assert_eq!(fill_incr_auto(&mut a, 250), scalar::fill_incr_scalar(&mut b, 250));
            assert_eq!(a, b);
            assert_eq!(fill_decr_auto(&mut a, 3), scalar::fill_decr_scalar(&mut b, 3));
            assert_eq!(a, b);
            fill_const_auto(&mut a, 9);
            scalar::fill_const_scalar(&mut b, 9);
            assert_eq!(a, b);
        }
    }

    #[test]
    fn test_unpack_matches_scalar() {
        let values: Vec<u32> = (0..200u32).map(|i| i.wrapping_mul(0x0101_0101)).collect();
        let masks = [0xffu32, 0x0f00];
        let mut a0 = vec![0u32; 256];
        let mut a1 = vec![0u32; 16];
        let mut b0 = vec![0u32; 256];
        let mut b1 = vec![0u32; 16];
        unpack_and_sum_auto(&values, &masks, &mut [&mut a0[..], &mut a1[..]]);
        scalar::unpack_and_sum_scalar(&values, &masks, &mut [&mut b0[..], &mut b1[..]]);
        assert_eq!(a0, b0);
        assert_eq!(a1, b1);
    }
}
