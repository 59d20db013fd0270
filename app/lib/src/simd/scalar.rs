//! Scalar implementations of every kernel family.
//!
//! These are the portable fallback and the baseline every other variant is
//! measured and tested against. Bulk work goes through 32-bit words on aligned
//! addresses; the 0-3 bytes before and after the aligned body are handled one
//! byte at a time in a way that produces the same bytes.

use crate::kernels::indexical;
use crate::kernels::prbs::{self, MIN_VERIFY_LEN};
use crate::kernels::signature::{self, Signature, TIMESTAMP_MASK};

/// Fill `buf` with PRBS23 continuing from `seed`; returns the next seed.
pub fn prbs_fill_scalar(buf: &mut [u8], mut seed: u32) -> u32 {
    // SAFETY: every bit pattern is a valid u32.
    let (head, body, tail) = unsafe { buf.align_to_mut::<u32>() };

    for b in head {
        seed = prbs::fill_byte(seed, b);
    }
    for w in body {
        seed = prbs::step32(seed);
        *w = (!seed).to_be();
    }
    for b in tail {
        seed = prbs::fill_byte(seed, b);
    }
    seed
}

/// Finish a fill whose first `filled` bytes (at least four) are already
/// written: the seed is recovered from them and the rest filled here.
pub(crate) fn prbs_resume(buf: &mut [u8], filled: usize) -> u32 {
    let mut last = [0u8; 4];
    last.copy_from_slice(&buf[filled - 4..filled]);
    prbs_fill_scalar(&mut buf[filled..], prbs::seed_from_tail(&last))
}

/// A verify buffer split around its aligned words, with the bootstrap seed.
pub(crate) struct VerifyParts<'a> {
    /// Seed taken from the bootstrap bytes.
    pub seed: u32,
    /// Aligned words still to be checked, as stored in memory.
    pub words: &'a [u32],
    /// Trailing bytes after the last aligned word.
    pub tail: &'a [u8],
}

/// Split a verify buffer and bootstrap its seed.
///
/// Three leading bytes carry 24 bits, enough to seed the generator, so every
/// aligned word gets checked. Otherwise the first aligned word seeds it and
/// the leading bytes are not checked.
pub(crate) fn verify_parts(buf: &[u8]) -> Option<VerifyParts<'_>> {
    if buf.len() < MIN_VERIFY_LEN {
        return None;
    }
    // SAFETY: every bit pattern is a valid u32.
    let (head, body, tail) = unsafe { buf.align_to::<u32>() };
    if body.is_empty() {
        return None;
    }

    let (seed, words) = if head.len() == 3 {
        let basis = u32::from_be_bytes([0, head[0], head[1], head[2]]);
        (!basis & 0x00ff_ffff, body)
    } else {
        (!u32::from_be(body[0]), &body[1..])
    };
    Some(VerifyParts { seed, words, tail })
}

/// Check stored words, re-seeding from each received word.
#[inline]
pub(crate) fn verify_words(mut seed: u32, words: &[u32], errors: &mut u32) -> u32 {
    for &w in words {
        let actual = !u32::from_be(w);
        *errors += (prbs::step32(seed) ^ actual).count_ones();
        seed = actual;
    }
    seed
}

/// Check trailing bytes one at a time.
#[inline]
pub(crate) fn verify_tail(mut seed: u32, tail: &[u8], errors: &mut u32) -> u32 {
    for &b in tail {
        seed = prbs::check_byte(seed, b, errors);
    }
    seed
}

/// Count PRBS23 bit errors in `buf`. Buffers under eight bytes report zero.
pub fn prbs_verify_scalar(buf: &[u8]) -> u32 {
    let Some(parts) = verify_parts(buf) else {
        return 0;
    };
    let mut errors = 0;
    let seed = verify_words(parts.seed, parts.words, &mut errors);
    verify_tail(seed, parts.tail, &mut errors);
    errors
}

/// Sum bytes as native-endian 16-bit words, padding an odd last byte with zero.
#[inline]
pub(crate) fn sum_bytes(bytes: &[u8]) -> u64 {
    let mut pairs = bytes.chunks_exact(2);
    let mut sum: u64 = pairs
        .by_ref()
        .map(|p| u16::from_ne_bytes([p[0], p[1]]) as u64)
        .sum();
    if let [last] = pairs.remainder() {
        sum += u16::from_ne_bytes([*last, 0]) as u64;
    }
    sum
}

/// Re-express a sum of data that started at an odd offset.
#[inline]
fn shifted(sum: u64, odd: bool) -> u64 {
    if odd {
        crate::kernels::checksum::fold(sum).swap_bytes() as u64
    } else {
        sum
    }
}

/// Raw ones'-complement sum of `buf`; fold with [`checksum::finish`].
///
/// [`checksum::finish`]: crate::kernels::checksum::finish
pub fn checksum_scalar(buf: &[u8]) -> u64 {
    // SAFETY: every bit pattern is a valid u32.
    let (head, body, tail) = unsafe { buf.align_to::<u32>() };
    let odd = head.len() % 2 == 1;

    let words: u64 = body.iter().map(|&w| w as u64).sum();
    sum_bytes(head) + shifted(words, odd) + shifted(sum_bytes(tail), odd)
}

/// Fill `buf` with `value`.
pub fn fill_const_scalar(buf: &mut [u8], value: u8) {
    // SAFETY: every bit pattern is a valid u32.
    let (head, body, tail) = unsafe { buf.align_to_mut::<u32>() };
    let word = u32::from_ne_bytes([value; 4]);
    head.fill(value);
    body.fill(word);
    tail.fill(value);
}

/// Fill `buf` with `value`, `value + step`, ... (mod 256); returns the next value.
pub(crate) fn fill_step_scalar(buf: &mut [u8], mut value: u8, step: u8) -> u8 {
    // SAFETY: every bit pattern is a valid u32.
    let (head, body, tail) = unsafe { buf.align_to_mut::<u32>() };

    for b in head {
        *b = value;
        value = value.wrapping_add(step);
    }
    for w in body {
        let b0 = value;
        let b1 = b0.wrapping_add(step);
        let b2 = b1.wrapping_add(step);
        let b3 = b2.wrapping_add(step);
        *w = u32::from_ne_bytes([b0, b1, b2, b3]);
        value = b3.wrapping_add(step);
    }
    for b in tail {
        *b = value;
        value = value.wrapping_add(step);
    }
    value
}

/// The first `N` bytes of a stepping fill, for seeding vector registers.
#[inline]
pub(crate) fn step_pattern<const N: usize>(value: u8, step: u8) -> [u8; N] {
    let mut pattern = [0u8; N];
    fill_step_scalar(&mut pattern, value, step);
    pattern
}

/// Incrementing fill.
pub fn fill_incr_scalar(buf: &mut [u8], value: u8) -> u8 {
    fill_step_scalar(buf, value, 1)
}

/// Decrementing fill.
pub fn fill_decr_scalar(buf: &mut [u8], value: u8) -> u8 {
    fill_step_scalar(buf, value, u8::MAX)
}

/// Write one signature per destination, timestamps counting up from `timestamp`.
pub fn signature_encode_scalar(
    dests: &mut [&mut [u8]],
    stream_ids: &[u32],
    sequences: &[u32],
    flags: u8,
    timestamp: u64,
) {
    for (i, dest) in dests.iter_mut().enumerate() {
        let ts = timestamp.wrapping_add(i as u64) & TIMESTAMP_MASK;
        Signature::new(stream_ids[i], sequences[i], ts, flags).encode_into(dest);
    }
}

/// Decode valid candidates into `out` compactly; returns how many were valid.
pub fn signature_decode_scalar(candidates: &[&[u8]], out: &mut [Signature]) -> usize {
    let mut found = 0;
    for candidate in candidates {
        if let Some(sig) = Signature::decode(candidate) {
            out[found] = sig;
            found += 1;
        }
    }
    found
}

/// CRC check only, one flag per candidate.
pub fn signature_crc_filter_scalar(candidates: &[&[u8]], valid: &mut [bool]) {
    for (candidate, ok) in candidates.iter().zip(valid.iter_mut()) {
        *ok = signature::crc_valid(candidate);
    }
}

/// Add every value to one histogram per mask.
pub fn unpack_and_sum_scalar(values: &[u32], masks: &[u32], counters: &mut [&mut [u32]]) {
    for &value in values {
        for (&mask, hist) in masks.iter().zip(counters.iter_mut()) {
            let slot = &mut hist[indexical::bucket(value, mask) as usize];
            *slot = slot.wrapping_add(1);
        }
    }
}
