//! AVX2 implementations for x86_64.
//!
//! AVX2 provides 256-bit integer vectors, so PRBS fill moves 32 bytes per
//! step using the 32-byte lag recurrence and verify checks eight words at a
//! time. Signatures are processed eight records at a time: one CRC register
//! per 32-bit lane, table lookups done with gathers.
//!
//! # Safety
//!
//! All functions in this module are unsafe and require AVX2 support.
//! The caller must verify that AVX2 is available before calling these functions.

use std::arch::x86_64::*;

use super::scalar;
use crate::kernels::indexical;
use crate::kernels::prbs::{LAG_32, SEED_MASK};
use crate::kernels::signature::{
    self, crc16_init, timestamp_high_byte, Signature, CRC16_TABLE_WIDE, SIGNATURE_LEN,
    TIMESTAMP_MASK,
};

const LANES: usize = 8;
const WIDTH: usize = 32;

/// Fill `buf` with PRBS23 from `seed`; returns the continuation seed.
///
/// # Safety
///
/// The caller must ensure that AVX2 is available on the current CPU.
#[target_feature(enable = "avx2")]
pub unsafe fn prbs_fill_avx2(buf: &mut [u8], seed: u32) -> u32 {
    let (near, far) = LAG_32;
    let len = buf.len();
    if len < far + WIDTH {
        return scalar::prbs_fill_scalar(buf, seed);
    }

    scalar::prbs_fill_scalar(&mut buf[..far], seed);
    let ones = _mm256_set1_epi8(-1);
    let ptr = buf.as_mut_ptr();
    let mut i = far;
    while i + WIDTH <= len {
        let a = _mm256_loadu_si256(ptr.add(i - near) as *const __m256i);
        let b = _mm256_loadu_si256(ptr.add(i - far) as *const __m256i);
        _mm256_storeu_si256(
            ptr.add(i) as *mut __m256i,
            _mm256_xor_si256(_mm256_xor_si256(a, b), ones),
        );
        i += WIDTH;
    }
    scalar::prbs_resume(buf, i)
}

#[inline]
#[target_feature(enable = "avx2")]
unsafe fn step32(seed: __m256i) -> __m256i {
    let s = _mm256_and_si256(seed, _mm256_set1_epi32(SEED_MASK as i32));
    let a = _mm256_xor_si256(_mm256_slli_epi32::<9>(s), _mm256_slli_epi32::<14>(s));
    let b = _mm256_and_si256(_mm256_srli_epi32::<4>(s), _mm256_set1_epi32(0x3fff));
    let c = _mm256_and_si256(_mm256_srli_epi32::<9>(s), _mm256_set1_epi32(0x3e00));
    let d = _mm256_srli_epi32::<14>(s);
    _mm256_xor_si256(_mm256_xor_si256(a, b), _mm256_xor_si256(c, d))
}

/// Received pattern bits of stored words: byte swap, then complement.
#[inline]
#[target_feature(enable = "avx2")]
unsafe fn received(raw: __m256i) -> __m256i {
    let swap = _mm256_setr_epi8(
        3, 2, 1, 0, 7, 6, 5, 4, 11, 10, 9, 8, 15, 14, 13, 12, //
        3, 2, 1, 0, 7, 6, 5, 4, 11, 10, 9, 8, 15, 14, 13, 12,
    );
    _mm256_xor_si256(_mm256_shuffle_epi8(raw, swap), _mm256_set1_epi32(-1))
}

/// Count PRBS23 bit errors in `buf`.
///
/// # Safety
///
/// The caller must ensure that AVX2 is available on the current CPU.
#[target_feature(enable = "avx2")]
pub unsafe fn prbs_verify_avx2(buf: &[u8]) -> u32 {
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
        let prev = received(_mm256_loadu_si256(ptr.add(i - 1) as *const __m256i));
        let cur = received(_mm256_loadu_si256(ptr.add(i) as *const __m256i));
        _mm256_storeu_si256(
            diffs.as_mut_ptr() as *mut __m256i,
            _mm256_xor_si256(step32(prev), cur),
        );
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
/// The caller must ensure that AVX2 is available on the current CPU.
#[target_feature(enable = "avx2")]
pub unsafe fn checksum_avx2(buf: &[u8]) -> u64 {
    let zero = _mm256_setzero_si256();
    let mut acc = zero;
    let mut chunks = buf.chunks_exact(WIDTH);
    for chunk in chunks.by_ref() {
        let v = _mm256_loadu_si256(chunk.as_ptr() as *const __m256i);
        acc = _mm256_add_epi64(acc, _mm256_unpacklo_epi32(v, zero));
        acc = _mm256_add_epi64(acc, _mm256_unpackhi_epi32(v, zero));
    }
    let mut lanes = [0u64; 4];
    _mm256_storeu_si256(lanes.as_mut_ptr() as *mut __m256i, acc);
    lanes.iter().sum::<u64>() + scalar::checksum_scalar(chunks.remainder())
}

#[inline]
#[target_feature(enable = "avx2")]
unsafe fn fill_step_avx2(buf: &mut [u8], value: u8, step: u8) -> u8 {
    let pattern = scalar::step_pattern::<WIDTH>(value, step);
    let mut v = _mm256_loadu_si256(pattern.as_ptr() as *const __m256i);
    let stride = _mm256_set1_epi8(step.wrapping_mul(WIDTH as u8) as i8);

    let mut blocks = buf.chunks_exact_mut(WIDTH);
    let mut written = 0usize;
    for block in blocks.by_ref() {
        _mm256_storeu_si256(block.as_mut_ptr() as *mut __m256i, v);
        v = _mm256_add_epi8(v, stride);
        written += WIDTH;
    }
    let next = value.wrapping_add(step.wrapping_mul(written as u8));
    scalar::fill_step_scalar(blocks.into_remainder(), next, step)
}

/// Incrementing fill; returns the next value.
///
/// # Safety
///
/// The caller must ensure that AVX2 is available on the current CPU.
#[target_feature(enable = "avx2")]
pub unsafe fn fill_incr_avx2(buf: &mut [u8], value: u8) -> u8 {
    fill_step_avx2(buf, value, 1)
}

/// Decrementing fill; returns the next value.
///
/// # Safety
///
/// The caller must ensure that AVX2 is available on the current CPU.
#[target_feature(enable = "avx2")]
pub unsafe fn fill_decr_avx2(buf: &mut [u8], value: u8) -> u8 {
    fill_step_avx2(buf, value, u8::MAX)
}

/// Feed the low byte of every lane of `byte` into the lane CRCs.
#[inline]
#[target_feature(enable = "avx2")]
unsafe fn crc_byte(crc: __m256i, byte: __m256i) -> __m256i {
    let index = _mm256_and_si256(
        _mm256_xor_si256(_mm256_srli_epi32::<8>(crc), byte),
        _mm256_set1_epi32(0xff),
    );
    let entry = _mm256_i32gather_epi32::<4>(CRC16_TABLE_WIDE.as_ptr() as *const i32, index);
    _mm256_and_si256(
        _mm256_xor_si256(_mm256_slli_epi32::<8>(crc), entry),
        _mm256_set1_epi32(0xffff),
    )
}

/// Feed one big-endian word per lane into the lane CRCs.
#[inline]
#[target_feature(enable = "avx2")]
unsafe fn crc_word(crc: __m256i, word: __m256i) -> __m256i {
    let crc = crc_byte(crc, _mm256_srli_epi32::<24>(word));
    let crc = crc_byte(crc, _mm256_srli_epi32::<16>(word));
    let crc = crc_byte(crc, _mm256_srli_epi32::<8>(word));
    crc_byte(crc, word)
}

/// CRCs of eight payloads given as four big-endian words per lane.
#[inline]
#[target_feature(enable = "avx2")]
unsafe fn crc8(words: &[[u32; LANES]; 4]) -> __m256i {
    let mut crc = _mm256_set1_epi32(crc16_init() as i32);
    for word in words {
        crc = crc_word(crc, _mm256_loadu_si256(word.as_ptr() as *const __m256i));
    }
    crc
}

/// Write one signature per destination, timestamps counting up from `timestamp`.
///
/// # Safety
///
/// The caller must ensure that AVX2 is available on the current CPU, that
/// `stream_ids` and `sequences` are as long as `dests`, and that every
/// destination holds at least [`SIGNATURE_LEN`] bytes.
#[target_feature(enable = "avx2")]
pub unsafe fn signature_encode_avx2(
    dests: &mut [&mut [u8]],
    stream_ids: &[u32],
    sequences: &[u32],
    flags: u8,
    timestamp: u64,
) {
    let mut i = 0;
    while i + LANES <= dests.len() {
        let mut words = [[0u32; LANES]; 4];
        let mut sigs = [Signature::default(); LANES];
        for (lane, sig) in sigs.iter_mut().enumerate() {
            let ts = timestamp.wrapping_add((i + lane) as u64) & TIMESTAMP_MASK;
            *sig = Signature::new(stream_ids[i + lane], sequences[i + lane], ts, flags);
            words[0][lane] = sig.stream_id;
            words[1][lane] = sig.sequence;
            words[2][lane] = sig.timestamp as u32;
            words[3][lane] = (timestamp_high_byte(sig.timestamp, sig.flags) as u32) << 24;
        }

        let mut crcs = [0u32; LANES];
        _mm256_storeu_si256(crcs.as_mut_ptr() as *mut __m256i, crc8(&words));

        for (lane, sig) in sigs.iter().enumerate() {
            let record = signature::finish_record(&sig.payload(), crcs[lane] as u16);
            dests[i + lane][..SIGNATURE_LEN].copy_from_slice(&record);
        }
        i += LANES;
    }

    scalar::signature_encode_scalar(
        &mut dests[i..],
        &stream_ids[i..],
        &sequences[i..],
        flags,
        timestamp.wrapping_add(i as u64),
    );
}

/// CRC-check eight candidates.
#[inline]
#[target_feature(enable = "avx2")]
unsafe fn crc_check8(block: &[&[u8]], valid: &mut [bool]) {
    let mut words = [[0u32; LANES]; 4];
    let mut stored = [0u32; LANES];
    let mut present = [false; LANES];

    for (lane, candidate) in block.iter().enumerate() {
        if candidate.len() < SIGNATURE_LEN {
            continue;
        }
        present[lane] = true;
        for (w, word) in words.iter_mut().enumerate() {
            let at = w * 4;
            word[lane] = u32::from_be_bytes([
                candidate[at],
                candidate[at + 1],
                candidate[at + 2],
                candidate[at + 3],
            ]);
        }
        stored[lane] = signature::stored_crc(candidate) as u32;
    }

    let expected = _mm256_loadu_si256(stored.as_ptr() as *const __m256i);
    let matches = _mm256_cmpeq_epi32(crc8(&words), expected);
    let bits = _mm256_movemask_ps(_mm256_castsi256_ps(matches));
    for (lane, ok) in valid.iter_mut().enumerate().take(LANES) {
        *ok = present[lane] && bits & (1 << lane) != 0;
    }
}

/// Decode valid candidates into `out` compactly; returns how many were valid.
///
/// # Safety
///
/// The caller must ensure that AVX2 is available on the current CPU and that
/// `out` is at least as long as `candidates`.
#[target_feature(enable = "avx2")]
pub unsafe fn signature_decode_avx2(candidates: &[&[u8]], out: &mut [Signature]) -> usize {
    let mut found = 0;
    let mut valid = [false; LANES];
    let mut blocks = candidates.chunks_exact(LANES);
    for block in blocks.by_ref() {
        crc_check8(block, &mut valid);
        for (candidate, _) in block.iter().zip(valid).filter(|(_, ok)| *ok) {
            out[found] = Signature::from_payload(candidate);
            found += 1;
        }
    }
    found + scalar::signature_decode_scalar(blocks.remainder(), &mut out[found..])
}

/// CRC check only, one flag per candidate.
///
/// # Safety
///
/// The caller must ensure that AVX2 is available on the current CPU and that
/// `valid` is at least as long as `candidates`.
#[target_feature(enable = "avx2")]
pub unsafe fn signature_crc_filter_avx2(candidates: &[&[u8]], valid: &mut [bool]) {
    let mut blocks = candidates.chunks_exact(LANES);
    let mut i = 0;
    for block in blocks.by_ref() {
        crc_check8(block, &mut valid[i..i + LANES]);
        i += LANES;
    }
    scalar::signature_crc_filter_scalar(blocks.remainder(), &mut valid[i..]);
}

/// Add every value to one histogram per mask.
///
/// # Safety
///
/// The caller must ensure that AVX2 is available on the current CPU and that
/// each counter array covers every bucket of its mask.
#[target_feature(enable = "avx2")]
pub unsafe fn unpack_and_sum_avx2(values: &[u32], masks: &[u32], counters: &mut [&mut [u32]]) {
    let mut buckets = [0u32; LANES];
    let mut chunks = values.chunks_exact(LANES);
    for chunk in chunks.by_ref() {
        let v = _mm256_loadu_si256(chunk.as_ptr() as *const __m256i);
        for (&mask, hist) in masks.iter().zip(counters.iter_mut()) {
            let shift = _mm_cvtsi32_si128(indexical::shift(mask) as i32);
            let fields = _mm256_and_si256(v, _mm256_set1_epi32(mask as i32));
            _mm256_storeu_si256(
                buckets.as_mut_ptr() as *mut __m256i,
                _mm256_srl_epi32(fields, shift),
            );
            for &bucket in &buckets {
                let slot = &mut hist[bucket as usize];
                *slot = slot.wrapping_add(1);
            }
        }
    }
    scalar::unpack_and_sum_scalar(chunks.remainder(), masks, counters);
}
