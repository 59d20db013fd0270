//! The process-wide kernel families.
//!
//! Each family is a lazily resolved static. Entry point types are `unsafe fn`
//! because non-scalar candidates require CPU features; a family only hands out
//! entries that passed the capability check, which is what makes the safe
//! wrappers at the bottom of this file sound.

use std::time::Duration;

use crate::kernels::indexical;
use crate::kernels::signature::{Signature, SIGNATURE_LEN};
use crate::simd::bench;
use crate::simd::dispatcher::{FamilyResolver, KernelFamily};
use crate::simd::Variant;

#[cfg(all(feature = "avx512", target_arch = "x86_64"))]
use crate::simd::avx512;
#[cfg(all(feature = "simd", target_arch = "aarch64"))]
use crate::simd::neon;
#[cfg(all(feature = "simd", target_arch = "x86_64"))]
use crate::simd::{avx, avx2, sse2, sse4};
use crate::simd::{auto, scalar};

/// PRBS fill: buffer, seed in, seed out.
pub type PrbsFillFn = unsafe fn(&mut [u8], u32) -> u32;
/// PRBS verify: bit errors in a buffer.
pub type PrbsVerifyFn = unsafe fn(&[u8]) -> u32;
/// Raw ones'-complement sum of a buffer.
pub type ChecksumFn = unsafe fn(&[u8]) -> u64;
/// Constant fill.
pub type FillConstFn = unsafe fn(&mut [u8], u8);
/// Stepping fill: buffer, first value, next value out.
pub type FillStepFn = unsafe fn(&mut [u8], u8) -> u8;
/// Signature encode: destinations, stream ids, sequence numbers, flags, base timestamp.
pub type SignatureEncodeFn = unsafe fn(&mut [&mut [u8]], &[u32], &[u32], u8, u64);
/// Signature decode: candidates, compact output; returns the number decoded.
pub type SignatureDecodeFn = unsafe fn(&[&[u8]], &mut [Signature]) -> usize;
/// Signature CRC filter: candidates, one flag each.
pub type SignatureFilterFn = unsafe fn(&[&[u8]], &mut [bool]);
/// Indexical histograms: values, masks, one counter array per mask.
pub type UnpackFn = unsafe fn(&[u32], &[u32], &mut [&mut [u32]]);

const BENCH_BUFFER_LEN: usize = 4096;
const BENCH_SIGNATURES: usize = 64;
const BENCH_INDEXICALS: usize = 256;
const BENCH_MASKS: [u32; 4] = [0x0000_000f, 0x0000_0ff0, 0x00ff_0000, 0xc000_0000];

const PRBS_FILL_CANDIDATES: &[(Variant, PrbsFillFn)] = &[
    (Variant::Scalar, scalar::prbs_fill_scalar as PrbsFillFn),
    (Variant::Auto, auto::prbs_fill_auto as PrbsFillFn),
    #[cfg(all(feature = "simd", target_arch = "x86_64"))]
    (Variant::Sse2, sse2::prbs_fill_sse2 as PrbsFillFn),
    #[cfg(all(feature = "simd", target_arch = "x86_64"))]
    (Variant::Avx2, avx2::prbs_fill_avx2 as PrbsFillFn),
    #[cfg(all(feature = "avx512", target_arch = "x86_64"))]
    (Variant::Avx512, avx512::prbs_fill_avx512 as PrbsFillFn),
    #[cfg(all(feature = "simd", target_arch = "aarch64"))]
    (Variant::Neon, neon::prbs_fill_neon as PrbsFillFn),
];

const PRBS_VERIFY_CANDIDATES: &[(Variant, PrbsVerifyFn)] = &[
    (Variant::Scalar, scalar::prbs_verify_scalar as PrbsVerifyFn),
    #[cfg(all(feature = "simd", target_arch = "x86_64"))]
    (Variant::Sse2, sse2::prbs_verify_sse2 as PrbsVerifyFn),
    #[cfg(all(feature = "simd", target_arch = "x86_64"))]
    (Variant::Avx2, avx2::prbs_verify_avx2 as PrbsVerifyFn),
    #[cfg(all(feature = "avx512", target_arch = "x86_64"))]
    (Variant::Avx512, avx512::prbs_verify_avx512 as PrbsVerifyFn),
    #[cfg(all(feature = "simd", target_arch = "aarch64"))]
    (Variant::Neon, neon::prbs_verify_neon as PrbsVerifyFn),
];

const CHECKSUM_CANDIDATES: &[(Variant, ChecksumFn)] = &[
    (Variant::Scalar, scalar::checksum_scalar as ChecksumFn),
    (Variant::Auto, auto::checksum_auto as ChecksumFn),
    #[cfg(all(feature = "simd", target_arch = "x86_64"))]
    (Variant::Sse2, sse2::checksum_sse2 as ChecksumFn),
    #[cfg(all(feature = "simd", target_arch = "x86_64"))]
    (Variant::Sse4, sse4::checksum_sse4 as ChecksumFn),
    #[cfg(all(feature = "simd", target_arch = "x86_64"))]
    (Variant::Avx2, avx2::checksum_avx2 as ChecksumFn),
    #[cfg(all(feature = "avx512", target_arch = "x86_64"))]
    (Variant::Avx512, avx512::checksum_avx512 as ChecksumFn),
    #[cfg(all(feature = "simd", target_arch = "aarch64"))]
    (Variant::Neon, neon::checksum_neon as ChecksumFn),
];

const FILL_CONST_CANDIDATES: &[(Variant, FillConstFn)] = &[
    (Variant::Scalar, scalar::fill_const_scalar as FillConstFn),
    (Variant::Auto, auto::fill_const_auto as FillConstFn),
    #[cfg(all(feature = "simd", target_arch = "x86_64"))]
    (Variant::Sse2, sse2::fill_const_sse2 as FillConstFn),
    #[cfg(all(feature = "simd", target_arch = "x86_64"))]
    (Variant::Avx, avx::fill_const_avx as FillConstFn),
    #[cfg(all(feature = "avx512", target_arch = "x86_64"))]
    (Variant::Avx512, avx512::fill_const_avx512 as FillConstFn),
    #[cfg(all(feature = "simd", target_arch = "aarch64"))]
    (Variant::Neon, neon::fill_const_neon as FillConstFn),
];

const FILL_INCR_CANDIDATES: &[(Variant, FillStepFn)] = &[
    (Variant::Scalar, scalar::fill_incr_scalar as FillStepFn),
    (Variant::Auto, auto::fill_incr_auto as FillStepFn),
    #[cfg(all(feature = "simd", target_arch = "x86_64"))]
    (Variant::Sse2, sse2::fill_incr_sse2 as FillStepFn),
    #[cfg(all(feature = "simd", target_arch = "x86_64"))]
    (Variant::Avx2, avx2::fill_incr_avx2 as FillStepFn),
    #[cfg(all(feature = "simd", target_arch = "aarch64"))]
    (Variant::Neon, neon::fill_incr_neon as FillStepFn),
];

const FILL_DECR_CANDIDATES: &[(Variant, FillStepFn)] = &[
    (Variant::Scalar, scalar::fill_decr_scalar as FillStepFn),
    (Variant::Auto, auto::fill_decr_auto as FillStepFn),
    #[cfg(all(feature = "simd", target_arch = "x86_64"))]
    (Variant::Sse2, sse2::fill_decr_sse2 as FillStepFn),
    #[cfg(all(feature = "simd", target_arch = "x86_64"))]
    (Variant::Avx2, avx2::fill_decr_avx2 as FillStepFn),
    #[cfg(all(feature = "simd", target_arch = "aarch64"))]
    (Variant::Neon, neon::fill_decr_neon as FillStepFn),
];

const SIGNATURE_ENCODE_CANDIDATES: &[(Variant, SignatureEncodeFn)] = &[
    (Variant::Scalar, scalar::signature_encode_scalar as SignatureEncodeFn),
    #[cfg(all(feature = "simd", target_arch = "x86_64"))]
    (Variant::Avx2, avx2::signature_encode_avx2 as SignatureEncodeFn),
];

const SIGNATURE_DECODE_CANDIDATES: &[(Variant, SignatureDecodeFn)] = &[
    (Variant::Scalar, scalar::signature_decode_scalar as SignatureDecodeFn),
    #[cfg(all(feature = "simd", target_arch = "x86_64"))]
    (Variant::Avx2, avx2::signature_decode_avx2 as SignatureDecodeFn),
];

const SIGNATURE_FILTER_CANDIDATES: &[(Variant, SignatureFilterFn)] = &[
    (Variant::Scalar, scalar::signature_crc_filter_scalar as SignatureFilterFn),
    #[cfg(all(feature = "simd", target_arch = "x86_64"))]
    (Variant::Avx2, avx2::signature_crc_filter_avx2 as SignatureFilterFn),
];

const UNPACK_CANDIDATES: &[(Variant, UnpackFn)] = &[
    (Variant::Scalar, scalar::unpack_and_sum_scalar as UnpackFn),
    (Variant::Auto, auto::unpack_and_sum_auto as UnpackFn),
    #[cfg(all(feature = "simd", target_arch = "x86_64"))]
    (Variant::Avx2, avx2::unpack_and_sum_avx2 as UnpackFn),
];

/// PRBS23 fill.
pub static PRBS_FILL: KernelFamily<PrbsFillFn> =
    KernelFamily::new("prbs_fill", PRBS_FILL_CANDIDATES, bench_prbs_fill);

/// PRBS23 verify.
pub static PRBS_VERIFY: KernelFamily<PrbsVerifyFn> =
    KernelFamily::new("prbs_verify", PRBS_VERIFY_CANDIDATES, bench_prbs_verify);

/// Raw Internet checksum sum.
pub static CHECKSUM: KernelFamily<ChecksumFn> =
    KernelFamily::new("checksum", CHECKSUM_CANDIDATES, bench_checksum);

/// Constant fill.
pub static FILL_CONST: KernelFamily<FillConstFn> =
    KernelFamily::new("fill_const", FILL_CONST_CANDIDATES, bench_fill_const);

/// Incrementing fill.
pub static FILL_INCR: KernelFamily<FillStepFn> =
    KernelFamily::new("fill_incr", FILL_INCR_CANDIDATES, bench_fill_step);

/// Decrementing fill.
pub static FILL_DECR: KernelFamily<FillStepFn> =
    KernelFamily::new("fill_decr", FILL_DECR_CANDIDATES, bench_fill_step);

/// Signature encode.
pub static SIGNATURE_ENCODE: KernelFamily<SignatureEncodeFn> = KernelFamily::new(
    "signature_encode",
    SIGNATURE_ENCODE_CANDIDATES,
    bench_signature_encode,
);

/// Signature decode.
pub static SIGNATURE_DECODE: KernelFamily<SignatureDecodeFn> = KernelFamily::new(
    "signature_decode",
    SIGNATURE_DECODE_CANDIDATES,
    bench_signature_decode,
);

/// Signature CRC filter.
pub static SIGNATURE_CRC_FILTER: KernelFamily<SignatureFilterFn> = KernelFamily::new(
    "signature_crc_filter",
    SIGNATURE_FILTER_CANDIDATES,
    bench_signature_filter,
);

/// Indexical histogram accumulation.
pub static UNPACK_AND_SUM: KernelFamily<UnpackFn> =
    KernelFamily::new("unpack_and_sum", UNPACK_CANDIDATES, bench_unpack);

/// Every family, in the order they are resolved and reported.
pub static REGISTRY: [&dyn FamilyResolver; 10] = [
    &PRBS_FILL,
    &PRBS_VERIFY,
    &CHECKSUM,
    &FILL_CONST,
    &FILL_INCR,
    &FILL_DECR,
    &SIGNATURE_ENCODE,
    &SIGNATURE_DECODE,
    &SIGNATURE_CRC_FILTER,
    &UNPACK_AND_SUM,
];

// Workloads. Each builds its inputs once and times only the kernel call.
// Every entry handed to a workload has passed the family's capability check.

fn bench_prbs_fill(f: PrbsFillFn) -> Duration {
    let mut buf = vec![0u8; BENCH_BUFFER_LEN];
    bench::measure(|| unsafe { f(&mut buf, 0x5a5a_5a5a) })
}

fn bench_prbs_verify(f: PrbsVerifyFn) -> Duration {
    let mut buf = vec![0u8; BENCH_BUFFER_LEN];
    scalar::prbs_fill_scalar(&mut buf, 0x5a5a_5a5a);
    bench::measure(|| unsafe { f(&buf) })
}

fn bench_checksum(f: ChecksumFn) -> Duration {
    let buf: Vec<u8> = (0..BENCH_BUFFER_LEN).map(|i| i as u8).collect();
    bench::measure(|| unsafe { f(&buf) })
}

fn bench_fill_const(f: FillConstFn) -> Duration {
    let mut buf = vec![0u8; BENCH_BUFFER_LEN];
    bench::measure(|| unsafe { f(&mut buf, 0xa5) })
}

fn bench_fill_step(f: FillStepFn) -> Duration {
    let mut buf = vec![0u8; BENCH_BUFFER_LEN];
    bench::measure(|| unsafe { f(&mut buf, 0x11) })
}

fn bench_signature_encode(f: SignatureEncodeFn) -> Duration {
    let mut storage = vec![[0u8; SIGNATURE_LEN]; BENCH_SIGNATURES];
    let mut dests: Vec<&mut [u8]> = storage.iter_mut().map(|r| &mut r[..]).collect();
    let stream_ids: Vec<u32> = (0..BENCH_SIGNATURES as u32).map(|i| i % 8).collect();
    let sequences: Vec<u32> = (0..BENCH_SIGNATURES as u32).collect();
    bench::measure(|| unsafe { f(&mut dests, &stream_ids, &sequences, 0, 1_000) })
}

fn encoded_signatures() -> Vec<[u8; SIGNATURE_LEN]> {
    (0..BENCH_SIGNATURES as u32)
        .map(|i| Signature::new(i % 8, i, 1_000 + i as u64, 0).to_bytes())
        .collect()
}

fn bench_signature_decode(f: SignatureDecodeFn) -> Duration {
    let storage = encoded_signatures();
    let candidates: Vec<&[u8]> = storage.iter().map(|r| &r[..]).collect();
    let mut out = vec![Signature::default(); BENCH_SIGNATURES];
    bench::measure(|| unsafe { f(&candidates, &mut out) })
}

fn bench_signature_filter(f: SignatureFilterFn) -> Duration {
    let storage = encoded_signatures();
    let candidates: Vec<&[u8]> = storage.iter().map(|r| &r[..]).collect();
    let mut valid = vec![false; BENCH_SIGNATURES];
    bench::measure(|| unsafe { f(&candidates, &mut valid) })
}

fn bench_unpack(f: UnpackFn) -> Duration {
    let values: Vec<u32> = (0..BENCH_INDEXICALS as u32)
        .map(|i| i.wrapping_mul(0x9e37_79b9))
        .collect();
    let mut storage: Vec<Vec<u32>> = BENCH_MASKS
        .iter()
        .map(|&m| vec![0u32; indexical::bucket_count(m)])
        .collect();
    let mut counters: Vec<&mut [u32]> = storage.iter_mut().map(|c| &mut c[..]).collect();
    bench::measure(|| unsafe { f(&values, &BENCH_MASKS, &mut counters) })
}

// Safe entry points. A family's `get()` only returns entries whose variant is
// compiled in and supported by this CPU.

/// Fill `buf` with PRBS23 from `seed`; returns the continuation seed.
#[inline]
pub fn prbs_fill(buf: &mut [u8], seed: u32) -> u32 {
    unsafe { (PRBS_FILL.get())(buf, seed) }
}

/// Count PRBS23 bit errors in `buf`.
#[inline]
pub fn prbs_verify(buf: &[u8]) -> u32 {
    unsafe { (PRBS_VERIFY.get())(buf) }
}

/// Raw ones'-complement sum of `buf`.
#[inline]
pub fn checksum(buf: &[u8]) -> u64 {
    unsafe { (CHECKSUM.get())(buf) }
}

/// Fill `buf` with `value`.
#[inline]
pub fn fill_const(buf: &mut [u8], value: u8) {
    unsafe { (FILL_CONST.get())(buf, value) }
}

/// Incrementing fill; returns the next value.
#[inline]
pub fn fill_incr(buf: &mut [u8], value: u8) -> u8 {
    unsafe { (FILL_INCR.get())(buf, value) }
}

/// Decrementing fill; returns the next value.
#[inline]
pub fn fill_decr(buf: &mut [u8], value: u8) -> u8 {
    unsafe { (FILL_DECR.get())(buf, value) }
}

/// Encode signatures. Every slice must have the length of `dests`, and every
/// destination must hold at least [`SIGNATURE_LEN`] bytes.
pub(crate) fn signature_encode(
    dests: &mut [&mut [u8]],
    stream_ids: &[u32],
    sequences: &[u32],
    flags: u8,
    timestamp: u64,
) {
    debug_assert!(stream_ids.len() == dests.len() && sequences.len() == dests.len());
    unsafe { (SIGNATURE_ENCODE.get())(dests, stream_ids, sequences, flags, timestamp) }
}

/// Decode signatures. `out` must be at least as long as `candidates`.
pub(crate) fn signature_decode(candidates: &[&[u8]], out: &mut [Signature]) -> usize {
    debug_assert!(out.len() >= candidates.len());
    unsafe { (SIGNATURE_DECODE.get())(candidates, out) }
}

/// CRC-check signatures. `valid` must be at least as long as `candidates`.
pub(crate) fn signature_crc_filter(candidates: &[&[u8]], valid: &mut [bool]) {
    debug_assert!(valid.len() >= candidates.len());
    unsafe { (SIGNATURE_CRC_FILTER.get())(candidates, valid) }
}

/// Accumulate histograms. `counters` must pair with `masks` and each array
/// must hold [`indexical::bucket_count`] entries for its mask.
pub(crate) fn unpack_and_sum(values: &[u32], masks: &[u32], counters: &mut [&mut [u32]]) {
    debug_assert!(counters.len() == masks.len());
    unsafe { (UNPACK_AND_SUM.get())(values, masks, counters) }
}
