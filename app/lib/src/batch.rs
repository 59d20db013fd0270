//! Batch-oriented entry points.
//!
//! Every function here takes a batch of buffers (a slice of slices) plus
//! parallel per-buffer arrays, validates that the arrays agree, and runs the
//! resolved kernel of the matching family. Output arrays must be at least as
//! long as the batch; extra entries are left untouched.
//!
//! # Example
//!
//! ```rust
//! use pktgen_kernels::batch;
//!
//! batch::init();
//!
//! let mut a = vec![0u8; 64];
//! let mut b = vec![0u8; 100];
//! let seed = batch::fill_prbs(&mut [&mut a[..], &mut b[..]], 0x1234).unwrap();
//! assert_ne!(seed, 0);
//!
//! let mut errors = [0u32; 2];
//! let any = batch::verify_prbs(&[&a[..], &b[..]], &mut errors).unwrap();
//! assert!(!any);
//! ```

use std::io::Write;
use std::sync::Once;

use log::debug;

use crate::config::DispatchConfig;
use crate::error::{KernelError, Result};
use crate::kernels::checksum::{self, IPV4_HEADER_LEN};
use crate::kernels::families::{self, REGISTRY};
use crate::kernels::indexical;
use crate::kernels::signature::{Signature, SignatureFlags, SIGNATURE_LEN};
use crate::simd::FamilyReport;

/// Headers whose pseudo-header sums are computed together before their
/// transport payloads are summed.
pub const PSEUDO_HEADER_CHUNK: usize = 32;

static INIT: Once = Once::new();

/// Resolve every kernel family now instead of on first use.
///
/// Safe to call any number of times from any thread; only the first call
/// pays the benchmarking cost.
pub fn init() {
    INIT.call_once(|| {
        let config = DispatchConfig::global();
        for family in REGISTRY.iter() {
            let variant = family.resolve_variant(config);
            debug!("{}: resolved to {}", family.name(), variant);
        }
    });
}

/// Resolution summary of every family, resolving any that are still pending.
pub fn dispatch_report() -> Vec<FamilyReport> {
    let config = DispatchConfig::global();
    REGISTRY.iter().map(|family| family.report(config)).collect()
}

/// Write the chosen variant of every family to `out`, one `family: variant`
/// line each.
pub fn dump_info<W: Write>(out: &mut W) -> Result<()> {
    for report in dispatch_report() {
        match report.speedup_percent {
            Some(speedup) => writeln!(
                out,
                "{}: {} ({:+.1}% vs Scalar)",
                report.family, report.variant, speedup
            )?,
            None => writeln!(out, "{}: {}", report.family, report.variant)?,
        }
    }
    out.flush()?;
    Ok(())
}

fn check_len(what: &'static str, expected: usize, actual: usize) -> Result<()> {
    if actual < expected {
        return Err(KernelError::LengthMismatch {
            what,
            expected,
            actual,
        });
    }
    Ok(())
}

fn check_exact(what: &'static str, expected: usize, actual: usize) -> Result<()> {
    if actual != expected {
        return Err(KernelError::LengthMismatch {
            what,
            expected,
            actual,
        });
    }
    Ok(())
}

fn check_min_size<B: AsRef<[u8]>>(bufs: &[B], required: usize) -> Result<()> {
    for (index, buf) in bufs.iter().enumerate() {
        let len = buf.as_ref().len();
        if len < required {
            return Err(KernelError::BufferTooShort {
                index,
                len,
                required,
            });
        }
    }
    Ok(())
}

/// Fill every buffer with `value`.
pub fn fill_const(bufs: &mut [&mut [u8]], value: u8) {
    for buf in bufs.iter_mut() {
        families::fill_const(buf, value);
    }
}

/// Fill with an incrementing byte, continuing across buffers; returns the
/// value that would follow the last byte written.
pub fn fill_incr(bufs: &mut [&mut [u8]], value: u8) -> u8 {
    bufs.iter_mut()
        .fold(value, |next, buf| families::fill_incr(buf, next))
}

/// Fill with a decrementing byte, continuing across buffers; returns the
/// value that would follow the last byte written.
pub fn fill_decr(bufs: &mut [&mut [u8]], value: u8) -> u8 {
    bufs.iter_mut()
        .fold(value, |next, buf| families::fill_decr(buf, next))
}

/// Fill with PRBS23 starting from `seed`, continuing across buffers as if
/// they were contiguous; returns the continuation seed.
///
/// Never fails; the `Result` matches the other batch entry points.
pub fn fill_prbs(bufs: &mut [&mut [u8]], seed: u32) -> Result<u32> {
    Ok(bufs
        .iter_mut()
        .fold(seed, |next, buf| families::prbs_fill(buf, next)))
}

/// Count PRBS23 bit errors per buffer into `bit_errors`.
///
/// Each buffer is checked independently and self-synchronizes on its first
/// bytes. Buffers under 8 bytes report zero errors. Returns whether any
/// buffer had errors.
pub fn verify_prbs(bufs: &[&[u8]], bit_errors: &mut [u32]) -> Result<bool> {
    check_len("bit_errors", bufs.len(), bit_errors.len())?;
    let mut any = false;
    for (buf, errors) in bufs.iter().zip(bit_errors.iter_mut()) {
        *errors = families::prbs_verify(buf);
        any |= *errors != 0;
    }
    Ok(any)
}

/// IPv4 header checksum of each header, as a host integer to be stored with
/// `to_be_bytes`.
///
/// The checksum field is summed as stored, so a header with a correct
/// checksum yields `0xffff`.
pub fn ipv4_header_checksums(headers: &[&[u8]], out: &mut [u16]) -> Result<()> {
    check_len("checksums", headers.len(), out.len())?;
    check_min_size(headers, IPV4_HEADER_LEN)?;
    for (header, csum) in headers.iter().zip(out.iter_mut()) {
        *csum = checksum::ipv4_header(header);
    }
    Ok(())
}

/// TCP/UDP checksum of each IPv4 packet: pseudo-header plus transport bytes
/// `[ihl * 4 .. total_length)`, clamped to the buffer.
pub fn ipv4_tcpudp_checksums(packets: &[&[u8]], out: &mut [u16]) -> Result<()> {
    check_len("checksums", packets.len(), out.len())?;
    check_min_size(packets, IPV4_HEADER_LEN)?;
    for (index, packet) in packets.iter().enumerate() {
        let required = checksum::header_len(packet);
        if packet.len() < required {
            return Err(KernelError::BufferTooShort {
                index,
                len: packet.len(),
                required,
            });
        }
    }

    let mut pseudo = [(0u64, 0usize); PSEUDO_HEADER_CHUNK];
    for (packets, out) in packets
        .chunks(PSEUDO_HEADER_CHUNK)
        .zip(out.chunks_mut(PSEUDO_HEADER_CHUNK))
    {
        for (slot, packet) in pseudo.iter_mut().zip(packets.iter()) {
            *slot = checksum::pseudo_header_sum(packet);
        }
        for ((packet, &(sum, transport_len)), csum) in
            packets.iter().zip(pseudo.iter()).zip(out.iter_mut())
        {
            let start = checksum::header_len(packet);
            let end = (start + transport_len).min(packet.len());
            *csum = checksum::finish(sum + families::checksum(&packet[start..end]));
        }
    }
    Ok(())
}

/// Write one signature per destination.
///
/// Destination `i` gets `stream_ids[i]`, `sequences[i]` and timestamp
/// `timestamp + i` (wrapping at 38 bits). Only the two stored bits of
/// `flags` are encoded.
pub fn encode_signatures(
    dests: &mut [&mut [u8]],
    stream_ids: &[u32],
    sequences: &[u32],
    flags: u8,
    timestamp: u64,
) -> Result<()> {
    check_exact("stream_ids", dests.len(), stream_ids.len())?;
    check_exact("sequences", dests.len(), sequences.len())?;
    check_min_size(dests, SIGNATURE_LEN)?;
    families::signature_encode(dests, stream_ids, sequences, flags, timestamp);
    Ok(())
}

/// Decode every candidate whose CRC validates, compactly and in order, into
/// `out`. Returns how many were accepted.
pub fn decode_signatures(candidates: &[&[u8]], out: &mut [Signature]) -> Result<usize> {
    check_len("signatures", candidates.len(), out.len())?;
    Ok(families::signature_decode(candidates, out))
}

/// Mark which candidates carry a valid signature CRC.
pub fn signature_crc_filter(candidates: &[&[u8]], valid: &mut [bool]) -> Result<()> {
    check_len("valid", candidates.len(), valid.len())?;
    families::signature_crc_filter(candidates, valid);
    Ok(())
}

/// Pack decoded flags into the flags byte.
pub fn pack_signature_flags(flags: SignatureFlags) -> u8 {
    flags.pack()
}

/// Unpack a flags byte.
pub fn unpack_signature_flags(flags: u8) -> SignatureFlags {
    SignatureFlags::unpack(flags)
}

/// Add every value to one histogram per mask.
///
/// `counters[m]` must hold [`indexical::bucket_count`]`(masks[m])` buckets.
/// Counters are incremented, not reset, and wrap at `u32::MAX`.
pub fn unpack_and_sum_indexicals(
    values: &[u32],
    masks: &[u32],
    counters: &mut [&mut [u32]],
) -> Result<()> {
    check_exact("counters", masks.len(), counters.len())?;
    for (mask_index, (&mask, counter)) in masks.iter().zip(counters.iter()).enumerate() {
        let required = indexical::bucket_count(mask);
        if counter.len() < required {
            return Err(KernelError::CounterTooSmall {
                mask_index,
                len: counter.len(),
                required,
            });
        }
    }
    families::unpack_and_sum(values, masks, counters);
    Ok(())
}
