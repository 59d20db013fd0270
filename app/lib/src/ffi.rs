//! C FFI bindings for the packet kernel library.
//!
//! This module exposes the [`batch`](crate::batch) facade to C and other
//! languages with C FFI support. Batches are passed the way packet pipelines
//! hold them: an array of buffer pointers, a parallel array of lengths, and a
//! count.
//!
//! # Error Handling
//!
//! Functions returning `c_int` return a negative value on error. Use
//! `pktgen_get_last_error()` to retrieve the error message. Panics never
//! cross the boundary.
//!
//! # Thread Safety
//!
//! Every function may be called from any thread. The last error is shared by
//! all threads.
//!
//! # Example (C)
//!
//! ```c
//! #include "pktgen_kernels.h"
//! #include <stdio.h>
//!
//! int main() {
//!     pktgen_init();
//!
//!     uint8_t a[256], b[256];
//!     uint8_t* bufs[2] = { a, b };
//!     size_t lens[2] = { sizeof(a), sizeof(b) };
//!     uint32_t seed;
//!     pktgen_fill_prbs(bufs, lens, 2, 0x1234, &seed);
//!
//!     uint32_t errors[2];
//!     if (pktgen_verify_prbs((const uint8_t**)bufs, lens, 2, errors) < 0) {
//!         char error[256];
//!         pktgen_get_last_error(error, sizeof(error));
//!         fprintf(stderr, "verify failed: %s\n", error);
//!         return 1;
//!     }
//!     return 0;
//! }
//! ```

use std::os::raw::{c_char, c_int};
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::slice;

use parking_lot::Mutex;

use crate::batch;
use crate::kernels::signature::{Signature, SignatureFlags, TimestampPosition};

/// Last error message, shared by all threads.
static LAST_ERROR: Mutex<Option<String>> = Mutex::new(None);

/// Set the last error message.
fn set_last_error(error: String) {
    *LAST_ERROR.lock() = Some(error);
}

/// Clear the last error message.
fn clear_last_error() {
    *LAST_ERROR.lock() = None;
}

/// Run `f`, recording its error or panic and returning `fallback` instead.
fn guarded<T>(fallback: T, f: impl FnOnce() -> Result<T, String>) -> T {
    clear_last_error();
    match catch_unwind(AssertUnwindSafe(f)) {
        Ok(Ok(value)) => value,
        Ok(Err(error)) => {
            set_last_error(error);
            fallback
        }
        Err(e) => {
            set_last_error(format!("Panic in kernel call: {:?}", e));
            fallback
        }
    }
}

/// View a C array; null is accepted only when `count` is zero.
unsafe fn array<'a, T>(ptr: *const T, count: usize, what: &str) -> Result<&'a [T], String> {
    if count == 0 {
        return Ok(&[]);
    }
    if ptr.is_null() {
        return Err(format!("{} is null", what));
    }
    Ok(slice::from_raw_parts(ptr, count))
}

unsafe fn array_mut<'a, T>(ptr: *mut T, count: usize, what: &str) -> Result<&'a mut [T], String> {
    if count == 0 {
        return Ok(&mut []);
    }
    if ptr.is_null() {
        return Err(format!("{} is null", what));
    }
    Ok(slice::from_raw_parts_mut(ptr, count))
}

/// Gather a batch of read-only buffers.
unsafe fn buffers<'a>(
    ptrs: *const *const u8,
    lens: *const usize,
    count: usize,
) -> Result<Vec<&'a [u8]>, String> {
    let ptrs = array(ptrs, count, "buffer array")?;
    let lens = array(lens, count, "length array")?;
    ptrs.iter()
        .zip(lens)
        .map(|(&ptr, &len)| array(ptr, len, "buffer"))
        .collect()
}

/// Gather a batch of writable buffers. The buffers must not overlap.
unsafe fn buffers_mut<'a>(
    ptrs: *const *mut u8,
    lens: *const usize,
    count: usize,
) -> Result<Vec<&'a mut [u8]>, String> {
    let ptrs = array(ptrs, count, "buffer array")?;
    let lens = array(lens, count, "length array")?;
    ptrs.iter()
        .zip(lens)
        .map(|(&ptr, &len)| array_mut(ptr, len, "buffer"))
        .collect()
}

/// Copy `text` into a C buffer, truncating and null-terminating.
///
/// Returns the untruncated length including the terminator.
unsafe fn copy_out(text: &str, buffer: *mut c_char, buffer_len: usize) -> c_int {
    let bytes = text.as_bytes();
    if !buffer.is_null() && buffer_len > 0 {
        let copy_len = std::cmp::min(bytes.len(), buffer_len - 1);
        std::ptr::copy_nonoverlapping(bytes.as_ptr(), buffer as *mut u8, copy_len);
        *buffer.add(copy_len) = 0;
    }
    (bytes.len() + 1) as c_int
}

/// Resolve every kernel family now.
///
/// Idempotent and thread-safe. Returns 0, or -1 if resolution panicked.
#[no_mangle]
pub extern "C" fn pktgen_init() -> c_int {
    guarded(-1, || {
        batch::init();
        Ok(0)
    })
}

/// Write the chosen variant of every kernel family, one `family: variant`
/// line each, into `buffer`.
///
/// Returns the length of the full text including the null terminator; if it
/// exceeds `buffer_len` the text is truncated. Returns -1 on error.
///
/// # Safety
///
/// * `buffer` must be null or point to at least `buffer_len` writable bytes
#[no_mangle]
pub unsafe extern "C" fn pktgen_dump_info(buffer: *mut c_char, buffer_len: usize) -> c_int {
    guarded(-1, || {
        let mut text = Vec::new();
        batch::dump_info(&mut text).map_err(|e| e.to_string())?;
        let text = String::from_utf8(text).map_err(|e| e.to_string())?;
        Ok(copy_out(&text, buffer, buffer_len))
    })
}

/// Fill every buffer with `value`. Returns 0, or -1 on error.
///
/// # Safety
///
/// * `bufs` and `lens` must point to `count` entries
/// * each `bufs[i]` must point to `lens[i]` writable bytes, without overlap
#[no_mangle]
pub unsafe extern "C" fn pktgen_fill_const(
    bufs: *const *mut u8,
    lens: *const usize,
    count: usize,
    value: u8,
) -> c_int {
    guarded(-1, || {
        let mut bufs = buffers_mut(bufs, lens, count)?;
        batch::fill_const(&mut bufs, value);
        Ok(0)
    })
}

/// Incrementing fill, continuing across buffers.
///
/// Returns the value following the last byte written, or -1 on error.
///
/// # Safety
///
/// Same requirements as `pktgen_fill_const()`.
#[no_mangle]
pub unsafe extern "C" fn pktgen_fill_incr(
    bufs: *const *mut u8,
    lens: *const usize,
    count: usize,
    value: u8,
) -> c_int {
    guarded(-1, || {
        let mut bufs = buffers_mut(bufs, lens, count)?;
        Ok(batch::fill_incr(&mut bufs, value) as c_int)
    })
}

/// Decrementing fill, continuing across buffers.
///
/// Returns the value following the last byte written, or -1 on error.
///
/// # Safety
///
/// Same requirements as `pktgen_fill_const()`.
#[no_mangle]
pub unsafe extern "C" fn pktgen_fill_decr(
    bufs: *const *mut u8,
    lens: *const usize,
    count: usize,
    value: u8,
) -> c_int {
    guarded(-1, || {
        let mut bufs = buffers_mut(bufs, lens, count)?;
        Ok(batch::fill_decr(&mut bufs, value) as c_int)
    })
}

/// PRBS23 fill, continuing across buffers. The continuation seed is written
/// to `next_seed` when it is not null.
///
/// Returns 0, or -1 on error.
///
/// # Safety
///
/// Same requirements as `pktgen_fill_const()`; `next_seed` must be null or
/// valid for a write.
#[no_mangle]
pub unsafe extern "C" fn pktgen_fill_prbs(
    bufs: *const *mut u8,
    lens: *const usize,
    count: usize,
    seed: u32,
    next_seed: *mut u32,
) -> c_int {
    guarded(-1, || {
        let mut bufs = buffers_mut(bufs, lens, count)?;
        let seed = batch::fill_prbs(&mut bufs, seed).map_err(|e| e.to_string())?;
        if !next_seed.is_null() {
            *next_seed = seed;
        }
        Ok(0)
    })
}

/// Count PRBS23 bit errors per buffer into `bit_errors`.
///
/// Returns 1 if any buffer had errors, 0 if none did, -1 on error.
///
/// # Safety
///
/// * `bufs` and `lens` must point to `count` entries
/// * each `bufs[i]` must point to `lens[i]` readable bytes
/// * `bit_errors` must point to `count` writable entries
#[no_mangle]
pub unsafe extern "C" fn pktgen_verify_prbs(
    bufs: *const *const u8,
    lens: *const usize,
    count: usize,
    bit_errors: *mut u32,
) -> c_int {
    guarded(-1, || {
        let bufs = buffers(bufs, lens, count)?;
        let bit_errors = array_mut(bit_errors, count, "bit error array")?;
        let any = batch::verify_prbs(&bufs, bit_errors).map_err(|e| e.to_string())?;
        Ok(any as c_int)
    })
}

/// IPv4 header checksums, written to `out` in host order.
///
/// Returns 0, or -1 on error.
///
/// # Safety
///
/// * `headers` and `lens` must point to `count` entries
/// * each `headers[i]` must point to `lens[i]` readable bytes
/// * `out` must point to `count` writable entries
#[no_mangle]
pub unsafe extern "C" fn pktgen_checksum_ipv4_headers(
    headers: *const *const u8,
    lens: *const usize,
    count: usize,
    out: *mut u16,
) -> c_int {
    guarded(-1, || {
        let headers = buffers(headers, lens, count)?;
        let out = array_mut(out, count, "checksum array")?;
        batch::ipv4_header_checksums(&headers, out).map_err(|e| e.to_string())?;
        Ok(0)
    })
}

/// TCP/UDP checksums of IPv4 packets, written to `out` in host order.
///
/// Returns 0, or -1 on error.
///
/// # Safety
///
/// Same requirements as `pktgen_checksum_ipv4_headers()`.
#[no_mangle]
pub unsafe extern "C" fn pktgen_checksum_ipv4_tcpudp(
    packets: *const *const u8,
    lens: *const usize,
    count: usize,
    out: *mut u16,
) -> c_int {
    guarded(-1, || {
        let packets = buffers(packets, lens, count)?;
        let out = array_mut(out, count, "checksum array")?;
        batch::ipv4_tcpudp_checksums(&packets, out).map_err(|e| e.to_string())?;
        Ok(0)
    })
}

/// Write one signature per destination, with timestamps `timestamp + i`.
///
/// Returns 0, or -1 on error.
///
/// # Safety
///
/// * `dests` and `lens` must point to `count` entries
/// * each `dests[i]` must point to `lens[i]` writable bytes, without overlap
/// * `stream_ids` and `sequences` must point to `count` entries
#[no_mangle]
pub unsafe extern "C" fn pktgen_signature_encode(
    dests: *const *mut u8,
    lens: *const usize,
    count: usize,
    stream_ids: *const u32,
    sequences: *const u32,
    flags: u8,
    timestamp: u64,
) -> c_int {
    guarded(-1, || {
        let mut dests = buffers_mut(dests, lens, count)?;
        let stream_ids = array(stream_ids, count, "stream id array")?;
        let sequences = array(sequences, count, "sequence array")?;
        batch::encode_signatures(&mut dests, stream_ids, sequences, flags, timestamp)
            .map_err(|e| e.to_string())?;
        Ok(0)
    })
}

/// Decode every candidate with a valid CRC into the output arrays, compactly
/// and in order.
///
/// Returns the number decoded, or -1 on error.
///
/// # Safety
///
/// * `candidates` and `lens` must point to `count` entries
/// * each `candidates[i]` must point to `lens[i]` readable bytes
/// * every output array must point to `count` writable entries
#[no_mangle]
pub unsafe extern "C" fn pktgen_signature_decode(
    candidates: *const *const u8,
    lens: *const usize,
    count: usize,
    stream_ids: *mut u32,
    sequences: *mut u32,
    timestamps: *mut u64,
    flags: *mut u8,
) -> c_int {
    guarded(-1, || {
        let candidates = buffers(candidates, lens, count)?;
        let stream_ids = array_mut(stream_ids, count, "stream id array")?;
        let sequences = array_mut(sequences, count, "sequence array")?;
        let timestamps = array_mut(timestamps, count, "timestamp array")?;
        let flags = array_mut(flags, count, "flags array")?;

        let mut decoded = vec![Signature::default(); count];
        let n = batch::decode_signatures(&candidates, &mut decoded).map_err(|e| e.to_string())?;
        for (i, sig) in decoded[..n].iter().enumerate() {
            stream_ids[i] = sig.stream_id;
            sequences[i] = sig.sequence;
            timestamps[i] = sig.timestamp;
            flags[i] = sig.flags;
        }
        Ok(n as c_int)
    })
}

/// Mark candidates with a valid signature CRC: `valid[i]` is set to 1 or 0.
///
/// Returns the number of valid candidates, or -1 on error.
///
/// # Safety
///
/// * `candidates` and `lens` must point to `count` entries
/// * each `candidates[i]` must point to `lens[i]` readable bytes
/// * `valid` must point to `count` writable bytes
#[no_mangle]
pub unsafe extern "C" fn pktgen_signature_crc_filter(
    candidates: *const *const u8,
    lens: *const usize,
    count: usize,
    valid: *mut u8,
) -> c_int {
    guarded(-1, || {
        let candidates = buffers(candidates, lens, count)?;
        let valid = array_mut(valid, count, "valid array")?;
        let mut flags = vec![false; count];
        batch::signature_crc_filter(&candidates, &mut flags).map_err(|e| e.to_string())?;
        for (out, &ok) in valid.iter_mut().zip(&flags) {
            *out = ok as u8;
        }
        Ok(flags.iter().filter(|&&ok| ok).count() as c_int)
    })
}

/// Pack flag bits into a signature flags byte. Nonzero arguments are true.
#[no_mangle]
pub extern "C" fn pktgen_signature_flags_pack(prbs: c_int, timestamp_last: c_int, valid: c_int) -> u8 {
    batch::pack_signature_flags(SignatureFlags {
        prbs: prbs != 0,
        timestamp: if timestamp_last != 0 {
            TimestampPosition::Last
        } else {
            TimestampPosition::First
        },
        valid: valid != 0,
    })
}

/// Unpack a signature flags byte. Each output is set to 1 or 0 when not null.
///
/// # Safety
///
/// Every non-null output pointer must be valid for a write.
#[no_mangle]
pub unsafe extern "C" fn pktgen_signature_flags_unpack(
    flags: u8,
    prbs: *mut c_int,
    timestamp_last: *mut c_int,
    valid: *mut c_int,
) {
    let unpacked = batch::unpack_signature_flags(flags);
    if !prbs.is_null() {
        *prbs = unpacked.prbs as c_int;
    }
    if !timestamp_last.is_null() {
        *timestamp_last = (unpacked.timestamp == TimestampPosition::Last) as c_int;
    }
    if !valid.is_null() {
        *valid = unpacked.valid as c_int;
    }
}

/// Add `value_count` indexicals to one histogram per mask.
///
/// Returns 0, or -1 on error (including a counter array too small for its
/// mask).
///
/// # Safety
///
/// * `values` must point to `value_count` entries
/// * `masks`, `counters` and `counter_lens` must point to `mask_count` entries
/// * each `counters[m]` must point to `counter_lens[m]` writable entries,
///   without overlap
#[no_mangle]
pub unsafe extern "C" fn pktgen_unpack_and_sum_indexicals(
    values: *const u32,
    value_count: usize,
    masks: *const u32,
    counters: *const *mut u32,
    counter_lens: *const usize,
    mask_count: usize,
) -> c_int {
    guarded(-1, || {
        let values = array(values, value_count, "value array")?;
        let masks = array(masks, mask_count, "mask array")?;
        let ptrs = array(counters, mask_count, "counter array")?;
        let lens = array(counter_lens, mask_count, "counter length array")?;
        let mut counters = ptrs
            .iter()
            .zip(lens)
            .map(|(&ptr, &len)| array_mut(ptr, len, "counter"))
            .collect::<Result<Vec<_>, _>>()?;
        batch::unpack_and_sum_indexicals(values, masks, &mut counters)
            .map_err(|e| e.to_string())?;
        Ok(0)
    })
}

/// Get the last error message.
///
/// # Arguments
///
/// * `buffer` - Pointer to a buffer to receive the error message
/// * `buffer_len` - Size of the buffer in bytes
///
/// Returns 0 if no error occurred, or the length of the error message (including null terminator).
/// If the buffer is too small, the error message is truncated.
///
/// # Safety
///
/// * `buffer` must be a valid pointer to a buffer of at least `buffer_len` bytes
#[no_mangle]
pub unsafe extern "C" fn pktgen_get_last_error(buffer: *mut c_char, buffer_len: usize) -> c_int {
    if buffer.is_null() || buffer_len == 0 {
        return 0;
    }
    let last_error = LAST_ERROR.lock();
    match last_error.as_deref() {
        Some(message) => copy_out(message, buffer, buffer_len),
        None => 0,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::ffi::CStr;
    use std::ptr;

    // The last error is process-wide; tests that read it must not interleave.
    static SERIAL: Mutex<()> = Mutex::new(());

    fn last_error() -> String {
        let mut buf = vec![0u8; 256];
        let len = unsafe { pktgen_get_last_error(buf.as_mut_ptr() as *mut c_char, buf.len()) };
        assert!(len > 0);
        unsafe { CStr::from_ptr(buf.as_ptr() as *const c_char) }
            .to_str()
            .unwrap()
            .to_string()
    }

    #[test]
    fn test_init_and_dump_info() {
        let _serial = SERIAL.lock();
        assert_eq!(pktgen_init(), 0);
        assert_eq!(pktgen_init(), 0);

        let mut buf = vec![0u8; 4096];
        let len = unsafe { pktgen_dump_info(buf.as_mut_ptr() as *mut c_char, buf.len()) };
        assert!(len > 1);
        let text = unsafe { CStr::from_ptr(buf.as_ptr() as *const c_char) }
            .to_str()
            .unwrap();
        assert!(text.contains("prbs_fill: "));
        assert!(text.contains("checksum: "));
    }

    #[test]
    fn test_dump_info_reports_required_length() {
        let _serial = SERIAL.lock();
        let mut tiny = [0u8; 4];
        let len = unsafe { pktgen_dump_info(tiny.as_mut_ptr() as *mut c_char, tiny.len()) };
        assert!(len as usize > tiny.len());
        assert_eq!(tiny[3], 0);
    }

    #[test]
    fn test_prbs_fill_and_verify() {
        let _serial = SERIAL.lock();
        let mut a = vec![0u8; 200];
        let mut b = vec![0u8; 57];
        let ptrs = [a.as_mut_ptr(), b.as_mut_ptr()];
        let lens = [a.len(), b.len()];
        let mut seed = 0;
        unsafe {
            assert_eq!(pktgen_fill_prbs(ptrs.as_ptr(), lens.as_ptr(), 2, 99, &mut seed), 0);
        }
        assert_ne!(seed, 0);

        b[20] ^= 0x08;
        let ptrs = [a.as_ptr(), b.as_ptr()];
        let mut errors = [0u32; 2];
        let any = unsafe { pktgen_verify_prbs(ptrs.as_ptr(), lens.as_ptr(), 2, errors.as_mut_ptr()) };
        assert_eq!(any, 1);
        assert_eq!(errors[0], 0);
        assert!(errors[1] > 0);
    }

    #[test]
    fn test_fill_incr_returns_next_value() {
        let _serial = SERIAL.lock();
        let mut a = [0u8; 10];
        let ptrs = [a.as_mut_ptr()];
        let lens = [a.len()];
        let next = unsafe { pktgen_fill_incr(ptrs.as_ptr(), lens.as_ptr(), 1, 250) };
        assert_eq!(next, 4);
        assert_eq!(a[9], 3);
    }

    #[test]
    fn test_signature_round_trip() {
        let _serial = SERIAL.lock();
        let mut records = vec![[0u8; 32]; 10];
        let ptrs: Vec<*mut u8> = records.iter_mut().map(|r| r.as_mut_ptr()).collect();
        let lens = vec![32usize; 10];
        let ids: Vec<u32> = (0..10).collect();
        let seqs: Vec<u32> = (100..110).collect();
        let flags = pktgen_signature_flags_pack(1, 1, 0);
        unsafe {
            assert_eq!(
                pktgen_signature_encode(
                    ptrs.as_ptr(),
                    lens.as_ptr(),
                    10,
                    ids.as_ptr(),
                    seqs.as_ptr(),
                    flags,
                    42,
                ),
                0
            );
        }

        records[3][0] ^= 1;
        let ptrs: Vec<*const u8> = records.iter().map(|r| r.as_ptr()).collect();
        let mut valid = [9u8; 10];
        let n_valid = unsafe {
            pktgen_signature_crc_filter(ptrs.as_ptr(), lens.as_ptr(), 10, valid.as_mut_ptr())
        };
        assert_eq!(n_valid, 9);
        assert_eq!(valid[3], 0);

        let mut out_ids = [0u32; 10];
        let mut out_seqs = [0u32; 10];
        let mut out_ts = [0u64; 10];
        let mut out_flags = [0u8; 10];
        let n = unsafe {
            pktgen_signature_decode(
                ptrs.as_ptr(),
                lens.as_ptr(),
                10,
                out_ids.as_mut_ptr(),
                out_seqs.as_mut_ptr(),
                out_ts.as_mut_ptr(),
                out_flags.as_mut_ptr(),
            )
        };
        assert_eq!(n, 9);
        assert_eq!(&out_ids[..4], &[0, 1, 2, 4]);
        assert_eq!(out_ts[3], 46);
        assert_eq!(out_flags[0], flags);
    }

    #[test]
    fn test_flags_unpack() {
        let _serial = SERIAL.lock();
        let (mut prbs, mut last, mut valid) = (9, 9, 9);
        unsafe { pktgen_signature_flags_unpack(0x82, &mut prbs, &mut last, &mut valid) };
        assert_eq!((prbs, last, valid), (1, 0, 1));
        unsafe { pktgen_signature_flags_unpack(0x01, ptr::null_mut(), &mut last, ptr::null_mut()) };
        assert_eq!(last, 1);
    }

    #[test]
    fn test_checksum_error_is_reported() {
        let _serial = SERIAL.lock();
        let header = [0x45u8; 12];
        let ptrs = [header.as_ptr()];
        let lens = [header.len()];
        let mut out = [0u16; 1];
        let rc = unsafe {
            pktgen_checksum_ipv4_headers(ptrs.as_ptr(), lens.as_ptr(), 1, out.as_mut_ptr())
        };
        assert_eq!(rc, -1);
        assert!(last_error().contains("too short"));
    }

    #[test]
    fn test_null_pointer_handling() {
        let _serial = SERIAL.lock();
        let mut errors = [0u32; 1];
        let rc = unsafe { pktgen_verify_prbs(ptr::null(), ptr::null(), 1, errors.as_mut_ptr()) };
        assert_eq!(rc, -1);
        assert!(last_error().contains("null"));

        let rc = unsafe { pktgen_verify_prbs(ptr::null(), ptr::null(), 0, ptr::null_mut()) };
        assert_eq!(rc, 0);
    }

    #[test]
    fn test_indexicals() {
        let _serial = SERIAL.lock();
        let values: Vec<u32> = (0..64).collect();
        let masks = [0x3u32, 0x30];
        let mut low = [0u32; 4];
        let mut high = [0u32; 4];
        let ptrs = [low.as_mut_ptr(), high.as_mut_ptr()];
        let lens = [4usize, 4];
        let rc = unsafe {
            pktgen_unpack_and_sum_indexicals(
                values.as_ptr(),
                values.len(),
                masks.as_ptr(),
                ptrs.as_ptr(),
                lens.as_ptr(),
                2,
            )
        };
        assert_eq!(rc, 0);
        assert_eq!(low, [16; 4]);
        assert_eq!(high, [16; 4]);
    }
}
