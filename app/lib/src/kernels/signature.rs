//! The 20-byte in-band signature record.
//!
//! All multi-byte fields are big-endian:
//!
//! ```text
//! offset  size  field
//!      0     4  stream id
//!      4     4  sequence number
//!      8     4  timestamp bits 31..0
//!     12     1  timestamp bits 37..32 (bits 7..2) | flags (bits 1..0)
//!     13     3  reserved, zero
//!     16     2  CRC-16/CCITT-FALSE over bytes 0..16
//!     18     2  cheater
//! ```
//!
//! The cheater makes the ones'-complement sum of the whole record fold to
//! `0xffff`, so a peer that checksums the record never sees zero.

use serde::Serialize;

use super::checksum;

/// Size of an encoded signature.
pub const SIGNATURE_LEN: usize = 20;

/// Bytes covered by the CRC.
pub const PAYLOAD_LEN: usize = 16;

const CRC_OFFSET: usize = 16;
const CHEATER_OFFSET: usize = 18;
const TS_HIGH_OFFSET: usize = 12;

/// Timestamps are 38 bits wide and wrap.
pub const TIMESTAMP_MASK: u64 = (1 << 38) - 1;

/// Flag bit: the timestamp marks the last bit of the frame.
pub const FLAG_TIMESTAMP_LAST: u8 = 0x01;
/// Flag bit: the payload after the signature carries PRBS.
pub const FLAG_PRBS: u8 = 0x02;
/// Bits of the flags value stored in the record.
pub const FLAGS_MASK: u8 = FLAG_TIMESTAMP_LAST | FLAG_PRBS;
/// Context bit set by callers for a signature they consider valid. Never stored.
pub const SIGNATURE_VALID: u8 = 0x80;

const CRC16_POLY: u16 = 0x1021;
const CRC16_INIT: u16 = 0xffff;

const fn build_crc16_table() -> [u16; 256] {
    let mut table = [0u16; 256];
    let mut i = 0;
    while i < 256 {
        let mut crc = (i as u16) << 8;
        let mut bit = 0;
        while bit < 8 {
            crc = if crc & 0x8000 != 0 {
                (crc << 1) ^ CRC16_POLY
            } else {
                crc << 1
            };
            bit += 1;
        }
        table[i] = crc;
        i += 1;
    }
    table
}

const fn widen(table: [u16; 256]) -> [u32; 256] {
    let mut wide = [0u32; 256];
    let mut i = 0;
    while i < 256 {
        wide[i] = table[i] as u32;
        i += 1;
    }
    wide
}

/// Byte-at-a-time CRC-16/CCITT-FALSE table.
pub static CRC16_TABLE: [u16; 256] = build_crc16_table();

/// The same table as 32-bit entries, for gather loads.
pub static CRC16_TABLE_WIDE: [u32; 256] = widen(build_crc16_table());

/// CRC-16/CCITT-FALSE of `data`.
pub fn crc16(data: &[u8]) -> u16 {
    data.iter().fold(CRC16_INIT, |crc, &b| {
        (crc << 8) ^ CRC16_TABLE[((crc >> 8) as u8 ^ b) as usize]
    })
}

/// Initial CRC register value, for callers running the CRC lane-wise.
pub const fn crc16_init() -> u16 {
    CRC16_INIT
}

/// Cheater value that completes the first 18 bytes of a record.
pub fn cheater(head: &[u8]) -> u16 {
    let sum: u64 = head[..CHEATER_OFFSET]
        .chunks_exact(2)
        .map(|p| u16::from_be_bytes([p[0], p[1]]) as u64)
        .sum();
    // Big-endian pairs: the fold is already in network order.
    !checksum::fold(sum)
}

/// Where in the frame the timestamp was taken.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum TimestampPosition {
    /// First bit of the frame.
    #[default]
    First,
    /// Last bit of the frame.
    Last,
}

/// Decoded view of a flags byte.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct SignatureFlags {
    /// Payload after the signature is a PRBS pattern.
    pub prbs: bool,
    /// Timestamp position within the frame.
    pub timestamp: TimestampPosition,
    /// Caller-context validity bit.
    pub valid: bool,
}

impl SignatureFlags {
    /// Pack into a flags byte.
    pub fn pack(self) -> u8 {
        let mut flags = 0;
        if self.timestamp == TimestampPosition::Last {
            flags |= FLAG_TIMESTAMP_LAST;
        }
        if self.prbs {
            flags |= FLAG_PRBS;
        }
        if self.valid {
            flags |= SIGNATURE_VALID;
        }
        flags
    }

    /// Unpack a flags byte. Unknown bits are ignored.
    pub fn unpack(flags: u8) -> Self {
        Self {
            prbs: flags & FLAG_PRBS != 0,
            timestamp: if flags & FLAG_TIMESTAMP_LAST != 0 {
                TimestampPosition::Last
            } else {
                TimestampPosition::First
            },
            valid: flags & SIGNATURE_VALID != 0,
        }
    }
}

/// One signature's fields.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct Signature {
    /// Stream identifier.
    pub stream_id: u32,
    /// Sequence number within the stream.
    pub sequence: u32,
    /// 38-bit timestamp, zero-extended.
    pub timestamp: u64,
    /// The two stored flag bits.
    pub flags: u8,
}

impl Signature {
    /// Create a signature; the timestamp is reduced to 38 bits and the flags
    /// to the stored bits.
    pub fn new(stream_id: u32, sequence: u32, timestamp: u64, flags: u8) -> Self {
        Self {
            stream_id,
            sequence,
            timestamp: timestamp & TIMESTAMP_MASK,
            flags: flags & FLAGS_MASK,
        }
    }

    /// The first 16 bytes of the record, before CRC and cheater.
    pub fn payload(&self) -> [u8; PAYLOAD_LEN] {
        let mut out = [0u8; PAYLOAD_LEN];
        out[0..4].copy_from_slice(&self.stream_id.to_be_bytes());
        out[4..8].copy_from_slice(&self.sequence.to_be_bytes());
        out[8..12].copy_from_slice(&(self.timestamp as u32).to_be_bytes());
        out[TS_HIGH_OFFSET] = timestamp_high_byte(self.timestamp, self.flags);
        out
    }

    /// Encode the full record.
    pub fn to_bytes(&self) -> [u8; SIGNATURE_LEN] {
        let payload = self.payload();
        let crc = crc16(&payload);
        finish_record(&payload, crc)
    }

    /// Encode into the first [`SIGNATURE_LEN`] bytes of `out`.
    ///
    /// # Panics
    ///
    /// Panics if `out` is shorter than [`SIGNATURE_LEN`].
    pub fn encode_into(&self, out: &mut [u8]) {
        out[..SIGNATURE_LEN].copy_from_slice(&self.to_bytes());
    }

    /// Decode a record, returning `None` when it is too short or its CRC fails.
    pub fn decode(bytes: &[u8]) -> Option<Self> {
        if !crc_valid(bytes) {
            return None;
        }
        Some(Self::from_payload(bytes))
    }

    /// Extract fields without checking the CRC.
    pub(crate) fn from_payload(bytes: &[u8]) -> Self {
        let word = |at: usize| u32::from_be_bytes([bytes[at], bytes[at + 1], bytes[at + 2], bytes[at + 3]]);
        let high = bytes[TS_HIGH_OFFSET];
        Self {
            stream_id: word(0),
            sequence: word(4),
            timestamp: ((high >> 2) as u64) << 32 | word(8) as u64,
            flags: high & FLAGS_MASK,
        }
    }

    /// Decoded flags.
    pub fn flag_bits(&self) -> SignatureFlags {
        SignatureFlags::unpack(self.flags)
    }
}

/// Byte 12 of a record.
#[inline]
pub fn timestamp_high_byte(timestamp: u64, flags: u8) -> u8 {
    ((((timestamp >> 32) as u8) & 0x3f) << 2) | (flags & FLAGS_MASK)
}

/// Assemble a record from its payload and an already computed CRC.
pub fn finish_record(payload: &[u8; PAYLOAD_LEN], crc: u16) -> [u8; SIGNATURE_LEN] {
    let mut out = [0u8; SIGNATURE_LEN];
    out[..PAYLOAD_LEN].copy_from_slice(payload);
    out[CRC_OFFSET..CHEATER_OFFSET].copy_from_slice(&crc.to_be_bytes());
    let cheat = cheater(&out);
    out[CHEATER_OFFSET..].copy_from_slice(&cheat.to_be_bytes());
    out
}

/// Stored CRC of a record.
#[inline]
pub fn stored_crc(bytes: &[u8]) -> u16 {
    u16::from_be_bytes([bytes[CRC_OFFSET], bytes[CRC_OFFSET + 1]])
}

/// Whether `bytes` holds a record with a matching CRC.
pub fn crc_valid(bytes: &[u8]) -> bool {
    bytes.len() >= SIGNATURE_LEN && crc16(&bytes[..PAYLOAD_LEN]) == stored_crc(bytes)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_crc16_check_value() {
        assert_eq!(crc16(b"123456789"), 0x29b1);
        assert_eq!(crc16(&[]), 0xffff);
    }

    #[test]
    fn test_wide_table_matches() {
        for i in 0..256 {
            assert_eq!(CRC16_TABLE_WIDE[i], CRC16_TABLE[i] as u32);
        }
    }

    #[test]
    fn test_layout() {
        let sig = Signature::new(0x0102_0304, 0x0506_0708, 0x2a_9abc_def0, FLAG_PRBS);
        let bytes = sig.to_bytes();
        assert_eq!(&bytes[0..4], &[1, 2, 3, 4]);
        assert_eq!(&bytes[4..8], &[5, 6, 7, 8]);
        assert_eq!(&bytes[8..12], &[0x9a, 0xbc, 0xde, 0xf0]);
        assert_eq!(bytes[12], (0x2a << 2) | FLAG_PRBS);
        assert_eq!(&bytes[13..16], &[0, 0, 0]);
        assert_eq!(stored_crc(&bytes), crc16(&bytes[..16]));
    }

    #[test]
    fn test_round_trip() {
        let sig = Signature::new(7, 42, TIMESTAMP_MASK, FLAG_TIMESTAMP_LAST);
        assert_eq!(Signature::decode(&sig.to_bytes()), Some(sig));
    }

    #[test]
    fn test_timestamp_wraps_to_38_bits() {
        let sig = Signature::new(0, 0, TIMESTAMP_MASK + 5, 0);
        assert_eq!(sig.timestamp, 4);
    }

    #[test]
    fn test_cheater_makes_sum_all_ones() {
        for sig in [
            Signature::default(),
            Signature::new(u32::MAX, u32::MAX, TIMESTAMP_MASK, FLAGS_MASK),
            Signature::new(3, 9, 123_456_789, FLAG_PRBS),
        ] {
            let bytes = sig.to_bytes();
            let sum: u64 = bytes
                .chunks_exact(2)
                .map(|p| u16::from_be_bytes([p[0], p[1]]) as u64)
                .sum();
            assert_eq!(checksum::fold(sum), 0xffff);
        }
    }

    #[test]
    fn test_corruption_rejected() {
        let mut bytes = Signature::new(1, 2, 3, 0).to_bytes();
        bytes[5] ^= 0x10;
        assert!(!crc_valid(&bytes));
        assert_eq!(Signature::decode(&bytes), None);
    }

    #[test]
    fn test_short_record_rejected() {
        let bytes = Signature::new(1, 2, 3, 0).to_bytes();
        assert!(!crc_valid(&bytes[..19]));
    }

    #[test]
    fn test_reserved_bytes_ignored() {
        let sig = Signature::new(1, 2, 3, FLAG_PRBS);
        let mut bytes = sig.to_bytes();
        bytes[13] = 0xff;
        // Reserved bytes are covered by the CRC, so re-seal the record.
        let mut payload = [0u8; PAYLOAD_LEN];
        payload.copy_from_slice(&bytes[..PAYLOAD_LEN]);
        let bytes = finish_record(&payload, crc16(&payload));
        assert_eq!(Signature::decode(&bytes), Some(sig));
    }

    #[test]
    fn test_flags_pack_unpack() {
        let flags = SignatureFlags {
            prbs: false,
            timestamp: TimestampPosition::Last,
            valid: true,
        };
        assert_eq!(flags.pack(), FLAG_TIMESTAMP_LAST | SIGNATURE_VALID);
        assert_eq!(SignatureFlags::unpack(flags.pack()), flags);
        assert_eq!(SignatureFlags::unpack(0x7c), SignatureFlags::default());
    }
}
