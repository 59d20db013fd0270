//! Internet (RFC 1071) ones'-complement checksum primitives.
//!
//! Bulk kernels add the buffer up as native-endian 32-bit words into a 64-bit
//! accumulator. Ones'-complement addition does not care about byte order or
//! word width as long as the result is folded back to 16 bits, so different
//! kernels may return different raw sums that all fold to the same value.
//! [`finish`] turns the folded native-order sum into a host integer meant to
//! be written with `to_be_bytes`.

/// Length of an IPv4 header without options.
pub const IPV4_HEADER_LEN: usize = 20;

/// Offset of the IPv4 total-length field.
const TOTAL_LENGTH_OFFSET: usize = 2;

/// Offset of the IPv4 protocol field.
const PROTOCOL_OFFSET: usize = 9;

/// Offset of the IPv4 source address; the destination follows it.
const SOURCE_OFFSET: usize = 12;

/// Fold a 64-bit accumulator to 16 bits with end-around carry.
#[inline]
pub const fn fold(sum: u64) -> u16 {
    let sum = (sum & 0xffff_ffff) + (sum >> 32);
    let sum = (sum & 0xffff_ffff) + (sum >> 32);
    let sum = (sum & 0xffff) + (sum >> 16);
    let sum = (sum & 0xffff) + (sum >> 16);
    sum as u16
}

/// Convert a folded native-order sum into the network-order numeric value.
#[inline]
pub const fn to_network(folded: u16) -> u16 {
    u16::from_be(folded)
}

/// Fold, convert to network order and invert.
#[inline]
pub const fn finish(sum: u64) -> u16 {
    !to_network(fold(sum))
}

/// Sum the twelve-byte TCP/UDP pseudo-header implied by an IPv4 header.
///
/// Returns the native-order sum and the transport length it encodes.
/// The transport length is `total_length - ihl * 4`, saturating at zero.
pub fn pseudo_header_sum(header: &[u8]) -> (u64, usize) {
    let total_length = u16::from_be_bytes([
        header[TOTAL_LENGTH_OFFSET],
        header[TOTAL_LENGTH_OFFSET + 1],
    ]) as usize;
    let transport_len = total_length.saturating_sub(header_len(header));
    let len_bytes = (transport_len as u16).to_be_bytes();

    let src = read_ne_u32(&header[SOURCE_OFFSET..]);
    let dst = read_ne_u32(&header[SOURCE_OFFSET + 4..]);
    let proto_len = u32::from_ne_bytes([0, header[PROTOCOL_OFFSET], len_bytes[0], len_bytes[1]]);

    (src as u64 + dst as u64 + proto_len as u64, transport_len)
}

/// Header length in bytes from the IHL field.
#[inline]
pub fn header_len(header: &[u8]) -> usize {
    ((header[0] & 0x0f) as usize) * 4
}

/// Checksum of a fixed 20-byte IPv4 header, summed as five 32-bit words.
///
/// A fold of `0xffff` is returned unchanged instead of being inverted to zero.
pub fn ipv4_header(header: &[u8]) -> u16 {
    let sum: u64 = header[..IPV4_HEADER_LEN]
        .chunks_exact(4)
        .map(|w| read_ne_u32(w) as u64)
        .sum();
    let folded = fold(sum);
    if folded == 0xffff {
        folded
    } else {
        !to_network(folded)
    }
}

#[inline(always)]
pub(crate) fn read_ne_u32(bytes: &[u8]) -> u32 {
    u32::from_ne_bytes([bytes[0], bytes[1], bytes[2], bytes[3]])
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Straightforward 16-bit big-endian reference.
    fn reference(data: &[u8]) -> u16 {
        let mut sum: u64 = data
            .chunks(2)
            .map(|c| u16::from_be_bytes([c[0], *c.get(1).unwrap_or(&0)]) as u64)
            .sum();
        while sum >> 16 != 0 {
            sum = (sum & 0xffff) + (sum >> 16);
        }
        !(sum as u16)
    }

    fn native_sum(data: &[u8]) -> u64 {
        data.chunks(2)
            .map(|c| u16::from_ne_bytes([c[0], *c.get(1).unwrap_or(&0)]) as u64)
            .sum()
    }

    #[test]
    fn test_fold_carries() {
        assert_eq!(fold(0), 0);
        assert_eq!(fold(0xffff), 0xffff);
        assert_eq!(fold(0x1_0000), 1);
        assert_eq!(fold(0x1_fffe), 0xffff);
        assert_eq!(fold(u64::MAX), 0xffff);
    }

    #[test]
    fn test_rfc1071_example() {
        let data = [0x00, 0x01, 0xf2, 0x03, 0xf4, 0xf5, 0xf6, 0xf7];
        assert_eq!(to_network(fold(native_sum(&data))), 0xddf2);
        assert_eq!(finish(native_sum(&data)), 0x220d);
        assert_eq!(reference(&data), 0x220d);
    }

    #[test]
    fn test_all_zero_folds_to_ffff() {
        assert_eq!(finish(native_sum(&[0u8; 64])), 0xffff);
    }

    #[test]
    fn test_odd_length_pads_right() {
        let data = [0x12, 0x34, 0x56];
        assert_eq!(finish(native_sum(&data)), reference(&data));
    }

    fn sample_header() -> [u8; 20] {
        [
            0x45, 0x00, 0x00, 0x73, 0x00, 0x00, 0x40, 0x00, 0x40, 0x11, 0x00, 0x00, 0xc0, 0xa8,
            0x00, 0x01, 0xc0, 0xa8, 0x00, 0xc7,
        ]
    }

    #[test]
    fn test_ipv4_header_known_value() {
        // Classic example header; checksum 0xb861.
        assert_eq!(ipv4_header(&sample_header()), 0xb861);
    }

    #[test]
    fn test_ipv4_header_verifies_as_negative_zero() {
        let mut header = sample_header();
        let csum = ipv4_header(&header);
        header[10..12].copy_from_slice(&csum.to_be_bytes());
        assert_eq!(ipv4_header(&header), 0xffff);
    }

    #[test]
    fn test_pseudo_header_sum() {
        let header = sample_header();
        let (sum, transport_len) = pseudo_header_sum(&header);
        assert_eq!(transport_len, 0x73 - 20);
        let mut pseudo = Vec::new();
        pseudo.extend_from_slice(&header[12..20]);
        pseudo.extend_from_slice(&[0, 0x11]);
        pseudo.extend_from_slice(&(transport_len as u16).to_be_bytes());
        assert_eq!(fold(sum), fold(native_sum(&pseudo)));
    }

    #[test]
    fn test_pseudo_header_short_total_length() {
        let mut header = sample_header();
        header[2] = 0;
        header[3] = 10;
        assert_eq!(pseudo_header_sum(&header).1, 0);
    }
}
