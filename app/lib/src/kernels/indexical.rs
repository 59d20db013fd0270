//! Masked sub-field extraction for indexical histograms.
//!
//! An indexical is a packed 32-bit counter value. A mask selects one
//! contiguous sub-field; the field shifted down to bit 0 is the bucket.

/// Right shift that brings `mask`'s field down to bit 0.
///
/// A zero mask selects nothing and maps every value to bucket 0.
#[inline]
pub const fn shift(mask: u32) -> u32 {
    if mask == 0 {
        0
    } else {
        mask.trailing_zeros()
    }
}

/// Bucket of `value` under `mask`.
#[inline]
pub const fn bucket(value: u32, mask: u32) -> u32 {
    (value & mask) >> shift(mask)
}

/// Number of counters a histogram for `mask` needs.
#[inline]
pub const fn bucket_count(mask: u32) -> usize {
    (mask >> shift(mask)) as usize + 1
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bucket() {
        assert_eq!(bucket(0xabcd_1234, 0x0000_ff00), 0x12);
        assert_eq!(bucket(0xabcd_1234, 0xf000_0000), 0xa);
        assert_eq!(bucket(0xabcd_1234, 0x0000_0001), 0);
        assert_eq!(bucket(u32::MAX, u32::MAX), u32::MAX);
    }

    #[test]
    fn test_zero_mask() {
        assert_eq!(shift(0), 0);
        assert_eq!(bucket(0xffff_ffff, 0), 0);
        assert_eq!(bucket_count(0), 1);
    }

    #[test]
    fn test_bucket_count() {
        assert_eq!(bucket_count(0x0000_ff00), 256);
        assert_eq!(bucket_count(0x8000_0000), 2);
        assert_eq!(bucket_count(0x0000_0003), 4);
    }

    #[test]
    fn test_bucket_always_in_range() {
        for mask in [0x1u32, 0x30, 0x0ff0, 0xf000_000f, u32::MAX] {
            for value in [0u32, 1, 0x5555_5555, 0xdead_beef, u32::MAX] {
                assert!((bucket(value, mask) as usize) < bucket_count(mask));
            }
        }
    }
}
