//! PRBS23 test pattern primitives.
//!
//! The pattern is the pseudo-random binary sequence of the polynomial
//! x^23 + x^18 + 1, i.e. `b[n] = b[n-23] ^ b[n-18]`, transmitted inverted and
//! MSB first.
//!
//! A seed is the 32 most recently generated sequence bits (uncomplemented),
//! newest bit in bit 0. Only the low 23 bits determine what comes next.
//! Advancing by a word and advancing by four bytes are the same operation, so
//! buffers may be filled in any mix of byte and word steps and the stream is
//! unchanged.
//!
//! Squaring the polynomial over GF(2) gives `b[n] = b[n-23*2^k] ^ b[n-18*2^k]`.
//! For k = 3, 4, 5 both distances are whole bytes, which lets vector kernels
//! produce 16, 32 or 64 output bytes from bytes already written:
//!
//! ```text
//! out[i] = !(out[i - 18] ^ out[i - 23])    // 16-byte vectors
//! out[i] = !(out[i - 36] ^ out[i - 46])    // 32-byte vectors
//! out[i] = !(out[i - 72] ^ out[i - 92])    // 64-byte vectors
//! ```

/// Mask of the seed bits that determine the next output.
pub const SEED_MASK: u32 = 0x007f_ffff;

/// Buffers shorter than this are not checked by verification.
pub const MIN_VERIFY_LEN: usize = 8;

/// Byte distances of the recurrence usable with 16-byte vectors.
pub const LAG_16: (usize, usize) = (18, 23);

/// Byte distances of the recurrence usable with 32-byte vectors.
pub const LAG_32: (usize, usize) = (36, 46);

/// Byte distances of the recurrence usable with 64-byte vectors.
pub const LAG_64: (usize, usize) = (72, 92);

/// Advance the sequence by 32 bits. The result is both the next 32 bits of
/// the (uncomplemented) pattern and the new seed.
#[inline(always)]
pub const fn step32(seed: u32) -> u32 {
    let s = seed & SEED_MASK;
    (s << 9) ^ (s << 14) ^ ((s >> 4) & 0x3fff) ^ ((s >> 9) & 0x3e00) ^ (s >> 14)
}

/// The next 8 bits of the (uncomplemented) pattern after `seed`.
#[inline(always)]
pub const fn step8(seed: u32) -> u8 {
    let s = seed & SEED_MASK;
    ((s >> 15) ^ (s >> 10)) as u8
}

/// Shift eight freshly generated bits into a seed.
#[inline(always)]
pub const fn push_byte(seed: u32, bits: u8) -> u32 {
    (seed << 8) | bits as u32
}

/// Produce one output byte and return the advanced seed.
#[inline(always)]
pub fn fill_byte(seed: u32, out: &mut u8) -> u32 {
    let bits = step8(seed);
    *out = !bits;
    push_byte(seed, bits)
}

/// Count bit errors of one received byte against the prediction from `seed`,
/// and return the seed rebuilt from what was received.
#[inline(always)]
pub fn check_byte(seed: u32, received: u8, errors: &mut u32) -> u32 {
    let actual = !received;
    *errors += (step8(seed) ^ actual).count_ones();
    push_byte(seed, actual)
}

/// Seed implied by the last four bytes of a filled region.
#[inline(always)]
pub fn seed_from_tail(tail: &[u8; 4]) -> u32 {
    !u32::from_be_bytes(*tail)
}

/// Generate the seed that a buffer of `len` bytes filled from `seed` ends with.
pub fn advance(mut seed: u32, len: usize) -> u32 {
    for _ in 0..len / 4 {
        seed = step32(seed);
    }
    for _ in 0..len % 4 {
        seed = push_byte(seed, step8(seed));
    }
    seed
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Bit-serial generator straight from the recurrence.
    fn serial_bits(seed: u32, count: usize) -> Vec<u8> {
        let mut history: Vec<u8> = (0..32).map(|i| ((seed >> (31 - i)) & 1) as u8).collect();
        for _ in 0..count {
            let n = history.len();
            history.push(history[n - 23] ^ history[n - 18]);
        }
        history.split_off(32)
    }

    fn word_bits(words: &[u32]) -> Vec<u8> {
        words
            .iter()
            .flat_map(|w| (0..32).map(move |i| ((w >> (31 - i)) & 1) as u8))
            .collect()
    }

    #[test]
    fn test_step32_matches_recurrence() {
        for seed in [1u32, 0x5a5a_5a5a, 0xdead_beef, 0x007f_ffff, 0x8000_0001] {
            let mut s = seed;
            let words: Vec<u32> = (0..8)
                .map(|_| {
                    s = step32(s);
                    s
                })
                .collect();
            assert_eq!(word_bits(&words), serial_bits(seed, 256), "seed {seed:#x}");
        }
    }

    #[test]
    fn test_four_byte_steps_equal_one_word_step() {
        let mut seed = 0x0012_3456;
        for _ in 0..100 {
            let mut by_bytes = seed;
            for _ in 0..4 {
                by_bytes = push_byte(by_bytes, step8(by_bytes));
            }
            let by_word = step32(seed);
            assert_eq!(by_bytes, by_word);
            seed = by_word;
        }
    }

    #[test]
    fn test_zero_state_is_fixed_point() {
        assert_eq!(step32(0), 0);
        assert_eq!(step8(0), 0);
    }

    #[test]
    fn test_high_bits_ignored() {
        assert_eq!(step32(0xff80_0001), step32(0x0000_0001));
        assert_eq!(step8(0xff80_0001), step8(0x0000_0001));
    }

    #[test]
    fn test_byte_lags_hold() {
        let mut seed = 0x0bad_cafe;
        let out: Vec<u8> = (0..256)
            .map(|_| {
                let mut b = 0;
                seed = fill_byte(seed, &mut b);
                b
            })
            .collect();
        for (a, b) in [LAG_16, LAG_32, LAG_64] {
            for i in b..out.len() {
                assert_eq!(out[i], !(out[i - a] ^ out[i - b]), "lags ({a}, {b}) at {i}");
            }
        }
    }

    #[test]
    fn test_seed_from_tail_round_trip() {
        let seed = step32(0x1357_9bdf);
        let tail = (!seed).to_be_bytes();
        assert_eq!(seed_from_tail(&tail), seed);
    }

    #[test]
    fn test_check_byte_counts_flipped_bits() {
        let seed = 0x0055_aa55;
        let mut expected = 0;
        fill_byte(seed, &mut expected);
        let mut errors = 0;
        check_byte(seed, expected ^ 0b1010_0001, &mut errors);
        assert_eq!(errors, 3);
    }

    #[test]
    fn test_advance_matches_words() {
        assert_eq!(advance(7, 8), step32(step32(7)));
        assert_eq!(advance(7, 0), 7);
    }
}
