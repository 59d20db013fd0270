//! AVX kernels for x86_64.
//!
//! AVX's 256-bit integer support is limited to moves, so only the constant
//! fill gets a kernel here.
//!
//! # Safety
//!
//! All functions in this module are unsafe and require AVX support.

use std::arch::x86_64::*;

use super::scalar;

const WIDTH: usize = 32;

/// Fill `buf` with `value`.
///
/// # Safety
///
/// The caller must ensure that AVX is available on the current CPU.
#[target_feature(enable = "avx")]
pub unsafe fn fill_const_avx(buf: &mut [u8], value: u8) {
    let v = _mm256_set1_epi8(value as i8);
    let mut blocks = buf.chunks_exact_mut(WIDTH);
    for block in blocks.by_ref() {
        _mm256_storeu_si256(block.as_mut_ptr() as *mut __m256i, v);
    }
    scalar::fill_const_scalar(blocks.into_remainder(), value);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fill_const() {
        if !std::arch::is_x86_feature_detected!("avx") {
            return;
        }
        let mut buf = vec![0u8; 101];
        unsafe { fill_const_avx(&mut buf[3..], 0x5c) };
        assert!(buf[..3].iter().all(|&b| b == 0));
        assert!(buf[3..].iter().all(|&b| b == 0x5c));
    }
}
