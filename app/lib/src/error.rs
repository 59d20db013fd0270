//! Error types for the packet kernel library.
//!
//! Kernels themselves never fail: malformed input has defined results (short
//! PRBS buffers report zero bit errors, bad signatures are skipped). Errors only
//! come from the batch facade, which validates the caller's parallel arrays, and
//! from writing diagnostics to a caller-supplied stream.

use thiserror::Error;

/// Main error type for the packet kernel library.
#[derive(Debug, Error)]
pub enum KernelError {
    /// Two parallel arrays that must describe the same batch differ in length.
    #[error("Length mismatch for {what}: expected {expected}, found {actual}")]
    LengthMismatch {
        /// Which argument was too short or too long
        what: &'static str,
        /// Length required by the batch
        expected: usize,
        /// Length actually supplied
        actual: usize,
    },

    /// A buffer in a batch is shorter than the fixed structure it must hold.
    #[error("Buffer {index} is too short: {len} bytes, need at least {required}")]
    BufferTooShort {
        /// Position of the buffer in the batch
        index: usize,
        /// Length of the supplied buffer
        len: usize,
        /// Minimum length required
        required: usize,
    },

    /// A histogram counter array cannot hold every value its mask can produce.
    #[error("Counter array for mask {mask_index} holds {len} buckets, mask needs {required}")]
    CounterTooSmall {
        /// Position of the mask in the mask list
        mask_index: usize,
        /// Number of buckets supplied
        len: usize,
        /// Number of buckets the mask can address
        required: usize,
    },

    /// A variant name could not be parsed.
    #[error("Unknown instruction set variant: {0}")]
    UnknownVariant(String),

    /// I/O error while writing diagnostics.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Type alias for Results using `KernelError`.
pub type Result<T> = std::result::Result<T, KernelError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_length_mismatch_display() {
        let error = KernelError::LengthMismatch {
            what: "bit_errors",
            expected: 4,
            actual: 3,
        };
        let display = format!("{}", error);
        assert!(display.contains("bit_errors"));
        assert!(display.contains("expected 4"));
        assert!(display.contains("found 3"));
    }

    #[test]
    fn test_buffer_too_short_display() {
        let error = KernelError::BufferTooShort {
            index: 7,
            len: 12,
            required: 20,
        };
        let display = format!("{}", error);
        assert!(display.contains("Buffer 7"));
        assert!(display.contains("12 bytes"));
        assert!(display.contains("at least 20"));
    }

    #[test]
    fn test_counter_too_small_display() {
        let error = KernelError::CounterTooSmall {
            mask_index: 1,
            len: 8,
            required: 16,
        };
        let display = format!("{}", error);
        assert!(display.contains("mask 1"));
        assert!(display.contains("8 buckets"));
        assert!(display.contains("needs 16"));
    }

    #[test]
    fn test_unknown_variant_display() {
        let error = KernelError::UnknownVariant("mmx".to_string());
        assert!(format!("{}", error).contains("mmx"));
    }

    #[test]
    fn test_io_error_from() {
        let io_error = std::io::Error::new(std::io::ErrorKind::BrokenPipe, "closed");
        let error: KernelError = io_error.into();
        assert!(matches!(error, KernelError::Io(_)));
    }

    #[test]
    fn test_error_is_send_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<KernelError>();
    }
}
