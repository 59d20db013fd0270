//! Instruction-set variants and runtime CPU capability detection.
//!
//! Two independent facts decide whether a kernel variant may run:
//!
//! - [`is_enabled`]: the variant's code was compiled into this build. This is a
//!   constant derived from cargo features and the target architecture.
//! - [`is_available`]: the running CPU implements the instruction set. This is
//!   probed once and cached for the lifetime of the process.
//!
//! [`Variant::Scalar`] is always both.

use std::fmt;
use std::str::FromStr;
use std::sync::OnceLock;

use serde::Serialize;

use crate::error::KernelError;

/// An instruction-set family a kernel may be implemented for.
///
/// The declaration order is the enumeration order used when breaking ties
/// between equally fast candidates, so `Scalar` always wins a tie.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Variant {
    /// Portable fallback; always compiled, always available.
    Scalar,
    /// Portable wide-word code left to the compiler's auto-vectorizer.
    Auto,
    /// SSE2 (128-bit, x86_64).
    Sse2,
    /// SSE4.1 (128-bit, x86_64).
    Sse4,
    /// AVX (256-bit float domain, x86_64).
    Avx,
    /// AVX2 (256-bit integer, x86_64).
    Avx2,
    /// AVX-512 F+BW (512-bit, x86_64).
    Avx512,
    /// NEON (128-bit, aarch64).
    Neon,
}

impl Variant {
    /// Every variant, in enumeration order.
    pub const ALL: [Variant; 8] = [
        Variant::Scalar,
        Variant::Auto,
        Variant::Sse2,
        Variant::Sse4,
        Variant::Avx,
        Variant::Avx2,
        Variant::Avx512,
        Variant::Neon,
    ];

    /// Short lowercase name, as used in configuration and reports.
    pub fn name(self) -> &'static str {
        match self {
            Variant::Scalar => "scalar",
            Variant::Auto => "auto",
            Variant::Sse2 => "sse2",
            Variant::Sse4 => "sse4",
            Variant::Avx => "avx",
            Variant::Avx2 => "avx2",
            Variant::Avx512 => "avx512",
            Variant::Neon => "neon",
        }
    }
}

impl fmt::Display for Variant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Variant::Scalar => write!(f, "Scalar"),
            Variant::Auto => write!(f, "Auto"),
            Variant::Sse2 => write!(f, "SSE2"),
            Variant::Sse4 => write!(f, "SSE4.1"),
            Variant::Avx => write!(f, "AVX"),
            Variant::Avx2 => write!(f, "AVX2"),
            Variant::Avx512 => write!(f, "AVX-512"),
            Variant::Neon => write!(f, "NEON"),
        }
    }
}

impl FromStr for Variant {
    type Err = KernelError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim().to_ascii_lowercase();
        Variant::ALL
            .into_iter()
            .find(|v| v.name() == wanted)
            .ok_or_else(|| KernelError::UnknownVariant(s.to_string()))
    }
}

/// Detected CPU features for SIMD acceleration.
///
/// This struct holds the results of runtime CPU feature detection,
/// indicating which instruction sets are available on the current CPU.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CpuFeatures {
    /// SSE2 is available (x86_64 only).
    pub sse2: bool,
    /// SSE4.1 is available (x86_64 only).
    pub sse41: bool,
    /// AVX is available (x86_64 only).
    pub avx: bool,
    /// AVX2 is available (x86_64 only).
    pub avx2: bool,
    /// AVX-512F and AVX-512BW are both available (x86_64 only).
    pub avx512: bool,
    /// NEON is available (ARM64 only).
    pub neon: bool,
}

impl CpuFeatures {
    /// Detect CPU features at runtime.
    #[cfg(target_arch = "x86_64")]
    pub fn detect() -> Self {
        Self {
            sse2: std::arch::is_x86_feature_detected!("sse2"),
            sse41: std::arch::is_x86_feature_detected!("sse4.1"),
            avx: std::arch::is_x86_feature_detected!("avx"),
            avx2: std::arch::is_x86_feature_detected!("avx2"),
            avx512: std::arch::is_x86_feature_detected!("avx512f")
                && std::arch::is_x86_feature_detected!("avx512bw"),
            neon: false,
        }
    }

    /// Detect CPU features at runtime (ARM64 version).
    #[cfg(target_arch = "aarch64")]
    pub fn detect() -> Self {
        // NEON is mandatory on ARM64
        Self {
            neon: true,
            ..Self::none()
        }
    }

    /// Detect CPU features at runtime (fallback for other architectures).
    #[cfg(not(any(target_arch = "x86_64", target_arch = "aarch64")))]
    pub fn detect() -> Self {
        Self::none()
    }

    /// Create a CpuFeatures with no SIMD support.
    pub fn none() -> Self {
        Self {
            sse2: false,
            sse41: false,
            avx: false,
            avx2: false,
            avx512: false,
            neon: false,
        }
    }

    /// Features detected for this process, probed on first use.
    pub fn cached() -> &'static CpuFeatures {
        static FEATURES: OnceLock<CpuFeatures> = OnceLock::new();
        FEATURES.get_or_init(CpuFeatures::detect)
    }

    /// Whether these features cover `variant`.
    pub fn supports(&self, variant: Variant) -> bool {
        match variant {
            Variant::Scalar | Variant::Auto => true,
            Variant::Sse2 => self.sse2,
            Variant::Sse4 => self.sse41,
            Variant::Avx => self.avx,
            Variant::Avx2 => self.avx2,
            Variant::Avx512 => self.avx512,
            Variant::Neon => self.neon,
        }
    }
}

impl Default for CpuFeatures {
    fn default() -> Self {
        Self::detect()
    }
}

/// Whether `variant`'s kernels are compiled into this build.
pub const fn is_enabled(variant: Variant) -> bool {
    match variant {
        Variant::Scalar | Variant::Auto => true,
        Variant::Sse2 | Variant::Sse4 | Variant::Avx | Variant::Avx2 => {
            cfg!(all(feature = "simd", target_arch = "x86_64"))
        }
        Variant::Avx512 => cfg!(all(feature = "avx512", target_arch = "x86_64")),
        Variant::Neon => cfg!(all(feature = "simd", target_arch = "aarch64")),
    }
}

/// Whether the running CPU supports `variant`. Cached after the first probe.
pub fn is_available(variant: Variant) -> bool {
    CpuFeatures::cached().supports(variant)
}
