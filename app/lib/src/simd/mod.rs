//! Instruction-set variants, benchmarking and per-family dispatch.
//!
//! Every kernel family has one implementation per instruction set it benefits
//! from:
//!
//! - **Scalar**: portable fallback, always present, and the baseline
//! - **Auto**: portable block code left to the compiler's auto-vectorizer
//! - **SSE2 / SSE4.1 / AVX / AVX2 / AVX-512**: x86_64 intrinsics
//! - **NEON**: ARM64 intrinsics
//!
//! Which of these are compiled is decided by cargo features and the target
//! architecture ([`is_enabled`]); which may run is decided once per process by
//! probing the CPU ([`is_available`]). A [`KernelFamily`] benchmarks the
//! candidates that pass both checks and keeps the fastest.
//!
//! # Example
//!
//! ```rust
//! use pktgen_kernels::simd::{is_available, is_enabled, CpuFeatures, Variant};
//!
//! let features = CpuFeatures::cached();
//! println!("CPU features: {:?}", features);
//! assert!(is_enabled(Variant::Scalar) && is_available(Variant::Scalar));
//! ```

pub mod bench;
pub mod dispatcher;
mod variant;

pub(crate) mod auto;
pub(crate) mod scalar;

#[cfg(all(feature = "simd", target_arch = "x86_64"))]
pub(crate) mod avx;
#[cfg(all(feature = "simd", target_arch = "x86_64"))]
pub(crate) mod avx2;
#[cfg(all(feature = "simd", target_arch = "x86_64"))]
pub(crate) mod sse2;
#[cfg(all(feature = "simd", target_arch = "x86_64"))]
pub(crate) mod sse4;

#[cfg(all(feature = "avx512", target_arch = "x86_64"))]
pub(crate) mod avx512;

#[cfg(all(feature = "simd", target_arch = "aarch64"))]
pub(crate) mod neon;

pub use dispatcher::{CandidateTiming, FamilyReport, FamilyResolver, KernelFamily, Resolution};
pub use variant::{is_available, is_enabled, CpuFeatures, Variant};
