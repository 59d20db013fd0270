//! # Packet Traffic Kernels
//!
//! Low-level data kernels for a packet traffic generator and analyzer: the
//! byte-crunching that sits on the per-packet path of a test-traffic pipeline.
//!
//! ## Features
//!
//! - **PRBS23 test patterns**: fill payloads with a self-synchronizing
//!   pseudo-random sequence and count received bit errors
//! - **Internet checksum**: IPv4 header and TCP/UDP pseudo-header checksums
//! - **Signatures**: encode, decode and CRC-filter the 20-byte in-band record
//!   that identifies generated packets
//! - **Fills**: constant, incrementing and decrementing payload bytes
//! - **Histograms**: masked bucket counting over packed hardware counters
//! - **Runtime dispatch**: every kernel family has scalar, auto-vectorized,
//!   SSE2/SSE4.1/AVX/AVX2/AVX-512 and NEON variants; the fastest one the CPU
//!   supports is picked by a short benchmark, once per process
//! - **Thread-safe**: all public types implement `Send + Sync`
//!
//! ## Quick Start
//!
//! ```rust
//! use pktgen_kernels::batch;
//! use pktgen_kernels::Signature;
//!
//! // Pay the dispatch cost up front (optional; it happens on first use too).
//! batch::init();
//!
//! // Stamp three packets with signatures.
//! let mut packets = vec![[0u8; 64]; 3];
//! {
//!     let mut dests: Vec<&mut [u8]> = packets.iter_mut().map(|p| &mut p[..]).collect();
//!     batch::encode_signatures(&mut dests, &[7, 7, 7], &[0, 1, 2], 0, 1_000)?;
//! }
//!
//! // Decode them back.
//! let candidates: Vec<&[u8]> = packets.iter().map(|p| &p[..]).collect();
//! let mut out = vec![Signature::default(); 3];
//! let n = batch::decode_signatures(&candidates, &mut out)?;
//! assert_eq!(n, 3);
//! assert_eq!(out[2].timestamp, 1_002);
//! # Ok::<(), pktgen_kernels::KernelError>(())
//! ```
//!
//! ## Configuration
//!
//! Dispatch reads two environment variables once per process:
//!
//! - `PKTGEN_KERNELS_DEBUG`: any value other than `0` logs every candidate's
//!   latency and the chosen variant when a family is resolved
//! - `PKTGEN_KERNELS_DISABLE`: comma-separated variants to exclude, e.g.
//!   `avx512,avx2`
//!
//! Tests and tools that want a specific candidate set can resolve a family
//! explicitly with a [`DispatchConfig`] before first use:
//!
//! ```rust
//! use pktgen_kernels::kernels::families::PRBS_FILL;
//! use pktgen_kernels::{DispatchConfig, SimdConfig, Variant};
//!
//! let config = DispatchConfig::new().with_simd_config(SimdConfig::disabled());
//! let chosen = PRBS_FILL.resolve(&config).variant();
//! assert_eq!(chosen, Variant::Scalar);
//! ```
//!
//! ## Thread Safety
//!
//! Each kernel family resolves at most once; racing callers block until the
//! single resolution finishes and then all see the same entry point. After
//! that, kernels touch only the caller's buffers.

#![warn(missing_docs)]
#![warn(clippy::all)]

// Module declarations
pub mod batch;
pub mod config;
pub mod error;
pub mod kernels;
pub mod simd;

// C FFI bindings (optional)
#[cfg(feature = "ffi")]
pub mod ffi;

// Re-exports for convenience
pub use config::{DispatchConfig, SimdConfig};
pub use error::{KernelError, Result};
pub use kernels::{Signature, SignatureFlags, TimestampPosition};
pub use simd::{
    CandidateTiming, CpuFeatures, FamilyReport, FamilyResolver, KernelFamily, Resolution,
    Variant,
};
