//! Per-family kernel dispatch with one-time benchmark-driven resolution.
//!
//! A [`KernelFamily`] owns every compiled entry point for one operation. On
//! first use it benchmarks the eligible candidates against a representative
//! workload and caches the fastest; every later call goes straight to the
//! cached entry point.
//!
//! # Example
//!
//! ```rust
//! use pktgen_kernels::config::DispatchConfig;
//! use pktgen_kernels::kernels::families::PRBS_FILL;
//! use pktgen_kernels::simd::Variant;
//!
//! let resolution = PRBS_FILL.resolve(&DispatchConfig::scalar_only());
//! println!("{}: {}", PRBS_FILL.name(), resolution.variant());
//! assert_eq!(resolution.variant(), Variant::Scalar);
//! ```

use std::sync::OnceLock;
use std::time::Duration;

use log::info;
use serde::Serialize;

use super::variant::{is_available, is_enabled, Variant};
use crate::config::{DispatchConfig, SimdConfig};

/// Measured latency of one candidate during resolution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct CandidateTiming {
    /// Candidate variant.
    pub variant: Variant,
    /// Minimum running-mean latency of one call, in nanoseconds.
    pub latency_ns: u64,
}

/// The outcome of resolving a family. Never changes once published.
#[derive(Debug, Clone)]
pub struct Resolution<F> {
    variant: Variant,
    entry: F,
    timings: Vec<CandidateTiming>,
}

impl<F: Copy> Resolution<F> {
    /// The chosen variant.
    pub fn variant(&self) -> Variant {
        self.variant
    }

    /// The chosen entry point.
    pub fn entry(&self) -> F {
        self.entry
    }

    /// Latency of every candidate that took part, in enumeration order.
    pub fn timings(&self) -> &[CandidateTiming] {
        &self.timings
    }

    /// Speedup of the winner over the scalar baseline, in percent.
    pub fn speedup_percent(&self) -> Option<f64> {
        let scalar = self.timing(Variant::Scalar)?;
        let winner = self.timing(self.variant)?;
        if winner == 0 {
            return None;
        }
        Some((scalar as f64 / winner as f64 - 1.0) * 100.0)
    }

    fn timing(&self, variant: Variant) -> Option<u64> {
        self.timings
            .iter()
            .find(|t| t.variant == variant)
            .map(|t| t.latency_ns)
    }
}

/// Summary of one family's resolution, for diagnostics.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FamilyReport {
    /// Family label.
    pub family: &'static str,
    /// Chosen variant.
    pub variant: Variant,
    /// Speedup of the winner over scalar, in percent.
    pub speedup_percent: Option<f64>,
    /// Latency of every candidate.
    pub timings: Vec<CandidateTiming>,
}

/// Every entry point compiled for one operation, and the cached winner.
///
/// `F` is an `unsafe fn` pointer type. Candidates other than scalar may
/// require CPU features; the family only ever calls or hands out entries
/// whose variant is both compiled in and supported by the running CPU.
pub struct KernelFamily<F: 'static> {
    name: &'static str,
    candidates: &'static [(Variant, F)],
    workload: fn(F) -> Duration,
    resolved: OnceLock<Resolution<F>>,
}

impl<F: Copy + Send + Sync + 'static> KernelFamily<F> {
    /// Create a family.
    ///
    /// `candidates` must start with the scalar entry. `workload` times a
    /// single candidate; it is only ever passed eligible entries.
    pub const fn new(
        name: &'static str,
        candidates: &'static [(Variant, F)],
        workload: fn(F) -> Duration,
    ) -> Self {
        assert!(!candidates.is_empty(), "a kernel family needs candidates");
        assert!(
            matches!(candidates[0].0, Variant::Scalar),
            "the first candidate must be scalar"
        );
        Self {
            name,
            candidates,
            workload,
            resolved: OnceLock::new(),
        }
    }

    /// Human-readable family label.
    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Every compiled candidate variant, eligible or not.
    pub fn variants(&self) -> impl Iterator<Item = Variant> + '_ {
        self.candidates.iter().map(|&(v, _)| v)
    }

    /// Candidates allowed to compete under `config`, in enumeration order.
    pub fn eligible<'a>(&'a self, config: &'a SimdConfig) -> impl Iterator<Item = (Variant, F)> + 'a {
        self.candidates.iter().copied().filter(move |&(variant, _)| {
            is_enabled(variant)
                && (variant == Variant::Scalar || is_available(variant))
                && config.allows(variant)
        })
    }

    /// The entry for `variant` if it can run on this machine.
    pub fn runnable(&self, variant: Variant) -> Option<F> {
        self.eligible(&SimdConfig::default())
            .find(|&(v, _)| v == variant)
            .map(|(_, f)| f)
    }

    /// Benchmark every eligible candidate and pick the fastest.
    ///
    /// Ties go to the earlier candidate, so scalar wins a tie.
    pub fn select(&self, config: &DispatchConfig) -> Resolution<F> {
        let (scalar_variant, scalar_entry) = self.candidates[0];
        let mut best = (scalar_variant, scalar_entry, u64::MAX);
        let mut timings = Vec::with_capacity(self.candidates.len());

        for (variant, entry) in self.eligible(&config.simd) {
            let latency_ns = (self.workload)(entry).as_nanos().min(u64::MAX as u128) as u64;
            timings.push(CandidateTiming {
                variant,
                latency_ns,
            });
            if latency_ns < best.2 {
                best = (variant, entry, latency_ns);
            }
        }

        let resolution = Resolution {
            variant: best.0,
            entry: best.1,
            timings,
        };
        if config.debug {
            self.log_resolution(&resolution);
        }
        resolution
    }

    fn log_resolution(&self, resolution: &Resolution<F>) {
        for timing in resolution.timings() {
            info!(
                "{}: candidate {} took {} ns",
                self.name, timing.variant, timing.latency_ns
            );
        }
        match resolution.speedup_percent() {
            Some(speedup) => info!(
                "{}: using {} ({:+.1}% vs Scalar)",
                self.name, resolution.variant, speedup
            ),
            None => info!("{}: using {}", self.name, resolution.variant),
        }
    }

    /// Resolve once with `config`; later calls return the first result.
    pub fn resolve(&self, config: &DispatchConfig) -> &Resolution<F> {
        self.resolved.get_or_init(|| self.select(config))
    }

    /// The resolved entry point, resolving with the process configuration on
    /// first use.
    #[inline]
    pub fn get(&self) -> F {
        self.resolve(DispatchConfig::global()).entry
    }

    /// The resolution, if one has happened.
    pub fn resolution(&self) -> Option<&Resolution<F>> {
        self.resolved.get()
    }

    /// Diagnostics for this family, resolving if necessary.
    pub fn report(&self, config: &DispatchConfig) -> FamilyReport {
        let resolution = self.resolve(config);
        FamilyReport {
            family: self.name,
            variant: resolution.variant,
            speedup_percent: resolution.speedup_percent(),
            timings: resolution.timings.clone(),
        }
    }
}

/// Object-safe view of a family, so families of different entry types can
/// sit in one registry.
pub trait FamilyResolver: Sync {
    /// Family label.
    fn name(&self) -> &'static str;

    /// Resolve with `config` if not yet resolved; returns the chosen variant.
    fn resolve_variant(&self, config: &DispatchConfig) -> Variant;

    /// Resolution summary.
    fn report(&self, config: &DispatchConfig) -> FamilyReport;
}

impl<F: Copy + Send + Sync + 'static> FamilyResolver for KernelFamily<F> {
    fn name(&self) -> &'static str {
        self.name
    }

    fn resolve_variant(&self, config: &DispatchConfig) -> Variant {
        self.resolve(config).variant
    }

    fn report(&self, config: &DispatchConfig) -> FamilyReport {
        KernelFamily::report(self, config)
    }
}
