//! Configuration types for the packet kernel library.
//!
//! Configuration is read once per process and handed explicitly to kernel
//! resolution; nothing below the dispatcher looks at the environment.

use std::sync::OnceLock;

use log::warn;

use crate::simd::Variant;

/// Environment variable enabling the one-time resolution diagnostic log.
///
/// Any value other than `"0"` turns the log on.
pub const DEBUG_ENV: &str = "PKTGEN_KERNELS_DEBUG";

/// Environment variable listing variants to exclude, comma separated.
pub const DISABLE_ENV: &str = "PKTGEN_KERNELS_DISABLE";

/// SIMD instruction set configuration.
///
/// Controls which instruction sets may compete during kernel resolution. A
/// variant still has to be compiled in and supported by the CPU; this only
/// narrows the field further. Scalar can never be switched off.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SimdConfig {
    /// Allow the portable auto-vectorized kernels.
    ///
    /// Default: true
    pub enable_auto: bool,

    /// Allow SSE2 kernels (x86_64 only).
    ///
    /// Default: true
    pub enable_sse2: bool,

    /// Allow SSE4.1 kernels (x86_64 only).
    ///
    /// Default: true
    pub enable_sse4: bool,

    /// Allow AVX kernels (x86_64 only).
    ///
    /// Default: true
    pub enable_avx: bool,

    /// Allow AVX2 kernels (x86_64 only).
    ///
    /// Default: true
    pub enable_avx2: bool,

    /// Allow AVX-512 kernels (x86_64 only).
    ///
    /// Default: true
    pub enable_avx512: bool,

    /// Allow NEON kernels (ARM64 only).
    ///
    /// Default: true
    pub enable_neon: bool,
}

impl Default for SimdConfig {
    fn default() -> Self {
        Self {
            enable_auto: true,
            enable_sse2: true,
            enable_sse4: true,
            enable_avx: true,
            enable_avx2: true,
            enable_avx512: true,
            enable_neon: true,
        }
    }
}

impl SimdConfig {
    /// Create a new SIMD configuration with all instruction sets enabled.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a configuration with every variant except scalar disabled.
    pub fn disabled() -> Self {
        Self {
            enable_auto: false,
            enable_sse2: false,
            enable_sse4: false,
            enable_avx: false,
            enable_avx2: false,
            enable_avx512: false,
            enable_neon: false,
        }
    }

    /// Enable or disable the auto-vectorized kernels.
    pub fn with_auto(mut self, enable: bool) -> Self {
        self.enable_auto = enable;
        self
    }

    /// Enable or disable SSE2 kernels.
    pub fn with_sse2(mut self, enable: bool) -> Self {
        self.enable_sse2 = enable;
        self
    }

    /// Enable or disable SSE4.1 kernels.
    pub fn with_sse4(mut self, enable: bool) -> Self {
        self.enable_sse4 = enable;
        self
    }

    /// Enable or disable AVX kernels.
    pub fn with_avx(mut self, enable: bool) -> Self {
        self.enable_avx = enable;
        self
    }

    /// Enable or disable AVX2 kernels.
    pub fn with_avx2(mut self, enable: bool) -> Self {
        self.enable_avx2 = enable;
        self
    }

    /// Enable or disable AVX-512 kernels.
    pub fn with_avx512(mut self, enable: bool) -> Self {
        self.enable_avx512 = enable;
        self
    }

    /// Enable or disable NEON kernels.
    pub fn with_neon(mut self, enable: bool) -> Self {
        self.enable_neon = enable;
        self
    }

    /// Enable or disable a single variant by value.
    ///
    /// Requests to disable [`Variant::Scalar`] are ignored.
    pub fn with_variant(self, variant: Variant, enable: bool) -> Self {
        match variant {
            Variant::Scalar => self,
            Variant::Auto => self.with_auto(enable),
            Variant::Sse2 => self.with_sse2(enable),
            Variant::Sse4 => self.with_sse4(enable),
            Variant::Avx => self.with_avx(enable),
            Variant::Avx2 => self.with_avx2(enable),
            Variant::Avx512 => self.with_avx512(enable),
            Variant::Neon => self.with_neon(enable),
        }
    }

    /// Whether this configuration lets `variant` compete.
    pub fn allows(&self, variant: Variant) -> bool {
        match variant {
            Variant::Scalar => true,
            Variant::Auto => self.enable_auto,
            Variant::Sse2 => self.enable_sse2,
            Variant::Sse4 => self.enable_sse4,
            Variant::Avx => self.enable_avx,
            Variant::Avx2 => self.enable_avx2,
            Variant::Avx512 => self.enable_avx512,
            Variant::Neon => self.enable_neon,
        }
    }

    /// Check if any variant besides scalar is enabled.
    pub fn is_any_enabled(&self) -> bool {
        Variant::ALL[1..].iter().any(|&v| self.allows(v))
    }
}

/// Configuration consumed by kernel resolution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct DispatchConfig {
    /// Log every candidate's latency and the chosen variant when resolving.
    ///
    /// Default: false
    pub debug: bool,

    /// Which variants may compete.
    pub simd: SimdConfig,
}

impl DispatchConfig {
    /// Create a new configuration with default values.
    pub fn new() -> Self {
        Self::default()
    }

    /// A configuration where only the scalar kernels compete.
    pub fn scalar_only() -> Self {
        Self::default().with_simd_config(SimdConfig::disabled())
    }

    /// Set the debug switch.
    pub fn with_debug(mut self, debug: bool) -> Self {
        self.debug = debug;
        self
    }

    /// Set the SIMD configuration.
    pub fn with_simd_config(mut self, config: SimdConfig) -> Self {
        self.simd = config;
        self
    }

    /// Build a configuration from the process environment.
    pub fn from_env() -> Self {
        let debug = std::env::var(DEBUG_ENV).ok();
        let disable = std::env::var(DISABLE_ENV).ok();
        Self::from_values(debug.as_deref(), disable.as_deref())
    }

    /// Build a configuration from raw debug-switch and disable-list values.
    pub fn from_values(debug: Option<&str>, disable: Option<&str>) -> Self {
        let mut simd = SimdConfig::default();
        for name in disable.unwrap_or("").split(',').filter(|s| !s.trim().is_empty()) {
            match name.parse::<Variant>() {
                Ok(variant) => simd = simd.with_variant(variant, false),
                Err(e) => warn!("{}: ignoring entry: {}", DISABLE_ENV, e),
            }
        }
        if disable.is_some() && !simd.is_any_enabled() {
            warn!("{}: every variant but Scalar is disabled", DISABLE_ENV);
        }
        Self {
            debug: debug.is_some_and(|v| v != "0"),
            simd,
        }
    }

    /// The process-wide configuration, read from the environment on first use.
    pub fn global() -> &'static DispatchConfig {
        static GLOBAL: OnceLock<DispatchConfig> = OnceLock::new();
        GLOBAL.get_or_init(DispatchConfig::from_env)
    }
}
