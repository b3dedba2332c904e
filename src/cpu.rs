use std::sync::OnceLock;

/// The set of CPU capabilities the emission API consults before accepting an
/// instruction request. Computed once per process; immutable thereafter.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct CpuFeatures {
    /// Hardware floating point. Always present on x86_64 (SSE2 is baseline).
    pub fpu: bool,
    /// 128-bit vector operations.
    pub sse2: bool,
    /// Lane insert/extract and widening vector moves.
    pub sse41: bool,
    /// 256-bit vector operations.
    pub avx2: bool,
    /// Direct leading/trailing zero count instructions.
    pub lzcnt: bool,
    pub tzcnt: bool,
    /// Single-instruction atomic compare-exchange on naturally aligned words.
    pub cmpxchg: bool,
}

impl CpuFeatures {
    /// Probes the host CPU.
    #[cfg(target_arch = "x86_64")]
    fn detect() -> Self {
        CpuFeatures {
            fpu: true,
            sse2: is_x86_feature_detected!("sse2"),
            sse41: is_x86_feature_detected!("sse4.1"),
            avx2: is_x86_feature_detected!("avx2"),
            lzcnt: is_x86_feature_detected!("lzcnt"),
            tzcnt: is_x86_feature_detected!("bmi1"),
            cmpxchg: true,
        }
    }

    #[cfg(not(target_arch = "x86_64"))]
    fn detect() -> Self {
        CpuFeatures {
            fpu: false,
            sse2: false,
            sse41: false,
            avx2: false,
            lzcnt: false,
            tzcnt: false,
            cmpxchg: false,
        }
    }

    /// A feature set with everything switched off, for exercising the
    /// capability-rejection paths in tests.
    pub fn none() -> Self {
        CpuFeatures {
            fpu: false,
            sse2: false,
            sse41: false,
            avx2: false,
            lzcnt: false,
            tzcnt: false,
            cmpxchg: false,
        }
    }
}

static FEATURES: OnceLock<CpuFeatures> = OnceLock::new();

/// The host CPU's capabilities. The first call probes; later calls are reads.
pub fn features() -> &'static CpuFeatures {
    FEATURES.get_or_init(CpuFeatures::detect)
}

/// Human-readable name of the active code generation target.
pub fn platform_name() -> &'static str {
    #[cfg(target_arch = "x86_64")]
    { "x86_64" }
    #[cfg(not(target_arch = "x86_64"))]
    { "unsupported" }
}

//-----------------------------------------------------------------------------
