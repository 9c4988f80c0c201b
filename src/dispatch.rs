//! Runtime selection between the explicit-intrinsic kernels and their fallbacks.
//!
//! On x86 the AVX2 paths are chosen when the CPU reports support, unless the
//! `SIMD_KERNELS_NO_AVX2` environment variable opts out. On aarch64 NEON is
//! part of the baseline ISA, so the NEON paths are always taken. Every other
//! target falls back to the scalar or portable kernels.

#[cfg(any(target_arch = "x86", target_arch = "x86_64"))]
use std::sync::OnceLock;

/// Environment variable that forces the non-AVX2 fallback on x86.
pub const NO_AVX2_ENV: &str = "SIMD_KERNELS_NO_AVX2";

/// Runtime detection for AVX2 support.
pub fn avx2_available() -> bool {
    #[cfg(any(target_arch = "x86", target_arch = "x86_64"))]
    {
        std::arch::is_x86_feature_detected!("avx2")
    }

    #[cfg(not(any(target_arch = "x86", target_arch = "x86_64")))]
    {
        false
    }
}

/// Whether the explicit-intrinsic kernels will actually run on this machine.
///
/// This is `true` on aarch64, and on x86 when AVX2 is detected and has not been
/// disabled through [`NO_AVX2_ENV`].
pub fn simd_available() -> bool {
    #[cfg(target_arch = "aarch64")]
    {
        true
    }

    #[cfg(any(target_arch = "x86", target_arch = "x86_64"))]
    {
        avx2_enabled()
    }

    #[cfg(not(any(target_arch = "aarch64", target_arch = "x86", target_arch = "x86_64")))]
    {
        false
    }
}

#[cfg(any(target_arch = "x86", target_arch = "x86_64"))]
pub(crate) fn avx2_enabled() -> bool {
    static ENABLED: OnceLock<bool> = OnceLock::new();
    *ENABLED.get_or_init(|| {
        let opted_out = std::env::var(NO_AVX2_ENV)
            .map(|v| parse_flag(&v))
            .unwrap_or(false);
        let enabled = avx2_available() && !opted_out;
        log::debug!(
            "avx2 kernels {} (detected={}, opted_out={})",
            if enabled { "enabled" } else { "disabled" },
            avx2_available(),
            opted_out
        );
        enabled
    })
}

#[cfg_attr(
    not(any(target_arch = "x86", target_arch = "x86_64")),
    allow(dead_code)
)]
fn parse_flag(value: &str) -> bool {
    let v = value.trim().to_ascii_lowercase();
    matches!(v.as_str(), "1" | "true" | "yes" | "on")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn flag_parsing_accepts_common_truthy_values() {
        for v in ["1", "true", "TRUE", "yes", "On", " on "] {
            assert!(parse_flag(v), "{v:?} should enable the flag");
        }
        for v in ["0", "false", "no", "off", "", "2"] {
            assert!(!parse_flag(v), "{v:?} should not enable the flag");
        }
    }

    #[test]
    fn simd_requires_hardware_support_on_x86() {
        #[cfg(any(target_arch = "x86", target_arch = "x86_64"))]
        {
            if !avx2_available() {
                assert!(!simd_available());
            }
        }

        #[cfg(target_arch = "aarch64")]
        assert!(simd_available());
    }
}
