//! Horizontal reduction: collapsing the lanes of one vector into a scalar.
//!
//! Every variant follows the same shape. Split the register into its lower and
//! upper halves, add them elementwise, and repeat on the (now half-width) result
//! until a single value remains in lane 0.
//!
//! | Function | Input | Notes |
//! |----------|-------|-------|
//! | [`fold_halves`] | `[T; N]` lane array | Width-generic; any `N > 0` |
//! | [`hsum_f32x8`] | [`wide::f32x8`] | Portable, returns `f32` |
//! | [`hsum_f64x4`] | [`wide::f64x4`] | Portable, returns `f64` |
//! | `x86_avx2::hsum256_ps` | `__m256` | `extractf128` + `add_ps` + 2x `hadd_ps` |
//! | `x86_avx2::hsum256_pd` | `__m256d` | `extractf128` + `add_pd` + `hadd_pd` |
//! | `aarch64_neon::hsum_f64x2x2` | two `float64x2_t` halves | `vaddq` + `vpaddd` |
//!
//! The `f32` reducers return `f32`. Summing large buffers through them loses
//! precision quickly, which is why the summation kernels widen to `f64` before
//! accumulating and only reduce the `f64` accumulator.

use std::ops::Add;

use wide::{f32x8, f64x4};

/// Sums an array of lanes by repeatedly folding the upper half onto the lower half.
///
/// For power-of-two widths this is exactly the split-and-add tree the hardware
/// reducers use. Odd widths fold the trailing lanes onto the leading ones, so any
/// `N > 0` is accepted; `N == 0` is rejected at compile time.
#[inline]
pub fn fold_halves<T, const N: usize>(mut lanes: [T; N]) -> T
where
    T: Copy + Add<Output = T>,
{
    const { assert!(N > 0, "cannot reduce an empty register") };

    let mut width = N;
    while width > 1 {
        let half = width / 2;
        let upper = width - half;
        for i in 0..half {
            lanes[i] = lanes[i] + lanes[upper + i];
        }
        width = upper;
    }
    lanes[0]
}

/// Sum of the 8 single-precision lanes of `v`.
#[inline]
pub fn hsum_f32x8(v: f32x8) -> f32 {
    fold_halves(v.to_array())
}

/// Sum of the 4 double-precision lanes of `v`.
#[inline]
pub fn hsum_f64x4(v: f64x4) -> f64 {
    fold_halves(v.to_array())
}

/// AVX2 reducers over raw `__m256`/`__m256d` registers.
#[cfg(any(target_arch = "x86", target_arch = "x86_64"))]
#[allow(unsafe_op_in_unsafe_fn)]
pub mod x86_avx2 {
    #[cfg(target_arch = "x86")]
    use std::arch::x86 as arch;
    #[cfg(target_arch = "x86_64")]
    use std::arch::x86_64 as arch;

    use arch::{
        __m256, __m256d, _mm_add_pd, _mm_add_ps, _mm_cvtsd_f64, _mm_cvtss_f32, _mm_hadd_pd,
        _mm_hadd_ps, _mm256_castpd256_pd128, _mm256_castps256_ps128, _mm256_extractf128_pd,
        _mm256_extractf128_ps,
    };

    /// Sum of the 8 packed `f32` lanes of `v`.
    ///
    /// # Safety
    ///
    /// The CPU must support AVX2 (see [`crate::avx2_available`]).
    #[inline]
    #[target_feature(enable = "avx2")]
    pub unsafe fn hsum256_ps(v: __m256) -> f32 {
        let low = _mm256_castps256_ps128(v);
        let high = _mm256_extractf128_ps(v, 1);
        let mut sum = _mm_add_ps(low, high);
        // [a, b, c, d] -> [a+b, c+d, ..] -> [a+b+c+d, ..]
        sum = _mm_hadd_ps(sum, sum);
        sum = _mm_hadd_ps(sum, sum);
        _mm_cvtss_f32(sum)
    }

    /// Sum of the 4 packed `f64` lanes of `v`.
    ///
    /// # Safety
    ///
    /// The CPU must support AVX2 (see [`crate::avx2_available`]).
    #[inline]
    #[target_feature(enable = "avx2")]
    pub unsafe fn hsum256_pd(v: __m256d) -> f64 {
        let low = _mm256_castpd256_pd128(v);
        let high = _mm256_extractf128_pd(v, 1);
        let sum = _mm_add_pd(low, high);
        _mm_cvtsd_f64(_mm_hadd_pd(sum, sum))
    }
}

/// NEON reducers. A 4-wide `f64` accumulator is held as two `float64x2_t` halves.
#[cfg(target_arch = "aarch64")]
#[allow(unsafe_op_in_unsafe_fn)]
pub mod aarch64_neon {
    use std::arch::aarch64::{
        float32x4_t, float64x2_t, vaddq_f32, vaddq_f64, vgetq_lane_f32, vpaddd_f64, vpaddq_f32,
    };

    /// Sum of the 8 `f32` lanes held in `low` and `high`.
    ///
    /// # Safety
    ///
    /// NEON is baseline on aarch64; the function is `unsafe` only because it is
    /// compiled with `#[target_feature]`.
    #[inline]
    #[target_feature(enable = "neon")]
    pub unsafe fn hsum_f32x4x2(low: float32x4_t, high: float32x4_t) -> f32 {
        let mut sum = vaddq_f32(low, high);
        sum = vpaddq_f32(sum, sum);
        sum = vpaddq_f32(sum, sum);
        vgetq_lane_f32(sum, 0)
    }

    /// Sum of the 4 `f64` lanes held in `low` and `high`.
    ///
    /// # Safety
    ///
    /// See [`hsum_f32x4x2`].
    #[inline]
    #[target_feature(enable = "neon")]
    pub unsafe fn hsum_f64x2x2(low: float64x2_t, high: float64x2_t) -> f64 {
        vpaddd_f64(vaddq_f64(low, high))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn approx_eq(a: f64, b: f64) -> bool {
        let scale = 1.0 + a.abs().max(b.abs());
        (a - b).abs() <= 1.0e-6 * scale
    }

    proptest! {
        #[test]
        fn fold_matches_iterator_sum(lanes in proptest::array::uniform8(-1.0e3f64..1.0e3)) {
            let expected: f64 = lanes.iter().sum();
            prop_assert!(approx_eq(fold_halves(lanes), expected));
        }

        #[test]
        fn f32x8_reduction_matches_lane_sum(lanes in proptest::array::uniform8(-1.0e3f32..1.0e3)) {
            let expected: f64 = lanes.iter().map(|&v| v as f64).sum();
            prop_assert!(approx_eq(hsum_f32x8(f32x8::from(lanes)) as f64, expected));
        }
    }

    #[test]
    fn fold_handles_odd_widths() {
        assert_eq!(fold_halves([7]), 7);
        assert_eq!(fold_halves([1, 2, 3]), 6);
        assert_eq!(fold_halves([1, 2, 3, 4, 5]), 15);
        assert_eq!(fold_halves([1u64, 2, 3, 4, 5, 6, 7]), 28);
    }

    #[test]
    fn portable_reducers_basic() {
        let v = f32x8::from([1.0, 2.0, 3.0, 4.0, 5.0, 6.0, 7.0, 8.0]);
        assert_eq!(hsum_f32x8(v), 36.0);

        let d = f64x4::from([0.5, 1.5, 2.5, 3.5]);
        assert_eq!(hsum_f64x4(d), 8.0);
    }

    #[cfg(any(target_arch = "x86", target_arch = "x86_64"))]
    #[test]
    fn avx2_reducers_basic() {
        #[cfg(target_arch = "x86")]
        use std::arch::x86::{_mm256_setr_pd, _mm256_setr_ps};
        #[cfg(target_arch = "x86_64")]
        use std::arch::x86_64::{_mm256_setr_pd, _mm256_setr_ps};

        if !crate::avx2_available() {
            return;
        }

        // SAFETY: guarded by AVX2 runtime detection.
        unsafe {
            let v = _mm256_setr_ps(1.0, 2.0, 3.0, 4.0, 5.0, 6.0, 7.0, 8.0);
            assert_eq!(x86_avx2::hsum256_ps(v), 36.0);

            let d = _mm256_setr_pd(0.5, 1.5, 2.5, 3.5);
            assert_eq!(x86_avx2::hsum256_pd(d), 8.0);
        }
    }

    #[cfg(target_arch = "aarch64")]
    #[test]
    fn neon_reducers_basic() {
        use std::arch::aarch64::{vld1q_f32, vld1q_f64};

        let singles = [1.0f32, 2.0, 3.0, 4.0, 5.0, 6.0, 7.0, 8.0];
        let doubles = [0.5f64, 1.5, 2.5, 3.5];
        // SAFETY: aarch64 guarantees NEON; the arrays cover every load.
        unsafe {
            let low = vld1q_f32(singles.as_ptr());
            let high = vld1q_f32(singles.as_ptr().add(4));
            assert_eq!(aarch64_neon::hsum_f32x4x2(low, high), 36.0);

            let low = vld1q_f64(doubles.as_ptr());
            let high = vld1q_f64(doubles.as_ptr().add(2));
            assert_eq!(aarch64_neon::hsum_f64x2x2(low, high), 8.0);
        }
    }
}
