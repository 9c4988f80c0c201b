//! Summing `f32` buffers into an `f64` accumulator.
//!
//! Accumulating millions of `f32` samples in `f32` drifts badly: once the running
//! total is large, each small addend loses most of its mantissa. Every kernel here
//! widens samples to `f64` before adding them, so results agree with a plain
//! sequential `f64` sum up to reassociation error.
//!
//! # Strategies
//!
//! | Function | Strategy | Best For |
//! |----------|----------|----------|
//! | [`sum_scalar`] | Sequential `f64` loop | Reference, tiny buffers |
//! | [`sum_portable`] | `wide` 8-lane load, widen to 2x `f64x4` via lane array | Any target |
//! | [`sum_simd`] | AVX2 / NEON widen-and-accumulate | Single-threaded hot loops |
//! | [`sum_parallel`] | Group-aligned chunks across the rayon pool | Buffers past L2 |
//! | [`mean_abs`] | Parallel `|x|` reduction divided by `n` | Remap curve input |
//!
//! # Widening kernel
//!
//! Each group of 8 samples is loaded as one vector, split into two 4-lane halves,
//! and each half is converted to `f64` and added to a 4-lane `f64` accumulator.
//! After the last full group the accumulator is reduced horizontally (see
//! [`crate::hsum`]) and the `n mod 8` tail samples are added one by one.
//!
//! # Parallel reduction
//!
//! [`sum_parallel`] hands group-aligned chunks of [`PAR_CHUNK`] samples to the
//! pool. Each worker reduces its chunk to a local `f64`, and the partial sums are
//! combined after the join. Only the full groups are distributed; the tail loop
//! runs once on the calling thread afterwards.

use rayon::prelude::*;
use wide::{f32x8, f64x4};

use crate::hsum::hsum_f64x4;

/// Samples per vector group.
pub const GROUP: usize = 8;

/// Samples per parallel work item. Must be a multiple of [`GROUP`].
pub const PAR_CHUNK: usize = 64 * 1024;

const _: () = assert!(PAR_CHUNK % GROUP == 0);

/// Sequential `f64` sum. This is the reference every other variant is checked against.
pub fn sum_scalar(values: &[f32]) -> f64 {
    let mut sum = 0.0f64;
    for &v in values {
        sum += v as f64;
    }
    sum
}

/// Widening sum over portable 8-lane vectors.
pub fn sum_portable(values: &[f32]) -> f64 {
    let mut groups = values.chunks_exact(GROUP);
    let mut acc = f64x4::ZERO;

    for group in &mut groups {
        let mut lanes = [0.0f32; GROUP];
        lanes.copy_from_slice(group);
        let (low, high) = widen(f32x8::from(lanes));
        acc += low;
        acc += high;
    }

    let mut sum = hsum_f64x4(acc);
    for &v in groups.remainder() {
        sum += v as f64;
    }
    sum
}

/// Splits `v` into two `f64x4` halves.
///
/// `wide` has no lane-widening `f32` to `f64` conversion, so this goes through
/// the lane array as eight scalar casts. The vector conversion
/// (`_mm256_cvtps_pd`) lives in the AVX2 kernel.
#[inline]
fn widen(v: f32x8) -> (f64x4, f64x4) {
    let a = v.to_array();
    (
        f64x4::from([a[0] as f64, a[1] as f64, a[2] as f64, a[3] as f64]),
        f64x4::from([a[4] as f64, a[5] as f64, a[6] as f64, a[7] as f64]),
    )
}

/// Widening sum with explicit intrinsics and runtime dispatch.
///
/// Uses AVX2 on x86 and NEON on aarch64, falling back to [`sum_portable`] otherwise.
pub fn sum_simd(values: &[f32]) -> f64 {
    #[cfg(target_arch = "aarch64")]
    {
        // SAFETY: aarch64 guarantees NEON availability.
        unsafe { aarch64_neon::sum_neon(values) }
    }

    #[cfg(any(target_arch = "x86", target_arch = "x86_64"))]
    {
        if crate::dispatch::avx2_enabled() {
            // SAFETY: guarded by AVX2 runtime detection.
            unsafe { x86_avx2::sum_avx2(values) }
        } else {
            sum_portable(values)
        }
    }

    #[cfg(not(any(target_arch = "aarch64", target_arch = "x86", target_arch = "x86_64")))]
    {
        sum_portable(values)
    }
}

/// Multi-core widening sum.
///
/// Full groups are split into [`PAR_CHUNK`]-sized work items reduced with
/// [`sum_simd`]; partial sums are combined after the join, then the tail is added
/// on the calling thread. The order of additions across workers is unspecified,
/// so results match [`sum_scalar`] within tolerance, not bit for bit.
pub fn sum_parallel(values: &[f32]) -> f64 {
    let body_len = values.len() - values.len() % GROUP;
    let (body, tail) = values.split_at(body_len);

    let mut total: f64 = body.par_chunks(PAR_CHUNK).map(sum_simd).sum();

    for &v in tail {
        total += v as f64;
    }
    total
}

/// Mean absolute value, reduced in `f64` across the rayon pool.
///
/// Returns `NaN` for an empty buffer (0 / 0); callers that need a usable mean
/// must check for emptiness first.
pub fn mean_abs(values: &[f32]) -> f64 {
    let total: f64 = values
        .par_chunks(PAR_CHUNK)
        .map(|chunk| chunk.iter().map(|&v| v.abs() as f64).sum::<f64>())
        .sum();
    total / values.len() as f64
}

/// AVX2 widening sum for x86/x86_64.
#[cfg(any(target_arch = "x86", target_arch = "x86_64"))]
#[allow(unsafe_op_in_unsafe_fn)]
mod x86_avx2 {
    #[cfg(target_arch = "x86")]
    use std::arch::x86 as arch;
    #[cfg(target_arch = "x86_64")]
    use std::arch::x86_64 as arch;

    use arch::{
        _mm256_add_pd, _mm256_castps256_ps128, _mm256_cvtps_pd, _mm256_extractf128_ps,
        _mm256_loadu_ps, _mm256_setzero_pd,
    };

    use crate::hsum::x86_avx2::hsum256_pd;

    /// `_mm256_cvtps_pd` turns each 128-bit half (4 floats) into a full `__m256d`,
    /// so one 8-float load feeds two double-precision adds.
    #[target_feature(enable = "avx2")]
    pub unsafe fn sum_avx2(values: &[f32]) -> f64 {
        let len = values.len();
        let ptr = values.as_ptr();
        let mut i = 0usize;
        let mut acc = _mm256_setzero_pd();

        while i + super::GROUP <= len {
            let v = _mm256_loadu_ps(ptr.add(i));
            let low = _mm256_cvtps_pd(_mm256_castps256_ps128(v));
            let high = _mm256_cvtps_pd(_mm256_extractf128_ps(v, 1));
            acc = _mm256_add_pd(acc, low);
            acc = _mm256_add_pd(acc, high);
            i += super::GROUP;
        }

        let mut sum = hsum256_pd(acc);

        // Scalar tail
        while i < len {
            sum += *ptr.add(i) as f64;
            i += 1;
        }

        sum
    }
}

/// NEON widening sum for aarch64.
#[cfg(target_arch = "aarch64")]
#[allow(unsafe_op_in_unsafe_fn)]
mod aarch64_neon {
    use std::arch::aarch64::*;

    use crate::hsum::aarch64_neon::hsum_f64x2x2;

    /// The 4-lane `f64` accumulator is split across two `float64x2_t` registers;
    /// `vcvt_f64_f32` / `vcvt_high_f64_f32` widen the low and high pair of each
    /// 4-float load.
    #[target_feature(enable = "neon")]
    pub unsafe fn sum_neon(values: &[f32]) -> f64 {
        let len = values.len();
        let ptr = values.as_ptr();
        let mut i = 0usize;
        let mut acc_low = vdupq_n_f64(0.0);
        let mut acc_high = vdupq_n_f64(0.0);

        while i + super::GROUP <= len {
            let v0 = vld1q_f32(ptr.add(i));
            let v1 = vld1q_f32(ptr.add(i + 4));
            acc_low = vaddq_f64(acc_low, vcvt_f64_f32(vget_low_f32(v0)));
            acc_high = vaddq_f64(acc_high, vcvt_high_f64_f32(v0));
            acc_low = vaddq_f64(acc_low, vcvt_f64_f32(vget_low_f32(v1)));
            acc_high = vaddq_f64(acc_high, vcvt_high_f64_f32(v1));
            i += super::GROUP;
        }

        let mut sum = hsum_f64x2x2(acc_low, acc_high);

        while i < len {
            sum += *ptr.add(i) as f64;
            i += 1;
        }

        sum
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use proptest::test_runner::TestRunner;

    fn approx_eq(actual: f64, expected: f64, values: &[f32]) -> bool {
        let scale = 1.0 + values.iter().map(|&v| v.abs() as f64).sum::<f64>();
        (actual - expected).abs() <= 1.0e-6 * scale
    }

    #[inline]
    fn next_u64(state: &mut u64) -> u64 {
        let mut x = *state;
        x ^= x >> 12;
        x ^= x << 25;
        x ^= x >> 27;
        *state = x;
        x.wrapping_mul(0x2545_F491_4F6C_DD1D)
    }

    /// Uniform samples in `[1, 2)`.
    fn make_samples(len: usize, seed: u64) -> Vec<f32> {
        let mut state = seed;
        (0..len)
            .map(|_| 1.0 + (next_u64(&mut state) >> 40) as f32 / (1u64 << 24) as f32)
            .collect()
    }

    fn assert_all_variants(values: &[f32]) {
        let expected = sum_scalar(values);
        for (name, actual) in [
            ("portable", sum_portable(values)),
            ("simd", sum_simd(values)),
            ("parallel", sum_parallel(values)),
        ] {
            assert!(
                approx_eq(actual, expected, values),
                "{name}: {actual} != {expected} (len {})",
                values.len()
            );
        }
    }

    fn run_sum_cases(cases: u32, max_len: usize) {
        let mut runner = TestRunner::new(ProptestConfig {
            cases,
            ..ProptestConfig::default()
        });
        let strat = proptest::collection::vec(-1.0e3f32..1.0e3, 0..=max_len);

        runner
            .run(&strat, |values: Vec<f32>| {
                let expected = sum_scalar(&values);
                prop_assert!(approx_eq(sum_portable(&values), expected, &values));
                prop_assert!(approx_eq(sum_simd(&values), expected, &values));
                prop_assert!(approx_eq(sum_parallel(&values), expected, &values));
                Ok(())
            })
            .unwrap();
    }

    #[test]
    fn prop_sum_fast() {
        run_sum_cases(256, 2048);
    }

    #[test]
    #[ignore]
    fn prop_sum_deep() {
        run_sum_cases(1024, 3 * PAR_CHUNK + 7);
    }

    #[test]
    fn sum_one_to_ten() {
        let values: Vec<f32> = (1..=10).map(|v| v as f32).collect();
        assert_eq!(sum_scalar(&values), 55.0);
        assert!((sum_portable(&values) - 55.0).abs() <= 1.0e-6);
        assert!((sum_simd(&values) - 55.0).abs() <= 1.0e-6);
        assert!((sum_parallel(&values) - 55.0).abs() <= 1.0e-6);
    }

    #[test]
    fn sum_empty_and_tiny() {
        assert_eq!(sum_scalar(&[]), 0.0);
        assert_eq!(sum_portable(&[]), 0.0);
        assert_eq!(sum_simd(&[]), 0.0);
        assert_eq!(sum_parallel(&[]), 0.0);

        for len in 1..GROUP {
            let values: Vec<f32> = (0..len).map(|v| v as f32 + 0.5).collect();
            assert_all_variants(&values);
        }
    }

    #[test]
    fn sum_ragged_tail_across_chunks() {
        // Several parallel work items plus a partial group.
        let values = make_samples(2 * PAR_CHUNK + GROUP + 3, 0x5EED_1234_ABCD_0001);
        assert_all_variants(&values);
    }

    #[test]
    fn sum_large_non_multiple_of_group() {
        let values = make_samples(1_000_003, 0xC0FF_EE42_1234_5678);
        assert_all_variants(&values);
    }

    #[test]
    #[ignore]
    fn sum_ten_million_and_three() {
        let values = make_samples(10_000_003, 0xDADA_C0DE_F00D_BEEF);
        assert_all_variants(&values);
    }

    #[test]
    fn widening_beats_f32_accumulation() {
        // 2^24 + 1 is not representable in f32, so an f32 running total stalls at 2^24.
        let values = vec![1.0f32; (1 << 24) + 64];
        let expected = values.len() as f64;
        assert_eq!(sum_scalar(&values), expected);
        assert_eq!(sum_simd(&values), expected);
        assert_eq!(sum_parallel(&values), expected);
    }

    #[test]
    fn mean_abs_ignores_sign() {
        let values = [-1.0f32, 2.0, -3.0, 4.0];
        assert_eq!(mean_abs(&values), 2.5);
        assert!(mean_abs(&[]).is_nan());
    }
}
