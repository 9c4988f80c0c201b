//! Log-compression remap of sample magnitudes into the 8-bit display range.
//!
//! The curve is anchored on the buffer itself. With `mean` the mean absolute
//! value, the low clip point is `C_L = 0.8 * mean` and
//!
//! ```text
//! slope    = (255 - dmin) / log10(C_L)
//! constant = dmin - slope * log10(C_L)
//! out      = clamp(slope * log10(max(|x|, EPS)) + constant, 0, 255)
//! ```
//!
//! so a sample of magnitude `C_L` lands on `dmin`. `EPS` keeps `log10` away from
//! zero. The high clip point `C_H = mmult * C_L` is derived and reported on
//! [`LogCurve`] but does not take part in the mapping.
//!
//! # Strategies
//!
//! | Kernel | Strategy |
//! |--------|----------|
//! | [`RemapKernel::Scalar`] | `f32::log10` per element |
//! | [`RemapKernel::Simd`] | AVX2 (8 lanes) / NEON (4 lanes) abs, max and clamp; `log10` per lane in a scalar loop |
//! | [`RemapKernel::Portable`] | Fully vectorized through [`Batch`], including `log10` |
//!
//! All three run the elementwise pass in parallel over disjoint, group-aligned
//! output chunks of [`REMAP_CHUNK`] samples. Only the last chunk can end in a
//! partial vector group, which a scalar tail loop handles.
//!
//! # Precision
//!
//! The scalar and intrinsic kernels evaluate the same `f32` expression per lane
//! and agree exactly on finite input. The portable kernel uses a polynomial `ln`
//! and agrees with them within 1e-4 display units. On the unchecked path every
//! kernel passes `NaN` through the clamp unchanged.

use rayon::prelude::*;
use wide::f32x8;

use crate::batch::Batch;
use crate::error::RemapError;
use crate::sum::mean_abs;

/// Floor applied to magnitudes before taking `log10`.
pub const EPS: f32 = 1.0e-5;

/// Upper end of the display range; the lower end is `0`.
pub const DISPLAY_MAX: f32 = 255.0;

/// `C_L = LOW_CLIP_FACTOR * mean`.
pub const LOW_CLIP_FACTOR: f32 = 0.8;

/// Samples per parallel work item. Multiple of every vector width used here.
pub const REMAP_CHUNK: usize = 32 * 1024;

const _: () = assert!(REMAP_CHUNK % 8 == 0);

/// Display settings and buffer shape for one remap call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RemapParams {
    /// Display intensity a sample of magnitude `C_L` maps to.
    pub dmin: i32,
    /// High clip multiplier (`C_H = mmult * C_L`). Currently not applied.
    pub mmult: i32,
    pub rows: usize,
    pub cols: usize,
}

impl RemapParams {
    pub fn new(dmin: i32, mmult: i32, rows: usize, cols: usize) -> Self {
        Self {
            dmin,
            mmult,
            rows,
            cols,
        }
    }

    /// `rows * cols`, rejecting shapes that overflow `usize`.
    pub fn sample_count(&self) -> Result<usize, RemapError> {
        self.rows
            .checked_mul(self.cols)
            .ok_or(RemapError::DimensionOverflow {
                rows: self.rows,
                cols: self.cols,
            })
    }

    fn check_buffer(&self, data: &[f32]) -> Result<usize, RemapError> {
        let expected = self.sample_count()?;
        if data.len() != expected {
            return Err(RemapError::DimensionMismatch {
                rows: self.rows,
                cols: self.cols,
                expected,
                actual: data.len(),
            });
        }
        if expected == 0 {
            return Err(RemapError::Empty);
        }
        Ok(expected)
    }
}

/// Affine map from `log10(magnitude)` to display intensity.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LogCurve {
    pub slope: f32,
    pub constant: f32,
    /// `C_L`
    pub low_clip: f32,
    /// `C_H`; reported only.
    pub high_clip: f32,
}

impl LogCurve {
    /// Derives the curve from a mean magnitude without any validation.
    ///
    /// A zero, negative or non-finite `mean`, or one that puts `C_L` at exactly
    /// 1.0, yields a curve with `NaN`/`inf` coefficients that then propagate
    /// through every mapped sample. Use [`LogCurve::from_mean`] to reject those.
    pub fn derive(mean: f64, dmin: i32, mmult: i32) -> Self {
        let low_clip = (LOW_CLIP_FACTOR as f64 * mean) as f32;
        let high_clip = mmult as f32 * low_clip;
        let log_low = low_clip.log10();
        let slope = (255 - dmin) as f32 / log_low;
        let constant = dmin as f32 - slope * log_low;
        Self {
            slope,
            constant,
            low_clip,
            high_clip,
        }
    }

    /// Derives the curve, rejecting means and coefficients that are not usable.
    pub fn from_mean(mean: f64, dmin: i32, mmult: i32) -> Result<Self, RemapError> {
        if !(mean.is_finite() && mean > 0.0) {
            return Err(RemapError::DegenerateMean { mean });
        }
        let curve = Self::derive(mean, dmin, mmult);
        if !(curve.slope.is_finite() && curve.constant.is_finite()) {
            return Err(RemapError::DegenerateCurve { slope: curve.slope });
        }
        Ok(curve)
    }

    /// Validates `data` against `params` and derives the curve from its mean magnitude.
    pub fn from_samples(data: &[f32], params: RemapParams) -> Result<Self, RemapError> {
        params.check_buffer(data)?;
        let mean = mean_abs(data);
        let curve = Self::from_mean(mean, params.dmin, params.mmult)?;
        log::debug!(
            "log curve: slope={} constant={} mean={mean} low_clip={} high_clip={}",
            curve.slope,
            curve.constant,
            curve.low_clip,
            curve.high_clip
        );
        Ok(curve)
    }

    /// Maps one sample. This is the scalar definition every kernel reproduces.
    #[inline]
    pub fn map(&self, sample: f32) -> f32 {
        let mapped = self.slope * sample.abs().max(EPS).log10() + self.constant;
        mapped.clamp(0.0, DISPLAY_MAX)
    }
}

/// Selects one of the three remap implementations.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RemapKernel {
    Scalar,
    Simd,
    Portable,
}

type ChunkKernel = fn(&[f32], &mut [f32], &LogCurve);

impl RemapKernel {
    pub const ALL: [RemapKernel; 3] = [
        RemapKernel::Scalar,
        RemapKernel::Simd,
        RemapKernel::Portable,
    ];

    pub fn name(self) -> &'static str {
        match self {
            RemapKernel::Scalar => "scalar",
            RemapKernel::Simd => "simd",
            RemapKernel::Portable => "portable",
        }
    }

    /// Validates the input, derives the curve and returns a freshly allocated
    /// remapped buffer of `rows * cols` samples.
    pub fn remap(self, data: &[f32], params: RemapParams) -> Result<Vec<f32>, RemapError> {
        let curve = LogCurve::from_samples(data, params)?;
        Ok(self.apply_curve(data, &curve))
    }

    /// Applies an already derived curve to every sample of `data`.
    ///
    /// No validation happens here: a degenerate curve from [`LogCurve::derive`]
    /// produces `NaN` output rather than an error.
    pub fn apply_curve(self, data: &[f32], curve: &LogCurve) -> Vec<f32> {
        let kernel: ChunkKernel = match self {
            RemapKernel::Scalar => remap_chunk_scalar,
            RemapKernel::Simd => remap_chunk_simd,
            RemapKernel::Portable => remap_chunk_portable::<f32x8>,
        };
        drive(data, curve, kernel)
    }
}

/// Scalar remap using `f32::log10`.
pub fn remap_scalar(data: &[f32], params: RemapParams) -> Result<Vec<f32>, RemapError> {
    RemapKernel::Scalar.remap(data, params)
}

/// Remap with explicit AVX2/NEON abs, max and clamp and a per-lane scalar `log10`.
///
/// Falls back to the scalar kernel when no intrinsic path is available.
pub fn remap_simd(data: &[f32], params: RemapParams) -> Result<Vec<f32>, RemapError> {
    RemapKernel::Simd.remap(data, params)
}

/// Fully vectorized remap over 8-lane portable vectors.
pub fn remap_portable(data: &[f32], params: RemapParams) -> Result<Vec<f32>, RemapError> {
    RemapKernel::Portable.remap(data, params)
}

/// [`remap_portable`] at any [`Batch`] width.
pub fn remap_portable_with<B: Batch>(
    data: &[f32],
    params: RemapParams,
) -> Result<Vec<f32>, RemapError> {
    let curve = LogCurve::from_samples(data, params)?;
    Ok(drive(data, &curve, remap_chunk_portable::<B>))
}

fn drive(data: &[f32], curve: &LogCurve, kernel: ChunkKernel) -> Vec<f32> {
    let mut out = vec![0.0f32; data.len()];
    out.par_chunks_mut(REMAP_CHUNK)
        .zip(data.par_chunks(REMAP_CHUNK))
        .for_each(|(dst, src)| kernel(src, dst, curve));
    out
}

fn remap_chunk_scalar(input: &[f32], output: &mut [f32], curve: &LogCurve) {
    debug_assert_eq!(input.len(), output.len());
    for (dst, &x) in output.iter_mut().zip(input) {
        *dst = curve.map(x);
    }
}

fn remap_chunk_simd(input: &[f32], output: &mut [f32], curve: &LogCurve) {
    #[cfg(target_arch = "aarch64")]
    {
        // SAFETY: aarch64 guarantees NEON availability.
        unsafe { aarch64_neon::remap_neon(input, output, curve) }
    }

    #[cfg(any(target_arch = "x86", target_arch = "x86_64"))]
    {
        if crate::dispatch::avx2_enabled() {
            // SAFETY: guarded by AVX2 runtime detection.
            unsafe { x86_avx2::remap_avx2(input, output, curve) }
        } else {
            remap_chunk_scalar(input, output, curve)
        }
    }

    #[cfg(not(any(target_arch = "aarch64", target_arch = "x86", target_arch = "x86_64")))]
    {
        remap_chunk_scalar(input, output, curve)
    }
}

fn remap_chunk_portable<B: Batch>(input: &[f32], output: &mut [f32], curve: &LogCurve) {
    debug_assert_eq!(input.len(), output.len());
    let slope = B::splat(curve.slope);
    let constant = B::splat(curve.constant);
    let eps = B::splat(EPS);
    let floor = B::splat(0.0);
    let ceil = B::splat(DISPLAY_MAX);

    let mut src_groups = input.chunks_exact(B::LANES);
    let mut dst_groups = output.chunks_exact_mut(B::LANES);
    for (src, dst) in (&mut src_groups).zip(&mut dst_groups) {
        let magnitude = B::load(src).abs().max(eps);
        let mapped = slope * magnitude.log10() + constant;
        mapped.clamp_nan_preserving(floor, ceil).store(dst);
    }

    for (dst, &x) in dst_groups
        .into_remainder()
        .iter_mut()
        .zip(src_groups.remainder())
    {
        *dst = curve.map(x);
    }
}

/// AVX2 remap for x86/x86_64.
#[cfg(any(target_arch = "x86", target_arch = "x86_64"))]
#[allow(unsafe_op_in_unsafe_fn)]
mod x86_avx2 {
    #[cfg(target_arch = "x86")]
    use std::arch::x86 as arch;
    #[cfg(target_arch = "x86_64")]
    use std::arch::x86_64 as arch;

    use arch::{
        _mm256_andnot_ps, _mm256_loadu_ps, _mm256_max_ps, _mm256_min_ps, _mm256_set1_ps,
        _mm256_setzero_ps, _mm256_storeu_ps,
    };

    use super::{DISPLAY_MAX, EPS, LogCurve};

    const LANES: usize = 8;

    /// Abs, floor and clamp run on 8 lanes at once. AVX2 has no `log10`, so the
    /// magnitudes are spilled to a stack array, mapped lane by lane, and reloaded.
    #[target_feature(enable = "avx2")]
    pub unsafe fn remap_avx2(input: &[f32], output: &mut [f32], curve: &LogCurve) {
        let len = input.len().min(output.len());
        let src = input.as_ptr();
        let dst = output.as_mut_ptr();

        // andnot with -0.0 clears only the sign bit.
        let sign_bit = _mm256_set1_ps(-0.0);
        let eps = _mm256_set1_ps(EPS);
        let floor = _mm256_setzero_ps();
        let ceil = _mm256_set1_ps(DISPLAY_MAX);
        let mut lanes = [0.0f32; LANES];

        let mut i = 0usize;
        while i + LANES <= len {
            let v = _mm256_loadu_ps(src.add(i));
            let magnitude = _mm256_max_ps(_mm256_andnot_ps(sign_bit, v), eps);

            _mm256_storeu_ps(lanes.as_mut_ptr(), magnitude);
            for lane in &mut lanes {
                *lane = curve.slope * lane.log10() + curve.constant;
            }
            let mapped = _mm256_loadu_ps(lanes.as_ptr());

            // max/min return their second operand when either lane is NaN, so
            // `mapped` goes second to keep NaN lanes as `f32::clamp` does.
            let clamped = _mm256_min_ps(ceil, _mm256_max_ps(floor, mapped));
            _mm256_storeu_ps(dst.add(i), clamped);
            i += LANES;
        }

        // Scalar tail
        while i < len {
            *dst.add(i) = curve.map(*src.add(i));
            i += 1;
        }
    }
}

/// NEON remap for aarch64.
#[cfg(target_arch = "aarch64")]
#[allow(unsafe_op_in_unsafe_fn)]
mod aarch64_neon {
    use std::arch::aarch64::*;

    use super::{DISPLAY_MAX, EPS, LogCurve};

    const LANES: usize = 4;

    #[target_feature(enable = "neon")]
    pub unsafe fn remap_neon(input: &[f32], output: &mut [f32], curve: &LogCurve) {
        let len = input.len().min(output.len());
        let src = input.as_ptr();
        let dst = output.as_mut_ptr();

        let eps = vdupq_n_f32(EPS);
        let floor = vdupq_n_f32(0.0);
        let ceil = vdupq_n_f32(DISPLAY_MAX);
        let mut lanes = [0.0f32; LANES];

        let mut i = 0usize;
        while i + LANES <= len {
            let magnitude = vmaxq_f32(vabsq_f32(vld1q_f32(src.add(i))), eps);

            vst1q_f32(lanes.as_mut_ptr(), magnitude);
            for lane in &mut lanes {
                *lane = curve.slope * lane.log10() + curve.constant;
            }
            let mapped = vld1q_f32(lanes.as_ptr());

            // FMAX/FMIN return NaN if either lane is NaN.
            vst1q_f32(dst.add(i), vminq_f32(vmaxq_f32(mapped, floor), ceil));
            i += LANES;
        }

        while i < len {
            *dst.add(i) = curve.map(*src.add(i));
            i += 1;
        }
    }
}
