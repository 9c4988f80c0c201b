//! Lane-count-agnostic `f32` vectors for the portable kernels.
//!
//! [`Batch`] is the small slice of vector functionality the remap kernel needs.
//! It is implemented for [`wide::f32x4`] and [`wide::f32x8`], which compile down
//! to SSE/AVX on x86 and NEON on aarch64 without any `unsafe` at the call site.
//! Kernels written against `Batch` run unchanged at either width.

use std::ops::{Add, Mul, Sub};

use wide::{f32x4, f32x8};

/// A fixed-width vector of `f32` lanes.
pub trait Batch: Copy + Add<Output = Self> + Sub<Output = Self> + Mul<Output = Self> {
    /// Number of `f32` lanes.
    const LANES: usize;

    fn splat(value: f32) -> Self;

    /// Loads exactly [`Self::LANES`] values.
    ///
    /// # Panics
    ///
    /// Panics if `src.len() != Self::LANES`.
    fn load(src: &[f32]) -> Self;

    /// Stores exactly [`Self::LANES`] values.
    ///
    /// # Panics
    ///
    /// Panics if `dst.len() != Self::LANES`.
    fn store(self, dst: &mut [f32]);

    fn abs(self) -> Self;
    fn max(self, rhs: Self) -> Self;
    fn min(self, rhs: Self) -> Self;

    /// Lane-wise base-10 logarithm, computed as `ln(x) * log10(e)`.
    fn log10(self) -> Self;

    /// Clamps each lane to `[lo, hi]`. `NaN` lanes stay `NaN`, as with [`f32::clamp`].
    fn clamp_nan_preserving(self, lo: Self, hi: Self) -> Self;
}

macro_rules! impl_batch {
    ($ty:ident, $lanes:literal) => {
        impl Batch for $ty {
            const LANES: usize = $lanes;

            #[inline]
            fn splat(value: f32) -> Self {
                $ty::splat(value)
            }

            #[inline]
            fn load(src: &[f32]) -> Self {
                let mut lanes = [0.0f32; $lanes];
                lanes.copy_from_slice(src);
                $ty::from(lanes)
            }

            #[inline]
            fn store(self, dst: &mut [f32]) {
                dst.copy_from_slice(&self.to_array());
            }

            #[inline]
            fn abs(self) -> Self {
                $ty::abs(self)
            }

            #[inline]
            fn max(self, rhs: Self) -> Self {
                $ty::max(self, rhs)
            }

            #[inline]
            fn min(self, rhs: Self) -> Self {
                $ty::min(self, rhs)
            }

            #[inline]
            fn log10(self) -> Self {
                $ty::ln(self) * $ty::splat(std::f32::consts::LOG10_E)
            }

            #[inline]
            fn clamp_nan_preserving(self, lo: Self, hi: Self) -> Self {
                // `max`/`min` pick the non-NaN operand.
                let clamped = $ty::min($ty::max(self, lo), hi);
                self.is_nan().blend(self, clamped)
            }
        }
    };
}

impl_batch!(f32x4, 4);
impl_batch!(f32x8, 8);
