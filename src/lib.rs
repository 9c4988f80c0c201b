//! Vectorized numeric kernels over `f32` sample buffers, each in several variants
//! that can be compared for correctness and speed.
//!
//! Every variant of a kernel computes the same thing. They differ in *how*: plain
//! scalar loops, explicit fixed-width intrinsics (AVX2 on x86, NEON on aarch64),
//! portable SIMD through [`wide`], and fork-join parallelism through [`rayon`].
//!
//! # Kernels
//!
//! - **Horizontal reduction** ([`fold_halves`], [`hsum_f32x8`], [`hsum_f64x4`]) — collapse vector lanes to a scalar
//! - **Summation** ([`sum_scalar`], [`sum_simd`], [`sum_portable`], [`sum_parallel`]) — widen to `f64` and reduce
//! - **Log remap** ([`remap_scalar`], [`remap_simd`], [`remap_portable`]) — log-compress magnitudes into `[0, 255]`
//!
//! Kernels are stateless; they borrow their input and either return a scalar or a
//! freshly allocated `Vec<f32>` owned by the caller.
//!
//! # Configuration
//!
//! - `SIMD_KERNELS_NO_AVX2=1` forces the non-AVX2 fallbacks on x86 ([`NO_AVX2_ENV`]).
//! - `RAYON_NUM_THREADS` sizes the worker pool used by the parallel variants.

mod batch;
mod dispatch;
mod error;
pub mod hsum;
mod remap;
mod stopwatch;
mod sum;

pub use batch::*;
pub use dispatch::*;
pub use error::*;
pub use hsum::{fold_halves, hsum_f32x8, hsum_f64x4};
pub use remap::*;
pub use stopwatch::*;
pub use sum::*;
