use thiserror::Error;

/// Why a remap request was rejected before any output was allocated.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum RemapError {
    #[error("{rows}x{cols} overflows the addressable buffer length")]
    DimensionOverflow { rows: usize, cols: usize },

    #[error("{rows}x{cols} needs {expected} samples but the buffer holds {actual}")]
    DimensionMismatch {
        rows: usize,
        cols: usize,
        expected: usize,
        actual: usize,
    },

    #[error("cannot derive a log curve from an empty buffer")]
    Empty,

    #[error("mean magnitude {mean} must be positive and finite")]
    DegenerateMean { mean: f64 },

    /// The low clip point sits at 1.0, where `log10` is zero.
    #[error("log curve slope {slope} is not finite")]
    DegenerateCurve { slope: f32 },
}
