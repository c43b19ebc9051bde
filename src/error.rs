use std::path::PathBuf;

/// Errors raised by the registration engine and its collaborators.
#[derive(thiserror::Error, Debug)]
pub enum AlignError {
    /// Mismatched channel depth or incompatible dimensions.
    #[error("shape mismatch: {0}")]
    Shape(String),

    /// Degenerate or invalid input to spectral extraction.
    #[error("invalid spectrum input: {0}")]
    Spectrum(String),

    #[error("log-polar radius {radius} is degenerate (must be greater than 1)")]
    DegenerateRadius { radius: usize },

    /// The two inputs of an optical-flow computation do not agree.
    #[error("optical flow: {0}")]
    Flow(String),

    /// The alignment store could not be read or written.
    #[error("alignment cache {}: {reason}", path.display())]
    CacheCorruption { path: PathBuf, reason: String },

    /// A numeric degeneracy (NaN/Inf, non-positive scale) in an estimate.
    #[error("alignment computation failed: {0}")]
    AlignmentComputation(String),

    #[error(transparent)]
    Image(#[from] image::ImageError),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl AlignError {
    pub(crate) fn cache(path: impl Into<PathBuf>, reason: impl ToString) -> Self {
        Self::CacheCorruption {
            path: path.into(),
            reason: reason.to_string(),
        }
    }
}

impl From<ndarray::ShapeError> for AlignError {
    fn from(err: ndarray::ShapeError) -> Self {
        Self::Shape(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, AlignError>;
