use posedepth_image::ImageError;

/// An error type for the geometry module.
#[derive(thiserror::Error, Debug, PartialEq)]
pub enum GeometryError {
    /// The matrix cannot be inverted.
    #[error("Matrix is singular (determinant {0})")]
    SingularMatrix(f64),

    /// A matrix or vector does not have the expected dimension.
    #[error("Dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch {
        /// The expected dimension.
        expected: usize,
        /// The dimension that was found.
        actual: usize,
    },

    /// Error raised while building an image.
    #[error(transparent)]
    Image(#[from] ImageError),
}
