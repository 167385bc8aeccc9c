//! Error types for braggdisk.

use thiserror::Error;

/// Result alias for braggdisk operations.
pub type BraggResult<T> = std::result::Result<T, BraggError>;

/// Errors that can occur when registering, detecting, or fitting.
///
/// Failures are scoped to the smallest unit that produced them (one pair, one
/// image, one spot). A conic that is not an ellipse is not an error; it is
/// reported through [`crate::Ellipse::is_ellipse`].
#[derive(Clone, Debug, PartialEq, Error)]
pub enum BraggError {
    /// Width or height is zero or overflows.
    #[error("invalid dimensions: {width}x{height}")]
    InvalidDimensions { width: usize, height: usize },
    /// Stride is smaller than the row width.
    #[error("invalid stride {stride} for width {width}")]
    InvalidStride { width: usize, stride: usize },
    /// Backing buffer cannot hold the requested view.
    #[error("buffer too small: needed {needed}, got {got}")]
    BufferTooSmall { needed: usize, got: usize },
    /// Two grids that must share a size do not.
    #[error("dimension mismatch: expected {expected_width}x{expected_height}, got {width}x{height}")]
    DimensionMismatch {
        expected_width: usize,
        expected_height: usize,
        width: usize,
        height: usize,
    },
    /// A rectangular region lies outside the image.
    #[error("roi out of bounds: x={x}, y={y}, width={width}, height={height}, image={img_width}x{img_height}")]
    RoiOutOfBounds {
        x: usize,
        y: usize,
        width: usize,
        height: usize,
        img_width: usize,
        img_height: usize,
    },
    /// An index is outside a collection.
    #[error("index {index} out of bounds for {context} of length {len}")]
    IndexOutOfBounds {
        index: usize,
        len: usize,
        context: &'static str,
    },
    /// The input data or parameters are invalid.
    #[error("invalid input: {reason}")]
    InvalidInput { reason: &'static str },
    /// A mask placed at `(x, y)` has no cell inside the image.
    #[error("masked region at ({x}, {y}) lies entirely outside the image")]
    RegionEmpty { x: i64, y: i64 },
    /// The pairwise registration graph does not reach this image from the reference.
    #[error("image {image} is not connected to the reference image")]
    DisconnectedStack { image: usize },
    /// Too few usable pixels for a stable fit.
    #[error("insufficient points: needed {needed}, got {got}")]
    InsufficientPoints { needed: usize, got: usize },
    /// The numeric solver did not converge or returned invalid output.
    #[error("solver failure: {reason}")]
    SolverFailure { reason: String },
    /// Image decoding failed.
    #[cfg(feature = "image-io")]
    #[error("image io: {reason}")]
    ImageIo { reason: String },
}
