//! Error types for devmat

use crate::dtype::DType;
use crate::runtime::DeviceId;
use crate::storage::{Density, MatrixFormat};
use thiserror::Error;

/// Result type alias using devmat's Error
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in matrix operations
///
/// Every error is reported synchronously at the offending call. Nothing is
/// retried, and a failed transfer never falls back to another device.
#[derive(Error, Debug)]
pub enum Error {
    /// Dimensions are zero where data is required, or exceed the configured limit
    #[error("Invalid shape {rows}x{cols}: {reason}")]
    InvalidShape {
        /// Requested rows
        rows: usize,
        /// Requested columns
        cols: usize,
        /// Why the shape was rejected
        reason: &'static str,
    },

    /// Dimension incompatibility between operands or for a reshape
    #[error("Shape mismatch: expected {expected:?}, got {got:?}")]
    ShapeMismatch {
        /// Expected shape
        expected: Vec<usize>,
        /// Actual shape
        got: Vec<usize>,
    },

    /// Operation requires one density but the operand has the other
    #[error("Density mismatch in '{op}': expected {expected:?}, got {got:?}")]
    DensityMismatch {
        /// Required density
        expected: Density,
        /// Actual density
        got: Density,
        /// The operation name
        op: &'static str,
    },

    /// Operation has no sparse implementation for the given format
    #[error("Operation '{op}' is not supported for sparse format {format}")]
    UnsupportedForSparse {
        /// The operation name
        op: &'static str,
        /// The sparse format in use
        format: MatrixFormat,
    },

    /// Requested device was never registered with the context or failed to initialize
    #[error("Device {device} is unavailable")]
    DeviceUnavailable {
        /// The requested device
        device: DeviceId,
    },

    /// Allocation failure on host or device
    #[error("Out of memory on {device}: failed to allocate {size} bytes")]
    OutOfMemory {
        /// Requested size in bytes
        size: usize,
        /// Where the allocation was attempted
        device: DeviceId,
    },

    /// A view refers to a backend that has been released or resized
    #[error("Stale view: the aliased storage was released or resized")]
    StaleView,

    /// Operands are pinned to different locations
    #[error("Device mismatch: views pinned to {lhs} and {rhs} cannot be co-located")]
    DeviceMismatch {
        /// Location of the first pinned operand
        lhs: DeviceId,
        /// Location of the second pinned operand
        rhs: DeviceId,
    },

    /// Element index out of bounds
    #[error("Index {index} out of bounds for dimension of size {size}")]
    IndexOutOfBounds {
        /// The invalid index
        index: usize,
        /// Size of the dimension
        size: usize,
    },

    /// Invalid argument provided to an operation
    #[error("Invalid argument '{arg}': {reason}")]
    InvalidArgument {
        /// The argument name
        arg: &'static str,
        /// Reason for invalidity
        reason: String,
    },

    /// Element type of stored data does not match the requested type
    #[error("DType mismatch: {lhs:?} vs {rhs:?}")]
    DTypeMismatch {
        /// Expected dtype
        lhs: DType,
        /// Actual dtype
        rhs: DType,
    },

    /// Stream I/O failure during serialization
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Generic internal error
    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Create a shape mismatch error
    pub fn shape_mismatch(expected: &[usize], got: &[usize]) -> Self {
        Self::ShapeMismatch {
            expected: expected.to_vec(),
            got: got.to_vec(),
        }
    }

    /// Create an invalid shape error
    pub fn invalid_shape(rows: usize, cols: usize, reason: &'static str) -> Self {
        Self::InvalidShape { rows, cols, reason }
    }

    /// Create a density mismatch error
    pub fn density_mismatch(expected: Density, got: Density, op: &'static str) -> Self {
        Self::DensityMismatch { expected, got, op }
    }

    /// Create an unsupported-for-sparse error
    pub fn unsupported_for_sparse(op: &'static str, format: MatrixFormat) -> Self {
        Self::UnsupportedForSparse { op, format }
    }

    /// Create an invalid argument error
    pub fn invalid_argument(arg: &'static str, reason: impl Into<String>) -> Self {
        Self::InvalidArgument {
            arg,
            reason: reason.into(),
        }
    }
}
