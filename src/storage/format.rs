//! Physical layout descriptors: density and storage format

use std::fmt;

/// Physical density of a matrix
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum Density {
    /// No storage has been created yet
    #[default]
    Undetermined,
    /// Full rectangular buffer
    Dense,
    /// Compressed buffer holding only the non-zero elements
    Sparse,
}

impl Density {
    /// Stable tag used by serialization
    pub const fn tag(self) -> u8 {
        match self {
            Self::Undetermined => 0,
            Self::Dense => 1,
            Self::Sparse => 2,
        }
    }
}

/// Storage format of a matrix
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum MatrixFormat {
    /// Column-major full buffer
    ///
    /// Storage: O(rows * cols)
    #[default]
    Dense,

    /// Compressed Sparse Column (CSC)
    ///
    /// Column pointers + row indices + values.
    /// Best for: column slicing, serialization
    /// Storage: O(2 * nnz + ncols + 1)
    SparseCsc,

    /// Compressed Sparse Row (CSR)
    ///
    /// Row pointers + column indices + values.
    /// Not column-sliceable.
    /// Storage: O(2 * nnz + nrows + 1)
    SparseCsr,
}

impl MatrixFormat {
    /// Density implied by this format
    #[inline]
    pub fn density(self) -> Density {
        match self {
            Self::Dense => Density::Dense,
            Self::SparseCsc | Self::SparseCsr => Density::Sparse,
        }
    }

    /// Returns true for the compressed formats
    #[inline]
    pub fn is_sparse(self) -> bool {
        self.density() == Density::Sparse
    }

    /// Whether a contiguous column range can be aliased without copying
    #[inline]
    pub fn is_column_sliceable(self) -> bool {
        matches!(self, Self::Dense | Self::SparseCsc)
    }

    /// Returns the format name as a string
    pub fn name(self) -> &'static str {
        match self {
            Self::Dense => "dense",
            Self::SparseCsc => "CSC",
            Self::SparseCsr => "CSR",
        }
    }
}

impl fmt::Display for MatrixFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}
