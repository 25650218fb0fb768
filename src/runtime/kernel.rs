//! Kernel collaborator interface
//!
//! Kernels receive raw descriptors of storage that the matrix layer has
//! already synchronized onto the kernel's runtime. They never allocate,
//! transfer, or change density; those decisions belong to the caller.

use crate::dtype::DType;
use crate::error::Result;
use crate::storage::MatrixFormat;

/// Descriptor of a contiguous column-major dense block
///
/// `ptr` is the base address of the backing buffer and `offset` the element
/// offset of the block's first element, so column slices and reshapes of a
/// shared buffer are expressed without copying.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct DenseRef {
    /// Base address of the buffer
    pub ptr: u64,
    /// Offset in elements from `ptr`
    pub offset: usize,
    /// Number of rows
    pub rows: usize,
    /// Number of columns
    pub cols: usize,
    /// Element type
    pub dtype: DType,
}

impl DenseRef {
    /// Number of elements described
    #[inline]
    pub fn len(&self) -> usize {
        self.rows * self.cols
    }

    /// Whether the block has no elements
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Address of the first element
    #[inline]
    pub fn addr(&self) -> u64 {
        self.ptr + (self.offset * self.dtype.size_in_bytes()) as u64
    }
}

/// Descriptor of a compressed sparse block
///
/// For CSC the major axis is columns, for CSR it is rows. `offsets` holds
/// absolute positions into `indices`/`values`; a column slice of a CSC matrix
/// is described by moving `major_start` and shrinking `cols`.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct SparseRef {
    /// Compressed layout
    pub format: MatrixFormat,
    /// Address of the `i64` offsets array
    pub offsets: u64,
    /// Address of the `i64` minor index array
    pub indices: u64,
    /// Address of the value array
    pub values: u64,
    /// First major index covered by this block
    pub major_start: usize,
    /// Number of rows
    pub rows: usize,
    /// Number of columns
    pub cols: usize,
    /// Capacity of `indices` and `values` in elements
    pub capacity: usize,
    /// Element type of `values`
    pub dtype: DType,
}

impl SparseRef {
    /// Length of the major axis
    #[inline]
    pub fn majors(&self) -> usize {
        match self.format {
            MatrixFormat::SparseCsr => self.rows,
            _ => self.cols,
        }
    }

    /// Length of the minor axis
    #[inline]
    pub fn minors(&self) -> usize {
        match self.format {
            MatrixFormat::SparseCsr => self.cols,
            _ => self.rows,
        }
    }
}

/// Element-wise binary operation
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum BinaryOp {
    /// a + b
    Add,
    /// a - b
    Sub,
    /// a * b
    Mul,
    /// a / b
    Div,
}

/// Full reduction over a block
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum ReduceOp {
    /// Sum of elements
    Sum,
    /// Sum of absolute values
    SumAbs,
    /// Largest absolute value
    MaxAbs,
    /// Number of NaN elements
    CountNan,
    /// Number of NaN or infinite elements
    CountNanInf,
}

/// Compute collaborator for one runtime
///
/// Every descriptor passed in must address memory owned by the runtime that
/// returned this `Kernels`. Dense outputs have the shape the operation
/// implies; callers check shapes before dispatch.
pub trait Kernels: Send + Sync {
    /// dst[i] = value
    fn fill(&self, dst: &DenseRef, value: f64) -> Result<()>;

    /// dst = src (same element count, any shape)
    fn copy(&self, src: &DenseRef, dst: &DenseRef) -> Result<()>;

    /// dst = alpha * src; `src` and `dst` may be the same block
    fn scale(&self, src: &DenseRef, alpha: f64, dst: &DenseRef) -> Result<()>;

    /// dst = src + alpha
    fn add_scalar(&self, src: &DenseRef, alpha: f64, dst: &DenseRef) -> Result<()>;

    /// dst = alpha * a + beta * b
    fn axpby(&self, alpha: f64, a: &DenseRef, beta: f64, b: &DenseRef, dst: &DenseRef)
    -> Result<()>;

    /// dst = a op b, element-wise
    fn binary(&self, op: BinaryOp, a: &DenseRef, b: &DenseRef, dst: &DenseRef) -> Result<()>;

    /// dst = src ^ exponent, element-wise
    fn power(&self, src: &DenseRef, exponent: f64, dst: &DenseRef) -> Result<()>;

    /// dst = op(a) * op(b) where op transposes when the flag is set
    ///
    /// `dst` must not alias `a` or `b`.
    fn gemm(
        &self,
        a: &DenseRef,
        trans_a: bool,
        b: &DenseRef,
        trans_b: bool,
        dst: &DenseRef,
    ) -> Result<()>;

    /// dst (cols x rows) = src^T; `dst` must not alias `src`
    fn transpose(&self, src: &DenseRef, dst: &DenseRef) -> Result<()>;

    /// Full reduction, returned as f64
    fn reduce(&self, op: ReduceOp, src: &DenseRef) -> Result<f64>;

    /// max |a[i] - b[i]|; a NaN on either side yields infinity
    fn max_abs_diff(&self, a: &DenseRef, b: &DenseRef) -> Result<f64>;

    /// Number of elements that are not exactly zero
    fn count_nonzero(&self, src: &DenseRef) -> Result<usize>;

    /// Compress `src` into `dst`, returning the stored element count
    ///
    /// `dst.capacity` must be at least `count_nonzero(src)`.
    fn dense_to_sparse(&self, src: &DenseRef, dst: &SparseRef) -> Result<usize>;

    /// Zero-fill `dst` and scatter the stored elements of `src`
    fn sparse_to_dense(&self, src: &SparseRef, dst: &DenseRef) -> Result<()>;

    /// Scale the stored values of `src` into `dst`, which shares its structure
    fn scale_sparse(&self, src: &SparseRef, alpha: f64, dst: &SparseRef) -> Result<()>;

    /// Reduction over the stored values; absent elements count as zero
    fn reduce_sparse(&self, op: ReduceOp, src: &SparseRef) -> Result<f64>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dense_ref_addr() {
        let r = DenseRef {
            ptr: 1024,
            offset: 3,
            rows: 2,
            cols: 4,
            dtype: DType::F64,
        };
        assert_eq!(r.len(), 8);
        assert_eq!(r.addr(), 1024 + 24);
    }

    #[test]
    fn test_sparse_axes() {
        let r = SparseRef {
            format: MatrixFormat::SparseCsr,
            offsets: 0,
            indices: 0,
            values: 0,
            major_start: 0,
            rows: 5,
            cols: 7,
            capacity: 0,
            dtype: DType::F32,
        };
        assert_eq!(r.majors(), 5);
        assert_eq!(r.minors(), 7);
        let csc = SparseRef {
            format: MatrixFormat::SparseCsc,
            ..r
        };
        assert_eq!(csc.majors(), 7);
    }
}
