//! Dense <-> compressed sparse conversion kernels
//!
//! Offsets and minor indices are `i64`. A major index is a column for CSC and
//! a row for CSR; dense data is always column-major.

use crate::dtype::Element;
use crate::error::{Error, Result};
use crate::runtime::ReduceOp;

use super::reduce_kernel;

/// Position of element (major, minor) in a column-major dense block
#[inline]
fn dense_index(csr: bool, major: usize, minor: usize, rows: usize) -> usize {
    if csr {
        major + minor * rows
    } else {
        minor + major * rows
    }
}

/// Compress a dense block, keeping exactly the non-zero elements
///
/// Writes `majors + 1` offsets starting at `offsets` and returns the number of
/// stored elements.
///
/// # Safety
/// - `src` must be valid for `rows * cols` elements
/// - `offsets` must be valid for `majors + 1` entries
/// - `indices` and `values` must be valid for `capacity` entries
#[allow(clippy::too_many_arguments)]
pub unsafe fn dense_to_sparse_kernel<T: Element>(
    src: *const T,
    rows: usize,
    cols: usize,
    csr: bool,
    offsets: *mut i64,
    indices: *mut i64,
    values: *mut T,
    capacity: usize,
) -> Result<usize> {
    let (majors, minors) = if csr { (rows, cols) } else { (cols, rows) };
    let mut pos = 0usize;

    *offsets = 0;
    for major in 0..majors {
        for minor in 0..minors {
            let v = *src.add(dense_index(csr, major, minor, rows));
            if v.to_f64() != 0.0 {
                if pos >= capacity {
                    return Err(Error::Internal(format!(
                        "sparse capacity {capacity} exceeded during compression"
                    )));
                }
                *indices.add(pos) = minor as i64;
                *values.add(pos) = v;
                pos += 1;
            }
        }
        *offsets.add(major + 1) = pos as i64;
    }

    Ok(pos)
}

/// Zero-fill a dense block and scatter stored elements into it
///
/// `offsets` points at the first offset of the block, which may be a column
/// range inside a larger CSC matrix.
///
/// # Safety
/// - `offsets` must be valid for `majors + 1` entries
/// - `indices` and `values` must be valid for every position those offsets name
/// - `dst` must be valid for `rows * cols` elements
pub unsafe fn sparse_to_dense_kernel<T: Element>(
    offsets: *const i64,
    indices: *const i64,
    values: *const T,
    rows: usize,
    cols: usize,
    csr: bool,
    dst: *mut T,
) -> Result<()> {
    let (majors, minors) = if csr { (rows, cols) } else { (cols, rows) };
    super::fill_kernel(dst, T::zero(), rows * cols);

    for major in 0..majors {
        let start = *offsets.add(major) as usize;
        let end = *offsets.add(major + 1) as usize;
        for p in start..end {
            let minor = *indices.add(p);
            if minor < 0 || minor as usize >= minors {
                return Err(Error::IndexOutOfBounds {
                    index: minor.max(0) as usize,
                    size: minors,
                });
            }
            *dst.add(dense_index(csr, major, minor as usize, rows)) = *values.add(p);
        }
    }
    Ok(())
}

/// Scale the stored values in `[start, end)`
///
/// # Safety
/// - `src` and `dst` must be valid for `end` elements
pub unsafe fn sparse_scale_kernel<T: Element>(
    src: *const T,
    dst: *mut T,
    start: usize,
    end: usize,
    alpha: f64,
) {
    let alpha = T::from_f64(alpha);
    super::map_kernel(src.add(start), dst.add(start), end - start, |x| x * alpha);
}

/// Reduce the stored values in `[start, end)`
///
/// Absent elements are zeros, which change none of the supported reductions.
///
/// # Safety
/// - `values` must be valid for `end` elements
pub unsafe fn sparse_reduce_kernel<T: Element>(
    op: ReduceOp,
    values: *const T,
    start: usize,
    end: usize,
) -> f64 {
    reduce_kernel(op, values.add(start), end - start)
}
