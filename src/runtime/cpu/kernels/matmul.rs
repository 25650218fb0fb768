//! Matrix product and transpose kernels over column-major storage

use crate::dtype::Element;

#[cfg(feature = "rayon")]
use super::PARALLEL_THRESHOLD;
#[cfg(feature = "rayon")]
use rayon::prelude::*;

/// Column-major GEMM: C = op(A) @ op(B)
///
/// # Arguments
/// * `a` - Pointer to A, stored `a_rows × a_cols` column-major
/// * `b` - Pointer to B, stored `b_rows × b_cols` column-major
/// * `out` - Pointer to C (m × n) column-major
/// * `trans_a`, `trans_b` - Whether to use the transpose of A / B
///
/// With `op(A)` of shape m × k and `op(B)` of shape k × n.
///
/// # Safety
/// - All pointers must be valid for their stored shapes
/// - `out` must not alias with `a` or `b`
#[inline]
#[allow(clippy::too_many_arguments)]
pub unsafe fn gemm_kernel<T: Element>(
    a: *const T,
    a_rows: usize,
    a_cols: usize,
    trans_a: bool,
    b: *const T,
    b_rows: usize,
    b_cols: usize,
    trans_b: bool,
    out: *mut T,
) {
    let (m, k) = if trans_a { (a_cols, a_rows) } else { (a_rows, a_cols) };
    let n = if trans_b { b_rows } else { b_cols };
    if m == 0 || n == 0 {
        return;
    }

    let a_slice = std::slice::from_raw_parts(a, a_rows * a_cols);
    let b_slice = std::slice::from_raw_parts(b, b_rows * b_cols);
    let out_slice = std::slice::from_raw_parts_mut(out, m * n);

    // op(A)(i, l) and op(B)(l, j) in column-major storage
    let a_at = |i: usize, l: usize| {
        if trans_a {
            a_slice[l + i * a_rows]
        } else {
            a_slice[i + l * a_rows]
        }
    };
    let b_at = |l: usize, j: usize| {
        if trans_b {
            b_slice[j + l * b_rows]
        } else {
            b_slice[l + j * b_rows]
        }
    };

    let column = |j: usize, col: &mut [T]| {
        col.fill(T::zero());
        for l in 0..k {
            let blj = b_at(l, j);
            for (i, c) in col.iter_mut().enumerate() {
                *c = *c + a_at(i, l) * blj;
            }
        }
    };

    #[cfg(feature = "rayon")]
    if m * n * k.max(1) >= PARALLEL_THRESHOLD {
        out_slice
            .par_chunks_mut(m)
            .enumerate()
            .for_each(|(j, col)| column(j, col));
        return;
    }

    for (j, col) in out_slice.chunks_mut(m).enumerate() {
        column(j, col);
    }
}

/// out (cols × rows) = src (rows × cols) transposed
///
/// # Safety
/// - `src` and `out` must be valid pointers to `rows * cols` elements
/// - `out` must not alias with `src`
#[inline]
pub unsafe fn transpose_kernel<T: Element>(src: *const T, out: *mut T, rows: usize, cols: usize) {
    let len = rows * cols;
    if len == 0 {
        return;
    }
    let src_slice = std::slice::from_raw_parts(src, len);
    let out_slice = std::slice::from_raw_parts_mut(out, len);

    // out(j, i) = src(i, j); out has `cols` rows
    for i in 0..rows {
        for j in 0..cols {
            out_slice[j + i * cols] = src_slice[i + j * rows];
        }
    }
}
