//! `Kernels` implementation for host-addressable memory

use super::helpers::{dispatch_dtype, overlaps, same_dtype, same_len, stored_range};
use super::kernels;
use crate::dtype::{DType, Element};
use crate::error::{Error, Result};
use crate::runtime::{BinaryOp, DenseRef, Kernels, ReduceOp, SparseRef};
use crate::storage::MatrixFormat;

/// Reference kernels over memory the process can address directly
///
/// Used by the host runtime and by [`EmulatedDevice`](crate::runtime::EmulatedDevice),
/// whose memory lives in host RAM.
#[derive(Clone, Copy, Debug, Default)]
pub struct CpuKernels;

fn check_out_shape(dst: &DenseRef, rows: usize, cols: usize) -> Result<()> {
    if dst.rows != rows || dst.cols != cols {
        return Err(Error::shape_mismatch(&[rows, cols], &[dst.rows, dst.cols]));
    }
    Ok(())
}

fn check_sparse_dtype(src: &SparseRef, dst_dtype: DType) -> Result<()> {
    if src.dtype != dst_dtype {
        return Err(Error::DTypeMismatch {
            lhs: src.dtype,
            rhs: dst_dtype,
        });
    }
    Ok(())
}

impl Kernels for CpuKernels {
    fn fill(&self, dst: &DenseRef, value: f64) -> Result<()> {
        dispatch_dtype!(dst.dtype, T => {
            unsafe { kernels::fill_kernel(dst.addr() as *mut T, T::from_f64(value), dst.len()) };
        });
        Ok(())
    }

    fn copy(&self, src: &DenseRef, dst: &DenseRef) -> Result<()> {
        let dtype = same_dtype(&[src, dst])?;
        let len = same_len(src, dst)?;
        if len == 0 {
            return Ok(());
        }
        let bytes = len * dtype.size_in_bytes();
        // SAFETY: both blocks are valid for `bytes`; `copy` tolerates overlap
        unsafe { std::ptr::copy(src.addr() as *const u8, dst.addr() as *mut u8, bytes) };
        Ok(())
    }

    fn scale(&self, src: &DenseRef, alpha: f64, dst: &DenseRef) -> Result<()> {
        let dtype = same_dtype(&[src, dst])?;
        let len = same_len(src, dst)?;
        dispatch_dtype!(dtype, T => {
            let a = T::from_f64(alpha);
            unsafe {
                kernels::map_kernel(src.addr() as *const T, dst.addr() as *mut T, len, |x| x * a)
            };
        });
        Ok(())
    }

    fn add_scalar(&self, src: &DenseRef, alpha: f64, dst: &DenseRef) -> Result<()> {
        let dtype = same_dtype(&[src, dst])?;
        let len = same_len(src, dst)?;
        dispatch_dtype!(dtype, T => {
            let a = T::from_f64(alpha);
            unsafe {
                kernels::map_kernel(src.addr() as *const T, dst.addr() as *mut T, len, |x| x + a)
            };
        });
        Ok(())
    }

    fn axpby(
        &self,
        alpha: f64,
        a: &DenseRef,
        beta: f64,
        b: &DenseRef,
        dst: &DenseRef,
    ) -> Result<()> {
        let dtype = same_dtype(&[a, b, dst])?;
        same_len(a, b)?;
        let len = same_len(a, dst)?;
        dispatch_dtype!(dtype, T => {
            unsafe {
                kernels::axpby_kernel(
                    alpha,
                    a.addr() as *const T,
                    beta,
                    b.addr() as *const T,
                    dst.addr() as *mut T,
                    len,
                )
            };
        });
        Ok(())
    }

    fn binary(&self, op: BinaryOp, a: &DenseRef, b: &DenseRef, dst: &DenseRef) -> Result<()> {
        let dtype = same_dtype(&[a, b, dst])?;
        same_len(a, b)?;
        let len = same_len(a, dst)?;
        dispatch_dtype!(dtype, T => {
            if op == BinaryOp::Div && !dtype.is_float() {
                let divisor = unsafe { std::slice::from_raw_parts(b.addr() as *const T, len) };
                if divisor.iter().any(|&x| x == T::zero()) {
                    return Err(Error::invalid_argument("divisor", "integer division by zero"));
                }
            }
            unsafe {
                kernels::binary_op_kernel(
                    op,
                    a.addr() as *const T,
                    b.addr() as *const T,
                    dst.addr() as *mut T,
                    len,
                )
            };
        });
        Ok(())
    }

    fn power(&self, src: &DenseRef, exponent: f64, dst: &DenseRef) -> Result<()> {
        let dtype = same_dtype(&[src, dst])?;
        let len = same_len(src, dst)?;
        dispatch_dtype!(dtype, T => {
            unsafe {
                kernels::map_kernel(src.addr() as *const T, dst.addr() as *mut T, len, |x| {
                    T::from_f64(x.to_f64().powf(exponent))
                })
            };
        });
        Ok(())
    }

    fn gemm(
        &self,
        a: &DenseRef,
        trans_a: bool,
        b: &DenseRef,
        trans_b: bool,
        dst: &DenseRef,
    ) -> Result<()> {
        let dtype = same_dtype(&[a, b, dst])?;
        let (m, k) = if trans_a { (a.cols, a.rows) } else { (a.rows, a.cols) };
        let (kb, n) = if trans_b { (b.cols, b.rows) } else { (b.rows, b.cols) };
        if k != kb {
            return Err(Error::shape_mismatch(&[m, k], &[kb, n]));
        }
        check_out_shape(dst, m, n)?;
        if overlaps(a, dst) || overlaps(b, dst) {
            return Err(Error::invalid_argument("dst", "gemm output aliases an input"));
        }
        dispatch_dtype!(dtype, T => {
            unsafe {
                kernels::gemm_kernel(
                    a.addr() as *const T,
                    a.rows,
                    a.cols,
                    trans_a,
                    b.addr() as *const T,
                    b.rows,
                    b.cols,
                    trans_b,
                    dst.addr() as *mut T,
                )
            };
        });
        Ok(())
    }

    fn transpose(&self, src: &DenseRef, dst: &DenseRef) -> Result<()> {
        let dtype = same_dtype(&[src, dst])?;
        check_out_shape(dst, src.cols, src.rows)?;
        if overlaps(src, dst) {
            return Err(Error::invalid_argument("dst", "transpose output aliases its input"));
        }
        dispatch_dtype!(dtype, T => {
            unsafe {
                kernels::transpose_kernel(
                    src.addr() as *const T,
                    dst.addr() as *mut T,
                    src.rows,
                    src.cols,
                )
            };
        });
        Ok(())
    }

    fn reduce(&self, op: ReduceOp, src: &DenseRef) -> Result<f64> {
        Ok(dispatch_dtype!(src.dtype, T => {
            unsafe { kernels::reduce_kernel(op, src.addr() as *const T, src.len()) }
        }))
    }

    fn max_abs_diff(&self, a: &DenseRef, b: &DenseRef) -> Result<f64> {
        let dtype = same_dtype(&[a, b])?;
        let len = same_len(a, b)?;
        Ok(dispatch_dtype!(dtype, T => {
            unsafe { kernels::max_abs_diff_kernel(a.addr() as *const T, b.addr() as *const T, len) }
        }))
    }

    fn count_nonzero(&self, src: &DenseRef) -> Result<usize> {
        Ok(dispatch_dtype!(src.dtype, T => {
            unsafe { kernels::count_nonzero_kernel(src.addr() as *const T, src.len()) }
        }))
    }

    fn dense_to_sparse(&self, src: &DenseRef, dst: &SparseRef) -> Result<usize> {
        check_sparse_dtype(dst, src.dtype)?;
        if (dst.rows, dst.cols) != (src.rows, src.cols) {
            return Err(Error::shape_mismatch(&[src.rows, src.cols], &[dst.rows, dst.cols]));
        }
        let csr = dst.format == MatrixFormat::SparseCsr;
        dispatch_dtype!(src.dtype, T => {
            unsafe {
                kernels::dense_to_sparse_kernel(
                    src.addr() as *const T,
                    src.rows,
                    src.cols,
                    csr,
                    (dst.offsets as *mut i64).add(dst.major_start),
                    dst.indices as *mut i64,
                    dst.values as *mut T,
                    dst.capacity,
                )
            }
        })
    }

    fn sparse_to_dense(&self, src: &SparseRef, dst: &DenseRef) -> Result<()> {
        check_sparse_dtype(src, dst.dtype)?;
        check_out_shape(dst, src.rows, src.cols)?;
        let csr = src.format == MatrixFormat::SparseCsr;
        dispatch_dtype!(src.dtype, T => {
            unsafe {
                kernels::sparse_to_dense_kernel(
                    (src.offsets as *const i64).add(src.major_start),
                    src.indices as *const i64,
                    src.values as *const T,
                    src.rows,
                    src.cols,
                    csr,
                    dst.addr() as *mut T,
                )
            }
        })
    }

    fn scale_sparse(&self, src: &SparseRef, alpha: f64, dst: &SparseRef) -> Result<()> {
        check_sparse_dtype(src, dst.dtype)?;
        let (start, end) = unsafe { stored_range(src) };
        if end > dst.capacity {
            return Err(Error::shape_mismatch(&[end], &[dst.capacity]));
        }
        dispatch_dtype!(src.dtype, T => {
            unsafe {
                kernels::sparse_scale_kernel(
                    src.values as *const T,
                    dst.values as *mut T,
                    start,
                    end,
                    alpha,
                )
            };
        });
        Ok(())
    }

    fn reduce_sparse(&self, op: ReduceOp, src: &SparseRef) -> Result<f64> {
        let (start, end) = unsafe { stored_range(src) };
        Ok(dispatch_dtype!(src.dtype, T => {
            unsafe { kernels::sparse_reduce_kernel(op, src.values as *const T, start, end) }
        }))
    }
}
