//! Binary element-wise kernels

use crate::dtype::Element;
use crate::runtime::BinaryOp;

#[cfg(feature = "rayon")]
use super::{CHUNK_SIZE, PARALLEL_THRESHOLD};
#[cfg(feature = "rayon")]
use rayon::prelude::*;

/// out[i] = f(a[i], b[i])
///
/// # Safety
/// - `a`, `b`, and `out` must be valid pointers to `len` elements
#[inline]
unsafe fn zip_kernel<T, F>(a: *const T, b: *const T, out: *mut T, len: usize, f: F)
where
    T: Element,
    F: Fn(T, T) -> T + Send + Sync,
{
    if len == 0 {
        return;
    }

    let bytes = len * std::mem::size_of::<T>();
    let disjoint = |p: *const T| {
        let (p0, o0) = (p as usize, out as usize);
        p0 + bytes <= o0 || o0 + bytes <= p0
    };

    if !disjoint(a) || !disjoint(b) {
        // In-place or aliased operands: plain pointer reads and writes
        for i in 0..len {
            out.add(i).write(f(a.add(i).read(), b.add(i).read()));
        }
        return;
    }

    let a_slice = std::slice::from_raw_parts(a, len);
    let b_slice = std::slice::from_raw_parts(b, len);
    let out_slice = std::slice::from_raw_parts_mut(out, len);

    #[cfg(feature = "rayon")]
    if len >= PARALLEL_THRESHOLD {
        out_slice
            .par_chunks_mut(CHUNK_SIZE)
            .zip(a_slice.par_chunks(CHUNK_SIZE))
            .zip(b_slice.par_chunks(CHUNK_SIZE))
            .for_each(|((o, x), y)| {
                for i in 0..o.len() {
                    o[i] = f(x[i], y[i]);
                }
            });
        return;
    }

    for i in 0..len {
        out_slice[i] = f(a_slice[i], b_slice[i]);
    }
}

/// Execute a binary operation element-wise
///
/// # Safety
/// - `a`, `b`, and `out` must be valid pointers to `len` elements
/// - integer division requires every `b[i]` to be non-zero
#[inline]
pub unsafe fn binary_op_kernel<T: Element>(
    op: BinaryOp,
    a: *const T,
    b: *const T,
    out: *mut T,
    len: usize,
) {
    match op {
        BinaryOp::Add => zip_kernel(a, b, out, len, |x, y| x + y),
        BinaryOp::Sub => zip_kernel(a, b, out, len, |x, y| x - y),
        BinaryOp::Mul => zip_kernel(a, b, out, len, |x, y| x * y),
        BinaryOp::Div => zip_kernel(a, b, out, len, |x, y| x / y),
    }
}

/// out[i] = alpha * a[i] + beta * b[i]
///
/// # Safety
/// - `a`, `b`, and `out` must be valid pointers to `len` elements
#[inline]
pub unsafe fn axpby_kernel<T: Element>(
    alpha: f64,
    a: *const T,
    beta: f64,
    b: *const T,
    out: *mut T,
    len: usize,
) {
    let (alpha, beta) = (T::from_f64(alpha), T::from_f64(beta));
    zip_kernel(a, b, out, len, |x, y| alpha * x + beta * y);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_binary_ops() {
        let a = [6.0f32, 8.0];
        let b = [2.0f32, 4.0];
        let mut out = [0.0f32; 2];
        unsafe { binary_op_kernel(BinaryOp::Div, a.as_ptr(), b.as_ptr(), out.as_mut_ptr(), 2) };
        assert_eq!(out, [3.0, 2.0]);
        unsafe { binary_op_kernel(BinaryOp::Sub, a.as_ptr(), b.as_ptr(), out.as_mut_ptr(), 2) };
        assert_eq!(out, [4.0, 4.0]);
    }

    #[test]
    fn test_binary_inplace() {
        let mut a = vec![1i64, 2, 3];
        let b = [10i64, 20, 30];
        let p = a.as_mut_ptr();
        unsafe { binary_op_kernel(BinaryOp::Add, p, b.as_ptr(), p, 3) };
        assert_eq!(a, [11, 22, 33]);
    }

    #[test]
    fn test_axpby() {
        let a = [1.0f64, 2.0];
        let b = [3.0f64, 4.0];
        let mut out = [0.0f64; 2];
        unsafe { axpby_kernel(2.0, a.as_ptr(), -1.0, b.as_ptr(), out.as_mut_ptr(), 2) };
        assert_eq!(out, [-1.0, 0.0]);
    }
}
