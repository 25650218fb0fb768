//! Full-reduction kernels

use crate::dtype::Element;
use crate::runtime::ReduceOp;

#[cfg(feature = "rayon")]
use super::{CHUNK_SIZE, PARALLEL_THRESHOLD};
#[cfg(feature = "rayon")]
use rayon::prelude::*;

fn reduce_slice<T: Element>(op: ReduceOp, data: &[T]) -> f64 {
    match op {
        ReduceOp::Sum => data.iter().map(|x| x.to_f64()).sum(),
        ReduceOp::SumAbs => data.iter().map(|x| x.to_f64().abs()).sum(),
        ReduceOp::MaxAbs => data.iter().fold(0.0, |acc: f64, x| {
            let v = x.to_f64().abs();
            if v.is_nan() || acc.is_nan() {
                f64::NAN
            } else {
                acc.max(v)
            }
        }),
        ReduceOp::CountNan => data.iter().filter(|x| x.to_f64().is_nan()).count() as f64,
        ReduceOp::CountNanInf => data.iter().filter(|x| !x.is_finite_value()).count() as f64,
    }
}

fn combine(op: ReduceOp, a: f64, b: f64) -> f64 {
    match op {
        ReduceOp::MaxAbs if a.is_nan() || b.is_nan() => f64::NAN,
        ReduceOp::MaxAbs => a.max(b),
        _ => a + b,
    }
}

/// Reduce `len` elements to a single f64
///
/// # Safety
/// - `a` must be a valid pointer to `len` elements
#[inline]
pub unsafe fn reduce_kernel<T: Element>(op: ReduceOp, a: *const T, len: usize) -> f64 {
    if len == 0 {
        return 0.0;
    }
    let a_slice = std::slice::from_raw_parts(a, len);

    #[cfg(feature = "rayon")]
    if len >= PARALLEL_THRESHOLD {
        return a_slice
            .par_chunks(CHUNK_SIZE)
            .map(|chunk| reduce_slice(op, chunk))
            .reduce(|| 0.0, |x, y| combine(op, x, y));
    }

    reduce_slice(op, a_slice)
}

/// Largest absolute element difference
///
/// A NaN on either side counts as an infinite difference.
///
/// # Safety
/// - `a` and `b` must be valid pointers to `len` elements
#[inline]
pub unsafe fn max_abs_diff_kernel<T: Element>(a: *const T, b: *const T, len: usize) -> f64 {
    if len == 0 {
        return 0.0;
    }
    let a_slice = std::slice::from_raw_parts(a, len);
    let b_slice = std::slice::from_raw_parts(b, len);

    a_slice
        .iter()
        .zip(b_slice)
        .map(|(x, y)| {
            let (x, y) = (x.to_f64(), y.to_f64());
            if x == y {
                0.0
            } else {
                let d = (x - y).abs();
                if d.is_nan() { f64::INFINITY } else { d }
            }
        })
        .fold(0.0, f64::max)
}

/// Count elements that are not exactly zero
///
/// # Safety
/// - `a` must be a valid pointer to `len` elements
#[inline]
pub unsafe fn count_nonzero_kernel<T: Element>(a: *const T, len: usize) -> usize {
    if len == 0 {
        return 0;
    }
    let a_slice = std::slice::from_raw_parts(a, len);
    a_slice.iter().filter(|&&x| x.to_f64() != 0.0).count()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reduce_ops() {
        let data = [1.0f64, -2.0, 3.0];
        unsafe {
            assert_eq!(reduce_kernel(ReduceOp::Sum, data.as_ptr(), 3), 2.0);
            assert_eq!(reduce_kernel(ReduceOp::SumAbs, data.as_ptr(), 3), 6.0);
            assert_eq!(reduce_kernel(ReduceOp::MaxAbs, data.as_ptr(), 3), 3.0);
        }
    }

    #[test]
    fn test_count_nan_inf() {
        let data = [1.0f32, f32::NAN, f32::INFINITY, 0.0];
        unsafe {
            assert_eq!(reduce_kernel(ReduceOp::CountNan, data.as_ptr(), 4), 1.0);
            assert_eq!(reduce_kernel(ReduceOp::CountNanInf, data.as_ptr(), 4), 2.0);
            assert_eq!(count_nonzero_kernel(data.as_ptr(), 4), 3);
        }
    }

    #[test]
    fn test_max_abs_diff_nan() {
        let a = [1.0f64, f64::NAN];
        let b = [1.5f64, 2.0];
        unsafe {
            assert_eq!(max_abs_diff_kernel(a.as_ptr(), b.as_ptr(), 1), 0.5);
            assert_eq!(max_abs_diff_kernel(a.as_ptr(), b.as_ptr(), 2), f64::INFINITY);
        }
    }

    #[cfg(feature = "rayon")]
    #[test]
    fn test_parallel_sum_matches_serial() {
        let n = PARALLEL_THRESHOLD * 2 + 3;
        let data: Vec<i64> = (0..n as i64).collect();
        let sum = unsafe { reduce_kernel(ReduceOp::Sum, data.as_ptr(), n) };
        assert_eq!(sum, (n * (n - 1) / 2) as f64);
    }
}
