//! Unary and scalar kernels (fill, copy, scale, add scalar, power)

use crate::dtype::Element;

#[cfg(feature = "rayon")]
use super::{CHUNK_SIZE, PARALLEL_THRESHOLD};
#[cfg(feature = "rayon")]
use rayon::prelude::*;

/// Fill buffer with a constant value
///
/// # Safety
/// - `out` must be a valid pointer to `len` elements
#[inline]
pub unsafe fn fill_kernel<T: Element>(out: *mut T, value: T, len: usize) {
    if len == 0 {
        return;
    }
    let out_slice = std::slice::from_raw_parts_mut(out, len);

    #[cfg(feature = "rayon")]
    if len >= PARALLEL_THRESHOLD {
        out_slice
            .par_chunks_mut(CHUNK_SIZE)
            .for_each(|chunk| chunk.fill(value));
        return;
    }

    out_slice.fill(value);
}

/// out[i] = f(a[i])
///
/// `out == a` updates in place; any other overlap is handled element by
/// element in ascending order.
///
/// # Safety
/// - `a` and `out` must be valid pointers to `len` elements
#[inline]
pub unsafe fn map_kernel<T, F>(a: *const T, out: *mut T, len: usize, f: F)
where
    T: Element,
    F: Fn(T) -> T + Send + Sync,
{
    if len == 0 {
        return;
    }

    if a == out as *const T {
        let out_slice = std::slice::from_raw_parts_mut(out, len);

        #[cfg(feature = "rayon")]
        if len >= PARALLEL_THRESHOLD {
            out_slice.par_chunks_mut(CHUNK_SIZE).for_each(|chunk| {
                for x in chunk {
                    *x = f(*x);
                }
            });
            return;
        }

        for x in out_slice {
            *x = f(*x);
        }
        return;
    }

    let (a_start, out_start) = (a as usize, out as usize);
    let bytes = len * std::mem::size_of::<T>();
    if a_start < out_start + bytes && out_start < a_start + bytes {
        for i in 0..len {
            out.add(i).write(f(a.add(i).read()));
        }
        return;
    }

    let a_slice = std::slice::from_raw_parts(a, len);
    let out_slice = std::slice::from_raw_parts_mut(out, len);

    #[cfg(feature = "rayon")]
    if len >= PARALLEL_THRESHOLD {
        out_slice
            .par_chunks_mut(CHUNK_SIZE)
            .zip(a_slice.par_chunks(CHUNK_SIZE))
            .for_each(|(out_chunk, in_chunk)| {
                for (o, &i) in out_chunk.iter_mut().zip(in_chunk) {
                    *o = f(i);
                }
            });
        return;
    }

    for (o, &i) in out_slice.iter_mut().zip(a_slice) {
        *o = f(i);
    }
}
