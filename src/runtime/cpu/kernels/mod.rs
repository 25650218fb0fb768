//! CPU kernel implementations
//!
//! Low-level compute kernels over raw pointers. Kernels are generic over
//! `T: Element`; the `Kernels` impl in `super::kernel` dispatches on dtype.
//!
//! Element-wise kernels accept an output that is exactly the input (in-place
//! update). Partially overlapping blocks fall back to a serial pointer loop.

#![allow(unsafe_op_in_unsafe_fn)] // Kernels are already marked unsafe, inner unsafe is redundant

pub mod binary;
pub mod compress;
pub mod matmul;
pub mod reduce;
pub mod scalar;

pub use binary::{axpby_kernel, binary_op_kernel};
pub use compress::{
    dense_to_sparse_kernel, sparse_reduce_kernel, sparse_scale_kernel, sparse_to_dense_kernel,
};
pub use matmul::{gemm_kernel, transpose_kernel};
pub use reduce::{count_nonzero_kernel, max_abs_diff_kernel, reduce_kernel};
pub use scalar::{fill_kernel, map_kernel};

/// Parallelization threshold: skip Rayon for small blocks (overhead > benefit)
#[cfg(feature = "rayon")]
pub(crate) const PARALLEL_THRESHOLD: usize = 4096;

/// Chunk size handed to each Rayon task
#[cfg(feature = "rayon")]
pub(crate) const CHUNK_SIZE: usize = 4096;
