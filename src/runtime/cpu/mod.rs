//! CPU runtime implementation
//!
//! The CPU runtime uses aligned heap allocation and provides the reference
//! implementation of every kernel. Kernels run synchronously; with the
//! `rayon` feature, large element-wise kernels and reductions are split into
//! parallel chunks.

pub(crate) mod helpers;
mod kernel;
pub(crate) mod kernels;
mod runtime;

pub use kernel::CpuKernels;
pub use runtime::CpuRuntime;
