//! Dense <-> sparse conversion on a single runtime
//!
//! Conversion never moves data between locations: the new backend is
//! allocated on the runtime of the source and built with that runtime's
//! kernels.

use crate::error::Result;
use crate::storage::{DenseStorage, MatrixFormat, SparseStorage, StorageBackend, Window};

/// Converts a backend window to another storage format
#[derive(Debug, Clone, Copy)]
pub struct DensitySwitcher {
    nnz_reserve: usize,
}

impl DensitySwitcher {
    /// Switcher reserving `nnz_reserve` slots for value-discarding sparse targets
    pub fn new(nnz_reserve: usize) -> Self {
        Self { nnz_reserve }
    }

    /// Build a backend in `target` format from `window` of `source`
    ///
    /// With `keep_values`, exactly the non-zero elements survive in either
    /// direction (no epsilon). Without it the result is zeroed or empty.
    pub fn switch(
        &self,
        source: &StorageBackend,
        window: &Window,
        target: MatrixFormat,
        keep_values: bool,
    ) -> Result<StorageBackend> {
        let runtime = source.runtime();
        let dtype = source.dtype();

        if !keep_values {
            return StorageBackend::allocate(
                runtime,
                target,
                window.rows,
                window.cols,
                self.nnz_reserve,
                dtype,
            );
        }

        if source.format() == target {
            return source.replicate(window, runtime, true);
        }

        let kernels = runtime.kernels();
        match (source, target) {
            (StorageBackend::HostDense(d) | StorageBackend::DeviceDense(d), sparse) => {
                let src = d.dense_ref(window);
                let nnz = kernels.count_nonzero(&src)?;
                let mut out =
                    SparseStorage::new(runtime, sparse, window.rows, window.cols, nnz, dtype)?;
                let stored = kernels.dense_to_sparse(&src, &out.sparse_ref(&Window::full(
                    window.rows,
                    window.cols,
                )))?;
                out.set_nnz(stored);
                tracing::debug!(nnz = stored, format = %sparse, "dense -> sparse");
                Ok(StorageBackend::from_sparse(out))
            }
            (StorageBackend::HostSparse(s) | StorageBackend::DeviceSparse(s), MatrixFormat::Dense) => {
                let out = DenseStorage::new(runtime, window.rows, window.cols, dtype)?;
                kernels.sparse_to_dense(
                    &s.sparse_ref(window),
                    &out.dense_ref(&Window::full(window.rows, window.cols)),
                )?;
                tracing::debug!(nnz = s.nnz(), "sparse -> dense");
                Ok(StorageBackend::from_dense(out))
            }
            (StorageBackend::HostSparse(_) | StorageBackend::DeviceSparse(_), other) => {
                // CSC <-> CSR goes through a dense intermediate
                let dense = self.switch(source, window, MatrixFormat::Dense, true)?;
                self.switch(&dense, &Window::full(window.rows, window.cols), other, true)
            }
        }
    }
}
