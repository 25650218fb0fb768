//! The closed set of storage backends

use super::{DenseStorage, Density, MatrixFormat, SparseStorage};
use crate::dtype::DType;
use crate::error::{Error, Result};
use crate::runtime::{DenseRef, DeviceId, Runtime, SparseRef};
use std::sync::Arc;

/// Region of a backend a handle addresses
///
/// `offset` counts elements for dense storage and columns for CSC storage.
/// Owners address the whole backend; views address a contiguous sub-range.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub struct Window {
    /// Start of the region
    pub offset: usize,
    /// Rows in the region
    pub rows: usize,
    /// Columns in the region
    pub cols: usize,
}

impl Window {
    /// Window over a whole rows × cols backend
    pub const fn full(rows: usize, cols: usize) -> Self {
        Self {
            offset: 0,
            rows,
            cols,
        }
    }

    /// Number of logical elements
    #[inline]
    pub const fn len(&self) -> usize {
        self.rows * self.cols
    }

    /// Whether the window covers no elements
    #[inline]
    pub const fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Storage for one side (host or device) of a matrix
///
/// Dispatch over location and density is a `match` on this enum.
#[derive(Debug)]
pub enum StorageBackend {
    /// Dense buffer in host memory
    HostDense(DenseStorage),
    /// Compressed buffers in host memory
    HostSparse(SparseStorage),
    /// Dense buffer in device memory
    DeviceDense(DenseStorage),
    /// Compressed buffers in device memory
    DeviceSparse(SparseStorage),
}

impl StorageBackend {
    /// Wrap dense storage in the variant matching its runtime
    pub fn from_dense(storage: DenseStorage) -> Self {
        if storage.buffer().device().is_host() {
            Self::HostDense(storage)
        } else {
            Self::DeviceDense(storage)
        }
    }

    /// Wrap sparse storage in the variant matching its runtime
    pub fn from_sparse(storage: SparseStorage) -> Self {
        if storage.values().device().is_host() {
            Self::HostSparse(storage)
        } else {
            Self::DeviceSparse(storage)
        }
    }

    /// Allocate a zeroed / empty backend of the given format on `runtime`
    pub fn allocate(
        runtime: &Arc<dyn Runtime>,
        format: MatrixFormat,
        rows: usize,
        cols: usize,
        nnz_reserve: usize,
        dtype: DType,
    ) -> Result<Self> {
        Ok(match format {
            MatrixFormat::Dense => Self::from_dense(DenseStorage::new(runtime, rows, cols, dtype)?),
            sparse => Self::from_sparse(SparseStorage::new(
                runtime,
                sparse,
                rows,
                cols,
                nnz_reserve,
                dtype,
            )?),
        })
    }

    /// Memory space holding the data
    pub fn location(&self) -> DeviceId {
        match self {
            Self::HostDense(_) | Self::HostSparse(_) => DeviceId::Host,
            Self::DeviceDense(d) => d.buffer().device(),
            Self::DeviceSparse(s) => s.values().device(),
        }
    }

    /// Runtime owning the memory
    pub fn runtime(&self) -> &Arc<dyn Runtime> {
        match self {
            Self::HostDense(d) | Self::DeviceDense(d) => d.buffer().runtime(),
            Self::HostSparse(s) | Self::DeviceSparse(s) => s.values().runtime(),
        }
    }

    /// Storage format
    pub fn format(&self) -> MatrixFormat {
        match self {
            Self::HostDense(_) | Self::DeviceDense(_) => MatrixFormat::Dense,
            Self::HostSparse(s) | Self::DeviceSparse(s) => s.format(),
        }
    }

    /// Physical density
    #[inline]
    pub fn density(&self) -> Density {
        self.format().density()
    }

    /// Element type
    pub fn dtype(&self) -> DType {
        match self {
            Self::HostDense(d) | Self::DeviceDense(d) => d.buffer().dtype(),
            Self::HostSparse(s) | Self::DeviceSparse(s) => s.dtype(),
        }
    }

    /// Logical rows × cols
    pub fn shape(&self) -> (usize, usize) {
        match self {
            Self::HostDense(d) | Self::DeviceDense(d) => (d.rows(), d.cols()),
            Self::HostSparse(s) | Self::DeviceSparse(s) => (s.rows(), s.cols()),
        }
    }

    /// Bytes allocated for the backend
    pub fn size_in_bytes(&self) -> usize {
        match self {
            Self::HostDense(d) | Self::DeviceDense(d) => d.buffer().size_in_bytes(),
            Self::HostSparse(s) | Self::DeviceSparse(s) => s.size_in_bytes(),
        }
    }

    /// False when the backend wraps caller memory
    pub fn owns_buffer(&self) -> bool {
        match self {
            Self::HostDense(d) | Self::DeviceDense(d) => d.buffer().is_owned(),
            Self::HostSparse(s) | Self::DeviceSparse(s) => s.is_owned(),
        }
    }

    /// Stored elements: `rows * cols` for dense, `nnz` for sparse
    pub fn stored_elements(&self) -> usize {
        match self {
            Self::HostDense(d) | Self::DeviceDense(d) => d.rows() * d.cols(),
            Self::HostSparse(s) | Self::DeviceSparse(s) => s.nnz(),
        }
    }

    /// Dense storage, if this backend is dense
    pub fn as_dense(&self) -> Option<&DenseStorage> {
        match self {
            Self::HostDense(d) | Self::DeviceDense(d) => Some(d),
            _ => None,
        }
    }

    /// Mutable dense storage, if this backend is dense
    pub fn as_dense_mut(&mut self) -> Option<&mut DenseStorage> {
        match self {
            Self::HostDense(d) | Self::DeviceDense(d) => Some(d),
            _ => None,
        }
    }

    /// Sparse storage, if this backend is sparse
    pub fn as_sparse(&self) -> Option<&SparseStorage> {
        match self {
            Self::HostSparse(s) | Self::DeviceSparse(s) => Some(s),
            _ => None,
        }
    }

    /// Mutable sparse storage, if this backend is sparse
    pub fn as_sparse_mut(&mut self) -> Option<&mut SparseStorage> {
        match self {
            Self::HostSparse(s) | Self::DeviceSparse(s) => Some(s),
            _ => None,
        }
    }

    /// Kernel descriptor of a dense window
    ///
    /// Fails with `DensityMismatch` naming `op` when the backend is sparse.
    pub fn dense_ref(&self, window: &Window, op: &'static str) -> Result<DenseRef> {
        self.as_dense()
            .map(|d| d.dense_ref(window))
            .ok_or_else(|| Error::density_mismatch(Density::Dense, Density::Sparse, op))
    }

    /// Kernel descriptor of a sparse window
    pub fn sparse_ref(&self, window: &Window, op: &'static str) -> Result<SparseRef> {
        self.as_sparse()
            .map(|s| s.sparse_ref(window))
            .ok_or_else(|| Error::density_mismatch(Density::Sparse, Density::Dense, op))
    }

    /// Window over `count` columns starting at `start` inside `base`
    pub fn column_window(&self, base: &Window, start: usize, count: usize) -> Result<Window> {
        if start + count > base.cols {
            return Err(Error::IndexOutOfBounds {
                index: start + count,
                size: base.cols,
            });
        }
        let offset = match self.format() {
            MatrixFormat::Dense => base.offset + start * base.rows,
            MatrixFormat::SparseCsc => base.offset + start,
            MatrixFormat::SparseCsr => {
                return Err(Error::unsupported_for_sparse(
                    "column_slice",
                    MatrixFormat::SparseCsr,
                ));
            }
        };
        Ok(Window {
            offset,
            rows: base.rows,
            cols: count,
        })
    }

    /// New backend on `runtime` holding a window of this one
    ///
    /// Density and format are kept. With `copy_values` false the new backend
    /// is zeroed (dense) or empty (sparse).
    pub fn replicate(
        &self,
        window: &Window,
        runtime: &Arc<dyn Runtime>,
        copy_values: bool,
    ) -> Result<Self> {
        Ok(match self {
            Self::HostDense(d) | Self::DeviceDense(d) => {
                Self::from_dense(d.replicate(window, runtime, copy_values)?)
            }
            Self::HostSparse(s) | Self::DeviceSparse(s) => {
                Self::from_sparse(s.replicate(window, runtime, copy_values)?)
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runtime::{CpuRuntime, EmulatedDevice};

    #[test]
    fn test_variant_follows_runtime() {
        let host: Arc<dyn Runtime> = Arc::new(CpuRuntime::new());
        let dev: Arc<dyn Runtime> = Arc::new(EmulatedDevice::new(2));

        let h = StorageBackend::allocate(&host, MatrixFormat::Dense, 2, 2, 0, DType::F32).unwrap();
        assert!(matches!(h, StorageBackend::HostDense(_)));
        assert_eq!(h.location(), DeviceId::Host);

        let d = StorageBackend::allocate(&dev, MatrixFormat::SparseCsc, 2, 2, 4, DType::F32)
            .unwrap();
        assert!(matches!(d, StorageBackend::DeviceSparse(_)));
        assert_eq!(d.location(), DeviceId::Device(2));
        assert_eq!(d.density(), Density::Sparse);
        assert_eq!(d.stored_elements(), 0);
    }

    #[test]
    fn test_column_window() {
        let host: Arc<dyn Runtime> = Arc::new(CpuRuntime::new());
        let dense = StorageBackend::allocate(&host, MatrixFormat::Dense, 3, 4, 0, DType::F64)
            .unwrap();
        let w = dense.column_window(&Window::full(3, 4), 1, 2).unwrap();
        assert_eq!(w, Window { offset: 3, rows: 3, cols: 2 });
        let nested = dense.column_window(&w, 1, 1).unwrap();
        assert_eq!(nested.offset, 6);
        assert!(dense.column_window(&w, 1, 2).is_err());

        let csr = StorageBackend::allocate(&host, MatrixFormat::SparseCsr, 3, 4, 0, DType::F64)
            .unwrap();
        assert!(matches!(
            csr.column_window(&Window::full(3, 4), 0, 1),
            Err(Error::UnsupportedForSparse { .. })
        ));
    }

    #[test]
    fn test_dense_ref_on_sparse_fails() {
        let host: Arc<dyn Runtime> = Arc::new(CpuRuntime::new());
        let csc = StorageBackend::allocate(&host, MatrixFormat::SparseCsc, 2, 2, 0, DType::F32)
            .unwrap();
        assert!(matches!(
            csc.dense_ref(&Window::full(2, 2), "add"),
            Err(Error::DensityMismatch { op: "add", .. })
        ));
    }
}
