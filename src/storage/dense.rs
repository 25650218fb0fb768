//! Dense column-major storage

use super::{Buffer, Window};
use crate::dtype::DType;
use crate::error::{Error, Result};
use crate::runtime::{DenseRef, Runtime};
use std::sync::Arc;

/// A rows × cols column-major block inside a buffer
///
/// The buffer may be larger than `rows * cols`: shrinking resizes keep the
/// allocation so that growing back is free.
#[derive(Debug)]
pub struct DenseStorage {
    buffer: Buffer,
    rows: usize,
    cols: usize,
}

impl DenseStorage {
    /// Allocate a zeroed rows × cols block
    pub fn new(runtime: &Arc<dyn Runtime>, rows: usize, cols: usize, dtype: DType) -> Result<Self> {
        Ok(Self {
            buffer: Buffer::new(runtime, rows * cols, dtype)?,
            rows,
            cols,
        })
    }

    /// Interpret an existing buffer as a rows × cols block
    pub fn from_buffer(buffer: Buffer, rows: usize, cols: usize) -> Result<Self> {
        if rows * cols > buffer.len() {
            return Err(Error::shape_mismatch(&[buffer.len()], &[rows * cols]));
        }
        Ok(Self { buffer, rows, cols })
    }

    /// Number of rows
    #[inline]
    pub fn rows(&self) -> usize {
        self.rows
    }

    /// Number of columns
    #[inline]
    pub fn cols(&self) -> usize {
        self.cols
    }

    /// Elements the buffer can hold
    #[inline]
    pub fn capacity(&self) -> usize {
        self.buffer.len()
    }

    /// Underlying buffer
    #[inline]
    pub fn buffer(&self) -> &Buffer {
        &self.buffer
    }

    /// Change the logical shape without reallocating
    ///
    /// Returns false when the buffer is too small.
    pub fn set_shape(&mut self, rows: usize, cols: usize) -> bool {
        if rows * cols > self.capacity() {
            return false;
        }
        self.rows = rows;
        self.cols = cols;
        true
    }

    /// Kernel descriptor for a window of this block
    pub fn dense_ref(&self, window: &Window) -> DenseRef {
        DenseRef {
            ptr: self.buffer.ptr(),
            offset: window.offset,
            rows: window.rows,
            cols: window.cols,
            dtype: self.buffer.dtype(),
        }
    }

    /// Fresh zeroed copy of a window on `runtime`, optionally with its values
    pub fn replicate(
        &self,
        window: &Window,
        runtime: &Arc<dyn Runtime>,
        copy_values: bool,
    ) -> Result<Self> {
        let copy = Self::new(runtime, window.rows, window.cols, self.buffer.dtype())?;
        if copy_values {
            copy.buffer
                .copy_from(0, &self.buffer, window.offset, window.len())?;
        }
        Ok(copy)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runtime::CpuRuntime;

    #[test]
    fn test_set_shape_within_capacity() {
        let rt: Arc<dyn Runtime> = Arc::new(CpuRuntime::new());
        let mut d = DenseStorage::new(&rt, 4, 4, DType::F32).unwrap();
        assert!(d.set_shape(2, 3));
        assert_eq!((d.rows(), d.cols(), d.capacity()), (2, 3, 16));
        assert!(d.set_shape(4, 4));
        assert!(!d.set_shape(5, 4));
        assert_eq!(rt.memory_stats().allocations, 1);
    }

    #[test]
    fn test_replicate_window() {
        let rt: Arc<dyn Runtime> = Arc::new(CpuRuntime::new());
        let buf = Buffer::from_slice(&rt, &[1.0f64, 2.0, 3.0, 4.0, 5.0, 6.0]).unwrap();
        let d = DenseStorage::from_buffer(buf, 2, 3).unwrap();
        let window = Window {
            offset: 2,
            rows: 2,
            cols: 2,
        };
        let copy = d.replicate(&window, &rt, true).unwrap();
        assert_eq!((copy.rows(), copy.cols()), (2, 2));
        assert_eq!(copy.buffer().read::<f64>(0, 4).unwrap(), vec![3.0, 4.0, 5.0, 6.0]);
    }
}
