//! Compressed sparse storage (CSC / CSR)

use super::{Buffer, MatrixFormat, Window};
use crate::dtype::{DType, Element};
use crate::error::{Error, Result};
use crate::runtime::{Runtime, SparseRef};
use std::sync::Arc;

/// Host copy of a compressed block: offsets, minor indices, values
pub type SparseParts<T> = (Vec<i64>, Vec<i64>, Vec<T>);

/// Compressed sparse matrix in one runtime's memory
///
/// `offsets` has `majors + 1` entries and is zero-initialized, which is the
/// valid empty matrix. `indices` and `values` share a capacity of at least
/// `nnz` elements.
#[derive(Debug)]
pub struct SparseStorage {
    format: MatrixFormat,
    rows: usize,
    cols: usize,
    offsets: Buffer,
    indices: Buffer,
    values: Buffer,
    nnz: usize,
}

fn majors_of(format: MatrixFormat, rows: usize, cols: usize) -> usize {
    match format {
        MatrixFormat::SparseCsr => rows,
        _ => cols,
    }
}

/// Validate compressed parts the way they are about to be stored
pub(crate) fn validate_parts(
    format: MatrixFormat,
    rows: usize,
    cols: usize,
    offsets: &[i64],
    indices: &[i64],
    nnz: usize,
) -> Result<()> {
    let majors = majors_of(format, rows, cols);
    let minors = match format {
        MatrixFormat::SparseCsr => cols,
        _ => rows,
    };

    if offsets.len() != majors + 1 {
        return Err(Error::shape_mismatch(&[majors + 1], &[offsets.len()]));
    }
    if indices.len() != nnz {
        return Err(Error::shape_mismatch(&[nnz], &[indices.len()]));
    }
    if offsets[0] != 0 || offsets[majors] as usize != nnz {
        return Err(Error::invalid_argument(
            "offsets",
            format!(
                "expected [0]=0 and [{majors}]={nnz}, got [0]={} and [{majors}]={}",
                offsets[0], offsets[majors]
            ),
        ));
    }
    if offsets.windows(2).any(|w| w[0] > w[1]) {
        return Err(Error::invalid_argument("offsets", "must be non-decreasing"));
    }
    for &r in indices {
        if r < 0 {
            return Err(Error::invalid_argument("indices", format!("negative index {r}")));
        }
        if r as usize >= minors {
            return Err(Error::IndexOutOfBounds {
                index: r as usize,
                size: minors,
            });
        }
    }
    Ok(())
}

impl SparseStorage {
    /// Allocate an empty matrix with room for `capacity` stored elements
    pub fn new(
        runtime: &Arc<dyn Runtime>,
        format: MatrixFormat,
        rows: usize,
        cols: usize,
        capacity: usize,
        dtype: DType,
    ) -> Result<Self> {
        if !format.is_sparse() {
            return Err(Error::invalid_argument("format", "sparse storage needs CSC or CSR"));
        }
        let majors = majors_of(format, rows, cols);
        Ok(Self {
            format,
            rows,
            cols,
            offsets: Buffer::new(runtime, majors + 1, DType::I64)?,
            indices: Buffer::new(runtime, capacity, DType::I64)?,
            values: Buffer::new(runtime, capacity, dtype)?,
            nnz: 0,
        })
    }

    /// Build from host-side compressed parts, validating them first
    pub fn from_parts<T: Element>(
        runtime: &Arc<dyn Runtime>,
        format: MatrixFormat,
        rows: usize,
        cols: usize,
        offsets: &[i64],
        indices: &[i64],
        values: &[T],
    ) -> Result<Self> {
        validate_parts(format, rows, cols, offsets, indices, values.len())?;
        let storage = Self::new(runtime, format, rows, cols, values.len(), T::DTYPE)?;
        storage.offsets.write(0, offsets)?;
        storage.indices.write(0, indices)?;
        storage.values.write(0, values)?;
        Ok(Self {
            nnz: values.len(),
            ..storage
        })
    }

    /// Compressed layout
    #[inline]
    pub fn format(&self) -> MatrixFormat {
        self.format
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

    /// Number of stored elements
    #[inline]
    pub fn nnz(&self) -> usize {
        self.nnz
    }

    /// Record the stored element count after a kernel filled the arrays
    pub(crate) fn set_nnz(&mut self, nnz: usize) {
        self.nnz = nnz;
    }

    /// Stored elements inside a window
    pub fn nnz_in(&self, window: &Window) -> Result<usize> {
        let majors = majors_of(self.format, window.rows, window.cols);
        if window.offset == 0 && majors == majors_of(self.format, self.rows, self.cols) {
            return Ok(self.nnz);
        }
        let first = self.offsets.read::<i64>(window.offset, 1)?;
        let last = self.offsets.read::<i64>(window.offset + majors, 1)?;
        Ok((last[0] - first[0]) as usize)
    }

    /// Stored elements the arrays can hold
    #[inline]
    pub fn capacity(&self) -> usize {
        self.values.len()
    }

    /// Element type of the values
    #[inline]
    pub fn dtype(&self) -> DType {
        self.values.dtype()
    }

    /// Value buffer
    #[inline]
    pub fn values(&self) -> &Buffer {
        &self.values
    }

    /// Bytes held across all three arrays
    pub fn size_in_bytes(&self) -> usize {
        self.offsets.size_in_bytes() + self.indices.size_in_bytes() + self.values.size_in_bytes()
    }

    /// Whether every array is owned
    pub fn is_owned(&self) -> bool {
        self.offsets.is_owned() && self.indices.is_owned() && self.values.is_owned()
    }

    /// Kernel descriptor for a column window (CSC) or the full matrix
    pub fn sparse_ref(&self, window: &Window) -> SparseRef {
        SparseRef {
            format: self.format,
            offsets: self.offsets.ptr(),
            indices: self.indices.ptr(),
            values: self.values.ptr(),
            major_start: window.offset,
            rows: window.rows,
            cols: window.cols,
            capacity: self.capacity(),
            dtype: self.dtype(),
        }
    }

    /// Host copy of a window with offsets rebased to start at zero
    pub fn host_parts<T: Element>(&self, window: &Window) -> Result<SparseParts<T>> {
        let majors = majors_of(self.format, window.rows, window.cols);
        let mut offsets = self.offsets.read::<i64>(window.offset, majors + 1)?;
        let start = offsets[0] as usize;
        let end = offsets[majors] as usize;
        for o in offsets.iter_mut() {
            *o -= start as i64;
        }
        let indices = self.indices.read::<i64>(start, end - start)?;
        let values = self.values.read::<T>(start, end - start)?;
        Ok((offsets, indices, values))
    }

    /// Copy of a window on `runtime`; an empty matrix when values are dropped
    pub fn replicate(
        &self,
        window: &Window,
        runtime: &Arc<dyn Runtime>,
        copy_values: bool,
    ) -> Result<Self> {
        if !copy_values {
            return Self::new(
                runtime,
                self.format,
                window.rows,
                window.cols,
                self.capacity(),
                self.dtype(),
            );
        }

        let majors = majors_of(self.format, window.rows, window.cols);
        let mut offsets = self.offsets.read::<i64>(window.offset, majors + 1)?;
        let (start, end) = (offsets[0] as usize, offsets[majors] as usize);
        for o in offsets.iter_mut() {
            *o -= start as i64;
        }

        let copy = Self::new(
            runtime,
            self.format,
            window.rows,
            window.cols,
            end - start,
            self.dtype(),
        )?;
        copy.offsets.write(0, &offsets)?;
        copy.indices.copy_from(0, &self.indices, start, end - start)?;
        copy.values.copy_from(0, &self.values, start, end - start)?;
        Ok(Self {
            nnz: end - start,
            ..copy
        })
    }
}
