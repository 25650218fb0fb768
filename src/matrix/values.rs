//! Moving values in and out of a matrix, and diagnostic queries

use super::Matrix;
use crate::density::DensitySwitcher;
use crate::dtype::Element;
use crate::error::{Error, Result};
use crate::location::TransferMode;
use crate::runtime::ReduceOp;
use crate::storage::{
    Buffer, Density, DenseStorage, MatrixFormat, SparseStorage, StorageBackend, Window,
    validate_parts,
};

/// Tolerance used by equality checks when callers have no better one
pub const DEFAULT_THRESHOLD: f64 = 1e-8;

/// Element order of host data passed to [`Matrix::set_value`]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum MatrixOrder {
    /// Columns are contiguous (the storage order)
    #[default]
    ColumnMajor,
    /// Rows are contiguous
    RowMajor,
}

/// Host copy of a matrix in compressed-column form
#[derive(Debug, Clone, PartialEq)]
pub struct CscParts<T> {
    /// Number of rows
    pub rows: usize,
    /// Number of columns
    pub cols: usize,
    /// `cols + 1` offsets into `row_indices` / `values`
    pub col_ptrs: Vec<i64>,
    /// Row of each stored element
    pub row_indices: Vec<i64>,
    /// Stored values
    pub values: Vec<T>,
}

impl<T: Element> CscParts<T> {
    /// Compress a column-major host array, keeping exactly the non-zeros
    ///
    /// `data` must hold `rows * cols` elements.
    pub fn from_column_major(rows: usize, cols: usize, data: &[T]) -> Result<Self> {
        let len = rows
            .checked_mul(cols)
            .ok_or_else(|| Error::invalid_shape(rows, cols, "element count overflows"))?;
        if data.len() != len {
            return Err(Error::shape_mismatch(&[len], &[data.len()]));
        }
        let mut col_ptrs = Vec::with_capacity(cols + 1);
        let mut row_indices = Vec::new();
        let mut values = Vec::new();
        col_ptrs.push(0);
        for column in data.chunks_exact(rows.max(1)).take(cols) {
            for (r, &v) in column.iter().enumerate() {
                if v != T::zero() {
                    row_indices.push(r as i64);
                    values.push(v);
                }
            }
            col_ptrs.push(values.len() as i64);
        }
        // Zero-row matrices have empty columns
        col_ptrs.resize(cols + 1, values.len() as i64);
        Ok(Self {
            rows,
            cols,
            col_ptrs,
            row_indices,
            values,
        })
    }

    /// Check that the parts describe a well-formed rows × cols CSC matrix
    pub fn validate(&self) -> Result<()> {
        if self.rows.checked_mul(self.cols).is_none() {
            return Err(Error::invalid_shape(self.rows, self.cols, "element count overflows"));
        }
        if self.values.len() != self.row_indices.len() {
            return Err(Error::shape_mismatch(&[self.row_indices.len()], &[self.values.len()]));
        }
        validate_parts(
            MatrixFormat::SparseCsc,
            self.rows,
            self.cols,
            &self.col_ptrs,
            &self.row_indices,
            self.values.len(),
        )
    }

    /// Expand into a zero-filled column-major host array
    pub fn to_column_major(&self) -> Result<Vec<T>> {
        self.validate()?;
        let mut out = vec![T::zero(); self.rows * self.cols];
        for (c, bounds) in self.col_ptrs.windows(2).enumerate() {
            for i in bounds[0] as usize..bounds[1] as usize {
                out[c * self.rows + self.row_indices[i] as usize] = self.values[i];
            }
        }
        Ok(out)
    }
}

fn to_column_major<T: Element>(rows: usize, cols: usize, data: &[T], order: MatrixOrder) -> Vec<T> {
    match order {
        MatrixOrder::ColumnMajor => data.to_vec(),
        MatrixOrder::RowMajor => {
            let mut out = Vec::with_capacity(data.len());
            for c in 0..cols {
                out.extend((0..rows).map(|r| data[r * cols + c]));
            }
            out
        }
    }
}

/// Expand CSR parts of a rows × cols block into a column-major array
fn csr_to_column_major<T: Element>(
    rows: usize,
    cols: usize,
    offsets: &[i64],
    indices: &[i64],
    values: &[T],
) -> Vec<T> {
    let mut out = vec![T::zero(); rows * cols];
    for r in 0..rows {
        for i in offsets[r] as usize..offsets[r + 1] as usize {
            out[indices[i] as usize * rows + r] = values[i];
        }
    }
    out
}

impl<T: Element> Matrix<T> {
    fn check_index(&self, row: usize, col: usize) -> Result<()> {
        let (rows, cols) = self.shape();
        if row >= rows {
            return Err(Error::IndexOutOfBounds { index: row, size: rows });
        }
        if col >= cols {
            return Err(Error::IndexOutOfBounds { index: col, size: cols });
        }
        Ok(())
    }

    /// Set every element to `value`
    ///
    /// Sparse matrices only accept zero, which removes every stored element.
    pub fn set_value_scalar(&mut self, value: T) -> Result<()> {
        if self.density() == Density::Sparse {
            if value != T::zero() {
                return Err(Error::unsupported_for_sparse("set_value_scalar", self.format()));
            }
            return self.clear_sparse();
        }
        let target = Self::co_locate(Some(self), &[])?;
        let shape = self.shape();
        self.prepare_output(target, shape.0, shape.1, false, "set_value_scalar")?;
        let out = self.operand_at(target)?;
        let value = value.to_f64();
        self.write_with(out, |kernels, arena| {
            kernels.fill(&out.dense(arena, "set_value_scalar")?, value)
        })
    }

    fn clear_sparse(&mut self) -> Result<()> {
        if self.is_view() {
            return Err(Error::unsupported_for_sparse("set_value_scalar", self.format()));
        }
        let Some(operand) = self.current_operand()? else {
            return Ok(());
        };
        let runtime = self.ctx.runtime(operand.side)?.clone();
        let (rows, cols) = self.shape();
        let empty = self.ctx.with_arena(|arena| -> Result<StorageBackend> {
            let backend = arena.get(operand.key)?;
            let capacity = backend.as_sparse().map_or(0, SparseStorage::capacity);
            StorageBackend::allocate(&runtime, backend.format(), rows, cols, capacity, T::DTYPE)
        })?;
        let mut st = self.state.borrow_mut();
        self.install(&mut st, empty);
        Ok(())
    }

    /// Replace the contents with rows × cols host data
    ///
    /// The old values are never transferred; a sparse matrix stays sparse in
    /// its format and keeps exactly the non-zeros of `data`.
    pub fn set_value(&mut self, rows: usize, cols: usize, data: &[T], order: MatrixOrder) -> Result<()> {
        self.ctx.validate_shape(rows, cols, true)?;
        if data.len() != rows * cols {
            return Err(Error::shape_mismatch(&[rows * cols], &[data.len()]));
        }
        let data = to_column_major(rows, cols, data, order);
        let target = Self::co_locate(Some(self), &[])?;

        if self.density() == Density::Sparse {
            if self.is_view() {
                return Err(Error::unsupported_for_sparse("set_value", self.format()));
            }
            let format = self.format();
            let runtime = self.ctx.runtime(target)?;
            let dense = StorageBackend::from_dense(DenseStorage::from_buffer(
                Buffer::from_slice(runtime, &data)?,
                rows,
                cols,
            )?);
            let switcher = DensitySwitcher::new(self.ctx.config().default_nnz_reserve);
            let backend = switcher.switch(&dense, &Window::full(rows, cols), format, true)?;
            let mut st = self.state.borrow_mut();
            self.install(&mut st, backend);
            return Ok(());
        }

        self.prepare_output(target, rows, cols, false, "set_value")?;
        let out = self.operand_at(target)?;
        self.write_with(out, |_, arena| {
            let backend = out.backend(arena)?;
            let dense = backend
                .as_dense()
                .ok_or_else(|| Error::density_mismatch(Density::Dense, Density::Sparse, "set_value"))?;
            dense.buffer().write(out.window.offset, &data)
        })
    }

    /// Deep copy of `src`: shape, values, density, format and location
    ///
    /// A view receives only the values and needs `src` dense and of its shape.
    pub fn set_value_from(&mut self, src: &Self) -> Result<()> {
        self.check_context(src)?;
        if self.is_view() {
            self.check_same_shape(src)?;
            return self.run_dense(&[src], src.shape(), false, "set_value_from", |k, ins, out| {
                k.copy(&ins[0], out)
            });
        }

        let Some(operand) = src.current_operand()? else {
            self.reset();
            let (rows, cols) = src.shape();
            return self.resize(rows, cols, 0, true);
        };
        let runtime = self.ctx.runtime(operand.side)?.clone();
        let copy = self.ctx.with_arena(|arena| {
            arena
                .get(operand.key)?
                .replicate(&operand.window, &runtime, true)
        })?;
        let mut st = self.state.borrow_mut();
        self.install(&mut st, copy);
        Ok(())
    }

    /// Copy `src`'s values into `self`, keeping `self`'s format and location
    ///
    /// The shape follows `src`. Unlike [`set_value_from`](Self::set_value_from),
    /// `self` does not move and does not change density: a sparse target
    /// keeps exactly the non-zeros of `src`.
    pub fn assign_values_of(&mut self, src: &Self) -> Result<()> {
        const OP: &str = "assign_values_of";
        self.check_context(src)?;
        let (rows, cols) = src.shape();
        let target = Self::co_locate(Some(self), &[])?;
        let src_side = src.current_side()?;
        let src_can_follow = !src.is_view() || src_side == Some(target);

        if src_side.is_some()
            && src_can_follow
            && self.density() != Density::Sparse
            && src.density() != Density::Sparse
        {
            src.ensure_location(target, TransferMode::KEEP)?;
            self.prepare_output(target, rows, cols, false, OP)?;
            let (input, out) = (src.operand_at(target)?, self.operand_at(target)?);
            return self.write_with(out, |kernels, arena| {
                kernels.copy(&input.dense(arena, OP)?, &out.dense(arena, OP)?)
            });
        }

        // Sparse on either side, or a source pinned elsewhere: go through the host
        let values = src.copy_to_array()?;
        self.set_value(rows, cols, &values, MatrixOrder::ColumnMajor)
    }

    /// Column `col` as a single-column view, for dense matrices
    fn column_for_write(&self, col: usize, op: &'static str) -> Result<Self> {
        if self.density() == Density::Sparse {
            return Err(Error::unsupported_for_sparse(op, self.format()));
        }
        let cols = self.cols();
        if col >= cols {
            return Err(Error::IndexOutOfBounds { index: col, size: cols });
        }
        self.column_slice(col, 1)
    }

    /// Overwrite column `col` with host `values` (one per row)
    pub fn set_column(&mut self, col: usize, values: &[T]) -> Result<()> {
        let mut column = self.column_for_write(col, "set_column")?;
        let rows = column.rows();
        column.set_value(rows, 1, values, MatrixOrder::ColumnMajor)
    }

    /// Set every element of column `col` to `value`
    pub fn set_column_value(&mut self, col: usize, value: T) -> Result<()> {
        let mut column = self.column_for_write(col, "set_column_value")?;
        column.set_value_scalar(value)
    }

    /// Overwrite column `col` with the rows × 1 matrix `src`
    pub fn set_column_from(&mut self, col: usize, src: &Self) -> Result<()> {
        self.check_context(src)?;
        let mut column = self.column_for_write(col, "set_column_from")?;
        column.set_value_from(src)
    }

    /// Set one element of a dense matrix
    pub fn set_element(&mut self, row: usize, col: usize, value: T) -> Result<()> {
        self.check_index(row, col)?;
        if self.density() == Density::Sparse {
            return Err(Error::unsupported_for_sparse("set_element", self.format()));
        }
        let target = Self::co_locate(Some(self), &[])?;
        self.ensure_location(target, TransferMode::MOVE)?;
        let out = self.operand_at(target)?;
        self.write_with(out, |_, arena| {
            let dense = out
                .backend(arena)?
                .as_dense()
                .ok_or_else(|| Error::density_mismatch(Density::Dense, Density::Sparse, "set_element"))?;
            dense
                .buffer()
                .write(out.window.offset + col * out.window.rows + row, &[value])
        })
    }

    /// Read one element; absent sparse elements and matrices without data read as zero
    pub fn get_value(&self, row: usize, col: usize) -> Result<T> {
        self.check_index(row, col)?;
        let Some(operand) = self.current_operand()? else {
            return Ok(T::zero());
        };
        self.ctx.with_arena(|arena| {
            let backend = operand.backend(arena)?;
            let window = operand.window;
            if let Some(dense) = backend.as_dense() {
                let v = dense
                    .buffer()
                    .read::<T>(window.offset + col * window.rows + row, 1)?;
                return Ok(v[0]);
            }
            let sparse = backend
                .as_sparse()
                .ok_or_else(|| Error::Internal("backend is neither dense nor sparse".into()))?;
            let (offsets, indices, values) = sparse.host_parts::<T>(&window)?;
            let (major, minor) = match sparse.format() {
                MatrixFormat::SparseCsr => (row, col),
                _ => (col, row),
            };
            let range = offsets[major] as usize..offsets[major + 1] as usize;
            Ok(indices[range.clone()]
                .iter()
                .position(|&i| i as usize == minor)
                .map_or(T::zero(), |p| values[range.start + p]))
        })
    }

    /// All elements in column-major order on the host
    pub fn copy_to_array(&self) -> Result<Vec<T>> {
        let (rows, cols) = self.shape();
        let Some(operand) = self.current_operand()? else {
            return Ok(vec![T::zero(); rows * cols]);
        };
        self.ctx.with_arena(|arena| {
            let backend = operand.backend(arena)?;
            let window = operand.window;
            if let Some(dense) = backend.as_dense() {
                return dense.buffer().read::<T>(window.offset, window.len());
            }
            let sparse = backend
                .as_sparse()
                .ok_or_else(|| Error::Internal("backend is neither dense nor sparse".into()))?;
            let (offsets, indices, values) = sparse.host_parts::<T>(&window)?;
            Ok(match sparse.format() {
                MatrixFormat::SparseCsr => csr_to_column_major(rows, cols, &offsets, &indices, &values),
                _ => CscParts {
                    rows,
                    cols,
                    col_ptrs: offsets,
                    row_indices: indices,
                    values,
                }
                .to_column_major()?,
            })
        })
    }

    /// Copy the top-left rows × cols block into `dst`, columns `col_stride` apart
    pub fn copy_section(&self, rows: usize, cols: usize, dst: &mut [T], col_stride: usize) -> Result<()> {
        let (own_rows, own_cols) = self.shape();
        if rows > own_rows || cols > own_cols {
            return Err(Error::shape_mismatch(&[own_rows, own_cols], &[rows, cols]));
        }
        if col_stride < rows {
            return Err(Error::invalid_argument(
                "col_stride",
                format!("stride {col_stride} is shorter than a column of {rows}"),
            ));
        }
        if rows == 0 || cols == 0 {
            return Ok(());
        }
        let needed = (cols - 1) * col_stride + rows;
        if dst.len() < needed {
            return Err(Error::IndexOutOfBounds {
                index: needed,
                size: dst.len(),
            });
        }
        let all = self.copy_to_array()?;
        for c in 0..cols {
            dst[c * col_stride..c * col_stride + rows]
                .copy_from_slice(&all[c * own_rows..c * own_rows + rows]);
        }
        Ok(())
    }

    /// Host copy in compressed-column form, whatever the storage format
    pub fn copy_to_csc(&self) -> Result<CscParts<T>> {
        let (rows, cols) = self.shape();
        if self.format() == MatrixFormat::SparseCsc
            && let Some(operand) = self.current_operand()?
        {
            let (col_ptrs, row_indices, values) = self.ctx.with_arena(|arena| {
                let sparse = operand
                    .backend(arena)?
                    .as_sparse()
                    .ok_or_else(|| Error::Internal("CSC matrix without sparse storage".into()))?;
                sparse.host_parts::<T>(&operand.window)
            })?;
            return Ok(CscParts {
                rows,
                cols,
                col_ptrs,
                row_indices,
                values,
            });
        }
        CscParts::from_column_major(rows, cols, &self.copy_to_array()?)
    }

    /// Replace the contents with a CSC matrix built from host parts
    ///
    /// The parts are validated first; the result lives where `self` would
    /// materialize and is always in CSC format.
    pub fn set_matrix_from_csc(&mut self, parts: &CscParts<T>) -> Result<()> {
        if self.is_view() {
            return Err(Error::invalid_argument("self", "a view cannot change its storage"));
        }
        self.ctx.validate_shape(parts.rows, parts.cols, true)?;
        let target = Self::co_locate(Some(self), &[])?;
        let runtime = self.ctx.runtime(target)?;
        let sparse = SparseStorage::from_parts(
            runtime,
            MatrixFormat::SparseCsc,
            parts.rows,
            parts.cols,
            &parts.col_ptrs,
            &parts.row_indices,
            &parts.values,
        )?;
        let mut st = self.state.borrow_mut();
        self.install(&mut st, StorageBackend::from_sparse(sparse));
        Ok(())
    }

    /// Overwrite every element with [`Element::invalid`] (NaN for floats)
    pub fn invalidate(&mut self) -> Result<()> {
        if self.density() == Density::Sparse {
            return Err(Error::unsupported_for_sparse("invalidate", self.format()));
        }
        let Some(operand) = self.current_operand()? else {
            return Ok(());
        };
        let marker = T::invalid().to_f64();
        self.write_with(operand, |kernels, arena| {
            kernels.fill(&operand.dense(arena, "invalidate")?, marker)
        })
    }

    /// Number of NaN or infinite elements
    pub fn count_nan_inf(&self) -> Result<usize> {
        Ok(self.reduce(ReduceOp::CountNanInf)? as usize)
    }

    /// True when no element is NaN or infinite
    pub fn is_valid(&self) -> Result<bool> {
        Ok(self.count_nan_inf()? == 0)
    }

    /// Whether any element is NaN; logs an error naming `name` if so
    pub fn has_nan(&self, name: &str) -> Result<bool> {
        let count = self.reduce(ReduceOp::CountNan)? as usize;
        if count > 0 {
            tracing::error!(matrix = name, count, rows = self.rows(), cols = self.cols(), "matrix contains NaN");
        }
        Ok(count > 0)
    }

    /// Whether `other` has the same shape and every element within `threshold`
    ///
    /// NaN never compares equal.
    pub fn is_equal_to(&self, other: &Self, threshold: f64) -> Result<bool> {
        self.check_context(other)?;
        if self.shape() != other.shape() {
            return Ok(false);
        }
        if self.density() != Density::Sparse && other.density() != Density::Sparse {
            let target = Self::co_locate(None, &[self, other])?;
            self.ensure_location(target, TransferMode::KEEP)?;
            other.ensure_location(target, TransferMode::KEEP)?;
            let (a, b) = (self.operand_at(target)?, other.operand_at(target)?);
            let diff = self.read_with(a, |kernels, arena| {
                kernels.max_abs_diff(&a.dense(arena, "is_equal_to")?, &b.dense(arena, "is_equal_to")?)
            })?;
            return Ok(diff <= threshold);
        }

        let (a, b) = (self.copy_to_array()?, other.copy_to_array()?);
        Ok(a.iter()
            .zip(&b)
            .all(|(x, y)| (x.to_f64() - y.to_f64()).abs() <= threshold))
    }

    /// `a.is_equal_to(b, threshold)`
    pub fn are_equal(a: &Self, b: &Self, threshold: f64) -> Result<bool> {
        a.is_equal_to(b, threshold)
    }

    /// Whether any element equals `value`; a NaN `value` matches NaN elements
    pub fn has_element(&self, value: T) -> Result<bool> {
        if value.to_f64().is_nan() {
            return Ok(self.reduce(ReduceOp::CountNan)? > 0.0);
        }
        let values = self.copy_to_array()?;
        Ok(values.contains(&value))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::Context;
    use crate::runtime::DeviceId;

    fn ctx() -> Context {
        Context::builder().with_emulated_devices(1).build().unwrap()
    }

    #[test]
    fn test_row_major_input() {
        let ctx = ctx();
        let mut m = Matrix::<f32>::new(&ctx, None);
        m.set_value(2, 3, &[1.0, 2.0, 3.0, 4.0, 5.0, 6.0], MatrixOrder::RowMajor)
            .unwrap();
        assert_eq!(m.copy_to_array().unwrap(), vec![1.0, 4.0, 2.0, 5.0, 3.0, 6.0]);
        assert_eq!(m.get_value(1, 2).unwrap(), 6.0);
    }

    #[test]
    fn test_set_value_rejects_wrong_length() {
        let ctx = ctx();
        let mut m = Matrix::<f32>::new(&ctx, None);
        let err = m.set_value(2, 2, &[1.0; 3], MatrixOrder::ColumnMajor);
        assert!(matches!(err, Err(Error::ShapeMismatch { .. })));
    }

    #[test]
    fn test_set_element_on_device() {
        let ctx = ctx();
        let mut m = Matrix::<f64>::zeros(&ctx, 2, 2, DeviceId::Device(0)).unwrap();
        m.set_element(1, 0, 7.5).unwrap();
        assert_eq!(m.get_value(1, 0).unwrap(), 7.5);
        assert_eq!(m.device_id(), DeviceId::Device(0));
        assert!(matches!(m.set_element(2, 0, 1.0), Err(Error::IndexOutOfBounds { .. })));
    }

    #[test]
    fn test_csc_roundtrip_through_host_parts() {
        let ctx = ctx();
        let parts = CscParts {
            rows: 3,
            cols: 2,
            col_ptrs: vec![0, 1, 3],
            row_indices: vec![2, 0, 1],
            values: vec![5.0f32, 6.0, 7.0],
        };
        let mut m = Matrix::<f32>::new(&ctx, Some(DeviceId::Device(0)));
        m.set_matrix_from_csc(&parts).unwrap();
        assert_eq!(m.format(), MatrixFormat::SparseCsc);
        assert_eq!(m.device_id(), DeviceId::Device(0));
        assert_eq!(m.nnz().unwrap(), 3);
        assert_eq!(m.get_value(2, 0).unwrap(), 5.0);
        assert_eq!(m.get_value(1, 0).unwrap(), 0.0);
        assert_eq!(m.copy_to_csc().unwrap(), parts);
        assert_eq!(m.copy_to_array().unwrap(), vec![0.0, 0.0, 5.0, 6.0, 7.0, 0.0]);
    }

    #[test]
    fn test_invalid_csc_is_rejected() {
        let ctx = ctx();
        let parts = CscParts {
            rows: 2,
            cols: 1,
            col_ptrs: vec![0, 1],
            row_indices: vec![4],
            values: vec![1.0f64],
        };
        let mut m = Matrix::<f64>::new(&ctx, None);
        assert!(m.set_matrix_from_csc(&parts).is_err());
        assert!(matches!(parts.to_column_major(), Err(Error::IndexOutOfBounds { index: 4, size: 2 })));
    }

    #[test]
    fn test_csc_parts_check_their_inputs() {
        assert!(matches!(
            CscParts::from_column_major(2, 3, &[1.0f32, 0.0, 2.0]),
            Err(Error::ShapeMismatch { .. })
        ));
        assert!(matches!(
            CscParts::<f32>::from_column_major(usize::MAX, 2, &[]),
            Err(Error::InvalidShape { .. })
        ));

        let short_ptrs = CscParts {
            rows: 2,
            cols: 3,
            col_ptrs: vec![0, 1],
            row_indices: vec![0],
            values: vec![1.0f64],
        };
        assert!(matches!(short_ptrs.to_column_major(), Err(Error::ShapeMismatch { .. })));

        let missing_values = CscParts {
            rows: 2,
            cols: 1,
            col_ptrs: vec![0, 2],
            row_indices: vec![0, 1],
            values: vec![1.0f64],
        };
        assert!(missing_values.validate().is_err());

        let parts = CscParts::from_column_major(2, 2, &[0.0f64, 3.0, 4.0, 0.0]).unwrap();
        assert_eq!(parts.col_ptrs, vec![0, 1, 2]);
        assert_eq!(parts.to_column_major().unwrap(), vec![0.0, 3.0, 4.0, 0.0]);
    }

    #[test]
    fn test_copy_section_with_stride() {
        let ctx = ctx();
        let mut m = Matrix::<i32>::new(&ctx, None);
        m.set_value(3, 3, &[1, 2, 3, 4, 5, 6, 7, 8, 9], MatrixOrder::ColumnMajor)
            .unwrap();
        let mut dst = vec![0; 8];
        m.copy_section(2, 2, &mut dst, 4).unwrap();
        assert_eq!(dst, vec![1, 2, 0, 0, 4, 5, 0, 0]);
    }

    #[test]
    fn test_invalidate_and_diagnostics() {
        let ctx = ctx();
        let mut m = Matrix::<f32>::ones(&ctx, 2, 2, DeviceId::Device(0)).unwrap();
        assert!(m.is_valid().unwrap());
        assert!(!m.has_nan("m").unwrap());
        m.invalidate().unwrap();
        assert_eq!(m.count_nan_inf().unwrap(), 4);
        assert!(m.has_nan("m").unwrap());
        assert!(m.has_element(f32::NAN).unwrap());
        assert!(!m.has_element(1.0).unwrap());
    }

    #[test]
    fn test_equality_across_locations() {
        let ctx = ctx();
        let a = Matrix::<f64>::ones(&ctx, 2, 3, DeviceId::Host).unwrap();
        let b = Matrix::<f64>::ones(&ctx, 2, 3, DeviceId::Device(0)).unwrap();
        assert!(Matrix::are_equal(&a, &b, DEFAULT_THRESHOLD).unwrap());
        let c = Matrix::<f64>::ones(&ctx, 3, 2, DeviceId::Host).unwrap();
        assert!(!a.is_equal_to(&c, DEFAULT_THRESHOLD).unwrap());
    }

    #[test]
    fn test_sparse_scalar_fill() {
        let ctx = ctx();
        let mut m = Matrix::<f32>::eye(&ctx, 3, DeviceId::Host).unwrap();
        m.switch_density(MatrixFormat::SparseCsr, true).unwrap();
        assert!(matches!(
            m.set_value_scalar(1.0),
            Err(Error::UnsupportedForSparse { .. })
        ));
        m.set_value_scalar(0.0).unwrap();
        assert_eq!(m.nnz().unwrap(), 0);
        assert_eq!(m.format(), MatrixFormat::SparseCsr);
    }
}
