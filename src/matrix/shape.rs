//! Shape changes, views and density switching

use super::{HandleState, Matrix, Residency, Role};
use crate::density::DensitySwitcher;
use crate::dtype::Element;
use crate::error::{Error, Result};
use crate::location::TransferMode;
use crate::runtime::DeviceId;
use crate::storage::{BackendKey, Density, MatrixFormat, StorageBackend, Window};

impl<T: Element> Matrix<T> {
    /// Give a matrix without data zeroed storage where it would materialize
    fn materialize(&self) -> Result<DeviceId> {
        if let Some(side) = self.current_side()? {
            return Ok(side);
        }
        let target = Self::co_locate(Some(self), &[])?;
        self.ensure_location(target, TransferMode::MOVE)?;
        Ok(target)
    }

    /// New view handle over `window` of the backend at `side`
    fn make_view(&self, side: DeviceId, window: Window) -> Result<Self> {
        let st = self.state.borrow();
        let residency = st
            .slot(side)
            .ok_or_else(|| Error::Internal(format!("no backend at {side}")))?;
        self.ctx.with_arena(|arena| arena.add_view(residency.key))?;

        let mut view = HandleState::empty(Some(side));
        view.role = Role::View;
        view.window = window;
        let plan = view.tracker.plan(side);
        view.tracker.commit(plan, TransferMode::Empty);
        view.tracker.set_format(st.tracker.format());
        *view.slot_mut(side) = Some(residency);
        tracing::debug!(%side, offset = window.offset, rows = window.rows, cols = window.cols, "view created");
        Ok(Self::from_state(&self.ctx, view))
    }

    /// Reinterpret the column-major elements as rows × cols, in place
    pub fn reshape(&mut self, rows: usize, cols: usize) -> Result<()> {
        self.refresh()?;
        if self.density() == Density::Sparse {
            return Err(Error::unsupported_for_sparse("reshape", self.format()));
        }
        let (r, c) = self.shape();
        if rows * cols != r * c {
            return Err(Error::shape_mismatch(&[r, c], &[rows, cols]));
        }
        let mut st = self.state.borrow_mut();
        if st.role == Role::Owner {
            let keys: Vec<BackendKey> = [st.host, st.device].into_iter().flatten().map(|r| r.key).collect();
            self.ctx.with_arena(|arena| -> Result<()> {
                for key in keys {
                    if let Some(dense) = arena.get_mut(key)?.as_dense_mut() {
                        dense.set_shape(rows, cols);
                    }
                }
                Ok(())
            })?;
        }
        st.window.rows = rows;
        st.window.cols = cols;
        Ok(())
    }

    /// View of the same elements as rows × cols
    pub fn reshaped(&self, rows: usize, cols: usize) -> Result<Self> {
        self.require_dense("reshaped")?;
        let (r, c) = self.shape();
        if rows * cols != r * c {
            return Err(Error::shape_mismatch(&[r, c], &[rows, cols]));
        }
        let side = self.materialize()?;
        let offset = self.state.borrow().window.offset;
        self.make_view(side, Window { offset, rows, cols })
    }

    /// View over the whole matrix, in any format
    pub fn as_reference(&self) -> Result<Self> {
        let side = self.materialize()?;
        let window = self.state.borrow().window;
        self.make_view(side, window)
    }

    /// Make `self` share `other`'s storage
    ///
    /// `self` becomes a view of all of `other`; its previous storage is
    /// released.
    pub fn shallow_copy_from(&mut self, other: &Self) -> Result<()> {
        self.check_context(other)?;
        *self = other.as_reference()?;
        Ok(())
    }

    /// Resize to `other`'s shape; see [`resize`](Self::resize)
    pub fn resize_like(&mut self, other: &Self) -> Result<()> {
        let (rows, cols) = other.shape();
        self.resize(rows, cols, 0, true)
    }

    /// Change the column count, keeping the row count
    pub fn resize_columns(&mut self, cols: usize) -> Result<()> {
        let rows = self.rows();
        self.resize(rows, cols, 0, true)
    }

    /// View over columns `[start, start + count)`
    ///
    /// Writes through the view are visible in `self` and the other way
    /// round. CSR matrices cannot be sliced by column.
    pub fn column_slice(&self, start: usize, count: usize) -> Result<Self> {
        if self.format() == MatrixFormat::SparseCsr && self.density() == Density::Sparse {
            return Err(Error::unsupported_for_sparse("column_slice", MatrixFormat::SparseCsr));
        }
        let side = self.materialize()?;
        let operand = self.operand_at(side)?;
        let window = self.ctx.with_arena(|arena| {
            operand
                .backend(arena)?
                .column_window(&operand.window, start, count)
        })?;
        self.make_view(side, window)
    }

    /// Make `self` an aliasing view over columns of `from`
    pub fn assign_column_slice(&mut self, from: &Self, start: usize, count: usize) -> Result<()> {
        self.check_context(from)?;
        *self = from.column_slice(start, count)?;
        Ok(())
    }

    /// Copy the first `count` columns of `from` into columns
    /// `[start, start + count)` of `self`
    ///
    /// The copy is independent: later writes to `from` are not visible here.
    pub fn set_column_slice(&mut self, from: &Self, start: usize, count: usize) -> Result<()> {
        self.check_context(from)?;
        if from.rows() != self.rows() {
            return Err(Error::shape_mismatch(
                &[self.rows(), count],
                &[from.rows(), from.cols()],
            ));
        }
        if count > from.cols() {
            return Err(Error::IndexOutOfBounds {
                index: count,
                size: from.cols(),
            });
        }
        let side = self.materialize()?;
        from.ensure_location(side, TransferMode::KEEP)?;
        let mut dst = self.column_slice(start, count)?;
        let src = from.column_slice(0, count)?;
        dst.set_value_from(&src)
    }

    /// Transposed copy
    pub fn transpose(&self) -> Result<Self> {
        let mut out = self.output_like()?;
        out.assign_transpose_of(self)?;
        Ok(out)
    }

    /// self = aᵀ
    pub fn assign_transpose_of(&mut self, a: &Self) -> Result<()> {
        let (rows, cols) = a.shape();
        self.run_dense(&[a], (cols, rows), false, "transpose", |k, ins, out| {
            k.transpose(&ins[0], out)
        })
    }

    /// self = selfᵀ
    ///
    /// Views keep their shape, so only square views can be transposed.
    pub fn inplace_transpose(&mut self) -> Result<()> {
        let (rows, cols) = self.shape();
        if self.is_view() && rows != cols {
            return Err(Error::invalid_argument(
                "self",
                "a non-square view cannot be transposed in place",
            ));
        }
        let transposed = self.transpose()?;
        self.set_value_from(&transposed)
    }

    /// Convert the storage to `format`
    ///
    /// With `keep_values` exactly the non-zero elements survive; otherwise
    /// the result is zeroed (dense) or empty (sparse). Conversion happens
    /// where the data lives and never transfers. A matrix without data only
    /// records the format for its first allocation.
    pub fn switch_density(&mut self, format: MatrixFormat, keep_values: bool) -> Result<()> {
        self.refresh()?;
        if self.is_view() {
            return Err(Error::invalid_argument("self", "a view cannot change density"));
        }
        if self.density() != Density::Undetermined && self.format() == format {
            return Ok(());
        }
        self.collapse_location()?;
        let Some(side) = self.current_side()? else {
            self.state.borrow_mut().tracker.set_format(format);
            return Ok(());
        };
        let operand = self.operand_at(side)?;
        let switcher = DensitySwitcher::new(self.ctx.config().default_nnz_reserve);
        let (key, version, old) = self.ctx.with_arena(
            |arena| -> Result<(BackendKey, u64, StorageBackend)> {
                let converted =
                    switcher.switch(arena.get(operand.key)?, &operand.window, format, keep_values)?;
                let (key, old) = arena.replace(operand.key, converted)?;
                Ok((key, arena.version(key)?, old))
            },
        )?;
        drop(old);

        let mut st = self.state.borrow_mut();
        let from = st.tracker.format();
        *st.slot_mut(side) = Some(Residency { key, version });
        st.tracker.set_format(format);
        tracing::debug!(%from, to = %format, keep_values, %side, "density switched");
        Ok(())
    }
}
