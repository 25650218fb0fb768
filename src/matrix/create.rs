//! Construction, lifecycle and resizing

use super::{HandleState, Matrix, Residency, Role};
use crate::context::Context;
use crate::dtype::Element;
use crate::error::{Error, Result};
use crate::location::TransferMode;
use crate::runtime::DeviceId;
use crate::storage::{
    BackendKey, Buffer, Density, DenseStorage, MatrixFormat, StorageBackend, Window,
};

impl<T: Element> Matrix<T> {
    /// Empty 0 × 0 handle with no storage
    ///
    /// `device` becomes the preferred device: the first write materializes
    /// the matrix there.
    pub fn new(ctx: &Context, device: Option<DeviceId>) -> Self {
        Self::from_state(ctx, HandleState::empty(device))
    }

    /// rows × cols matrix at `device` in `format`
    ///
    /// Dense matrices start zeroed; sparse matrices start with no stored
    /// elements and room for `nnz_hint` of them (0 selects the configured
    /// default reservation).
    pub fn create(
        ctx: &Context,
        rows: usize,
        cols: usize,
        device: DeviceId,
        format: MatrixFormat,
        nnz_hint: usize,
    ) -> Result<Self> {
        ctx.validate_shape(rows, cols, false)?;
        let runtime = ctx.runtime(device)?;
        let reserve = if nnz_hint == 0 {
            ctx.config().default_nnz_reserve
        } else {
            nnz_hint
        };
        let backend = StorageBackend::allocate(runtime, format, rows, cols, reserve, T::DTYPE)?;
        tracing::debug!(rows, cols, %device, %format, "matrix created");
        Ok(Self::adopt(ctx, backend, Some(device)))
    }

    /// Dense rows × cols matrix over caller memory at `device`
    ///
    /// Without `owns_buffer` the memory is never freed by the matrix, not
    /// even when a transfer moves the data away.
    ///
    /// # Safety
    /// - `ptr` must address `rows * cols` column-major elements of `T` in the
    ///   memory space of `device` (a host address for `DeviceId::Host`)
    /// - The memory must stay valid while the matrix refers to it
    /// - With `owns_buffer`, the memory must come from that runtime's
    ///   `allocate` with exactly `rows * cols * size_of::<T>()` bytes
    pub unsafe fn create_external(
        ctx: &Context,
        rows: usize,
        cols: usize,
        ptr: *mut T,
        device: DeviceId,
        owns_buffer: bool,
    ) -> Result<Self> {
        ctx.validate_shape(rows, cols, false)?;
        if ptr.is_null() {
            return Err(Error::invalid_argument("ptr", "external buffer is null"));
        }
        let runtime = ctx.runtime(device)?;
        // SAFETY: the caller guarantees extent, lifetime and provenance
        let buffer = unsafe {
            Buffer::from_raw(runtime, ptr as usize as u64, rows * cols, T::DTYPE, owns_buffer)
        };
        let dense = DenseStorage::from_buffer(buffer, rows, cols)?;
        tracing::debug!(rows, cols, %device, owns_buffer, "external matrix wrapped");
        Ok(Self::adopt(ctx, StorageBackend::from_dense(dense), Some(device)))
    }

    /// Handle owning `backend` as its only side
    pub(super) fn adopt(ctx: &Context, backend: StorageBackend, preferred: Option<DeviceId>) -> Self {
        let matrix = Self::new(ctx, preferred);
        {
            let mut st = matrix.state.borrow_mut();
            matrix.install(&mut st, backend);
        }
        matrix
    }

    /// Replace all storage with `backend`, which becomes the only side
    pub(super) fn install(&self, st: &mut HandleState, backend: StorageBackend) {
        let prior = (st.tracker.density() != Density::Undetermined).then(|| st.tracker.format());
        self.release_all(st);
        if let Some(format) = prior {
            st.tracker.set_format(format);
        }
        let side = backend.location();
        let (rows, cols) = backend.shape();
        let format = backend.format();
        let key = self.ctx.with_arena(|arena| arena.insert(backend));

        let plan = st.tracker.plan(side);
        st.tracker.commit(plan, TransferMode::Empty);
        st.tracker.set_format(format);
        st.window = Window::full(rows, cols);
        *st.slot_mut(side) = Some(Residency { key, version: 0 });
    }

    /// Independent copy with the same values, shape, density and location
    pub fn deep_clone(&self) -> Result<Self> {
        let mut copy = Self::new(&self.ctx, self.preferred_device());
        copy.set_value_from(self)?;
        Ok(copy)
    }

    /// Move the contents out, leaving this handle empty
    ///
    /// Views of the storage stay valid: they follow the returned handle.
    pub fn take(&mut self) -> Self {
        let empty = Self::new(&self.ctx, self.preferred_device());
        std::mem::replace(self, empty)
    }

    /// Release all storage: back to `None` with a 0 × 0 shape
    ///
    /// A view stops aliasing and becomes an empty owner. The preferred
    /// device and the diagnostic counters are kept.
    pub fn reset(&mut self) {
        let mut st = self.state.borrow_mut();
        self.release_all(&mut st);
        st.window = Window::default();
    }

    /// Change the shape to rows × cols
    ///
    /// An unchanged shape costs nothing. A dense matrix keeps its allocation
    /// when it fits (`grow_only`: capacity is large enough; otherwise the
    /// exact size); element values are unspecified after a shape change.
    /// A sparse matrix is cleared and reserves `nnz_hint` elements (0 keeps
    /// the larger of its capacity and the configured default).
    ///
    /// Only the authoritative side is resized; `Both` drops to it. Views of
    /// the previous storage become stale.
    pub fn resize(&mut self, rows: usize, cols: usize, nnz_hint: usize, grow_only: bool) -> Result<()> {
        self.refresh()?;
        self.ctx.validate_shape(rows, cols, true)?;
        let mut st = self.state.borrow_mut();
        let shape_unchanged = (st.window.rows, st.window.cols) == (rows, cols);

        if st.role == Role::View {
            if shape_unchanged {
                return Ok(());
            }
            return Err(Error::invalid_argument("self", "a view cannot be resized"));
        }

        let Some(side) = st.tracker.read_side(st.preferred) else {
            // Storage is allocated at the first write
            st.window = Window::full(rows, cols);
            return Ok(());
        };
        let key = st
            .slot(side)
            .ok_or_else(|| Error::Internal(format!("no backend at {side}")))?
            .key;
        let format = st.tracker.format();
        let reserve_default = self.ctx.config().default_nnz_reserve;
        let runtime = self.ctx.runtime(side)?.clone();

        let plan = self.ctx.with_arena(|arena| -> Result<Option<ResizePlan>> {
            let backend = arena.get(key)?;
            Ok(match (backend.as_dense(), backend.as_sparse()) {
                (Some(_), _) if shape_unchanged => None,
                (Some(dense), _) => {
                    let need = rows * cols;
                    let cap = dense.capacity();
                    let fits = if grow_only { need <= cap } else { need == cap };
                    Some(if fits {
                        ResizePlan::Reshape
                    } else {
                        ResizePlan::Reallocate(0)
                    })
                }
                (_, Some(sparse)) if shape_unchanged && nnz_hint <= sparse.capacity() => None,
                (_, Some(sparse)) => Some(ResizePlan::Reallocate(if nnz_hint > 0 {
                    nnz_hint
                } else {
                    sparse.capacity().max(reserve_default)
                })),
                (None, None) => None,
            })
        })?;
        let Some(plan) = plan else {
            return Ok(());
        };

        if let Some(other) = st.tracker.mark_written(side) {
            self.release_side(&mut st, other);
        }

        let replacement = match plan {
            ResizePlan::Reshape => None,
            ResizePlan::Reallocate(reserve) => Some(StorageBackend::allocate(
                &runtime, format, rows, cols, reserve, T::DTYPE,
            )?),
        };
        let reallocated = replacement.is_some();
        let (new_key, version, old) = self.ctx.with_arena(
            |arena| -> Result<(BackendKey, u64, Option<StorageBackend>)> {
                let (new_key, old) = match replacement {
                    Some(backend) => {
                        let (k, old) = arena.replace(key, backend)?;
                        (k, Some(old))
                    }
                    None => {
                        if let Some(dense) = arena.get_mut(key)?.as_dense_mut() {
                            dense.set_shape(rows, cols);
                        }
                        (arena.reissue(key)?, None)
                    }
                };
                Ok((new_key, arena.version(new_key)?, old))
            },
        )?;
        drop(old);

        *st.slot_mut(side) = Some(Residency {
            key: new_key,
            version,
        });
        st.window = Window::full(rows, cols);
        tracing::debug!(rows, cols, reallocated, %side, "resize");
        Ok(())
    }

    /// Views currently recorded against the current backend
    pub fn num_views(&self) -> usize {
        let st = self.state.borrow();
        let Some(side) = st.tracker.read_side(st.preferred) else {
            return 0;
        };
        st.slot(side)
            .map_or(0, |r| self.ctx.with_arena(|arena| arena.num_views(r.key)))
    }

    /// False for views and for matrices over caller memory
    pub fn owns_buffer(&self) -> Result<bool> {
        if self.is_view() {
            return Ok(false);
        }
        let Some(operand) = self.current_operand()? else {
            return Ok(true);
        };
        self.ctx
            .with_arena(|arena| Ok(operand.backend(arena)?.owns_buffer()))
    }

    /// Bytes allocated by the current backend (0 without data)
    pub fn buffer_size(&self) -> Result<usize> {
        let Some(operand) = self.current_operand()? else {
            return Ok(0);
        };
        self.ctx
            .with_arena(|arena| Ok(operand.backend(arena)?.size_in_bytes()))
    }

    /// Stored elements: every element when dense, the non-zeros when sparse
    pub fn nnz(&self) -> Result<usize> {
        let Some(operand) = self.current_operand()? else {
            return Ok(0);
        };
        self.ctx.with_arena(|arena| match operand.backend(arena)?.as_sparse() {
            Some(sparse) => sparse.nnz_in(&operand.window),
            None => Ok(operand.window.len()),
        })
    }
}

#[derive(Debug, Clone, Copy)]
enum ResizePlan {
    /// Keep the allocation, change the logical shape
    Reshape,
    /// New storage with the given sparse reservation
    Reallocate(usize),
}
