//! Residency orchestration: refresh, transfers, co-location, kernel launch

use super::{HandleState, Matrix, Residency, Role};
use crate::dtype::Element;
use crate::error::{Error, Result};
use crate::location::{Location, TransferMode, Transition};
use crate::runtime::{DenseRef, DeviceId, Kernels, SparseRef};
use crate::storage::{
    BackendArena, BackendKey, Density, MatrixFormat, StorageBackend, Window,
};
use smallvec::SmallVec;

/// A synchronized operand: which backend, which part of it, where
#[derive(Debug, Clone, Copy)]
pub(super) struct Operand {
    pub(super) key: BackendKey,
    pub(super) window: Window,
    pub(super) side: DeviceId,
}

impl Operand {
    pub(super) fn backend<'a>(&self, arena: &'a BackendArena) -> Result<&'a StorageBackend> {
        arena.get(self.key)
    }

    pub(super) fn dense(&self, arena: &BackendArena, op: &'static str) -> Result<DenseRef> {
        arena.get(self.key)?.dense_ref(&self.window, op)
    }

    pub(super) fn sparse(&self, arena: &BackendArena, op: &'static str) -> Result<SparseRef> {
        arena.get(self.key)?.sparse_ref(&self.window, op)
    }
}

impl<T: Element> Matrix<T> {
    pub(super) fn check_context(&self, other: &Matrix<T>) -> Result<()> {
        if !self.ctx.same_as(&other.ctx) {
            return Err(Error::invalid_argument(
                "other",
                "operands belong to different contexts",
            ));
        }
        Ok(())
    }

    /// Release the backend behind one side of the handle
    ///
    /// Owners remove the backend from the arena; views only drop their
    /// view count.
    pub(super) fn release_side(&self, st: &mut HandleState, side: DeviceId) {
        let Some(residency) = st.slot_mut(side).take() else {
            return;
        };
        let role = st.role;
        let released = self.ctx.with_arena(|arena| match role {
            Role::Owner => arena.remove(residency.key),
            Role::View => {
                arena.drop_view(residency.key);
                None
            }
        });
        if released.is_some() {
            tracing::trace!(%side, "backend released");
        }
        drop(released);
    }

    /// Release every backend and return to `None`; the shape is kept
    pub(super) fn release_all(&self, st: &mut HandleState) {
        // Slots are addressed by kind, so any device index reaches the device slot
        for side in [DeviceId::Host, DeviceId::Device(0)] {
            self.release_side(st, side);
        }
        st.tracker.reset();
        st.role = Role::Owner;
    }

    /// Bring the handle's bookkeeping in line with the arena
    ///
    /// A view whose backend was released or reshaped fails with `StaleView`.
    /// An owner in `Both` whose replica was written through an alias keeps
    /// the written side and drops the other. An owner with a single side
    /// adopts that side's current version, so alias writes made before a
    /// keeping transfer are not mistaken for writes made after it.
    pub(super) fn refresh(&self) -> Result<()> {
        let mut st = self.state.borrow_mut();
        match st.role {
            Role::View => {
                let Some(residency) = st.host.or(st.device) else {
                    return Ok(());
                };
                if !self.ctx.with_arena(|arena| arena.contains(residency.key)) {
                    return Err(Error::StaleView);
                }
                Ok(())
            }
            Role::Owner => {
                if st.tracker.location() != Location::Both {
                    // Slots are addressed by kind, so any device index reaches the device slot
                    for side in [DeviceId::Host, DeviceId::Device(0)] {
                        let Some(residency) = *st.slot_mut(side) else {
                            continue;
                        };
                        let version = self.ctx.with_arena(|arena| arena.version(residency.key))?;
                        if let Some(r) = st.slot_mut(side).as_mut() {
                            r.version = version;
                        }
                    }
                    return Ok(());
                }
                let (Some(host), Some(device)) = (st.host, st.device) else {
                    return Ok(());
                };
                let (hv, dv) = self.ctx.with_arena(|arena| -> Result<(u64, u64)> {
                    Ok((arena.version(host.key)?, arena.version(device.key)?))
                })?;
                let device_side = st.tracker.device().unwrap_or(DeviceId::Host);
                let keep = match (hv != host.version, dv != device.version) {
                    (false, false) => return Ok(()),
                    (true, false) => DeviceId::Host,
                    (false, true) => device_side,
                    (true, true) => {
                        let keep = st.tracker.read_side(st.preferred).unwrap_or(DeviceId::Host);
                        tracing::warn!(
                            kept = %keep,
                            "both replicas were written through aliases; keeping one"
                        );
                        keep
                    }
                };
                if let Some(r) = st.slot_mut(keep).as_mut() {
                    r.version = if keep.is_host() { hv } else { dv };
                }
                if let Some(other) = st.tracker.mark_written(keep) {
                    self.release_side(&mut st, other);
                }
                Ok(())
            }
        }
    }

    /// Make the data valid at `target`
    ///
    /// Does nothing when the data is already there (including `Both`).
    /// Otherwise allocates (no data yet) or transfers according to `mode`.
    /// Views cannot move and fail with `DeviceMismatch` for any other target.
    ///
    /// With [`TransferMode::Empty`] the caller must overwrite every element
    /// before reading; the context can poison such targets to catch misuse.
    pub fn ensure_location(&self, target: DeviceId, mode: TransferMode) -> Result<()> {
        self.refresh()?;
        let runtime = self.ctx.runtime(target)?.clone();
        let mut st = self.state.borrow_mut();
        let plan = st.tracker.plan(target);

        if st.role == Role::View && plan != Transition::Stay {
            return Err(Error::DeviceMismatch {
                lhs: st.tracker.read_side(None).unwrap_or(target),
                rhs: target,
            });
        }

        let config = self.ctx.config();
        match plan {
            Transition::Stay => Ok(()),
            Transition::Allocate { to } => {
                let format = st.tracker.format();
                let window = Window::full(st.window.rows, st.window.cols);
                let backend = StorageBackend::allocate(
                    &runtime,
                    format,
                    window.rows,
                    window.cols,
                    config.default_nnz_reserve,
                    T::DTYPE,
                )?;
                let key = self.ctx.with_arena(|arena| arena.insert(backend));
                st.tracker.commit(plan, mode);
                st.tracker.set_format(format);
                st.window = window;
                *st.slot_mut(to) = Some(Residency { key, version: 0 });
                tracing::debug!(%to, rows = window.rows, cols = window.cols, "allocated");
                Ok(())
            }
            Transition::Transfer { from, to } => {
                let src = st
                    .slot(from)
                    .ok_or_else(|| Error::Internal(format!("no backend recorded at {from}")))?;
                let copy_values = mode != TransferMode::Empty;
                let poison = !copy_values && config.poison_empty_transfers;
                let window = st.window;

                let key = self.ctx.with_arena(|arena| -> Result<BackendKey> {
                    let backend = arena.get(src.key)?.replicate(&window, &runtime, copy_values)?;
                    if poison && let Some(dense) = backend.as_dense() {
                        let block = dense.dense_ref(&Window::full(window.rows, window.cols));
                        runtime.kernels().fill(&block, T::invalid().to_f64())?;
                    }
                    Ok(arena.insert(backend))
                })?;

                let released = st.tracker.commit(plan, mode);
                for side in released {
                    self.release_side(&mut st, side);
                }
                *st.slot_mut(to) = Some(Residency { key, version: 0 });

                let changes = st.tracker.location_changes();
                tracing::debug!(%from, %to, ?mode, changes, "transfer");
                let threshold = config.thrash_warning_threshold;
                if threshold > 0 && changes >= threshold && !st.thrash_warned {
                    st.thrash_warned = true;
                    tracing::warn!(
                        changes,
                        rows = window.rows,
                        cols = window.cols,
                        "matrix keeps moving between locations"
                    );
                }
                Ok(())
            }
        }
    }

    /// Move the data to `target`, even out of `Both`
    ///
    /// Unlike [`ensure_location`](Self::ensure_location), a non-keeping mode
    /// leaves `target` as the only valid side. The preferred device becomes
    /// `target`.
    pub fn transfer_to_device(&mut self, target: DeviceId, mode: TransferMode) -> Result<()> {
        self.ensure_location(target, mode)?;
        let mut st = self.state.borrow_mut();
        if st.role == Role::Owner {
            st.preferred = Some(target);
        }
        if !matches!(mode, TransferMode::Preserving { keep_source: true })
            && let Some(other) = st.tracker.mark_written(target)
        {
            self.release_side(&mut st, other);
        }
        Ok(())
    }

    /// Drop `Both` down to one side, chosen by the tie-break policy
    pub fn collapse_location(&self) -> Result<()> {
        self.refresh()?;
        let mut st = self.state.borrow_mut();
        if st.tracker.location() != Location::Both {
            return Ok(());
        }
        let keep = st.tracker.read_side(st.preferred).unwrap_or(DeviceId::Host);
        if let Some(other) = st.tracker.mark_written(keep) {
            self.release_side(&mut st, other);
        }
        Ok(())
    }

    /// Side to read from after a refresh, `None` when there is no data
    pub(super) fn current_side(&self) -> Result<Option<DeviceId>> {
        self.refresh()?;
        let st = self.state.borrow();
        Ok(st.tracker.read_side(st.preferred))
    }

    /// Descriptor of the data at `side`
    pub(super) fn operand_at(&self, side: DeviceId) -> Result<Operand> {
        let st = self.state.borrow();
        let residency = st
            .slot(side)
            .ok_or_else(|| Error::Internal(format!("no backend at {side}")))?;
        Ok(Operand {
            key: residency.key,
            window: st.window,
            side,
        })
    }

    /// Descriptor of the data at the current read side
    pub(super) fn current_operand(&self) -> Result<Option<Operand>> {
        match self.current_side()? {
            Some(side) => self.operand_at(side).map(Some),
            None => Ok(None),
        }
    }

    pub(super) fn require_dense(&self, op: &'static str) -> Result<()> {
        match self.density() {
            Density::Sparse => Err(Error::density_mismatch(Density::Dense, Density::Sparse, op)),
            _ => Ok(()),
        }
    }

    /// Record a completed write at `side` with the arena's new version
    pub(super) fn finish_write(&self, side: DeviceId, version: u64) {
        let mut st = self.state.borrow_mut();
        if st.role == Role::Owner
            && let Some(r) = st.slot_mut(side).as_mut()
        {
            r.version = version;
        }
        if let Some(other) = st.tracker.mark_written(side) {
            self.release_side(&mut st, other);
        }
    }

    /// Run a kernel that writes into `out`, then record the write
    pub(super) fn write_with<R>(
        &self,
        out: Operand,
        f: impl FnOnce(&dyn Kernels, &mut BackendArena) -> Result<R>,
    ) -> Result<R> {
        let runtime = self.ctx.runtime(out.side)?.clone();
        let (result, version) = self.ctx.with_arena(|arena| -> Result<(R, u64)> {
            let result = f(runtime.kernels(), arena)?;
            Ok((result, arena.bump_version(out.key)?))
        })?;
        self.finish_write(out.side, version);
        Ok(result)
    }

    /// Run a read-only kernel against `operand`
    pub(super) fn read_with<R>(
        &self,
        operand: Operand,
        f: impl FnOnce(&dyn Kernels, &BackendArena) -> Result<R>,
    ) -> Result<R> {
        let runtime = self.ctx.runtime(operand.side)?.clone();
        self.ctx.with_arena(|arena| f(runtime.kernels(), arena))
    }

    /// Pick the location an operation runs at
    ///
    /// Views cannot move, so a view operand decides; views at different
    /// locations are a `DeviceMismatch`. Otherwise the output's location
    /// (or preferred device) wins, then the first input holding data, then
    /// the output's default.
    pub(super) fn co_locate(output: Option<&Self>, inputs: &[&Self]) -> Result<DeviceId> {
        let mut pinned: Option<DeviceId> = None;
        for m in output.into_iter().chain(inputs.iter().copied()) {
            m.refresh()?;
            let st = m.state.borrow();
            if st.role != Role::View {
                continue;
            }
            let Some(side) = st.tracker.read_side(None) else {
                continue;
            };
            match pinned {
                Some(p) if p != side => return Err(Error::DeviceMismatch { lhs: p, rhs: side }),
                _ => pinned = Some(side),
            }
        }
        if let Some(p) = pinned {
            return Ok(p);
        }

        if let Some(out) = output {
            let st = out.state.borrow();
            if let Some(side) = st.tracker.read_side(st.preferred) {
                return Ok(side);
            }
            if let Some(p) = st.preferred {
                return Ok(p);
            }
        }
        for m in inputs {
            let st = m.state.borrow();
            if let Some(side) = st.tracker.read_side(st.preferred) {
                return Ok(side);
            }
        }
        Ok(match output {
            Some(out) => {
                let st = out.state.borrow();
                st.tracker.default_target(st.preferred)
            }
            None => DeviceId::Host,
        })
    }

    /// Make this handle a dense rows × cols output at `target`
    ///
    /// With `preserve`, current values are carried along (in-place updates);
    /// otherwise storage may be replaced and values are unspecified.
    pub(super) fn prepare_output(
        &self,
        target: DeviceId,
        rows: usize,
        cols: usize,
        preserve: bool,
        op: &'static str,
    ) -> Result<()> {
        self.require_dense(op)?;
        let (role, shape) = {
            let st = self.state.borrow();
            (st.role, (st.window.rows, st.window.cols))
        };

        if role == Role::View {
            if shape != (rows, cols) {
                return Err(Error::shape_mismatch(&[rows, cols], &[shape.0, shape.1]));
            }
            return self.ensure_location(target, TransferMode::MOVE);
        }

        self.ctx.validate_shape(rows, cols, true)?;
        if shape != (rows, cols) {
            if preserve {
                return Err(Error::shape_mismatch(&[rows, cols], &[shape.0, shape.1]));
            }
            self.refresh()?;
            let mut st = self.state.borrow_mut();
            self.release_all(&mut st);
            st.window = Window::full(rows, cols);
            st.tracker.set_format(MatrixFormat::Dense);
        }

        let mode = if preserve {
            TransferMode::MOVE
        } else {
            TransferMode::Empty
        };
        self.ensure_location(target, mode)
    }

    /// Co-locate dense operands and run a kernel writing a rows × cols result
    /// into `self`
    ///
    /// With `self_is_input`, `self`'s current values are passed as the first
    /// input and preserved up to the kernel call.
    pub(super) fn run_dense<R>(
        &self,
        inputs: &[&Self],
        (rows, cols): (usize, usize),
        self_is_input: bool,
        op: &'static str,
        f: impl FnOnce(&dyn Kernels, &[DenseRef], &DenseRef) -> Result<R>,
    ) -> Result<R> {
        for input in inputs {
            self.check_context(input)?;
        }
        let target = Self::co_locate(Some(self), inputs)?;
        for input in inputs {
            input.ensure_location(target, TransferMode::KEEP)?;
            input.require_dense(op)?;
        }
        self.prepare_output(target, rows, cols, self_is_input, op)?;

        let ins = inputs
            .iter()
            .map(|m| m.operand_at(target))
            .collect::<Result<SmallVec<[Operand; 2]>>>()?;
        let out = self.operand_at(target)?;

        self.write_with(out, |kernels, arena| {
            let mut refs = SmallVec::<[DenseRef; 3]>::new();
            if self_is_input {
                refs.push(out.dense(arena, op)?);
            }
            for o in &ins {
                refs.push(o.dense(arena, op)?);
            }
            let out_ref = out.dense(arena, op)?;
            f(kernels, &refs, &out_ref)
        })
    }
}
