//! The device-transparent matrix handle
//!
//! [`Matrix`] is one logical 2-D array whose storage may live on the host,
//! on one device, or on both, in dense or sparse layout. Every data-touching
//! operation first asks the [`LocationTracker`] what it needs, performs the
//! transfer or density switch, and only then runs a kernel on the
//! now-current backend.
//!
//! # Ownership and views
//!
//! An owner holds up to two backends (one host, one device) in the context's
//! arena. A view (column slice, reshaped reference) holds the key of one
//! backend it does not own plus a window into it. Releasing or reshaping the
//! aliased backend makes the view fail with [`Error::StaleView`].
//!
//! # Threading
//!
//! A handle and its views are not safe for concurrent mutation. `Matrix` is
//! `Send` but not `Sync`; share it across threads behind a lock.
//!
//! # Example
//!
//! ```
//! use devmat::prelude::*;
//!
//! let ctx = Context::builder().with_emulated_devices(1).build()?;
//! let mut a = Matrix::<f32>::ones(&ctx, 2, 3, DeviceId::Host)?;
//! a.ensure_location(DeviceId::Device(0), TransferMode::MOVE)?;
//! a.scale_inplace(2.0)?;
//! assert_eq!(a.sum_of_elements()?, 12.0);
//! # Ok::<(), devmat::Error>(())
//! ```
//!
//! [`Error::StaleView`]: crate::Error::StaleView

mod core;
mod create;
mod factory;
mod ops;
mod shape;
mod values;

pub use factory::USE_TIME_BASED_SEED;
pub use values::{CscParts, DEFAULT_THRESHOLD, MatrixOrder};

use crate::context::Context;
use crate::dtype::Element;
use crate::location::{Location, LocationTracker};
use crate::runtime::DeviceId;
use crate::storage::{BackendKey, Density, MatrixFormat, Window};
use std::cell::RefCell;
use std::fmt;
use std::marker::PhantomData;

/// One backend a handle refers to, with the write version last seen
#[derive(Debug, Clone, Copy)]
struct Residency {
    key: BackendKey,
    version: u64,
}

/// Whether a handle owns its backends or aliases someone else's
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Role {
    Owner,
    View,
}

#[derive(Debug)]
struct HandleState {
    tracker: LocationTracker,
    preferred: Option<DeviceId>,
    host: Option<Residency>,
    device: Option<Residency>,
    role: Role,
    window: Window,
    thrash_warned: bool,
}

impl HandleState {
    fn empty(preferred: Option<DeviceId>) -> Self {
        Self {
            tracker: LocationTracker::new(),
            preferred,
            host: None,
            device: None,
            role: Role::Owner,
            window: Window::default(),
            thrash_warned: false,
        }
    }

    fn slot(&self, side: DeviceId) -> Option<Residency> {
        if side.is_host() {
            self.host
        } else if self.tracker.device() == Some(side) {
            self.device
        } else {
            None
        }
    }

    fn slot_mut(&mut self, side: DeviceId) -> &mut Option<Residency> {
        if side.is_host() {
            &mut self.host
        } else {
            &mut self.device
        }
    }
}

/// A 2-D matrix of `T` with transparent host/device residency
///
/// See the [module documentation](self) for the residency model.
pub struct Matrix<T: Element> {
    ctx: Context,
    state: RefCell<HandleState>,
    _elem: PhantomData<T>,
}

impl<T: Element> Matrix<T> {
    /// Number of rows
    pub fn rows(&self) -> usize {
        self.state.borrow().window.rows
    }

    /// Number of columns
    pub fn cols(&self) -> usize {
        self.state.borrow().window.cols
    }

    /// (rows, cols)
    pub fn shape(&self) -> (usize, usize) {
        let st = self.state.borrow();
        (st.window.rows, st.window.cols)
    }

    /// Logical element count (`rows * cols`, also for sparse matrices)
    pub fn num_elements(&self) -> usize {
        self.state.borrow().window.len()
    }

    /// Whether the matrix has no elements
    pub fn has_no_elements(&self) -> bool {
        self.num_elements() == 0
    }

    /// Current residency
    pub fn location(&self) -> Location {
        self.state.borrow().tracker.location()
    }

    /// Current density
    pub fn density(&self) -> Density {
        self.state.borrow().tracker.density()
    }

    /// Current storage format
    pub fn format(&self) -> MatrixFormat {
        self.state.borrow().tracker.format()
    }

    /// Home device: the device side if any, the host, or the preferred device
    /// for a matrix without data
    pub fn device_id(&self) -> DeviceId {
        let st = self.state.borrow();
        match st.tracker.location() {
            Location::None => st.tracker.default_target(st.preferred),
            Location::Host => DeviceId::Host,
            Location::Device | Location::Both => st.tracker.device().unwrap_or(DeviceId::Host),
        }
    }

    /// Preferred device for allocation and tie-breaks
    pub fn preferred_device(&self) -> Option<DeviceId> {
        self.state.borrow().preferred
    }

    /// Set the preferred device; no data moves
    pub fn set_preferred_device(&self, device: Option<DeviceId>) {
        self.state.borrow_mut().preferred = device;
    }

    /// Whether this handle aliases another handle's storage
    pub fn is_view(&self) -> bool {
        self.state.borrow().role == Role::View
    }

    /// Number of transfers between locations so far
    pub fn location_changes(&self) -> usize {
        self.state.borrow().tracker.location_changes()
    }

    /// Number of dense/sparse switches so far
    pub fn density_changes(&self) -> usize {
        self.state.borrow().tracker.density_changes()
    }

    /// The context the matrix belongs to
    pub fn context(&self) -> &Context {
        &self.ctx
    }

    fn from_state(ctx: &Context, state: HandleState) -> Self {
        Self {
            ctx: ctx.clone(),
            state: RefCell::new(state),
            _elem: PhantomData,
        }
    }
}

impl<T: Element> Drop for Matrix<T> {
    fn drop(&mut self) {
        let st = self.state.get_mut();
        let (host, device, role) = (st.host.take(), st.device.take(), st.role);
        let released = self.ctx.with_arena(|arena| {
            let mut released = Vec::new();
            for residency in [host, device].into_iter().flatten() {
                match role {
                    Role::Owner => released.extend(arena.remove(residency.key)),
                    Role::View => arena.drop_view(residency.key),
                }
            }
            released
        });
        // Buffers are freed after the arena lock is released
        drop(released);
    }
}

impl<T: Element> fmt::Debug for Matrix<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let st = self.state.borrow();
        f.debug_struct("Matrix")
            .field("dtype", &T::DTYPE)
            .field("rows", &st.window.rows)
            .field("cols", &st.window.cols)
            .field("location", &st.tracker.location())
            .field("device", &st.tracker.device())
            .field("format", &st.tracker.format())
            .field("role", &st.role)
            .finish()
    }
}
