//! Residency state machine
//!
//! [`LocationTracker`] records where a matrix's valid data lives and decides
//! what a request for data at some location requires: nothing, a fresh
//! allocation, or a transfer. It owns no memory; the matrix layer carries out
//! the plan and then commits it.
//!
//! ```text
//!            first write            transfer (keep source)
//!   None ───────────────▶ Host ◀──────────────────────▶ Both
//!     ▲                    │  ▲                           │
//!     │ reset              │  │ transfer (move / empty)   │ write to one side
//!     └────────────────── Device ◀────────────────────────┘
//! ```

use crate::runtime::DeviceId;
use crate::storage::{Density, MatrixFormat};
use smallvec::SmallVec;

/// Where a matrix's authoritative data lives
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum Location {
    /// No data: fresh or reset handle
    #[default]
    None,
    /// Host memory only
    Host,
    /// One device only
    Device,
    /// Host and one device hold equal values
    Both,
}

/// How a transfer treats the values at the source
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransferMode {
    /// Copy values to the target
    ///
    /// With `keep_source`, a host<->device transfer leaves the matrix in
    /// [`Location::Both`]; otherwise the source is released.
    Preserving {
        /// Keep the source side as a valid replica
        keep_source: bool,
    },
    /// Allocate at the target without copying
    ///
    /// The caller must overwrite every element before reading.
    Empty,
}

impl TransferMode {
    /// Copy and release the source
    pub const MOVE: Self = Self::Preserving { keep_source: false };
    /// Copy and keep the source as a replica
    pub const KEEP: Self = Self::Preserving { keep_source: true };
}

/// What it takes to make data valid at a target
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    /// Data is already valid there
    Stay,
    /// No data anywhere yet; allocate at `to`
    Allocate {
        /// Target location
        to: DeviceId,
    },
    /// Copy (or, for empty transfers, only allocate) from `from` to `to`
    Transfer {
        /// Side the values come from
        from: DeviceId,
        /// Target location
        to: DeviceId,
    },
}

/// Sides released by a state change
pub type Released = SmallVec<[DeviceId; 2]>;

/// Residency, density and diagnostic counters of one matrix
#[derive(Debug, Clone, Default)]
pub struct LocationTracker {
    location: Location,
    /// Device index when the location includes a device
    device: Option<usize>,
    /// Most recent device the matrix lived on
    last_device: Option<usize>,
    density: Density,
    format: MatrixFormat,
    location_changes: usize,
    density_changes: usize,
}

impl LocationTracker {
    /// Tracker in the `None` state
    pub fn new() -> Self {
        Self::default()
    }

    /// Current residency
    #[inline]
    pub fn location(&self) -> Location {
        self.location
    }

    /// Current density
    #[inline]
    pub fn density(&self) -> Density {
        self.density
    }

    /// Current format (meaningful once density is determined)
    #[inline]
    pub fn format(&self) -> MatrixFormat {
        self.format
    }

    /// Device side, if the data lives on a device
    pub fn device(&self) -> Option<DeviceId> {
        self.device.map(DeviceId::Device)
    }

    /// Number of transfers between locations
    #[inline]
    pub fn location_changes(&self) -> usize {
        self.location_changes
    }

    /// Number of switches between dense and sparse
    #[inline]
    pub fn density_changes(&self) -> usize {
        self.density_changes
    }

    /// Sides holding valid data
    pub fn sides(&self) -> Released {
        let mut sides = Released::new();
        match self.location {
            Location::None => {}
            Location::Host => sides.push(DeviceId::Host),
            Location::Device => sides.extend(self.device()),
            Location::Both => {
                sides.push(DeviceId::Host);
                sides.extend(self.device());
            }
        }
        sides
    }

    /// Whether valid data exists at `target`
    pub fn holds(&self, target: DeviceId) -> bool {
        self.sides().contains(&target)
    }

    /// Side to read from, applying the tie-break when both are valid
    ///
    /// In `Both`, the side matching `preferred` wins; otherwise the device.
    pub fn read_side(&self, preferred: Option<DeviceId>) -> Option<DeviceId> {
        match self.location {
            Location::None => None,
            Location::Host => Some(DeviceId::Host),
            Location::Device => self.device(),
            Location::Both => match preferred {
                Some(p) if self.holds(p) => Some(p),
                _ => self.device(),
            },
        }
    }

    /// Where a matrix with no data should be materialized
    ///
    /// The preferred device, else the last device the matrix was associated
    /// with, else the host.
    pub fn default_target(&self, preferred: Option<DeviceId>) -> DeviceId {
        preferred
            .or(self.last_device.map(DeviceId::Device))
            .unwrap_or(DeviceId::Host)
    }

    /// Decide what making data valid at `target` requires
    pub fn plan(&self, target: DeviceId) -> Transition {
        match self.location {
            Location::None => Transition::Allocate { to: target },
            _ if self.holds(target) => Transition::Stay,
            Location::Both | Location::Host => Transition::Transfer {
                from: DeviceId::Host,
                to: target,
            },
            Location::Device => Transition::Transfer {
                from: self.device().unwrap_or(DeviceId::Host),
                to: target,
            },
        }
    }

    fn set_single(&mut self, side: DeviceId) {
        match side {
            DeviceId::Host => {
                self.location = Location::Host;
                self.device = None;
            }
            DeviceId::Device(idx) => {
                self.location = Location::Device;
                self.device = Some(idx);
                self.last_device = Some(idx);
            }
        }
    }

    /// Apply a planned transition and report the sides to release
    pub fn commit(&mut self, transition: Transition, mode: TransferMode) -> Released {
        match transition {
            Transition::Stay => Released::new(),
            Transition::Allocate { to } => {
                let released = self.sides();
                self.set_single(to);
                released
            }
            Transition::Transfer { from, to } => {
                self.location_changes += 1;
                let old = self.sides();
                let keep = matches!(mode, TransferMode::Preserving { keep_source: true })
                    && from.is_host() != to.is_host();

                if keep {
                    let device = if to.is_device() { to } else { from };
                    self.location = Location::Both;
                    self.device = device.index();
                    self.last_device = self.device;
                } else {
                    self.set_single(to);
                }

                old.into_iter().filter(|s| !self.holds(*s)).collect()
            }
        }
    }

    /// A write landed on `side`: it becomes the sole authority
    ///
    /// Returns the side that stopped being valid, if any.
    pub fn mark_written(&mut self, side: DeviceId) -> Option<DeviceId> {
        if self.location != Location::Both {
            return None;
        }
        let other = if side.is_host() {
            self.device()
        } else {
            Some(DeviceId::Host)
        };
        self.set_single(side);
        other
    }

    /// Record the density / format now in effect
    ///
    /// Switching away from a determined density counts as a density change.
    pub fn set_format(&mut self, format: MatrixFormat) {
        let density = format.density();
        if self.density != Density::Undetermined && self.density != density {
            self.density_changes += 1;
        }
        self.density = density;
        self.format = format;
    }

    /// Back to `None` with undetermined density; counters are kept
    pub fn reset(&mut self) {
        self.location = Location::None;
        self.device = None;
        self.density = Density::Undetermined;
        self.format = MatrixFormat::Dense;
    }
}
