//! # devmat
//!
//! **Device-transparent numeric matrices for Rust.**
//!
//! A [`Matrix`] is one logical 2-D array whose storage can live on the host,
//! on an accelerator, or on both, in dense or sparse (CSC/CSR) layout.
//! Callers ask for data where they need it; the matrix allocates, transfers,
//! or switches density lazily and keeps track of which copy is authoritative.
//!
//! ## Features
//!
//! - **Lazy residency**: `None`, `Host`, `Device` and `Both` states with
//!   preserving, keeping and empty transfers
//! - **Four backends**: host/device × dense/sparse behind one closed enum
//! - **Views**: aliasing column slices and reshaped references that fail
//!   with `StaleView` once their storage is released or resized
//! - **Explicit context**: devices, storage arena and configuration are
//!   owned by a [`Context`]; nothing is process-global
//! - **Multiple dtypes**: f64, f32, i64, i32
//!
//! ## Quick Start
//!
//! ```
//! use devmat::prelude::*;
//!
//! let ctx = Context::builder().with_emulated_devices(1).build()?;
//! let a = Matrix::<f64>::ones(&ctx, 2, 2, DeviceId::Host)?;
//! let mut b = Matrix::<f64>::eye(&ctx, 2, DeviceId::Device(0))?;
//!
//! b.add_inplace(&a)?;
//! assert_eq!(b.sum_of_elements()?, 6.0);
//! assert_eq!(a.location(), Location::Both);
//! # Ok::<(), devmat::Error>(())
//! ```
//!
//! ## Feature Flags
//!
//! - `rayon` (default): Multi-threaded host kernels

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod config;
pub mod context;
pub mod density;
pub mod dtype;
pub mod error;
pub mod io;
pub mod location;
pub mod matrix;
pub mod runtime;
pub mod storage;

pub use config::ContextConfig;
pub use context::{Context, ContextBuilder};
pub use error::{Error, Result};
pub use matrix::Matrix;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::config::ContextConfig;
    pub use crate::context::Context;
    pub use crate::dtype::{DType, Element};
    pub use crate::error::{Error, Result};
    pub use crate::location::{Location, TransferMode};
    pub use crate::matrix::{
        CscParts, DEFAULT_THRESHOLD, Matrix, MatrixOrder, USE_TIME_BASED_SEED,
    };
    pub use crate::runtime::{DeviceId, EmulatedDevice, Runtime};
    pub use crate::storage::{Density, MatrixFormat};
}
