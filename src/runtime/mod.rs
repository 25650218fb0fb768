//! Runtime backends for matrix storage
//!
//! A runtime owns one memory space: the host, or one accelerator device. The
//! matrix layer never touches memory directly; it allocates, copies and
//! launches kernels through the `Runtime` trait.
//!
//! # Architecture
//!
//! ```text
//! Runtime (one memory space)
//! ├── DeviceId (host, or device index)
//! ├── TrackingAllocator (aligned allocation with statistics)
//! ├── Kernels (compute collaborator, receives synchronized buffers)
//! └── MemoryStats (allocation and transfer counters)
//! ```

mod allocator;
pub mod cpu;
pub mod emulated;
pub mod kernel;

pub use allocator::{ALIGNMENT, TrackingAllocator};
pub use cpu::CpuRuntime;
pub use emulated::EmulatedDevice;
pub use kernel::{BinaryOp, DenseRef, Kernels, ReduceOp, SparseRef};

use crate::error::Result;
use std::fmt;

/// Identifies a memory space: the host, or an accelerator by index
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum DeviceId {
    /// Host memory (CPU)
    #[default]
    Host,
    /// Accelerator device with its index
    Device(usize),
}

impl DeviceId {
    /// Raw id used by integer-based device selection: -1 is the host
    pub const HOST_RAW: i32 = -1;

    /// Convert from a raw id (negative = host, otherwise device index)
    pub fn from_raw(id: i32) -> Self {
        if id < 0 {
            Self::Host
        } else {
            Self::Device(id as usize)
        }
    }

    /// Convert to a raw id (-1 = host)
    pub fn as_raw(self) -> i32 {
        match self {
            Self::Host => Self::HOST_RAW,
            Self::Device(idx) => idx as i32,
        }
    }

    /// Whether this is the host
    #[inline]
    pub fn is_host(self) -> bool {
        matches!(self, Self::Host)
    }

    /// Whether this is an accelerator device
    #[inline]
    pub fn is_device(self) -> bool {
        matches!(self, Self::Device(_))
    }

    /// Device index, if this is an accelerator
    #[inline]
    pub fn index(self) -> Option<usize> {
        match self {
            Self::Device(idx) => Some(idx),
            Self::Host => None,
        }
    }
}

impl fmt::Display for DeviceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Host => write!(f, "host"),
            Self::Device(idx) => write!(f, "device:{idx}"),
        }
    }
}

/// Allocation and transfer counters for one runtime
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub struct MemoryStats {
    /// Number of successful non-empty allocations
    pub allocations: usize,
    /// Number of deallocations
    pub deallocations: usize,
    /// Bytes currently allocated
    pub bytes_in_use: usize,
    /// High-water mark of `bytes_in_use`
    pub peak_bytes: usize,
    /// Bytes copied from the host into this runtime
    pub bytes_to_device: usize,
    /// Bytes copied from this runtime back to the host
    pub bytes_from_device: usize,
}

/// Core trait for memory backends
///
/// `Runtime` is object safe: a context holds its runtimes as
/// `Arc<dyn Runtime>` indexed by [`DeviceId`].
///
/// Pointers are opaque `u64` handles. For the host they are real addresses;
/// for a device they are only meaningful to that runtime.
pub trait Runtime: Send + Sync + fmt::Debug {
    /// Human-readable name of this runtime
    fn name(&self) -> &str;

    /// The memory space this runtime manages
    fn device_id(&self) -> DeviceId;

    /// Allocate zero-initialized memory
    ///
    /// Returns `Ok(0)` for zero-sized requests and `Err(OutOfMemory)` when the
    /// allocation fails.
    fn allocate(&self, size_bytes: usize) -> Result<u64>;

    /// Deallocate memory obtained from `allocate`
    fn deallocate(&self, ptr: u64, size_bytes: usize);

    /// Copy data from host to this runtime
    fn copy_to_device(&self, src: &[u8], dst: u64) -> Result<()>;

    /// Copy data from this runtime to host
    ///
    /// Waits for pending work on the runtime before reading.
    fn copy_from_device(&self, src: u64, dst: &mut [u8]) -> Result<()>;

    /// Copy data within this runtime
    fn copy_within_device(&self, src: u64, dst: u64, size_bytes: usize) -> Result<()>;

    /// Wait for all pending operations to complete
    fn synchronize(&self);

    /// Kernel collaborator that executes on this runtime's memory
    fn kernels(&self) -> &dyn Kernels;

    /// Allocation and transfer counters
    fn memory_stats(&self) -> MemoryStats;
}

/// Copy `size_bytes` between two runtimes
///
/// Host memory is addressed directly; device-to-device copies between
/// different devices are staged through a host buffer.
pub(crate) fn transfer(
    src_rt: &dyn Runtime,
    src: u64,
    dst_rt: &dyn Runtime,
    dst: u64,
    size_bytes: usize,
) -> Result<()> {
    if size_bytes == 0 {
        return Ok(());
    }

    let (src_id, dst_id) = (src_rt.device_id(), dst_rt.device_id());
    tracing::trace!(%src_id, %dst_id, size_bytes, "transfer");

    if src_id == dst_id {
        return dst_rt.copy_within_device(src, dst, size_bytes);
    }

    match (src_id.is_host(), dst_id.is_host()) {
        (true, _) => {
            // SAFETY: host pointers are real addresses of at least `size_bytes`
            let bytes = unsafe { std::slice::from_raw_parts(src as *const u8, size_bytes) };
            dst_rt.copy_to_device(bytes, dst)
        }
        (_, true) => {
            // SAFETY: as above, for the destination
            let bytes = unsafe { std::slice::from_raw_parts_mut(dst as *mut u8, size_bytes) };
            src_rt.copy_from_device(src, bytes)
        }
        (false, false) => {
            let mut staging = vec![0u8; size_bytes];
            src_rt.copy_from_device(src, &mut staging)?;
            dst_rt.copy_to_device(&staging, dst)
        }
    }
}
