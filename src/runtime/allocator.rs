//! Aligned heap allocation with usage statistics
//!
//! Both the host runtime and the emulated device allocate through a
//! `TrackingAllocator`; they differ only in how the memory is reached.

use super::{DeviceId, MemoryStats};
use crate::error::{Error, Result};
use std::alloc::{Layout as AllocLayout, alloc_zeroed, dealloc};
use std::sync::atomic::{AtomicUsize, Ordering};

/// Alignment of every allocation (AVX-512 width)
pub const ALIGNMENT: usize = 64;

/// Zero-initializing allocator that counts allocations and transfers
#[derive(Debug)]
pub struct TrackingAllocator {
    device: DeviceId,
    capacity: Option<usize>,
    allocations: AtomicUsize,
    deallocations: AtomicUsize,
    bytes_in_use: AtomicUsize,
    peak_bytes: AtomicUsize,
    bytes_to_device: AtomicUsize,
    bytes_from_device: AtomicUsize,
}

impl TrackingAllocator {
    /// Unlimited allocator for `device`
    pub fn new(device: DeviceId) -> Self {
        Self {
            device,
            capacity: None,
            allocations: AtomicUsize::new(0),
            deallocations: AtomicUsize::new(0),
            bytes_in_use: AtomicUsize::new(0),
            peak_bytes: AtomicUsize::new(0),
            bytes_to_device: AtomicUsize::new(0),
            bytes_from_device: AtomicUsize::new(0),
        }
    }

    /// Allocator that refuses to hold more than `capacity` bytes at once
    pub fn with_capacity(device: DeviceId, capacity: usize) -> Self {
        Self {
            capacity: Some(capacity),
            ..Self::new(device)
        }
    }

    /// Capacity limit, if any
    pub fn capacity(&self) -> Option<usize> {
        self.capacity
    }

    /// Allocate `size_bytes` of zeroed memory, returning its address
    ///
    /// Zero-sized requests return 0 without touching the system allocator.
    pub fn allocate(&self, size_bytes: usize) -> Result<u64> {
        if size_bytes == 0 {
            return Ok(0);
        }

        let oom = || Error::OutOfMemory {
            size: size_bytes,
            device: self.device,
        };

        // Reserve against the capacity before touching the heap
        let in_use = self.bytes_in_use.fetch_add(size_bytes, Ordering::AcqRel) + size_bytes;
        if let Some(cap) = self.capacity
            && in_use > cap
        {
            self.bytes_in_use.fetch_sub(size_bytes, Ordering::AcqRel);
            tracing::warn!(device = %self.device, size_bytes, capacity = cap, "allocation exceeds capacity");
            return Err(oom());
        }

        let layout = match AllocLayout::from_size_align(size_bytes, ALIGNMENT) {
            Ok(layout) => layout,
            Err(_) => {
                self.bytes_in_use.fetch_sub(size_bytes, Ordering::AcqRel);
                return Err(oom());
            }
        };

        // SAFETY: layout has non-zero size
        let ptr = unsafe { alloc_zeroed(layout) };
        if ptr.is_null() {
            self.bytes_in_use.fetch_sub(size_bytes, Ordering::AcqRel);
            return Err(oom());
        }

        self.allocations.fetch_add(1, Ordering::Relaxed);
        self.peak_bytes.fetch_max(in_use, Ordering::Relaxed);
        tracing::trace!(device = %self.device, size_bytes, "allocate");
        Ok(ptr as u64)
    }

    /// Release memory obtained from [`allocate`](Self::allocate)
    pub fn deallocate(&self, ptr: u64, size_bytes: usize) {
        if ptr == 0 || size_bytes == 0 {
            return;
        }

        let Ok(layout) = AllocLayout::from_size_align(size_bytes, ALIGNMENT) else {
            return;
        };

        // SAFETY: ptr was returned by `allocate` with the same size
        unsafe {
            dealloc(ptr as *mut u8, layout);
        }

        self.deallocations.fetch_add(1, Ordering::Relaxed);
        self.bytes_in_use.fetch_sub(size_bytes, Ordering::AcqRel);
        tracing::trace!(device = %self.device, size_bytes, "deallocate");
    }

    /// Count bytes copied in from the host
    pub fn record_upload(&self, bytes: usize) {
        self.bytes_to_device.fetch_add(bytes, Ordering::Relaxed);
    }

    /// Count bytes copied out to the host
    pub fn record_download(&self, bytes: usize) {
        self.bytes_from_device.fetch_add(bytes, Ordering::Relaxed);
    }

    /// Snapshot of the counters
    pub fn stats(&self) -> MemoryStats {
        MemoryStats {
            allocations: self.allocations.load(Ordering::Relaxed),
            deallocations: self.deallocations.load(Ordering::Relaxed),
            bytes_in_use: self.bytes_in_use.load(Ordering::Relaxed),
            peak_bytes: self.peak_bytes.load(Ordering::Relaxed),
            bytes_to_device: self.bytes_to_device.load(Ordering::Relaxed),
            bytes_from_device: self.bytes_from_device.load(Ordering::Relaxed),
        }
    }
}
