//! CPU runtime implementation

use super::CpuKernels;
use crate::error::Result;
use crate::runtime::{DeviceId, Kernels, MemoryStats, Runtime, TrackingAllocator};

/// Host memory runtime
///
/// This is the runtime every context has. Memory is allocated on the heap
/// with 64-byte alignment and is directly addressable, so copies are plain
/// `memcpy`s and pointers handed out are real addresses.
#[derive(Debug)]
pub struct CpuRuntime {
    allocator: TrackingAllocator,
    kernels: CpuKernels,
}

impl CpuRuntime {
    /// Create a host runtime with fresh statistics
    pub fn new() -> Self {
        Self {
            allocator: TrackingAllocator::new(DeviceId::Host),
            kernels: CpuKernels,
        }
    }
}

impl Default for CpuRuntime {
    fn default() -> Self {
        Self::new()
    }
}

impl Runtime for CpuRuntime {
    fn name(&self) -> &str {
        "cpu"
    }

    fn device_id(&self) -> DeviceId {
        DeviceId::Host
    }

    fn allocate(&self, size_bytes: usize) -> Result<u64> {
        self.allocator.allocate(size_bytes)
    }

    fn deallocate(&self, ptr: u64, size_bytes: usize) {
        self.allocator.deallocate(ptr, size_bytes);
    }

    fn copy_to_device(&self, src: &[u8], dst: u64) -> Result<()> {
        if src.is_empty() || dst == 0 {
            return Ok(());
        }

        // SAFETY: dst addresses at least src.len() bytes of host memory
        unsafe {
            std::ptr::copy_nonoverlapping(src.as_ptr(), dst as *mut u8, src.len());
        }
        Ok(())
    }

    fn copy_from_device(&self, src: u64, dst: &mut [u8]) -> Result<()> {
        if dst.is_empty() || src == 0 {
            return Ok(());
        }

        // SAFETY: src addresses at least dst.len() bytes of host memory
        unsafe {
            std::ptr::copy_nonoverlapping(src as *const u8, dst.as_mut_ptr(), dst.len());
        }
        Ok(())
    }

    fn copy_within_device(&self, src: u64, dst: u64, size_bytes: usize) -> Result<()> {
        if size_bytes == 0 || src == 0 || dst == 0 {
            return Ok(());
        }

        unsafe {
            // Use copy (not copy_nonoverlapping) in case src and dst overlap
            std::ptr::copy(src as *const u8, dst as *mut u8, size_bytes);
        }
        Ok(())
    }

    fn synchronize(&self) {
        // Host work completes before each call returns
    }

    fn kernels(&self) -> &dyn Kernels {
        &self.kernels
    }

    fn memory_stats(&self) -> MemoryStats {
        self.allocator.stats()
    }
}
