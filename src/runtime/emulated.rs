//! Emulated accelerator device
//!
//! `EmulatedDevice` stands in for a discrete GPU: it has its own memory
//! accounting, an optional capacity, and a work queue that only drains on
//! `synchronize` or when results are read back. Memory physically lives in
//! host RAM, so the host kernels execute on it unchanged.

use super::cpu::CpuKernels;
use super::{
    BinaryOp, DenseRef, DeviceId, Kernels, MemoryStats, ReduceOp, Runtime, SparseRef,
    TrackingAllocator,
};
use crate::error::Result;
use std::sync::atomic::{AtomicUsize, Ordering};

/// A simulated device with asynchronous-queue semantics
#[derive(Debug)]
pub struct EmulatedDevice {
    index: usize,
    name: String,
    allocator: TrackingAllocator,
    kernels: CpuKernels,
    pending: AtomicUsize,
    synchronizations: AtomicUsize,
}

impl EmulatedDevice {
    /// Device with unlimited memory
    pub fn new(index: usize) -> Self {
        Self::with_allocator(index, TrackingAllocator::new(DeviceId::Device(index)))
    }

    /// Device that fails allocations beyond `capacity_bytes` in use
    pub fn with_capacity(index: usize, capacity_bytes: usize) -> Self {
        Self::with_allocator(
            index,
            TrackingAllocator::with_capacity(DeviceId::Device(index), capacity_bytes),
        )
    }

    fn with_allocator(index: usize, allocator: TrackingAllocator) -> Self {
        Self {
            index,
            name: format!("emulated:{index}"),
            allocator,
            kernels: CpuKernels,
            pending: AtomicUsize::new(0),
            synchronizations: AtomicUsize::new(0),
        }
    }

    /// Operations queued since the last synchronization
    pub fn pending_operations(&self) -> usize {
        self.pending.load(Ordering::Acquire)
    }

    /// Number of times the queue was drained with work pending
    pub fn synchronizations(&self) -> usize {
        self.synchronizations.load(Ordering::Acquire)
    }

    fn enqueue(&self) {
        self.pending.fetch_add(1, Ordering::AcqRel);
    }
}

impl Runtime for EmulatedDevice {
    fn name(&self) -> &str {
        &self.name
    }

    fn device_id(&self) -> DeviceId {
        DeviceId::Device(self.index)
    }

    fn allocate(&self, size_bytes: usize) -> Result<u64> {
        self.allocator.allocate(size_bytes)
    }

    fn deallocate(&self, ptr: u64, size_bytes: usize) {
        // Freed memory may still be referenced by queued work
        self.synchronize();
        self.allocator.deallocate(ptr, size_bytes);
    }

    fn copy_to_device(&self, src: &[u8], dst: u64) -> Result<()> {
        if src.is_empty() || dst == 0 {
            return Ok(());
        }
        // SAFETY: dst was allocated by this device with at least src.len() bytes
        unsafe {
            std::ptr::copy_nonoverlapping(src.as_ptr(), dst as *mut u8, src.len());
        }
        self.allocator.record_upload(src.len());
        self.enqueue();
        Ok(())
    }

    fn copy_from_device(&self, src: u64, dst: &mut [u8]) -> Result<()> {
        if dst.is_empty() || src == 0 {
            return Ok(());
        }
        self.synchronize();
        // SAFETY: src was allocated by this device with at least dst.len() bytes
        unsafe {
            std::ptr::copy_nonoverlapping(src as *const u8, dst.as_mut_ptr(), dst.len());
        }
        self.allocator.record_download(dst.len());
        Ok(())
    }

    fn copy_within_device(&self, src: u64, dst: u64, size_bytes: usize) -> Result<()> {
        if size_bytes == 0 || src == 0 || dst == 0 {
            return Ok(());
        }
        // SAFETY: both ranges belong to this device
        unsafe {
            std::ptr::copy(src as *const u8, dst as *mut u8, size_bytes);
        }
        self.enqueue();
        Ok(())
    }

    fn synchronize(&self) {
        if self.pending.swap(0, Ordering::AcqRel) > 0 {
            self.synchronizations.fetch_add(1, Ordering::AcqRel);
            tracing::trace!(device = self.index, "queue drained");
        }
    }

    fn kernels(&self) -> &dyn Kernels {
        self
    }

    fn memory_stats(&self) -> MemoryStats {
        self.allocator.stats()
    }
}

/// Mutating kernels are queued; kernels that return a value to the host
/// drain the queue first.
impl Kernels for EmulatedDevice {
    fn fill(&self, dst: &DenseRef, value: f64) -> Result<()> {
        self.kernels.fill(dst, value)?;
        self.enqueue();
        Ok(())
    }

    fn copy(&self, src: &DenseRef, dst: &DenseRef) -> Result<()> {
        self.kernels.copy(src, dst)?;
        self.enqueue();
        Ok(())
    }

    fn scale(&self, src: &DenseRef, alpha: f64, dst: &DenseRef) -> Result<()> {
        self.kernels.scale(src, alpha, dst)?;
        self.enqueue();
        Ok(())
    }

    fn add_scalar(&self, src: &DenseRef, alpha: f64, dst: &DenseRef) -> Result<()> {
        self.kernels.add_scalar(src, alpha, dst)?;
        self.enqueue();
        Ok(())
    }

    fn axpby(
        &self,
        alpha: f64,
        a: &DenseRef,
        beta: f64,
        b: &DenseRef,
        dst: &DenseRef,
    ) -> Result<()> {
        self.kernels.axpby(alpha, a, beta, b, dst)?;
        self.enqueue();
        Ok(())
    }

    fn binary(&self, op: BinaryOp, a: &DenseRef, b: &DenseRef, dst: &DenseRef) -> Result<()> {
        self.kernels.binary(op, a, b, dst)?;
        self.enqueue();
        Ok(())
    }

    fn power(&self, src: &DenseRef, exponent: f64, dst: &DenseRef) -> Result<()> {
        self.kernels.power(src, exponent, dst)?;
        self.enqueue();
        Ok(())
    }

    fn gemm(
        &self,
        a: &DenseRef,
        trans_a: bool,
        b: &DenseRef,
        trans_b: bool,
        dst: &DenseRef,
    ) -> Result<()> {
        self.kernels.gemm(a, trans_a, b, trans_b, dst)?;
        self.enqueue();
        Ok(())
    }

    fn transpose(&self, src: &DenseRef, dst: &DenseRef) -> Result<()> {
        self.kernels.transpose(src, dst)?;
        self.enqueue();
        Ok(())
    }

    fn reduce(&self, op: ReduceOp, src: &DenseRef) -> Result<f64> {
        self.synchronize();
        self.kernels.reduce(op, src)
    }

    fn max_abs_diff(&self, a: &DenseRef, b: &DenseRef) -> Result<f64> {
        self.synchronize();
        self.kernels.max_abs_diff(a, b)
    }

    fn count_nonzero(&self, src: &DenseRef) -> Result<usize> {
        self.synchronize();
        self.kernels.count_nonzero(src)
    }

    fn dense_to_sparse(&self, src: &DenseRef, dst: &SparseRef) -> Result<usize> {
        self.synchronize();
        self.kernels.dense_to_sparse(src, dst)
    }

    fn sparse_to_dense(&self, src: &SparseRef, dst: &DenseRef) -> Result<()> {
        self.kernels.sparse_to_dense(src, dst)?;
        self.enqueue();
        Ok(())
    }

    fn scale_sparse(&self, src: &SparseRef, alpha: f64, dst: &SparseRef) -> Result<()> {
        self.kernels.scale_sparse(src, alpha, dst)?;
        self.enqueue();
        Ok(())
    }

    fn reduce_sparse(&self, op: ReduceOp, src: &SparseRef) -> Result<f64> {
        self.synchronize();
        self.kernels.reduce_sparse(op, src)
    }
}
