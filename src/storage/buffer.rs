//! Buffer: one allocation inside a runtime's memory space

use crate::dtype::{DType, Element};
use crate::error::{Error, Result};
use crate::runtime::{DeviceId, Runtime, transfer};
use std::fmt;
use std::sync::Arc;

/// Typed allocation on one runtime
///
/// A buffer either owns its memory (allocated through the runtime and freed
/// on drop) or wraps caller memory that it never frees.
pub struct Buffer {
    /// Raw pointer (device address or host pointer cast to u64)
    ptr: u64,
    /// Number of elements (not bytes)
    len: usize,
    dtype: DType,
    runtime: Arc<dyn Runtime>,
    /// If true, we own this memory and should deallocate on drop
    owned: bool,
}

impl Buffer {
    /// Allocate `len` zeroed elements of `dtype`
    pub fn new(runtime: &Arc<dyn Runtime>, len: usize, dtype: DType) -> Result<Self> {
        let ptr = runtime.allocate(len * dtype.size_in_bytes())?;
        Ok(Self {
            ptr,
            len,
            dtype,
            runtime: Arc::clone(runtime),
            owned: true,
        })
    }

    /// Allocate and upload `data`
    pub fn from_slice<T: Element>(runtime: &Arc<dyn Runtime>, data: &[T]) -> Result<Self> {
        let buffer = Self::new(runtime, data.len(), T::DTYPE)?;
        runtime.copy_to_device(bytemuck::cast_slice(data), buffer.ptr)?;
        Ok(buffer)
    }

    /// Wrap existing memory without taking ownership
    ///
    /// # Safety
    /// - `ptr` must address `len` elements of `dtype` in `runtime`'s memory
    /// - The memory must remain valid for the lifetime of this buffer
    /// - Caller is responsible for eventual deallocation
    pub unsafe fn from_ptr(runtime: &Arc<dyn Runtime>, ptr: u64, len: usize, dtype: DType) -> Self {
        // SAFETY: forwarded to the caller
        unsafe { Self::from_raw(runtime, ptr, len, dtype, false) }
    }

    /// Wrap existing memory, optionally taking ownership
    ///
    /// # Safety
    /// Same as [`from_ptr`](Self::from_ptr). With `owned` set, the memory must
    /// have been obtained from `runtime.allocate` with exactly
    /// `len * dtype.size_in_bytes()` bytes; it is released on drop.
    pub unsafe fn from_raw(
        runtime: &Arc<dyn Runtime>,
        ptr: u64,
        len: usize,
        dtype: DType,
        owned: bool,
    ) -> Self {
        Self {
            ptr,
            len,
            dtype,
            runtime: Arc::clone(runtime),
            owned,
        }
    }

    /// Raw pointer
    #[inline]
    pub fn ptr(&self) -> u64 {
        self.ptr
    }

    /// Number of elements
    #[inline]
    pub fn len(&self) -> usize {
        self.len
    }

    /// Whether the buffer holds no elements
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Element type
    #[inline]
    pub fn dtype(&self) -> DType {
        self.dtype
    }

    /// Size in bytes
    #[inline]
    pub fn size_in_bytes(&self) -> usize {
        self.len * self.dtype.size_in_bytes()
    }

    /// Whether the buffer frees its memory on drop
    #[inline]
    pub fn is_owned(&self) -> bool {
        self.owned
    }

    /// Runtime holding the memory
    #[inline]
    pub fn runtime(&self) -> &Arc<dyn Runtime> {
        &self.runtime
    }

    /// Memory space of the buffer
    #[inline]
    pub fn device(&self) -> DeviceId {
        self.runtime.device_id()
    }

    fn check_range<T: Element>(&self, offset: usize, len: usize) -> Result<()> {
        if T::DTYPE != self.dtype {
            return Err(Error::DTypeMismatch {
                lhs: T::DTYPE,
                rhs: self.dtype,
            });
        }
        if offset + len > self.len {
            return Err(Error::IndexOutOfBounds {
                index: offset + len,
                size: self.len,
            });
        }
        Ok(())
    }

    fn addr(&self, offset: usize) -> u64 {
        self.ptr + (offset * self.dtype.size_in_bytes()) as u64
    }

    /// Copy `len` elements starting at `offset` to the host
    pub fn read<T: Element>(&self, offset: usize, len: usize) -> Result<Vec<T>> {
        self.check_range::<T>(offset, len)?;
        // Allocate with T's alignment, then view as bytes for the copy
        let mut result = vec![T::zeroed(); len];
        if len > 0 {
            let bytes: &mut [u8] = bytemuck::cast_slice_mut(&mut result);
            self.runtime.copy_from_device(self.addr(offset), bytes)?;
        }
        Ok(result)
    }

    /// Upload `data` starting at element `offset`
    pub fn write<T: Element>(&self, offset: usize, data: &[T]) -> Result<()> {
        self.check_range::<T>(offset, data.len())?;
        if data.is_empty() {
            return Ok(());
        }
        self.runtime
            .copy_to_device(bytemuck::cast_slice(data), self.addr(offset))
    }

    /// Copy `len` elements from `src[src_offset..]` into `self[dst_offset..]`
    ///
    /// The buffers may live on different runtimes.
    pub fn copy_from(
        &self,
        dst_offset: usize,
        src: &Buffer,
        src_offset: usize,
        len: usize,
    ) -> Result<()> {
        if src.dtype != self.dtype {
            return Err(Error::DTypeMismatch {
                lhs: self.dtype,
                rhs: src.dtype,
            });
        }
        for (buf, off) in [(src, src_offset), (self, dst_offset)] {
            if off + len > buf.len {
                return Err(Error::IndexOutOfBounds {
                    index: off + len,
                    size: buf.len,
                });
            }
        }
        transfer(
            src.runtime.as_ref(),
            src.addr(src_offset),
            self.runtime.as_ref(),
            self.addr(dst_offset),
            len * self.dtype.size_in_bytes(),
        )
    }
}

impl fmt::Debug for Buffer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Buffer")
            .field("ptr", &format_args!("{:#x}", self.ptr))
            .field("len", &self.len)
            .field("dtype", &self.dtype)
            .field("device", &self.device())
            .field("owned", &self.owned)
            .finish()
    }
}

impl Drop for Buffer {
    fn drop(&mut self) {
        if self.owned && self.ptr != 0 {
            self.runtime.deallocate(self.ptr, self.size_in_bytes());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runtime::{CpuRuntime, EmulatedDevice};

    fn host() -> Arc<dyn Runtime> {
        Arc::new(CpuRuntime::new())
    }

    #[test]
    fn test_read_write() {
        let rt = host();
        let buf = Buffer::from_slice(&rt, &[1.0f64, 2.0, 3.0]).unwrap();
        buf.write(1, &[9.0f64]).unwrap();
        assert_eq!(buf.read::<f64>(0, 3).unwrap(), vec![1.0, 9.0, 3.0]);
        assert!(matches!(
            buf.read::<f32>(0, 1),
            Err(Error::DTypeMismatch { .. })
        ));
        assert!(matches!(
            buf.read::<f64>(2, 2),
            Err(Error::IndexOutOfBounds { .. })
        ));
    }

    #[test]
    fn test_cross_runtime_copy() {
        let rt = host();
        let dev: Arc<dyn Runtime> = Arc::new(EmulatedDevice::new(0));
        let src = Buffer::from_slice(&rt, &[1i32, 2, 3, 4]).unwrap();
        let dst = Buffer::new(&dev, 4, DType::I32).unwrap();
        dst.copy_from(1, &src, 0, 3).unwrap();
        assert_eq!(dst.read::<i32>(0, 4).unwrap(), vec![0, 1, 2, 3]);
    }

    #[test]
    fn test_borrowed_buffer_not_freed() {
        let rt = host();
        let mut data = vec![5.0f32; 4];
        {
            let buf = unsafe { Buffer::from_ptr(&rt, data.as_mut_ptr() as u64, 4, DType::F32) };
            assert!(!buf.is_owned());
            buf.write(0, &[1.0f32]).unwrap();
        }
        assert_eq!(rt.memory_stats().deallocations, 0);
        assert_eq!(data, vec![1.0, 5.0, 5.0, 5.0]);
    }

    #[test]
    fn test_owned_buffer_freed() {
        let rt = host();
        drop(Buffer::new(&rt, 16, DType::F64).unwrap());
        let stats = rt.memory_stats();
        assert_eq!(stats.allocations, 1);
        assert_eq!(stats.deallocations, 1);
    }
}
