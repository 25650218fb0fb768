//! Explicit device context
//!
//! A [`Context`] owns the runtimes a matrix may live on (the host plus any
//! registered devices), the backend arena, and the configuration. Nothing is
//! process-global: independent contexts never share state, so tests can run
//! in parallel and device selection is always explicit.

use crate::config::ContextConfig;
use crate::error::{Error, Result};
use crate::runtime::{CpuRuntime, DeviceId, EmulatedDevice, MemoryStats, Runtime};
use crate::storage::BackendArena;
use parking_lot::Mutex;
use std::fmt;
use std::sync::Arc;

struct ContextInner {
    config: ContextConfig,
    host: Arc<dyn Runtime>,
    devices: Vec<Arc<dyn Runtime>>,
    arena: Mutex<BackendArena>,
}

/// Shared handle to runtimes, storage arena and configuration
///
/// Cloning is cheap; all clones refer to the same context.
#[derive(Clone)]
pub struct Context {
    inner: Arc<ContextInner>,
}

/// Builder for [`Context`]
#[derive(Default)]
pub struct ContextBuilder {
    config: ContextConfig,
    devices: Vec<Arc<dyn Runtime>>,
}

impl ContextBuilder {
    /// Use `config` instead of the default configuration
    pub fn config(mut self, config: ContextConfig) -> Self {
        self.config = config;
        self
    }

    /// Register a device runtime
    ///
    /// Devices must be registered in index order: the n-th call registers
    /// `DeviceId::Device(n)`.
    pub fn with_device(mut self, runtime: Arc<dyn Runtime>) -> Self {
        self.devices.push(runtime);
        self
    }

    /// Register `count` unlimited emulated devices after the existing ones
    pub fn with_emulated_devices(mut self, count: usize) -> Self {
        for _ in 0..count {
            let index = self.devices.len();
            self.devices.push(Arc::new(EmulatedDevice::new(index)));
        }
        self
    }

    /// Create the context
    pub fn build(self) -> Result<Context> {
        for (index, device) in self.devices.iter().enumerate() {
            if device.device_id() != DeviceId::Device(index) {
                return Err(Error::invalid_argument(
                    "devices",
                    format!(
                        "runtime '{}' reports {} but was registered as device:{index}",
                        device.name(),
                        device.device_id()
                    ),
                ));
            }
        }

        tracing::debug!(devices = self.devices.len(), "context created");
        Ok(Context {
            inner: Arc::new(ContextInner {
                config: self.config,
                host: Arc::new(CpuRuntime::new()),
                devices: self.devices,
                arena: Mutex::new(BackendArena::new()),
            }),
        })
    }
}

impl Context {
    /// Start building a context
    pub fn builder() -> ContextBuilder {
        ContextBuilder::default()
    }

    /// Context with the host runtime only and default configuration
    pub fn host_only() -> Self {
        Self {
            inner: Arc::new(ContextInner {
                config: ContextConfig::default(),
                host: Arc::new(CpuRuntime::new()),
                devices: Vec::new(),
                arena: Mutex::new(BackendArena::new()),
            }),
        }
    }

    /// Configuration in effect
    #[inline]
    pub fn config(&self) -> &ContextConfig {
        &self.inner.config
    }

    /// Host runtime
    #[inline]
    pub fn host(&self) -> &Arc<dyn Runtime> {
        &self.inner.host
    }

    /// Runtime for `device`
    ///
    /// Fails with `DeviceUnavailable` for ids that were never registered.
    pub fn runtime(&self, device: DeviceId) -> Result<&Arc<dyn Runtime>> {
        match device {
            DeviceId::Host => Ok(&self.inner.host),
            DeviceId::Device(idx) => self
                .inner
                .devices
                .get(idx)
                .ok_or(Error::DeviceUnavailable { device }),
        }
    }

    /// Number of registered devices
    #[inline]
    pub fn device_count(&self) -> usize {
        self.inner.devices.len()
    }

    /// Whether `device` can be used
    pub fn is_available(&self, device: DeviceId) -> bool {
        self.runtime(device).is_ok()
    }

    /// Wait for queued work on every runtime
    pub fn synchronize(&self) {
        self.inner.host.synchronize();
        for device in &self.inner.devices {
            device.synchronize();
        }
    }

    /// Allocation and transfer counters of one runtime
    pub fn memory_stats(&self, device: DeviceId) -> Result<MemoryStats> {
        Ok(self.runtime(device)?.memory_stats())
    }

    /// Number of backends currently alive in the arena
    pub fn live_backends(&self) -> usize {
        self.inner.arena.lock().len()
    }

    /// Whether two handles share a context
    pub fn same_as(&self, other: &Context) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }

    /// Run `f` with the arena locked
    ///
    /// `f` must not re-enter the arena (for example by dropping a matrix).
    pub(crate) fn with_arena<R>(&self, f: impl FnOnce(&mut BackendArena) -> R) -> R {
        f(&mut self.inner.arena.lock())
    }

    /// Check dimensions against the configured limits
    pub(crate) fn validate_shape(&self, rows: usize, cols: usize, allow_empty: bool) -> Result<()> {
        let max = self.inner.config.max_dimension;
        if !allow_empty && (rows == 0 || cols == 0) {
            return Err(Error::invalid_shape(rows, cols, "dimensions must be positive"));
        }
        if rows > max || cols > max {
            return Err(Error::invalid_shape(rows, cols, "dimension exceeds configured limit"));
        }
        if rows.checked_mul(cols).is_none() {
            return Err(Error::invalid_shape(rows, cols, "element count overflows"));
        }
        Ok(())
    }
}

impl Default for Context {
    fn default() -> Self {
        Self::host_only()
    }
}

impl fmt::Debug for Context {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Context")
            .field("config", &self.inner.config)
            .field("devices", &self.inner.devices.len())
            .field("live_backends", &self.live_backends())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unregistered_device() {
        let ctx = Context::builder().with_emulated_devices(1).build().unwrap();
        assert!(ctx.runtime(DeviceId::Device(0)).is_ok());
        assert!(matches!(
            ctx.runtime(DeviceId::Device(1)),
            Err(Error::DeviceUnavailable {
                device: DeviceId::Device(1)
            })
        ));
        assert!(ctx.is_available(DeviceId::Host));
    }

    #[test]
    fn test_out_of_order_registration() {
        let result = Context::builder()
            .with_device(Arc::new(EmulatedDevice::new(1)))
            .build();
        assert!(matches!(result, Err(Error::InvalidArgument { .. })));
    }

    #[test]
    fn test_validate_shape() {
        let ctx = Context::builder()
            .config(ContextConfig::default().with_max_dimension(10))
            .build()
            .unwrap();
        assert!(ctx.validate_shape(10, 10, false).is_ok());
        assert!(ctx.validate_shape(0, 3, true).is_ok());
        assert!(matches!(
            ctx.validate_shape(0, 3, false),
            Err(Error::InvalidShape { .. })
        ));
        assert!(matches!(
            ctx.validate_shape(11, 1, false),
            Err(Error::InvalidShape { .. })
        ));
    }

    #[test]
    fn test_clones_share_state() {
        let ctx = Context::host_only();
        let other = ctx.clone();
        assert!(ctx.same_as(&other));
        assert!(!ctx.same_as(&Context::host_only()));
    }
}
