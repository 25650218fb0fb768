//! Common test utilities
#![allow(dead_code)]

use devmat::runtime::{DeviceId, EmulatedDevice};
use devmat::{Context, ContextConfig, Matrix};
use std::sync::Arc;

/// Index of the first emulated device
pub const DEV0: DeviceId = DeviceId::Device(0);
/// Index of the second emulated device
pub const DEV1: DeviceId = DeviceId::Device(1);

/// Install a test-writer subscriber once; honours `RUST_LOG`
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

/// Context with only the host runtime
pub fn create_host_ctx() -> Context {
    Context::host_only()
}

/// Context with `devices` unlimited emulated devices
pub fn create_device_ctx(devices: usize) -> Context {
    create_device_ctx_with(devices, ContextConfig::default())
}

/// Context with emulated devices and a custom configuration
pub fn create_device_ctx_with(devices: usize, config: ContextConfig) -> Context {
    Context::builder()
        .config(config)
        .with_emulated_devices(devices)
        .build()
        .expect("emulated devices register in order")
}

/// Context whose only device holds at most `capacity_bytes`
pub fn create_small_device_ctx(capacity_bytes: usize) -> Context {
    Context::builder()
        .with_device(Arc::new(EmulatedDevice::with_capacity(0, capacity_bytes)))
        .build()
        .expect("single device registers as device:0")
}

/// 1.0, 2.0, ... in column-major order
pub fn iota(n: usize) -> Vec<f64> {
    (1..=n).map(|v| v as f64).collect()
}

/// Dense rows × cols matrix at `device` holding `iota(rows * cols)`
pub fn iota_matrix(ctx: &Context, rows: usize, cols: usize, device: DeviceId) -> Matrix<f64> {
    Matrix::from_host(ctx, rows, cols, device, &iota(rows * cols)).expect("valid shape")
}

/// Assert two f64 slices are close within tolerance
///
/// Uses the formula: |a - b| <= atol + rtol * |b|
pub fn assert_allclose_f64(a: &[f64], b: &[f64], rtol: f64, atol: f64, msg: &str) {
    assert_eq!(a.len(), b.len(), "{}: length mismatch", msg);
    for (i, (x, y)) in a.iter().zip(b.iter()).enumerate() {
        let diff = (x - y).abs();
        let tol = atol + rtol * y.abs();
        assert!(
            diff <= tol,
            "{}: element {} differs: {} vs {} (diff={}, tol={})",
            msg,
            i,
            x,
            y,
            diff,
            tol
        );
    }
}

/// Assert two f32 slices are close within tolerance
pub fn assert_allclose_f32(a: &[f32], b: &[f32], rtol: f32, atol: f32, msg: &str) {
    assert_eq!(a.len(), b.len(), "{}: length mismatch", msg);
    for (i, (x, y)) in a.iter().zip(b.iter()).enumerate() {
        let diff = (x - y).abs();
        let tol = atol + rtol * y.abs();
        assert!(
            diff <= tol,
            "{}: element {} differs: {} vs {} (diff={}, tol={})",
            msg,
            i,
            x,
            y,
            diff,
            tol
        );
    }
}
