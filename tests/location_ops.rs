//! Residency: lazy transfers, Both, tie-breaks and device errors

mod common;

use common::{
    DEV0, DEV1, create_device_ctx, create_device_ctx_with, create_host_ctx, iota, iota_matrix,
};
use devmat::location::{Location, TransferMode};
use devmat::runtime::DeviceId;
use devmat::{ContextConfig, Error, Matrix};

#[test]
fn test_ensure_location_is_idempotent() {
    let ctx = create_device_ctx(1);
    let m = iota_matrix(&ctx, 8, 8, DeviceId::Host);

    m.ensure_location(DEV0, TransferMode::MOVE).unwrap();
    let after_first = ctx.memory_stats(DEV0).unwrap();
    assert_eq!(after_first.bytes_to_device, 8 * 8 * 8);
    assert_eq!(m.location(), Location::Device);
    assert_eq!(m.location_changes(), 1);

    m.ensure_location(DEV0, TransferMode::MOVE).unwrap();
    m.ensure_location(DEV0, TransferMode::KEEP).unwrap();
    assert_eq!(ctx.memory_stats(DEV0).unwrap(), after_first);
    assert_eq!(m.location_changes(), 1);
    assert_eq!(m.copy_to_array().unwrap(), iota(64));
}

#[test]
fn test_keep_source_enters_both_and_write_collapses() {
    let ctx = create_device_ctx(1);
    let mut m = iota_matrix(&ctx, 2, 3, DeviceId::Host);

    m.ensure_location(DEV0, TransferMode::KEEP).unwrap();
    assert_eq!(m.location(), Location::Both);
    assert_eq!(ctx.live_backends(), 2);

    // Reading from either side costs nothing more
    let uploads = ctx.memory_stats(DEV0).unwrap().bytes_to_device;
    m.ensure_location(DeviceId::Host, TransferMode::MOVE).unwrap();
    assert_eq!(ctx.memory_stats(DEV0).unwrap().bytes_to_device, uploads);

    // The matrix prefers the host it was created on, so the write lands there
    m.scale_inplace(2.0).unwrap();
    assert_eq!(m.location(), Location::Host);
    assert_eq!(ctx.live_backends(), 1);
    assert_eq!(m.get_value(1, 2).unwrap(), 12.0);
}

#[test]
fn test_tie_break_prefers_device_without_preference() {
    let ctx = create_device_ctx(1);
    let m = iota_matrix(&ctx, 2, 2, DeviceId::Host);
    m.ensure_location(DEV0, TransferMode::KEEP).unwrap();
    m.set_preferred_device(None);

    m.collapse_location().unwrap();
    assert_eq!(m.location(), Location::Device);
    assert_eq!(m.device_id(), DEV0);
}

#[test]
fn test_keep_after_alias_write_is_idempotent() {
    let ctx = create_device_ctx(1);
    let m = iota_matrix(&ctx, 2, 2, DeviceId::Host);
    let mut first_col = m.column_slice(0, 1).unwrap();
    first_col.scale_inplace(2.0).unwrap();

    m.ensure_location(DEV0, TransferMode::KEEP).unwrap();
    assert_eq!(m.location(), Location::Both);
    assert_eq!(m.location_changes(), 1);
    let uploads = ctx.memory_stats(DEV0).unwrap().bytes_to_device;

    m.ensure_location(DEV0, TransferMode::KEEP).unwrap();
    m.ensure_location(DeviceId::Host, TransferMode::KEEP).unwrap();
    assert_eq!(m.location(), Location::Both);
    assert_eq!(m.location_changes(), 1);
    assert_eq!(ctx.memory_stats(DEV0).unwrap().bytes_to_device, uploads);
    assert_eq!(ctx.live_backends(), 2);
    assert_eq!(m.copy_to_array().unwrap(), vec![2.0, 4.0, 3.0, 4.0]);
}

#[test]
fn test_preferred_device_set_through_shared_reference() {
    let ctx = create_device_ctx(1);
    let m = iota_matrix(&ctx, 2, 2, DeviceId::Host);
    let shared = &m;
    shared.set_preferred_device(Some(DEV0));
    assert_eq!(m.preferred_device(), Some(DEV0));
    assert_eq!(m.location(), Location::Host);
}

#[test]
fn test_transfer_to_device_leaves_both() {
    let ctx = create_device_ctx(1);
    let mut m = iota_matrix(&ctx, 2, 2, DeviceId::Host);
    m.ensure_location(DEV0, TransferMode::KEEP).unwrap();

    m.transfer_to_device(DeviceId::Host, TransferMode::MOVE).unwrap();
    assert_eq!(m.location(), Location::Host);
    assert_eq!(m.preferred_device(), Some(DeviceId::Host));
    assert_eq!(m.copy_to_array().unwrap(), iota(4));
}

#[test]
fn test_device_to_device_transfer() {
    let ctx = create_device_ctx(2);
    let m = iota_matrix(&ctx, 3, 3, DEV0);
    m.ensure_location(DEV1, TransferMode::KEEP).unwrap();
    assert_eq!(m.location(), Location::Device);
    assert_eq!(m.device_id(), DEV1);
    assert_eq!(ctx.live_backends(), 1);
    assert_eq!(m.copy_to_array().unwrap(), iota(9));
}

#[test]
fn test_first_write_materializes_at_preferred_device() {
    let ctx = create_device_ctx(1);
    let mut m = Matrix::<f32>::new(&ctx, Some(DEV0));
    assert_eq!(m.location(), Location::None);
    m.resize(4, 2, 0, true).unwrap();
    m.set_value_scalar(1.5).unwrap();
    assert_eq!(m.location(), Location::Device);
    assert_eq!(m.location_changes(), 0);
    assert_eq!(m.sum_of_elements().unwrap(), 12.0);
}

#[test]
fn test_operands_are_co_located_at_output() {
    let ctx = create_device_ctx(1);
    let a = iota_matrix(&ctx, 2, 2, DeviceId::Host);
    let b = iota_matrix(&ctx, 2, 2, DeviceId::Host);
    let mut out = Matrix::<f64>::new(&ctx, Some(DEV0));

    out.assign_sum_of(&a, &b).unwrap();
    assert_eq!(out.device_id(), DEV0);
    assert_eq!(a.location(), Location::Both);
    assert_eq!(b.location(), Location::Both);
    assert_eq!(out.copy_to_array().unwrap(), vec![2.0, 4.0, 6.0, 8.0]);
}

#[test]
fn test_empty_transfer_poisons_target() {
    let ctx = create_device_ctx_with(1, ContextConfig::default().with_poison_empty_transfers(true));
    let m = iota_matrix(&ctx, 2, 2, DeviceId::Host);
    m.ensure_location(DEV0, TransferMode::Empty).unwrap();
    assert_eq!(m.location(), Location::Device);
    assert_eq!(ctx.memory_stats(DEV0).unwrap().bytes_to_device, 0);
    assert!(!m.is_valid().unwrap());
    assert_eq!(m.count_nan_inf().unwrap(), 4);
}

#[test]
fn test_empty_transfer_without_poisoning_is_zeroed() {
    let ctx = create_device_ctx_with(1, ContextConfig::default().with_poison_empty_transfers(false));
    let m = iota_matrix(&ctx, 2, 2, DeviceId::Host);
    m.ensure_location(DEV0, TransferMode::Empty).unwrap();
    assert!(m.is_valid().unwrap());
    assert_eq!(m.sum_of_abs_elements().unwrap(), 0.0);
}

#[test]
fn test_unregistered_device_is_unavailable() {
    let ctx = create_host_ctx();
    assert!(matches!(
        Matrix::<f32>::zeros(&ctx, 2, 2, DEV0),
        Err(Error::DeviceUnavailable { device: DeviceId::Device(0) })
    ));

    let m = Matrix::<f32>::zeros(&ctx, 2, 2, DeviceId::Host).unwrap();
    assert!(matches!(
        m.ensure_location(DeviceId::Device(3), TransferMode::MOVE),
        Err(Error::DeviceUnavailable { .. })
    ));
    assert_eq!(m.location(), Location::Host);
}

#[test]
fn test_thrash_counter_keeps_counting() {
    common::init_tracing();
    let ctx = create_device_ctx_with(1, ContextConfig::default().with_thrash_warning_threshold(4));
    let m = iota_matrix(&ctx, 2, 2, DeviceId::Host);
    for _ in 0..5 {
        m.ensure_location(DEV0, TransferMode::MOVE).unwrap();
        m.ensure_location(DeviceId::Host, TransferMode::MOVE).unwrap();
    }
    assert_eq!(m.location_changes(), 10);
    assert_eq!(m.copy_to_array().unwrap(), iota(4));
}

#[test]
fn test_matrix_can_move_between_threads() {
    let ctx = create_device_ctx(1);
    let m = iota_matrix(&ctx, 3, 3, DEV0);
    let sum = std::thread::spawn(move || m.sum_of_elements().unwrap())
        .join()
        .unwrap();
    assert_eq!(sum, 45.0);
}

#[test]
fn test_failed_transfer_leaves_source_intact() {
    let ctx = common::create_small_device_ctx(256);
    assert!(matches!(
        Matrix::<f64>::zeros(&ctx, 10, 10, DEV0),
        Err(Error::OutOfMemory { size: 800, device: DeviceId::Device(0) })
    ));

    let m = iota_matrix(&ctx, 10, 10, DeviceId::Host);
    assert!(matches!(
        m.ensure_location(DEV0, TransferMode::MOVE),
        Err(Error::OutOfMemory { .. })
    ));
    assert_eq!(m.location(), Location::Host);
    assert_eq!(m.location_changes(), 0);
    assert_eq!(m.copy_to_array().unwrap(), iota(100));
    assert_eq!(ctx.memory_stats(DEV0).unwrap().bytes_in_use, 0);

    // Small enough to fit
    let small = iota_matrix(&ctx, 4, 4, DeviceId::Host);
    small.ensure_location(DEV0, TransferMode::MOVE).unwrap();
    assert_eq!(small.device_id(), DEV0);
}
