//! Creation, resize, clone, take and external buffers

mod common;

use common::{DEV0, create_device_ctx, create_host_ctx, iota, iota_matrix};
use devmat::location::{Location, TransferMode};
use devmat::matrix::DEFAULT_THRESHOLD;
use devmat::runtime::DeviceId;
use devmat::storage::{Density, MatrixFormat};
use devmat::{Error, Matrix};

#[test]
fn test_resize_within_capacity_does_not_reallocate() {
    let ctx = create_device_ctx(1);
    let mut m = Matrix::<f32>::zeros(&ctx, 4, 4, DEV0).unwrap();
    assert_eq!(ctx.memory_stats(DEV0).unwrap().allocations, 1);

    m.resize(2, 3, 0, true).unwrap();
    m.resize(4, 4, 0, true).unwrap();
    m.resize(4, 4, 0, false).unwrap();
    assert_eq!(m.shape(), (4, 4));
    assert_eq!(ctx.memory_stats(DEV0).unwrap().allocations, 1);

    m.resize(5, 5, 0, true).unwrap();
    assert_eq!(m.shape(), (5, 5));
    let stats = ctx.memory_stats(DEV0).unwrap();
    assert_eq!(stats.allocations, 2);
    assert_eq!(stats.deallocations, 1);
    assert_eq!(m.buffer_size().unwrap(), 25 * 4);
}

#[test]
fn test_exact_resize_reallocates_when_smaller() {
    let ctx = create_host_ctx();
    let mut m = Matrix::<f64>::zeros(&ctx, 4, 4, DeviceId::Host).unwrap();
    let before = ctx.memory_stats(DeviceId::Host).unwrap().allocations;
    m.resize(2, 2, 0, false).unwrap();
    assert_eq!(ctx.memory_stats(DeviceId::Host).unwrap().allocations, before + 1);
    assert_eq!(m.buffer_size().unwrap(), 4 * 8);
}

#[test]
fn test_resize_drops_both_to_authoritative_side() {
    let ctx = create_device_ctx(1);
    let mut m = iota_matrix(&ctx, 3, 3, DEV0);
    m.ensure_location(DeviceId::Host, TransferMode::KEEP).unwrap();
    assert_eq!(m.location(), Location::Both);

    m.resize(2, 2, 0, true).unwrap();
    assert_eq!(m.location(), Location::Device);
    assert_eq!(ctx.live_backends(), 1);
}

#[test]
fn test_sparse_resize_clears_and_reserves() {
    let ctx = create_host_ctx();
    let mut m = Matrix::<f64>::eye(&ctx, 3, DeviceId::Host).unwrap();
    m.switch_density(MatrixFormat::SparseCsc, true).unwrap();
    assert_eq!(m.nnz().unwrap(), 3);

    m.resize(3, 3, 2, true).unwrap();
    assert_eq!(m.nnz().unwrap(), 3);

    m.resize(4, 5, 32, true).unwrap();
    assert_eq!(m.shape(), (4, 5));
    assert_eq!(m.density(), Density::Sparse);
    assert_eq!(m.nnz().unwrap(), 0);
}

#[test]
fn test_deep_clone_is_independent() {
    let ctx = create_device_ctx(1);
    let a = iota_matrix(&ctx, 2, 3, DEV0);
    let mut b = a.deep_clone().unwrap();
    assert_eq!(b.device_id(), DEV0);
    assert!(!b.is_view());
    assert!(Matrix::are_equal(&a, &b, DEFAULT_THRESHOLD).unwrap());

    b.scale_inplace(-1.0).unwrap();
    assert_eq!(a.copy_to_array().unwrap(), iota(6));
    assert_eq!(b.sum_of_elements().unwrap(), -21.0);
    assert!(!a.is_equal_to(&b, 1e-12).unwrap());
}

#[test]
fn test_deep_clone_keeps_sparse_format() {
    let ctx = create_device_ctx(1);
    let mut a = Matrix::<f32>::eye(&ctx, 4, DEV0).unwrap();
    a.switch_density(MatrixFormat::SparseCsr, true).unwrap();
    let b = a.deep_clone().unwrap();
    assert_eq!(b.format(), MatrixFormat::SparseCsr);
    assert_eq!(b.nnz().unwrap(), 4);
    assert_eq!(b.device_id(), DEV0);
}

#[test]
fn test_take_leaves_empty_handle() {
    let ctx = create_device_ctx(1);
    let mut a = iota_matrix(&ctx, 2, 2, DEV0);
    let view = a.column_slice(1, 1).unwrap();

    let b = a.take();
    assert_eq!(a.location(), Location::None);
    assert_eq!(a.num_elements(), 0);
    assert_eq!(a.preferred_device(), Some(DEV0));
    assert_eq!(b.copy_to_array().unwrap(), iota(4));
    assert_eq!(view.copy_to_array().unwrap(), vec![3.0, 4.0]);

    drop(b);
    assert!(matches!(view.copy_to_array(), Err(Error::StaleView)));
}

#[test]
fn test_reset_returns_to_none() {
    let ctx = create_device_ctx(1);
    let mut a = iota_matrix(&ctx, 3, 3, DEV0);
    a.reset();
    assert_eq!(a.location(), Location::None);
    assert_eq!(a.shape(), (0, 0));
    assert_eq!(ctx.live_backends(), 0);
    assert_eq!(ctx.memory_stats(DEV0).unwrap().bytes_in_use, 0);
}

#[test]
fn test_borrowed_external_buffer_survives_transfer() {
    let ctx = create_device_ctx(1);
    let mut data = vec![1.0f64, 2.0, 3.0, 4.0, 5.0, 6.0];
    {
        // SAFETY: `data` holds 6 elements and outlives the matrix
        let m = unsafe {
            Matrix::create_external(&ctx, 3, 2, data.as_mut_ptr(), DeviceId::Host, false)
        }
        .unwrap();
        assert!(!m.owns_buffer().unwrap());

        m.ensure_location(DEV0, TransferMode::MOVE).unwrap();
        assert_eq!(m.location(), Location::Device);
        assert!(m.owns_buffer().unwrap());
        assert_eq!(m.get_value(2, 1).unwrap(), 6.0);
    }
    assert_eq!(ctx.memory_stats(DeviceId::Host).unwrap().deallocations, 0);
    assert_eq!(data, vec![1.0, 2.0, 3.0, 4.0, 5.0, 6.0]);
}

#[test]
fn test_owned_external_buffer_is_freed() {
    let ctx = create_host_ctx();
    let bytes = 2 * 2 * std::mem::size_of::<f32>();
    let ptr = ctx.host().allocate(bytes).unwrap();
    {
        // SAFETY: the memory comes from the host runtime with the exact size
        let mut m = unsafe {
            Matrix::<f32>::create_external(&ctx, 2, 2, ptr as usize as *mut f32, DeviceId::Host, true)
        }
        .unwrap();
        assert!(m.owns_buffer().unwrap());
        m.set_value_scalar(2.0).unwrap();
        assert_eq!(m.sum_of_elements().unwrap(), 8.0);
    }
    let stats = ctx.memory_stats(DeviceId::Host).unwrap();
    assert_eq!(stats.deallocations, 1);
    assert_eq!(stats.bytes_in_use, 0);
}

#[test]
fn test_null_external_pointer_is_rejected() {
    let ctx = create_host_ctx();
    // SAFETY: a null pointer is rejected before any access
    let res = unsafe {
        Matrix::<f64>::create_external(&ctx, 2, 2, std::ptr::null_mut(), DeviceId::Host, false)
    };
    assert!(matches!(res, Err(Error::InvalidArgument { arg: "ptr", .. })));
}

#[test]
fn test_operands_from_different_contexts() {
    let ctx_a = create_host_ctx();
    let ctx_b = create_host_ctx();
    let mut a = Matrix::<f64>::ones(&ctx_a, 2, 2, DeviceId::Host).unwrap();
    let b = Matrix::<f64>::ones(&ctx_b, 2, 2, DeviceId::Host).unwrap();
    assert!(matches!(
        a.add_inplace(&b),
        Err(Error::InvalidArgument { .. })
    ));
    assert_eq!(a.sum_of_elements().unwrap(), 4.0);
}

#[test]
fn test_zero_dimension_creation() {
    let ctx = create_host_ctx();
    assert!(matches!(
        Matrix::<f32>::create(&ctx, 0, 3, DeviceId::Host, MatrixFormat::Dense, 0),
        Err(Error::InvalidShape { rows: 0, cols: 3, .. })
    ));
    assert!(matches!(
        Matrix::<f32>::from_host(&ctx, 2, 2, DeviceId::Host, &[1.0]),
        Err(Error::ShapeMismatch { .. })
    ));
}

#[test]
fn test_resize_like_and_resize_columns() {
    let ctx = create_host_ctx();
    let template = Matrix::<f32>::zeros(&ctx, 3, 5, DeviceId::Host).unwrap();
    let mut m = Matrix::<f32>::zeros(&ctx, 2, 2, DeviceId::Host).unwrap();

    m.resize_like(&template).unwrap();
    assert_eq!(m.shape(), (3, 5));
    m.resize_columns(2).unwrap();
    assert_eq!(m.shape(), (3, 2));
    // Grow-only keeps the larger allocation
    assert_eq!(m.buffer_size().unwrap(), 15 * 4);
}

#[test]
fn test_assign_values_of_keeps_target_format_and_location() {
    let ctx = create_device_ctx(1);
    let src = Matrix::<f64>::from_host(&ctx, 2, 2, DeviceId::Host, &[0.0, 3.0, 0.0, 4.0]).unwrap();

    let mut dense = Matrix::<f64>::zeros(&ctx, 1, 1, DEV0).unwrap();
    dense.assign_values_of(&src).unwrap();
    assert_eq!(dense.shape(), (2, 2));
    assert_eq!(dense.location(), Location::Device);
    assert_eq!(dense.copy_to_array().unwrap(), vec![0.0, 3.0, 0.0, 4.0]);
    assert_eq!(src.location(), Location::Both);

    let mut sparse = Matrix::<f64>::create(&ctx, 2, 2, DEV0, MatrixFormat::SparseCsr, 4).unwrap();
    sparse.assign_values_of(&src).unwrap();
    assert_eq!(sparse.format(), MatrixFormat::SparseCsr);
    assert_eq!(sparse.device_id(), DEV0);
    assert_eq!(sparse.nnz().unwrap(), 2);
    assert_eq!(sparse.get_value(1, 1).unwrap(), 4.0);

    // set_value_from follows the source instead
    let mut follower = Matrix::<f64>::create(&ctx, 2, 2, DEV0, MatrixFormat::SparseCsr, 4).unwrap();
    follower.set_value_from(&src).unwrap();
    assert_eq!(follower.density(), Density::Dense);
}

#[test]
fn test_set_column_variants() {
    let ctx = create_device_ctx(1);
    let mut m = Matrix::<f64>::zeros(&ctx, 2, 3, DEV0).unwrap();
    m.set_column(0, &[1.0, 2.0]).unwrap();
    m.set_column_value(1, 7.0).unwrap();
    let col = Matrix::<f64>::from_host(&ctx, 2, 1, DeviceId::Host, &[8.0, 9.0]).unwrap();
    m.set_column_from(2, &col).unwrap();

    assert_eq!(m.copy_to_array().unwrap(), vec![1.0, 2.0, 7.0, 7.0, 8.0, 9.0]);
    assert_eq!(m.location(), Location::Device);
    assert_eq!(m.num_views(), 0);

    assert!(matches!(
        m.set_column(3, &[0.0, 0.0]),
        Err(Error::IndexOutOfBounds { index: 3, size: 3 })
    ));
    assert!(matches!(m.set_column(0, &[0.0]), Err(Error::ShapeMismatch { .. })));

    m.switch_density(MatrixFormat::SparseCsc, true).unwrap();
    assert!(matches!(m.set_column_value(0, 1.0), Err(Error::UnsupportedForSparse { .. })));
}
