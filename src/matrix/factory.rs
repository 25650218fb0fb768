//! Factory constructors

use super::Matrix;
use crate::context::Context;
use crate::dtype::Element;
use crate::error::{Error, Result};
use crate::runtime::DeviceId;
use crate::storage::{Buffer, DenseStorage, MatrixFormat, StorageBackend};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rand_distr::{Distribution, Normal};
use std::time::{SystemTime, UNIX_EPOCH};

/// Seed value that asks the random factories for a time-based seed
pub const USE_TIME_BASED_SEED: u64 = u64::MAX;

/// Host staging vector for `rows * cols` elements
///
/// The shape is validated first; an allocation the host cannot satisfy is
/// an `OutOfMemory` error instead of an abort.
fn staging<T: Element>(ctx: &Context, rows: usize, cols: usize) -> Result<Vec<T>> {
    ctx.validate_shape(rows, cols, false)?;
    let len = rows
        .checked_mul(cols)
        .ok_or_else(|| Error::invalid_shape(rows, cols, "element count overflows"))?;
    let mut data = Vec::new();
    data.try_reserve_exact(len).map_err(|_| Error::OutOfMemory {
        size: len.saturating_mul(std::mem::size_of::<T>()),
        device: DeviceId::Host,
    })?;
    Ok(data)
}

fn resolve_seed(seed: u64) -> u64 {
    if seed != USE_TIME_BASED_SEED {
        return seed;
    }
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_or(0, |d| d.as_nanos() as u64)
}

impl<T: Element> Matrix<T> {
    /// Dense matrix at `device` holding column-major host `data`
    pub fn from_host(
        ctx: &Context,
        rows: usize,
        cols: usize,
        device: DeviceId,
        data: &[T],
    ) -> Result<Self> {
        ctx.validate_shape(rows, cols, false)?;
        if data.len() != rows * cols {
            return Err(Error::shape_mismatch(&[rows * cols], &[data.len()]));
        }
        let buffer = Buffer::from_slice(ctx.runtime(device)?, data)?;
        let dense = DenseStorage::from_buffer(buffer, rows, cols)?;
        Ok(Self::adopt(ctx, StorageBackend::from_dense(dense), Some(device)))
    }

    /// Dense zeros
    pub fn zeros(ctx: &Context, rows: usize, cols: usize, device: DeviceId) -> Result<Self> {
        Self::create(ctx, rows, cols, device, MatrixFormat::Dense, 0)
    }

    /// Dense ones
    pub fn ones(ctx: &Context, rows: usize, cols: usize, device: DeviceId) -> Result<Self> {
        let mut m = Self::zeros(ctx, rows, cols, device)?;
        m.set_value_scalar(T::one())?;
        Ok(m)
    }

    /// n × n identity
    pub fn eye(ctx: &Context, n: usize, device: DeviceId) -> Result<Self> {
        let mut data = staging(ctx, n, n)?;
        data.resize(n * n, T::zero());
        for i in 0..n {
            data[i * n + i] = T::one();
        }
        Self::from_host(ctx, n, n, device, &data)
    }

    /// Uniform values in `[low, high)`
    ///
    /// The same seed always produces the same matrix;
    /// [`USE_TIME_BASED_SEED`] draws a fresh one.
    pub fn random_uniform(
        ctx: &Context,
        rows: usize,
        cols: usize,
        device: DeviceId,
        low: T,
        high: T,
        seed: u64,
    ) -> Result<Self> {
        if !(low <= high) {
            return Err(Error::invalid_argument("low", "lower bound exceeds upper bound"));
        }
        let mut data = staging(ctx, rows, cols)?;
        let mut rng = StdRng::seed_from_u64(resolve_seed(seed));
        let (low, high) = (low.to_f64(), high.to_f64());
        data.extend((0..rows * cols).map(|_| T::from_f64(low + (high - low) * rng.random::<f64>())));
        Self::from_host(ctx, rows, cols, device, &data)
    }

    /// Normally distributed values
    pub fn random_gaussian(
        ctx: &Context,
        rows: usize,
        cols: usize,
        device: DeviceId,
        mean: T,
        sigma: T,
        seed: u64,
    ) -> Result<Self> {
        let normal = Normal::new(mean.to_f64(), sigma.to_f64())
            .map_err(|e| Error::invalid_argument("sigma", e.to_string()))?;
        let mut data = staging(ctx, rows, cols)?;
        let mut rng = StdRng::seed_from_u64(resolve_seed(seed));
        data.extend((0..rows * cols).map(|_| T::from_f64(normal.sample(&mut rng))));
        Self::from_host(ctx, rows, cols, device, &data)
    }
}
