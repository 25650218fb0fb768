//! Arithmetic
//!
//! Each transform comes in up to three forms: update `self`
//! (`*_inplace`, `*_with`), overwrite `self` from arguments (`assign_*_of`),
//! or return a new matrix. Operands are co-located before the kernel runs;
//! a new matrix is produced where its first operand lives.
//!
//! Only scaling and the reductions accept sparse operands. Everything else
//! fails with `DensityMismatch` instead of converting silently.

use super::Matrix;
use crate::dtype::Element;
use crate::error::{Error, Result};
use crate::runtime::{BinaryOp, ReduceOp};
use crate::storage::Density;

impl<T: Element> Matrix<T> {
    /// Empty output handle materialized where `self` currently lives
    pub(super) fn output_like(&self) -> Result<Self> {
        let side = self.current_side()?.unwrap_or_else(|| self.device_id());
        Ok(Self::new(&self.ctx, Some(side)))
    }

    pub(super) fn check_same_shape(&self, other: &Self) -> Result<()> {
        let (a, b) = (self.shape(), other.shape());
        if a != b {
            return Err(Error::shape_mismatch(&[a.0, a.1], &[b.0, b.1]));
        }
        Ok(())
    }

    /// Full reduction at the current location; 0 without data
    pub(super) fn reduce(&self, op: ReduceOp) -> Result<f64> {
        let Some(operand) = self.current_operand()? else {
            return Ok(0.0);
        };
        self.read_with(operand, |kernels, arena| {
            match operand.backend(arena)?.density() {
                Density::Sparse => kernels.reduce_sparse(op, &operand.sparse(arena, "reduce")?),
                _ => kernels.reduce(op, &operand.dense(arena, "reduce")?),
            }
        })
    }

    /// self *= alpha; sparse matrices scale their stored values
    pub fn scale_inplace(&mut self, alpha: T) -> Result<()> {
        let Some(operand) = self.current_operand()? else {
            return Ok(());
        };
        let alpha = alpha.to_f64();
        self.write_with(operand, |kernels, arena| {
            match operand.backend(arena)?.density() {
                Density::Sparse => {
                    let s = operand.sparse(arena, "scale")?;
                    kernels.scale_sparse(&s, alpha, &s)
                }
                _ => {
                    let d = operand.dense(arena, "scale")?;
                    kernels.scale(&d, alpha, &d)
                }
            }
        })
    }

    /// self = alpha * a
    ///
    /// A sparse `a` makes `self` a sparse copy in `a`'s format.
    pub fn assign_scaled_of(&mut self, alpha: T, a: &Self) -> Result<()> {
        if a.density() == Density::Sparse {
            self.set_value_from(a)?;
            return self.scale_inplace(alpha);
        }
        let alpha = alpha.to_f64();
        self.run_dense(&[a], a.shape(), false, "assign_scaled_of", |k, ins, out| {
            k.scale(&ins[0], alpha, out)
        })
    }

    /// alpha * self as a new matrix
    pub fn scaled(&self, alpha: T) -> Result<Self> {
        let mut out = self.output_like()?;
        out.assign_scaled_of(alpha, self)?;
        Ok(out)
    }

    fn binary_inplace(&mut self, op: BinaryOp, a: &Self, name: &'static str) -> Result<()> {
        self.check_same_shape(a)?;
        self.run_dense(&[a], a.shape(), true, name, |k, ins, out| {
            k.binary(op, &ins[0], &ins[1], out)
        })
    }

    fn assign_binary_of(&mut self, op: BinaryOp, a: &Self, b: &Self, name: &'static str) -> Result<()> {
        a.check_same_shape(b)?;
        self.run_dense(&[a, b], a.shape(), false, name, |k, ins, out| {
            k.binary(op, &ins[0], &ins[1], out)
        })
    }

    fn binary(&self, op: BinaryOp, b: &Self, name: &'static str) -> Result<Self> {
        let mut out = self.output_like()?;
        out.assign_binary_of(op, self, b, name)?;
        Ok(out)
    }

    /// self += a
    pub fn add_inplace(&mut self, a: &Self) -> Result<()> {
        self.binary_inplace(BinaryOp::Add, a, "add_inplace")
    }

    /// self = a + b
    pub fn assign_sum_of(&mut self, a: &Self, b: &Self) -> Result<()> {
        self.assign_binary_of(BinaryOp::Add, a, b, "assign_sum_of")
    }

    /// self + b as a new matrix
    pub fn add(&self, b: &Self) -> Result<Self> {
        self.binary(BinaryOp::Add, b, "add")
    }

    /// self -= a
    pub fn sub_inplace(&mut self, a: &Self) -> Result<()> {
        self.binary_inplace(BinaryOp::Sub, a, "sub_inplace")
    }

    /// self = a - b
    pub fn assign_difference_of(&mut self, a: &Self, b: &Self) -> Result<()> {
        self.assign_binary_of(BinaryOp::Sub, a, b, "assign_difference_of")
    }

    /// self - b as a new matrix
    pub fn sub(&self, b: &Self) -> Result<Self> {
        self.binary(BinaryOp::Sub, b, "sub")
    }

    /// self .*= a
    pub fn element_multiply_with(&mut self, a: &Self) -> Result<()> {
        self.binary_inplace(BinaryOp::Mul, a, "element_multiply_with")
    }

    /// self = a .* b
    pub fn assign_element_product_of(&mut self, a: &Self, b: &Self) -> Result<()> {
        self.assign_binary_of(BinaryOp::Mul, a, b, "assign_element_product_of")
    }

    /// self .* b as a new matrix
    pub fn element_product(&self, b: &Self) -> Result<Self> {
        self.binary(BinaryOp::Mul, b, "element_product")
    }

    /// self = self .^ exponent
    pub fn element_power_inplace(&mut self, exponent: f64) -> Result<()> {
        let shape = self.shape();
        self.run_dense(&[], shape, true, "element_power_inplace", |k, ins, out| {
            k.power(&ins[0], exponent, out)
        })
    }

    /// self = a .^ exponent
    pub fn assign_element_power_of(&mut self, a: &Self, exponent: f64) -> Result<()> {
        self.run_dense(&[a], a.shape(), false, "assign_element_power_of", |k, ins, out| {
            k.power(&ins[0], exponent, out)
        })
    }

    /// self .^ exponent as a new matrix
    pub fn element_power(&self, exponent: f64) -> Result<Self> {
        let mut out = self.output_like()?;
        out.assign_element_power_of(self, exponent)?;
        Ok(out)
    }

    /// self += alpha, element-wise
    pub fn add_scalar_inplace(&mut self, alpha: T) -> Result<()> {
        let shape = self.shape();
        let alpha = alpha.to_f64();
        self.run_dense(&[], shape, true, "add_scalar_inplace", |k, ins, out| {
            k.add_scalar(&ins[0], alpha, out)
        })
    }

    /// self += alpha * a
    pub fn add_with_scale_of(&mut self, alpha: T, a: &Self) -> Result<()> {
        self.check_same_shape(a)?;
        let alpha = alpha.to_f64();
        self.run_dense(&[a], a.shape(), true, "add_with_scale_of", |k, ins, out| {
            k.axpby(alpha, &ins[1], 1.0, &ins[0], out)
        })
    }

    /// self = op(a) * op(b), where op transposes when the flag is set
    pub fn assign_product_of(&mut self, a: &Self, trans_a: bool, b: &Self, trans_b: bool) -> Result<()> {
        let (ar, ac) = a.shape();
        let (br, bc) = b.shape();
        let (m, k_a) = if trans_a { (ac, ar) } else { (ar, ac) };
        let (k_b, n) = if trans_b { (bc, br) } else { (br, bc) };
        if k_a != k_b {
            return Err(Error::shape_mismatch(&[m, k_a], &[k_b, n]));
        }
        self.run_dense(&[a, b], (m, n), false, "assign_product_of", |k, ins, out| {
            k.gemm(&ins[0], trans_a, &ins[1], trans_b, out)
        })
    }

    /// self * b as a new matrix
    pub fn matmul(&self, b: &Self) -> Result<Self> {
        let mut out = self.output_like()?;
        out.assign_product_of(self, false, b, false)?;
        Ok(out)
    }

    /// Sum of all elements (absent sparse elements count as zero)
    pub fn sum_of_elements(&self) -> Result<T> {
        self.reduce(ReduceOp::Sum).map(T::from_f64)
    }

    /// Sum of absolute values of all elements
    pub fn sum_of_abs_elements(&self) -> Result<T> {
        self.reduce(ReduceOp::SumAbs).map(T::from_f64)
    }
}

#[cfg(test)]
mod tests {
    use crate::context::Context;
    use crate::error::Error;
    use crate::matrix::{Matrix, MatrixOrder};
    use crate::runtime::DeviceId;
    use crate::storage::MatrixFormat;

    fn host(ctx: &Context, rows: usize, cols: usize, data: &[f64]) -> Matrix<f64> {
        let mut m = Matrix::new(ctx, Some(DeviceId::Host));
        m.set_value(rows, cols, data, MatrixOrder::ColumnMajor).unwrap();
        m
    }

    #[test]
    fn test_three_forms_agree() {
        let ctx = Context::host_only();
        let a = host(&ctx, 2, 2, &[1.0, 2.0, 3.0, 4.0]);
        let b = host(&ctx, 2, 2, &[10.0, 20.0, 30.0, 40.0]);

        let pure = a.add(&b).unwrap();
        let mut assigned = Matrix::new(&ctx, None);
        assigned.assign_sum_of(&a, &b).unwrap();
        let mut inplace = a.deep_clone().unwrap();
        inplace.add_inplace(&b).unwrap();

        let expected = vec![11.0, 22.0, 33.0, 44.0];
        assert_eq!(pure.copy_to_array().unwrap(), expected);
        assert_eq!(assigned.copy_to_array().unwrap(), expected);
        assert_eq!(inplace.copy_to_array().unwrap(), expected);
    }

    #[test]
    fn test_add_with_scale_of() {
        let ctx = Context::host_only();
        let mut acc = host(&ctx, 1, 3, &[1.0, 1.0, 1.0]);
        let x = host(&ctx, 1, 3, &[1.0, 2.0, 3.0]);
        acc.add_with_scale_of(2.0, &x).unwrap();
        assert_eq!(acc.copy_to_array().unwrap(), vec![3.0, 5.0, 7.0]);
    }

    #[test]
    fn test_product_with_transpose() {
        let ctx = Context::host_only();
        // a = [1 3; 2 4] column-major
        let a = host(&ctx, 2, 2, &[1.0, 2.0, 3.0, 4.0]);
        let mut c = Matrix::new(&ctx, None);
        c.assign_product_of(&a, true, &a, false).unwrap();
        // a^T a = [5 11; 11 25]
        assert_eq!(c.copy_to_array().unwrap(), vec![5.0, 11.0, 11.0, 25.0]);

        let row = host(&ctx, 1, 3, &[1.0, 2.0, 3.0]);
        assert!(matches!(row.matmul(&row), Err(Error::ShapeMismatch { .. })));
    }

    #[test]
    fn test_sparse_rejected_by_elementwise() {
        let ctx = Context::host_only();
        let mut s = host(&ctx, 2, 2, &[1.0, 0.0, 0.0, 1.0]);
        s.switch_density(MatrixFormat::SparseCsc, true).unwrap();
        let d = host(&ctx, 2, 2, &[1.0, 1.0, 1.0, 1.0]);
        assert!(matches!(d.add(&s), Err(Error::DensityMismatch { .. })));

        s.scale_inplace(3.0).unwrap();
        assert_eq!(s.sum_of_elements().unwrap(), 6.0);
        let scaled = s.scaled(0.5).unwrap();
        assert_eq!(scaled.format(), MatrixFormat::SparseCsc);
        assert_eq!(scaled.sum_of_abs_elements().unwrap(), 3.0);
    }

    #[test]
    fn test_element_power_and_scalar() {
        let ctx = Context::host_only();
        let mut m = host(&ctx, 2, 1, &[2.0, 3.0]);
        m.element_power_inplace(2.0).unwrap();
        m.add_scalar_inplace(1.0).unwrap();
        assert_eq!(m.copy_to_array().unwrap(), vec![5.0, 10.0]);
        assert_eq!(m.element_product(&m).unwrap().copy_to_array().unwrap(), vec![25.0, 100.0]);
    }
}
