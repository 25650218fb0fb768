//! Element trait for mapping Rust types to DType

use super::DType;
use bytemuck::{Pod, Zeroable};
use std::fmt::Debug;
use std::ops::{Add, Div, Mul, Sub};

/// Trait for types that can be elements of a matrix
///
/// This trait connects Rust's type system to devmat's runtime dtype system.
///
/// # Bounds
/// - `Copy + Send + Sync + 'static` - Basic trait requirements
/// - `Pod + Zeroable` - Safe memory transmutation (bytemuck)
/// - `Add + Sub + Mul + Div` - Arithmetic operations (Output = Self)
/// - `PartialOrd` - Comparison for min/max operations
pub trait Element:
    Copy
    + Clone
    + Debug
    + Send
    + Sync
    + Pod
    + Zeroable
    + 'static
    + Add<Output = Self>
    + Sub<Output = Self>
    + Mul<Output = Self>
    + Div<Output = Self>
    + PartialOrd
{
    /// The corresponding DType for this Rust type
    const DTYPE: DType;

    /// Convert to f64 for generic numeric operations
    fn to_f64(self) -> f64;

    /// Convert from f64 to this type
    fn from_f64(v: f64) -> Self;

    /// Zero value
    fn zero() -> Self;

    /// One value
    fn one() -> Self;

    /// Marker value written by `Matrix::invalidate` and poisoned transfers
    ///
    /// NaN for floats; integers have no NaN and use their minimum value.
    fn invalid() -> Self;

    /// False for NaN and infinities; always true for integers
    fn is_finite_value(self) -> bool;

    /// Convert to little-endian representation
    fn to_le(self) -> Self;

    /// Convert from little-endian representation
    fn from_le(self) -> Self;
}

macro_rules! impl_float_element {
    ($t:ty, $bits:ty, $dtype:expr) => {
        impl Element for $t {
            const DTYPE: DType = $dtype;

            #[inline]
            fn to_f64(self) -> f64 {
                self as f64
            }

            #[inline]
            fn from_f64(v: f64) -> Self {
                v as $t
            }

            #[inline]
            fn zero() -> Self {
                0.0
            }

            #[inline]
            fn one() -> Self {
                1.0
            }

            #[inline]
            fn invalid() -> Self {
                <$t>::NAN
            }

            #[inline]
            fn is_finite_value(self) -> bool {
                self.is_finite()
            }

            #[inline]
            fn to_le(self) -> Self {
                <$t>::from_bits(self.to_bits().to_le())
            }

            #[inline]
            fn from_le(self) -> Self {
                <$t>::from_bits(<$bits>::from_le(self.to_bits()))
            }
        }
    };
}

macro_rules! impl_int_element {
    ($t:ty, $dtype:expr) => {
        impl Element for $t {
            const DTYPE: DType = $dtype;

            #[inline]
            fn to_f64(self) -> f64 {
                self as f64
            }

            #[inline]
            fn from_f64(v: f64) -> Self {
                v as $t
            }

            #[inline]
            fn zero() -> Self {
                0
            }

            #[inline]
            fn one() -> Self {
                1
            }

            #[inline]
            fn invalid() -> Self {
                <$t>::MIN
            }

            #[inline]
            fn is_finite_value(self) -> bool {
                true
            }

            #[inline]
            fn to_le(self) -> Self {
                <$t>::to_le(self)
            }

            #[inline]
            fn from_le(self) -> Self {
                <$t>::from_le(self)
            }
        }
    };
}

impl_float_element!(f64, u64, DType::F64);
impl_float_element!(f32, u32, DType::F32);
impl_int_element!(i64, DType::I64);
impl_int_element!(i32, DType::I32);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dtype_mapping() {
        assert_eq!(<f32 as Element>::DTYPE, DType::F32);
        assert_eq!(<f64 as Element>::DTYPE, DType::F64);
        assert_eq!(<i32 as Element>::DTYPE, DType::I32);
        assert_eq!(<i64 as Element>::DTYPE, DType::I64);
    }

    #[test]
    fn test_invalid_markers() {
        assert!(<f32 as Element>::invalid().is_nan());
        assert!(!<f64 as Element>::invalid().is_finite_value());
        assert_eq!(<i32 as Element>::invalid(), i32::MIN);
        assert!(<i64 as Element>::invalid().is_finite_value());
    }

    #[test]
    fn test_le_roundtrip() {
        let v = 3.25f64;
        assert_eq!(Element::from_le(Element::to_le(v)), v);
        let i = -17i32;
        assert_eq!(Element::from_le(Element::to_le(i)), i);
    }
}
