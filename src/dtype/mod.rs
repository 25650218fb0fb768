//! Data type system for devmat matrices
//!
//! Storage backends are element-type erased and carry a `DType` tag; the
//! typed `Matrix<T>` facade maps Rust types onto it through [`Element`].

mod element;

pub use element::Element;

use std::fmt;

/// Data types supported by devmat storage
///
/// # Discriminant Values (Serialization Stability)
///
/// The discriminant values are written by [`crate::io`] and are **stable**:
/// - Floats: F64=0, F32=1
/// - Signed ints: I64=10, I32=11
///
/// Existing values are NEVER changed.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum DType {
    /// 64-bit floating point
    F64 = 0,
    /// 32-bit floating point (most common)
    F32 = 1,
    /// 64-bit signed integer (also used for sparse index arrays)
    I64 = 10,
    /// 32-bit signed integer
    I32 = 11,
}

impl DType {
    /// Size of one element in bytes
    #[inline]
    pub const fn size_in_bytes(self) -> usize {
        match self {
            Self::F64 | Self::I64 => 8,
            Self::F32 | Self::I32 => 4,
        }
    }

    /// Returns true if this is a floating point type
    #[inline]
    pub const fn is_float(self) -> bool {
        matches!(self, Self::F64 | Self::F32)
    }

    /// Short name for display (e.g., "f32", "i64")
    pub const fn short_name(self) -> &'static str {
        match self {
            Self::F64 => "f64",
            Self::F32 => "f32",
            Self::I64 => "i64",
            Self::I32 => "i32",
        }
    }

    /// Recover a dtype from its stable discriminant
    pub const fn from_tag(tag: u8) -> Option<Self> {
        match tag {
            0 => Some(Self::F64),
            1 => Some(Self::F32),
            10 => Some(Self::I64),
            11 => Some(Self::I32),
            _ => None,
        }
    }

    /// The stable discriminant of this dtype
    #[inline]
    pub const fn tag(self) -> u8 {
        self as u8
    }
}

impl fmt::Display for DType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.short_name())
    }
}
