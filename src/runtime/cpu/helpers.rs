//! Helpers shared by the CPU kernel implementations

// ============================================================================
// DType Dispatch Macro
// ============================================================================

/// Macro for dtype dispatch to typed kernel calls
///
/// Matches on the dtype and runs the block with `$T` bound to the Rust type.
/// Usage: `dispatch_dtype!(dtype, T => { code using T })`
///
/// `DType` must be in scope at the call site.
macro_rules! dispatch_dtype {
    ($dtype:expr, $T:ident => $body:block) => {
        match $dtype {
            DType::F64 => {
                type $T = f64;
                $body
            }
            DType::F32 => {
                type $T = f32;
                $body
            }
            DType::I64 => {
                type $T = i64;
                $body
            }
            DType::I32 => {
                type $T = i32;
                $body
            }
        }
    };
}

pub(crate) use dispatch_dtype;

use crate::dtype::DType;
use crate::error::{Error, Result};
use crate::runtime::{DenseRef, SparseRef};

/// Check that all dense operands carry the same dtype
pub(crate) fn same_dtype(refs: &[&DenseRef]) -> Result<DType> {
    let first = refs
        .first()
        .map(|r| r.dtype)
        .ok_or_else(|| Error::Internal("kernel called without operands".into()))?;
    for r in &refs[1..] {
        if r.dtype != first {
            return Err(Error::DTypeMismatch {
                lhs: first,
                rhs: r.dtype,
            });
        }
    }
    Ok(first)
}

/// Check that two dense operands have the same element count
pub(crate) fn same_len(a: &DenseRef, b: &DenseRef) -> Result<usize> {
    if a.len() != b.len() {
        return Err(Error::shape_mismatch(&[a.rows, a.cols], &[b.rows, b.cols]));
    }
    Ok(a.len())
}

/// Byte ranges of two blocks intersect
pub(crate) fn overlaps(a: &DenseRef, b: &DenseRef) -> bool {
    let size = a.dtype.size_in_bytes() as u64;
    let (a0, b0) = (a.addr(), b.addr());
    let (a1, b1) = (a0 + a.len() as u64 * size, b0 + b.len() as u64 * size);
    a0 < b1 && b0 < a1
}

/// Stored-value range `[start, end)` of a sparse block
///
/// # Safety
/// `src.offsets` must address at least `major_start + majors + 1` entries.
pub(crate) unsafe fn stored_range(src: &SparseRef) -> (usize, usize) {
    let offsets = src.offsets as *const i64;
    let majors = src.majors();
    // SAFETY: guaranteed by the caller
    unsafe {
        (
            *offsets.add(src.major_start) as usize,
            *offsets.add(src.major_start + majors) as usize,
        )
    }
}
