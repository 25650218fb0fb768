//! Binary serialization of matrices
//!
//! Stable little-endian layout:
//!
//! ```text
//! magic "DMAT" | version u32 | dtype tag u8 | density tag u8 | reserved [u8; 2]
//! rows u64 | cols u64
//! dense:  rows * cols values, column-major
//! sparse: nnz u64 | col_ptrs (cols + 1) i64 | row_indices nnz i64 | values nnz
//! ```
//!
//! Sparse matrices are always written in compressed-column form and read
//! back as CSC. A matrix without data is written as zeros.

use crate::context::Context;
use crate::dtype::{DType, Element};
use crate::error::{Error, Result};
use crate::matrix::{CscParts, Matrix, MatrixOrder};
use crate::runtime::DeviceId;
use crate::storage::Density;
use std::io::{Read, Write};

/// Magic bytes opening every serialized matrix
pub const MAGIC: [u8; 4] = *b"DMAT";

/// Current layout version
pub const FORMAT_VERSION: u32 = 1;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Header {
    dtype: DType,
    sparse: bool,
    rows: u64,
    cols: u64,
}

impl Header {
    fn write<W: Write>(&self, writer: &mut W) -> Result<()> {
        let density = if self.sparse {
            Density::Sparse
        } else {
            Density::Dense
        };
        writer.write_all(&MAGIC)?;
        writer.write_all(&FORMAT_VERSION.to_le_bytes())?;
        writer.write_all(&[self.dtype.tag(), density.tag(), 0, 0])?;
        writer.write_all(&self.rows.to_le_bytes())?;
        writer.write_all(&self.cols.to_le_bytes())?;
        Ok(())
    }

    fn read<R: Read>(reader: &mut R) -> Result<Self> {
        let mut magic = [0u8; 4];
        reader.read_exact(&mut magic)?;
        if magic != MAGIC {
            return Err(Error::invalid_argument("reader", "stream is not a serialized matrix"));
        }
        let version = read_u32(reader)?;
        if version != FORMAT_VERSION {
            return Err(Error::invalid_argument(
                "reader",
                format!("unsupported layout version {version}"),
            ));
        }
        let mut tags = [0u8; 4];
        reader.read_exact(&mut tags)?;
        let dtype = DType::from_tag(tags[0]).ok_or_else(|| {
            Error::invalid_argument("reader", format!("unknown dtype tag {}", tags[0]))
        })?;
        let sparse = match tags[1] {
            t if t == Density::Dense.tag() => false,
            t if t == Density::Sparse.tag() => true,
            t => {
                return Err(Error::invalid_argument(
                    "reader",
                    format!("unknown density tag {t}"),
                ));
            }
        };
        Ok(Self {
            dtype,
            sparse,
            rows: read_u64(reader)?,
            cols: read_u64(reader)?,
        })
    }
}

fn read_u32<R: Read>(reader: &mut R) -> Result<u32> {
    let mut bytes = [0u8; 4];
    reader.read_exact(&mut bytes)?;
    Ok(u32::from_le_bytes(bytes))
}

fn read_u64<R: Read>(reader: &mut R) -> Result<u64> {
    let mut bytes = [0u8; 8];
    reader.read_exact(&mut bytes)?;
    Ok(u64::from_le_bytes(bytes))
}

fn to_usize(value: u64, what: &'static str) -> Result<usize> {
    usize::try_from(value)
        .map_err(|_| Error::invalid_argument(what, format!("{value} does not fit in usize")))
}

fn write_elements<W: Write, E: Element>(writer: &mut W, data: &[E]) -> Result<()> {
    let le: Vec<E> = data.iter().map(|v| v.to_le()).collect();
    writer.write_all(bytemuck::cast_slice(&le))?;
    Ok(())
}

/// Read `len` little-endian elements
///
/// Memory grows with the bytes actually present, so a header announcing
/// more than the stream holds ends in an `Io` error rather than a huge
/// up-front allocation.
fn read_elements<R: Read, E: Element>(reader: &mut R, len: usize) -> Result<Vec<E>> {
    let size = std::mem::size_of::<E>();
    let byte_len = len
        .checked_mul(size)
        .ok_or_else(|| Error::invalid_argument("reader", format!("{len} elements overflow")))?;
    let mut bytes = Vec::new();
    reader.by_ref().take(byte_len as u64).read_to_end(&mut bytes)?;
    if bytes.len() != byte_len {
        return Err(std::io::Error::new(
            std::io::ErrorKind::UnexpectedEof,
            format!("expected {byte_len} bytes, stream held {}", bytes.len()),
        )
        .into());
    }
    Ok(bytes
        .chunks_exact(size)
        .map(|chunk| E::from_le(bytemuck::pod_read_unaligned(chunk)))
        .collect())
}

impl<T: Element> Matrix<T> {
    /// Serialize shape, density and values
    pub fn write_to<W: Write>(&self, writer: &mut W) -> Result<()> {
        let (rows, cols) = self.shape();
        let sparse = self.density() == Density::Sparse;
        Header {
            dtype: T::DTYPE,
            sparse,
            rows: rows as u64,
            cols: cols as u64,
        }
        .write(writer)?;

        if sparse {
            let parts = self.copy_to_csc()?;
            writer.write_all(&(parts.values.len() as u64).to_le_bytes())?;
            write_elements(writer, &parts.col_ptrs)?;
            write_elements(writer, &parts.row_indices)?;
            write_elements(writer, &parts.values)?;
        } else {
            write_elements(writer, &self.copy_to_array()?)?;
        }
        tracing::trace!(rows, cols, sparse, "matrix written");
        Ok(())
    }

    /// Deserialize a matrix written by [`write_to`](Self::write_to) onto `device`
    ///
    /// The stored dtype must match `T`.
    pub fn read_from<R: Read>(ctx: &Context, reader: &mut R, device: DeviceId) -> Result<Self> {
        let header = Header::read(reader)?;
        if header.dtype != T::DTYPE {
            return Err(Error::DTypeMismatch {
                lhs: T::DTYPE,
                rhs: header.dtype,
            });
        }
        let rows = to_usize(header.rows, "rows")?;
        let cols = to_usize(header.cols, "cols")?;
        ctx.validate_shape(rows, cols, true)?;

        let mut matrix = Self::new(ctx, Some(device));
        if header.sparse {
            let nnz = to_usize(read_u64(reader)?, "nnz")?;
            // validate_shape has ruled out overflow of rows * cols
            if nnz > rows * cols {
                return Err(Error::invalid_argument(
                    "reader",
                    format!("{nnz} stored elements exceed a {rows} x {cols} matrix"),
                ));
            }
            let parts = CscParts {
                rows,
                cols,
                col_ptrs: read_elements(reader, cols + 1)?,
                row_indices: read_elements(reader, nnz)?,
                values: read_elements(reader, nnz)?,
            };
            matrix.set_matrix_from_csc(&parts)?;
        } else {
            let values: Vec<T> = read_elements(reader, rows * cols)?;
            matrix.set_value(rows, cols, &values, MatrixOrder::ColumnMajor)?;
        }
        Ok(matrix)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::MatrixFormat;
    use std::io::Cursor;

    #[test]
    fn test_header_layout() {
        let ctx = Context::host_only();
        let m = Matrix::<f32>::from_host(&ctx, 1, 2, DeviceId::Host, &[1.0, -2.0]).unwrap();
        let mut bytes = Vec::new();
        m.write_to(&mut bytes).unwrap();

        assert_eq!(&bytes[..4], b"DMAT");
        assert_eq!(u32::from_le_bytes(bytes[4..8].try_into().unwrap()), FORMAT_VERSION);
        assert_eq!(bytes[8], DType::F32.tag());
        assert_eq!(bytes[9], Density::Dense.tag());
        assert_eq!(u64::from_le_bytes(bytes[12..20].try_into().unwrap()), 1);
        assert_eq!(u64::from_le_bytes(bytes[20..28].try_into().unwrap()), 2);
        assert_eq!(bytes.len(), 28 + 2 * 4);
        assert_eq!(f32::from_le_bytes(bytes[32..36].try_into().unwrap()), -2.0);
    }

    #[test]
    fn test_sparse_stream_reads_back_as_csc() {
        let ctx = Context::host_only();
        let mut m = Matrix::<f64>::eye(&ctx, 4, DeviceId::Host).unwrap();
        m.switch_density(MatrixFormat::SparseCsr, true).unwrap();
        let mut bytes = Vec::new();
        m.write_to(&mut bytes).unwrap();

        let back = Matrix::<f64>::read_from(&ctx, &mut Cursor::new(bytes), DeviceId::Host).unwrap();
        assert_eq!(back.format(), MatrixFormat::SparseCsc);
        assert_eq!(back.nnz().unwrap(), 4);
        assert_eq!(back.copy_to_array().unwrap(), m.copy_to_array().unwrap());
    }

    #[test]
    fn test_rejects_bad_streams() {
        let ctx = Context::host_only();
        let garbage = b"NOPE\x01\x00\x00\x00".to_vec();
        assert!(matches!(
            Matrix::<f32>::read_from(&ctx, &mut Cursor::new(garbage), DeviceId::Host),
            Err(Error::InvalidArgument { .. })
        ));

        let m = Matrix::<i32>::ones(&ctx, 2, 2, DeviceId::Host).unwrap();
        let mut bytes = Vec::new();
        m.write_to(&mut bytes).unwrap();
        assert!(matches!(
            Matrix::<f32>::read_from(&ctx, &mut Cursor::new(bytes.clone()), DeviceId::Host),
            Err(Error::DTypeMismatch { .. })
        ));

        bytes.truncate(bytes.len() - 1);
        assert!(matches!(
            Matrix::<i32>::read_from(&ctx, &mut Cursor::new(bytes), DeviceId::Host),
            Err(Error::Io(_))
        ));
    }

    fn sparse_header(rows: u64, cols: u64, nnz: u64) -> Vec<u8> {
        let mut bytes = Vec::new();
        Header {
            dtype: DType::F64,
            sparse: true,
            rows,
            cols,
        }
        .write(&mut bytes)
        .unwrap();
        bytes.extend_from_slice(&nnz.to_le_bytes());
        bytes
    }

    #[test]
    fn test_rejects_oversized_nnz() {
        let ctx = Context::host_only();
        let mut bytes = sparse_header(2, 2, u64::MAX / 4);
        for ptr in [0i64, 0, 0] {
            bytes.extend_from_slice(&ptr.to_le_bytes());
        }
        assert!(matches!(
            Matrix::<f64>::read_from(&ctx, &mut Cursor::new(bytes), DeviceId::Host),
            Err(Error::InvalidArgument { arg: "reader", .. })
        ));

        // Five stored elements cannot fit in a 2 x 2 matrix
        let bytes = sparse_header(2, 2, 5);
        assert!(matches!(
            Matrix::<f64>::read_from(&ctx, &mut Cursor::new(bytes), DeviceId::Host),
            Err(Error::InvalidArgument { .. })
        ));
    }
}
