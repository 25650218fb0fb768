//! Matrix storage: buffers, dense and sparse layouts, and the backend arena

mod arena;
mod backend;
mod buffer;
mod dense;
mod format;
mod sparse;

pub use arena::{Arena, BackendArena, BackendKey};
pub use backend::{StorageBackend, Window};
pub use buffer::Buffer;
pub use dense::DenseStorage;
pub use format::{Density, MatrixFormat};
pub use sparse::{SparseParts, SparseStorage};

pub(crate) use sparse::validate_parts;
