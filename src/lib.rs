//! Reader and writer for the MST binary mesh container, with conversion of
//! decoded meshes to glTF 2.0 / GLB.

/// Low-level readers and writers for the MST wire format
pub mod data;
/// Error definitions
pub mod error;
/// glTF/GLB export of decoded meshes
#[cfg(feature = "export")]
pub mod export;
/// Mesh, geometry, material and texture models with their codecs
pub mod models;
/// Generic wrapper for values that may or may not match a known variant.
pub mod recognized;

pub use error::{MstError, MstResult};
pub use models::mesh::{Mesh, MstVersion};
