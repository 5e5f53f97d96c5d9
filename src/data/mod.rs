//! Data module: masks, the internal mesh and internal fields.

pub mod internal_field;
pub mod internal_mesh;
pub mod mask;
pub mod search_grid;

pub use internal_field::{Element, ElementType, InternalField, MeshField};
pub use internal_mesh::InternalMesh;
pub use mask::ArrayMask;
pub use search_grid::{GridResolution, SearchGrid};
