//! Entity identifiers and geometric classification.

pub mod classification;
pub mod entity;

pub use classification::{NodeClassification, ReverseClassification};
pub use entity::{Gid, ModelEnt};
