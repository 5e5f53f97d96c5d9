//! Text input for native-side metadata.

pub mod classification;

pub use classification::read_node_classification;
