//! Data-motion and conversion algorithms.

pub mod channel;
pub mod combine;
pub mod communicator;
pub mod convert;
pub mod evaluate;
pub mod field_communicator;
pub mod reverse_partition;
pub mod wire;

pub use combine::{AddReducer, CombinerFunction, CopyReducer, Reducer, combiner, combiners};
pub use convert::{internal_to_internal, internal_to_native, native_to_internal};
pub use field_communicator::{FieldCommunicator, Role, SendMode};
