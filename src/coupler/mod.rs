//! Coupling sessions.
//!
//! The rendezvous side runs a [`CouplerServer`]: a registry of
//! [`Application`]s (one channel each), their coupled fields, session-level
//! internal fields and the gather/scatter operations wiring them together.
//! Every application rank runs a [`CouplerClient`] holding the native side of
//! the same fields.
//!
//! Registries never remove entries, so every issued [`FieldId`],
//! [`ApplicationId`] and [`InternalFieldId`] stays valid.

pub mod client;
pub mod coupled_field;
pub mod gather;
pub(crate) mod registry;
pub mod scatter;
pub mod server;

pub use client::CouplerClient;
pub use coupled_field::{CoupledField, CoupledFieldConcept, FieldExchange};
pub use gather::GatherOperation;
pub use registry::{ApplicationId, FieldId, InternalFieldId};
pub use scatter::ScatterOperation;
pub use server::{Application, CouplerServer, InternalFieldSpec};

use crate::coupling_error::CouplingError;
use crate::data::internal_field::InternalField;

/// Suffix of the per-field internal fields created by `Application::add_field`.
pub const INTERNAL_SUFFIX: &str = ".__internal__";

/// Coupled fields addressable by [`FieldId`].
pub(crate) trait FieldStore {
    fn field(&self, id: FieldId) -> Result<&CoupledField, CouplingError>;
    fn field_mut(&mut self, id: FieldId) -> Result<&mut CoupledField, CouplingError>;
}

/// A session-level internal field and whether its last gather succeeded.
#[derive(Debug)]
pub(crate) struct InternalEntry {
    pub(crate) field: InternalField,
    pub(crate) valid: bool,
}

impl InternalEntry {
    pub(crate) fn new(field: InternalField) -> Self {
        Self { field, valid: true }
    }
}
