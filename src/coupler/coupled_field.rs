//! Type-erased coupled fields.
//!
//! A coupled field pairs a concrete [`FieldAdapter`] with the
//! [`FieldCommunicator`] that moves its values. Sessions hold many fields of
//! different adapter and element types, so the pair lives behind the
//! [`FieldExchange`] (application side) or [`CoupledFieldConcept`]
//! (rendezvous side) trait object. The concrete adapter is recovered through
//! its [`AdapterKind`] tag followed by a checked downcast.

use std::any::{Any, type_name};

use crate::adapter::{AdapterKind, FieldAdapter};
use crate::algs::communicator::Communicator;
use crate::algs::convert::{internal_to_native, native_to_internal};
use crate::algs::field_communicator::{FieldCommunicator, SendMode};
use crate::config::TransferOptions;
use crate::coupling_error::CouplingError;
use crate::data::internal_field::InternalField;

/// Data motion of one field, independent of its concrete adapter.
pub trait FieldExchange {
    fn name(&self) -> &str;
    fn kind(&self) -> AdapterKind;
    fn send(&mut self, mode: SendMode) -> Result<(), CouplingError>;
    fn receive(&mut self) -> Result<(), CouplingError>;
    /// Complete deferred sends.
    fn flush(&mut self);
    fn invalidate_layout(&mut self);
    fn adapter_any(&self) -> &dyn Any;
    fn adapter_any_mut(&mut self) -> &mut dyn Any;
}

/// Rendezvous-side field: exchange plus conversion to and from its internal
/// field.
pub trait CoupledFieldConcept: FieldExchange {
    fn native_to_internal_options(&self) -> TransferOptions;
    fn internal_to_native_options(&self) -> TransferOptions;
    fn sync_native_to_internal(
        &mut self,
        internal: &mut InternalField,
    ) -> Result<(), CouplingError>;
    fn sync_internal_to_native(&mut self, internal: &InternalField) -> Result<(), CouplingError>;
}

pub(crate) struct ExchangeModel<A: FieldAdapter, C: Communicator> {
    adapter: A,
    comm: FieldCommunicator<C>,
}

impl<A: FieldAdapter, C: Communicator> ExchangeModel<A, C> {
    pub(crate) fn new(adapter: A, comm: FieldCommunicator<C>) -> Self {
        Self { adapter, comm }
    }
}

impl<A: FieldAdapter, C: Communicator> FieldExchange for ExchangeModel<A, C> {
    fn name(&self) -> &str {
        self.comm.name()
    }

    fn kind(&self) -> AdapterKind {
        self.adapter.kind()
    }

    fn send(&mut self, mode: SendMode) -> Result<(), CouplingError> {
        self.comm.send(&self.adapter, mode)
    }

    fn receive(&mut self) -> Result<(), CouplingError> {
        self.comm.receive(&mut self.adapter)
    }

    fn flush(&mut self) {
        self.comm.flush();
    }

    fn invalidate_layout(&mut self) {
        self.comm.invalidate_layout();
    }

    fn adapter_any(&self) -> &dyn Any {
        &self.adapter
    }

    fn adapter_any_mut(&mut self) -> &mut dyn Any {
        &mut self.adapter
    }
}

pub(crate) struct CoupledFieldModel<A: FieldAdapter, C: Communicator> {
    exchange: ExchangeModel<A, C>,
    native_to_internal: TransferOptions,
    internal_to_native: TransferOptions,
}

impl<A: FieldAdapter, C: Communicator> CoupledFieldModel<A, C> {
    pub(crate) fn new(
        adapter: A,
        comm: FieldCommunicator<C>,
        native_to_internal: TransferOptions,
        internal_to_native: TransferOptions,
    ) -> Self {
        Self {
            exchange: ExchangeModel::new(adapter, comm),
            native_to_internal,
            internal_to_native,
        }
    }
}

impl<A: FieldAdapter, C: Communicator> FieldExchange for CoupledFieldModel<A, C> {
    fn name(&self) -> &str {
        self.exchange.name()
    }
    fn kind(&self) -> AdapterKind {
        self.exchange.kind()
    }
    fn send(&mut self, mode: SendMode) -> Result<(), CouplingError> {
        self.exchange.send(mode)
    }
    fn receive(&mut self) -> Result<(), CouplingError> {
        self.exchange.receive()
    }
    fn flush(&mut self) {
        self.exchange.flush();
    }
    fn invalidate_layout(&mut self) {
        self.exchange.invalidate_layout();
    }
    fn adapter_any(&self) -> &dyn Any {
        self.exchange.adapter_any()
    }
    fn adapter_any_mut(&mut self) -> &mut dyn Any {
        self.exchange.adapter_any_mut()
    }
}

impl<A: FieldAdapter, C: Communicator> CoupledFieldConcept for CoupledFieldModel<A, C> {
    fn native_to_internal_options(&self) -> TransferOptions {
        self.native_to_internal
    }

    fn internal_to_native_options(&self) -> TransferOptions {
        self.internal_to_native
    }

    fn sync_native_to_internal(
        &mut self,
        internal: &mut InternalField,
    ) -> Result<(), CouplingError> {
        native_to_internal(&self.exchange.adapter, internal, self.native_to_internal)
    }

    fn sync_internal_to_native(&mut self, internal: &InternalField) -> Result<(), CouplingError> {
        internal_to_native(internal, &mut self.exchange.adapter, self.internal_to_native)
    }
}

fn kind_mismatch<A: FieldAdapter>(name: &str, found: AdapterKind) -> CouplingError {
    CouplingError::AdapterKindMismatch {
        field: name.to_string(),
        requested: format!("{} ({})", A::KIND, type_name::<A>()),
        found: found.to_string(),
    }
}

/// Recover the concrete adapter behind `field`.
pub(crate) fn downcast_adapter<'a, A: FieldAdapter, F: FieldExchange + ?Sized>(
    field: &'a F,
) -> Result<&'a A, CouplingError> {
    let found = field.kind();
    if found != A::KIND {
        return Err(kind_mismatch::<A>(field.name(), found));
    }
    field
        .adapter_any()
        .downcast_ref::<A>()
        .ok_or_else(|| kind_mismatch::<A>(field.name(), found))
}

pub(crate) fn downcast_adapter_mut<'a, A: FieldAdapter, F: FieldExchange + ?Sized>(
    field: &'a mut F,
) -> Result<&'a mut A, CouplingError> {
    let found = field.kind();
    if found != A::KIND {
        return Err(kind_mismatch::<A>(field.name(), found));
    }
    let name = field.name().to_string();
    field
        .adapter_any_mut()
        .downcast_mut::<A>()
        .ok_or_else(|| kind_mismatch::<A>(&name, found))
}

/// A field registered with an [`Application`](super::Application), together
/// with its per-field internal field.
pub struct CoupledField {
    model: Box<dyn CoupledFieldConcept>,
    internal: InternalField,
}

impl CoupledField {
    pub(crate) fn new(model: Box<dyn CoupledFieldConcept>, internal: InternalField) -> Self {
        Self { model, internal }
    }

    pub fn name(&self) -> &str {
        self.model.name()
    }

    pub fn kind(&self) -> AdapterKind {
        self.model.kind()
    }

    /// The internal representation of this field, named `<name>.__internal__`.
    pub fn internal(&self) -> &InternalField {
        &self.internal
    }

    pub(crate) fn internal_mut(&mut self) -> &mut InternalField {
        &mut self.internal
    }

    pub fn native_to_internal_options(&self) -> TransferOptions {
        self.model.native_to_internal_options()
    }

    pub fn internal_to_native_options(&self) -> TransferOptions {
        self.model.internal_to_native_options()
    }

    pub fn adapter<A: FieldAdapter>(&self) -> Result<&A, CouplingError> {
        downcast_adapter::<A, _>(&*self.model)
    }

    pub fn adapter_mut<A: FieldAdapter>(&mut self) -> Result<&mut A, CouplingError> {
        downcast_adapter_mut::<A, _>(&mut *self.model)
    }

    pub(crate) fn send(&mut self, mode: SendMode) -> Result<(), CouplingError> {
        self.model.send(mode)
    }

    pub(crate) fn receive(&mut self) -> Result<(), CouplingError> {
        self.model.receive()
    }

    pub(crate) fn flush(&mut self) {
        self.model.flush();
    }

    pub(crate) fn invalidate_layout(&mut self) {
        self.model.invalidate_layout();
    }

    /// Native values → internal field.
    pub(crate) fn sync_native_to_internal(&mut self) -> Result<(), CouplingError> {
        self.model.sync_native_to_internal(&mut self.internal)
    }

    /// Internal field → native values.
    pub(crate) fn sync_internal_to_native(&mut self) -> Result<(), CouplingError> {
        self.model.sync_internal_to_native(&self.internal)
    }
}

impl std::fmt::Debug for CoupledField {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CoupledField")
            .field("name", &self.name())
            .field("kind", &self.kind())
            .field("internal", &self.internal.name())
            .finish()
    }
}
