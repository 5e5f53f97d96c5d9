//! Scatter: one internal field → every target's internal field → native → send.

use super::{FieldId, FieldStore, InternalEntry, InternalFieldId};
use crate::algs::convert::internal_to_internal;
use crate::algs::field_communicator::SendMode;
use crate::coupling_error::CouplingError;

#[derive(Clone, Debug)]
pub struct ScatterOperation {
    name: String,
    source: InternalFieldId,
    targets: Vec<FieldId>,
}

impl ScatterOperation {
    pub(crate) fn new(
        name: impl Into<String>,
        source: InternalFieldId,
        targets: Vec<FieldId>,
    ) -> Self {
        Self {
            name: name.into(),
            source,
            targets,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn source(&self) -> InternalFieldId {
        self.source
    }

    /// Targets in registration order.
    pub fn targets(&self) -> &[FieldId] {
        &self.targets
    }

    pub(crate) fn run(
        &self,
        fields: &mut impl FieldStore,
        source: &InternalEntry,
    ) -> Result<(), CouplingError> {
        if !source.valid {
            return Err(CouplingError::StaleInternalField(
                source.field.name().to_string(),
            ));
        }
        for &id in &self.targets {
            let field = fields.field_mut(id)?;
            let method = field.internal_to_native_options().evaluation_method;
            internal_to_internal(&source.field, field.internal_mut(), method)?;
        }
        for &id in &self.targets {
            let field = fields.field_mut(id)?;
            field.sync_internal_to_native()?;
            field.send(SendMode::Synchronous)?;
        }
        log::debug!(
            "scatter `{}`: `{}` sent to {} targets",
            self.name,
            source.field.name(),
            self.targets.len()
        );
        Ok(())
    }
}
