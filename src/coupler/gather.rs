//! Gather: N native fields → N internal fields → one combined internal field.

use super::{CoupledField, FieldId, FieldStore, InternalEntry, InternalFieldId};
use crate::algs::combine::CombinerFunction;
use crate::coupling_error::CouplingError;
use crate::data::internal_field::InternalField;

pub struct GatherOperation {
    name: String,
    sources: Vec<FieldId>,
    target: InternalFieldId,
    combiner: CombinerFunction,
}

impl GatherOperation {
    pub(crate) fn new(
        name: impl Into<String>,
        sources: Vec<FieldId>,
        target: InternalFieldId,
        combiner: CombinerFunction,
    ) -> Self {
        Self {
            name: name.into(),
            sources,
            target,
            combiner,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Sources in registration order.
    pub fn sources(&self) -> &[FieldId] {
        &self.sources
    }

    pub fn target(&self) -> InternalFieldId {
        self.target
    }

    /// Receive every source, convert it to its internal field, then combine.
    ///
    /// The target is marked invalid until the whole run succeeds.
    pub(crate) fn run(
        &mut self,
        fields: &mut impl FieldStore,
        target: &mut InternalEntry,
    ) -> Result<(), CouplingError> {
        target.valid = false;
        for &id in &self.sources {
            let field = fields.field_mut(id)?;
            field.receive()?;
            field.sync_native_to_internal()?;
        }
        let view = &*fields;
        let inputs = self
            .sources
            .iter()
            .map(|&id| view.field(id).map(CoupledField::internal))
            .collect::<Result<Vec<&InternalField>, _>>()?;
        (self.combiner)(&inputs, &mut target.field)?;
        target.valid = true;
        log::debug!(
            "gather `{}`: combined {} sources into `{}`",
            self.name,
            inputs.len(),
            target.field.name()
        );
        Ok(())
    }
}

impl std::fmt::Debug for GatherOperation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GatherOperation")
            .field("name", &self.name)
            .field("sources", &self.sources)
            .field("target", &self.target)
            .finish_non_exhaustive()
    }
}
