//! Arena-backed named registries.
//!
//! Slots are never removed, so an issued index stays valid for the life of
//! the session.

use hashbrown::HashMap;

use crate::coupling_error::CouplingError;

/// Index of an application inside a [`CouplerServer`](super::CouplerServer).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ApplicationId(pub(crate) usize);

/// Stable handle of a coupled field: owning application plus slot.
///
/// On the application side `app` is always zero.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct FieldId {
    pub(crate) app: usize,
    pub(crate) index: usize,
}

impl FieldId {
    pub fn application(self) -> ApplicationId {
        ApplicationId(self.app)
    }
}

/// Index of a session-level internal field.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct InternalFieldId(pub(crate) usize);

pub(crate) struct Registry<T> {
    kind: &'static str,
    slots: Vec<T>,
    index: HashMap<String, usize>,
}

impl<T> Registry<T> {
    pub(crate) fn new(kind: &'static str) -> Self {
        Self {
            kind,
            slots: Vec::new(),
            index: HashMap::new(),
        }
    }

    pub(crate) fn len(&self) -> usize {
        self.slots.len()
    }

    pub(crate) fn contains(&self, name: &str) -> bool {
        self.index.contains_key(name)
    }

    fn duplicate(&self, name: &str) -> CouplingError {
        CouplingError::DuplicateName {
            kind: self.kind,
            name: name.to_string(),
        }
    }

    pub(crate) fn insert(&mut self, name: &str, value: T) -> Result<usize, CouplingError> {
        self.try_insert_with(name, || Ok(value))
    }

    /// Build and insert `name`. Nothing is inserted if the name is taken or
    /// `make` fails, and `make` is not called for a taken name.
    pub(crate) fn try_insert_with(
        &mut self,
        name: &str,
        make: impl FnOnce() -> Result<T, CouplingError>,
    ) -> Result<usize, CouplingError> {
        if self.contains(name) {
            return Err(self.duplicate(name));
        }
        let value = make()?;
        let slot = self.slots.len();
        self.slots.push(value);
        self.index.insert(name.to_string(), slot);
        Ok(slot)
    }

    pub(crate) fn id_of(&self, name: &str) -> Result<usize, CouplingError> {
        self.index
            .get(name)
            .copied()
            .ok_or_else(|| CouplingError::UnknownName {
                kind: self.kind,
                name: name.to_string(),
            })
    }

    pub(crate) fn get(&self, slot: usize) -> Result<&T, CouplingError> {
        let kind = self.kind;
        self.slots.get(slot).ok_or_else(|| CouplingError::UnknownName {
            kind,
            name: format!("#{slot}"),
        })
    }

    pub(crate) fn get_mut(&mut self, slot: usize) -> Result<&mut T, CouplingError> {
        let kind = self.kind;
        self.slots
            .get_mut(slot)
            .ok_or_else(|| CouplingError::UnknownName {
                kind,
                name: format!("#{slot}"),
            })
    }

    pub(crate) fn iter(&self) -> impl Iterator<Item = &T> {
        self.slots.iter()
    }

    pub(crate) fn iter_mut(&mut self) -> impl Iterator<Item = &mut T> {
        self.slots.iter_mut()
    }
}
