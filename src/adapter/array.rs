//! Adapter over a plain value array with explicit global numbering.
//!
//! Used by rendezvous-side fields (where the gids come from the internal
//! mesh) and by applications that already carry a global numbering and a
//! per-entity classification.

use std::fmt;

use super::{AdapterKind, FieldAdapter, ReversePartitionMap, check_packed_len};
use crate::coupling_error::CouplingError;
use crate::data::internal_field::Element;
use crate::data::mask::ArrayMask;
use crate::partitioning::Partition;
use crate::topology::entity::{Gid, ModelEnt};

#[derive(Clone)]
pub struct ArrayFieldAdapter<T> {
    name: String,
    gids: Vec<Gid>,
    values: Vec<T>,
    components: usize,
    classification: Option<Vec<ModelEnt>>,
    mask: ArrayMask,
    coords: Option<Vec<f64>>,
}

impl<T: Element> ArrayFieldAdapter<T> {
    /// Wrap `values` (`components` per entity) for the entities `gids`.
    /// Every entity is selected until [`with_mask`](Self::with_mask).
    pub fn new(
        name: impl Into<String>,
        gids: Vec<Gid>,
        values: Vec<T>,
        components: usize,
    ) -> Result<Self, CouplingError> {
        let name = name.into();
        if components == 0 || values.len() != gids.len() * components {
            return Err(CouplingError::InvalidConfig(format!(
                "field `{name}`: {} values for {} entities x {components} components",
                values.len(),
                gids.len()
            )));
        }
        if gids.is_empty() {
            return Err(CouplingError::EmptyOverlap { field: name });
        }
        Ok(Self {
            mask: ArrayMask::all(gids.len()),
            name,
            gids,
            values,
            components,
            classification: None,
            coords: None,
        })
    }

    /// Zero-initialised values for `gids`.
    pub fn zeroed(
        name: impl Into<String>,
        gids: Vec<Gid>,
        components: usize,
    ) -> Result<Self, CouplingError> {
        let values = vec![T::default(); gids.len() * components];
        Self::new(name, gids, values, components)
    }

    /// Model entity of every entity, full-array order.
    pub fn with_classification(mut self, class: Vec<ModelEnt>) -> Result<Self, CouplingError> {
        if class.len() != self.gids.len() {
            return Err(CouplingError::InvalidConfig(format!(
                "field `{}`: {} classification entries for {} entities",
                self.name,
                class.len(),
                self.gids.len()
            )));
        }
        self.classification = Some(class);
        Ok(self)
    }

    /// Restrict the coupled entities to `selected`.
    pub fn with_mask(mut self, selected: &[bool]) -> Result<Self, CouplingError> {
        if selected.len() != self.gids.len() {
            return Err(CouplingError::InvalidConfig(format!(
                "field `{}`: mask of {} entries for {} entities",
                self.name,
                selected.len(),
                self.gids.len()
            )));
        }
        let mask = ArrayMask::new(selected);
        if mask.is_empty() {
            return Err(CouplingError::EmptyOverlap { field: self.name });
        }
        self.mask = mask;
        Ok(self)
    }

    /// Interleaved 2-D coordinates, full-array order.
    pub fn with_coordinates(mut self, coords: Vec<f64>) -> Result<Self, CouplingError> {
        if coords.len() != 2 * self.gids.len() {
            return Err(CouplingError::InvalidConfig(format!(
                "field `{}`: {} coordinates for {} entities",
                self.name,
                coords.len(),
                self.gids.len()
            )));
        }
        self.coords = Some(coords);
        Ok(self)
    }

    pub fn values(&self) -> &[T] {
        &self.values
    }

    pub fn values_mut(&mut self) -> &mut [T] {
        &mut self.values
    }

    pub fn mask(&self) -> &ArrayMask {
        &self.mask
    }
}

impl<T: Element> FieldAdapter for ArrayFieldAdapter<T> {
    type Value = T;
    const KIND: AdapterKind = AdapterKind::Array;

    fn name(&self) -> &str {
        &self.name
    }

    fn components(&self) -> usize {
        self.components
    }

    fn size(&self) -> usize {
        self.mask.size()
    }

    fn gids(&self) -> Vec<Gid> {
        self.mask.selected().map(|i| self.gids[i]).collect()
    }

    fn reverse_partition_map(
        &self,
        partition: &Partition,
    ) -> Result<ReversePartitionMap, CouplingError> {
        let class = self.classification.as_ref().ok_or_else(|| {
            CouplingError::InvalidConfig(format!(
                "field `{}` has no classification to route by",
                self.name
            ))
        })?;
        let mut map = ReversePartitionMap::new();
        for (j, i) in self.mask.selected().enumerate() {
            let ent = class[i];
            map.entry(partition.owner_of(ent.dim, ent.id)?)
                .or_default()
                .push(j);
        }
        Ok(map)
    }

    fn serialize(&self, buffer: &mut [T], permutation: &[usize]) -> Result<usize, CouplingError> {
        let n = self.mask.size();
        if buffer.is_empty() {
            return Ok(n);
        }
        check_packed_len(&self.name, buffer.len(), permutation.len(), n, self.components)?;
        self.mask
            .apply(&self.values, buffer, Some(permutation), self.components)?;
        Ok(n)
    }

    fn deserialize(&mut self, buffer: &[T], permutation: &[usize]) -> Result<(), CouplingError> {
        check_packed_len(
            &self.name,
            buffer.len(),
            permutation.len(),
            self.mask.size(),
            self.components,
        )?;
        self.mask
            .to_full(buffer, &mut self.values, Some(permutation), self.components)
    }

    fn nodal_values(&self) -> Vec<T> {
        let c = self.components;
        self.mask
            .selected()
            .flat_map(|i| self.values[i * c..(i + 1) * c].iter().copied())
            .collect()
    }

    fn set_nodal_values(&mut self, values: &[T]) -> Result<(), CouplingError> {
        if values.len() != self.mask.size() * self.components {
            return Err(CouplingError::InvalidConfig(format!(
                "field `{}`: {} values for {} masked entities x {} components",
                self.name,
                values.len(),
                self.mask.size(),
                self.components
            )));
        }
        self.mask
            .to_full(values, &mut self.values, None, self.components)
    }

    fn nodal_coordinates(&self) -> Option<Vec<f64>> {
        let coords = self.coords.as_ref()?;
        Some(
            self.mask
                .selected()
                .flat_map(|i| [coords[2 * i], coords[2 * i + 1]])
                .collect(),
        )
    }
}

impl<T: fmt::Debug> fmt::Debug for ArrayFieldAdapter<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ArrayFieldAdapter")
            .field("name", &self.name)
            .field("entities", &self.gids.len())
            .field("masked", &self.mask.size())
            .field("components", &self.components)
            .finish()
    }
}
