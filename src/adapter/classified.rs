//! Adapter for single-rank native meshes numbered implicitly.
//!
//! Every rank of such an application holds the whole native mesh, entities are
//! numbered by their position in the data array, and the overlap region is
//! described by a predicate over the model entities nodes are classified on.

use std::fmt;
use std::sync::Arc;

use super::{AdapterKind, FieldAdapter, ReversePartitionMap, check_packed_len};
use crate::coupling_error::CouplingError;
use crate::data::internal_field::Element;
use crate::data::mask::ArrayMask;
use crate::partitioning::Partition;
use crate::topology::classification::ReverseClassification;
use crate::topology::entity::Gid;

type OverlapFn = Box<dyn Fn(i8, i32) -> bool + Send + Sync>;

pub struct ClassifiedFieldAdapter<T> {
    name: String,
    data: Vec<T>,
    reverse: Arc<ReverseClassification>,
    in_overlap: OverlapFn,
    mask: ArrayMask,
    coords: Option<Vec<f64>>,
}

impl<T: Element> ClassifiedFieldAdapter<T> {
    /// Wrap `data` (one scalar per node, canonical order).
    ///
    /// Nodes classified on a model entity for which `in_overlap` holds are
    /// selected by the mask.
    ///
    /// # Errors
    /// - `EntityOutOfRange` if the classification names a node past `data`.
    /// - `InvalidConfig` if a selected node is classified twice.
    /// - `EmptyOverlap` if nothing is selected.
    pub fn new(
        name: impl Into<String>,
        data: Vec<T>,
        reverse: Arc<ReverseClassification>,
        in_overlap: impl Fn(i8, i32) -> bool + Send + Sync + 'static,
    ) -> Result<Self, CouplingError> {
        let name = name.into();
        let mut selected = vec![false; data.len()];
        for (ent, nodes) in reverse.iter() {
            if !in_overlap(ent.dim, ent.id) {
                continue;
            }
            for &node in nodes {
                let slot = selected
                    .get_mut(node)
                    .ok_or_else(|| CouplingError::EntityOutOfRange {
                        field: name.clone(),
                        index: node,
                        len: data.len(),
                    })?;
                if *slot {
                    return Err(CouplingError::InvalidConfig(format!(
                        "field `{name}`: node {node} is classified more than once"
                    )));
                }
                *slot = true;
            }
        }
        let mask = ArrayMask::new(&selected);
        if mask.is_empty() {
            return Err(CouplingError::EmptyOverlap { field: name });
        }
        log::debug!(
            "classified adapter `{name}`: {} of {} nodes in overlap",
            mask.size(),
            data.len()
        );
        Ok(Self {
            name,
            data,
            reverse,
            in_overlap: Box::new(in_overlap),
            mask,
            coords: None,
        })
    }

    /// Attach interleaved 2-D node coordinates (full array).
    pub fn with_coordinates(mut self, coords: Vec<f64>) -> Result<Self, CouplingError> {
        if coords.len() != 2 * self.data.len() {
            return Err(CouplingError::InvalidConfig(format!(
                "field `{}`: {} coordinates for {} nodes",
                self.name,
                coords.len(),
                self.data.len()
            )));
        }
        self.coords = Some(coords);
        Ok(self)
    }

    pub fn data(&self) -> &[T] {
        &self.data
    }

    pub fn data_mut(&mut self) -> &mut [T] {
        &mut self.data
    }

    pub fn into_data(self) -> Vec<T> {
        self.data
    }

    pub fn mask(&self) -> &ArrayMask {
        &self.mask
    }
}

impl<T: Element> FieldAdapter for ClassifiedFieldAdapter<T> {
    type Value = T;
    const KIND: AdapterKind = AdapterKind::Classified;

    fn name(&self) -> &str {
        &self.name
    }

    fn size(&self) -> usize {
        self.mask.size()
    }

    /// Nodes are numbered by position, so a node's gid is its full index.
    fn gids(&self) -> Vec<Gid> {
        self.mask.selected().map(|i| i as Gid).collect()
    }

    fn reverse_partition_map(
        &self,
        partition: &Partition,
    ) -> Result<ReversePartitionMap, CouplingError> {
        let mut map = ReversePartitionMap::new();
        for (ent, nodes) in self.reverse.iter() {
            if !(self.in_overlap)(ent.dim, ent.id) {
                continue;
            }
            let rank = partition.owner_of(ent.dim, ent.id)?;
            let bucket = map.entry(rank).or_default();
            for &node in nodes {
                let idx = self.mask.masked_index(node).ok_or_else(|| {
                    CouplingError::InconsistentLayout {
                        field: self.name.clone(),
                        message: format!("node {node} of {ent} is not masked"),
                    }
                })?;
                bucket.push(idx);
            }
        }
        Ok(map)
    }

    fn serialize(&self, buffer: &mut [T], permutation: &[usize]) -> Result<usize, CouplingError> {
        if buffer.is_empty() {
            return Ok(self.mask.size());
        }
        check_packed_len(&self.name, buffer.len(), permutation.len(), self.mask.size(), 1)?;
        self.mask.apply(&self.data, buffer, Some(permutation), 1)?;
        Ok(self.mask.size())
    }

    fn deserialize(&mut self, buffer: &[T], permutation: &[usize]) -> Result<(), CouplingError> {
        check_packed_len(&self.name, buffer.len(), permutation.len(), self.mask.size(), 1)?;
        self.mask.to_full(buffer, &mut self.data, Some(permutation), 1)
    }

    fn nodal_values(&self) -> Vec<T> {
        self.mask.selected().map(|i| self.data[i]).collect()
    }

    fn set_nodal_values(&mut self, values: &[T]) -> Result<(), CouplingError> {
        if values.len() != self.mask.size() {
            return Err(CouplingError::InvalidConfig(format!(
                "field `{}`: {} values for {} masked nodes",
                self.name,
                values.len(),
                self.mask.size()
            )));
        }
        self.mask.to_full(values, &mut self.data, None, 1)
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

impl<T: fmt::Debug> fmt::Debug for ClassifiedFieldAdapter<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClassifiedFieldAdapter")
            .field("name", &self.name)
            .field("len", &self.data.len())
            .field("masked", &self.mask.size())
            .finish()
    }
}
