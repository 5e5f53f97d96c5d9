//! Node classification and its reverse map.
//!
//! A [`NodeClassification`] lists, in the native mesh's canonical iteration
//! order, the model entity every node is classified on. The
//! [`ReverseClassification`] inverts it into `ModelEnt → [node]`, which is what
//! classified field adapters walk when building masks and reverse partitions.

use std::collections::BTreeMap;

use crate::coupling_error::CouplingError;
use crate::topology::entity::ModelEnt;

/// Per-node classification in canonical iteration order.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct NodeClassification {
    pub dimension: Vec<i8>,
    pub geometric_id: Vec<i32>,
}

impl NodeClassification {
    /// Number of classified nodes.
    pub fn len(&self) -> usize {
        self.dimension.len()
    }

    pub fn is_empty(&self) -> bool {
        self.dimension.is_empty()
    }

    /// Model entity of node `i`.
    pub fn model_ent(&self, i: usize) -> Option<ModelEnt> {
        Some(ModelEnt::new(
            *self.dimension.get(i)?,
            *self.geometric_id.get(i)?,
        ))
    }
}

/// `ModelEnt → ordered node list`, iterated in ascending `ModelEnt` order.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ReverseClassification {
    entries: BTreeMap<ModelEnt, Vec<usize>>,
    nverts: usize,
}

impl ReverseClassification {
    pub fn new() -> Self {
        Self::default()
    }

    /// Invert a node classification. Node lists are ascending.
    ///
    /// # Errors
    /// `InvalidConfig` if the dimension and id columns differ in length.
    pub fn from_node_classification(nc: &NodeClassification) -> Result<Self, CouplingError> {
        if nc.dimension.len() != nc.geometric_id.len() {
            return Err(CouplingError::InvalidConfig(format!(
                "classification has {} dimensions but {} ids",
                nc.dimension.len(),
                nc.geometric_id.len()
            )));
        }
        let mut rc = Self::new();
        for (node, (&dim, &id)) in nc.dimension.iter().zip(&nc.geometric_id).enumerate() {
            rc.insert(ModelEnt::new(dim, id), node);
        }
        Ok(rc)
    }

    /// Record that `node` is classified on `ent`.
    pub fn insert(&mut self, ent: ModelEnt, node: usize) {
        self.entries.entry(ent).or_default().push(node);
        self.nverts = self.nverts.max(node + 1);
    }

    /// Nodes classified on `ent`, if any.
    pub fn get(&self, ent: ModelEnt) -> Option<&[usize]> {
        self.entries.get(&ent).map(Vec::as_slice)
    }

    /// One past the largest node index seen.
    pub fn nverts(&self) -> usize {
        self.nverts
    }

    pub fn iter(&self) -> impl Iterator<Item = (ModelEnt, &[usize])> {
        self.entries.iter().map(|(e, v)| (*e, v.as_slice()))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn inverts_in_model_entity_order() {
        let nc = NodeClassification {
            dimension: vec![2, 1, 2, 2, 1],
            geometric_id: vec![5, 3, 5, 4, 3],
        };
        let rc = ReverseClassification::from_node_classification(&nc).unwrap();
        let got: Vec<_> = rc.iter().map(|(e, n)| (e, n.to_vec())).collect();
        assert_eq!(
            got,
            vec![
                (ModelEnt::new(1, 3), vec![1, 4]),
                (ModelEnt::new(2, 4), vec![3]),
                (ModelEnt::new(2, 5), vec![0, 2]),
            ]
        );
        assert_eq!(rc.nverts(), 5);
    }

    #[test]
    fn ragged_columns_rejected() {
        let nc = NodeClassification {
            dimension: vec![2, 1],
            geometric_id: vec![5],
        };
        assert!(ReverseClassification::from_node_classification(&nc).is_err());
    }
}
