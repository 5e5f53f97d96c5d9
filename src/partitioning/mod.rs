//! Partition oracle: which rendezvous rank owns a mesh entity.
//!
//! A [`Partition`] is an immutable description of the rendezvous
//! decomposition. [`Partition::owner_of`] is a pure function of it. Only the
//! classification variant can route classified entities; the geometric variant
//! answers point queries and refuses entity queries outright so data is never
//! routed by a guess.

pub mod class;
pub mod error;
pub mod rcb;

pub use class::ClassPartition;
pub use error::PartitionError;
pub use rcb::RcbPartition;

use serde::{Deserialize, Serialize};

use crate::topology::entity::ModelEnt;

/// The rendezvous decomposition shared by all participants.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Partition {
    Class(ClassPartition),
    Rcb(RcbPartition),
}

impl Partition {
    /// Owning rank of the mesh entity classified on `(dim, id)`.
    ///
    /// # Errors
    /// - `UnknownEntity` if a classification partition has no entry.
    /// - `Unsupported` for the bisection partition.
    pub fn owner_of(&self, dim: i8, id: i32) -> Result<usize, PartitionError> {
        match self {
            Partition::Class(p) => p.rank_of(ModelEnt::new(dim, id)),
            Partition::Rcb(_) => {
                log::error!("RCB partition reached a classification lookup for ({dim}, {id})");
                Err(PartitionError::Unsupported("recursive coordinate bisection"))
            }
        }
    }

    /// Distinct rendezvous ranks, ascending.
    pub fn ranks(&self) -> Vec<usize> {
        match self {
            Partition::Class(p) => p.ranks(),
            Partition::Rcb(p) => p.ranks(),
        }
    }

    /// Short name used in diagnostics.
    pub fn kind(&self) -> &'static str {
        match self {
            Partition::Class(_) => "classification",
            Partition::Rcb(_) => "rcb",
        }
    }
}

impl From<ClassPartition> for Partition {
    fn from(p: ClassPartition) -> Self {
        Partition::Class(p)
    }
}

impl From<RcbPartition> for Partition {
    fn from(p: RcbPartition) -> Self {
        Partition::Rcb(p)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn class_partition_routes_entities() {
        let p: Partition = ClassPartition::new(vec![0, 1], vec![(2, 5).into(), (2, 6).into()])
            .unwrap()
            .into();
        assert_eq!(p.owner_of(2, 5), Ok(0));
        assert_eq!(p.owner_of(2, 6), Ok(1));
        assert_eq!(p.ranks(), vec![0, 1]);
    }

    #[test]
    fn rcb_refuses_entity_routing() {
        let p: Partition = RcbPartition::new(2, vec![0, 1], vec![0.0, 0.5]).unwrap().into();
        assert_eq!(
            p.owner_of(2, 5),
            Err(PartitionError::Unsupported("recursive coordinate bisection"))
        );
    }

    #[test]
    fn tagged_json() {
        let json = r#"{"kind":"class","ranks":[1,0],"ents":[{"dim":2,"id":1},{"dim":2,"id":2}]}"#;
        let p: Partition = serde_json::from_str(json).unwrap();
        assert_eq!(p.owner_of(2, 1), Ok(1));
        assert_eq!(p.kind(), "classification");
    }

    #[test]
    fn tagged_json_rejects_malformed_rcb() {
        let json = r#"{"kind":"rcb","dim":2,"ranks":[0,1],"cuts":[]}"#;
        assert!(serde_json::from_str::<Partition>(json).is_err());

        let json = r#"{"kind":"rcb","dim":2,"ranks":[0,1],"cuts":[0.0,0.5]}"#;
        let p: Partition = serde_json::from_str(json).unwrap();
        assert_eq!(p.ranks(), vec![0, 1]);
    }
}
