//! Partitioning errors for mesh-coupler

use crate::topology::entity::ModelEnt;
use thiserror::Error;

/// Errors from partition construction and owner lookup
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum PartitionError {
    /// The classification table has no entry for this model entity
    #[error("no rendezvous rank owns model entity {0}")]
    UnknownEntity(ModelEnt),
    /// The rank and entity columns of a classification table differ in length
    #[error("partition table has {ranks} ranks but {ents} model entities")]
    RaggedTable { ranks: usize, ents: usize },
    /// A model entity was assigned to two ranks
    #[error("model entity {0} assigned to ranks {1} and {2}")]
    ConflictingOwner(ModelEnt, usize, usize),
    /// Bisection tree does not match its rank list
    #[error("bisection tree: {0}")]
    MalformedTree(String),
    /// Coordinate dimension does not match the partition
    #[error("expected a {expected}-d point, got {found}-d")]
    DimensionMismatch { expected: usize, found: usize },
    /// The partition kind cannot answer this query
    #[error("{0} partition cannot route classified entities")]
    Unsupported(&'static str),
}
