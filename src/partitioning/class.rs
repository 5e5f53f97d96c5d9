//! Classification-based rendezvous partition.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use super::error::PartitionError;
use crate::topology::entity::ModelEnt;

/// Routes a model entity to the rendezvous rank that owns it.
///
/// Serialized as the `(ranks, ents)` column pair so a partition produced by
/// the rendezvous side can be shipped to applications as plain data.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "ClassPartitionTable", into = "ClassPartitionTable")]
pub struct ClassPartition {
    owner: BTreeMap<ModelEnt, usize>,
}

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
struct ClassPartitionTable {
    ranks: Vec<usize>,
    ents: Vec<ModelEnt>,
}

impl ClassPartition {
    /// Build from parallel `ranks[i] ↔ ents[i]` columns.
    ///
    /// # Errors
    /// - `RaggedTable` if the columns differ in length.
    /// - `ConflictingOwner` if an entity is listed under two ranks.
    pub fn new(ranks: Vec<usize>, ents: Vec<ModelEnt>) -> Result<Self, PartitionError> {
        if ranks.len() != ents.len() {
            return Err(PartitionError::RaggedTable {
                ranks: ranks.len(),
                ents: ents.len(),
            });
        }
        let mut owner = BTreeMap::new();
        for (rank, ent) in ranks.into_iter().zip(ents) {
            if let Some(prev) = owner.insert(ent, rank) {
                if prev != rank {
                    return Err(PartitionError::ConflictingOwner(ent, prev, rank));
                }
            }
        }
        Ok(Self { owner })
    }

    /// Owning rank of `ent`.
    pub fn rank_of(&self, ent: ModelEnt) -> Result<usize, PartitionError> {
        self.owner
            .get(&ent)
            .copied()
            .ok_or(PartitionError::UnknownEntity(ent))
    }

    /// Distinct ranks, ascending.
    pub fn ranks(&self) -> Vec<usize> {
        let mut r: Vec<usize> = self.owner.values().copied().collect();
        r.sort_unstable();
        r.dedup();
        r
    }

    /// Model entities owned by `rank`, ascending.
    pub fn ents_of(&self, rank: usize) -> impl Iterator<Item = ModelEnt> + '_ {
        self.owner
            .iter()
            .filter(move |&(_, &r)| r == rank)
            .map(|(e, _)| *e)
    }

    pub fn len(&self) -> usize {
        self.owner.len()
    }

    pub fn is_empty(&self) -> bool {
        self.owner.is_empty()
    }
}

impl TryFrom<ClassPartitionTable> for ClassPartition {
    type Error = PartitionError;

    fn try_from(t: ClassPartitionTable) -> Result<Self, Self::Error> {
        ClassPartition::new(t.ranks, t.ents)
    }
}

impl From<ClassPartition> for ClassPartitionTable {
    fn from(p: ClassPartition) -> Self {
        let (ents, ranks) = p.owner.into_iter().unzip();
        ClassPartitionTable { ranks, ents }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ptn() -> ClassPartition {
        ClassPartition::new(
            vec![0, 1, 1],
            vec![ModelEnt::new(2, 1), ModelEnt::new(2, 2), ModelEnt::new(1, 7)],
        )
        .unwrap()
    }

    #[test]
    fn lookup_and_ranks() {
        let p = ptn();
        assert_eq!(p.rank_of(ModelEnt::new(2, 2)), Ok(1));
        assert_eq!(p.rank_of(ModelEnt::new(2, 1)), Ok(0));
        assert_eq!(p.ranks(), vec![0, 1]);
        let owned: Vec<_> = p.ents_of(1).collect();
        assert_eq!(owned, vec![ModelEnt::new(1, 7), ModelEnt::new(2, 2)]);
    }

    #[test]
    fn unknown_entity_is_an_error() {
        assert_eq!(
            ptn().rank_of(ModelEnt::new(0, 3)),
            Err(PartitionError::UnknownEntity(ModelEnt::new(0, 3)))
        );
    }

    #[test]
    fn conflicting_owner_rejected() {
        let err = ClassPartition::new(
            vec![0, 1],
            vec![ModelEnt::new(2, 1), ModelEnt::new(2, 1)],
        )
        .unwrap_err();
        assert_eq!(err, PartitionError::ConflictingOwner(ModelEnt::new(2, 1), 0, 1));
    }

    #[test]
    fn serde_round_trip_through_table() {
        let p = ptn();
        let json = serde_json::to_string(&p).unwrap();
        assert!(json.contains("\"ranks\""));
        let back: ClassPartition = serde_json::from_str(&json).unwrap();
        assert_eq!(back, p);
    }

    #[test]
    fn serde_rejects_ragged_table() {
        let json = r#"{"ranks":[0,1],"ents":[{"dim":2,"id":1}]}"#;
        assert!(serde_json::from_str::<ClassPartition>(json).is_err());
    }
}
