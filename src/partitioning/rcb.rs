//! Recursive coordinate bisection partition.
//!
//! The cut tree is stored in heap order: `cuts[1]` is the root, node `i` has
//! children `2i` (coordinate below the cut) and `2i + 1`. `cuts[0]` is unused.
//! Leaves `n..2n` map to `ranks[leaf - n]`, so the rank count must be a power
//! of two and `cuts.len() == ranks.len()`.

use serde::{Deserialize, Serialize};

use super::error::PartitionError;

/// Deserialized through [`RcbPartition::new`], so a loaded tree is as
/// well-formed as a constructed one.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "RcbPartitionTable", into = "RcbPartitionTable")]
pub struct RcbPartition {
    dim: usize,
    ranks: Vec<usize>,
    cuts: Vec<f64>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
struct RcbPartitionTable {
    dim: usize,
    ranks: Vec<usize>,
    cuts: Vec<f64>,
}

impl RcbPartition {
    pub fn new(dim: usize, ranks: Vec<usize>, cuts: Vec<f64>) -> Result<Self, PartitionError> {
        if dim == 0 {
            return Err(PartitionError::MalformedTree("dimension must be positive".into()));
        }
        if ranks.is_empty() || !ranks.len().is_power_of_two() {
            return Err(PartitionError::MalformedTree(format!(
                "rank count {} is not a power of two",
                ranks.len()
            )));
        }
        if cuts.len() != ranks.len() {
            return Err(PartitionError::MalformedTree(format!(
                "{} cuts for {} ranks",
                cuts.len(),
                ranks.len()
            )));
        }
        Ok(Self { dim, ranks, cuts })
    }

    pub fn dim(&self) -> usize {
        self.dim
    }

    /// Distinct ranks, ascending.
    pub fn ranks(&self) -> Vec<usize> {
        let mut r = self.ranks.clone();
        r.sort_unstable();
        r.dedup();
        r
    }

    /// Rank owning the region containing `point`.
    pub fn rank_of_point(&self, point: &[f64]) -> Result<usize, PartitionError> {
        if point.len() != self.dim {
            return Err(PartitionError::DimensionMismatch {
                expected: self.dim,
                found: point.len(),
            });
        }
        let levels = self.ranks.len().trailing_zeros();
        let mut idx = 1usize;
        let mut d = 0usize;
        for _ in 0..levels {
            idx = if point[d] < self.cuts[idx] {
                2 * idx
            } else {
                2 * idx + 1
            };
            d = (d + 1) % self.dim;
        }
        Ok(self.ranks[idx - self.ranks.len()])
    }
}

impl TryFrom<RcbPartitionTable> for RcbPartition {
    type Error = PartitionError;

    fn try_from(t: RcbPartitionTable) -> Result<Self, Self::Error> {
        RcbPartition::new(t.dim, t.ranks, t.cuts)
    }
}

impl From<RcbPartition> for RcbPartitionTable {
    fn from(p: RcbPartition) -> Self {
        RcbPartitionTable {
            dim: p.dim,
            ranks: p.ranks,
            cuts: p.cuts,
        }
    }
}
