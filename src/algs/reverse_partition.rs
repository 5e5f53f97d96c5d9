//! Exchange layouts derived from reverse partition maps and gid frames.
//!
//! A layout fixes, for one field on one side of a channel, the ordered peer
//! list, the exclusive prefix sum of per-peer entity counts and the
//! permutation `masked index → entity slot` used to pack and unpack buffers.
//! Layouts are computed once and cached by the field communicator.

use hashbrown::HashMap;
use itertools::Itertools;

use crate::adapter::ReversePartitionMap;
use crate::coupling_error::CouplingError;
use crate::topology::entity::Gid;

const UNSET: usize = usize::MAX;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ExchangeLayout {
    /// Peers in exchange order.
    pub peers: Vec<usize>,
    /// Entity offsets, `peers.len() + 1` entries.
    pub offsets: Vec<usize>,
    /// `permutation[masked index] = entity slot`.
    pub permutation: Vec<usize>,
}

impl ExchangeLayout {
    /// Total number of entities exchanged.
    pub fn count(&self) -> usize {
        self.offsets.last().copied().unwrap_or(0)
    }

    /// `(peer, entity range)` in exchange order.
    pub fn ranges(&self) -> impl Iterator<Item = (usize, std::ops::Range<usize>)> + '_ {
        self.peers
            .iter()
            .zip(self.offsets.iter().tuple_windows())
            .map(|(&p, (&a, &b))| (p, a..b))
    }

    /// Offsets scaled to element units.
    pub fn element_offsets(&self, components: usize) -> Vec<usize> {
        self.offsets.iter().map(|o| o * components).collect()
    }
}

/// `[0, c0, c0 + c1, ...]`.
pub fn exclusive_scan(counts: impl IntoIterator<Item = usize>) -> Vec<usize> {
    std::iter::once(0)
        .chain(counts.into_iter().scan(0, |acc, c| {
            *acc += c;
            Some(*acc)
        }))
        .collect()
}

fn inconsistent(field: &str, message: String) -> CouplingError {
    CouplingError::InconsistentLayout {
        field: field.to_string(),
        message,
    }
}

/// Application-side layout: one destination per partition rank (ascending,
/// empty destinations included), entities in reverse-map order.
///
/// # Errors
/// `InconsistentLayout` if the map names a rank outside `ranks`, repeats a
/// masked index, or does not cover all `size` masked entities.
pub fn client_layout(
    field: &str,
    map: &ReversePartitionMap,
    ranks: &[usize],
    size: usize,
) -> Result<ExchangeLayout, CouplingError> {
    if let Some(r) = map.keys().find(|r| !ranks.contains(r)) {
        return Err(inconsistent(
            field,
            format!("rank {r} is not part of the rendezvous partition"),
        ));
    }
    let offsets = exclusive_scan(ranks.iter().map(|r| map.get(r).map_or(0, Vec::len)));
    let mut permutation = vec![UNSET; size];
    for (rank, &start) in ranks.iter().zip(&offsets) {
        let Some(indices) = map.get(rank) else {
            continue;
        };
        for (slot, &idx) in (start..).zip(indices) {
            match permutation.get_mut(idx) {
                Some(p) if *p == UNSET => *p = slot,
                Some(_) => {
                    return Err(inconsistent(
                        field,
                        format!("masked index {idx} routed twice"),
                    ));
                }
                None => {
                    return Err(inconsistent(
                        field,
                        format!("masked index {idx} beyond {size} entities"),
                    ));
                }
            }
        }
    }
    let layout = ExchangeLayout {
        peers: ranks.to_vec(),
        offsets,
        permutation,
    };
    if layout.count() != size {
        return Err(inconsistent(
            field,
            format!("reverse map covers {} of {size} masked entities", layout.count()),
        ));
    }
    Ok(layout)
}

/// Rendezvous-side layout from the gid frames of every application rank,
/// given in ascending source order.
///
/// # Errors
/// - `UnknownGid` if a received gid is not among `local_gids`.
/// - `DuplicateGid` if a gid arrives twice.
/// - `InconsistentLayout` if the total differs from `local_gids.len()`.
pub fn server_layout(
    field: &str,
    local_gids: &[Gid],
    received: &[(usize, Vec<Gid>)],
) -> Result<ExchangeLayout, CouplingError> {
    let offsets = exclusive_scan(received.iter().map(|(_, g)| g.len()));
    let total = offsets.last().copied().unwrap_or(0);
    if total != local_gids.len() {
        return Err(inconsistent(
            field,
            format!(
                "received {total} gids for {} masked entities",
                local_gids.len()
            ),
        ));
    }
    let index: HashMap<Gid, usize> = local_gids
        .iter()
        .enumerate()
        .map(|(i, &g)| (g, i))
        .collect();
    let mut permutation = vec![UNSET; local_gids.len()];
    let incoming = received.iter().flat_map(|(_, g)| g.iter().copied());
    for (slot, gid) in incoming.enumerate() {
        let idx = *index.get(&gid).ok_or_else(|| CouplingError::UnknownGid {
            field: field.to_string(),
            gid,
        })?;
        if permutation[idx] != UNSET {
            return Err(CouplingError::DuplicateGid {
                field: field.to_string(),
                gid,
            });
        }
        permutation[idx] = slot;
    }
    Ok(ExchangeLayout {
        peers: received.iter().map(|(p, _)| *p).collect(),
        offsets,
        permutation,
    })
}
