//! Field adapters: the capability contract native applications implement.
//!
//! An adapter owns (or views) one native field and knows how the native mesh
//! numbers, classifies and masks its entities. The engine never looks inside
//! native storage; it only asks the adapter to
//!
//! - report the global ids of the masked entities in canonical masked order,
//! - bucket masked entities by owning rendezvous rank,
//! - pack masked values into a permuted buffer and unpack them again.
//!
//! Nodal value and coordinate access are used by native ↔ internal
//! conversion.

pub mod array;
pub mod classified;

pub use array::ArrayFieldAdapter;
pub use classified::ClassifiedFieldAdapter;

use std::any::Any;
use std::collections::BTreeMap;
use std::fmt;

use crate::coupling_error::CouplingError;
use crate::data::internal_field::Element;
use crate::partitioning::Partition;
use crate::topology::entity::Gid;

/// Explicit tag used to recover a concrete adapter from a type-erased field.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum AdapterKind {
    /// [`ClassifiedFieldAdapter`].
    Classified,
    /// [`ArrayFieldAdapter`].
    Array,
    /// Adapter defined outside this crate.
    Custom(&'static str),
}

impl fmt::Display for AdapterKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AdapterKind::Classified => f.write_str("classified"),
            AdapterKind::Array => f.write_str("array"),
            AdapterKind::Custom(name) => write!(f, "custom:{name}"),
        }
    }
}

/// Rank → masked local indices, ascending rank.
pub type ReversePartitionMap = BTreeMap<usize, Vec<usize>>;

/// Capability interface of a native field.
///
/// All index arguments are 0-based masked indices: position `j` names the
/// `j`-th selected entity in ascending full-array order. A permutation maps
/// masked index → entity slot in a packed buffer; every entity occupies
/// [`components`](FieldAdapter::components) consecutive values.
pub trait FieldAdapter: Any {
    /// Element type of the native values.
    type Value: Element;

    /// Tag identifying the concrete adapter type.
    const KIND: AdapterKind;

    fn name(&self) -> &str;

    /// Values per entity.
    fn components(&self) -> usize {
        1
    }

    /// Number of masked entities.
    fn size(&self) -> usize;

    /// Global ids of the masked entities, in masked order.
    fn gids(&self) -> Vec<Gid>;

    /// Bucket every masked index under the rendezvous rank that owns it.
    fn reverse_partition_map(
        &self,
        partition: &Partition,
    ) -> Result<ReversePartitionMap, CouplingError>;

    /// Pack the masked values into `buffer` following `permutation`.
    ///
    /// An empty `buffer` is a sizing query: nothing is written and the masked
    /// entity count is still returned.
    fn serialize(
        &self,
        buffer: &mut [Self::Value],
        permutation: &[usize],
    ) -> Result<usize, CouplingError>;

    /// Unpack `buffer` into the masked positions of the native storage.
    fn deserialize(
        &mut self,
        buffer: &[Self::Value],
        permutation: &[usize],
    ) -> Result<(), CouplingError>;

    /// Masked values in masked order.
    fn nodal_values(&self) -> Vec<Self::Value>;

    /// Overwrite the masked values from a masked-order slice.
    fn set_nodal_values(&mut self, values: &[Self::Value]) -> Result<(), CouplingError>;

    /// Interleaved 2-D coordinates of the masked entities, if known.
    fn nodal_coordinates(&self) -> Option<Vec<f64>> {
        None
    }

    fn kind(&self) -> AdapterKind {
        Self::KIND
    }
}

/// Shared checks for adapters backed by a full native array plus a mask.
pub(crate) fn check_packed_len(
    field: &str,
    buffer: usize,
    permutation: usize,
    size: usize,
    components: usize,
) -> Result<(), CouplingError> {
    if permutation != size || buffer != size * components {
        return Err(CouplingError::InconsistentLayout {
            field: field.to_string(),
            message: format!(
                "buffer of {buffer} values and permutation of {permutation} entries \
                 for {size} masked entities x {components} components"
            ),
        });
    }
    Ok(())
}
