//! CouplingError: Unified error type for mesh-coupler public APIs
//!
//! Every detected inconsistency surfaces as a `CouplingError`. Nothing in the
//! engine retries or degrades silently: the caller receives the error, and no
//! registry or cached layout is left half-updated.

use crate::data::internal_field::ElementType;
use crate::partitioning::error::PartitionError;
use crate::topology::entity::Gid;
use thiserror::Error;

/// Coarse classification of a [`CouplingError`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ErrorCategory {
    /// Setup bug detected eagerly (registration, adapter construction, config).
    Configuration,
    /// The two coupled sides disagree about partition, mask or phase state.
    Protocol,
    /// Surfaced from the underlying channel; never interpreted or retried.
    Transport,
}

/// Unified error type for coupling operations.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum CouplingError {
    // ----- configuration --------------------------------------------------
    /// An overlap mask selected no entities.
    #[error("field `{field}`: overlap mask selects zero entities")]
    EmptyOverlap { field: String },
    /// A classification entry references an entity beyond the data array.
    #[error("field `{field}`: entity index {index} out of range (len {len})")]
    EntityOutOfRange {
        field: String,
        index: usize,
        len: usize,
    },
    /// A named object was registered twice.
    #[error("{kind} with name `{name}` already exists")]
    DuplicateName { kind: &'static str, name: String },
    /// Two fields on the same channel hash to the same message tag.
    #[error("field `{name}` collides with `{other}` on message tag {tag:#06x}")]
    DuplicateTag {
        name: String,
        other: String,
        tag: u16,
    },
    /// Lookup of a name or id that was never registered.
    #[error("no {kind} named `{name}`")]
    UnknownName { kind: &'static str, name: String },
    /// An internal field exists with a different element type.
    #[error("internal field `{name}`: expected {expected:?}, found {found:?}")]
    ElementTypeMismatch {
        name: String,
        expected: ElementType,
        found: ElementType,
    },
    /// Fields with different values-per-entity were wired together.
    #[error("shape mismatch on `{name}`: {expected} components vs {found}")]
    ShapeMismatch {
        name: String,
        expected: usize,
        found: usize,
    },
    /// Two fields that must share the internal mesh do not.
    #[error("internal field `{0}` is not attached to the session mesh")]
    MeshMismatch(String),
    /// A concrete adapter was requested under the wrong adapter tag.
    #[error("field `{field}` holds a {found} adapter, not {requested}")]
    AdapterKindMismatch {
        field: String,
        requested: String,
        found: String,
    },
    /// Invalid mesh, mask, or layout description.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
    /// Input stream could not be parsed.
    #[error("parse error on line {line}: {message}")]
    Parse { line: usize, message: String },
    /// Partition oracle failure.
    #[error(transparent)]
    Partition(#[from] PartitionError),
    /// Evaluation method or path that is not available for this source.
    #[error("unsupported operation: {0}")]
    Unsupported(String),

    // ----- numerical -------------------------------------------------------
    /// Value cannot be represented in the destination element type.
    #[error("cannot convert {value} from {from:?} to {to:?}")]
    NumericConversion {
        value: String,
        from: ElementType,
        to: ElementType,
    },
    /// Interpolation target lies outside every source cell.
    #[error("point ({x}, {y}) lies outside the source mesh")]
    PointOutsideMesh { x: f64, y: f64 },
    /// Scatter requested from an internal field whose last gather failed.
    #[error("internal field `{0}` is stale after a failed gather")]
    StaleInternalField(String),

    // ----- protocol --------------------------------------------------------
    /// Inbound message size disagrees with the cached permutation.
    #[error("field `{field}`: peer {peer} sent {found} entities, expected {expected}")]
    SizeMismatch {
        field: String,
        peer: usize,
        expected: usize,
        found: usize,
    },
    /// Send attempted outside of the send phase.
    #[error("field `{0}`: send attempted outside the send phase")]
    NotInSendPhase(String),
    /// Receive attempted outside of the receive phase.
    #[error("field `{0}`: receive attempted outside the receive phase")]
    NotInReceivePhase(String),
    /// Phase transitions out of order.
    #[error("invalid phase transition: {0}")]
    PhaseTransition(String),
    /// A peer referenced a gid this side does not own.
    #[error("field `{field}`: gid {gid} is not in the local overlap")]
    UnknownGid { field: String, gid: Gid },
    /// A gid appeared twice while building a layout.
    #[error("field `{field}`: gid {gid} received more than once")]
    DuplicateGid { field: String, gid: Gid },
    /// Frame header does not match what this side expects.
    #[error("field `{field}`: malformed frame from peer {peer}: {message}")]
    MalformedFrame {
        field: String,
        peer: usize,
        message: String,
    },
    /// Layout or permutation disagrees with the adapter's masked state.
    #[error("field `{field}`: inconsistent layout: {message}")]
    InconsistentLayout { field: String, message: String },

    // ----- transport -------------------------------------------------------
    /// Communication failure from the underlying channel.
    #[error("communication error with rank {neighbor}: {message}")]
    CommError { neighbor: usize, message: String },
}

impl CouplingError {
    /// Classify this error into the three coupling error families.
    pub fn category(&self) -> ErrorCategory {
        use CouplingError::*;
        match self {
            SizeMismatch { .. }
            | NotInSendPhase(_)
            | NotInReceivePhase(_)
            | PhaseTransition(_)
            | UnknownGid { .. }
            | DuplicateGid { .. }
            | MalformedFrame { .. }
            | InconsistentLayout { .. }
            | StaleInternalField(_) => ErrorCategory::Protocol,
            CommError { .. } => ErrorCategory::Transport,
            _ => ErrorCategory::Configuration,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn categories() {
        let e = CouplingError::SizeMismatch {
            field: "f".into(),
            peer: 1,
            expected: 3,
            found: 2,
        };
        assert_eq!(e.category(), ErrorCategory::Protocol);
        let e = CouplingError::CommError {
            neighbor: 0,
            message: "timeout".into(),
        };
        assert_eq!(e.category(), ErrorCategory::Transport);
        let e = CouplingError::EmptyOverlap { field: "f".into() };
        assert_eq!(e.category(), ErrorCategory::Configuration);
    }

    #[test]
    fn partition_errors_convert() {
        let e: CouplingError = PartitionError::Unsupported("rcb").into();
        assert_eq!(e.category(), ErrorCategory::Configuration);
        assert!(e.to_string().contains("rcb"));
    }
}
