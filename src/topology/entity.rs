//! Entity identifiers shared by every participant of a coupling.
//!
//! A mesh entity is known to the engine through two handles:
//! - its [`Gid`], a process-global integer that is stable across the native
//!   application and the rendezvous mesh, and
//! - the [`ModelEnt`] it is classified on, i.e. the `(dim, id)` of the
//!   geometric model entity that owns it. Classification-based partitions
//!   route entities by their `ModelEnt`.

use std::fmt;

/// Global entity identifier.
pub type Gid = u64;

/// Geometric model entity `(dimension, id)` a mesh entity is classified on.
#[derive(
    Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, serde::Serialize, serde::Deserialize,
)]
pub struct ModelEnt {
    pub dim: i8,
    pub id: i32,
}

impl ModelEnt {
    #[inline]
    pub const fn new(dim: i8, id: i32) -> Self {
        Self { dim, id }
    }
}

impl fmt::Debug for ModelEnt {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ModelEnt({}, {})", self.dim, self.id)
    }
}

impl fmt::Display for ModelEnt {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}, {})", self.dim, self.id)
    }
}

impl From<(i8, i32)> for ModelEnt {
    fn from((dim, id): (i8, i32)) -> Self {
        Self { dim, id }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ordering_is_dim_then_id() {
        let mut v = vec![ModelEnt::new(2, 1), ModelEnt::new(1, 9), ModelEnt::new(2, 0)];
        v.sort();
        assert_eq!(
            v,
            vec![ModelEnt::new(1, 9), ModelEnt::new(2, 0), ModelEnt::new(2, 1)]
        );
    }

    #[test]
    fn debug_and_display() {
        let e = ModelEnt::new(2, 5);
        assert_eq!(format!("{e:?}"), "ModelEnt(2, 5)");
        assert_eq!(format!("{e}"), "(2, 5)");
    }
}
