//! InternalMesh: the shared 2-D mesh internal fields are attached to.
//!
//! The engine does not own a mesh data structure; this is the minimal view it
//! needs for copy and interpolation: vertex coordinates, vertex global ids
//! (a default set plus optional named alternatives), triangle connectivity,
//! and optionally the model entity each vertex is classified on.

use std::collections::BTreeMap;

use hashbrown::HashSet;

use crate::coupling_error::CouplingError;
use crate::topology::entity::{Gid, ModelEnt};

/// Spatial dimension of internal meshes.
pub const MESH_DIM: usize = 2;

#[derive(Clone, Debug, PartialEq)]
pub struct InternalMesh {
    coords: Vec<f64>,
    gids: Vec<Gid>,
    named_gids: BTreeMap<String, Vec<Gid>>,
    triangles: Vec<[usize; 3]>,
    classification: Option<Vec<ModelEnt>>,
}

impl InternalMesh {
    /// Build a mesh from interleaved `(x, y)` coordinates and triangles.
    /// Vertex `i` gets gid `i`.
    ///
    /// # Errors
    /// `InvalidConfig` if the coordinate array is ragged or a triangle
    /// references a missing vertex.
    pub fn new(coords: Vec<f64>, triangles: Vec<[usize; 3]>) -> Result<Self, CouplingError> {
        if coords.len() % MESH_DIM != 0 {
            return Err(CouplingError::InvalidConfig(format!(
                "coordinate array of length {} is not {MESH_DIM}-d",
                coords.len()
            )));
        }
        let nverts = coords.len() / MESH_DIM;
        if let Some(t) = triangles.iter().find(|t| t.iter().any(|&v| v >= nverts)) {
            return Err(CouplingError::InvalidConfig(format!(
                "triangle {t:?} references a vertex beyond {nverts}"
            )));
        }
        Ok(Self {
            coords,
            gids: (0..nverts as Gid).collect(),
            named_gids: BTreeMap::new(),
            triangles,
            classification: None,
        })
    }

    /// Replace the default vertex gids.
    pub fn with_gids(mut self, gids: Vec<Gid>) -> Result<Self, CouplingError> {
        self.check_gids("default", &gids)?;
        self.gids = gids;
        Ok(self)
    }

    /// Attach an alternative, named gid set.
    pub fn with_global_ids(
        mut self,
        name: impl Into<String>,
        gids: Vec<Gid>,
    ) -> Result<Self, CouplingError> {
        let name = name.into();
        self.check_gids(&name, &gids)?;
        self.named_gids.insert(name, gids);
        Ok(self)
    }

    /// Attach per-vertex classification.
    pub fn with_classification(mut self, class: Vec<ModelEnt>) -> Result<Self, CouplingError> {
        if class.len() != self.nverts() {
            return Err(CouplingError::InvalidConfig(format!(
                "classification has {} entries for {} vertices",
                class.len(),
                self.nverts()
            )));
        }
        self.classification = Some(class);
        Ok(self)
    }

    fn check_gids(&self, name: &str, gids: &[Gid]) -> Result<(), CouplingError> {
        if gids.len() != self.nverts() {
            return Err(CouplingError::InvalidConfig(format!(
                "gid set `{name}` has {} entries for {} vertices",
                gids.len(),
                self.nverts()
            )));
        }
        let mut seen = HashSet::with_capacity(gids.len());
        if let Some(dup) = gids.iter().find(|g| !seen.insert(**g)) {
            return Err(CouplingError::InvalidConfig(format!(
                "gid set `{name}` repeats gid {dup}"
            )));
        }
        Ok(())
    }

    #[inline]
    pub fn nverts(&self) -> usize {
        self.coords.len() / MESH_DIM
    }

    /// Interleaved vertex coordinates.
    pub fn coords(&self) -> &[f64] {
        &self.coords
    }

    #[inline]
    pub fn coord(&self, v: usize) -> [f64; MESH_DIM] {
        [self.coords[MESH_DIM * v], self.coords[MESH_DIM * v + 1]]
    }

    pub fn triangles(&self) -> &[[usize; 3]] {
        &self.triangles
    }

    pub fn classification(&self) -> Option<&[ModelEnt]> {
        self.classification.as_deref()
    }

    /// Gid set selected by `name`; `None` selects the default set.
    pub fn global_ids(&self, name: Option<&str>) -> Result<&[Gid], CouplingError> {
        match name {
            None => Ok(&self.gids),
            Some(n) => self
                .named_gids
                .get(n)
                .map(Vec::as_slice)
                .ok_or_else(|| CouplingError::UnknownName {
                    kind: "global id set",
                    name: n.to_string(),
                }),
        }
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    use super::*;

    /// `nx × ny` cells on `[0, nx] × [0, ny]`, two triangles per cell,
    /// vertices numbered row-major.
    pub(crate) fn grid_mesh(nx: usize, ny: usize) -> InternalMesh {
        let mut coords = Vec::new();
        for j in 0..=ny {
            for i in 0..=nx {
                coords.push(i as f64);
                coords.push(j as f64);
            }
        }
        let v = |i: usize, j: usize| j * (nx + 1) + i;
        let mut tris = Vec::new();
        for j in 0..ny {
            for i in 0..nx {
                tris.push([v(i, j), v(i + 1, j), v(i + 1, j + 1)]);
                tris.push([v(i, j), v(i + 1, j + 1), v(i, j + 1)]);
            }
        }
        InternalMesh::new(coords, tris).unwrap()
    }
}

#[cfg(test)]
mod tests {
    use super::test_support::grid_mesh;
    use super::*;

    #[test]
    fn grid_mesh_shape() {
        let m = grid_mesh(2, 1);
        assert_eq!(m.nverts(), 6);
        assert_eq!(m.triangles().len(), 4);
        assert_eq!(m.coord(5), [2.0, 1.0]);
        assert_eq!(m.global_ids(None).unwrap(), &[0, 1, 2, 3, 4, 5]);
    }

    #[test]
    fn rejects_bad_input() {
        assert!(InternalMesh::new(vec![0.0, 1.0, 2.0], vec![]).is_err());
        assert!(InternalMesh::new(vec![0.0; 4], vec![[0, 1, 2]]).is_err());
        let m = grid_mesh(1, 1);
        assert!(m.clone().with_gids(vec![1, 2, 3, 3]).is_err());
        assert!(m.clone().with_gids(vec![1, 2]).is_err());
        assert!(m.with_classification(vec![ModelEnt::new(2, 1)]).is_err());
    }

    #[test]
    fn named_gid_sets() {
        let m = grid_mesh(1, 1)
            .with_global_ids("remote", vec![40, 41, 42, 43])
            .unwrap();
        assert_eq!(m.global_ids(Some("remote")).unwrap(), &[40, 41, 42, 43]);
        assert!(matches!(
            m.global_ids(Some("missing")),
            Err(CouplingError::UnknownName { .. })
        ));
    }
}
