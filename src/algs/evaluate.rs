//! Point evaluation of fields.
//!
//! Evaluation is split in two steps. First every query point is resolved to
//! a [`Stencil`]: the source node it copies from, or three weighted nodes.
//! Stencils are then applied to a value array with checked conversion into
//! the destination element type. A single-node stencil converts the source
//! value directly, so nearest-neighbour evaluation is exact whenever the
//! element types agree.

#[cfg(feature = "rayon")]
use rayon::prelude::*;

use crate::config::EvaluationMethod;
use crate::coupling_error::CouplingError;
use crate::data::internal_field::{Element, MeshField, cast_element, cast_from_f64};
use crate::data::search_grid::{GridResolution, SearchGrid};

/// Where one evaluation point takes its value from.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum Stencil {
    Node(usize),
    Weighted([(usize, f64); 3]),
}

fn point(points: &[f64], k: usize) -> [f64; 2] {
    [points[2 * k], points[2 * k + 1]]
}

fn nearest(grid: &SearchGrid, coords: &[f64], p: [f64; 2]) -> Result<Stencil, CouplingError> {
    grid.nearest(coords, p)
        .map(|(i, _)| Stencil::Node(i))
        .ok_or_else(|| CouplingError::InvalidConfig("evaluation source has no active nodes".into()))
}

/// Stencils for evaluating `src` at the interleaved 2-D `points`.
///
/// # Errors
/// - `PointOutsideMesh` if a Lagrange point lies in no fully active triangle.
/// - `Unsupported` for Lagrange orders other than 1.
pub fn mesh_stencils<T: Element>(
    src: &MeshField<T>,
    points: &[f64],
    method: EvaluationMethod,
) -> Result<Vec<Stencil>, CouplingError> {
    let coords = src.mesh().coords();
    let grid = src.search_grid();
    let n = points.len() / 2;
    match method {
        EvaluationMethod::NearestNeighbor => (0..n)
            .map(|k| nearest(grid, coords, point(points, k)))
            .collect(),
        EvaluationMethod::Lagrange(1) => {
            let tris = src.mesh().triangles();
            (0..n)
                .map(|k| {
                    let p = point(points, k);
                    let (t, w) = grid
                        .locate(coords, tris, p)
                        .ok_or(CouplingError::PointOutsideMesh { x: p[0], y: p[1] })?;
                    let [a, b, c] = tris[t];
                    Ok(Stencil::Weighted([(a, w[0]), (b, w[1]), (c, w[2])]))
                })
                .collect()
        }
        EvaluationMethod::Lagrange(order) => Err(CouplingError::Unsupported(format!(
            "Lagrange evaluation of order {order}"
        ))),
    }
}

/// Stencils for evaluating a point cloud (a native field's nodes).
pub fn cloud_stencils(
    src_coords: &[f64],
    points: &[f64],
    method: EvaluationMethod,
    resolution: GridResolution,
) -> Result<Vec<Stencil>, CouplingError> {
    match method {
        EvaluationMethod::NearestNeighbor => {
            let grid = SearchGrid::over_points(src_coords, |_| true, resolution);
            (0..points.len() / 2)
                .map(|k| nearest(&grid, src_coords, point(points, k)))
                .collect()
        }
        EvaluationMethod::Lagrange(order) => Err(CouplingError::Unsupported(format!(
            "Lagrange evaluation of order {order} on a point cloud"
        ))),
    }
}

fn evaluate_one<S: Element, D: Element>(
    src: &[S],
    components: usize,
    stencil: &Stencil,
    out: &mut [D],
) -> Result<(), CouplingError> {
    for (c, slot) in out.iter_mut().enumerate() {
        *slot = match stencil {
            Stencil::Node(i) => cast_element(src[i * components + c])?,
            Stencil::Weighted(ws) => {
                let mut acc = 0.0;
                for &(i, w) in ws {
                    let v = src[i * components + c];
                    acc += w * v.to_f64().ok_or_else(|| CouplingError::NumericConversion {
                        value: v.to_string(),
                        from: S::ELEMENT_TYPE,
                        to: D::ELEMENT_TYPE,
                    })?;
                }
                cast_from_f64(acc)?
            }
        };
    }
    Ok(())
}

/// Apply `stencils` to `src` (`components` values per node) into `out`.
pub fn apply_stencils<S: Element, D: Element>(
    src: &[S],
    components: usize,
    stencils: &[Stencil],
    out: &mut [D],
) -> Result<(), CouplingError> {
    if out.len() != stencils.len() * components {
        return Err(CouplingError::InvalidConfig(format!(
            "{} output values for {} points x {components} components",
            out.len(),
            stencils.len()
        )));
    }
    #[cfg(feature = "rayon")]
    {
        out.par_chunks_mut(components)
            .zip(stencils.par_iter())
            .try_for_each(|(o, s)| evaluate_one(src, components, s, o))
    }
    #[cfg(not(feature = "rayon"))]
    {
        out.chunks_mut(components)
            .zip(stencils)
            .try_for_each(|(o, s)| evaluate_one(src, components, s, o))
    }
}
