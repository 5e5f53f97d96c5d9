//! Value movement between native fields and internal fields, and between
//! internal fields of possibly different element types.
//!
//! Every conversion stages its output before writing, so a failed
//! conversion (unknown gid, point outside the mesh, out-of-range cast)
//! leaves the destination untouched.

use std::sync::Arc;

use crate::adapter::FieldAdapter;
use crate::algs::evaluate::{apply_stencils, cloud_stencils, mesh_stencils};
use crate::config::{EvaluationMethod, FieldTransferMethod, TransferOptions};
use crate::coupling_error::CouplingError;
use crate::data::internal_field::{Element, InternalField, MeshField, cast_element, with_field};

fn check_components(name: &str, expected: usize, found: usize) -> Result<(), CouplingError> {
    if expected != found {
        return Err(CouplingError::ShapeMismatch {
            name: name.to_string(),
            expected,
            found,
        });
    }
    Ok(())
}

/// Interleaved coordinates of the active vertices of `f`.
fn active_points<T: Element>(f: &MeshField<T>) -> (Vec<usize>, Vec<f64>) {
    let verts: Vec<usize> = f.active_vertices().collect();
    let points = verts.iter().flat_map(|&v| f.mesh().coord(v)).collect();
    (verts, points)
}

fn scatter_nodes<T: Element>(dst: &mut MeshField<T>, verts: &[usize], staged: &[T]) {
    let c = dst.components();
    for (k, &v) in verts.iter().enumerate() {
        dst.node_mut(v).copy_from_slice(&staged[k * c..(k + 1) * c]);
    }
}

/// Convert `src` into `dst` over the active vertices of `dst`.
///
/// Fields of equal element type are copied vertex by vertex; the source mask
/// must cover every destination vertex. Otherwise `src` is evaluated at the
/// destination vertices with `method`.
pub fn internal_to_internal(
    src: &InternalField,
    dst: &mut InternalField,
    method: EvaluationMethod,
) -> Result<(), CouplingError> {
    with_field!(src, s => with_field!(dst, d => convert_typed(s, d, method)))
}

fn convert_typed<S: Element, D: Element>(
    src: &MeshField<S>,
    dst: &mut MeshField<D>,
    method: EvaluationMethod,
) -> Result<(), CouplingError> {
    check_components(dst.name(), dst.components(), src.components())?;
    if !Arc::ptr_eq(src.mesh(), dst.mesh()) {
        return Err(CouplingError::MeshMismatch(src.name().to_string()));
    }
    let c = dst.components();
    let (verts, points) = active_points(dst);
    let mut staged = vec![D::default(); verts.len() * c];

    if S::ELEMENT_TYPE == D::ELEMENT_TYPE {
        if let Some(&v) = verts.iter().find(|&&v| !src.is_active(v)) {
            return Err(CouplingError::InvalidConfig(format!(
                "`{}` is inactive at vertex {v}, which `{}` needs",
                src.name(),
                dst.name()
            )));
        }
        for (k, &v) in verts.iter().enumerate() {
            for (slot, &x) in staged[k * c..(k + 1) * c].iter_mut().zip(src.node(v)) {
                *slot = cast_element(x)?;
            }
        }
    } else {
        log::debug!(
            "evaluating `{}` ({}) at {} vertices of `{}` ({}) with {method:?}",
            src.name(),
            S::ELEMENT_TYPE,
            verts.len(),
            dst.name(),
            D::ELEMENT_TYPE
        );
        let stencils = mesh_stencils(src, &points, method)?;
        apply_stencils(src.values(), c, &stencils, &mut staged)?;
    }
    scatter_nodes(dst, &verts, &staged);
    Ok(())
}

/// Fill `dst` from the native field behind `adapter`.
pub fn native_to_internal<A: FieldAdapter>(
    adapter: &A,
    dst: &mut InternalField,
    opts: TransferOptions,
) -> Result<(), CouplingError> {
    with_field!(dst, d => native_to_mesh(adapter, d, opts))
}

fn gid_vertices<A: FieldAdapter, T: Element>(
    adapter: &A,
    field: &MeshField<T>,
) -> Result<Vec<usize>, CouplingError> {
    adapter
        .gids()
        .into_iter()
        .map(|gid| {
            field
                .vertex_of(gid)
                .filter(|&v| field.is_active(v))
                .ok_or_else(|| CouplingError::UnknownGid {
                    field: field.name().to_string(),
                    gid,
                })
        })
        .collect()
}

fn coordinates_of<A: FieldAdapter>(adapter: &A) -> Result<Vec<f64>, CouplingError> {
    adapter.nodal_coordinates().ok_or_else(|| {
        CouplingError::InvalidConfig(format!(
            "field `{}` has no coordinates to interpolate with",
            adapter.name()
        ))
    })
}

fn native_to_mesh<A: FieldAdapter, D: Element>(
    adapter: &A,
    dst: &mut MeshField<D>,
    opts: TransferOptions,
) -> Result<(), CouplingError> {
    check_components(dst.name(), dst.components(), adapter.components())?;
    let c = dst.components();
    let values = adapter.nodal_values();
    match opts.transfer_method {
        FieldTransferMethod::Copy => {
            let verts = gid_vertices(adapter, dst)?;
            let staged = values
                .into_iter()
                .map(cast_element)
                .collect::<Result<Vec<D>, _>>()?;
            scatter_nodes(dst, &verts, &staged);
        }
        FieldTransferMethod::Interpolate => {
            let coords = coordinates_of(adapter)?;
            let (verts, points) = active_points(dst);
            let stencils =
                cloud_stencils(&coords, &points, opts.evaluation_method, dst.resolution())?;
            let mut staged = vec![D::default(); verts.len() * c];
            apply_stencils(&values, c, &stencils, &mut staged)?;
            scatter_nodes(dst, &verts, &staged);
        }
    }
    Ok(())
}

/// Write `src` back into the native field behind `adapter`.
pub fn internal_to_native<A: FieldAdapter>(
    src: &InternalField,
    adapter: &mut A,
    opts: TransferOptions,
) -> Result<(), CouplingError> {
    with_field!(src, s => mesh_to_native(s, adapter, opts))
}

fn mesh_to_native<A: FieldAdapter, S: Element>(
    src: &MeshField<S>,
    adapter: &mut A,
    opts: TransferOptions,
) -> Result<(), CouplingError> {
    check_components(adapter.name(), adapter.components(), src.components())?;
    let c = src.components();
    let out = match opts.transfer_method {
        FieldTransferMethod::Copy => {
            let verts = gid_vertices(adapter, src)?;
            let mut out = Vec::with_capacity(verts.len() * c);
            for v in verts {
                for &x in src.node(v) {
                    out.push(cast_element(x)?);
                }
            }
            out
        }
        FieldTransferMethod::Interpolate => {
            let coords = coordinates_of(adapter)?;
            let stencils = mesh_stencils(src, &coords, opts.evaluation_method)?;
            let mut out = vec![A::Value::default(); stencils.len() * c];
            apply_stencils(src.values(), c, &stencils, &mut out)?;
            out
        }
    };
    adapter.set_nodal_values(&out)
}
