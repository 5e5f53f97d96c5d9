//! Combiners: rules for merging several internal fields into one.
//!
//! A combiner sees every gather source (registration order) and the mutable
//! target. The built-in ones walk the active vertices of the target and fuse
//! the sources that are themselves active there with a [`Reducer`]. Vertices
//! no source covers keep their current value.

use std::ops::AddAssign;

use num_traits::CheckedAdd;

use crate::coupling_error::CouplingError;
use crate::data::internal_field::{
    Element, ElementType, InternalField, MeshField, cast_element, cast_from_f64, with_field,
};

/// User-supplied combination step of a gather operation.
pub type CombinerFunction =
    Box<dyn FnMut(&[&InternalField], &mut InternalField) -> Result<(), CouplingError> + Send>;

/// Box a closure as a [`CombinerFunction`].
pub fn combiner<F>(f: F) -> CombinerFunction
where
    F: FnMut(&[&InternalField], &mut InternalField) -> Result<(), CouplingError> + Send + 'static,
{
    Box::new(f)
}

/// *Reducer* folds one incoming contribution into a local value.
pub trait Reducer<V> {
    fn fuse(local: &mut V, incoming: V);
}

/// Last contribution wins.
#[derive(Copy, Clone, Debug)]
pub struct CopyReducer;

impl<V> Reducer<V> for CopyReducer {
    #[inline]
    fn fuse(local: &mut V, incoming: V) {
        *local = incoming;
    }
}

/// Contributions are summed.
#[derive(Copy, Clone, Debug)]
pub struct AddReducer;

impl<V: AddAssign + Copy> Reducer<V> for AddReducer {
    #[inline]
    fn fuse(local: &mut V, incoming: V) {
        *local += incoming;
    }
}

fn check_sources(sources: &[&InternalField], target: &InternalField) -> Result<(), CouplingError> {
    for s in sources {
        if !s.same_mesh(target) {
            return Err(CouplingError::MeshMismatch(s.name().to_string()));
        }
        if s.components() != target.components() {
            return Err(CouplingError::ShapeMismatch {
                name: s.name().to_string(),
                expected: target.components(),
                found: s.components(),
            });
        }
    }
    Ok(())
}

fn active_at(src: &InternalField, v: usize) -> bool {
    src.mask().is_none_or(|m| m[v])
}

fn value_as<D: Element>(src: &InternalField, i: usize) -> Result<D, CouplingError> {
    with_field!(src, f => cast_element(f.values()[i]))
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
enum Reduction {
    Sum,
    Mean,
}

/// Integer targets fed only by integer sources accumulate in checked `i64`;
/// anything involving a float accumulates in `f64`. Means divide once, after
/// all contributions are in.
fn reduce_numeric(
    sources: &[&InternalField],
    target: &mut InternalField,
    how: Reduction,
) -> Result<(), CouplingError> {
    check_sources(sources, target)?;
    with_field!(target, t => write_numeric(sources, t, how))
}

fn write_numeric<D: Element>(
    sources: &[&InternalField],
    target: &mut MeshField<D>,
    how: Reduction,
) -> Result<(), CouplingError> {
    let c = target.components();
    let mut staged = Vec::new();
    for v in target.active_vertices() {
        let live: Vec<&InternalField> =
            sources.iter().copied().filter(|s| active_at(s, v)).collect();
        if live.is_empty() {
            continue;
        }
        let exact =
            D::ELEMENT_TYPE.is_integer() && live.iter().all(|s| s.element_type().is_integer());
        for i in v * c..(v + 1) * c {
            let x = if exact {
                cast_element::<i64, D>(fuse_exact(&live, i, how, D::ELEMENT_TYPE)?)?
            } else {
                let mut acc = 0.0;
                for s in &live {
                    AddReducer::fuse(&mut acc, value_as::<f64>(s, i)?);
                }
                if how == Reduction::Mean {
                    acc /= live.len() as f64;
                }
                cast_from_f64::<D>(acc)?
            };
            staged.push((i, x));
        }
    }
    let values = target.values_mut();
    for (i, x) in staged {
        values[i] = x;
    }
    Ok(())
}

fn fuse_exact(
    live: &[&InternalField],
    i: usize,
    how: Reduction,
    to: ElementType,
) -> Result<i64, CouplingError> {
    let mut acc: i64 = 0;
    for s in live {
        let x = value_as::<i64>(s, i)?;
        acc = CheckedAdd::checked_add(&acc, &x).ok_or_else(|| CouplingError::NumericConversion {
            value: format!("{acc} + {x}"),
            from: ElementType::I64,
            to,
        })?;
    }
    Ok(match how {
        Reduction::Sum => acc,
        Reduction::Mean => div_round(acc, live.len() as i64),
    })
}

/// `num / den` rounded half away from zero, matching float-to-int casts.
fn div_round(num: i64, den: i64) -> i64 {
    let (q, r) = (num / den, num % den);
    if 2 * r.unsigned_abs() >= den.unsigned_abs() {
        q + num.signum()
    } else {
        q
    }
}

pub mod combiners {
    use super::*;

    /// Element-wise sum of the active sources.
    pub fn sum(
        sources: &[&InternalField],
        target: &mut InternalField,
    ) -> Result<(), CouplingError> {
        reduce_numeric(sources, target, Reduction::Sum)
    }

    /// Element-wise mean of the sources active at each vertex.
    pub fn average(
        sources: &[&InternalField],
        target: &mut InternalField,
    ) -> Result<(), CouplingError> {
        reduce_numeric(sources, target, Reduction::Mean)
    }

    /// The last active source (registration order) wins. Exact when the
    /// element types agree.
    pub fn priority_override(
        sources: &[&InternalField],
        target: &mut InternalField,
    ) -> Result<(), CouplingError> {
        check_sources(sources, target)?;
        with_field!(target, t => override_typed(sources, t))
    }

    fn override_typed<D: Element>(
        sources: &[&InternalField],
        target: &mut MeshField<D>,
    ) -> Result<(), CouplingError> {
        let c = target.components();
        let mut staged = Vec::new();
        for v in target.active_vertices() {
            for i in v * c..(v + 1) * c {
                let mut slot: Option<D> = None;
                for s in sources.iter().filter(|s| active_at(s, v)) {
                    CopyReducer::fuse(&mut slot, Some(value_as::<D>(s, i)?));
                }
                if let Some(x) = slot {
                    staged.push((i, x));
                }
            }
        }
        let values = target.values_mut();
        for (i, x) in staged {
            values[i] = x;
        }
        Ok(())
    }
}
