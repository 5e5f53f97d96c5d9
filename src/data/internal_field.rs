//! Internal fields: tagged, mesh-attached storage over a closed set of
//! element types.
//!
//! An [`InternalField`] is the engine-owned representation of one coupled
//! quantity on the shared [`InternalMesh`]. Each variant wraps a
//! [`MeshField<T>`] holding `components` values per mesh vertex, an optional
//! vertex mask, the gid association used to match native entities, and a
//! lazily built [`SearchGrid`] for interpolation queries.

use std::fmt;
use std::sync::Arc;

use bytemuck::Pod;
use hashbrown::HashMap;
use num_traits::{NumCast, ToPrimitive};
use once_cell::sync::OnceCell;
use serde::{Deserialize, Serialize};

use crate::coupling_error::CouplingError;
use crate::data::internal_mesh::InternalMesh;
use crate::data::search_grid::{GridResolution, SearchGrid};
use crate::topology::entity::Gid;

/// Element type tag for internal fields and wire frames.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ElementType {
    F32,
    F64,
    I32,
    I64,
}

impl ElementType {
    /// Returns a stable string label for the element type.
    pub fn as_str(self) -> &'static str {
        match self {
            ElementType::F32 => "f32",
            ElementType::F64 => "f64",
            ElementType::I32 => "i32",
            ElementType::I64 => "i64",
        }
    }

    /// Parse an element type from a string label.
    pub fn parse(tag: &str) -> Option<Self> {
        match tag {
            "f32" => Some(ElementType::F32),
            "f64" => Some(ElementType::F64),
            "i32" => Some(ElementType::I32),
            "i64" => Some(ElementType::I64),
            _ => None,
        }
    }

    /// Stable wire code.
    pub fn code(self) -> u16 {
        match self {
            ElementType::F32 => 1,
            ElementType::F64 => 2,
            ElementType::I32 => 3,
            ElementType::I64 => 4,
        }
    }

    pub fn from_code(code: u16) -> Option<Self> {
        match code {
            1 => Some(ElementType::F32),
            2 => Some(ElementType::F64),
            3 => Some(ElementType::I32),
            4 => Some(ElementType::I64),
            _ => None,
        }
    }

    pub fn is_integer(self) -> bool {
        matches!(self, ElementType::I32 | ElementType::I64)
    }
}

impl fmt::Display for ElementType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Scalar element types an internal field may carry.
pub trait Element:
    Pod + Default + PartialEq + fmt::Debug + fmt::Display + NumCast + ToPrimitive + Send + Sync
{
    /// Tag for this concrete type.
    const ELEMENT_TYPE: ElementType;

    /// Wrap a typed field into the tagged container.
    fn wrap(field: MeshField<Self>) -> InternalField;
    /// Borrow a typed field if the tag matches.
    fn unwrap(field: &InternalField) -> Option<&MeshField<Self>>;
    /// Mutably borrow a typed field if the tag matches.
    fn unwrap_mut(field: &mut InternalField) -> Option<&mut MeshField<Self>>;
}

macro_rules! impl_element {
    ($t:ty, $variant:ident) => {
        impl Element for $t {
            const ELEMENT_TYPE: ElementType = ElementType::$variant;

            fn wrap(field: MeshField<Self>) -> InternalField {
                InternalField::$variant(field)
            }

            fn unwrap(field: &InternalField) -> Option<&MeshField<Self>> {
                if let InternalField::$variant(f) = field {
                    Some(f)
                } else {
                    None
                }
            }

            fn unwrap_mut(field: &mut InternalField) -> Option<&mut MeshField<Self>> {
                if let InternalField::$variant(f) = field {
                    Some(f)
                } else {
                    None
                }
            }
        }
    };
}

impl_element!(f32, F32);
impl_element!(f64, F64);
impl_element!(i32, I32);
impl_element!(i64, I64);

/// Checked conversion between element types.
///
/// Same-type conversion is the identity. Integer targets round to nearest;
/// values that do not fit the target (or NaN into an integer) are errors.
pub fn cast_element<S: Element, D: Element>(v: S) -> Result<D, CouplingError> {
    let out = if D::ELEMENT_TYPE.is_integer() && !S::ELEMENT_TYPE.is_integer() {
        v.to_f64().and_then(|x| NumCast::from(x.round()))
    } else {
        NumCast::from(v)
    };
    out.ok_or_else(|| CouplingError::NumericConversion {
        value: v.to_string(),
        from: S::ELEMENT_TYPE,
        to: D::ELEMENT_TYPE,
    })
}

/// Convert an `f64` evaluation result into `D`.
pub fn cast_from_f64<D: Element>(x: f64) -> Result<D, CouplingError> {
    cast_element::<f64, D>(x)
}

/// Typed field values over every vertex of the internal mesh.
#[derive(Clone)]
pub struct MeshField<T> {
    name: String,
    mesh: Arc<InternalMesh>,
    values: Vec<T>,
    components: usize,
    mask: Option<Vec<bool>>,
    global_id_name: Option<String>,
    gid_index: HashMap<Gid, usize>,
    resolution: GridResolution,
    grid: OnceCell<SearchGrid>,
}

impl<T: Element> MeshField<T> {
    /// Create a zero-initialised field.
    ///
    /// `mask`, if given, selects the active vertices; `global_id_name` picks a
    /// named gid set of the mesh for matching native entities.
    pub fn new(
        name: impl Into<String>,
        mesh: Arc<InternalMesh>,
        components: usize,
        mask: Option<Vec<bool>>,
        global_id_name: Option<&str>,
        resolution: GridResolution,
    ) -> Result<Self, CouplingError> {
        let name = name.into();
        if components == 0 {
            return Err(CouplingError::InvalidConfig(format!(
                "internal field `{name}` needs at least one component"
            )));
        }
        if let Some(m) = &mask {
            if m.len() != mesh.nverts() {
                return Err(CouplingError::InvalidConfig(format!(
                    "internal field `{name}`: mask has {} entries for {} vertices",
                    m.len(),
                    mesh.nverts()
                )));
            }
            if !m.iter().any(|&s| s) {
                return Err(CouplingError::EmptyOverlap { field: name });
            }
        }
        let gid_index = mesh
            .global_ids(global_id_name)?
            .iter()
            .enumerate()
            .map(|(v, &g)| (g, v))
            .collect();
        Ok(Self {
            values: vec![T::default(); mesh.nverts() * components],
            name,
            mesh,
            components,
            mask,
            global_id_name: global_id_name.map(str::to_string),
            gid_index,
            resolution,
            grid: OnceCell::new(),
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn mesh(&self) -> &Arc<InternalMesh> {
        &self.mesh
    }

    pub fn components(&self) -> usize {
        self.components
    }

    pub fn values(&self) -> &[T] {
        &self.values
    }

    pub fn values_mut(&mut self) -> &mut [T] {
        &mut self.values
    }

    pub fn mask(&self) -> Option<&[bool]> {
        self.mask.as_deref()
    }

    pub fn global_id_name(&self) -> Option<&str> {
        self.global_id_name.as_deref()
    }

    pub fn resolution(&self) -> GridResolution {
        self.resolution
    }

    #[inline]
    pub fn is_active(&self, v: usize) -> bool {
        self.mask.as_ref().is_none_or(|m| m[v])
    }

    /// Active vertices in ascending order.
    pub fn active_vertices(&self) -> impl Iterator<Item = usize> + '_ {
        (0..self.mesh.nverts()).filter(move |&v| self.is_active(v))
    }

    /// Vertex associated with `gid`.
    pub fn vertex_of(&self, gid: Gid) -> Option<usize> {
        self.gid_index.get(&gid).copied()
    }

    #[inline]
    pub fn node(&self, v: usize) -> &[T] {
        &self.values[v * self.components..(v + 1) * self.components]
    }

    #[inline]
    pub fn node_mut(&mut self, v: usize) -> &mut [T] {
        let c = self.components;
        &mut self.values[v * c..(v + 1) * c]
    }

    /// Search grid over active vertices and fully active triangles.
    pub fn search_grid(&self) -> &SearchGrid {
        self.grid.get_or_init(|| {
            let mesh = &self.mesh;
            SearchGrid::over_points(mesh.coords(), |v| self.is_active(v), self.resolution)
                .with_triangles(mesh.coords(), mesh.triangles(), |t| {
                    t.iter().all(|&v| self.is_active(v))
                })
        })
    }
}

impl<T: fmt::Debug> fmt::Debug for MeshField<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MeshField")
            .field("name", &self.name)
            .field("components", &self.components)
            .field("values", &self.values)
            .field("masked", &self.mask.is_some())
            .field("global_id_name", &self.global_id_name)
            .finish()
    }
}

/// Tagged internal field.
#[derive(Clone, Debug)]
pub enum InternalField {
    F32(MeshField<f32>),
    F64(MeshField<f64>),
    I32(MeshField<i32>),
    I64(MeshField<i64>),
}

/// Apply `$body` to the typed field inside any variant.
macro_rules! with_field {
    ($field:expr, $f:ident => $body:expr) => {
        match $field {
            InternalField::F32($f) => $body,
            InternalField::F64($f) => $body,
            InternalField::I32($f) => $body,
            InternalField::I64($f) => $body,
        }
    };
}
pub(crate) use with_field;

impl InternalField {
    /// Create a zero-initialised field of element type `ty`.
    pub fn new(
        ty: ElementType,
        name: impl Into<String>,
        mesh: Arc<InternalMesh>,
        components: usize,
        mask: Option<Vec<bool>>,
        global_id_name: Option<&str>,
        resolution: GridResolution,
    ) -> Result<Self, CouplingError> {
        fn make<T: Element>(
            name: String,
            mesh: Arc<InternalMesh>,
            components: usize,
            mask: Option<Vec<bool>>,
            gid: Option<&str>,
            res: GridResolution,
        ) -> Result<InternalField, CouplingError> {
            MeshField::<T>::new(name, mesh, components, mask, gid, res).map(T::wrap)
        }
        let name = name.into();
        let gid = global_id_name;
        match ty {
            ElementType::F32 => make::<f32>(name, mesh, components, mask, gid, resolution),
            ElementType::F64 => make::<f64>(name, mesh, components, mask, gid, resolution),
            ElementType::I32 => make::<i32>(name, mesh, components, mask, gid, resolution),
            ElementType::I64 => make::<i64>(name, mesh, components, mask, gid, resolution),
        }
    }

    /// Return the element type tag for this field.
    pub fn element_type(&self) -> ElementType {
        match self {
            InternalField::F32(_) => ElementType::F32,
            InternalField::F64(_) => ElementType::F64,
            InternalField::I32(_) => ElementType::I32,
            InternalField::I64(_) => ElementType::I64,
        }
    }

    pub fn name(&self) -> &str {
        with_field!(self, f => f.name())
    }

    pub fn components(&self) -> usize {
        with_field!(self, f => f.components())
    }

    pub fn mesh(&self) -> &Arc<InternalMesh> {
        with_field!(self, f => f.mesh())
    }

    pub fn mask(&self) -> Option<&[bool]> {
        with_field!(self, f => f.mask())
    }

    /// Whether both fields live on the same mesh instance.
    pub fn same_mesh(&self, other: &InternalField) -> bool {
        Arc::ptr_eq(self.mesh(), other.mesh())
    }

    /// Borrow as `MeshField<T>` if the tag matches.
    pub fn get<T: Element>(&self) -> Option<&MeshField<T>> {
        T::unwrap(self)
    }

    /// Mutably borrow as `MeshField<T>` if the tag matches.
    pub fn get_mut<T: Element>(&mut self) -> Option<&mut MeshField<T>> {
        T::unwrap_mut(self)
    }

    /// Typed value slice, or `ElementTypeMismatch`.
    pub fn values<T: Element>(&self) -> Result<&[T], CouplingError> {
        self.get::<T>()
            .map(MeshField::values)
            .ok_or_else(|| self.type_mismatch(T::ELEMENT_TYPE))
    }

    /// Mutable typed value slice, or `ElementTypeMismatch`.
    pub fn values_mut<T: Element>(&mut self) -> Result<&mut [T], CouplingError> {
        let err = self.type_mismatch(T::ELEMENT_TYPE);
        self.get_mut::<T>().map(MeshField::values_mut).ok_or(err)
    }

    fn type_mismatch(&self, expected: ElementType) -> CouplingError {
        CouplingError::ElementTypeMismatch {
            name: self.name().to_string(),
            expected,
            found: self.element_type(),
        }
    }
}

impl<T: Element> From<MeshField<T>> for InternalField {
    fn from(f: MeshField<T>) -> Self {
        T::wrap(f)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::internal_mesh::test_support::grid_mesh;

    fn mesh() -> Arc<InternalMesh> {
        Arc::new(grid_mesh(2, 2))
    }

    #[test]
    fn element_tags_round_trip() {
        for ty in [ElementType::F32, ElementType::F64, ElementType::I32, ElementType::I64] {
            assert_eq!(ElementType::parse(ty.as_str()), Some(ty));
            assert_eq!(ElementType::from_code(ty.code()), Some(ty));
        }
        assert_eq!(ElementType::parse("u8"), None);
    }

    #[test]
    fn typed_access_checks_tag() {
        let mut f = InternalField::new(
            ElementType::F64,
            "density",
            mesh(),
            1,
            None,
            None,
            GridResolution::default(),
        )
        .unwrap();
        assert_eq!(f.element_type(), ElementType::F64);
        assert_eq!(f.values::<f64>().unwrap().len(), 9);
        f.values_mut::<f64>().unwrap()[3] = 2.5;
        assert_eq!(f.get::<f64>().unwrap().node(3), &[2.5]);
        assert!(matches!(
            f.values::<i32>(),
            Err(CouplingError::ElementTypeMismatch {
                expected: ElementType::I32,
                found: ElementType::F64,
                ..
            })
        ));
    }

    #[test]
    fn mask_limits_active_vertices() {
        let mut mask = vec![false; 9];
        mask[1] = true;
        mask[4] = true;
        let f = MeshField::<f32>::new("m", mesh(), 2, Some(mask), None, GridResolution::default())
            .unwrap();
        assert_eq!(f.active_vertices().collect::<Vec<_>>(), vec![1, 4]);
        assert_eq!(f.values().len(), 18);
    }

    #[test]
    fn empty_mask_rejected() {
        let err = MeshField::<f32>::new(
            "m",
            mesh(),
            1,
            Some(vec![false; 9]),
            None,
            GridResolution::default(),
        )
        .unwrap_err();
        assert_eq!(err, CouplingError::EmptyOverlap { field: "m".into() });
    }

    #[test]
    fn gid_association() {
        let m = Arc::new(
            grid_mesh(1, 1)
                .with_global_ids("app", vec![7, 8, 9, 10])
                .unwrap(),
        );
        let f = MeshField::<i64>::new("g", m, 1, None, Some("app"), GridResolution::default())
            .unwrap();
        assert_eq!(f.vertex_of(9), Some(2));
        assert_eq!(f.vertex_of(0), None);
    }

    #[test]
    fn checked_casts() {
        assert_eq!(cast_element::<f64, i32>(2.6).unwrap(), 3);
        assert_eq!(cast_element::<i64, i64>(i64::MAX).unwrap(), i64::MAX);
        assert_eq!(cast_element::<i32, f64>(-4).unwrap(), -4.0);
        assert!(cast_element::<f64, i32>(f64::NAN).is_err());
        assert!(cast_element::<i64, i32>(i64::MAX).is_err());
    }
}
