//! Rendezvous-side coupling session.
//!
//! ```text
//! CouplerServer
//! ├── Application "xgc"      (channel, coupled fields, per-field internal fields)
//! ├── Application "gene"
//! ├── internal fields        (session level, shared by operations)
//! └── gather / scatter ops   (coupled fields ↔ one internal field)
//! ```
//!
//! Registration is all-or-nothing: a failing `add_*` call leaves every
//! registry exactly as it was.

use std::sync::Arc;

use hashbrown::HashMap;

use super::coupled_field::CoupledFieldModel;
use super::registry::Registry;
use super::{
    ApplicationId, CoupledField, FieldId, FieldStore, GatherOperation, INTERNAL_SUFFIX,
    InternalEntry, InternalFieldId, ScatterOperation,
};
use crate::adapter::FieldAdapter;
use crate::algs::channel::{Channel, Phase};
use crate::algs::combine::CombinerFunction;
use crate::algs::communicator::{CommTag, Communicator};
use crate::algs::field_communicator::{FieldCommunicator, Role, SendMode};
use crate::config::{CouplerConfig, TransferOptions};
use crate::coupling_error::CouplingError;
use crate::data::internal_field::{Element, ElementType, InternalField};
use crate::data::internal_mesh::InternalMesh;
use crate::data::search_grid::GridResolution;
use crate::partitioning::Partition;

/// Name, element type and layout of a session-level internal field.
#[derive(Clone, Debug, PartialEq)]
pub struct InternalFieldSpec {
    pub name: String,
    pub element_type: ElementType,
    pub mask: Option<Vec<bool>>,
    pub global_id_name: Option<String>,
}

impl InternalFieldSpec {
    pub fn new(name: impl Into<String>, element_type: ElementType) -> Self {
        Self {
            name: name.into(),
            element_type,
            mask: None,
            global_id_name: None,
        }
    }

    pub fn with_mask(mut self, mask: Vec<bool>) -> Self {
        self.mask = Some(mask);
        self
    }

    pub fn with_global_id_name(mut self, name: impl Into<String>) -> Self {
        self.global_id_name = Some(name.into());
        self
    }
}

/// One native application as seen from the rendezvous side.
pub struct Application<C: Communicator> {
    name: String,
    index: usize,
    channel: Channel<C>,
    client_ranks: usize,
    mesh: Arc<InternalMesh>,
    resolution: GridResolution,
    defaults: (TransferOptions, TransferOptions),
    fields: Registry<CoupledField>,
    tags: HashMap<u16, String>,
}

impl<C: Communicator + 'static> Application<C> {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn id(&self) -> ApplicationId {
        ApplicationId(self.index)
    }

    pub fn channel(&self) -> &Channel<C> {
        &self.channel
    }

    /// Number of application ranks sending to this rendezvous rank.
    pub fn client_ranks(&self) -> usize {
        self.client_ranks
    }

    pub fn phase(&self) -> Phase {
        self.channel.phase()
    }

    /// Register a coupled field.
    ///
    /// The field gets its own internal field named `<name>.__internal__`
    /// with the adapter's element type and component count, restricted to
    /// `mask` when given.
    ///
    /// # Errors
    /// `DuplicateName`, `DuplicateTag`, or any internal-field construction
    /// error. Nothing is registered on error.
    pub fn add_field<A: FieldAdapter>(
        &mut self,
        name: &str,
        adapter: A,
        native_to_internal: TransferOptions,
        internal_to_native: TransferOptions,
        mask: Option<Vec<bool>>,
    ) -> Result<FieldId, CouplingError> {
        if self.fields.contains(name) {
            return Err(CouplingError::DuplicateName {
                kind: "field",
                name: name.to_string(),
            });
        }
        let tag = CommTag::from_name(name).as_u16();
        if let Some(other) = self.tags.get(&tag) {
            return Err(CouplingError::DuplicateTag {
                name: name.to_string(),
                other: other.clone(),
                tag,
            });
        }
        let internal = InternalField::new(
            <A::Value as Element>::ELEMENT_TYPE,
            format!("{name}{INTERNAL_SUFFIX}"),
            Arc::clone(&self.mesh),
            adapter.components(),
            mask,
            None,
            self.resolution,
        )?;
        let comm = FieldCommunicator::new(
            name,
            self.channel.clone(),
            Role::Server {
                client_ranks: self.client_ranks,
            },
        );
        let model = CoupledFieldModel::new(adapter, comm, native_to_internal, internal_to_native);
        let index = self
            .fields
            .insert(name, CoupledField::new(Box::new(model), internal))?;
        self.tags.insert(tag, name.to_string());
        log::info!(
            "application `{}`: field `{name}` registered ({}, tag {tag:#06x})",
            self.name,
            A::KIND
        );
        Ok(FieldId {
            app: self.index,
            index,
        })
    }

    /// [`add_field`](Self::add_field) with the session's default transfer
    /// options and no mask.
    pub fn add_field_default<A: FieldAdapter>(
        &mut self,
        name: &str,
        adapter: A,
    ) -> Result<FieldId, CouplingError> {
        let (n2i, i2n) = self.defaults;
        self.add_field(name, adapter, n2i, i2n, None)
    }

    pub fn field_id(&self, name: &str) -> Result<FieldId, CouplingError> {
        Ok(FieldId {
            app: self.index,
            index: self.fields.id_of(name)?,
        })
    }

    fn own(&self, id: FieldId) -> Result<usize, CouplingError> {
        if id.app != self.index {
            return Err(CouplingError::UnknownName {
                kind: "field",
                name: format!("{id:?} in application `{}`", self.name),
            });
        }
        Ok(id.index)
    }

    pub fn field(&self, id: FieldId) -> Result<&CoupledField, CouplingError> {
        self.fields.get(self.own(id)?)
    }

    pub fn field_mut(&mut self, id: FieldId) -> Result<&mut CoupledField, CouplingError> {
        let slot = self.own(id)?;
        self.fields.get_mut(slot)
    }

    pub fn fields(&self) -> impl Iterator<Item = &CoupledField> {
        self.fields.iter()
    }

    /// Send one field; requires the send phase.
    pub fn send_field(&mut self, id: FieldId, mode: SendMode) -> Result<(), CouplingError> {
        self.field_mut(id)?.send(mode)
    }

    /// Receive one field; requires the receive phase.
    pub fn receive_field(&mut self, id: FieldId) -> Result<(), CouplingError> {
        self.field_mut(id)?.receive()
    }

    /// Drop the cached exchange layout of one field.
    pub fn invalidate_layout(&mut self, id: FieldId) -> Result<(), CouplingError> {
        self.field_mut(id)?.invalidate_layout();
        Ok(())
    }

    pub fn begin_send_phase(&mut self) -> Result<(), CouplingError> {
        self.channel.begin_send_phase()
    }

    /// Complete every deferred send, then leave the send phase.
    pub fn end_send_phase(&mut self) -> Result<(), CouplingError> {
        if !self.channel.in_send_phase() {
            return self.channel.end_send_phase();
        }
        for f in self.fields.iter_mut() {
            f.flush();
        }
        self.channel.end_send_phase()
    }

    pub fn begin_receive_phase(&mut self) -> Result<(), CouplingError> {
        self.channel.begin_receive_phase()
    }

    pub fn end_receive_phase(&mut self) -> Result<(), CouplingError> {
        self.channel.end_receive_phase()
    }

    /// Run `f` inside a send phase. The phase is closed even if `f` fails.
    pub fn send_phase<R>(
        &mut self,
        f: impl FnOnce(&mut Self) -> Result<R, CouplingError>,
    ) -> Result<R, CouplingError> {
        self.begin_send_phase()?;
        let out = f(self);
        let end = self.end_send_phase();
        let out = out?;
        end.map(|_| out)
    }

    /// Run `f` inside a receive phase. The phase is closed even if `f` fails.
    pub fn receive_phase<R>(
        &mut self,
        f: impl FnOnce(&mut Self) -> Result<R, CouplingError>,
    ) -> Result<R, CouplingError> {
        self.begin_receive_phase()?;
        let out = f(self);
        let end = self.end_receive_phase();
        let out = out?;
        end.map(|_| out)
    }
}

impl<C: Communicator + 'static> FieldStore for Registry<Application<C>> {
    fn field(&self, id: FieldId) -> Result<&CoupledField, CouplingError> {
        self.get(id.app)?.field(id)
    }

    fn field_mut(&mut self, id: FieldId) -> Result<&mut CoupledField, CouplingError> {
        self.get_mut(id.app)?.field_mut(id)
    }
}

type PhaseFn<C> = fn(&mut Application<C>) -> Result<(), CouplingError>;

/// Rendezvous-side session on one rank.
pub struct CouplerServer<C: Communicator> {
    name: String,
    partition: Arc<Partition>,
    mesh: Arc<InternalMesh>,
    config: CouplerConfig,
    applications: Registry<Application<C>>,
    internal_fields: Registry<InternalEntry>,
    gather_ops: Registry<GatherOperation>,
    scatter_ops: Registry<ScatterOperation>,
}

impl<C: Communicator + 'static> CouplerServer<C> {
    pub fn new(
        name: impl Into<String>,
        partition: impl Into<Arc<Partition>>,
        mesh: impl Into<Arc<InternalMesh>>,
        config: CouplerConfig,
    ) -> Result<Self, CouplingError> {
        config.validate()?;
        let name = name.into();
        let partition = partition.into();
        log::info!(
            "coupler `{name}`: {} partition over {} ranks",
            partition.kind(),
            partition.ranks().len()
        );
        Ok(Self {
            name,
            partition,
            mesh: mesh.into(),
            config,
            applications: Registry::new("application"),
            internal_fields: Registry::new("internal field"),
            gather_ops: Registry::new("gather operation"),
            scatter_ops: Registry::new("scatter operation"),
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn partition(&self) -> &Partition {
        &self.partition
    }

    pub fn mesh(&self) -> &Arc<InternalMesh> {
        &self.mesh
    }

    pub fn config(&self) -> &CouplerConfig {
        &self.config
    }

    /// Register an application reached through `comm`, with `client_ranks`
    /// ranks on its side.
    pub fn add_application(
        &mut self,
        name: &str,
        comm: C,
        client_ranks: usize,
    ) -> Result<ApplicationId, CouplingError> {
        if client_ranks == 0 {
            return Err(CouplingError::InvalidConfig(format!(
                "application `{name}` needs at least one rank"
            )));
        }
        let index = self.applications.len();
        let comm = match self.config.recv_timeout() {
            Some(t) => comm.with_recv_timeout(t),
            None => comm,
        };
        let app = Application {
            name: name.to_string(),
            index,
            channel: Channel::new(name, comm),
            client_ranks,
            mesh: Arc::clone(&self.mesh),
            resolution: self.config.search_grid,
            defaults: (self.config.native_to_internal, self.config.internal_to_native),
            fields: Registry::new("field"),
            tags: HashMap::new(),
        };
        self.applications.insert(name, app)?;
        log::info!("coupler `{}`: application `{name}` ({client_ranks} ranks)", self.name);
        Ok(ApplicationId(index))
    }

    pub fn application_id(&self, name: &str) -> Result<ApplicationId, CouplingError> {
        self.applications.id_of(name).map(ApplicationId)
    }

    pub fn application(&self, id: ApplicationId) -> Result<&Application<C>, CouplingError> {
        self.applications.get(id.0)
    }

    pub fn application_mut(
        &mut self,
        id: ApplicationId,
    ) -> Result<&mut Application<C>, CouplingError> {
        self.applications.get_mut(id.0)
    }

    pub fn field(&self, id: FieldId) -> Result<&CoupledField, CouplingError> {
        self.applications.field(id)
    }

    /// The concrete adapter of a field, checked against its adapter tag.
    pub fn field_adapter<A: FieldAdapter>(&self, id: FieldId) -> Result<&A, CouplingError> {
        self.field(id)?.adapter::<A>()
    }

    pub fn field_adapter_mut<A: FieldAdapter>(
        &mut self,
        id: FieldId,
    ) -> Result<&mut A, CouplingError> {
        self.applications.field_mut(id)?.adapter_mut::<A>()
    }

    pub fn internal_field_id(&self, name: &str) -> Result<InternalFieldId, CouplingError> {
        self.internal_fields.id_of(name).map(InternalFieldId)
    }

    pub fn internal_field(&self, name: &str) -> Result<&InternalField, CouplingError> {
        let slot = self.internal_fields.id_of(name)?;
        Ok(&self.internal_fields.get(slot)?.field)
    }

    /// Mutable access for values set directly on the rendezvous side.
    pub fn internal_field_mut(&mut self, name: &str) -> Result<&mut InternalField, CouplingError> {
        let slot = self.internal_fields.id_of(name)?;
        Ok(&mut self.internal_fields.get_mut(slot)?.field)
    }

    /// Whether the last gather into `name` succeeded (true if never gathered).
    pub fn internal_field_is_valid(&self, name: &str) -> Result<bool, CouplingError> {
        let slot = self.internal_fields.id_of(name)?;
        Ok(self.internal_fields.get(slot)?.valid)
    }

    /// Shared component count of `fields`.
    fn components_of(&self, op: &str, fields: &[FieldId]) -> Result<usize, CouplingError> {
        let mut comps = None;
        for &id in fields {
            let f = self.field(id)?;
            let c = f.internal().components();
            match comps {
                None => comps = Some(c),
                Some(expected) if expected != c => {
                    return Err(CouplingError::ShapeMismatch {
                        name: f.name().to_string(),
                        expected,
                        found: c,
                    });
                }
                Some(_) => {}
            }
        }
        comps.ok_or_else(|| CouplingError::InvalidConfig(format!("operation `{op}` has no fields")))
    }

    /// Existing internal field matching `spec`, or a new one not yet
    /// registered.
    fn find_or_build(
        &self,
        spec: &InternalFieldSpec,
        components: usize,
    ) -> Result<Result<usize, InternalField>, CouplingError> {
        if let Ok(slot) = self.internal_fields.id_of(&spec.name) {
            let existing = &self.internal_fields.get(slot)?.field;
            if existing.element_type() != spec.element_type {
                return Err(CouplingError::ElementTypeMismatch {
                    name: spec.name.clone(),
                    expected: spec.element_type,
                    found: existing.element_type(),
                });
            }
            if existing.components() != components {
                return Err(CouplingError::ShapeMismatch {
                    name: spec.name.clone(),
                    expected: existing.components(),
                    found: components,
                });
            }
            return Ok(Ok(slot));
        }
        InternalField::new(
            spec.element_type,
            spec.name.clone(),
            Arc::clone(&self.mesh),
            components,
            spec.mask.clone(),
            spec.global_id_name.as_deref(),
            self.config.search_grid,
        )
        .map(Err)
    }

    fn commit_internal(
        &mut self,
        found: Result<usize, InternalField>,
    ) -> Result<InternalFieldId, CouplingError> {
        match found {
            Ok(slot) => Ok(InternalFieldId(slot)),
            Err(field) => {
                let name = field.name().to_string();
                log::info!(
                    "coupler `{}`: internal field `{name}` ({}, {} components)",
                    self.name,
                    field.element_type(),
                    field.components()
                );
                self.internal_fields
                    .insert(&name, InternalEntry::new(field))
                    .map(InternalFieldId)
            }
        }
    }

    /// Register a gather: `sources` are received, converted to their own
    /// internal fields and merged by `combiner` into the internal field
    /// described by `target` (found or created).
    pub fn add_gather_fields_op(
        &mut self,
        name: &str,
        sources: &[FieldId],
        target: InternalFieldSpec,
        combiner: CombinerFunction,
    ) -> Result<(), CouplingError> {
        if self.gather_ops.contains(name) {
            return Err(CouplingError::DuplicateName {
                kind: "gather operation",
                name: name.to_string(),
            });
        }
        let components = self.components_of(name, sources)?;
        let found = self.find_or_build(&target, components)?;
        let target_id = self.commit_internal(found)?;
        self.gather_ops.insert(
            name,
            GatherOperation::new(name, sources.to_vec(), target_id, combiner),
        )?;
        log::info!("coupler `{}`: gather `{name}` from {} fields", self.name, sources.len());
        Ok(())
    }

    /// Register a scatter of the internal field described by `source` (found
    /// or created) to `targets`.
    pub fn add_scatter_fields_op(
        &mut self,
        name: &str,
        source: InternalFieldSpec,
        targets: &[FieldId],
    ) -> Result<(), CouplingError> {
        if self.scatter_ops.contains(name) {
            return Err(CouplingError::DuplicateName {
                kind: "scatter operation",
                name: name.to_string(),
            });
        }
        let components = self.components_of(name, targets)?;
        let found = self.find_or_build(&source, components)?;
        let source_id = self.commit_internal(found)?;
        self.scatter_ops.insert(
            name,
            ScatterOperation::new(name, source_id, targets.to_vec()),
        )?;
        log::info!("coupler `{}`: scatter `{name}` to {} fields", self.name, targets.len());
        Ok(())
    }

    /// Run the named gather. Source applications must be in the receive phase.
    pub fn gather_fields(&mut self, name: &str) -> Result<(), CouplingError> {
        let slot = self.gather_ops.id_of(name)?;
        let Self {
            applications,
            internal_fields,
            gather_ops,
            ..
        } = self;
        let op = gather_ops.get_mut(slot)?;
        let target = internal_fields.get_mut(op.target().0)?;
        op.run(applications, target)
    }

    /// Run the named scatter. Target applications must be in the send phase.
    pub fn scatter_fields(&mut self, name: &str) -> Result<(), CouplingError> {
        let slot = self.scatter_ops.id_of(name)?;
        let Self {
            applications,
            internal_fields,
            scatter_ops,
            ..
        } = self;
        let op = scatter_ops.get(slot)?;
        let source = internal_fields.get(op.source().0)?;
        op.run(applications, source)
    }

    pub fn send_field(&mut self, id: FieldId, mode: SendMode) -> Result<(), CouplingError> {
        self.applications.field_mut(id)?.send(mode)
    }

    pub fn receive_field(&mut self, id: FieldId) -> Result<(), CouplingError> {
        self.applications.field_mut(id)?.receive()
    }

    pub fn begin_send_phase(&mut self, app: ApplicationId) -> Result<(), CouplingError> {
        self.application_mut(app)?.begin_send_phase()
    }

    pub fn end_send_phase(&mut self, app: ApplicationId) -> Result<(), CouplingError> {
        self.application_mut(app)?.end_send_phase()
    }

    pub fn begin_receive_phase(&mut self, app: ApplicationId) -> Result<(), CouplingError> {
        self.application_mut(app)?.begin_receive_phase()
    }

    pub fn end_receive_phase(&mut self, app: ApplicationId) -> Result<(), CouplingError> {
        self.application_mut(app)?.end_receive_phase()
    }

    /// Open the send phase of every application in `apps`, run `f`, and
    /// close them again (also when `f` fails).
    pub fn send_phase<R>(
        &mut self,
        apps: &[ApplicationId],
        f: impl FnOnce(&mut Self) -> Result<R, CouplingError>,
    ) -> Result<R, CouplingError> {
        self.bracket(
            apps,
            Application::begin_send_phase,
            Application::end_send_phase,
            f,
        )
    }

    /// Receive-phase counterpart of [`send_phase`](Self::send_phase).
    pub fn receive_phase<R>(
        &mut self,
        apps: &[ApplicationId],
        f: impl FnOnce(&mut Self) -> Result<R, CouplingError>,
    ) -> Result<R, CouplingError> {
        self.bracket(
            apps,
            Application::begin_receive_phase,
            Application::end_receive_phase,
            f,
        )
    }

    fn bracket<R>(
        &mut self,
        apps: &[ApplicationId],
        begin: PhaseFn<C>,
        end: PhaseFn<C>,
        f: impl FnOnce(&mut Self) -> Result<R, CouplingError>,
    ) -> Result<R, CouplingError> {
        for (k, &id) in apps.iter().enumerate() {
            if let Err(e) = self.application_mut(id).and_then(begin) {
                for &opened in &apps[..k] {
                    if let Ok(app) = self.application_mut(opened) {
                        let _ = end(app);
                    }
                }
                return Err(e);
            }
        }
        let out = f(self);
        let mut closed = Ok(());
        for &id in apps {
            let r = self.application_mut(id).and_then(end);
            if closed.is_ok() {
                closed = r;
            }
        }
        let out = out?;
        closed.map(|_| out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapter::ArrayFieldAdapter;
    use crate::algs::combine::{combiner, combiners};
    use crate::algs::communicator::NoComm;
    use crate::data::internal_mesh::test_support::grid_mesh;
    use crate::partitioning::ClassPartition;
    use crate::topology::entity::ModelEnt;

    fn server() -> CouplerServer<NoComm> {
        let p = ClassPartition::new(vec![0], vec![ModelEnt::new(2, 1)]).unwrap();
        CouplerServer::new("rdv", Partition::from(p), grid_mesh(1, 1), CouplerConfig::default())
            .unwrap()
    }

    fn adapter(components: usize) -> ArrayFieldAdapter<f64> {
        ArrayFieldAdapter::zeroed("x", vec![0, 1, 2, 3], components).unwrap()
    }

    #[test]
    fn failed_begin_closes_phases_already_opened() {
        let mut s = server();
        let a = s.add_application("a", NoComm, 1).unwrap();
        let b = s.add_application("b", NoComm, 1).unwrap();
        s.begin_send_phase(b).unwrap();

        let err = s.send_phase(&[a, b], |_| Ok(())).unwrap_err();
        assert!(matches!(err, CouplingError::PhaseTransition(_)));
        assert_eq!(s.application(a).unwrap().phase(), Phase::Idle);
        assert_eq!(s.application(b).unwrap().phase(), Phase::Send);
    }

    #[test]
    fn operations_check_shapes_at_registration() {
        let mut s = server();
        let app = s.add_application("a", NoComm, 1).unwrap();
        let app = s.application_mut(app).unwrap();
        let one = app.add_field_default("scalar", adapter(1)).unwrap();
        let two = app.add_field_default("vector", adapter(2)).unwrap();
        assert_eq!(
            app.field(two).unwrap().internal().name(),
            format!("vector{INTERNAL_SUFFIX}")
        );

        let err = s
            .add_gather_fields_op(
                "g",
                &[one, two],
                InternalFieldSpec::new("t", ElementType::F64),
                combiner(combiners::sum),
            )
            .unwrap_err();
        assert!(matches!(err, CouplingError::ShapeMismatch { .. }));
        assert!(s.internal_field("t").is_err());

        let err = s
            .add_scatter_fields_op("s", InternalFieldSpec::new("t", ElementType::F64), &[])
            .unwrap_err();
        assert!(matches!(err, CouplingError::InvalidConfig(_)));

        s.add_scatter_fields_op("s", InternalFieldSpec::new("t", ElementType::F64), &[two])
            .unwrap();
        assert_eq!(s.internal_field("t").unwrap().components(), 2);
    }

    #[test]
    fn unknown_names_and_foreign_ids_are_rejected() {
        let mut s = server();
        let a = s.add_application("a", NoComm, 1).unwrap();
        let b = s.add_application("b", NoComm, 1).unwrap();
        let fa = s
            .application_mut(a)
            .unwrap()
            .add_field_default("f", adapter(1))
            .unwrap();
        assert!(matches!(
            s.application(b).unwrap().field(fa),
            Err(CouplingError::UnknownName { .. })
        ));
        assert!(matches!(
            s.gather_fields("missing"),
            Err(CouplingError::UnknownName { .. })
        ));
        assert!(matches!(
            s.scatter_fields("missing"),
            Err(CouplingError::UnknownName { .. })
        ));
        assert!(matches!(
            s.add_application("c", NoComm, 0),
            Err(CouplingError::InvalidConfig(_))
        ));
        assert!(s.field_adapter::<ArrayFieldAdapter<f64>>(fa).is_ok());
    }
}
