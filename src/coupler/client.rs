//! Application-side coupling session.
//!
//! A [`CouplerClient`] holds the native side of every coupled field of one
//! application rank. Fields are matched with the rendezvous side by name, so
//! both sides must register the same names.

use std::sync::Arc;

use hashbrown::HashMap;

use super::coupled_field::{ExchangeModel, FieldExchange, downcast_adapter, downcast_adapter_mut};
use super::registry::Registry;
use super::FieldId;
use crate::adapter::FieldAdapter;
use crate::algs::channel::{Channel, Phase};
use crate::algs::communicator::{CommTag, Communicator};
use crate::algs::field_communicator::{FieldCommunicator, Role, SendMode};
use crate::config::CouplerConfig;
use crate::coupling_error::CouplingError;
use crate::partitioning::Partition;

pub struct CouplerClient<C: Communicator> {
    name: String,
    partition: Arc<Partition>,
    channel: Channel<C>,
    fields: Registry<Box<dyn FieldExchange>>,
    tags: HashMap<u16, String>,
}

impl<C: Communicator + 'static> CouplerClient<C> {
    /// Session with the default configuration.
    pub fn new(name: impl Into<String>, comm: C, partition: impl Into<Arc<Partition>>) -> Self {
        let name = name.into();
        Self {
            channel: Channel::new(name.clone(), comm),
            name,
            partition: partition.into(),
            fields: Registry::new("field"),
            tags: HashMap::new(),
        }
    }

    /// Session honouring `config` (receive timeout).
    pub fn with_config(
        name: impl Into<String>,
        comm: C,
        partition: impl Into<Arc<Partition>>,
        config: &CouplerConfig,
    ) -> Result<Self, CouplingError> {
        config.validate()?;
        let comm = match config.recv_timeout() {
            Some(t) => comm.with_recv_timeout(t),
            None => comm,
        };
        Ok(Self::new(name, comm, partition))
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// The rendezvous decomposition fields are routed with.
    pub fn partition(&self) -> &Partition {
        &self.partition
    }

    pub fn phase(&self) -> Phase {
        self.channel.phase()
    }

    /// Register a native field under `name`.
    ///
    /// # Errors
    /// `DuplicateName` or `DuplicateTag`; nothing is registered on error.
    pub fn add_field<A: FieldAdapter>(
        &mut self,
        name: &str,
        adapter: A,
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
        let comm = FieldCommunicator::new(
            name,
            self.channel.clone(),
            Role::Client {
                partition: Arc::clone(&self.partition),
            },
        );
        let index = self
            .fields
            .insert(name, Box::new(ExchangeModel::new(adapter, comm)))?;
        self.tags.insert(tag, name.to_string());
        log::info!("client `{}`: field `{name}` registered ({})", self.name, A::KIND);
        Ok(FieldId { app: 0, index })
    }

    pub fn field_id(&self, name: &str) -> Result<FieldId, CouplingError> {
        Ok(FieldId {
            app: 0,
            index: self.fields.id_of(name)?,
        })
    }

    fn exchange(&mut self, id: FieldId) -> Result<&mut Box<dyn FieldExchange>, CouplingError> {
        self.fields.get_mut(id.index)
    }

    pub fn field_adapter<A: FieldAdapter>(&self, id: FieldId) -> Result<&A, CouplingError> {
        downcast_adapter::<A, _>(&**self.fields.get(id.index)?)
    }

    pub fn field_adapter_mut<A: FieldAdapter>(
        &mut self,
        id: FieldId,
    ) -> Result<&mut A, CouplingError> {
        downcast_adapter_mut::<A, _>(&mut **self.exchange(id)?)
    }

    /// Send one field; requires the send phase.
    pub fn send_field(&mut self, id: FieldId, mode: SendMode) -> Result<(), CouplingError> {
        self.exchange(id)?.send(mode)
    }

    /// Receive one field; requires the receive phase.
    pub fn receive_field(&mut self, id: FieldId) -> Result<(), CouplingError> {
        self.exchange(id)?.receive()
    }

    /// Drop the cached layout of one field, e.g. after the native mesh changed.
    pub fn invalidate_layout(&mut self, id: FieldId) -> Result<(), CouplingError> {
        self.exchange(id)?.invalidate_layout();
        Ok(())
    }

    pub fn begin_send_phase(&mut self) -> Result<(), CouplingError> {
        self.channel.begin_send_phase()
    }

    /// Complete every deferred send, then leave the send phase.
    pub fn end_send_phase(&mut self) -> Result<(), CouplingError> {
        if self.channel.in_send_phase() {
            for f in self.fields.iter_mut() {
                f.flush();
            }
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

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapter::{ArrayFieldAdapter, ClassifiedFieldAdapter};
    use crate::algs::communicator::NoComm;
    use crate::partitioning::ClassPartition;
    use crate::topology::entity::ModelEnt;

    fn client() -> CouplerClient<NoComm> {
        let p = ClassPartition::new(vec![0], vec![ModelEnt::new(0, 1)]).unwrap();
        CouplerClient::new("app", NoComm, Partition::from(p))
    }

    #[test]
    fn duplicate_field_names_fail() {
        let mut c = client();
        let a = ArrayFieldAdapter::<f64>::zeroed("x", vec![1, 2], 1).unwrap();
        let id = c.add_field("density", a.clone()).unwrap();
        let err = c.add_field("density", a).unwrap_err();
        assert!(matches!(err, CouplingError::DuplicateName { .. }));
        assert_eq!(c.field_id("density").unwrap(), id);
    }

    #[test]
    fn adapters_are_recovered_by_kind() {
        let mut c = client();
        let id = c
            .add_field("t", ArrayFieldAdapter::new("t", vec![4], vec![2i32], 1).unwrap())
            .unwrap();
        assert_eq!(c.field_adapter::<ArrayFieldAdapter<i32>>(id).unwrap().values(), &[2]);
        c.field_adapter_mut::<ArrayFieldAdapter<i32>>(id).unwrap().values_mut()[0] = 5;
        assert_eq!(c.field_adapter::<ArrayFieldAdapter<i32>>(id).unwrap().values(), &[5]);

        assert!(matches!(
            c.field_adapter::<ClassifiedFieldAdapter<i32>>(id),
            Err(CouplingError::AdapterKindMismatch { .. })
        ));
        // same kind, different element type
        assert!(matches!(
            c.field_adapter::<ArrayFieldAdapter<f64>>(id),
            Err(CouplingError::AdapterKindMismatch { .. })
        ));
    }

    #[test]
    fn phase_closures_close_on_error() {
        let mut c = client();
        let err = c
            .send_phase(|c| -> Result<(), CouplingError> {
                assert_eq!(c.phase(), Phase::Send);
                Err(CouplingError::InvalidConfig("boom".into()))
            })
            .unwrap_err();
        assert_eq!(err, CouplingError::InvalidConfig("boom".into()));
        assert_eq!(c.phase(), Phase::Idle);
        assert!(c.end_receive_phase().is_err());
    }
}
