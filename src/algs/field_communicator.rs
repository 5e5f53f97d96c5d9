//! Data motion for one coupled field.
//!
//! A [`FieldCommunicator`] owns the cached [`ExchangeLayout`] of its field and
//! the send handles of any deferred send. The adapter itself is passed to each
//! call, so the communicator never aliases native storage.
//!
//! Layout bootstrap happens on the first exchange in either direction:
//!
//! - the application side computes its layout from the reverse partition map
//!   and sends its gids (packed with the data permutation) to every
//!   rendezvous rank;
//! - the rendezvous side receives one gid frame from every application rank
//!   and matches the gids against its own masked entities.
//!
//! Within one communicator sends and receives complete in call order.

use std::mem::size_of;
use std::sync::Arc;

use crate::adapter::FieldAdapter;
use crate::algs::channel::Channel;
use crate::algs::communicator::{CommTag, Communicator, Wait};
use crate::algs::reverse_partition::{ExchangeLayout, client_layout, server_layout};
use crate::algs::wire::{Frame, FrameKind, PackedMessage, collect_pod, encode_gids, encode_values};
use crate::coupling_error::CouplingError;
use crate::data::internal_field::{Element, ElementType};
use crate::partitioning::Partition;
use crate::topology::entity::Gid;

/// Which side of the rendezvous a field communicator sits on.
#[derive(Clone, Debug)]
pub enum Role {
    /// Application rank; routes entities with the partition.
    Client { partition: Arc<Partition> },
    /// Rendezvous rank; expects frames from `client_ranks` application ranks.
    Server { client_ranks: usize },
}

/// Completion mode of a send.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum SendMode {
    /// Wait for every per-peer send before returning.
    #[default]
    Synchronous,
    /// Keep the handles pending until the next call or [`FieldCommunicator::flush`].
    Deferred,
}

pub struct FieldCommunicator<C: Communicator> {
    name: String,
    channel: Channel<C>,
    role: Role,
    tag: CommTag,
    layout: Option<ExchangeLayout>,
    pending: Vec<C::SendHandle>,
}

impl<C: Communicator> FieldCommunicator<C> {
    pub fn new(name: impl Into<String>, channel: Channel<C>, role: Role) -> Self {
        let name = name.into();
        let tag = CommTag::from_name(&name);
        Self {
            name,
            channel,
            role,
            tag,
            layout: None,
            pending: Vec::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn tag(&self) -> CommTag {
        self.tag
    }

    pub fn role(&self) -> &Role {
        &self.role
    }

    /// Channel whose phase gates this field's traffic.
    pub fn channel(&self) -> &Channel<C> {
        &self.channel
    }

    /// Cached layout, if one has been established.
    pub fn layout(&self) -> Option<&ExchangeLayout> {
        self.layout.as_ref()
    }

    /// Drop the cached layout; the next exchange re-runs the bootstrap.
    pub fn invalidate_layout(&mut self) {
        if self.layout.take().is_some() {
            log::warn!("field `{}`: exchange layout invalidated", self.name);
        }
    }

    /// Number of deferred sends not yet completed.
    pub fn pending_sends(&self) -> usize {
        self.pending.len()
    }

    /// Complete every deferred send.
    pub fn flush(&mut self) {
        for h in self.pending.drain(..) {
            let _ = h.wait();
        }
    }

    fn comm_error(&self, peer: usize, what: &str) -> CouplingError {
        CouplingError::CommError {
            neighbor: peer,
            message: format!("field `{}`: no {what} frame received", self.name),
        }
    }

    fn malformed(&self, peer: usize, message: impl Into<String>) -> CouplingError {
        CouplingError::MalformedFrame {
            field: self.name.clone(),
            peer,
            message: message.into(),
        }
    }

    fn inconsistent(&self, message: impl Into<String>) -> CouplingError {
        CouplingError::InconsistentLayout {
            field: self.name.clone(),
            message: message.into(),
        }
    }

    fn ensure_layout<A: FieldAdapter>(&mut self, adapter: &A) -> Result<(), CouplingError> {
        if self.layout.is_some() {
            return Ok(());
        }
        let layout = match &self.role {
            Role::Client { partition } => {
                let map = adapter.reverse_partition_map(partition)?;
                let layout = client_layout(&self.name, &map, &partition.ranks(), adapter.size())?;
                self.send_gids(adapter, &layout)?;
                layout
            }
            Role::Server { client_ranks } => {
                let received = self.receive_gids(*client_ranks)?;
                server_layout(&self.name, &adapter.gids(), &received)?
            }
        };
        log::debug!(
            "field `{}`: layout over {} peers, {} entities",
            self.name,
            layout.peers.len(),
            layout.count()
        );
        self.layout = Some(layout);
        Ok(())
    }

    fn send_gids<A: FieldAdapter>(
        &self,
        adapter: &A,
        layout: &ExchangeLayout,
    ) -> Result<(), CouplingError> {
        let mut packed: Vec<Gid> = vec![0; layout.count()];
        for (gid, &slot) in adapter.gids().into_iter().zip(&layout.permutation) {
            packed[slot] = gid;
        }
        let frames = layout
            .ranges()
            .map(|(peer, range)| encode_gids(&packed[range]).map(|f| (peer, f)))
            .collect::<Result<Vec<_>, String>>()
            .map_err(|m| self.inconsistent(m))?;
        let comm = self.channel.comm();
        let handles: Vec<_> = frames
            .iter()
            .map(|(peer, frame)| comm.isend(*peer, self.tag.gids().as_u16(), frame))
            .collect();
        for h in handles {
            let _ = h.wait();
        }
        Ok(())
    }

    fn receive_gids(&self, client_ranks: usize) -> Result<Vec<(usize, Vec<Gid>)>, CouplingError> {
        let comm = self.channel.comm();
        let handles: Vec<_> = (0..client_ranks)
            .map(|src| (src, comm.irecv(src, self.tag.gids().as_u16())))
            .collect();
        let mut out = Vec::with_capacity(client_ranks);
        let mut maybe_err = None;
        for (src, h) in handles {
            let data = h.wait();
            if maybe_err.is_some() {
                continue; // drain
            }
            let parsed = match &data {
                None => Err(self.comm_error(src, "gid")),
                Some(bytes) => Frame::decode(bytes)
                    .and_then(|f| match f.kind {
                        FrameKind::Gids => f.gids(),
                        FrameKind::Data => Err("data frame where gids were expected".into()),
                    })
                    .map_err(|m| self.malformed(src, m)),
            };
            match parsed {
                Ok(gids) => out.push((src, gids)),
                Err(e) => maybe_err = Some(e),
            }
        }
        match maybe_err {
            Some(e) => Err(e),
            None => Ok(out),
        }
    }

    /// Pack the adapter's masked values and send one frame per peer.
    ///
    /// # Errors
    /// `NotInSendPhase` outside a send phase; layout bootstrap errors;
    /// `InconsistentLayout` if the adapter's size no longer matches the cache.
    pub fn send<A: FieldAdapter>(
        &mut self,
        adapter: &A,
        mode: SendMode,
    ) -> Result<(), CouplingError> {
        self.flush();
        self.channel.require_send(&self.name)?;
        self.ensure_layout(adapter)?;
        let Some(layout) = self.layout.as_ref() else {
            return Err(self.missing_layout());
        };
        let count = adapter.serialize(&mut [], &[])?;
        if count != layout.permutation.len() {
            return Err(CouplingError::InconsistentLayout {
                field: self.name.clone(),
                message: format!(
                    "adapter reports {count} entities, layout holds {}",
                    layout.permutation.len()
                ),
            });
        }
        let components = adapter.components();
        let mut data = vec![A::Value::default(); count * components];
        if !data.is_empty() {
            adapter.serialize(&mut data, &layout.permutation)?;
        }
        let msg = PackedMessage {
            data,
            offsets: layout.element_offsets(components),
            dests: layout.peers.clone(),
        };
        msg.validate().map_err(|m| self.inconsistent(m))?;
        // all frames are encoded before the first send
        let elem = <A::Value as Element>::ELEMENT_TYPE;
        let frames = msg
            .segments()
            .map(|(dest, seg)| {
                encode_values(elem, seg.len() / components, components, seg).map(|f| (dest, f))
            })
            .collect::<Result<Vec<_>, String>>()
            .map_err(|m| self.inconsistent(m))?;
        let comm = self.channel.comm();
        let handles: Vec<_> = frames
            .iter()
            .map(|(dest, frame)| comm.isend(*dest, self.tag.as_u16(), frame))
            .collect();
        log::debug!(
            "field `{}`: sent {count} entities to {} peers ({mode:?})",
            self.name,
            msg.dests.len()
        );
        match mode {
            SendMode::Synchronous => {
                for h in handles {
                    let _ = h.wait();
                }
            }
            SendMode::Deferred => self.pending.extend(handles),
        }
        Ok(())
    }

    /// Receive one frame per peer and unpack into the adapter.
    ///
    /// # Errors
    /// `NotInReceivePhase` outside a receive phase; `CommError` if a peer's
    /// frame is missing; `MalformedFrame` on a kind, type or shape mismatch;
    /// `SizeMismatch` if a peer's entity count disagrees with the layout.
    pub fn receive<A: FieldAdapter>(&mut self, adapter: &mut A) -> Result<(), CouplingError> {
        self.flush();
        self.channel.require_receive(&self.name)?;
        self.ensure_layout(adapter)?;
        let Some(layout) = self.layout.as_ref() else {
            return Err(self.missing_layout());
        };
        let components = adapter.components();
        let comm = self.channel.comm();
        let handles: Vec<_> = layout
            .ranges()
            .map(|(peer, range)| (peer, range, comm.irecv(peer, self.tag.as_u16())))
            .collect();
        let mut data = vec![A::Value::default(); layout.count() * components];
        let mut maybe_err = None;
        for (peer, range, h) in handles {
            let bytes = h.wait();
            if maybe_err.is_some() {
                continue; // drain
            }
            let result = match bytes {
                None => Err(self.comm_error(peer, "data")),
                Some(bytes) => self.unpack::<A::Value>(peer, &bytes, components, range.len()).map(
                    |values| {
                        data[range.start * components..range.end * components]
                            .copy_from_slice(&values)
                    },
                ),
            };
            if let Err(e) = result {
                maybe_err = Some(e);
            }
        }
        if let Some(e) = maybe_err {
            return Err(e);
        }
        log::debug!(
            "field `{}`: received {} entities from {} peers",
            self.name,
            layout.count(),
            layout.peers.len()
        );
        adapter.deserialize(&data, &layout.permutation)
    }

    fn unpack<T: Element>(
        &self,
        peer: usize,
        bytes: &[u8],
        components: usize,
        expected: usize,
    ) -> Result<Vec<T>, CouplingError> {
        let frame = Frame::decode(bytes).map_err(|m| self.malformed(peer, m))?;
        if frame.kind != FrameKind::Data {
            return Err(self.malformed(peer, "gid frame where data was expected"));
        }
        if frame.elem != T::ELEMENT_TYPE.code() {
            let found = ElementType::from_code(frame.elem)
                .map_or_else(|| format!("code {}", frame.elem), |t| t.to_string());
            return Err(self.malformed(
                peer,
                format!("element type {found}, expected {}", T::ELEMENT_TYPE),
            ));
        }
        if frame.components != components {
            return Err(self.malformed(
                peer,
                format!("{} components, expected {components}", frame.components),
            ));
        }
        if frame.count != expected {
            return Err(CouplingError::SizeMismatch {
                field: self.name.clone(),
                peer,
                expected,
                found: frame.count,
            });
        }
        frame
            .check_payload(size_of::<T>())
            .and_then(|_| collect_pod::<T>(frame.payload))
            .map_err(|m| self.malformed(peer, m))
    }

    fn missing_layout(&self) -> CouplingError {
        CouplingError::InconsistentLayout {
            field: self.name.clone(),
            message: "no exchange layout".into(),
        }
    }
}

impl<C: Communicator> Drop for FieldCommunicator<C> {
    fn drop(&mut self) {
        self.flush();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapter::ArrayFieldAdapter;
    use crate::algs::communicator::{LocalHub, Side};
    use crate::partitioning::ClassPartition;
    use crate::topology::entity::ModelEnt;

    fn partition() -> Arc<Partition> {
        Arc::new(
            ClassPartition::new(vec![0, 1], vec![ModelEnt::new(2, 1), ModelEnt::new(2, 2)])
                .unwrap()
                .into(),
        )
    }

    fn client_adapter() -> ArrayFieldAdapter<f64> {
        ArrayFieldAdapter::new("t", vec![10, 11, 12, 13], vec![1.0, 2.0, 3.0, 4.0], 1)
            .unwrap()
            .with_classification(vec![
                ModelEnt::new(2, 2),
                ModelEnt::new(2, 1),
                ModelEnt::new(2, 2),
                ModelEnt::new(2, 1),
            ])
            .unwrap()
    }

    #[test]
    fn send_requires_send_phase() {
        let hub = LocalHub::new();
        let ch = Channel::new("app", hub.endpoint(Side::Client, 0));
        let mut fc = FieldCommunicator::new("t", ch, Role::Client { partition: partition() });
        let err = fc.send(&client_adapter(), SendMode::Synchronous).unwrap_err();
        assert_eq!(err, CouplingError::NotInSendPhase("t".into()));
        assert!(fc.layout().is_none());
    }

    #[test]
    fn client_to_two_servers() {
        let hub = LocalHub::new();
        let ch = Channel::new("app", hub.endpoint(Side::Client, 0));
        let role = Role::Client {
            partition: partition(),
        };
        let mut fc = FieldCommunicator::new("t", ch.clone(), role);
        ch.begin_send_phase().unwrap();
        fc.send(&client_adapter(), SendMode::Deferred).unwrap();
        assert_eq!(fc.pending_sends(), 2);
        fc.flush();
        ch.end_send_phase().unwrap();
        assert_eq!(fc.layout().unwrap().offsets, vec![0, 2, 4]);

        // rank 0 owns (2, 1): gids 11 and 13
        let mut got = Vec::new();
        for rank in 0..2 {
            let sch = Channel::new("app", hub.endpoint(Side::Server, rank));
            let gids = if rank == 0 { vec![11, 13] } else { vec![10, 12] };
            let mut server = ArrayFieldAdapter::<f64>::zeroed("t", gids, 1).unwrap();
            let role = Role::Server { client_ranks: 1 };
            let mut sfc = FieldCommunicator::new("t", sch.clone(), role);
            sch.begin_receive_phase().unwrap();
            sfc.receive(&mut server).unwrap();
            got.push(server.values().to_vec());
        }
        assert_eq!(got, vec![vec![2.0, 4.0], vec![1.0, 3.0]]);
        assert_eq!(hub.pending(), 0);
    }

    #[test]
    fn size_mismatch_is_reported() {
        let hub = LocalHub::new();
        let sch = Channel::new("app", hub.endpoint(Side::Server, 0));
        let client = hub.endpoint(Side::Client, 0);
        let tag = CommTag::from_name("t");
        client.isend(0, tag.gids().as_u16(), &encode_gids(&[5, 6]).unwrap());
        let frame = encode_values(ElementType::F64, 1, 1, &[1.0f64]).unwrap();
        client.isend(0, tag.as_u16(), &frame);

        let mut server = ArrayFieldAdapter::<f64>::zeroed("t", vec![6, 5], 1).unwrap();
        let mut sfc = FieldCommunicator::new("t", sch.clone(), Role::Server { client_ranks: 1 });
        sch.begin_receive_phase().unwrap();
        let err = sfc.receive(&mut server).unwrap_err();
        assert_eq!(
            err,
            CouplingError::SizeMismatch {
                field: "t".into(),
                peer: 0,
                expected: 2,
                found: 1
            }
        );
    }

    #[test]
    fn element_type_mismatch_is_malformed() {
        let hub = LocalHub::new();
        let sch = Channel::new("app", hub.endpoint(Side::Server, 0));
        let client = hub.endpoint(Side::Client, 0);
        let tag = CommTag::from_name("t");
        client.isend(0, tag.gids().as_u16(), &encode_gids(&[5]).unwrap());
        let frame = encode_values(ElementType::I32, 1, 1, &[1i32]).unwrap();
        client.isend(0, tag.as_u16(), &frame);

        let mut server = ArrayFieldAdapter::<f64>::zeroed("t", vec![5], 1).unwrap();
        let mut sfc = FieldCommunicator::new("t", sch.clone(), Role::Server { client_ranks: 1 });
        sch.begin_receive_phase().unwrap();
        assert!(matches!(
            sfc.receive(&mut server),
            Err(CouplingError::MalformedFrame { peer: 0, .. })
        ));
    }

    #[test]
    fn invalidated_layout_is_rebuilt() {
        let hub = LocalHub::new();
        let ch = Channel::new("app", hub.endpoint(Side::Client, 0));
        let role = Role::Client {
            partition: partition(),
        };
        let mut fc = FieldCommunicator::new("t", ch.clone(), role);
        ch.begin_send_phase().unwrap();
        fc.send(&client_adapter(), SendMode::Synchronous).unwrap();
        fc.invalidate_layout();
        assert!(fc.layout().is_none());
        fc.send(&client_adapter(), SendMode::Synchronous).unwrap();
        // two gid frames and two data frames per server rank
        assert_eq!(hub.pending(), 8);
    }
}
