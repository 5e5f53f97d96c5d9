//! Thin façade over in-process or inter-process message passing between an
//! application's process group and the rendezvous group.
//!
//! Messages are *contiguous byte slices*. A communicator always talks to the
//! *other* group: `peer` is a rank in the remote group, `rank()` is this
//! process's rank in its own group. Handles are waitable; the engine calls
//! `.wait()` before it trusts that a buffer has arrived.

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::{Duration, Instant};

use bytes::Bytes;
use dashmap::DashMap;

/// Non-blocking communication interface (minimal by design).
pub trait Communicator {
    /// Handle returned by `isend`.
    type SendHandle: Wait;
    /// Handle returned by `irecv`.
    type RecvHandle: Wait;

    /// Rank of this process within its own group.
    fn rank(&self) -> usize;

    fn isend(&self, peer: usize, tag: u16, buf: &[u8]) -> Self::SendHandle;
    fn irecv(&self, peer: usize, tag: u16) -> Self::RecvHandle;

    /// Bound the time a receive handle may block. Backends without a notion
    /// of timeouts ignore it.
    fn with_recv_timeout(self, _timeout: Duration) -> Self
    where
        Self: Sized,
    {
        self
    }
}

/// Anything that can be waited on.
pub trait Wait {
    /// Wait for completion and return the received data (if any).
    fn wait(self) -> Option<Vec<u8>>;
}

impl Wait for () {
    fn wait(self) -> Option<Vec<u8>> {
        None
    }
}

/// Message tag, kept below the 32767 bound every MPI implementation honours.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CommTag(u16);

impl CommTag {
    /// Bit distinguishing gid frames from data frames.
    pub const GID_FLAG: u16 = 0x4000;
    const HASH_MASK: u16 = 0x3fff;

    pub const fn new(tag: u16) -> Self {
        Self(tag)
    }

    /// Deterministic data tag for a field name (FNV-1a folded to 14 bits).
    pub fn from_name(name: &str) -> Self {
        let mut h: u32 = 0x811c_9dc5;
        for b in name.bytes() {
            h ^= u32::from(b);
            h = h.wrapping_mul(0x0100_0193);
        }
        let folded = (h ^ (h >> 14) ^ (h >> 28)) as u16;
        Self(folded & Self::HASH_MASK)
    }

    /// Tag used for the gid frames of the same field.
    pub const fn gids(self) -> Self {
        Self(self.0 | Self::GID_FLAG)
    }

    #[inline]
    pub const fn as_u16(self) -> u16 {
        self.0
    }
}

/// Compile-time no-op comm for pure serial unit tests.
#[derive(Clone, Debug, Default)]
pub struct NoComm;

impl Communicator for NoComm {
    type SendHandle = ();
    type RecvHandle = ();

    fn rank(&self) -> usize {
        0
    }

    fn isend(&self, _peer: usize, _tag: u16, _buf: &[u8]) {}
    fn irecv(&self, _peer: usize, _tag: u16) {}
}

// --- LocalComm: intra-process / multi-thread ---

/// Which group an endpoint belongs to.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Side {
    /// Application ranks.
    Client,
    /// Rendezvous ranks.
    Server,
}

impl Side {
    pub fn remote(self) -> Side {
        match self {
            Side::Client => Side::Server,
            Side::Server => Side::Client,
        }
    }
}

type Key = (Side, usize, usize, u16); // (src side, src, dst, tag)

/// Shared FIFO mailbox connecting the endpoints of one application.
#[derive(Debug, Default)]
pub struct LocalHub {
    mailbox: DashMap<Key, VecDeque<Bytes>>,
}

impl LocalHub {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Endpoint for `rank` of group `side`.
    pub fn endpoint(self: &Arc<Self>, side: Side, rank: usize) -> LocalComm {
        LocalComm {
            hub: Arc::clone(self),
            side,
            rank,
            timeout: None,
        }
    }

    /// Messages posted but not yet received.
    pub fn pending(&self) -> usize {
        self.mailbox.iter().map(|e| e.value().len()).sum()
    }
}

#[derive(Clone, Debug)]
pub struct LocalComm {
    hub: Arc<LocalHub>,
    side: Side,
    rank: usize,
    timeout: Option<Duration>,
}

impl LocalComm {
    pub fn side(&self) -> Side {
        self.side
    }
}

pub struct LocalRecv {
    hub: Arc<LocalHub>,
    key: Key,
    timeout: Option<Duration>,
}

impl Wait for LocalRecv {
    fn wait(self) -> Option<Vec<u8>> {
        let start = Instant::now();
        loop {
            if let Some(mut queue) = self.hub.mailbox.get_mut(&self.key) {
                if let Some(bytes) = queue.pop_front() {
                    return Some(bytes.to_vec());
                }
            }
            if self.timeout.is_some_and(|t| start.elapsed() >= t) {
                log::debug!("receive on {:?} timed out", self.key);
                return None;
            }
            std::thread::yield_now();
        }
    }
}

impl Communicator for LocalComm {
    type SendHandle = ();
    type RecvHandle = LocalRecv;

    fn rank(&self) -> usize {
        self.rank
    }

    fn isend(&self, peer: usize, tag: u16, buf: &[u8]) {
        let key = (self.side, self.rank, peer, tag);
        self.hub
            .mailbox
            .entry(key)
            .or_default()
            .push_back(Bytes::copy_from_slice(buf));
    }

    fn irecv(&self, peer: usize, tag: u16) -> LocalRecv {
        LocalRecv {
            hub: Arc::clone(&self.hub),
            key: (self.side.remote(), peer, self.rank, tag),
            timeout: self.timeout,
        }
    }

    fn with_recv_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }
}

// --- MPI backend (feature = "mpi-support") ---
#[cfg(feature = "mpi-support")]
mod mpi_backend {
    use super::{Communicator, Wait};
    use mpi::topology::SimpleCommunicator;
    use mpi::traits::{Communicator as MpiCommunicator, Destination, Source};

    /// Both groups live in one MPI communicator; each group occupies a
    /// contiguous block of ranks starting at its offset.
    pub struct MpiComm {
        world: SimpleCommunicator,
        rank: usize,
        peer_offset: usize,
    }

    impl MpiComm {
        pub fn new(world: SimpleCommunicator, own_offset: usize, peer_offset: usize) -> Self {
            let rank = (world.rank() as usize).saturating_sub(own_offset);
            Self {
                world,
                rank,
                peer_offset,
            }
        }
    }

    /// Receives complete eagerly; the handle only carries the payload.
    pub struct MpiRecv(Option<Vec<u8>>);

    impl Wait for MpiRecv {
        fn wait(self) -> Option<Vec<u8>> {
            self.0
        }
    }

    impl Communicator for MpiComm {
        type SendHandle = ();
        type RecvHandle = MpiRecv;

        fn rank(&self) -> usize {
            self.rank
        }

        fn isend(&self, peer: usize, tag: u16, buf: &[u8]) {
            self.world
                .process_at_rank((self.peer_offset + peer) as i32)
                .send_with_tag(buf, i32::from(tag));
        }

        fn irecv(&self, peer: usize, tag: u16) -> MpiRecv {
            let (data, _status) = self
                .world
                .process_at_rank((self.peer_offset + peer) as i32)
                .receive_vec_with_tag::<u8>(i32::from(tag));
            MpiRecv(Some(data))
        }
    }
}

#[cfg(feature = "mpi-support")]
pub use mpi_backend::{MpiComm, MpiRecv};
