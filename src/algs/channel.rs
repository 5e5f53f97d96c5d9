//! Channel: one communicator shared by every field of an application, plus
//! the communication phase those fields must respect.
//!
//! Phases bracket bursts of traffic. Sends are only legal inside a send phase
//! and receives inside a receive phase; phases do not nest.

use std::fmt;
use std::sync::Arc;

use parking_lot::Mutex;

use crate::algs::communicator::Communicator;
use crate::coupling_error::CouplingError;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Phase {
    Idle,
    Send,
    Receive,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Phase::Idle => "idle",
            Phase::Send => "send",
            Phase::Receive => "receive",
        })
    }
}

pub struct Channel<C> {
    name: Arc<str>,
    comm: Arc<C>,
    phase: Arc<Mutex<Phase>>,
}

impl<C> Clone for Channel<C> {
    fn clone(&self) -> Self {
        Self {
            name: Arc::clone(&self.name),
            comm: Arc::clone(&self.comm),
            phase: Arc::clone(&self.phase),
        }
    }
}

impl<C: Communicator> Channel<C> {
    pub fn new(name: impl Into<String>, comm: C) -> Self {
        Self {
            name: Arc::from(name.into()),
            comm: Arc::new(comm),
            phase: Arc::new(Mutex::new(Phase::Idle)),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn comm(&self) -> &C {
        &self.comm
    }

    pub fn phase(&self) -> Phase {
        *self.phase.lock()
    }

    pub fn in_send_phase(&self) -> bool {
        self.phase() == Phase::Send
    }

    pub fn in_receive_phase(&self) -> bool {
        self.phase() == Phase::Receive
    }

    fn transition(&self, from: Phase, to: Phase) -> Result<(), CouplingError> {
        let mut phase = self.phase.lock();
        if *phase != from {
            return Err(CouplingError::PhaseTransition(format!(
                "channel `{}`: cannot enter {to} phase from {}",
                self.name, *phase
            )));
        }
        log::debug!("channel `{}`: {from} -> {to}", self.name);
        *phase = to;
        Ok(())
    }

    pub fn begin_send_phase(&self) -> Result<(), CouplingError> {
        self.transition(Phase::Idle, Phase::Send)
    }

    pub fn end_send_phase(&self) -> Result<(), CouplingError> {
        self.transition(Phase::Send, Phase::Idle)
    }

    pub fn begin_receive_phase(&self) -> Result<(), CouplingError> {
        self.transition(Phase::Idle, Phase::Receive)
    }

    pub fn end_receive_phase(&self) -> Result<(), CouplingError> {
        self.transition(Phase::Receive, Phase::Idle)
    }

    /// Fail with `NotInSendPhase` unless a send phase is open.
    pub fn require_send(&self, field: &str) -> Result<(), CouplingError> {
        if self.in_send_phase() {
            Ok(())
        } else {
            Err(CouplingError::NotInSendPhase(field.to_string()))
        }
    }

    /// Fail with `NotInReceivePhase` unless a receive phase is open.
    pub fn require_receive(&self, field: &str) -> Result<(), CouplingError> {
        if self.in_receive_phase() {
            Ok(())
        } else {
            Err(CouplingError::NotInReceivePhase(field.to_string()))
        }
    }
}
