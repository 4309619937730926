//! Participant registry shared by all sessions
//!
//! The registry is the only shared mutable state in the server. Every
//! mutation and fan-out runs under one mutex; fan-out only enqueues frames
//! on each participant's [`OutboundLink`], so no socket I/O happens while
//! the lock is held.

use pairchat_net::{Frame, Notice, OutboundLink};
use parking_lot::Mutex;
use std::fmt;
use thiserror::Error;
use tracing::{debug, warn};

/// Room capacity
pub const CAPACITY: usize = 2;

/// Registry errors
#[derive(Debug, Error, PartialEq, Eq)]
pub enum RegistryError {
    #[error("room full ({0} participants)")]
    RoomFull(usize),
}

/// Server-assigned participant identifier
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct ParticipantId(u64);

impl fmt::Display for ParticipantId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Registry entry: a named participant and the link to its socket writer
#[derive(Clone, Debug)]
pub struct ParticipantHandle {
    pub id: ParticipantId,
    pub name: String,
    link: OutboundLink,
}

/// Outcome of a successful join
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Admission {
    pub id: ParticipantId,
    /// Registry size after the join
    pub size: usize,
    /// This join filled the room and the secure-session notice went out
    pub secure_session_started: bool,
}

/// Result of a fan-out
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct BroadcastReport {
    pub delivered: usize,
    /// Participants whose writer has already stopped
    pub failed: Vec<ParticipantId>,
}

impl BroadcastReport {
    pub fn is_complete(&self) -> bool {
        self.failed.is_empty()
    }
}

#[derive(Debug, Default)]
struct RegistryState {
    participants: Vec<ParticipantHandle>,
    next_id: u64,
    secure_sessions_started: u64,
}

/// Capacity-bounded, join-ordered participant table
#[derive(Debug)]
pub struct Registry {
    capacity: usize,
    state: Mutex<RegistryState>,
}

impl Registry {
    pub fn new() -> Self {
        Self::with_capacity(CAPACITY)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            capacity,
            state: Mutex::new(RegistryState::default()),
        }
    }

    /// Admit a participant.
    ///
    /// Atomically with the append, every participant (the newcomer included)
    /// is sent `Connected(name)`, and the join that fills the room also sends
    /// `SecureSessionStart` to everyone.
    pub fn join(
        &self,
        name: impl Into<String>,
        link: OutboundLink,
    ) -> Result<Admission, RegistryError> {
        let mut state = self.state.lock();
        let size = state.participants.len();
        if size >= self.capacity {
            return Err(RegistryError::RoomFull(size));
        }

        let id = ParticipantId(state.next_id);
        state.next_id += 1;
        let name = name.into();
        state.participants.push(ParticipantHandle {
            id,
            name: name.clone(),
            link,
        });

        let size = state.participants.len();
        fan_out(&state.participants, None, &Notice::Connected(name).to_frame());

        let secure_session_started = size == self.capacity;
        if secure_session_started {
            state.secure_sessions_started += 1;
            fan_out(&state.participants, None, &Notice::SecureSessionStart.to_frame());
        }

        Ok(Admission {
            id,
            size,
            secure_session_started,
        })
    }

    /// Remove a participant; a no-op if it is already gone
    pub fn leave(&self, id: ParticipantId) -> Option<ParticipantHandle> {
        let mut state = self.state.lock();
        remove(&mut state.participants, id)
    }

    /// Remove a participant and send `Bye(name)` to the remaining
    /// participants and to the leaver itself.
    ///
    /// Returns `None` without announcing if the participant was already gone.
    pub fn leave_and_announce(&self, id: ParticipantId) -> Option<BroadcastReport> {
        let mut state = self.state.lock();
        let leaver = remove(&mut state.participants, id)?;

        let bye = Notice::Bye(leaver.name.clone()).to_frame();
        let report = fan_out(&state.participants, None, &bye);
        // The leaver may already have hung up; its own copy is best-effort.
        if leaver.link.send(bye).is_err() {
            debug!("Leaver {} already disconnected", leaver.id);
        }
        Some(report)
    }

    /// Enqueue a frame for every participant
    pub fn broadcast_to_all(&self, frame: &Frame) -> BroadcastReport {
        let state = self.state.lock();
        fan_out(&state.participants, None, frame)
    }

    /// Enqueue a frame for every participant except `sender`
    pub fn broadcast_to_others(&self, sender: ParticipantId, frame: &Frame) -> BroadcastReport {
        let state = self.state.lock();
        fan_out(&state.participants, Some(sender), frame)
    }

    pub fn len(&self) -> usize {
        self.state.lock().participants.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Names in join order
    pub fn names(&self) -> Vec<String> {
        self.state
            .lock()
            .participants
            .iter()
            .map(|p| p.name.clone())
            .collect()
    }

    /// Number of secure-session notices sent so far
    pub fn secure_sessions_started(&self) -> u64 {
        self.state.lock().secure_sessions_started
    }
}

impl Default for Registry {
    fn default() -> Self {
        Self::new()
    }
}

fn remove(participants: &mut Vec<ParticipantHandle>, id: ParticipantId) -> Option<ParticipantHandle> {
    let index = participants.iter().position(|p| p.id == id)?;
    Some(participants.remove(index))
}

fn fan_out(
    participants: &[ParticipantHandle],
    skip: Option<ParticipantId>,
    frame: &Frame,
) -> BroadcastReport {
    let mut report = BroadcastReport::default();
    for participant in participants.iter().filter(|p| Some(p.id) != skip) {
        match participant.link.send(frame.clone()) {
            Ok(()) => report.delivered += 1,
            Err(e) => {
                warn!("Failed to deliver to {} ({}): {}", participant.name, participant.id, e);
                report.failed.push(participant.id);
            }
        }
    }
    report
}
