//! Per-connection session handler
//!
//! Drives one participant through
//! `Greeting -> Joining -> (Rejected | Joined) -> Relaying -> Closed`.
//! The server never holds key material: key announcements and sealed
//! payloads are relayed as opaque bytes.

use crate::registry::{ParticipantId, Registry, RegistryError};
use futures::StreamExt;
use pairchat_net::notice::{EXIT, NAME_REQUIRED, ROOM_FULL};
use pairchat_net::{
    framed, spawn_writer, ChatPayload, Frame, FrameError, FrameReader, FrameType, LinkError,
    Notice, OutboundLink,
};
use std::fmt;
use std::net::SocketAddr;
use std::sync::Arc;
use thiserror::Error;
use tokio::net::TcpStream;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// Timestamp format stamped on relayed messages (RFC 822 with numeric zone)
pub const TIMESTAMP_FORMAT: &str = "%d %b %y %H:%M %z";

/// Session errors
#[derive(Debug, Error)]
pub enum SessionError {
    #[error("Frame error: {0}")]
    Frame(#[from] FrameError),
    #[error("Link error: {0}")]
    Link(#[from] LinkError),
    #[error("Writer task failed: {0}")]
    Writer(#[from] tokio::task::JoinError),
}

/// Lifecycle state of a server-side session
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SessionState {
    Greeting,
    Joining,
    Joined,
    Relaying,
    Closed,
}

/// Why a session reached `Closed`
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum CloseReason {
    /// Peer closed the socket
    EndOfStream,
    /// Client sent `EXIT`
    Exit,
    /// Room was full
    Rejected,
    /// Client did not supply a usable name
    NoName,
    /// Read or write failure
    Transport(String),
}

impl fmt::Display for CloseReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::EndOfStream => f.write_str("end of stream"),
            Self::Exit => f.write_str("exit requested"),
            Self::Rejected => f.write_str("room full"),
            Self::NoName => f.write_str("no name"),
            Self::Transport(e) => write!(f, "transport error: {}", e),
        }
    }
}

/// Current local time in [`TIMESTAMP_FORMAT`]
pub fn timestamp() -> String {
    chrono::Local::now().format(TIMESTAMP_FORMAT).to_string()
}

type WriterTask = JoinHandle<Result<(), FrameError>>;

/// Handles a single participant connection
pub struct SessionHandler {
    registry: Arc<Registry>,
    addr: SocketAddr,
    state: SessionState,
}

impl SessionHandler {
    pub fn new(registry: Arc<Registry>, addr: SocketAddr) -> Self {
        Self {
            registry,
            addr,
            state: SessionState::Greeting,
        }
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    /// Run the session to completion.
    ///
    /// Returns once the socket writer has flushed every queued notice.
    pub async fn run(mut self, stream: TcpStream) -> Result<CloseReason, SessionError> {
        let (mut reader, writer) = framed(stream);
        let (link, rx) = OutboundLink::channel();
        let mut writer_task = spawn_writer(writer, rx);

        link.send(Notice::Welcome.to_frame())?;

        let name = match self.read_name(&mut reader).await {
            Ok(name) => name,
            Err(reason) => {
                if reason == CloseReason::NoName {
                    link.send(Notice::Error(NAME_REQUIRED.to_string()).to_frame())?;
                }
                return self.close(link, Some(writer_task), reason).await;
            }
        };

        self.transition(SessionState::Joining);
        let admission = match self.registry.join(name.clone(), link.clone()) {
            Ok(admission) => admission,
            Err(RegistryError::RoomFull(size)) => {
                info!("Rejecting {} from {}: room full ({})", name, self.addr, size);
                link.send(Notice::Error(ROOM_FULL.to_string()).to_frame())?;
                return self
                    .close(link, Some(writer_task), CloseReason::Rejected)
                    .await;
            }
        };

        self.transition(SessionState::Joined);
        info!(
            "{} connected ({}/{}: {})",
            name,
            admission.size,
            self.registry.capacity(),
            self.registry.names().join(", ")
        );
        if admission.secure_session_started {
            info!(
                "Room full, secure session {} starting",
                self.registry.secure_sessions_started()
            );
        }

        self.transition(SessionState::Relaying);
        let (reason, writer_done) = self
            .relay_loop(admission.id, &name, &mut reader, &mut writer_task)
            .await;

        self.registry.leave_and_announce(admission.id);
        info!("{} offline ({})", name, reason);

        let writer = if writer_done { None } else { Some(writer_task) };
        self.close(link, writer, reason).await
    }

    async fn read_name(&mut self, reader: &mut FrameReader) -> Result<String, CloseReason> {
        match reader.next().await {
            None => Err(CloseReason::EndOfStream),
            Some(Err(e)) => Err(CloseReason::Transport(e.to_string())),
            Some(Ok(frame)) if frame.frame_type == FrameType::Control => {
                let name = frame.text().trim().to_string();
                if name.is_empty() {
                    Err(CloseReason::NoName)
                } else {
                    Ok(name)
                }
            }
            Some(Ok(frame)) => {
                warn!(
                    "Expected name from {}, got {:?} frame",
                    self.addr, frame.frame_type
                );
                Err(CloseReason::NoName)
            }
        }
    }

    /// Relay frames until the client leaves or the socket fails.
    ///
    /// The second value is true when the writer task already finished.
    async fn relay_loop(
        &self,
        id: ParticipantId,
        name: &str,
        reader: &mut FrameReader,
        writer_task: &mut WriterTask,
    ) -> (CloseReason, bool) {
        loop {
            tokio::select! {
                next = reader.next() => match next {
                    None => return (CloseReason::EndOfStream, false),
                    Some(Err(e)) => return (CloseReason::Transport(e.to_string()), false),
                    Some(Ok(frame)) => {
                        if let Some(reason) = self.relay_frame(id, name, frame) {
                            return (reason, false);
                        }
                    }
                },
                result = &mut *writer_task => {
                    let reason = match result {
                        Ok(Err(e)) => CloseReason::Transport(e.to_string()),
                        Ok(Ok(())) => CloseReason::Transport("writer stopped".to_string()),
                        Err(e) => CloseReason::Transport(e.to_string()),
                    };
                    return (reason, true);
                }
            }
        }
    }

    /// Handle one inbound frame; returns a reason when the session must close
    fn relay_frame(&self, id: ParticipantId, name: &str, frame: Frame) -> Option<CloseReason> {
        match frame.frame_type {
            FrameType::Control => {
                let text = frame.text();
                if text.trim() == EXIT {
                    return Some(CloseReason::Exit);
                }
                warn!("Ignoring control text from {}: {:?}", name, text);
            }
            FrameType::KeyAnnouncement => {
                if !frame.payload.starts_with(b"PUBK-") {
                    warn!("Dropping non-public key token from {}", name);
                    return None;
                }
                debug!("Relaying key announcement from {}", name);
                let report = self.registry.broadcast_to_others(id, &frame);
                if report.delivered == 0 {
                    debug!("No peer yet for {}'s key announcement", name);
                }
            }
            FrameType::Payload => {
                let payload = match ChatPayload::from_frame(&frame) {
                    Ok(payload) => payload,
                    Err(e) => {
                        warn!("Dropping malformed payload from {}: {}", name, e);
                        return None;
                    }
                };
                if payload.is_blank() {
                    return None;
                }

                let relayed = payload.stamped(name, timestamp());
                match relayed.to_frame() {
                    Ok(out) => {
                        let report = self.registry.broadcast_to_others(id, &out);
                        if !report.is_complete() {
                            warn!("Message from {} not delivered to {:?}", name, report.failed);
                        }
                    }
                    Err(e) => warn!("Failed to re-encode payload from {}: {}", name, e),
                }
            }
        }
        None
    }

    async fn close(
        &mut self,
        link: OutboundLink,
        writer_task: Option<WriterTask>,
        reason: CloseReason,
    ) -> Result<CloseReason, SessionError> {
        debug!(
            "Closing session {} from {:?}: {}",
            self.addr,
            self.state(),
            reason
        );
        self.transition(SessionState::Closed);
        drop(link);

        if let Some(task) = writer_task {
            if let Err(e) = task.await? {
                debug!("Writer for {} ended with error: {}", self.addr, e);
            }
        }
        Ok(reason)
    }

    fn transition(&mut self, next: SessionState) {
        debug!("Session {}: {:?} -> {:?}", self.addr, self.state, next);
        self.state = next;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_timestamp_format() {
        let stamp = timestamp();
        // e.g. "19 Oct 26 10:00 +0000"
        let parts: Vec<_> = stamp.split(' ').collect();
        assert_eq!(parts.len(), 5);
        assert_eq!(parts[0].len(), 2);
        assert_eq!(parts[1].len(), 3);
        assert!(parts[4].starts_with('+') || parts[4].starts_with('-'));
    }

    #[test]
    fn test_close_reason_display() {
        assert_eq!(CloseReason::Exit.to_string(), "exit requested");
        assert_eq!(
            CloseReason::Transport("reset".into()).to_string(),
            "transport error: reset"
        );
    }
}
