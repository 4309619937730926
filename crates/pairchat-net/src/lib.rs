//! Wire protocol for the pairchat relay
//!
//! This crate provides:
//! - Length-prefixed, typed message framing
//! - Control notice texts and parsing
//! - The chat payload envelope
//! - TCP framing helpers and queued outbound links

pub mod framing;
pub mod message;
pub mod notice;
pub mod transport;

pub use framing::{Frame, FrameCodec, FrameError, FrameType};
pub use message::{ChatPayload, PayloadError};
pub use notice::Notice;
pub use transport::{framed, spawn_writer, FrameReader, FrameWriter, LinkError, OutboundLink};
