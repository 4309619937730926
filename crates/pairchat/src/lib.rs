//! pairchat - two-party encrypted chat client
//!
//! Joins a pairchatd room, exchanges X25519 public keys with the other
//! participant once the room is full, and seals every chat line for the
//! peer. The private key never leaves the session.

pub mod config;
pub mod event;
pub mod session;

pub use config::Config;
pub use event::{print_events, ClientEvent};
pub use session::{ClientError, ClientSession, CloseReason, KeyState};
