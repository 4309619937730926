//! pairchatd - two-party encrypted chat relay
//!
//! This daemon provides:
//! - A capacity-2 participant registry
//! - Per-connection session handling (greeting, join, relay, teardown)
//! - Relay of key announcements and opaque chat payloads

pub mod config;
pub mod registry;
pub mod server;
pub mod session;

pub use config::Config;
pub use registry::{Admission, ParticipantId, Registry, RegistryError};
pub use server::{Server, ServerError};
pub use session::{CloseReason, SessionHandler};
