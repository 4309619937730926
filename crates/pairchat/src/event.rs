//! Events a client session hands to the console

use std::io::{self, Write};
use tokio::sync::mpsc;

/// Something the console should show
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ClientEvent {
    /// Server control text, shown verbatim
    Notice(String),
    /// The peer's public key is known; outgoing lines are now sealed
    SecureSessionReady,
    /// A chat line from the peer
    Message {
        sender: Option<String>,
        sent_at: Option<String>,
        text: String,
        /// Arrived encrypted and was decrypted locally
        sealed: bool,
    },
}

impl ClientEvent {
    /// Text to print, if any
    pub fn render(&self) -> Option<String> {
        match self {
            Self::Notice(text) => Some(text.clone()),
            Self::SecureSessionReady => None,
            Self::Message {
                sender,
                sent_at,
                text,
                ..
            } => {
                let mut line = match (sender, sent_at) {
                    (Some(sender), Some(at)) => format!("{} ({}): {}", sender, at, text),
                    (Some(sender), None) => format!("{}: {}", sender, text),
                    _ => text.clone(),
                };
                if !line.ends_with('\n') {
                    line.push('\n');
                }
                Some(line)
            }
        }
    }
}

/// Write rendered events to `out` until the session drops its sender.
///
/// Stops at the first failed write.
pub async fn print_events<W: Write>(
    mut events: mpsc::UnboundedReceiver<ClientEvent>,
    mut out: W,
) -> io::Result<()> {
    while let Some(event) = events.recv().await {
        if let Some(text) = event.render() {
            out.write_all(text.as_bytes())?;
            out.flush()?;
        }
    }
    Ok(())
}
