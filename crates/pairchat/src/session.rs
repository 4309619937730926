//! Client session: key exchange and the encrypt/decrypt duplex loop
//!
//! After the greeting, two activities run until the session ends:
//! - outbound: console lines -> (sealed) payload frames
//! - inbound: socket frames -> key handling, decryption, console events
//!
//! Both share one [`KeyState`] owned by the session. Until the peer's
//! public key arrives, lines go out as plaintext (pass-through).

use crate::event::ClientEvent;
use futures::{SinkExt, StreamExt};
use pairchat_core::cipher;
use pairchat_core::keys::{KeyPair, KeyToken, PublicKey, PRIVATE_TAG};
use pairchat_core::{CryptoError, KeyError};
use pairchat_net::notice::EXIT;
use pairchat_net::{
    framed, ChatPayload, Frame, FrameError, FrameReader, FrameType, FrameWriter, Notice,
    PayloadError,
};
use parking_lot::RwLock;
use std::sync::Arc;
use thiserror::Error;
use tokio::net::TcpStream;
use tokio::sync::{broadcast, mpsc, Mutex};
use tracing::{debug, info, warn};

/// Client session errors
#[derive(Debug, Error)]
pub enum ClientError {
    #[error("Frame error: {0}")]
    Frame(#[from] FrameError),
    #[error("Payload error: {0}")]
    Payload(#[from] PayloadError),
    #[error("Key error: {0}")]
    Key(#[from] KeyError),
    #[error("Connection closed during greeting")]
    ClosedDuringGreeting,
    #[error("Unexpected greeting: {0:?}")]
    UnexpectedGreeting(String),
    #[error("Session task failed: {0}")]
    Task(#[from] tokio::task::JoinError),
}

/// How a client session ended
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum CloseReason {
    /// Server closed the connection
    EndOfStream,
    /// Local `EXIT` or console end-of-input
    Exit,
    /// Server refused us with an `ERROR` notice
    Rejected(String),
}

/// Per-session key material
#[derive(Debug, Default)]
pub struct KeyState {
    local: Option<KeyPair>,
    peer: Option<PublicKey>,
}

impl KeyState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the local keypair and forget the peer key.
    ///
    /// Returns the public key to announce.
    pub fn regenerate(&mut self) -> Result<PublicKey, KeyError> {
        let pair = KeyPair::generate()?;
        let public = *pair.public_key();
        self.local = Some(pair);
        self.peer = None;
        Ok(public)
    }

    /// Apply a key token from the peer.
    ///
    /// A corrupt token leaves the state untouched. Returns true when a peer
    /// public key was stored.
    pub fn accept_peer_token(&mut self, token: &str) -> Result<bool, KeyError> {
        match KeyToken::parse(token)? {
            KeyToken::Public(key) => {
                self.peer = Some(key);
                Ok(true)
            }
            KeyToken::Private(_) => {
                warn!("Ignoring private key token from the wire");
                Ok(false)
            }
        }
    }

    pub fn forget_peer(&mut self) {
        self.peer = None;
    }

    pub fn peer_key(&self) -> Option<&PublicKey> {
        self.peer.as_ref()
    }

    pub fn local_public_key(&self) -> Option<&PublicKey> {
        self.local.as_ref().map(KeyPair::public_key)
    }

    /// Build the outgoing payload: sealed for the peer if its key is known
    pub fn seal(&self, text: &[u8]) -> Result<ChatPayload, CryptoError> {
        match &self.peer {
            Some(peer) => Ok(ChatPayload::sealed(cipher::encrypt(text, peer)?)),
            None => Ok(ChatPayload::plain(text)),
        }
    }

    /// Recover the body of an incoming payload
    pub fn open(&self, payload: &ChatPayload) -> Result<Vec<u8>, CryptoError> {
        if !payload.sealed {
            return Ok(payload.body.clone());
        }
        let local = self.local.as_ref().ok_or(CryptoError::DecryptionFailed)?;
        cipher::decrypt(&payload.body, local.private_key())
    }
}

type SharedKeys = Arc<RwLock<KeyState>>;
type SharedWriter = Arc<Mutex<FrameWriter>>;
type Events = mpsc::UnboundedSender<ClientEvent>;
type Shutdown = (broadcast::Sender<()>, broadcast::Receiver<()>);

/// One client connection to the relay
pub struct ClientSession {
    keys: SharedKeys,
    events: Events,
}

impl ClientSession {
    pub fn new(events: Events) -> Self {
        Self {
            keys: Arc::new(RwLock::new(KeyState::new())),
            events,
        }
    }

    /// Run the session over `stream`, reading console lines from `input`.
    ///
    /// The first line is the display name. Returns after both activities
    /// have finished.
    pub async fn run(
        self,
        stream: TcpStream,
        mut input: mpsc::Receiver<String>,
    ) -> Result<CloseReason, ClientError> {
        let (mut reader, writer) = framed(stream);
        let writer: SharedWriter = Arc::new(Mutex::new(writer));

        let greeting = reader
            .next()
            .await
            .ok_or(ClientError::ClosedDuringGreeting)??;
        let text = greeting.text();
        if greeting.frame_type != FrameType::Control || Notice::parse(&text) != Some(Notice::Welcome) {
            return Err(ClientError::UnexpectedGreeting(text));
        }
        emit(&self.events, ClientEvent::Notice(text));

        let Some(name) = input.recv().await else {
            return Ok(CloseReason::Exit);
        };
        send(&writer, Frame::control(name.trim())).await?;

        // Subscribe both ends before either activity can signal.
        let (shutdown_tx, inbound_rx) = broadcast::channel(1);
        let outbound_rx = shutdown_tx.subscribe();

        let inbound = tokio::spawn(inbound(
            reader,
            writer.clone(),
            self.keys.clone(),
            self.events.clone(),
            (shutdown_tx.clone(), inbound_rx),
        ));
        let outbound = tokio::spawn(outbound(
            input,
            writer.clone(),
            self.keys.clone(),
            (shutdown_tx, outbound_rx),
        ));

        let (inbound, outbound) = tokio::join!(inbound, outbound);
        let (inbound, outbound) = (inbound?, outbound?);

        if let Err(e) = SinkExt::<Frame>::close(&mut *writer.lock().await).await {
            debug!("Closing write half: {}", e);
        }

        match (inbound?, outbound?) {
            (CloseReason::Rejected(reason), _) => Ok(CloseReason::Rejected(reason)),
            (_, CloseReason::Exit) => Ok(CloseReason::Exit),
            (reason, _) => Ok(reason),
        }
    }
}

fn emit(events: &Events, event: ClientEvent) {
    if events.send(event).is_err() {
        debug!("Console gone, dropping event");
    }
}

async fn send(writer: &SharedWriter, frame: Frame) -> Result<(), FrameError> {
    writer.lock().await.send(frame).await
}

/// Socket -> console activity
async fn inbound(
    mut reader: FrameReader,
    writer: SharedWriter,
    keys: SharedKeys,
    events: Events,
    (shutdown_tx, mut shutdown_rx): Shutdown,
) -> Result<CloseReason, ClientError> {
    let result = loop {
        let next = tokio::select! {
            next = reader.next() => next,
            _ = shutdown_rx.recv() => break Ok(CloseReason::EndOfStream),
        };

        let frame = match next {
            None => break Ok(CloseReason::EndOfStream),
            Some(Err(e)) => break Err(ClientError::from(e)),
            Some(Ok(frame)) => frame,
        };

        match handle_frame(frame, &writer, &keys, &events).await {
            Ok(None) => {}
            Ok(Some(reason)) => break Ok(reason),
            Err(e) => break Err(e),
        }
    };

    let _ = shutdown_tx.send(());
    result
}

async fn handle_frame(
    frame: Frame,
    writer: &SharedWriter,
    keys: &SharedKeys,
    events: &Events,
) -> Result<Option<CloseReason>, ClientError> {
    match frame.frame_type {
        FrameType::Control => {
            let text = frame.text();
            let notice = Notice::parse(&text);
            emit(events, ClientEvent::Notice(text));

            match notice {
                Some(Notice::SecureSessionStart) => {
                    let public = keys.write().regenerate()?;
                    debug!("Announcing fresh public key");
                    send(writer, Frame::key_announcement(&public)).await?;
                }
                Some(Notice::Bye(name)) => {
                    debug!("{} left, back to pass-through", name);
                    keys.write().forget_peer();
                }
                Some(Notice::Error(reason)) => return Ok(Some(CloseReason::Rejected(reason))),
                _ => {}
            }
        }
        FrameType::KeyAnnouncement => {
            let accepted = keys.write().accept_peer_token(&frame.text());
            match accepted {
                Ok(true) => {
                    info!("Peer key received, secure chat ready");
                    emit(events, ClientEvent::SecureSessionReady);
                }
                Ok(false) => {}
                Err(e) => warn!("Ignoring corrupt key announcement: {}", e),
            }
        }
        FrameType::Payload => {
            let payload = match ChatPayload::from_frame(&frame) {
                Ok(payload) => payload,
                Err(e) => {
                    warn!("Dropping malformed payload: {}", e);
                    return Ok(None);
                }
            };
            let opened = keys.read().open(&payload);
            match opened {
                Ok(body) => emit(
                    events,
                    ClientEvent::Message {
                        sender: payload.sender,
                        sent_at: payload.sent_at,
                        text: String::from_utf8_lossy(&body).into_owned(),
                        sealed: payload.sealed,
                    },
                ),
                Err(e) => warn!("Dropping undecryptable message: {}", e),
            }
        }
    }
    Ok(None)
}

/// Console -> socket activity
async fn outbound(
    mut input: mpsc::Receiver<String>,
    writer: SharedWriter,
    keys: SharedKeys,
    (shutdown_tx, mut shutdown_rx): Shutdown,
) -> Result<CloseReason, ClientError> {
    let result = loop {
        let line = tokio::select! {
            line = input.recv() => line,
            _ = shutdown_rx.recv() => break Ok(CloseReason::EndOfStream),
        };

        let Some(line) = line else {
            // Console closed: leave like an explicit EXIT
            break send(&writer, Frame::control(EXIT))
                .await
                .map(|_| CloseReason::Exit)
                .map_err(ClientError::from);
        };
        let line = line.trim_end_matches(['\r', '\n']);

        if line == EXIT {
            break send(&writer, Frame::control(EXIT))
                .await
                .map(|_| CloseReason::Exit)
                .map_err(ClientError::from);
        }

        let frame = if line.trim_start().starts_with(PRIVATE_TAG) {
            warn!("Refusing to send a private key token");
            continue;
        } else if KeyToken::is_tagged(line) {
            Frame::raw_key_token(line)
        } else {
            let sealed = keys.read().seal(line.as_bytes());
            match sealed {
                Ok(payload) => match payload.to_frame() {
                    Ok(frame) => frame,
                    Err(e) => {
                        warn!("Dropping line: {}", e);
                        continue;
                    }
                },
                Err(e) => {
                    warn!("Encryption failed, line dropped: {}", e);
                    continue;
                }
            }
        };

        if let Err(e) = send(&writer, frame).await {
            break Err(ClientError::from(e));
        }
    };

    // Only a failure needs to stop the reader; after EXIT it waits for
    // the server's goodbye and end of stream.
    if result.is_err() {
        let _ = shutdown_tx.send(());
    }
    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use pairchat_core::keys::KeyEncoding;

    #[test]
    fn test_pass_through_without_peer_key() {
        let state = KeyState::new();
        let payload = state.seal(b"hello").unwrap();

        assert!(!payload.sealed);
        assert_eq!(payload.body, b"hello");
        assert_eq!(state.open(&payload).unwrap(), b"hello");
    }

    #[test]
    fn test_sealed_after_key_exchange() {
        let mut alice = KeyState::new();
        let mut bob = KeyState::new();
        let alice_pub = alice.regenerate().unwrap();
        let bob_pub = bob.regenerate().unwrap();

        assert!(alice.accept_peer_token(&bob_pub.encode()).unwrap());
        assert!(bob.accept_peer_token(&alice_pub.encode()).unwrap());

        let payload = alice.seal(b"hi").unwrap();
        assert!(payload.sealed);
        assert_ne!(payload.body, b"hi");
        assert_eq!(bob.open(&payload).unwrap(), b"hi");
        assert!(alice.open(&payload).is_err());
    }

    #[test]
    fn test_corrupt_token_keeps_existing_peer() {
        let mut state = KeyState::new();
        let peer = KeyPair::generate().unwrap();
        state.accept_peer_token(&peer.public_key().encode()).unwrap();

        let err = state.accept_peer_token("PUBK-not-hex").unwrap_err();
        assert!(matches!(err, KeyError::MalformedHex(_)));
        assert!(state.accept_peer_token("PUBK-abcd").is_err());
        assert_eq!(state.peer_key(), Some(peer.public_key()));
    }

    #[test]
    fn test_private_token_not_adopted() {
        let mut state = KeyState::new();
        let peer = KeyPair::generate().unwrap();

        assert!(!state.accept_peer_token(&peer.private_key().encode()).unwrap());
        assert!(state.peer_key().is_none());
    }

    #[test]
    fn test_regenerate_forgets_peer() {
        let mut state = KeyState::new();
        let peer = KeyPair::generate().unwrap();
        state.accept_peer_token(&peer.public_key().encode()).unwrap();

        let first = state.regenerate().unwrap();
        assert!(state.peer_key().is_none());
        assert_eq!(state.local_public_key(), Some(&first));

        let second = state.regenerate().unwrap();
        assert_ne!(first, second);
    }

    #[test]
    fn test_sealed_payload_without_local_key_fails() {
        let state = KeyState::new();
        let payload = ChatPayload::sealed(vec![0; 64]);
        assert!(state.open(&payload).is_err());
    }
}
