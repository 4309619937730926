//! Chat payload envelope carried in `Payload` frames

use crate::framing::{Frame, FrameType};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Payload envelope errors
#[derive(Debug, Error)]
pub enum PayloadError {
    #[error("expected payload frame, got {0:?}")]
    WrongFrameType(FrameType),
    #[error("serialization error: {0}")]
    Serialization(#[from] postcard::Error),
}

/// A chat message body plus relay metadata.
///
/// Clients send `sender` and `sent_at` empty; the server fills them in
/// before relaying.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatPayload {
    pub sender: Option<String>,
    pub sent_at: Option<String>,
    /// `body` is ciphertext for the receiver's private key
    pub sealed: bool,
    pub body: Vec<u8>,
}

impl ChatPayload {
    /// Plaintext pass-through message
    pub fn plain(body: impl Into<Vec<u8>>) -> Self {
        Self {
            sender: None,
            sent_at: None,
            sealed: false,
            body: body.into(),
        }
    }

    /// Ciphertext message
    pub fn sealed(ciphertext: Vec<u8>) -> Self {
        Self {
            sender: None,
            sent_at: None,
            sealed: true,
            body: ciphertext,
        }
    }

    /// Attach sender metadata
    pub fn stamped(mut self, sender: &str, sent_at: String) -> Self {
        self.sender = Some(sender.to_string());
        self.sent_at = Some(sent_at);
        self
    }

    /// Plaintext message with nothing but whitespace
    pub fn is_blank(&self) -> bool {
        !self.sealed && self.body.iter().all(u8::is_ascii_whitespace)
    }

    pub fn to_frame(&self) -> Result<Frame, PayloadError> {
        let payload = postcard::to_allocvec(self)?;
        Ok(Frame::new(FrameType::Payload, payload))
    }

    pub fn from_frame(frame: &Frame) -> Result<Self, PayloadError> {
        if frame.frame_type != FrameType::Payload {
            return Err(PayloadError::WrongFrameType(frame.frame_type));
        }
        Ok(postcard::from_bytes(&frame.payload)?)
    }
}
