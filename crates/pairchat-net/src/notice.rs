//! Server-originated control notices
//!
//! Notices are plain text inside `Control` frames and are never encrypted.

use crate::framing::Frame;
use std::fmt;

/// Reason sent to a client that arrives while the room is full
pub const ROOM_FULL: &str = "Chat full, try again later";

/// Reason sent to a client that supplies an empty name
pub const NAME_REQUIRED: &str = "Name required";

const SECURE_SESSION_BANNER: &str = "NOTICE: start secure chat";

/// Literal client command that ends a session
pub const EXIT: &str = "EXIT";

/// Session-state notice from the server
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Notice {
    Welcome,
    Connected(String),
    SecureSessionStart,
    Error(String),
    Bye(String),
}

impl Notice {
    /// Parse the text of a control frame.
    ///
    /// Returns `None` for text that is not a known notice.
    pub fn parse(text: &str) -> Option<Self> {
        if let Some(reason) = text.strip_prefix("ERROR: ") {
            return Some(Self::Error(reason.trim_end_matches('\n').to_string()));
        }
        if text == Self::Welcome.to_string() {
            return Some(Self::Welcome);
        }

        // Names are free text, so only an exact banner counts as the
        // secure-session notice.
        let inner = text.strip_prefix(" - ")?.strip_suffix(" - \n")?;
        if inner == SECURE_SESSION_BANNER {
            return Some(Self::SecureSessionStart);
        }
        if let Some(name) = inner.strip_prefix("Bye ") {
            return Some(Self::Bye(name.to_string()));
        }
        inner
            .strip_suffix(" connected")
            .map(|name| Self::Connected(name.to_string()))
    }

    /// Wrap in a control frame
    pub fn to_frame(&self) -> Frame {
        Frame::control(self.to_string())
    }
}

impl fmt::Display for Notice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Welcome => f.write_str(" - Welcome to chat - \nEnter your name: "),
            Self::Connected(name) => write!(f, " - {} connected - \n", name),
            Self::SecureSessionStart => write!(f, " - {} - \n", SECURE_SESSION_BANNER),
            Self::Error(reason) => write!(f, "ERROR: {}\n", reason),
            Self::Bye(name) => write!(f, " - Bye {} - \n", name),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_wire_texts() {
        assert_eq!(
            Notice::Welcome.to_string(),
            " - Welcome to chat - \nEnter your name: "
        );
        assert_eq!(
            Notice::Connected("Alice".into()).to_string(),
            " - Alice connected - \n"
        );
        assert_eq!(
            Notice::SecureSessionStart.to_string(),
            " - NOTICE: start secure chat - \n"
        );
        assert_eq!(
            Notice::Error(ROOM_FULL.into()).to_string(),
            "ERROR: Chat full, try again later\n"
        );
        assert_eq!(Notice::Bye("Bob".into()).to_string(), " - Bye Bob - \n");
    }

    #[test]
    fn test_parse_inverts_display() {
        let notices = [
            Notice::Welcome,
            Notice::Connected("Alice".into()),
            Notice::Connected("Mary Ann".into()),
            Notice::SecureSessionStart,
            Notice::Error(ROOM_FULL.into()),
            Notice::Bye("Bob".into()),
        ];

        for notice in notices {
            assert_eq!(Notice::parse(&notice.to_string()), Some(notice));
        }
    }

    #[test]
    fn test_names_that_look_like_notices() {
        for name in [
            "NOTICE: start secure chat",
            "Welcome to chat",
            "Welcome to chat -",
            "ERROR: Chat full, try again later",
        ] {
            let connected = Notice::Connected(name.into());
            assert_eq!(Notice::parse(&connected.to_string()), Some(connected));

            let bye = Notice::Bye(name.into());
            assert_eq!(Notice::parse(&bye.to_string()), Some(bye));
        }
    }

    #[test]
    fn test_parse_unknown_text() {
        assert_eq!(Notice::parse("hello"), None);
        assert_eq!(Notice::parse(" - something - "), None);
    }
}
