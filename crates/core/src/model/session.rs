use serde::{Deserialize, Serialize};
use std::fmt;

use crate::model::ids::{ModeratorId, PollId, SessionId};

// ─── SESSION CODE ──────────────────────────────────────────────────────────────

/// Code derived from a completed symbol selection, e.g. `0x1A3F`.
///
/// Only the codec builds these, so every instance is `0x` plus four
/// uppercase hex digits.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct SessionCode(String);

impl SessionCode {
    pub(crate) fn from_encoded(code: String) -> Self {
        Self(code)
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SessionCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

// ─── TOKEN ─────────────────────────────────────────────────────────────────────

/// Opaque bearer credential issued in exchange for a valid `SessionCode`.
#[derive(Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Token(String);

impl Token {
    #[must_use]
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

// Keep credentials out of debug output and logs.
impl fmt::Debug for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Token(***)")
    }
}

// ─── SESSION ───────────────────────────────────────────────────────────────────

/// Server-confirmed binding of a token to a moderator's poll.
///
/// Only the moderator and poll ids are required; the backend may omit the rest.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Session {
    #[serde(rename = "idModerator")]
    pub moderator_id: ModeratorId,
    #[serde(rename = "idPoll")]
    pub poll_id: PollId,
    #[serde(rename = "idSession", default)]
    pub session_id: Option<SessionId>,
    #[serde(default)]
    pub code: String,
    #[serde(default)]
    pub status: String,
}

impl Session {
    /// The poll this session grants access to.
    #[must_use]
    pub fn poll_ref(&self) -> PollRef {
        PollRef {
            moderator_id: self.moderator_id,
            poll_id: self.poll_id,
        }
    }
}

/// (moderator, poll) pair identifying the poll a participant joined.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PollRef {
    pub moderator_id: ModeratorId,
    pub poll_id: PollId,
}

impl fmt::Display for PollRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "mod/{}/poll/{}", self.moderator_id, self.poll_id)
    }
}
