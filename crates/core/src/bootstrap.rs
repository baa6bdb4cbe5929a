//! Session bootstrap state machine.
//!
//! The machine never performs I/O. Each transition that needs the backend hands
//! back what to send (a `SessionCode`, a `Token`); the caller runs the request and
//! reports the outcome through the matching completion method.

use thiserror::Error;

use crate::codec::{self, CODE_LENGTH, CodecError};
use crate::model::{PollRef, Session, SessionCode, Symbol, Token};

// ─── ERRORS ───────────────────────────────────────────────────────────────────

/// Errors returned when an intent or completion arrives in the wrong phase.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum BootstrapError {
    #[error("a code submission is already in flight")]
    SubmissionInFlight,
    #[error("already joined a session")]
    AlreadyJoined,
    #[error("no failed session lookup to retry")]
    NothingToRetry,
    #[error("unexpected completion while {0:?}")]
    UnexpectedCompletion(BootstrapPhase),
    #[error("completion for attempt {issued} arrived during attempt {current}")]
    StaleCompletion { issued: Attempt, current: Attempt },
    #[error(transparent)]
    Codec(#[from] CodecError),
}

// ─── PHASE ────────────────────────────────────────────────────────────────────

/// Where the participant is in the join flow.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BootstrapPhase {
    /// Picking symbols; `selected` is the current buffer length (`< 4`).
    Collecting { selected: usize },
    /// The encoded code is being exchanged for a token.
    Submitting,
    /// A token is held and the session lookup is pending or failed.
    AwaitingSession,
    /// Session resolved.
    Ready,
    /// The backend refused the code; the next symbol starts over.
    Rejected,
}

/// Tags one submission or resume. Completions carry the attempt they were
/// issued under and are refused once a newer attempt has started.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub struct Attempt(u64);

impl Attempt {
    fn next(self) -> Self {
        Self(self.0 + 1)
    }
}

impl std::fmt::Display for Attempt {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "#{}", self.0)
    }
}

// ─── MACHINE ──────────────────────────────────────────────────────────────────

#[derive(Debug, Clone)]
pub struct Bootstrap {
    phase: BootstrapPhase,
    buffer: Vec<Symbol>,
    submitted_code: Option<SessionCode>,
    code_rejected: bool,
    lookup_failed: bool,
    token: Option<Token>,
    session: Option<Session>,
    attempt: Attempt,
}

impl Default for Bootstrap {
    fn default() -> Self {
        Self::new()
    }
}

impl Bootstrap {
    #[must_use]
    pub fn new() -> Self {
        Self {
            phase: BootstrapPhase::Collecting { selected: 0 },
            buffer: Vec::with_capacity(CODE_LENGTH),
            submitted_code: None,
            code_rejected: false,
            lookup_failed: false,
            token: None,
            session: None,
            attempt: Attempt::default(),
        }
    }

    #[must_use]
    pub fn phase(&self) -> BootstrapPhase {
        self.phase
    }

    /// The attempt that requests issued now belong to.
    #[must_use]
    pub fn attempt(&self) -> Attempt {
        self.attempt
    }

    /// Symbols picked so far, in selection order.
    #[must_use]
    pub fn buffer(&self) -> &[Symbol] {
        &self.buffer
    }

    /// Whether `symbol` is part of the current selection (for highlighting).
    #[must_use]
    pub fn is_selected(&self, symbol: Symbol) -> bool {
        self.buffer.contains(&symbol)
    }

    #[must_use]
    pub fn submitted_code(&self) -> Option<&SessionCode> {
        self.submitted_code.as_ref()
    }

    /// Error indicator raised by a rejected code.
    #[must_use]
    pub fn code_rejected(&self) -> bool {
        self.code_rejected
    }

    #[must_use]
    pub fn lookup_failed(&self) -> bool {
        self.lookup_failed
    }

    #[must_use]
    pub fn token(&self) -> Option<&Token> {
        self.token.as_ref()
    }

    #[must_use]
    pub fn session(&self) -> Option<&Session> {
        self.session.as_ref()
    }

    /// Appends a symbol. Returns the code to submit once the fourth symbol lands.
    ///
    /// After a rejection the stale selection and error indicator are cleared
    /// first, so `symbol` starts a fresh one-element buffer.
    ///
    /// # Errors
    ///
    /// Returns `BootstrapError::SubmissionInFlight` while a code or session
    /// request is pending and `BootstrapError::AlreadyJoined` once ready.
    pub fn add_symbol(&mut self, symbol: Symbol) -> Result<Option<SessionCode>, BootstrapError> {
        match self.phase {
            BootstrapPhase::Submitting | BootstrapPhase::AwaitingSession => {
                return Err(BootstrapError::SubmissionInFlight);
            }
            BootstrapPhase::Ready => return Err(BootstrapError::AlreadyJoined),
            BootstrapPhase::Rejected => {
                self.buffer.clear();
                self.code_rejected = false;
            }
            BootstrapPhase::Collecting { .. } => {}
        }

        self.buffer.push(symbol);

        if self.buffer.len() < CODE_LENGTH {
            self.phase = BootstrapPhase::Collecting {
                selected: self.buffer.len(),
            };
            return Ok(None);
        }

        let code = codec::encode(&self.buffer)?;
        self.attempt = self.attempt.next();
        self.submitted_code = Some(code.clone());
        self.phase = BootstrapPhase::Submitting;
        Ok(Some(code))
    }

    /// The backend accepted the code and issued `token`.
    ///
    /// # Errors
    ///
    /// Returns `BootstrapError::StaleCompletion` for an older attempt and
    /// `BootstrapError::UnexpectedCompletion` unless submitting.
    pub fn code_accepted(&mut self, attempt: Attempt, token: Token) -> Result<(), BootstrapError> {
        self.expect(attempt, BootstrapPhase::Submitting)?;
        self.token = Some(token);
        self.lookup_failed = false;
        self.phase = BootstrapPhase::AwaitingSession;
        Ok(())
    }

    /// The code exchange failed (rejected or unreachable).
    ///
    /// # Errors
    ///
    /// Returns `BootstrapError::StaleCompletion` for an older attempt and
    /// `BootstrapError::UnexpectedCompletion` unless submitting.
    pub fn code_refused(&mut self, attempt: Attempt) -> Result<(), BootstrapError> {
        self.expect(attempt, BootstrapPhase::Submitting)?;
        self.buffer.clear();
        self.code_rejected = true;
        self.phase = BootstrapPhase::Rejected;
        Ok(())
    }

    /// Skips symbol entry with a token kept from an earlier run.
    ///
    /// # Errors
    ///
    /// Returns the same errors as `add_symbol` when a request is pending or
    /// the session is already resolved.
    pub fn resume_with(&mut self, token: Token) -> Result<(), BootstrapError> {
        match self.phase {
            BootstrapPhase::Submitting | BootstrapPhase::AwaitingSession => {
                Err(BootstrapError::SubmissionInFlight)
            }
            BootstrapPhase::Ready => Err(BootstrapError::AlreadyJoined),
            BootstrapPhase::Collecting { .. } | BootstrapPhase::Rejected => {
                self.attempt = self.attempt.next();
                self.buffer.clear();
                self.code_rejected = false;
                self.token = Some(token);
                self.lookup_failed = false;
                self.phase = BootstrapPhase::AwaitingSession;
                Ok(())
            }
        }
    }

    /// The session lookup succeeded. Returns the poll to publish.
    ///
    /// # Errors
    ///
    /// Returns `BootstrapError::StaleCompletion` for an older attempt and
    /// `BootstrapError::UnexpectedCompletion` unless awaiting the session.
    pub fn session_resolved(
        &mut self,
        attempt: Attempt,
        session: Session,
    ) -> Result<PollRef, BootstrapError> {
        self.expect(attempt, BootstrapPhase::AwaitingSession)?;
        let poll = session.poll_ref();
        self.session = Some(session);
        self.lookup_failed = false;
        self.phase = BootstrapPhase::Ready;
        Ok(poll)
    }

    /// The session lookup failed. The phase stays `AwaitingSession`.
    ///
    /// # Errors
    ///
    /// Returns `BootstrapError::StaleCompletion` for an older attempt and
    /// `BootstrapError::UnexpectedCompletion` unless awaiting the session.
    pub fn session_lookup_failed(&mut self, attempt: Attempt) -> Result<(), BootstrapError> {
        self.expect(attempt, BootstrapPhase::AwaitingSession)?;
        self.lookup_failed = true;
        Ok(())
    }

    /// Re-arms a failed session lookup and returns the token to use.
    ///
    /// # Errors
    ///
    /// Returns `BootstrapError::NothingToRetry` unless the last lookup failed.
    pub fn retry_lookup(&mut self) -> Result<Token, BootstrapError> {
        match (&self.token, self.phase, self.lookup_failed) {
            (Some(token), BootstrapPhase::AwaitingSession, true) => {
                let token = token.clone();
                self.lookup_failed = false;
                Ok(token)
            }
            _ => Err(BootstrapError::NothingToRetry),
        }
    }

    /// Drops the token, session and selection. Requests still in flight
    /// become stale.
    pub fn reset(&mut self) {
        *self = Self {
            attempt: self.attempt.next(),
            ..Self::new()
        };
    }

    fn expect(&self, attempt: Attempt, phase: BootstrapPhase) -> Result<(), BootstrapError> {
        if attempt != self.attempt {
            return Err(BootstrapError::StaleCompletion {
                issued: attempt,
                current: self.attempt,
            });
        }
        if self.phase != phase {
            return Err(BootstrapError::UnexpectedCompletion(self.phase));
        }
        Ok(())
    }
}
