use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use poll_core::model::{Poll, PollRef, Session, Symbol, Token};
use poll_core::{Attempt, Bootstrap, BootstrapError, BootstrapPhase};
use storage::repository::TokenStore;
use tokio::sync::watch;
use tracing::{debug, error, info, warn};

use crate::error::BootstrapServiceError;
use crate::gateway::PollGateway;

/// Drives the join flow: symbols → code → token → session.
///
/// State lives behind a mutex that is never held across a request, so
/// observers calling `snapshot` always see a whole transition.
pub struct BootstrapService {
    gateway: Arc<dyn PollGateway>,
    tokens: Arc<dyn TokenStore>,
    state: Mutex<Bootstrap>,
    resolved: watch::Sender<Option<PollRef>>,
}

impl BootstrapService {
    #[must_use]
    pub fn new(gateway: Arc<dyn PollGateway>, tokens: Arc<dyn TokenStore>) -> Self {
        let (resolved, _) = watch::channel(None);
        Self {
            gateway,
            tokens,
            state: Mutex::new(Bootstrap::new()),
            resolved,
        }
    }

    fn state(&self) -> MutexGuard<'_, Bootstrap> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Receives the poll of every resolved session, and `None` on leave.
    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<Option<PollRef>> {
        self.resolved.subscribe()
    }

    /// Consistent copy of the bootstrap state.
    #[must_use]
    pub fn snapshot(&self) -> Bootstrap {
        self.state().clone()
    }

    #[must_use]
    pub fn phase(&self) -> BootstrapPhase {
        self.state().phase()
    }

    #[must_use]
    pub fn token(&self) -> Option<Token> {
        self.state().token().cloned()
    }

    #[must_use]
    pub fn session(&self) -> Option<Session> {
        self.state().session().cloned()
    }

    /// Adds a symbol; the fourth one submits the code and, if accepted, looks
    /// up the session. Request failures end up in the state, not in `Err`.
    ///
    /// # Errors
    ///
    /// Returns `BootstrapServiceError::Bootstrap` when the symbol is not
    /// accepted in the current phase.
    pub async fn add_symbol(&self, symbol: Symbol) -> Result<BootstrapPhase, BootstrapServiceError> {
        let (code, attempt) = {
            let mut state = self.state();
            match state.add_symbol(symbol)? {
                Some(code) => (code, state.attempt()),
                None => return Ok(state.phase()),
            }
        };

        info!(%code, %attempt, "submitting session code");
        match self.gateway.exchange_code(&code).await {
            Ok(token) => {
                if !self.complete(|state| state.code_accepted(attempt, token.clone())) {
                    return Ok(self.phase());
                }
                if let Err(err) = self.tokens.store_token(&token).await {
                    warn!(%err, "could not persist token");
                }
                self.lookup_session(attempt, token).await;
            }
            Err(err) => {
                warn!(%code, %err, "session code refused");
                self.complete(|state| state.code_refused(attempt));
            }
        }

        Ok(self.phase())
    }

    /// Re-issues a session lookup that failed after a successful code exchange.
    ///
    /// # Errors
    ///
    /// Returns `BootstrapError::NothingToRetry` unless the last lookup failed.
    pub async fn retry_session_lookup(&self) -> Result<BootstrapPhase, BootstrapServiceError> {
        let (token, attempt) = {
            let mut state = self.state();
            let token = state.retry_lookup()?;
            (token, state.attempt())
        };
        self.lookup_session(attempt, token).await;
        Ok(self.phase())
    }

    /// Rejoins with a token kept from an earlier run. Returns `false` when
    /// nothing is stored.
    ///
    /// # Errors
    ///
    /// Returns `BootstrapServiceError::Storage` if the store cannot be read, or
    /// `BootstrapServiceError::Bootstrap` when a join is already under way.
    pub async fn resume(&self) -> Result<bool, BootstrapServiceError> {
        let Some(token) = self.tokens.load_token().await? else {
            debug!("no stored token to resume");
            return Ok(false);
        };
        let attempt = {
            let mut state = self.state();
            state.resume_with(token.clone())?;
            state.attempt()
        };
        info!(%attempt, "resuming with stored token");
        self.lookup_session(attempt, token).await;
        Ok(true)
    }

    /// Fetches metadata of the joined poll.
    ///
    /// # Errors
    ///
    /// Returns `BootstrapServiceError::NotReady` before the session is resolved
    /// and `BootstrapServiceError::Gateway` if the request fails.
    pub async fn resolve_poll(&self) -> Result<Poll, BootstrapServiceError> {
        let (token, poll) = {
            let state = self.state();
            match (state.token(), state.session()) {
                (Some(token), Some(session)) => (token.clone(), session.poll_ref()),
                _ => return Err(BootstrapServiceError::NotReady),
            }
        };
        let poll = self
            .gateway
            .fetch_poll(poll.moderator_id, poll.poll_id, &token)
            .await?;
        Ok(poll)
    }

    /// Logs out: forgets the stored token and starts over.
    ///
    /// # Errors
    ///
    /// Returns `BootstrapServiceError::Storage` if the token cannot be cleared;
    /// local state is reset regardless.
    pub async fn leave(&self) -> Result<(), BootstrapServiceError> {
        self.state().reset();
        self.resolved.send_replace(None);
        info!("left session");
        self.tokens.clear_token().await?;
        Ok(())
    }

    async fn lookup_session(&self, attempt: Attempt, token: Token) {
        match self.gateway.fetch_session(&token).await {
            Ok(session) => {
                let mut state = self.state();
                match state.session_resolved(attempt, session) {
                    Ok(poll) => {
                        info!(%poll, "session resolved");
                        self.resolved.send_replace(Some(poll));
                    }
                    Err(err) => debug!(%err, "discarding stale session response"),
                }
            }
            Err(err) => {
                error!(%err, "session lookup failed after code exchange");
                self.complete(|state| state.session_lookup_failed(attempt));
            }
        }
    }

    /// Applies a request completion. Completions of an attempt abandoned by
    /// `leave` or superseded by a newer one are dropped.
    fn complete(&self, apply: impl FnOnce(&mut Bootstrap) -> Result<(), BootstrapError>) -> bool {
        match apply(&mut self.state()) {
            Ok(()) => true,
            Err(err) => {
                debug!(%err, "discarding stale completion");
                false
            }
        }
    }
}
