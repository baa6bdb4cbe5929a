use std::sync::Arc;

use poll_core::Clock;
use poll_core::model::{PollRef, Token};
use storage::repository::{Storage, TokenStore};

use crate::bootstrap_service::BootstrapService;
use crate::error::BootstrapServiceError;
use crate::gateway::PollGateway;
use crate::question_service::QuestionService;
use crate::vote_service::VoteService;

/// Assembles the client-facing services around one gateway.
#[derive(Clone)]
pub struct PollServices {
    gateway: Arc<dyn PollGateway>,
    bootstrap: Arc<BootstrapService>,
    clock: Clock,
}

impl PollServices {
    #[must_use]
    pub fn new(gateway: Arc<dyn PollGateway>, tokens: Arc<dyn TokenStore>) -> Self {
        let bootstrap = Arc::new(BootstrapService::new(Arc::clone(&gateway), tokens));
        Self {
            gateway,
            bootstrap,
            clock: Clock::default(),
        }
    }

    /// Clock used to date votes for the refresh grace window.
    #[must_use]
    pub fn with_clock(mut self, clock: Clock) -> Self {
        self.clock = clock;
        self
    }

    #[must_use]
    pub fn from_storage(gateway: Arc<dyn PollGateway>, storage: &Storage) -> Self {
        Self::new(gateway, Arc::clone(&storage.tokens))
    }

    #[must_use]
    pub fn bootstrap(&self) -> Arc<BootstrapService> {
        Arc::clone(&self.bootstrap)
    }

    /// Question and vote services for `poll`, authenticated with `token`.
    #[must_use]
    pub fn open_poll(&self, poll: PollRef, token: Token) -> QuestionService {
        let votes = Arc::new(VoteService::with_clock(
            Arc::clone(&self.gateway),
            token.clone(),
            self.clock,
        ));
        QuestionService::new(Arc::clone(&self.gateway), token, poll, votes)
    }

    /// Question and vote services for the session the bootstrapper resolved.
    ///
    /// # Errors
    ///
    /// Returns `BootstrapServiceError::NotReady` before the session is resolved.
    pub fn open_joined_poll(&self) -> Result<QuestionService, BootstrapServiceError> {
        let snapshot = self.bootstrap.snapshot();
        match (snapshot.token(), snapshot.session()) {
            (Some(token), Some(session)) => Ok(self.open_poll(session.poll_ref(), token.clone())),
            _ => Err(BootstrapServiceError::NotReady),
        }
    }
}
