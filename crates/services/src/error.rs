//! Shared error types for the services crate.

use thiserror::Error;

use poll_core::{BootstrapError, NavigationError, VoteError};
use storage::repository::StorageError;

/// Failures reported by a `PollGateway`.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum GatewayError {
    #[error("server answered with status {status}")]
    Server { status: u16 },
    #[error("transport failure: {0}")]
    Transport(String),
    #[error("malformed response: {0}")]
    Decode(String),
    #[error("invalid endpoint: {0}")]
    Endpoint(String),
}

impl GatewayError {
    /// The backend no longer accepts the token (403).
    #[must_use]
    pub fn is_token_invalid(&self) -> bool {
        matches!(self, GatewayError::Server { status: 403 })
    }
}

impl From<reqwest::Error> for GatewayError {
    fn from(err: reqwest::Error) -> Self {
        // Request URLs carry the token as a query parameter.
        let err = err.without_url();
        if err.is_decode() {
            GatewayError::Decode(err.to_string())
        } else {
            GatewayError::Transport(err.to_string())
        }
    }
}

/// Errors emitted by `BootstrapService`.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum BootstrapServiceError {
    #[error("session is not resolved yet")]
    NotReady,
    #[error(transparent)]
    Bootstrap(#[from] BootstrapError),
    #[error(transparent)]
    Gateway(#[from] GatewayError),
    #[error(transparent)]
    Storage(#[from] StorageError),
}

/// Errors emitted by `QuestionService`.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum QuestionServiceError {
    #[error(transparent)]
    Navigation(#[from] NavigationError),
    #[error(transparent)]
    Gateway(#[from] GatewayError),
}

/// Errors emitted by `VoteService`.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum VoteServiceError {
    #[error(transparent)]
    Vote(#[from] VoteError),
}
