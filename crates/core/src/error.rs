use thiserror::Error;

use crate::bootstrap::BootstrapError;
use crate::codec::CodecError;
use crate::navigation::NavigationError;
use crate::voting::VoteError;

#[derive(Debug, Error)]
pub enum Error {
    #[error(transparent)]
    Codec(#[from] CodecError),
    #[error(transparent)]
    Bootstrap(#[from] BootstrapError),
    #[error(transparent)]
    Navigation(#[from] NavigationError),
    #[error(transparent)]
    Vote(#[from] VoteError),
}
