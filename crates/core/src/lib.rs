#![forbid(unsafe_code)]

pub mod bootstrap;
pub mod codec;
pub mod error;
pub mod model;
pub mod navigation;
pub mod time;
pub mod voting;

pub use bootstrap::{Attempt, Bootstrap, BootstrapError, BootstrapPhase};
pub use codec::{CODE_LENGTH, CodecError, encode};
pub use error::Error;
pub use navigation::{NavigationError, QuestionNavigator};
pub use time::{Clock, VOTE_GRACE_MS, vote_grace};
pub use voting::{Ballot, PendingVote, VoteError};
