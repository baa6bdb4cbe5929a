use serde::{Deserialize, Serialize};

use crate::model::ids::{ModeratorId, PollId};
use crate::model::session::PollRef;

/// Poll metadata resolved once the session is known.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Poll {
    #[serde(rename = "idModerator")]
    pub moderator_id: ModeratorId,
    #[serde(rename = "idPoll")]
    pub poll_id: PollId,
    #[serde(default)]
    pub title: String,
}

impl Poll {
    #[must_use]
    pub fn poll_ref(&self) -> PollRef {
        PollRef {
            moderator_id: self.moderator_id,
            poll_id: self.poll_id,
        }
    }
}
