use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use chrono::{DateTime, Utc};
use poll_core::model::{Answer, AnswerId, Question, QuestionId, Token};
use poll_core::{Ballot, Clock};
use tracing::{debug, warn};

use crate::error::VoteServiceError;
use crate::gateway::PollGateway;

/// How a vote ended up after the server answered.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VoteOutcome {
    /// The server acknowledged; the optimistic state stands.
    Confirmed,
    /// The server refused; the local selection was restored.
    RolledBack,
    /// The server refused, but a newer selection already replaced this one.
    Superseded,
}

/// Applies answer selections optimistically and reconciles with the server.
pub struct VoteService {
    gateway: Arc<dyn PollGateway>,
    token: Token,
    clock: Clock,
    state: Mutex<Ballot>,
}

impl VoteService {
    #[must_use]
    pub fn new(gateway: Arc<dyn PollGateway>, token: Token) -> Self {
        Self::with_clock(gateway, token, Clock::default())
    }

    #[must_use]
    pub fn with_clock(gateway: Arc<dyn PollGateway>, token: Token, clock: Clock) -> Self {
        Self {
            gateway,
            token,
            clock,
            state: Mutex::new(Ballot::new()),
        }
    }

    #[must_use]
    pub fn now(&self) -> DateTime<Utc> {
        self.clock.now()
    }

    fn state(&self) -> MutexGuard<'_, Ballot> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    #[must_use]
    pub fn snapshot(&self) -> Ballot {
        self.state().clone()
    }

    /// Answers of the displayed question with their selection flags.
    #[must_use]
    pub fn answers(&self) -> Vec<Answer> {
        self.state().answers().to_vec()
    }

    #[must_use]
    pub fn checked(&self) -> Option<AnswerId> {
        self.state().checked()
    }

    /// Set while checked answers are below the question's minimum.
    #[must_use]
    pub fn missing_answers(&self) -> Option<u32> {
        self.state().missing_answers()
    }

    /// Loads the answers of the question now on screen.
    pub fn replace_answers(&self, question: &Question, answers: Vec<Answer>) {
        self.state().replace_answers(question, answers);
    }

    /// Folds a periodic server snapshot into the displayed answers, keeping
    /// recent local votes.
    pub fn merge_answers(
        &self,
        question_id: QuestionId,
        answers: Vec<Answer>,
        fetched_at: DateTime<Utc>,
    ) -> bool {
        self.state().merge_answers(question_id, answers, fetched_at)
    }

    /// Toggles `answer_id` locally, then sends the vote. A refused vote is
    /// rolled back unless a later selection touched the same answer.
    ///
    /// # Errors
    ///
    /// Returns `VoteServiceError::Vote` if the answer is not loaded or the
    /// question's maximum is already reached; nothing is sent then.
    pub async fn select(&self, answer_id: AnswerId) -> Result<VoteOutcome, VoteServiceError> {
        let pending = self.state().select(answer_id, self.clock.now())?;
        let answer = &pending.answer;
        debug!(answer = %answer.id, selected = answer.selected, "casting vote");

        let result = self
            .gateway
            .cast_vote(
                answer.moderator_id,
                answer.poll_id,
                answer.question_id,
                answer.id,
                &self.token,
                answer,
            )
            .await;

        match result {
            Ok(()) => Ok(VoteOutcome::Confirmed),
            Err(err) => {
                warn!(answer = %answer.id, %err, "vote refused, rolling back");
                if self.state().rollback(&pending) {
                    Ok(VoteOutcome::RolledBack)
                } else {
                    Ok(VoteOutcome::Superseded)
                }
            }
        }
    }
}
