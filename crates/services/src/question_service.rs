use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use poll_core::QuestionNavigator;
use poll_core::model::{Answer, PollRef, Question, Token};
use tracing::{debug, info, warn};

use crate::error::{GatewayError, QuestionServiceError};
use crate::gateway::PollGateway;
use crate::vote_service::VoteService;

/// Question list and navigation for one joined poll.
///
/// Changing the current question clears the vote state and loads the answers
/// of the new question into the shared `VoteService`. Answers are only applied
/// for the visit that requested them.
pub struct QuestionService {
    gateway: Arc<dyn PollGateway>,
    token: Token,
    poll: PollRef,
    state: Mutex<QuestionNavigator>,
    votes: Arc<VoteService>,
    token_invalid: AtomicBool,
}

impl QuestionService {
    #[must_use]
    pub fn new(
        gateway: Arc<dyn PollGateway>,
        token: Token,
        poll: PollRef,
        votes: Arc<VoteService>,
    ) -> Self {
        Self {
            gateway,
            token,
            poll,
            state: Mutex::new(QuestionNavigator::new()),
            votes,
            token_invalid: AtomicBool::new(false),
        }
    }

    fn state(&self) -> MutexGuard<'_, QuestionNavigator> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    #[must_use]
    pub fn poll(&self) -> PollRef {
        self.poll
    }

    #[must_use]
    pub fn votes(&self) -> Arc<VoteService> {
        Arc::clone(&self.votes)
    }

    #[must_use]
    pub fn snapshot(&self) -> QuestionNavigator {
        self.state().clone()
    }

    #[must_use]
    pub fn questions(&self) -> Vec<Question> {
        self.state().questions().to_vec()
    }

    #[must_use]
    pub fn current(&self) -> Option<Question> {
        self.state().current().cloned()
    }

    /// The backend refused the token on a question or answer fetch. The
    /// participant has been disconnected from the poll.
    #[must_use]
    pub fn token_invalid(&self) -> bool {
        self.token_invalid.load(Ordering::Acquire)
    }

    /// Replaces the question snapshot.
    ///
    /// # Errors
    ///
    /// Returns `QuestionServiceError::Navigation` for duplicate or invalid indexes.
    pub fn load_questions(&self, questions: Vec<Question>) -> Result<(), QuestionServiceError> {
        self.state().load_questions(questions)?;
        Ok(())
    }

    /// Fetches the poll's questions and loads them. Returns how many arrived.
    ///
    /// # Errors
    ///
    /// Returns `QuestionServiceError::Gateway` if the request fails and
    /// `QuestionServiceError::Navigation` if the list is inconsistent.
    pub async fn refresh_questions(&self) -> Result<usize, QuestionServiceError> {
        let questions = self
            .gateway
            .fetch_questions(self.poll.moderator_id, self.poll.poll_id, &self.token)
            .await
            .inspect_err(|err| self.note_failure(err, "could not fetch questions"))?;
        let count = questions.len();
        self.load_questions(questions)?;
        debug!(poll = %self.poll, count, "questions loaded");
        Ok(count)
    }

    /// Re-fetches the answers of the current question and merges them with
    /// the local votes. Returns `false` when the result was no longer wanted
    /// or there is no current question.
    ///
    /// # Errors
    ///
    /// Returns `QuestionServiceError::Gateway` if the request fails.
    pub async fn refresh_answers(&self) -> Result<bool, QuestionServiceError> {
        let current = {
            let state = self.state();
            state.current().cloned().map(|q| (q, state.visit()))
        };
        let Some((question, visit)) = current else {
            return Ok(false);
        };

        let fetched_at = self.votes.now();
        let answers = self.fetch_answers(&question).await?;

        let state = self.state();
        if state.visit() != visit {
            debug!(question = %question.id, "dropping refresh for an earlier visit");
            return Ok(false);
        }
        Ok(self.votes.merge_answers(question.id, answers, fetched_at))
    }

    /// Keeps questions and the current answers fresh every `period` until
    /// the backend refuses the token.
    pub async fn follow(&self, period: Duration) {
        info!(poll = %self.poll, ?period, "following poll");
        while !self.token_invalid() {
            // Failures are logged where they happen; the next tick retries.
            let _ = self.refresh_questions().await;
            let _ = self.refresh_answers().await;
            tokio::time::sleep(period).await;
        }
        warn!(poll = %self.poll, "stopped following, token no longer valid");
    }

    /// Shows `question` and loads its answers.
    ///
    /// # Errors
    ///
    /// Returns `QuestionServiceError::Gateway` if the answers cannot be fetched;
    /// the question stays current with an empty answer list.
    pub async fn set_current(&self, question: Question) -> Result<(), QuestionServiceError> {
        let visit = {
            let mut state = self.state();
            state.set_current(question.clone());
            self.votes.replace_answers(&question, Vec::new());
            state.visit()
        };
        self.load_answers(&question, visit).await
    }

    /// Moves to the previous question. `Ok(None)` when already first.
    ///
    /// # Errors
    ///
    /// Returns `NavigationError::NoCurrentQuestion` before any `set_current`,
    /// or a gateway error if the new question's answers cannot be fetched.
    pub async fn previous(&self) -> Result<Option<Question>, QuestionServiceError> {
        let moved = {
            let mut state = self.state();
            let moved = state.previous()?.cloned();
            moved.map(|question| {
                self.votes.replace_answers(&question, Vec::new());
                (question, state.visit())
            })
        };
        self.after_move(moved).await
    }

    /// Moves to the next question. `Ok(None)` when already last.
    ///
    /// # Errors
    ///
    /// Returns `NavigationError::NoCurrentQuestion` before any `set_current`,
    /// or a gateway error if the new question's answers cannot be fetched.
    pub async fn next(&self) -> Result<Option<Question>, QuestionServiceError> {
        let moved = {
            let mut state = self.state();
            let moved = state.next()?.cloned();
            moved.map(|question| {
                self.votes.replace_answers(&question, Vec::new());
                (question, state.visit())
            })
        };
        self.after_move(moved).await
    }

    #[must_use]
    pub fn has_previous(&self) -> bool {
        self.state().has_previous()
    }

    #[must_use]
    pub fn has_next(&self) -> bool {
        self.state().has_next()
    }

    async fn after_move(
        &self,
        moved: Option<(Question, u64)>,
    ) -> Result<Option<Question>, QuestionServiceError> {
        let Some((question, visit)) = moved else {
            return Ok(None);
        };
        self.load_answers(&question, visit).await?;
        Ok(Some(question))
    }

    async fn load_answers(
        &self,
        question: &Question,
        visit: u64,
    ) -> Result<(), QuestionServiceError> {
        let answers = self.fetch_answers(question).await?;

        // Keep the navigator locked so the visit cannot change between the
        // check and the swap.
        let state = self.state();
        if state.visit() == visit {
            self.votes.replace_answers(question, answers);
        } else {
            debug!(question = %question.id, visit, "dropping answers for an earlier visit");
        }
        Ok(())
    }

    async fn fetch_answers(
        &self,
        question: &Question,
    ) -> Result<Vec<Answer>, QuestionServiceError> {
        let answers = self
            .gateway
            .fetch_answers(
                question.moderator_id,
                question.poll_id,
                question.id,
                &self.token,
            )
            .await
            .inspect_err(|err| self.note_failure(err, "could not fetch answers"))?;
        Ok(answers)
    }

    fn note_failure(&self, err: &GatewayError, context: &'static str) {
        if err.is_token_invalid() {
            self.token_invalid.store(true, Ordering::Release);
        }
        warn!(poll = %self.poll, %err, "{context}");
    }
}
