use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use poll_core::model::{
    Answer, AnswerId, ModeratorId, Poll, PollId, PollRef, Question, QuestionId, Session,
    SessionCode, Token,
};

use crate::error::GatewayError;

/// Request/response contract of the polling backend.
#[async_trait]
pub trait PollGateway: Send + Sync {
    /// Exchange a session code for a token.
    ///
    /// # Errors
    ///
    /// Returns `GatewayError::Server` when the code is refused.
    async fn exchange_code(&self, code: &SessionCode) -> Result<Token, GatewayError>;

    /// Resolve the session bound to `token`.
    ///
    /// # Errors
    ///
    /// Returns `GatewayError` on transport or server failure.
    async fn fetch_session(&self, token: &Token) -> Result<Session, GatewayError>;

    /// # Errors
    ///
    /// Returns `GatewayError` on transport or server failure.
    async fn fetch_poll(
        &self,
        moderator_id: ModeratorId,
        poll_id: PollId,
        token: &Token,
    ) -> Result<Poll, GatewayError>;

    /// # Errors
    ///
    /// Returns `GatewayError` on transport or server failure.
    async fn fetch_questions(
        &self,
        moderator_id: ModeratorId,
        poll_id: PollId,
        token: &Token,
    ) -> Result<Vec<Question>, GatewayError>;

    /// # Errors
    ///
    /// Returns `GatewayError` on transport or server failure.
    async fn fetch_answers(
        &self,
        moderator_id: ModeratorId,
        poll_id: PollId,
        question_id: QuestionId,
        token: &Token,
    ) -> Result<Vec<Answer>, GatewayError>;

    /// Send the participant's selection for one answer.
    ///
    /// # Errors
    ///
    /// Returns `GatewayError` when the vote is not acknowledged.
    async fn cast_vote(
        &self,
        moderator_id: ModeratorId,
        poll_id: PollId,
        question_id: QuestionId,
        answer_id: AnswerId,
        token: &Token,
        answer: &Answer,
    ) -> Result<(), GatewayError>;
}

#[derive(Default)]
struct Backend {
    codes: HashMap<String, Token>,
    sessions: HashMap<String, Session>,
    polls: HashMap<PollRef, Poll>,
    questions: HashMap<PollRef, Vec<Question>>,
    answers: HashMap<QuestionId, Vec<Answer>>,
    votes: Vec<(AnswerId, bool)>,
    refuse_votes: bool,
}

/// In-memory backend for tests and offline prototyping.
///
/// Unknown codes answer 403, unknown tokens 403, unknown polls 404.
#[derive(Clone, Default)]
pub struct InMemoryGateway {
    backend: Arc<Mutex<Backend>>,
}

impl InMemoryGateway {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn backend(&self) -> MutexGuard<'_, Backend> {
        self.backend.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Accept `code` and hand out `token` for it; the token resolves to `session`.
    #[must_use]
    pub fn with_session(self, code: &str, token: Token, session: Session) -> Self {
        {
            let mut backend = self.backend();
            backend.sessions.insert(token.as_str().to_string(), session);
            backend.codes.insert(code.to_string(), token);
        }
        self
    }

    #[must_use]
    pub fn with_poll(self, poll: Poll, questions: Vec<Question>) -> Self {
        {
            let mut backend = self.backend();
            backend.questions.insert(poll.poll_ref(), questions);
            backend.polls.insert(poll.poll_ref(), poll);
        }
        self
    }

    #[must_use]
    pub fn with_answers(self, question_id: QuestionId, answers: Vec<Answer>) -> Self {
        self.backend().answers.insert(question_id, answers);
        self
    }

    /// Make every following vote fail with a 500.
    pub fn refuse_votes(&self, refuse: bool) {
        self.backend().refuse_votes = refuse;
    }

    /// Server-side change of an answer's selection, as seen by later fetches.
    pub fn set_selected(&self, question_id: QuestionId, answer_id: AnswerId, selected: bool) {
        if let Some(answer) = self
            .backend()
            .answers
            .get_mut(&question_id)
            .and_then(|answers| answers.iter_mut().find(|a| a.id == answer_id))
        {
            answer.selected = selected;
        }
    }

    /// Invalidates `token`; every later request made with it answers 403.
    pub fn revoke(&self, token: &Token) {
        self.backend().sessions.remove(token.as_str());
    }

    /// Votes acknowledged so far, in arrival order.
    #[must_use]
    pub fn recorded_votes(&self) -> Vec<(AnswerId, bool)> {
        self.backend().votes.clone()
    }

    fn authorize(backend: &Backend, token: &Token) -> Result<PollRef, GatewayError> {
        backend
            .sessions
            .get(token.as_str())
            .map(Session::poll_ref)
            .ok_or(GatewayError::Server { status: 403 })
    }
}

#[async_trait]
impl PollGateway for InMemoryGateway {
    async fn exchange_code(&self, code: &SessionCode) -> Result<Token, GatewayError> {
        self.backend()
            .codes
            .get(code.as_str())
            .cloned()
            .ok_or(GatewayError::Server { status: 403 })
    }

    async fn fetch_session(&self, token: &Token) -> Result<Session, GatewayError> {
        self.backend()
            .sessions
            .get(token.as_str())
            .cloned()
            .ok_or(GatewayError::Server { status: 403 })
    }

    async fn fetch_poll(
        &self,
        moderator_id: ModeratorId,
        poll_id: PollId,
        token: &Token,
    ) -> Result<Poll, GatewayError> {
        let backend = self.backend();
        Self::authorize(&backend, token)?;
        backend
            .polls
            .get(&PollRef {
                moderator_id,
                poll_id,
            })
            .cloned()
            .ok_or(GatewayError::Server { status: 404 })
    }

    async fn fetch_questions(
        &self,
        moderator_id: ModeratorId,
        poll_id: PollId,
        token: &Token,
    ) -> Result<Vec<Question>, GatewayError> {
        let backend = self.backend();
        Self::authorize(&backend, token)?;
        backend
            .questions
            .get(&PollRef {
                moderator_id,
                poll_id,
            })
            .cloned()
            .ok_or(GatewayError::Server { status: 404 })
    }

    async fn fetch_answers(
        &self,
        _moderator_id: ModeratorId,
        _poll_id: PollId,
        question_id: QuestionId,
        token: &Token,
    ) -> Result<Vec<Answer>, GatewayError> {
        let backend = self.backend();
        Self::authorize(&backend, token)?;
        Ok(backend.answers.get(&question_id).cloned().unwrap_or_default())
    }

    async fn cast_vote(
        &self,
        _moderator_id: ModeratorId,
        _poll_id: PollId,
        question_id: QuestionId,
        answer_id: AnswerId,
        token: &Token,
        answer: &Answer,
    ) -> Result<(), GatewayError> {
        let mut backend = self.backend();
        Self::authorize(&backend, token)?;
        if backend.refuse_votes {
            return Err(GatewayError::Server { status: 500 });
        }
        let stored = backend
            .answers
            .get_mut(&question_id)
            .and_then(|answers| answers.iter_mut().find(|a| a.id == answer_id))
            .ok_or(GatewayError::Server { status: 404 })?;
        stored.selected = answer.selected;
        backend.votes.push((answer_id, answer.selected));
        Ok(())
    }
}
