use std::collections::HashSet;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use poll_core::time::fixed_now;
use poll_core::{Clock, NavigationError, VoteError};
use poll_core::model::{
    Answer, AnswerId, ModeratorId, Poll, PollId, PollRef, Question, QuestionId, Session,
    SessionCode, SessionId, Token,
};
use services::{
    GatewayError, InMemoryGateway, PollGateway, PollServices, QuestionService,
    QuestionServiceError, VoteOutcome, VoteService, VoteServiceError,
};
use storage::repository::InMemoryTokenStore;
use tokio::sync::Semaphore;

fn poll_ref() -> PollRef {
    PollRef {
        moderator_id: ModeratorId::new(5),
        poll_id: PollId::new(9),
    }
}

fn question(id: u64, index: f64) -> Question {
    Question::new(
        QuestionId::new(id),
        ModeratorId::new(5),
        PollId::new(9),
        index,
        format!("Question {id}"),
    )
}

fn answer(id: u64, question: u64) -> Answer {
    Answer::new(
        AnswerId::new(id),
        ModeratorId::new(5),
        PollId::new(9),
        QuestionId::new(question),
        format!("Answer {id}"),
    )
}

fn backend() -> InMemoryGateway {
    let session = Session {
        moderator_id: ModeratorId::new(5),
        poll_id: PollId::new(9),
        session_id: Some(SessionId::new(1)),
        code: "0x0123".into(),
        status: "open".into(),
    };
    InMemoryGateway::new()
        .with_session("0x0123", Token::new("tok-abc"), session)
        .with_poll(
            Poll {
                moderator_id: ModeratorId::new(5),
                poll_id: PollId::new(9),
                title: "Retro".into(),
            },
            vec![
                question(1, 1.0),
                question(2, 2.0),
                question(3, 2.5),
                question(4, 4.0),
            ],
        )
        .with_answers(QuestionId::new(1), vec![answer(10, 1), answer(11, 1)])
        .with_answers(QuestionId::new(3), vec![answer(30, 3), answer(31, 3)])
        .with_answers(QuestionId::new(4), vec![answer(40, 4)])
}

async fn open(gateway: Arc<dyn PollGateway>) -> QuestionService {
    let services = PollServices::new(gateway, Arc::new(InMemoryTokenStore::new()))
        .with_clock(Clock::fixed(fixed_now()));
    let questions = services.open_poll(poll_ref(), Token::new("tok-abc"));
    questions.refresh_questions().await.expect("questions load");
    questions
}

fn is_selected(votes: &VoteService, id: u64) -> bool {
    votes
        .answers()
        .iter()
        .find(|a| a.id == AnswerId::new(id))
        .is_some_and(|a| a.selected)
}

#[tokio::test]
async fn navigation_follows_index_order_and_loads_answers() {
    let questions = open(Arc::new(backend())).await;

    let err = questions.next().await.unwrap_err();
    assert!(matches!(
        err,
        QuestionServiceError::Navigation(NavigationError::NoCurrentQuestion)
    ));

    questions.set_current(question(3, 2.5)).await.unwrap();
    assert_eq!(questions.votes().answers().len(), 2);

    let prev = questions.previous().await.unwrap().expect("moved back");
    assert_eq!(prev.index_in_poll, 2.0);
    assert!(questions.votes().answers().is_empty());

    questions.set_current(question(3, 2.5)).await.unwrap();
    let next = questions.next().await.unwrap().expect("moved forward");
    assert_eq!(next.index_in_poll, 4.0);
    assert_eq!(questions.votes().answers().len(), 1);

    assert!(questions.next().await.unwrap().is_none());
    assert_eq!(questions.current().map(|q| q.id), Some(QuestionId::new(4)));
    assert!(!questions.has_next());
    assert!(questions.has_previous());
}

#[tokio::test]
async fn confirmed_vote_keeps_optimistic_state() {
    let gateway = backend();
    let questions = open(Arc::new(gateway.clone())).await;
    questions.set_current(question(1, 1.0)).await.unwrap();
    let votes = questions.votes();

    let outcome = votes.select(AnswerId::new(11)).await.unwrap();

    assert_eq!(outcome, VoteOutcome::Confirmed);
    assert!(is_selected(&votes, 11));
    assert_eq!(votes.checked(), Some(AnswerId::new(11)));
    assert_eq!(gateway.recorded_votes(), vec![(AnswerId::new(11), true)]);
}

#[tokio::test]
async fn refused_vote_is_rolled_back() {
    let gateway = backend();
    gateway.refuse_votes(true);
    let questions = open(Arc::new(gateway.clone())).await;
    questions.set_current(question(1, 1.0)).await.unwrap();
    let votes = questions.votes();

    let outcome = votes.select(AnswerId::new(10)).await.unwrap();

    assert_eq!(outcome, VoteOutcome::RolledBack);
    assert!(!is_selected(&votes, 10));
    assert!(gateway.recorded_votes().is_empty());
}

#[tokio::test]
async fn switching_question_discards_checked_answer() {
    let questions = open(Arc::new(backend())).await;
    questions.set_current(question(1, 1.0)).await.unwrap();
    let votes = questions.votes();
    votes.select(AnswerId::new(10)).await.unwrap();
    assert_eq!(votes.checked(), Some(AnswerId::new(10)));

    questions.next().await.unwrap();
    assert_eq!(votes.checked(), None);
    assert!(votes.answers().is_empty());
}

#[tokio::test]
async fn selecting_an_unloaded_answer_is_refused() {
    let questions = open(Arc::new(backend())).await;
    questions.set_current(question(1, 1.0)).await.unwrap();

    let err = questions.votes().select(AnswerId::new(99)).await.unwrap_err();
    assert!(matches!(
        err,
        VoteServiceError::Vote(VoteError::UnknownAnswer(id)) if id == AnswerId::new(99)
    ));
}

/// Holds every vote until released, then refuses it.
struct HeldVotes {
    inner: InMemoryGateway,
    gate: Arc<Semaphore>,
}

#[async_trait]
impl PollGateway for HeldVotes {
    async fn exchange_code(&self, code: &SessionCode) -> Result<Token, GatewayError> {
        self.inner.exchange_code(code).await
    }

    async fn fetch_session(&self, token: &Token) -> Result<Session, GatewayError> {
        self.inner.fetch_session(token).await
    }

    async fn fetch_poll(
        &self,
        moderator_id: ModeratorId,
        poll_id: PollId,
        token: &Token,
    ) -> Result<Poll, GatewayError> {
        self.inner.fetch_poll(moderator_id, poll_id, token).await
    }

    async fn fetch_questions(
        &self,
        moderator_id: ModeratorId,
        poll_id: PollId,
        token: &Token,
    ) -> Result<Vec<Question>, GatewayError> {
        self.inner.fetch_questions(moderator_id, poll_id, token).await
    }

    async fn fetch_answers(
        &self,
        moderator_id: ModeratorId,
        poll_id: PollId,
        question_id: QuestionId,
        token: &Token,
    ) -> Result<Vec<Answer>, GatewayError> {
        self.inner
            .fetch_answers(moderator_id, poll_id, question_id, token)
            .await
    }

    async fn cast_vote(
        &self,
        _moderator_id: ModeratorId,
        _poll_id: PollId,
        _question_id: QuestionId,
        _answer_id: AnswerId,
        _token: &Token,
        _answer: &Answer,
    ) -> Result<(), GatewayError> {
        let permit = self
            .gate
            .acquire()
            .await
            .map_err(|err| GatewayError::Transport(err.to_string()))?;
        permit.forget();
        Err(GatewayError::Server { status: 503 })
    }
}

#[tokio::test]
async fn selection_is_visible_before_the_server_answers() {
    let gate = Arc::new(Semaphore::new(0));
    let gateway = HeldVotes {
        inner: backend(),
        gate: Arc::clone(&gate),
    };
    let questions = open(Arc::new(gateway)).await;
    questions.set_current(question(1, 1.0)).await.unwrap();
    let votes = questions.votes();

    let pending = tokio::spawn({
        let votes = Arc::clone(&votes);
        async move { votes.select(AnswerId::new(10)).await }
    });

    tokio::time::timeout(Duration::from_secs(1), async {
        while !is_selected(&votes, 10) {
            tokio::task::yield_now().await;
        }
    })
    .await
    .expect("optimistic selection applied");
    assert_eq!(votes.checked(), Some(AnswerId::new(10)));

    gate.add_permits(1);
    let outcome = pending.await.unwrap().unwrap();
    assert_eq!(outcome, VoteOutcome::RolledBack);
    assert!(!is_selected(&votes, 10));
}

#[tokio::test]
async fn late_failure_does_not_undo_a_newer_selection() {
    let gate = Arc::new(Semaphore::new(0));
    let gateway = HeldVotes {
        inner: backend(),
        gate: Arc::clone(&gate),
    };
    let questions = open(Arc::new(gateway)).await;
    questions.set_current(question(1, 1.0)).await.unwrap();
    let votes = questions.votes();

    let first = tokio::spawn({
        let votes = Arc::clone(&votes);
        async move { votes.select(AnswerId::new(10)).await }
    });
    tokio::time::timeout(Duration::from_secs(1), async {
        while !is_selected(&votes, 10) {
            tokio::task::yield_now().await;
        }
    })
    .await
    .expect("first selection applied");

    let second = tokio::spawn({
        let votes = Arc::clone(&votes);
        async move { votes.select(AnswerId::new(10)).await }
    });
    tokio::time::timeout(Duration::from_secs(1), async {
        while is_selected(&votes, 10) {
            tokio::task::yield_now().await;
        }
    })
    .await
    .expect("second selection applied");

    gate.add_permits(2);
    let outcomes = [
        first.await.unwrap().unwrap(),
        second.await.unwrap().unwrap(),
    ];

    assert_eq!(outcomes[0], VoteOutcome::Superseded);
    assert_eq!(outcomes[1], VoteOutcome::RolledBack);
    assert!(is_selected(&votes, 10));
}

#[tokio::test]
async fn answer_limits_bound_the_checked_answers() {
    let gateway = backend();
    let questions = open(Arc::new(gateway.clone())).await;
    questions
        .set_current(question(1, 1.0).with_answer_limits(0, 1))
        .await
        .unwrap();
    let votes = questions.votes();

    assert_eq!(votes.select(AnswerId::new(10)).await.unwrap(), VoteOutcome::Confirmed);
    let err = votes.select(AnswerId::new(11)).await.unwrap_err();
    assert!(matches!(
        err,
        VoteServiceError::Vote(VoteError::TooManyAnswers { max: 1 })
    ));
    assert!(!is_selected(&votes, 11));
    assert_eq!(gateway.recorded_votes(), vec![(AnswerId::new(10), true)]);

    questions
        .set_current(question(3, 2.5).with_answer_limits(2, 0))
        .await
        .unwrap();
    assert_eq!(votes.missing_answers(), None);
    votes.select(AnswerId::new(30)).await.unwrap();
    assert_eq!(votes.missing_answers(), Some(2));
    votes.select(AnswerId::new(31)).await.unwrap();
    assert_eq!(votes.missing_answers(), None);
}

#[tokio::test]
async fn refresh_merges_server_answers_but_keeps_recent_votes() {
    let gateway = backend();
    let questions = open(Arc::new(gateway.clone())).await;
    questions.set_current(question(1, 1.0)).await.unwrap();
    let votes = questions.votes();
    votes.select(AnswerId::new(11)).await.unwrap();

    // The server has not caught up with our vote yet but knows about another.
    gateway.set_selected(QuestionId::new(1), AnswerId::new(11), false);
    gateway.set_selected(QuestionId::new(1), AnswerId::new(10), true);

    assert!(questions.refresh_answers().await.unwrap());
    assert!(is_selected(&votes, 11));
    assert!(is_selected(&votes, 10));
    assert_eq!(votes.checked(), Some(AnswerId::new(11)));
}

#[tokio::test]
async fn refresh_without_current_question_does_nothing() {
    let questions = open(Arc::new(backend())).await;
    assert!(!questions.refresh_answers().await.unwrap());
}

#[tokio::test]
async fn revoked_token_marks_the_poll_as_left() {
    let gateway = backend();
    let questions = open(Arc::new(gateway.clone())).await;
    questions.set_current(question(1, 1.0)).await.unwrap();
    assert!(!questions.token_invalid());

    gateway.revoke(&Token::new("tok-abc"));
    let err = questions.refresh_answers().await.unwrap_err();

    assert!(matches!(
        err,
        QuestionServiceError::Gateway(ref inner) if inner.is_token_invalid()
    ));
    assert!(questions.token_invalid());
}

#[tokio::test]
async fn follow_refreshes_until_the_token_is_revoked() {
    let gateway = backend();
    let questions = Arc::new(open(Arc::new(gateway.clone())).await);
    questions.set_current(question(1, 1.0)).await.unwrap();
    let votes = questions.votes();

    let following = tokio::spawn({
        let questions = Arc::clone(&questions);
        async move { questions.follow(Duration::from_millis(5)).await }
    });

    gateway.set_selected(QuestionId::new(1), AnswerId::new(10), true);
    tokio::time::timeout(Duration::from_secs(1), async {
        while !is_selected(&votes, 10) {
            tokio::time::sleep(Duration::from_millis(1)).await;
        }
    })
    .await
    .expect("server change picked up");

    gateway.revoke(&Token::new("tok-abc"));
    tokio::time::timeout(Duration::from_secs(1), following)
        .await
        .expect("follow stopped")
        .unwrap();
    assert!(questions.token_invalid());
}

/// Holds the first answer fetch of selected questions until released.
struct HeldAnswers {
    inner: InMemoryGateway,
    held: Mutex<HashSet<QuestionId>>,
    gate: Arc<Semaphore>,
}

#[async_trait]
impl PollGateway for HeldAnswers {
    async fn exchange_code(&self, code: &SessionCode) -> Result<Token, GatewayError> {
        self.inner.exchange_code(code).await
    }

    async fn fetch_session(&self, token: &Token) -> Result<Session, GatewayError> {
        self.inner.fetch_session(token).await
    }

    async fn fetch_poll(
        &self,
        moderator_id: ModeratorId,
        poll_id: PollId,
        token: &Token,
    ) -> Result<Poll, GatewayError> {
        self.inner.fetch_poll(moderator_id, poll_id, token).await
    }

    async fn fetch_questions(
        &self,
        moderator_id: ModeratorId,
        poll_id: PollId,
        token: &Token,
    ) -> Result<Vec<Question>, GatewayError> {
        self.inner.fetch_questions(moderator_id, poll_id, token).await
    }

    async fn fetch_answers(
        &self,
        moderator_id: ModeratorId,
        poll_id: PollId,
        question_id: QuestionId,
        token: &Token,
    ) -> Result<Vec<Answer>, GatewayError> {
        // Read the snapshot first so the response is as old as the request.
        let answers = self
            .inner
            .fetch_answers(moderator_id, poll_id, question_id, token)
            .await;
        let hold = self
            .held
            .lock()
            .map(|mut held| held.remove(&question_id))
            .unwrap_or(false);
        if hold {
            let permit = self
                .gate
                .acquire()
                .await
                .map_err(|err| GatewayError::Transport(err.to_string()))?;
            permit.forget();
        }
        answers
    }

    async fn cast_vote(
        &self,
        moderator_id: ModeratorId,
        poll_id: PollId,
        question_id: QuestionId,
        answer_id: AnswerId,
        token: &Token,
        answer: &Answer,
    ) -> Result<(), GatewayError> {
        self.inner
            .cast_vote(moderator_id, poll_id, question_id, answer_id, token, answer)
            .await
    }
}

#[tokio::test]
async fn answers_from_an_earlier_visit_of_the_same_question_are_dropped() {
    let gate = Arc::new(Semaphore::new(0));
    let gateway = HeldAnswers {
        inner: backend(),
        held: Mutex::new(HashSet::from([QuestionId::new(1)])),
        gate: Arc::clone(&gate),
    };
    let questions = Arc::new(open(Arc::new(gateway)).await);

    let first_visit = tokio::spawn({
        let questions = Arc::clone(&questions);
        async move { questions.set_current(question(1, 1.0)).await }
    });
    tokio::time::timeout(Duration::from_secs(1), async {
        while questions.current().is_none() {
            tokio::task::yield_now().await;
        }
    })
    .await
    .expect("first visit started");

    questions.next().await.unwrap().expect("moved to question 2");
    let back = questions.previous().await.unwrap().expect("moved back");
    assert_eq!(back.id, QuestionId::new(1));

    let votes = questions.votes();
    assert_eq!(votes.select(AnswerId::new(10)).await.unwrap(), VoteOutcome::Confirmed);

    gate.add_permits(1);
    first_visit.await.unwrap().unwrap();

    assert!(is_selected(&votes, 10));
    assert_eq!(votes.checked(), Some(AnswerId::new(10)));
    assert_eq!(votes.answers().len(), 2);
}
