//! Optimistic voting on the question currently on screen.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use thiserror::Error;

use crate::model::{Answer, AnswerId, Question, QuestionId};
use crate::time::vote_grace;

#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum VoteError {
    #[error("answer {0} is not part of the current question")]
    UnknownAnswer(AnswerId),
    #[error("at most {max} answers may be checked")]
    TooManyAnswers { max: u32 },
}

/// A vote applied locally and not yet confirmed by the server.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingVote {
    /// Answer as it looks after the optimistic flip; this is the vote payload.
    pub answer: Answer,
    /// Selection flag before the flip.
    pub previous: bool,
    intent: u64,
}

/// Answers of the displayed question and the local user's checked answer.
///
/// Every `select` stamps the answer with a fresh intent number. A rollback only
/// lands if the answer has not been touched by a later intent, so a slow failure
/// never undoes a newer selection.
///
/// Server refreshes go through `merge_answers`: an answer the user touched less
/// than `VOTE_GRACE_MS` before the refresh was requested keeps its local state.
#[derive(Debug, Clone, Default)]
pub struct Ballot {
    question_id: Option<QuestionId>,
    answer_min: u32,
    answer_max: u32,
    answers: Vec<Answer>,
    checked: Option<AnswerId>,
    latest_intent: HashMap<AnswerId, u64>,
    touched_at: HashMap<AnswerId, DateTime<Utc>>,
    next_intent: u64,
}

impl Ballot {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn question_id(&self) -> Option<QuestionId> {
        self.question_id
    }

    #[must_use]
    pub fn answers(&self) -> &[Answer] {
        &self.answers
    }

    #[must_use]
    pub fn answer(&self, id: AnswerId) -> Option<&Answer> {
        self.answers.iter().find(|answer| answer.id == id)
    }

    /// Last answer the user selected on this question.
    #[must_use]
    pub fn checked(&self) -> Option<AnswerId> {
        self.checked
    }

    #[must_use]
    pub fn selected_count(&self) -> u32 {
        let count = self.answers.iter().filter(|answer| answer.selected).count();
        u32::try_from(count).unwrap_or(u32::MAX)
    }

    /// The question's minimum while the user has started checking answers
    /// but not reached it yet.
    #[must_use]
    pub fn missing_answers(&self) -> Option<u32> {
        let count = self.selected_count();
        (count > 0 && count < self.answer_min).then_some(self.answer_min)
    }

    /// Swaps in the answers of `question`, discarding the previous
    /// question's checked answer and pending intents.
    pub fn replace_answers(&mut self, question: &Question, answers: Vec<Answer>) {
        self.question_id = Some(question.id);
        self.answer_min = question.answer_min;
        self.answer_max = question.answer_max;
        self.answers = answers;
        self.checked = None;
        self.latest_intent.clear();
        self.touched_at.clear();
    }

    /// Folds a server snapshot fetched at `fetched_at` into the local answers.
    ///
    /// Returns `false` when the snapshot belongs to another question.
    pub fn merge_answers(
        &mut self,
        question_id: QuestionId,
        remote: Vec<Answer>,
        fetched_at: DateTime<Utc>,
    ) -> bool {
        if self.question_id != Some(question_id) {
            return false;
        }

        let grace = vote_grace();
        let merged: Vec<Answer> = remote
            .into_iter()
            .map(|fresh| {
                let recent = self
                    .touched_at
                    .get(&fresh.id)
                    .is_some_and(|touched| fetched_at - *touched < grace);
                match self.answers.iter().find(|local| local.id == fresh.id) {
                    Some(local) if recent => local.clone(),
                    _ => fresh,
                }
            })
            .collect();

        self.touched_at
            .retain(|id, _| merged.iter().any(|answer| answer.id == *id));
        if self
            .checked
            .is_some_and(|id| !merged.iter().any(|answer| answer.id == id))
        {
            self.checked = None;
        }
        self.answers = merged;
        true
    }

    /// Flips the answer's selection at `at` and records it as checked.
    ///
    /// # Errors
    ///
    /// Returns `VoteError::UnknownAnswer` if the answer is not loaded and
    /// `VoteError::TooManyAnswers` if checking it would exceed the question's
    /// maximum. Unchecking is always allowed.
    pub fn select(&mut self, id: AnswerId, at: DateTime<Utc>) -> Result<PendingVote, VoteError> {
        let selected_count = self.selected_count();
        let answer_max = self.answer_max;
        let answer = self
            .answers
            .iter_mut()
            .find(|answer| answer.id == id)
            .ok_or(VoteError::UnknownAnswer(id))?;

        if !answer.selected && answer_max > 0 && selected_count >= answer_max {
            return Err(VoteError::TooManyAnswers { max: answer_max });
        }

        let previous = answer.selected;
        answer.toggle();
        let answer = answer.clone();

        self.next_intent += 1;
        let intent = self.next_intent;
        self.latest_intent.insert(id, intent);
        self.touched_at.insert(id, at);
        self.checked = Some(id);

        Ok(PendingVote {
            answer,
            previous,
            intent,
        })
    }

    /// Restores the pre-vote selection. Returns whether anything changed.
    pub fn rollback(&mut self, vote: &PendingVote) -> bool {
        if self.question_id != Some(vote.answer.question_id) {
            return false;
        }
        if self.latest_intent.get(&vote.answer.id) != Some(&vote.intent) {
            return false;
        }
        let Some(answer) = self.answers.iter_mut().find(|a| a.id == vote.answer.id) else {
            return false;
        };
        answer.selected = vote.previous;
        true
    }
}
