//! Ordering of poll questions and movement between them.

use std::cmp::Ordering;

use thiserror::Error;

use crate::model::{Question, QuestionId};

#[derive(Debug, Error, Clone, PartialEq)]
pub enum NavigationError {
    #[error("no question has been selected yet")]
    NoCurrentQuestion,
    #[error("questions {first} and {second} share index {index}")]
    DuplicateIndex {
        first: QuestionId,
        second: QuestionId,
        index: f64,
    },
    #[error("question {0} has a non-finite index")]
    InvalidIndex(QuestionId),
}

/// Ordered snapshot of a poll's questions plus the one on screen.
///
/// Every change of the current question bumps `visit`, so data requested for
/// an earlier visit can be told apart even when it targets the same question.
#[derive(Debug, Clone, Default)]
pub struct QuestionNavigator {
    questions: Vec<Question>,
    current: Option<Question>,
    visit: u64,
}

impl QuestionNavigator {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Questions sorted by `index_in_poll`.
    #[must_use]
    pub fn questions(&self) -> &[Question] {
        &self.questions
    }

    #[must_use]
    pub fn current(&self) -> Option<&Question> {
        self.current.as_ref()
    }

    #[must_use]
    pub fn visit(&self) -> u64 {
        self.visit
    }

    /// Replaces the whole collection.
    ///
    /// When the current question is still part of the new snapshot it is
    /// swapped for the fresh copy. On error nothing changes.
    ///
    /// # Errors
    ///
    /// Returns `NavigationError::InvalidIndex` for NaN or infinite indexes and
    /// `NavigationError::DuplicateIndex` when two questions share an index.
    pub fn load_questions(&mut self, mut questions: Vec<Question>) -> Result<(), NavigationError> {
        if let Some(bad) = questions.iter().find(|q| !q.index_in_poll.is_finite()) {
            return Err(NavigationError::InvalidIndex(bad.id));
        }

        questions.sort_by(|a, b| a.index_in_poll.total_cmp(&b.index_in_poll));

        if let Some(pair) = questions
            .windows(2)
            .find(|pair| pair[0].index_in_poll.total_cmp(&pair[1].index_in_poll) == Ordering::Equal)
        {
            return Err(NavigationError::DuplicateIndex {
                first: pair[0].id,
                second: pair[1].id,
                index: pair[0].index_in_poll,
            });
        }

        if let Some(current) = self.current.as_mut()
            && let Some(fresh) = questions.iter().find(|q| q.id == current.id)
        {
            *current = fresh.clone();
        }

        self.questions = questions;
        Ok(())
    }

    /// Makes `question` the one on screen.
    pub fn set_current(&mut self, question: Question) -> &Question {
        self.visit += 1;
        self.current.insert(question)
    }

    /// Moves to the question with the greatest index below the current one.
    /// Returns the new current question, or `None` when already first.
    ///
    /// # Errors
    ///
    /// Returns `NavigationError::NoCurrentQuestion` before any `set_current`.
    pub fn previous(&mut self) -> Result<Option<&Question>, NavigationError> {
        let index = self.current_index()?;
        let target = self
            .questions
            .iter()
            .rev()
            .find(|q| q.index_in_poll < index)
            .cloned();
        Ok(self.move_to(target))
    }

    /// Moves to the question with the smallest index above the current one.
    /// Returns the new current question, or `None` when already last.
    ///
    /// # Errors
    ///
    /// Returns `NavigationError::NoCurrentQuestion` before any `set_current`.
    pub fn next(&mut self) -> Result<Option<&Question>, NavigationError> {
        let index = self.current_index()?;
        let target = self
            .questions
            .iter()
            .find(|q| q.index_in_poll > index)
            .cloned();
        Ok(self.move_to(target))
    }

    /// Whether `previous` would move.
    #[must_use]
    pub fn has_previous(&self) -> bool {
        self.current_index()
            .is_ok_and(|index| self.questions.iter().any(|q| q.index_in_poll < index))
    }

    /// Whether `next` would move.
    #[must_use]
    pub fn has_next(&self) -> bool {
        self.current_index()
            .is_ok_and(|index| self.questions.iter().any(|q| q.index_in_poll > index))
    }

    fn current_index(&self) -> Result<f64, NavigationError> {
        self.current
            .as_ref()
            .map(|q| q.index_in_poll)
            .ok_or(NavigationError::NoCurrentQuestion)
    }

    fn move_to(&mut self, target: Option<Question>) -> Option<&Question> {
        let target = target?;
        self.visit += 1;
        Some(self.current.insert(target))
    }
}
