use serde::{Deserialize, Serialize};

use crate::model::ids::{ModeratorId, PollId, QuestionId};

/// A single poll item. `index_in_poll` orders navigation and is not
/// guaranteed to be contiguous.
///
/// `answer_min` and `answer_max` bound how many answers a participant should
/// check; `0` means no bound.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Question {
    #[serde(rename = "idQuestion")]
    pub id: QuestionId,
    #[serde(rename = "idModerator")]
    pub moderator_id: ModeratorId,
    #[serde(rename = "idPoll")]
    pub poll_id: PollId,
    #[serde(rename = "indexInPoll")]
    pub index_in_poll: f64,
    #[serde(default)]
    pub title: String,
    #[serde(rename = "answerMin", default)]
    pub answer_min: u32,
    #[serde(rename = "answerMax", default)]
    pub answer_max: u32,
}

impl Question {
    #[must_use]
    pub fn new(
        id: QuestionId,
        moderator_id: ModeratorId,
        poll_id: PollId,
        index_in_poll: f64,
        title: impl Into<String>,
    ) -> Self {
        Self {
            id,
            moderator_id,
            poll_id,
            index_in_poll,
            title: title.into(),
            answer_min: 0,
            answer_max: 0,
        }
    }

    #[must_use]
    pub fn with_answer_limits(mut self, min: u32, max: u32) -> Self {
        self.answer_min = min;
        self.answer_max = max;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn limits_default_to_unbounded() {
        let json = r#"{"idQuestion": 1, "idModerator": 5, "idPoll": 9, "indexInPoll": 1.5}"#;
        let question: Question = serde_json::from_str(json).unwrap();
        assert_eq!(question.index_in_poll, 1.5);
        assert_eq!((question.answer_min, question.answer_max), (0, 0));
    }

    #[test]
    fn limits_are_read_from_the_backend() {
        let json = r#"{
            "idQuestion": "2",
            "idModerator": "5",
            "idPoll": "9",
            "indexInPoll": 2,
            "title": "Pick two",
            "answerMin": 1,
            "answerMax": 2
        }"#;
        let question: Question = serde_json::from_str(json).unwrap();
        assert_eq!(
            question,
            Question::new(
                QuestionId::new(2),
                ModeratorId::new(5),
                PollId::new(9),
                2.0,
                "Pick two"
            )
            .with_answer_limits(1, 2)
        );
    }
}
