use serde::{Deserialize, Serialize};

use crate::model::ids::{AnswerId, ModeratorId, PollId, QuestionId};

/// A selectable option of a question, carrying the local user's selection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Answer {
    #[serde(rename = "idAnswer")]
    pub id: AnswerId,
    #[serde(rename = "idModerator")]
    pub moderator_id: ModeratorId,
    #[serde(rename = "idPoll")]
    pub poll_id: PollId,
    #[serde(rename = "idQuestion")]
    pub question_id: QuestionId,
    #[serde(default)]
    pub title: String,
    #[serde(rename = "isChecked", default)]
    pub selected: bool,
}

impl Answer {
    #[must_use]
    pub fn new(
        id: AnswerId,
        moderator_id: ModeratorId,
        poll_id: PollId,
        question_id: QuestionId,
        title: impl Into<String>,
    ) -> Self {
        Self {
            id,
            moderator_id,
            poll_id,
            question_id,
            title: title.into(),
            selected: false,
        }
    }

    /// Flips the local selection flag.
    pub fn toggle(&mut self) {
        self.selected = !self.selected;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn answer_parses_backend_payload() {
        let json = r#"{
            "idAnswer": 3,
            "idModerator": 5,
            "idPoll": 9,
            "idQuestion": 2,
            "title": "Blue",
            "isChecked": true
        }"#;
        let answer: Answer = serde_json::from_str(json).unwrap();
        assert_eq!(answer.id, AnswerId::new(3));
        assert_eq!(answer.question_id, QuestionId::new(2));
        assert!(answer.selected);
    }

    #[test]
    fn toggle_flips_selection() {
        let mut answer = Answer::new(
            AnswerId::new(1),
            ModeratorId::new(1),
            PollId::new(1),
            QuestionId::new(1),
            "Yes",
        );
        answer.toggle();
        assert!(answer.selected);
        answer.toggle();
        assert!(!answer.selected);
    }
}
