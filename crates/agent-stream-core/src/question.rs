//! Interactive question protocol: questions the agent asks mid-stream and the
//! answers a human submits back through the side channel.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Expected shape of an answer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AnswerType {
    SingleChoice,
    MultiChoice,
    FreeText,
    Boolean,
}

/// One selectable option of a choice question.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QuestionOption {
    pub id: String,
    pub label: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, rename = "default")]
    pub is_default: bool,
}

/// A structured question carried by an `ask_user_question` event.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Question {
    pub id: String,
    pub prompt: String,
    pub answer_type: AnswerType,
    #[serde(default)]
    pub options: Vec<QuestionOption>,
    #[serde(default)]
    pub required: bool,
    /// Sub-questions keyed by the parent option id that unlocks them.
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub follow_ups: HashMap<String, Vec<Question>>,
}

/// A submitted answer. Single-choice answers carry the chosen option id as text.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum AnswerValue {
    Boolean(bool),
    Options(Vec<String>),
    Text(String),
}

/// Answer validation error.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum AnswerError {
    #[error("Answer shape does not match question type {expected:?}")]
    WrongShape { expected: AnswerType },
    #[error("Unknown option id: {0}")]
    UnknownOption(String),
    #[error("Answer to required question is empty")]
    EmptyRequired,
}

impl Question {
    /// Check that `answer` matches this question's answer type and option set.
    ///
    /// # Errors
    /// Returns the first shape or option mismatch found.
    pub fn validate_answer(&self, answer: &AnswerValue) -> Result<(), AnswerError> {
        let wrong = || AnswerError::WrongShape {
            expected: self.answer_type,
        };

        match (self.answer_type, answer) {
            (AnswerType::Boolean, AnswerValue::Boolean(_)) => Ok(()),
            (AnswerType::FreeText, AnswerValue::Text(text)) => {
                if self.required && text.trim().is_empty() {
                    Err(AnswerError::EmptyRequired)
                } else {
                    Ok(())
                }
            }
            (AnswerType::SingleChoice, AnswerValue::Text(id)) => self.check_option(id),
            (AnswerType::MultiChoice, AnswerValue::Options(ids)) => {
                if self.required && ids.is_empty() {
                    return Err(AnswerError::EmptyRequired);
                }
                ids.iter().try_for_each(|id| self.check_option(id))
            }
            _ => Err(wrong()),
        }
    }

    fn check_option(&self, id: &str) -> Result<(), AnswerError> {
        if self.options.iter().any(|o| o.id == id) {
            Ok(())
        } else {
            Err(AnswerError::UnknownOption(id.to_string()))
        }
    }

    /// The option marked as default, if any.
    #[must_use]
    pub fn default_option(&self) -> Option<&QuestionOption> {
        self.options.iter().find(|o| o.is_default)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn choice_question() -> Question {
        serde_json::from_str(
            r#"{
                "id": "q-1",
                "prompt": "Which branch?",
                "answer_type": "single_choice",
                "required": true,
                "options": [
                    {"id": "main", "label": "main", "default": true},
                    {"id": "dev", "label": "dev", "description": "integration branch"}
                ]
            }"#,
        )
        .unwrap()
    }

    #[test]
    fn test_single_choice_accepts_known_option() {
        let q = choice_question();
        assert_eq!(q.validate_answer(&AnswerValue::Text("dev".into())), Ok(()));
    }

    #[test]
    fn test_single_choice_rejects_unknown_option() {
        let q = choice_question();
        assert_eq!(
            q.validate_answer(&AnswerValue::Text("prod".into())),
            Err(AnswerError::UnknownOption("prod".into()))
        );
    }

    #[test]
    fn test_shape_mismatch_rejected() {
        let q = choice_question();
        assert_eq!(
            q.validate_answer(&AnswerValue::Boolean(true)),
            Err(AnswerError::WrongShape {
                expected: AnswerType::SingleChoice
            })
        );
    }

    #[test]
    fn test_required_free_text_rejects_blank() {
        let q = Question {
            id: "q-2".into(),
            prompt: "Name?".into(),
            answer_type: AnswerType::FreeText,
            options: vec![],
            required: true,
            follow_ups: HashMap::new(),
        };
        assert_eq!(
            q.validate_answer(&AnswerValue::Text("  ".into())),
            Err(AnswerError::EmptyRequired)
        );
        assert_eq!(q.validate_answer(&AnswerValue::Text("alex".into())), Ok(()));
    }

    #[test]
    fn test_multi_choice_required_rejects_empty_selection() {
        let mut q = choice_question();
        q.answer_type = AnswerType::MultiChoice;
        assert_eq!(
            q.validate_answer(&AnswerValue::Options(vec![])),
            Err(AnswerError::EmptyRequired)
        );
        assert_eq!(
            q.validate_answer(&AnswerValue::Options(vec!["main".into(), "dev".into()])),
            Ok(())
        );
    }

    #[test]
    fn test_default_option() {
        let q = choice_question();
        assert_eq!(q.default_option().map(|o| o.id.as_str()), Some("main"));
    }

    #[test]
    fn test_answer_value_wire_shapes() {
        assert_eq!(
            serde_json::to_string(&AnswerValue::Boolean(true)).unwrap(),
            "true"
        );
        assert_eq!(
            serde_json::to_string(&AnswerValue::Text("main".into())).unwrap(),
            r#""main""#
        );
        let parsed: AnswerValue = serde_json::from_str(r#"["a","b"]"#).unwrap();
        assert_eq!(parsed, AnswerValue::Options(vec!["a".into(), "b".into()]));
    }
}
