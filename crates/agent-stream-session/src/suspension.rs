//! Interactive suspension: one pending question gates task input.

use agent_stream_core::question::{AnswerError, AnswerValue, Question};
use thiserror::Error;

/// Suspension error.
#[derive(Debug, Error)]
pub enum SuspensionError {
    #[error("Question {new_id} arrived while {pending_id} is still unanswered")]
    AlreadyPending { pending_id: String, new_id: String },
    #[error("No question is pending")]
    NonePending,
    #[error("Answer targets question {got}, but {expected} is pending")]
    IdMismatch { expected: String, got: String },
    #[error(transparent)]
    Answer(#[from] AnswerError),
}

/// Per-session question gate: `None -> Pending -> Answered -> None`.
///
/// At most one question may be outstanding; while one is pending, new task
/// input is blocked. The gate is state about the *task*, not the connection,
/// so it survives disconnect/reconnect untouched.
#[derive(Debug, Default)]
pub struct SuspensionGate {
    pending: Option<Question>,
}

impl SuspensionGate {
    /// Create an open gate.
    #[must_use]
    pub const fn new() -> Self {
        Self { pending: None }
    }

    /// Enter `Pending` with `question`.
    ///
    /// # Errors
    /// Rejects a second question while one is pending; replacing it silently
    /// would strand the first question's identifier.
    pub fn suspend(&mut self, question: Question) -> Result<(), SuspensionError> {
        if let Some(pending) = &self.pending {
            return Err(SuspensionError::AlreadyPending {
                pending_id: pending.id.clone(),
                new_id: question.id,
            });
        }
        self.pending = Some(question);
        Ok(())
    }

    /// Check that `answer` is a valid response to the pending question.
    /// Does not change state; call [`Self::resolve`] once the answer has
    /// been delivered.
    ///
    /// # Errors
    /// Returns an error if nothing is pending, the id does not match, or the
    /// answer shape fails validation.
    pub fn validate(&self, question_id: &str, answer: &AnswerValue) -> Result<(), SuspensionError> {
        let pending = self.pending.as_ref().ok_or(SuspensionError::NonePending)?;
        if pending.id != question_id {
            return Err(SuspensionError::IdMismatch {
                expected: pending.id.clone(),
                got: question_id.to_string(),
            });
        }
        pending.validate_answer(answer)?;
        Ok(())
    }

    /// `Pending -> Answered -> None`: the answer was delivered, re-enable
    /// task input. Returns the question that was answered.
    pub fn resolve(&mut self) -> Option<Question> {
        self.pending.take()
    }

    /// Discard any pending question (user stop).
    pub fn clear(&mut self) {
        self.pending = None;
    }

    /// The pending question, if any.
    #[must_use]
    pub fn pending(&self) -> Option<&Question> {
        self.pending.as_ref()
    }

    /// Whether task input is currently blocked.
    #[must_use]
    pub const fn is_suspended(&self) -> bool {
        self.pending.is_some()
    }
}

#[cfg(test)]
mod tests {
    use agent_stream_core::question::AnswerType;

    use super::*;

    fn question(id: &str) -> Question {
        Question {
            id: id.into(),
            prompt: "Proceed?".into(),
            answer_type: AnswerType::Boolean,
            options: vec![],
            required: false,
            follow_ups: std::collections::HashMap::new(),
        }
    }

    #[test]
    fn test_second_question_is_rejected_first_stays_pending() {
        let mut gate = SuspensionGate::new();
        gate.suspend(question("q-1")).unwrap();

        let err = gate.suspend(question("q-2")).unwrap_err();
        assert!(matches!(
            err,
            SuspensionError::AlreadyPending { ref pending_id, ref new_id }
                if pending_id == "q-1" && new_id == "q-2"
        ));
        assert_eq!(gate.pending().map(|q| q.id.as_str()), Some("q-1"));
    }

    #[test]
    fn test_validate_requires_matching_id() {
        let mut gate = SuspensionGate::new();
        gate.suspend(question("q-1")).unwrap();

        let err = gate.validate("q-9", &AnswerValue::Boolean(true)).unwrap_err();
        assert!(matches!(err, SuspensionError::IdMismatch { .. }));
        assert!(gate.validate("q-1", &AnswerValue::Boolean(true)).is_ok());
    }

    #[test]
    fn test_validate_checks_answer_shape() {
        let mut gate = SuspensionGate::new();
        gate.suspend(question("q-1")).unwrap();

        let err = gate
            .validate("q-1", &AnswerValue::Text("yes".into()))
            .unwrap_err();
        assert!(matches!(err, SuspensionError::Answer(_)));
    }

    #[test]
    fn test_resolve_reopens_gate() {
        let mut gate = SuspensionGate::new();
        assert!(gate.validate("q-1", &AnswerValue::Boolean(true)).is_err());

        gate.suspend(question("q-1")).unwrap();
        assert!(gate.is_suspended());

        let answered = gate.resolve().unwrap();
        assert_eq!(answered.id, "q-1");
        assert!(!gate.is_suspended());
        assert!(gate.suspend(question("q-2")).is_ok());
    }
}
