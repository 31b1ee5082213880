use crate::models::Phase;
use thiserror::Error;

/// Failure conditions surfaced by quiz engine operations.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum QuizError {
    #[error("Question generation failed: {0}")]
    GenerationFailure(String),

    #[error("Question batch rejected: {0}")]
    MalformedBatch(String),

    #[error("Operation '{operation}' is not allowed while the quiz is {phase:?}")]
    InvalidPhase {
        operation: &'static str,
        phase: Phase,
    },

    #[error("Insufficient credits: {required} required")]
    InsufficientCredits { required: i64 },

    #[error("Another question to the assistant is still in progress")]
    Busy,

    #[error("Assistant request failed: {0}")]
    AssistantFailure(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Quiz session was replaced before the request completed")]
    Superseded,

    #[error("Backend unavailable: {0}")]
    Backend(String),
}

impl QuizError {
    pub fn invalid_phase(operation: &'static str, phase: Phase) -> Self {
        QuizError::InvalidPhase { operation, phase }
    }

    /// Generation errors send the session back to Idle.
    pub fn is_generation_error(&self) -> bool {
        matches!(
            self,
            QuizError::GenerationFailure(_) | QuizError::MalformedBatch(_)
        )
    }
}
