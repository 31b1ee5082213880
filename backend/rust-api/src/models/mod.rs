pub mod conversation;
pub mod events;
pub mod question;
pub mod session;

pub use conversation::{ConversationEntry, Role};
pub use events::EngineEvent;
pub use question::{BatchSource, QuestionBatch, QuestionView, QuizQuestion};
pub use session::{
    AnswerOutcome, AskOutcome, PendingRequest, Phase, QuizSnapshot, SessionState, SessionView,
    TopicAdvance,
};

use serde::{Deserialize, Serialize};

#[derive(Debug, Deserialize)]
pub struct CreateQuizRequest {
    pub player_id: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct CreateQuizResponse {
    pub quiz_id: String,
    pub state: SessionView,
}

#[derive(Debug, Deserialize)]
pub struct SubmitAnswerRequest {
    pub choice: String,
}

#[derive(Debug, Deserialize)]
pub struct AskRequest {
    pub text: String,
}

#[derive(Debug, Default, Deserialize)]
pub struct HistoryQuery {
    pub limit: Option<usize>,
}

/// A player's stored quiz runs plus the level and difficulty of the most
/// recent one.
#[derive(Debug, Serialize, Deserialize)]
pub struct PlayerHistoryResponse {
    pub player_id: String,
    pub level: u32,
    pub difficulty: u32,
    pub quiz_history: Vec<QuizSnapshot>,
}
