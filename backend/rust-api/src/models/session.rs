use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::conversation::ConversationEntry;
use super::question::{QuestionView, QuizQuestion};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    Idle,
    Loading,
    Countdown,
    Active,
    Feedback,
    Completed,
}

impl Phase {
    pub fn as_str(&self) -> &'static str {
        match self {
            Phase::Idle => "idle",
            Phase::Loading => "loading",
            Phase::Countdown => "countdown",
            Phase::Active => "active",
            Phase::Feedback => "feedback",
            Phase::Completed => "completed",
        }
    }

    /// Phases in which the player is working through a batch.
    pub fn is_in_progress(&self) -> bool {
        matches!(self, Phase::Active | Phase::Feedback)
    }
}

/// Batch request issued when entering Loading.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PendingRequest {
    pub request_id: String,
    pub topic: String,
    pub difficulty: u32,
    pub count: usize,
    /// Set when the batch belongs to the next topic. Applied to the session
    /// only once the batch is installed.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub advance: Option<TopicAdvance>,
}

/// Rotation step carried by an advance request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TopicAdvance {
    pub topic_index: usize,
    pub reset_progress: bool,
    pub difficulty_increased: bool,
}

/// Authoritative record of one player's quiz progress.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionState {
    pub session_id: String,
    pub player_id: String,
    pub topic_index: usize,
    pub topic: String,
    pub difficulty: u32,
    pub questions: Vec<QuizQuestion>,
    pub batch_id: Option<String>,
    pub current_index: usize,
    pub score: u32,
    pub experience: u32,
    pub level: u32,
    pub correct_count: u32,
    pub streak: u32,
    pub elapsed_seconds: u32,
    pub countdown_remaining: Option<u32>,
    pub phase: Phase,
    pub pending_answer: Option<String>,
    pub generation: u64,
    pub pending_request: Option<PendingRequest>,
}

impl SessionState {
    pub fn new(player_id: impl Into<String>, topic: impl Into<String>) -> Self {
        Self {
            session_id: Uuid::new_v4().to_string(),
            player_id: player_id.into(),
            topic_index: 0,
            topic: topic.into(),
            difficulty: 1,
            questions: Vec::new(),
            batch_id: None,
            current_index: 0,
            score: 0,
            experience: 0,
            level: 1,
            correct_count: 0,
            streak: 0,
            elapsed_seconds: 0,
            countdown_remaining: None,
            phase: Phase::Idle,
            pending_answer: None,
            generation: 0,
            pending_request: None,
        }
    }

    pub fn current_question(&self) -> Option<&QuizQuestion> {
        self.questions.get(self.current_index)
    }

    pub fn is_exhausted(&self) -> bool {
        self.current_index >= self.questions.len()
    }

    pub fn view(&self) -> SessionView {
        let reveal = self.phase == Phase::Feedback;
        let current_question = if matches!(
            self.phase,
            Phase::Active | Phase::Feedback
        ) {
            self.current_question()
                .map(|question| QuestionView::from_question(question, reveal))
        } else {
            None
        };

        SessionView {
            session_id: self.session_id.clone(),
            player_id: self.player_id.clone(),
            phase: self.phase,
            topic_index: self.topic_index,
            topic: self.topic.clone(),
            difficulty: self.difficulty,
            current_index: self.current_index,
            total_questions: self.questions.len(),
            current_question,
            score: self.score,
            experience: self.experience,
            level: self.level,
            correct_count: self.correct_count,
            streak: self.streak,
            elapsed_seconds: self.elapsed_seconds,
            countdown_remaining: self.countdown_remaining,
            pending_answer: self.pending_answer.clone(),
        }
    }
}

/// What the presentation layer is allowed to see of a session.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionView {
    pub session_id: String,
    pub player_id: String,
    pub phase: Phase,
    pub topic_index: usize,
    pub topic: String,
    pub difficulty: u32,
    pub current_index: usize,
    pub total_questions: usize,
    pub current_question: Option<QuestionView>,
    pub score: u32,
    pub experience: u32,
    pub level: u32,
    pub correct_count: u32,
    pub streak: u32,
    pub elapsed_seconds: u32,
    pub countdown_remaining: Option<u32>,
    pub pending_answer: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnswerOutcome {
    pub correct: bool,
    pub choice: String,
    pub correct_answer: String,
    pub feedback: String,
    pub points_awarded: u32,
    pub score: u32,
    pub experience: u32,
    pub level: u32,
    pub level_ups: Vec<u32>,
    pub streak: u32,
    pub is_last_question: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AskOutcome {
    pub question: ConversationEntry,
    pub reply: ConversationEntry,
    pub degraded: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub failure: Option<String>,
}

/// Immutable copy of a session handed to external storage.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QuizSnapshot {
    pub session_id: String,
    pub player_id: String,
    pub topic: String,
    pub difficulty: u32,
    pub current_index: usize,
    pub phase: Phase,
    pub score: u32,
    pub experience: u32,
    pub level: u32,
    pub messages: Vec<ConversationEntry>,
    pub questions: Vec<QuizQuestion>,
    pub created_at: DateTime<Utc>,
}

impl QuizSnapshot {
    pub fn capture(state: &SessionState, messages: &[ConversationEntry]) -> Self {
        Self {
            session_id: state.session_id.clone(),
            player_id: state.player_id.clone(),
            topic: state.topic.clone(),
            difficulty: state.difficulty,
            current_index: state.current_index,
            phase: state.phase,
            score: state.score,
            experience: state.experience,
            level: state.level,
            messages: messages.to_vec(),
            questions: state.questions.clone(),
            created_at: Utc::now(),
        }
    }
}
