use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::conversation::ConversationEntry;
use super::session::Phase;

/// Discrete notifications pushed to the presentation layer.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum EngineEvent {
    PhaseChanged(PhaseChanged),
    CountdownTick(CountdownTick),
    TimerTick(TimerTick),
    AnswerEvaluated(AnswerEvaluated),
    LevelUp(LevelUp),
    DifficultyIncreased(DifficultyIncreased),
    MessageAppended(MessageAppended),
    AssistantDelta(AssistantDelta),
    GenerationFailed(GenerationFailed),
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct PhaseChanged {
    pub session_id: String,
    pub phase: Phase,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct CountdownTick {
    pub session_id: String,
    pub remaining_seconds: u32,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct TimerTick {
    pub session_id: String,
    pub elapsed_seconds: u32,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct AnswerEvaluated {
    pub session_id: String,
    pub question_index: usize,
    pub correct: bool,
    pub points_awarded: u32,
    pub score: u32,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct LevelUp {
    pub session_id: String,
    pub level: u32,
    pub message: String,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct DifficultyIncreased {
    pub session_id: String,
    pub difficulty: u32,
    pub message: String,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct MessageAppended {
    pub session_id: String,
    pub entry: ConversationEntry,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct AssistantDelta {
    pub session_id: String,
    pub request_id: String,
    pub delta: String,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct GenerationFailed {
    pub session_id: String,
    pub message: String,
    pub timestamp: DateTime<Utc>,
}

impl EngineEvent {
    pub fn to_sse_data(&self) -> String {
        serde_json::to_string(self).unwrap_or_else(|_| "{}".to_string())
    }

    pub fn event_name(&self) -> &'static str {
        match self {
            EngineEvent::PhaseChanged(_) => "phase-changed",
            EngineEvent::CountdownTick(_) => "countdown-tick",
            EngineEvent::TimerTick(_) => "timer-tick",
            EngineEvent::AnswerEvaluated(_) => "answer-evaluated",
            EngineEvent::LevelUp(_) => "level-up",
            EngineEvent::DifficultyIncreased(_) => "difficulty-increased",
            EngineEvent::MessageAppended(_) => "message-appended",
            EngineEvent::AssistantDelta(_) => "assistant-delta",
            EngineEvent::GenerationFailed(_) => "generation-failed",
        }
    }

    pub fn phase_changed(session_id: &str, phase: Phase) -> Self {
        EngineEvent::PhaseChanged(PhaseChanged {
            session_id: session_id.to_string(),
            phase,
            timestamp: Utc::now(),
        })
    }
}
