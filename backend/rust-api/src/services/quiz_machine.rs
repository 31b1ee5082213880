//! Pure quiz lifecycle transitions.
//!
//! Every function takes the session state explicitly and either mutates it
//! into the next phase or rejects the call without touching it. Timers and
//! oracle I/O live in [`super::quiz_engine`]; this module never awaits.

use serde::Deserialize;
use uuid::Uuid;

use crate::error::QuizError;
use crate::models::{
    AnswerOutcome, PendingRequest, Phase, QuestionBatch, SessionState, TopicAdvance,
};

use super::progression::{reset_progress, ProgressPolicy, TopicRotation};
use super::scoring::ScoringRules;

/// How `repeat()` obtains its questions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RepeatMode {
    /// Replay the batch that was just completed.
    #[default]
    Replay,
    /// Ask the question source for a new batch on the same topic.
    FreshBatch,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RepeatPlan {
    Replay,
    Fetch(PendingRequest),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CountdownStep {
    Stale,
    Remaining(u32),
    Started,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FeedbackStep {
    Stale,
    NextQuestion,
    Completed,
}

fn enter(state: &mut SessionState, phase: Phase) {
    state.phase = phase;
    state.generation += 1;
}

fn pending_request(state: &SessionState, count: usize) -> PendingRequest {
    PendingRequest {
        request_id: Uuid::new_v4().to_string(),
        topic: state.topic.clone(),
        difficulty: state.difficulty,
        count,
        advance: None,
    }
}

/// Resets the per-batch counters and gives the run a fresh identity.
fn begin_run(state: &mut SessionState, countdown_seconds: u32) {
    state.session_id = Uuid::new_v4().to_string();
    state.current_index = 0;
    state.correct_count = 0;
    state.streak = 0;
    state.elapsed_seconds = 0;
    state.pending_answer = None;
    if countdown_seconds == 0 {
        state.countdown_remaining = None;
        enter(state, Phase::Active);
    } else {
        state.countdown_remaining = Some(countdown_seconds);
        enter(state, Phase::Countdown);
    }
}

/// Idle -> Loading.
pub fn begin_loading(state: &mut SessionState, count: usize) -> Result<PendingRequest, QuizError> {
    if state.phase != Phase::Idle {
        return Err(QuizError::invalid_phase("start", state.phase));
    }
    let request = pending_request(state, count);
    state.pending_request = Some(request.clone());
    enter(state, Phase::Loading);
    Ok(request)
}

/// Loading -> Countdown once the requested batch arrives.
///
/// A batch for any request other than the one currently pending is refused
/// with `Superseded` and leaves the state as it was. For an advance request
/// the topic step and progress reset are committed here, together with the
/// batch; the applied step is returned.
pub fn install_batch(
    state: &mut SessionState,
    request_id: &str,
    batch: QuestionBatch,
    countdown_seconds: u32,
) -> Result<Option<TopicAdvance>, QuizError> {
    let pending = state
        .pending_request
        .as_ref()
        .map(|p| p.request_id.as_str());
    if state.phase != Phase::Loading || pending != Some(request_id) {
        return Err(QuizError::Superseded);
    }
    if batch.questions.is_empty() {
        return Err(QuizError::MalformedBatch("batch contains no questions".to_string()));
    }
    let Some(request) = state.pending_request.take() else {
        return Err(QuizError::Superseded);
    };

    if let Some(advance) = request.advance {
        state.topic_index = advance.topic_index;
        state.topic = request.topic;
        state.difficulty = request.difficulty;
        if advance.reset_progress {
            reset_progress(state);
        }
    }
    state.questions = batch.questions;
    state.batch_id = Some(batch.batch_id);
    begin_run(state, countdown_seconds);
    Ok(request.advance)
}

/// Loading -> Idle after a failed fetch. Returns false when the failure
/// belongs to a request that is no longer pending.
pub fn fail_loading(state: &mut SessionState, request_id: &str) -> bool {
    let pending = state
        .pending_request
        .as_ref()
        .map(|p| p.request_id.as_str());
    if state.phase != Phase::Loading || pending != Some(request_id) {
        return false;
    }
    state.pending_request = None;
    enter(state, Phase::Idle);
    true
}

pub fn countdown_tick(state: &mut SessionState, generation: u64) -> CountdownStep {
    if state.generation != generation || state.phase != Phase::Countdown {
        return CountdownStep::Stale;
    }
    let remaining = state.countdown_remaining.unwrap_or(1).saturating_sub(1);
    if remaining == 0 {
        state.countdown_remaining = None;
        enter(state, Phase::Active);
        CountdownStep::Started
    } else {
        state.countdown_remaining = Some(remaining);
        CountdownStep::Remaining(remaining)
    }
}

/// One second of play time. Counts only while the run it was started for
/// is still in progress.
pub fn elapsed_tick(state: &mut SessionState, session_id: &str) -> Option<u32> {
    if state.session_id != session_id || !state.phase.is_in_progress() {
        return None;
    }
    state.elapsed_seconds += 1;
    Some(state.elapsed_seconds)
}

/// Active -> Feedback.
pub fn submit_answer(
    state: &mut SessionState,
    choice: &str,
    rules: &ScoringRules,
) -> Result<AnswerOutcome, QuizError> {
    if state.phase != Phase::Active {
        return Err(QuizError::invalid_phase("answer", state.phase));
    }
    let question = state
        .current_question()
        .cloned()
        .ok_or_else(|| QuizError::invalid_phase("answer", state.phase))?;

    let correct = question.is_correct(choice);
    let change = rules.apply(state, correct);

    state.pending_answer = Some(choice.to_string());
    enter(state, Phase::Feedback);

    Ok(AnswerOutcome {
        correct,
        choice: choice.to_string(),
        correct_answer: question.correct_answer.clone(),
        feedback: question.feedback_for(correct).to_string(),
        points_awarded: change.points,
        score: state.score,
        experience: state.experience,
        level: state.level,
        level_ups: change.level_ups,
        streak: state.streak,
        is_last_question: state.current_index + 1 >= state.questions.len(),
    })
}

/// Feedback -> Active, or Completed when the batch is exhausted.
pub fn finish_feedback(state: &mut SessionState, generation: u64) -> FeedbackStep {
    if state.generation != generation || state.phase != Phase::Feedback {
        return FeedbackStep::Stale;
    }
    state.pending_answer = None;
    state.current_index = (state.current_index + 1).min(state.questions.len());
    if state.is_exhausted() {
        enter(state, Phase::Completed);
        FeedbackStep::Completed
    } else {
        enter(state, Phase::Active);
        FeedbackStep::NextQuestion
    }
}

/// Completed -> Countdown (replay) or Loading (fresh batch); topic and
/// difficulty stay where they are.
pub fn begin_repeat(
    state: &mut SessionState,
    mode: RepeatMode,
    count: usize,
    countdown_seconds: u32,
) -> Result<RepeatPlan, QuizError> {
    if state.phase != Phase::Completed {
        return Err(QuizError::invalid_phase("repeat", state.phase));
    }
    match mode {
        RepeatMode::Replay => {
            begin_run(state, countdown_seconds);
            Ok(RepeatPlan::Replay)
        }
        RepeatMode::FreshBatch => {
            let request = pending_request(state, count);
            state.pending_request = Some(request.clone());
            enter(state, Phase::Loading);
            Ok(RepeatPlan::Fetch(request))
        }
    }
}

/// Completed -> Loading for the next topic of the rotation.
///
/// Only the request records the step. Topic, difficulty and progress stay
/// as they are until [`install_batch`] accepts the batch, so a failed fetch
/// leaves the session on the topic it completed.
pub fn begin_advance(
    state: &mut SessionState,
    rotation: &TopicRotation,
    policy: ProgressPolicy,
    count: usize,
) -> Result<PendingRequest, QuizError> {
    if state.phase != Phase::Completed {
        return Err(QuizError::invalid_phase("advance", state.phase));
    }
    let step = rotation.step(state.topic_index, state.difficulty);
    let request = PendingRequest {
        request_id: Uuid::new_v4().to_string(),
        topic: rotation.topic(step.topic_index).to_string(),
        difficulty: step.difficulty,
        count,
        advance: Some(TopicAdvance {
            topic_index: step.topic_index,
            reset_progress: policy.resets_on_advance(),
            difficulty_increased: step.wrapped,
        }),
    };
    state.pending_request = Some(request.clone());
    enter(state, Phase::Loading);
    Ok(request)
}

/// Any phase but Idle -> Idle. In-flight requests and timers of the
/// abandoned phase are invalidated through the generation bump.
pub fn abandon(state: &mut SessionState) -> Result<(), QuizError> {
    if state.phase == Phase::Idle {
        return Err(QuizError::invalid_phase("abandon", state.phase));
    }
    state.pending_request = None;
    state.pending_answer = None;
    state.countdown_remaining = None;
    enter(state, Phase::Idle);
    Ok(())
}

/// The question an `ask` refers to.
pub fn ask_context(state: &SessionState) -> Result<&crate::models::QuizQuestion, QuizError> {
    if !state.phase.is_in_progress() {
        return Err(QuizError::invalid_phase("ask", state.phase));
    }
    state
        .current_question()
        .ok_or_else(|| QuizError::invalid_phase("ask", state.phase))
}
