//! Async shell around [`super::quiz_machine`]: owns one session, runs its
//! timers and talks to the question source, assistant, credit ledger and
//! snapshot sink.

use futures::StreamExt;
use serde::Deserialize;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};
use std::time::{Duration, Instant};
use tokio::sync::{broadcast, Mutex};
use tokio::task::AbortHandle;
use uuid::Uuid;

use crate::config::EngineConfig;
use crate::error::QuizError;
use crate::metrics::{
    ANSWERS_SUBMITTED_TOTAL, ASSISTANT_REQUESTS_TOTAL, LEVEL_UPS_TOTAL, PHASE_TRANSITIONS_TOTAL,
    QUESTION_GENERATION_DURATION_SECONDS, QUIZZES_STARTED_TOTAL, QUIZ_SESSIONS_ACTIVE,
};
use crate::models::events::{
    AnswerEvaluated, AssistantDelta, CountdownTick, DifficultyIncreased, GenerationFailed,
    LevelUp, MessageAppended, TimerTick,
};
use crate::models::{
    AnswerOutcome, AskOutcome, ConversationEntry, EngineEvent, PendingRequest, Phase,
    QuizSnapshot, Role, SessionState, SessionView,
};

use super::assistant::{Assistant, AssistantRequest};
use super::conversation_log::ConversationLog;
use super::credits::CreditLedger;
use super::persistence::SnapshotSink;
use super::progression::TopicRotation;
use super::question_source::{fetch_batch, FetchPolicy, QuestionSource};
use super::quiz_machine::{self, CountdownStep, FeedbackStep, RepeatPlan};

/// Countdown and play-clock resolution. Both count whole seconds.
const TICK: Duration = Duration::from_secs(1);

const ASSISTANT_PLACEHOLDER: &str =
    "Sorry, I couldn't come up with an answer right now. Please try asking again.";

/// What a second `ask` does while another one is still waiting on the
/// assistant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AskPolicy {
    /// Wait for the earlier ask to finish.
    #[default]
    Queue,
    /// Fail immediately with `Busy`.
    Reject,
}

/// External collaborators of an engine.
#[derive(Clone)]
pub struct QuizDeps {
    pub question_source: Arc<dyn QuestionSource>,
    pub assistant: Arc<dyn Assistant>,
    pub snapshots: Arc<dyn SnapshotSink>,
    pub credits: Arc<dyn CreditLedger>,
}

#[derive(Default)]
struct Timers {
    countdown: Option<AbortHandle>,
    elapsed: Option<AbortHandle>,
    feedback: Option<AbortHandle>,
}

fn replace_timer(slot: &mut Option<AbortHandle>, handle: AbortHandle) {
    if let Some(old) = slot.replace(handle) {
        old.abort();
    }
}

impl Timers {
    fn cancel_all(&mut self) {
        for handle in [
            self.countdown.take(),
            self.elapsed.take(),
            self.feedback.take(),
        ]
        .into_iter()
        .flatten()
        {
            handle.abort();
        }
    }
}

struct EngineInner {
    state: SessionState,
    log: ConversationLog,
    timers: Timers,
}

struct Shared {
    quiz_id: String,
    config: Arc<EngineConfig>,
    rotation: TopicRotation,
    deps: QuizDeps,
    inner: Mutex<EngineInner>,
    /// Serializes `ask` calls against each other.
    ask_gate: Mutex<()>,
    /// Held by every operation that writes to the conversation log.
    conversation_order: Mutex<()>,
    events: broadcast::Sender<EngineEvent>,
    closed: AtomicBool,
}

impl Shared {
    fn emit(&self, event: EngineEvent) {
        // no subscribers is fine
        let _ = self.events.send(event);
    }

    fn emit_phase(&self, state: &SessionState) {
        PHASE_TRANSITIONS_TOTAL
            .with_label_values(&[state.phase.as_str()])
            .inc();
        self.emit(EngineEvent::phase_changed(&state.session_id, state.phase));
    }

    fn emit_message(&self, state: &SessionState, entry: &ConversationEntry) {
        self.emit(EngineEvent::MessageAppended(MessageAppended {
            session_id: state.session_id.clone(),
            entry: entry.clone(),
        }));
    }

    fn persist(&self, inner: &EngineInner) {
        self.deps
            .snapshots
            .persist(QuizSnapshot::capture(&inner.state, inner.log.entries()));
    }

    fn fetch_policy(&self) -> FetchPolicy {
        FetchPolicy {
            attempts: self.config.generation_attempts,
            backoff: Duration::from_millis(self.config.generation_backoff_ms),
            fallback_enabled: self.config.fallback_enabled,
        }
    }

    async fn debit(&self, player_id: &str, amount: i64) -> Result<(), QuizError> {
        if amount <= 0 {
            return Ok(());
        }
        match self.deps.credits.try_debit(player_id, amount).await {
            Ok(true) => Ok(()),
            Ok(false) => {
                tracing::info!(
                    "Insufficient credits: quiz={}, player={}, required={}",
                    self.quiz_id,
                    player_id,
                    amount
                );
                Err(QuizError::InsufficientCredits { required: amount })
            }
            Err(e) => {
                tracing::warn!("Credit ledger unavailable: {:#}", e);
                Err(QuizError::Backend(e.to_string()))
            }
        }
    }

    async fn refund(&self, player_id: &str, amount: i64) {
        if amount <= 0 {
            return;
        }
        if let Err(e) = self.deps.credits.refund(player_id, amount).await {
            tracing::warn!(
                "Failed to refund {} credits to player={}: {:#}",
                amount,
                player_id,
                e
            );
        }
    }
}

/// Timers for a freshly installed run: the countdown, or the elapsed clock
/// when there is no countdown.
fn schedule_run(shared: &Arc<Shared>, inner: &mut EngineInner) {
    inner.timers.cancel_all();
    match inner.state.phase {
        Phase::Countdown => spawn_countdown(shared, &mut inner.timers, inner.state.generation),
        Phase::Active => spawn_elapsed(shared, &mut inner.timers, inner.state.session_id.clone()),
        _ => {}
    }
}

fn spawn_countdown(shared: &Arc<Shared>, timers: &mut Timers, generation: u64) {
    let weak: Weak<Shared> = Arc::downgrade(shared);

    let handle = tokio::spawn(async move {
        loop {
            tokio::time::sleep(TICK).await;
            let Some(shared) = weak.upgrade() else { break };
            let mut guard = shared.inner.lock().await;
            let inner = &mut *guard;

            match quiz_machine::countdown_tick(&mut inner.state, generation) {
                CountdownStep::Stale => break,
                CountdownStep::Remaining(remaining_seconds) => {
                    shared.emit(EngineEvent::CountdownTick(CountdownTick {
                        session_id: inner.state.session_id.clone(),
                        remaining_seconds,
                    }));
                }
                CountdownStep::Started => {
                    tracing::info!(
                        "Quiz active: quiz={}, session={}",
                        shared.quiz_id,
                        inner.state.session_id
                    );
                    shared.emit_phase(&inner.state);
                    spawn_elapsed(&shared, &mut inner.timers, inner.state.session_id.clone());
                    shared.persist(inner);
                    break;
                }
            }
        }
    });

    replace_timer(&mut timers.countdown, handle.abort_handle());
}

fn spawn_elapsed(shared: &Arc<Shared>, timers: &mut Timers, session_id: String) {
    let weak: Weak<Shared> = Arc::downgrade(shared);

    let handle = tokio::spawn(async move {
        loop {
            tokio::time::sleep(TICK).await;
            let Some(shared) = weak.upgrade() else { break };
            let mut guard = shared.inner.lock().await;

            match quiz_machine::elapsed_tick(&mut guard.state, &session_id) {
                Some(elapsed_seconds) => shared.emit(EngineEvent::TimerTick(TimerTick {
                    session_id: session_id.clone(),
                    elapsed_seconds,
                })),
                None => break,
            }
        }
    });

    replace_timer(&mut timers.elapsed, handle.abort_handle());
}

fn spawn_feedback(shared: &Arc<Shared>, timers: &mut Timers, generation: u64) {
    let weak: Weak<Shared> = Arc::downgrade(shared);
    let delay = Duration::from_millis(shared.config.feedback_interval_ms);

    let handle = tokio::spawn(async move {
        tokio::time::sleep(delay).await;
        let Some(shared) = weak.upgrade() else { return };
        let mut guard = shared.inner.lock().await;
        let inner = &mut *guard;

        match quiz_machine::finish_feedback(&mut inner.state, generation) {
            FeedbackStep::Stale => return,
            FeedbackStep::NextQuestion => {}
            FeedbackStep::Completed => {
                if let Some(elapsed) = inner.timers.elapsed.take() {
                    elapsed.abort();
                }
                tracing::info!(
                    "Quiz completed: quiz={}, session={}, correct={}/{}, score={}, elapsed={}s",
                    shared.quiz_id,
                    inner.state.session_id,
                    inner.state.correct_count,
                    inner.state.questions.len(),
                    inner.state.score,
                    inner.state.elapsed_seconds
                );
            }
        }
        shared.emit_phase(&inner.state);
        shared.persist(inner);
    });

    replace_timer(&mut timers.feedback, handle.abort_handle());
}

/// One player's quiz. Cloning shares the same session.
#[derive(Clone)]
pub struct QuizEngine {
    shared: Arc<Shared>,
}

impl QuizEngine {
    pub fn new(
        quiz_id: impl Into<String>,
        player_id: impl Into<String>,
        config: Arc<EngineConfig>,
        deps: QuizDeps,
    ) -> anyhow::Result<Self> {
        let rotation = TopicRotation::new(config.topics.clone())?;
        let state = SessionState::new(player_id, rotation.topic(0));
        let (events, _) = broadcast::channel(config.event_buffer.max(1));

        QUIZ_SESSIONS_ACTIVE.inc();

        Ok(Self {
            shared: Arc::new(Shared {
                quiz_id: quiz_id.into(),
                config,
                rotation,
                deps,
                inner: Mutex::new(EngineInner {
                    state,
                    log: ConversationLog::new(),
                    timers: Timers::default(),
                }),
                ask_gate: Mutex::new(()),
                conversation_order: Mutex::new(()),
                events,
                closed: AtomicBool::new(false),
            }),
        })
    }

    pub fn id(&self) -> &str {
        &self.shared.quiz_id
    }

    pub fn subscribe(&self) -> broadcast::Receiver<EngineEvent> {
        self.shared.events.subscribe()
    }

    /// True while at least one event stream is attached.
    pub fn has_subscribers(&self) -> bool {
        self.shared.events.receiver_count() > 0
    }

    pub async fn state(&self) -> SessionState {
        self.shared.inner.lock().await.state.clone()
    }

    pub async fn view(&self) -> SessionView {
        self.shared.inner.lock().await.state.view()
    }

    pub async fn messages(&self) -> Vec<ConversationEntry> {
        self.shared.inner.lock().await.log.entries().to_vec()
    }

    pub async fn snapshot(&self) -> QuizSnapshot {
        let inner = self.shared.inner.lock().await;
        QuizSnapshot::capture(&inner.state, inner.log.entries())
    }

    /// Idle -> Loading -> Countdown. Charges the start cost up front and
    /// returns once the batch is installed or the fetch has failed.
    pub async fn start_quiz(&self) -> Result<SessionView, QuizError> {
        let shared = &self.shared;
        let player_id = {
            let inner = shared.inner.lock().await;
            if inner.state.phase != Phase::Idle {
                return Err(QuizError::invalid_phase("start", inner.state.phase));
            }
            inner.state.player_id.clone()
        };

        // the ledger may be remote, so it is never called with the state locked
        let cost = shared.config.start_cost;
        shared.debit(&player_id, cost).await.inspect_err(|e| {
            if matches!(e, QuizError::InsufficientCredits { .. }) {
                QUIZZES_STARTED_TOTAL
                    .with_label_values(&["insufficient_credits"])
                    .inc();
            }
        })?;

        let began = {
            let mut guard = shared.inner.lock().await;
            let inner = &mut *guard;
            quiz_machine::begin_loading(&mut inner.state, shared.config.batch_size).map(
                |request| {
                    tracing::info!(
                        "Starting quiz: quiz={}, player={}, topic={}, difficulty={}",
                        shared.quiz_id,
                        player_id,
                        request.topic,
                        request.difficulty
                    );
                    shared.emit_phase(&inner.state);
                    shared.persist(inner);
                    request
                },
            )
        };
        let request = match began {
            Ok(request) => request,
            Err(e) => {
                // another start won the race while credits were being taken
                shared.refund(&player_id, cost).await;
                return Err(e);
            }
        };

        let result = self.load_batch(request, &player_id, cost).await;
        let label = if result.is_ok() { "started" } else { "failed" };
        QUIZZES_STARTED_TOTAL.with_label_values(&[label]).inc();
        result?;

        Ok(self.view().await)
    }

    /// Fetches a batch for `request` and installs it if the request is still
    /// the pending one. `charged` credits are returned on any failure.
    async fn load_batch(
        &self,
        request: PendingRequest,
        player_id: &str,
        charged: i64,
    ) -> Result<(), QuizError> {
        let shared = &self.shared;
        let started = Instant::now();
        let result = fetch_batch(
            shared.deps.question_source.as_ref(),
            &request,
            &shared.fetch_policy(),
        )
        .await;
        QUESTION_GENERATION_DURATION_SECONDS.observe(started.elapsed().as_secs_f64());

        let outcome = {
            let mut guard = shared.inner.lock().await;
            let inner = &mut *guard;

            match result {
                Ok(batch) => {
                    let count = batch.questions.len();
                    let source = batch.source;
                    match quiz_machine::install_batch(
                        &mut inner.state,
                        &request.request_id,
                        batch,
                        shared.config.countdown_seconds,
                    ) {
                        Ok(advance) => {
                            tracing::info!(
                                "Batch installed: quiz={}, session={}, topic={}, questions={}, source={:?}",
                                shared.quiz_id,
                                inner.state.session_id,
                                inner.state.topic,
                                count,
                                source
                            );
                            if let Some(advance) = advance {
                                inner.log = ConversationLog::new();
                                if advance.difficulty_increased {
                                    shared.emit(EngineEvent::DifficultyIncreased(
                                        DifficultyIncreased {
                                            session_id: inner.state.session_id.clone(),
                                            difficulty: inner.state.difficulty,
                                            message: format!(
                                                "All topics covered! Difficulty increased to {}.",
                                                inner.state.difficulty
                                            ),
                                        },
                                    ));
                                }
                            }
                            shared.emit_phase(&inner.state);
                            schedule_run(shared, inner);
                            shared.persist(inner);
                            return Ok(());
                        }
                        Err(QuizError::Superseded) => {
                            tracing::debug!(
                                "Dropping batch for superseded request={}",
                                request.request_id
                            );
                            Err(QuizError::Superseded)
                        }
                        Err(e) => {
                            if quiz_machine::fail_loading(&mut inner.state, &request.request_id) {
                                shared.emit_phase(&inner.state);
                                shared.persist(inner);
                            }
                            Err(e)
                        }
                    }
                }
                Err(e) => {
                    if quiz_machine::fail_loading(&mut inner.state, &request.request_id) {
                        tracing::warn!(
                            "Question generation failed: quiz={}, topic={}: {}",
                            shared.quiz_id,
                            request.topic,
                            e
                        );
                        shared.emit(EngineEvent::GenerationFailed(GenerationFailed {
                            session_id: inner.state.session_id.clone(),
                            message: e.to_string(),
                            timestamp: chrono::Utc::now(),
                        }));
                        shared.emit_phase(&inner.state);
                        shared.persist(inner);
                        Err(e)
                    } else {
                        Err(QuizError::Superseded)
                    }
                }
            }
        };

        shared.refund(player_id, charged).await;
        outcome
    }

    /// Active -> Feedback. The feedback message is appended to the
    /// conversation and the display interval starts.
    pub async fn submit_answer(&self, choice: &str) -> Result<AnswerOutcome, QuizError> {
        let shared = &self.shared;
        let _order = shared.conversation_order.lock().await;
        let mut guard = shared.inner.lock().await;
        let inner = &mut *guard;

        let question_index = inner.state.current_index;
        let outcome =
            quiz_machine::submit_answer(&mut inner.state, choice, &shared.config.scoring)?;
        let session_id = inner.state.session_id.clone();

        ANSWERS_SUBMITTED_TOTAL
            .with_label_values(&[if outcome.correct { "true" } else { "false" }])
            .inc();
        tracing::info!(
            "Answer processed: quiz={}, session={}, question={}, correct={}, score={}, streak={}",
            shared.quiz_id,
            session_id,
            question_index,
            outcome.correct,
            outcome.score,
            outcome.streak
        );

        shared.emit(EngineEvent::AnswerEvaluated(AnswerEvaluated {
            session_id: session_id.clone(),
            question_index,
            correct: outcome.correct,
            points_awarded: outcome.points_awarded,
            score: outcome.score,
        }));
        for level in &outcome.level_ups {
            LEVEL_UPS_TOTAL.inc();
            shared.emit(EngineEvent::LevelUp(LevelUp {
                session_id: session_id.clone(),
                level: *level,
                message: format!("Level up! You reached level {}.", level),
            }));
        }

        let feedback = if outcome.feedback.is_empty() {
            if outcome.correct {
                "Correct!".to_string()
            } else {
                format!("Sorry, the correct answer was {}.", outcome.correct_answer)
            }
        } else {
            outcome.feedback.clone()
        };
        let entry = inner.log.append_message(Role::Assistant, feedback);
        shared.emit_message(&inner.state, &entry);

        shared.emit_phase(&inner.state);
        spawn_feedback(shared, &mut inner.timers, inner.state.generation);
        shared.persist(inner);

        Ok(outcome)
    }

    /// Asks the assistant about the current question. Assistant failures
    /// still return `Ok`, with a placeholder reply and `degraded` set.
    pub async fn ask(&self, text: &str) -> Result<AskOutcome, QuizError> {
        let shared = &self.shared;
        let text = text.trim();
        if text.is_empty() {
            return Err(QuizError::InvalidInput(
                "question text must not be empty".to_string(),
            ));
        }

        let _gate = match shared.config.ask_policy {
            AskPolicy::Queue => shared.ask_gate.lock().await,
            AskPolicy::Reject => shared.ask_gate.try_lock().map_err(|_| QuizError::Busy)?,
        };
        let _order = shared.conversation_order.lock().await;

        let player_id = {
            let inner = shared.inner.lock().await;
            quiz_machine::ask_context(&inner.state)?;
            inner.state.player_id.clone()
        };
        let cost = shared.config.ask_cost;
        shared.debit(&player_id, cost).await?;

        let prepared = {
            let mut guard = shared.inner.lock().await;
            let inner = &mut *guard;

            quiz_machine::ask_context(&inner.state)
                .cloned()
                .map(|question| {
                    let context = inner
                        .log
                        .recent(shared.config.assistant_context_messages)
                        .to_vec();
                    let user_entry = inner.log.append_message(Role::User, text);
                    shared.emit_message(&inner.state, &user_entry);
                    shared.persist(inner);

                    (
                        AssistantRequest {
                            context,
                            question,
                            user_text: text.to_string(),
                        },
                        user_entry,
                        inner.state.session_id.clone(),
                    )
                })
        };
        let (request, user_entry, session_id) = match prepared {
            Ok(prepared) => prepared,
            Err(e) => {
                shared.refund(&player_id, cost).await;
                return Err(e);
            }
        };

        let request_id = Uuid::new_v4().to_string();
        let reply = self.collect_reply(&session_id, &request_id, request).await;
        ASSISTANT_REQUESTS_TOTAL
            .with_label_values(&[if reply.is_ok() { "success" } else { "failure" }])
            .inc();

        let mut guard = shared.inner.lock().await;
        let inner = &mut *guard;

        if inner.state.session_id != session_id {
            tracing::debug!(
                "Dropping assistant reply for replaced session={} (quiz={})",
                session_id,
                shared.quiz_id
            );
            drop(guard);
            if reply.is_err() {
                shared.refund(&player_id, shared.config.ask_cost).await;
            }
            return Err(QuizError::Superseded);
        }

        let (content, failure) = match reply {
            Ok(content) => (content, None),
            Err(e) => {
                tracing::warn!(
                    "Assistant failed for quiz={}, request={}: {}",
                    shared.quiz_id,
                    request_id,
                    e
                );
                (ASSISTANT_PLACEHOLDER.to_string(), Some(e.to_string()))
            }
        };

        let reply_entry = inner.log.append_message(Role::Assistant, content);
        shared.emit_message(&inner.state, &reply_entry);
        shared.persist(inner);
        drop(guard);

        if failure.is_some() {
            shared.refund(&player_id, shared.config.ask_cost).await;
        }

        Ok(AskOutcome {
            question: user_entry,
            reply: reply_entry,
            degraded: failure.is_some(),
            failure,
        })
    }

    /// Runs the assistant, broadcasting each fragment as it arrives.
    async fn collect_reply(
        &self,
        session_id: &str,
        request_id: &str,
        request: AssistantRequest,
    ) -> Result<String, QuizError> {
        let shared = &self.shared;
        let mut stream = shared
            .deps
            .assistant
            .reply(request)
            .await
            .map_err(|e| QuizError::AssistantFailure(format!("{:#}", e)))?;

        let mut reply = String::new();
        while let Some(chunk) = stream.next().await {
            let chunk = chunk.map_err(|e| QuizError::AssistantFailure(format!("{:#}", e)))?;
            shared.emit(EngineEvent::AssistantDelta(AssistantDelta {
                session_id: session_id.to_string(),
                request_id: request_id.to_string(),
                delta: chunk.clone(),
            }));
            reply.push_str(&chunk);
        }

        if reply.trim().is_empty() {
            return Err(QuizError::AssistantFailure(
                "assistant returned an empty reply".to_string(),
            ));
        }
        Ok(reply)
    }

    /// Completed -> Countdown (replay) or Loading (fresh batch) on the same
    /// topic and difficulty.
    pub async fn repeat(&self) -> Result<SessionView, QuizError> {
        let shared = &self.shared;
        let (plan, player_id) = {
            let mut guard = shared.inner.lock().await;
            let inner = &mut *guard;

            let plan = quiz_machine::begin_repeat(
                &mut inner.state,
                shared.config.repeat_mode,
                shared.config.batch_size,
                shared.config.countdown_seconds,
            )?;
            tracing::info!(
                "Repeating quiz: quiz={}, topic={}, difficulty={}, mode={:?}",
                shared.quiz_id,
                inner.state.topic,
                inner.state.difficulty,
                shared.config.repeat_mode
            );
            shared.emit_phase(&inner.state);
            if plan == RepeatPlan::Replay {
                schedule_run(shared, inner);
            }
            shared.persist(inner);
            (plan, inner.state.player_id.clone())
        };

        if let RepeatPlan::Fetch(request) = plan {
            self.load_batch(request, &player_id, 0).await?;
        }
        Ok(self.view().await)
    }

    /// Completed -> Loading for the next topic. The new topic, difficulty,
    /// progress policy and a fresh conversation take effect only once its
    /// batch is installed; a failed fetch leaves the completed topic as it was.
    pub async fn advance_topic(&self) -> Result<SessionView, QuizError> {
        let shared = &self.shared;
        let (request, player_id) = {
            let mut guard = shared.inner.lock().await;
            let inner = &mut *guard;

            let request = quiz_machine::begin_advance(
                &mut inner.state,
                &shared.rotation,
                shared.config.progress_policy,
                shared.config.batch_size,
            )?;
            inner.timers.cancel_all();

            tracing::info!(
                "Advancing topic: quiz={}, from={}, to={}, difficulty={}",
                shared.quiz_id,
                inner.state.topic,
                request.topic,
                request.difficulty
            );
            shared.emit_phase(&inner.state);
            shared.persist(inner);
            (request, inner.state.player_id.clone())
        };

        self.load_batch(request, &player_id, 0).await?;
        Ok(self.view().await)
    }

    /// Back to Idle from any other phase. Progress is kept; timers and any
    /// in-flight batch request are discarded.
    pub async fn abandon(&self) -> Result<SessionView, QuizError> {
        let shared = &self.shared;
        let mut guard = shared.inner.lock().await;
        let inner = &mut *guard;

        quiz_machine::abandon(&mut inner.state)?;
        inner.timers.cancel_all();
        tracing::info!(
            "Quiz abandoned: quiz={}, session={}",
            shared.quiz_id,
            inner.state.session_id
        );
        shared.emit_phase(&inner.state);
        shared.persist(inner);
        Ok(inner.state.view())
    }

    /// Stops all timers. The engine must not be used afterwards.
    pub async fn close(&self) {
        if self.shared.closed.swap(true, Ordering::SeqCst) {
            return;
        }
        let mut inner = self.shared.inner.lock().await;
        inner.timers.cancel_all();
        QUIZ_SESSIONS_ACTIVE.dec();
        tracing::info!("Quiz closed: quiz={}", self.shared.quiz_id);
    }
}
