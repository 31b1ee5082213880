#![allow(dead_code)]

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use axum::Router;
use futures::stream::{self, StreamExt};
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use quizmaster_api::{
    config::{Config, EngineConfig, OpenAiConfig},
    create_router,
    models::{Phase, QuizQuestion},
    services::{
        assistant::{Assistant, AssistantRequest, ReplyStream},
        credits::{CreditLedger, InMemoryCredits, UnlimitedCredits},
        persistence::MemorySnapshotSink,
        question_source::QuestionSource,
        quiz_engine::{QuizDeps, QuizEngine},
        AppState,
    },
};

pub fn question(prompt: &str, correct: &str) -> QuizQuestion {
    QuizQuestion {
        prompt: prompt.to_string(),
        options: vec![
            correct.to_string(),
            format!("{} option b", prompt),
            format!("{} option c", prompt),
            format!("{} option d", prompt),
        ],
        correct_answer: correct.to_string(),
        feedback_on_correct: "Correct!".to_string(),
        feedback_on_incorrect: format!("Not quite, it was {}.", correct),
        topic: String::new(),
        difficulty: None,
    }
}

/// `count` valid questions whose correct answers are `A0`, `A1`, ...
pub fn batch(topic: &str, count: usize) -> Vec<QuizQuestion> {
    (0..count)
        .map(|i| question(&format!("{} Q{}", topic, i), &format!("A{}", i)))
        .collect()
}

/// Question whose correct answer is not among its options.
pub fn malformed_batch() -> Vec<QuizQuestion> {
    let mut broken = question("Broken", "X");
    broken.correct_answer = "missing".to_string();
    vec![broken]
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BatchCall {
    pub topic: String,
    pub difficulty: u32,
    pub count: usize,
}

/// Plays back queued responses, then generates valid batches.
#[derive(Default)]
pub struct ScriptedSource {
    script: Mutex<VecDeque<Result<Vec<QuizQuestion>>>>,
    calls: Mutex<Vec<BatchCall>>,
    delay: Option<Duration>,
}

impl ScriptedSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_delay(delay: Duration) -> Self {
        Self {
            delay: Some(delay),
            ..Self::default()
        }
    }

    pub fn push(&self, response: Result<Vec<QuizQuestion>>) {
        self.script.lock().unwrap().push_back(response);
    }

    pub fn calls(&self) -> Vec<BatchCall> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl QuestionSource for ScriptedSource {
    async fn request_batch(
        &self,
        topic: &str,
        difficulty: u32,
        count: usize,
    ) -> Result<Vec<QuizQuestion>> {
        self.calls.lock().unwrap().push(BatchCall {
            topic: topic.to_string(),
            difficulty,
            count,
        });
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        let scripted = self.script.lock().unwrap().pop_front();
        scripted.unwrap_or_else(|| Ok(batch(topic, count)))
    }
}

/// Replies "Re: <text>" in two fragments after `delay`.
pub struct EchoAssistant {
    delay: Duration,
    requests: Mutex<Vec<AssistantRequest>>,
}

impl EchoAssistant {
    pub fn new(delay: Duration) -> Self {
        Self {
            delay,
            requests: Mutex::new(Vec::new()),
        }
    }

    pub fn requests(&self) -> Vec<AssistantRequest> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait]
impl Assistant for EchoAssistant {
    async fn reply(&self, request: AssistantRequest) -> Result<ReplyStream> {
        self.requests.lock().unwrap().push(request.clone());
        tokio::time::sleep(self.delay).await;
        let chunks = vec![Ok("Re: ".to_string()), Ok(request.user_text)];
        Ok(stream::iter(chunks).boxed())
    }
}

pub struct FailingAssistant;

#[async_trait]
impl Assistant for FailingAssistant {
    async fn reply(&self, _request: AssistantRequest) -> Result<ReplyStream> {
        Err(anyhow!("assistant unavailable"))
    }
}

/// In-memory credits whose debits take `delay`, like a remote ledger.
pub struct SlowCredits {
    inner: InMemoryCredits,
    delay: Duration,
}

impl SlowCredits {
    pub fn new(initial: i64, delay: Duration) -> Self {
        Self {
            inner: InMemoryCredits::new(initial),
            delay,
        }
    }
}

#[async_trait]
impl CreditLedger for SlowCredits {
    async fn balance(&self, player_id: &str) -> Result<i64> {
        self.inner.balance(player_id).await
    }

    async fn try_debit(&self, player_id: &str, amount: i64) -> Result<bool> {
        tokio::time::sleep(self.delay).await;
        self.inner.try_debit(player_id, amount).await
    }

    async fn refund(&self, player_id: &str, amount: i64) -> Result<()> {
        self.inner.refund(player_id, amount).await
    }
}

/// Engine settings for tests: three topics, three-question batches, fast
/// retries.
pub fn engine_config() -> EngineConfig {
    EngineConfig {
        topics: vec!["Rust".into(), "Tokio".into(), "Axum".into()],
        batch_size: 3,
        generation_backoff_ms: 10,
        ..EngineConfig::default()
    }
}

pub struct Harness {
    pub engine: QuizEngine,
    pub source: Arc<ScriptedSource>,
    pub snapshots: Arc<MemorySnapshotSink>,
}

pub struct HarnessBuilder {
    config: EngineConfig,
    source: Arc<ScriptedSource>,
    assistant: Arc<dyn Assistant>,
    credits: Arc<dyn CreditLedger>,
}

impl HarnessBuilder {
    pub fn new() -> Self {
        Self {
            config: engine_config(),
            source: Arc::new(ScriptedSource::new()),
            assistant: Arc::new(EchoAssistant::new(Duration::from_millis(200))),
            credits: Arc::new(UnlimitedCredits),
        }
    }

    pub fn config(mut self, f: impl FnOnce(&mut EngineConfig)) -> Self {
        f(&mut self.config);
        self
    }

    pub fn source(mut self, source: Arc<ScriptedSource>) -> Self {
        self.source = source;
        self
    }

    pub fn assistant(mut self, assistant: Arc<dyn Assistant>) -> Self {
        self.assistant = assistant;
        self
    }

    pub fn credits(mut self, credits: Arc<dyn CreditLedger>) -> Self {
        self.credits = credits;
        self
    }

    pub fn build(self) -> Harness {
        let snapshots = Arc::new(MemorySnapshotSink::new());
        let deps = QuizDeps {
            question_source: self.source.clone(),
            assistant: self.assistant,
            snapshots: snapshots.clone(),
            credits: self.credits,
        };
        let engine = QuizEngine::new("quiz-1", "player-1", Arc::new(self.config), deps)
            .expect("engine should build");
        Harness {
            engine,
            source: self.source,
            snapshots,
        }
    }
}

pub fn harness() -> Harness {
    HarnessBuilder::new().build()
}

/// Polls until the engine reaches `phase`, letting paused time run.
pub async fn wait_for_phase(engine: &QuizEngine, phase: Phase) {
    for _ in 0..600 {
        if engine.state().await.phase == phase {
            return;
        }
        tokio::time::sleep(Duration::from_millis(50)).await;
    }
    panic!(
        "engine never reached {:?}, stuck in {:?}",
        phase,
        engine.state().await.phase
    );
}

/// Starts a quiz and waits until the first question is active.
pub async fn start_and_activate(engine: &QuizEngine) {
    engine.start_quiz().await.expect("start should succeed");
    wait_for_phase(engine, Phase::Active).await;
}

/// Answers with `choice` and checks the question index stays in bounds.
pub async fn answer(engine: &QuizEngine, choice: &str) -> quizmaster_api::models::AnswerOutcome {
    let outcome = engine
        .submit_answer(choice)
        .await
        .expect("answer should be accepted");
    let state = engine.state().await;
    assert!(state.current_index <= state.questions.len());
    outcome
}

/// Answers every remaining question correctly and waits for Completed.
pub async fn complete_correctly(engine: &QuizEngine) {
    loop {
        let state = engine.state().await;
        match state.phase {
            Phase::Completed => return,
            Phase::Active => {
                let correct = state.questions[state.current_index].correct_answer.clone();
                answer(engine, &correct).await;
            }
            _ => tokio::time::sleep(Duration::from_millis(50)).await,
        }
    }
}

pub fn test_config(engine: EngineConfig) -> Config {
    Config {
        bind_addr: "127.0.0.1:0".to_string(),
        engine,
        openai: OpenAiConfig {
            base_url: "http://localhost:1".to_string(),
            api_key: String::new(),
            model: "test-model".to_string(),
            timeout_seconds: 1,
        },
        mongo_uri: None,
        mongo_database: "quizmaster_test".to_string(),
        redis_uri: None,
        initial_credits: 1000,
    }
}

pub struct TestApp {
    pub router: Router,
    pub state: Arc<AppState>,
    pub source: Arc<ScriptedSource>,
    pub snapshots: Arc<MemorySnapshotSink>,
}

pub fn create_test_app_with(source: Arc<ScriptedSource>, credits: i64) -> TestApp {
    let _ = tracing_subscriber::fmt()
        .with_test_writer()
        .with_max_level(tracing::Level::DEBUG)
        .try_init();

    let snapshots = Arc::new(MemorySnapshotSink::new());
    let deps = QuizDeps {
        question_source: source.clone(),
        assistant: Arc::new(EchoAssistant::new(Duration::from_millis(10))),
        snapshots: snapshots.clone(),
        credits: Arc::new(InMemoryCredits::new(credits)),
    };
    let state = Arc::new(AppState::with_components(
        test_config(engine_config()),
        deps,
        snapshots.clone(),
    ));

    TestApp {
        router: create_router(state.clone()),
        state,
        source,
        snapshots,
    }
}

pub fn create_test_app() -> TestApp {
    create_test_app_with(Arc::new(ScriptedSource::new()), 1000)
}
