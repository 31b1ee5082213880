use anyhow::Context;
use redis::aio::ConnectionManager;
use std::sync::Arc;
use std::time::Duration;

use crate::config::Config;

pub mod assistant;
pub mod conversation_log;
pub mod credits;
pub mod persistence;
pub mod progression;
pub mod question_source;
pub mod quiz_engine;
pub mod quiz_machine;
pub mod scoring;
pub mod session_registry;

use assistant::OpenAiAssistant;
use credits::{CreditLedger, RedisCreditLedger, UnlimitedCredits};
use persistence::{
    HistoryStore, MongoSnapshotStore, QueuedSnapshotSink, SnapshotSink, TracingSnapshotSink,
};
use question_source::OpenAiQuestionSource;
use quiz_engine::QuizDeps;
use session_registry::SessionRegistry;

pub struct AppState {
    pub config: Config,
    pub sessions: SessionRegistry,
    pub history: Arc<dyn HistoryStore>,
}

impl AppState {
    /// Connects the configured backends and starts the idle quiz sweeper.
    /// Without Mongo snapshots are only logged and history is empty; without
    /// Redis credits are unlimited.
    pub async fn new(config: Config) -> anyhow::Result<Self> {
        let (snapshots, history): (Arc<dyn SnapshotSink>, Arc<dyn HistoryStore>) =
            match &config.mongo_uri {
                Some(uri) => {
                    let client = mongodb::Client::with_uri_str(uri)
                        .await
                        .context("Failed to connect to MongoDB")?;
                    tracing::info!("MongoDB connected, storing quiz history");
                    let store = Arc::new(MongoSnapshotStore::new(
                        &client.database(&config.mongo_database),
                    ));
                    let sink: Arc<dyn SnapshotSink> =
                        Arc::new(QueuedSnapshotSink::spawn(store.clone()));
                    let history: Arc<dyn HistoryStore> = store;
                    (sink, history)
                }
                None => {
                    tracing::warn!("MONGO_URI not set, quiz snapshots are only logged");
                    (
                        Arc::new(TracingSnapshotSink) as Arc<dyn SnapshotSink>,
                        Arc::new(TracingSnapshotSink) as Arc<dyn HistoryStore>,
                    )
                }
            };

        let credits: Arc<dyn CreditLedger> = match &config.redis_uri {
            Some(uri) => {
                let redis = connect_redis(uri).await?;
                Arc::new(RedisCreditLedger::new(redis, config.initial_credits))
            }
            None => {
                tracing::warn!("REDIS_URI not set, credits are unlimited");
                Arc::new(UnlimitedCredits)
            }
        };

        let deps = QuizDeps {
            question_source: Arc::new(OpenAiQuestionSource::new(config.openai.clone())?),
            assistant: Arc::new(OpenAiAssistant::new(config.openai.clone())?),
            snapshots,
            credits,
        };

        let state = Self::with_components(config, deps, history);
        state.sessions.spawn_sweeper(
            Duration::from_secs(state.config.engine.session_sweep_interval_secs),
            Duration::from_secs(state.config.engine.session_idle_timeout_secs),
        );
        Ok(state)
    }

    pub fn with_components(
        config: Config,
        deps: QuizDeps,
        history: Arc<dyn HistoryStore>,
    ) -> Self {
        let sessions = SessionRegistry::new(Arc::new(config.engine.clone()), deps);
        Self {
            config,
            sessions,
            history,
        }
    }
}

async fn connect_redis(uri: &str) -> anyhow::Result<ConnectionManager> {
    let client = redis::Client::open(uri).context("Failed to create Redis client")?;

    tracing::info!("Attempting to connect to Redis...");

    let redis = tokio::time::timeout(Duration::from_secs(30), ConnectionManager::new(client))
        .await
        .map_err(|_| anyhow::anyhow!("Redis connection timeout after 30s"))??;

    tracing::info!("Redis ConnectionManager created, testing with PING...");

    let mut conn = redis.clone();
    tokio::time::timeout(
        Duration::from_secs(5),
        redis::cmd("PING").query_async::<String>(&mut conn),
    )
    .await
    .map_err(|_| anyhow::anyhow!("Redis PING timeout after 5s"))??;

    tracing::info!("Redis connection established successfully");
    Ok(redis)
}
