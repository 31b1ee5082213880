use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::RwLock;
use tokio::task::JoinHandle;
use tokio::time::{sleep, Instant};
use uuid::Uuid;

use crate::config::EngineConfig;
use crate::error::QuizError;

use super::quiz_engine::{QuizDeps, QuizEngine};

struct Entry {
    engine: QuizEngine,
    last_seen: Mutex<Instant>,
}

impl Entry {
    fn touch(&self) {
        if let Ok(mut last_seen) = self.last_seen.lock() {
            *last_seen = Instant::now();
        }
    }

    fn idle_for(&self, now: Instant) -> Duration {
        self.last_seen
            .lock()
            .map(|last_seen| now.saturating_duration_since(*last_seen))
            .unwrap_or_default()
    }
}

/// Live quiz engines keyed by quiz id. Engines never share state with each
/// other; the registry only hands out handles.
#[derive(Clone)]
pub struct SessionRegistry {
    config: Arc<EngineConfig>,
    deps: QuizDeps,
    sessions: Arc<RwLock<HashMap<String, Entry>>>,
}

impl SessionRegistry {
    pub fn new(config: Arc<EngineConfig>, deps: QuizDeps) -> Self {
        Self {
            config,
            deps,
            sessions: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    pub async fn create(&self, player_id: &str) -> Result<QuizEngine, QuizError> {
        let player_id = player_id.trim();
        if player_id.is_empty() {
            return Err(QuizError::InvalidInput(
                "player_id must not be empty".to_string(),
            ));
        }

        let quiz_id = Uuid::new_v4().to_string();
        let engine = QuizEngine::new(
            quiz_id.clone(),
            player_id,
            self.config.clone(),
            self.deps.clone(),
        )
        .map_err(|e| QuizError::InvalidInput(e.to_string()))?;

        let entry = Entry {
            engine: engine.clone(),
            last_seen: Mutex::new(Instant::now()),
        };
        self.sessions.write().await.insert(quiz_id.clone(), entry);
        tracing::info!("Quiz created: quiz={}, player={}", quiz_id, player_id);
        Ok(engine)
    }

    /// Looks up a quiz and marks it as recently used.
    pub async fn get(&self, quiz_id: &str) -> Option<QuizEngine> {
        let sessions = self.sessions.read().await;
        sessions.get(quiz_id).map(|entry| {
            entry.touch();
            entry.engine.clone()
        })
    }

    /// Discards a quiz and stops its timers. Returns false for unknown ids.
    pub async fn remove(&self, quiz_id: &str) -> bool {
        let removed = self.sessions.write().await.remove(quiz_id);
        match removed {
            Some(entry) => {
                entry.engine.close().await;
                true
            }
            None => false,
        }
    }

    /// Closes quizzes nobody has touched for `idle_timeout`. Quizzes with a
    /// connected event stream are kept. Returns how many were removed.
    pub async fn sweep_idle(&self, idle_timeout: Duration) -> usize {
        let now = Instant::now();
        let expired: Vec<(String, QuizEngine)> = {
            let mut sessions = self.sessions.write().await;
            let ids: Vec<String> = sessions
                .iter()
                .filter(|(_, entry)| {
                    entry.idle_for(now) >= idle_timeout && !entry.engine.has_subscribers()
                })
                .map(|(id, _)| id.clone())
                .collect();
            ids.into_iter()
                .filter_map(|id| sessions.remove(&id).map(|entry| (id, entry.engine)))
                .collect()
        };

        for (quiz_id, engine) in &expired {
            tracing::info!("Evicting idle quiz={}", quiz_id);
            engine.close().await;
        }
        expired.len()
    }

    /// Runs [`Self::sweep_idle`] every `interval` until the runtime shuts
    /// down.
    pub fn spawn_sweeper(&self, interval: Duration, idle_timeout: Duration) -> JoinHandle<()> {
        let registry = self.clone();
        tracing::info!(
            "Starting idle quiz sweeper (interval {}s, timeout {}s)",
            interval.as_secs(),
            idle_timeout.as_secs()
        );

        tokio::spawn(async move {
            loop {
                sleep(interval).await;
                let evicted = registry.sweep_idle(idle_timeout).await;
                if evicted > 0 {
                    tracing::info!(
                        "Idle sweep evicted {} quizzes, {} remain",
                        evicted,
                        registry.len().await
                    );
                }
            }
        })
    }

    pub async fn len(&self) -> usize {
        self.sessions.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.sessions.read().await.is_empty()
    }
}
