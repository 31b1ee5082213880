use async_trait::async_trait;
use futures::TryStreamExt;
use mongodb::{bson::doc, Collection, Database};
use std::collections::HashSet;
use std::sync::{Arc, Mutex};
use std::time::Instant;
use tokio::sync::mpsc;

use crate::metrics::{DB_OPERATIONS_TOTAL, DB_OPERATION_DURATION_SECONDS, SNAPSHOTS_PERSISTED_TOTAL};
use crate::models::QuizSnapshot;
use crate::utils::retry::{retry_async_with_config, RetryConfig};

const HISTORY_COLLECTION: &str = "quiz_history";

/// Receives a snapshot after every state-changing operation. Implementations
/// must return immediately; the engine never waits for storage.
pub trait SnapshotSink: Send + Sync {
    fn persist(&self, snapshot: QuizSnapshot);
}

/// Durable write side used by [`QueuedSnapshotSink`].
#[async_trait]
pub trait SnapshotWriter: Send + Sync {
    async fn write(&self, snapshot: &QuizSnapshot) -> anyhow::Result<()>;
}

/// Read side: the latest snapshot of each of a player's quiz runs, newest
/// first.
#[async_trait]
pub trait HistoryStore: Send + Sync {
    async fn history(&self, player_id: &str, limit: usize) -> anyhow::Result<Vec<QuizSnapshot>>;
}

/// Only logs the snapshot. Used when no database is configured.
#[derive(Debug, Default, Clone)]
pub struct TracingSnapshotSink;

impl SnapshotSink for TracingSnapshotSink {
    fn persist(&self, snapshot: QuizSnapshot) {
        tracing::debug!(
            "Quiz snapshot: session={}, phase={}, score={}, messages={}",
            snapshot.session_id,
            snapshot.phase.as_str(),
            snapshot.score,
            snapshot.messages.len()
        );
        SNAPSHOTS_PERSISTED_TOTAL
            .with_label_values(&["logged"])
            .inc();
    }
}

#[async_trait]
impl HistoryStore for TracingSnapshotSink {
    async fn history(&self, _player_id: &str, _limit: usize) -> anyhow::Result<Vec<QuizSnapshot>> {
        Ok(Vec::new())
    }
}

/// Keeps every snapshot in memory, in arrival order.
#[derive(Debug, Default)]
pub struct MemorySnapshotSink {
    snapshots: Mutex<Vec<QuizSnapshot>>,
}

impl MemorySnapshotSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn snapshots(&self) -> Vec<QuizSnapshot> {
        self.snapshots
            .lock()
            .map(|s| s.clone())
            .unwrap_or_default()
    }
}

impl SnapshotSink for MemorySnapshotSink {
    fn persist(&self, snapshot: QuizSnapshot) {
        if let Ok(mut snapshots) = self.snapshots.lock() {
            snapshots.push(snapshot);
        }
    }
}

#[async_trait]
impl HistoryStore for MemorySnapshotSink {
    async fn history(&self, player_id: &str, limit: usize) -> anyhow::Result<Vec<QuizSnapshot>> {
        let snapshots = self
            .snapshots
            .lock()
            .map_err(|_| anyhow::anyhow!("snapshot store poisoned"))?;

        let mut seen = HashSet::new();
        Ok(snapshots
            .iter()
            .rev()
            .filter(|s| s.player_id == player_id)
            .filter(|s| seen.insert(s.session_id.clone()))
            .take(limit)
            .cloned()
            .collect())
    }
}

/// Hands snapshots to a single background task that writes them one at a
/// time, so a later snapshot of a run never lands before an earlier one.
#[derive(Clone)]
pub struct QueuedSnapshotSink {
    tx: mpsc::UnboundedSender<QuizSnapshot>,
}

impl QueuedSnapshotSink {
    /// Must be called from within a tokio runtime.
    pub fn spawn(writer: Arc<dyn SnapshotWriter>) -> Self {
        let (tx, mut rx) = mpsc::unbounded_channel::<QuizSnapshot>();

        tokio::spawn(async move {
            tracing::info!("Snapshot writer started");
            while let Some(snapshot) = rx.recv().await {
                match writer.write(&snapshot).await {
                    Ok(()) => {
                        SNAPSHOTS_PERSISTED_TOTAL
                            .with_label_values(&["stored"])
                            .inc();
                        tracing::debug!("Quiz snapshot saved: session={}", snapshot.session_id);
                    }
                    Err(e) => {
                        SNAPSHOTS_PERSISTED_TOTAL
                            .with_label_values(&["failed"])
                            .inc();
                        tracing::error!(
                            "Background snapshot save failed for session={}: {:#}",
                            snapshot.session_id,
                            e
                        );
                    }
                }
            }
            tracing::info!("Snapshot writer stopped");
        });

        Self { tx }
    }
}

impl SnapshotSink for QueuedSnapshotSink {
    fn persist(&self, snapshot: QuizSnapshot) {
        if self.tx.send(snapshot).is_err() {
            SNAPSHOTS_PERSISTED_TOTAL
                .with_label_values(&["failed"])
                .inc();
            tracing::error!("Snapshot writer is gone, dropping snapshot");
        }
    }
}

/// Quiz history in MongoDB, one document per quiz run keyed by `sessionId`.
#[derive(Clone)]
pub struct MongoSnapshotStore {
    collection: Collection<QuizSnapshot>,
}

impl MongoSnapshotStore {
    pub fn new(mongo: &Database) -> Self {
        Self {
            collection: mongo.collection(HISTORY_COLLECTION),
        }
    }
}

#[async_trait]
impl SnapshotWriter for MongoSnapshotStore {
    async fn write(&self, snapshot: &QuizSnapshot) -> anyhow::Result<()> {
        let start = Instant::now();
        let res: Result<_, mongodb::error::Error> =
            retry_async_with_config(RetryConfig::aggressive(), || async {
                self.collection
                    .replace_one(doc! { "sessionId": &snapshot.session_id }, snapshot)
                    .upsert(true)
                    .await
                    .map(|_| ())
            })
            .await;

        DB_OPERATION_DURATION_SECONDS
            .with_label_values(&["replace_one", HISTORY_COLLECTION])
            .observe(start.elapsed().as_secs_f64());
        let status = if res.is_ok() { "success" } else { "error" };
        DB_OPERATIONS_TOTAL
            .with_label_values(&["replace_one", HISTORY_COLLECTION, status])
            .inc();

        Ok(res?)
    }
}

#[async_trait]
impl HistoryStore for MongoSnapshotStore {
    async fn history(&self, player_id: &str, limit: usize) -> anyhow::Result<Vec<QuizSnapshot>> {
        let start = Instant::now();
        let res: Result<Vec<QuizSnapshot>, mongodb::error::Error> = async {
            self.collection
                .find(doc! { "playerId": player_id })
                .sort(doc! { "createdAt": -1 })
                .limit(i64::try_from(limit).unwrap_or(i64::MAX))
                .await?
                .try_collect()
                .await
        }
        .await;

        DB_OPERATION_DURATION_SECONDS
            .with_label_values(&["find", HISTORY_COLLECTION])
            .observe(start.elapsed().as_secs_f64());
        let status = if res.is_ok() { "success" } else { "error" };
        DB_OPERATIONS_TOTAL
            .with_label_values(&["find", HISTORY_COLLECTION, status])
            .inc();

        Ok(res?)
    }
}
