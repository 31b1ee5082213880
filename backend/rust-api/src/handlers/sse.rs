use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{
        sse::{Event, KeepAlive, Sse},
        IntoResponse,
    },
};
use futures::stream::{self, Stream};
use std::convert::Infallible;
use std::sync::Arc;
use tokio::sync::broadcast::{self, error::RecvError};

use crate::{metrics::SSE_CONNECTIONS_ACTIVE, models::EngineEvent, services::AppState};

/// SSE endpoint for engine events
/// GET /api/v1/quizzes/{id}/stream
pub async fn quiz_stream(
    State(state): State<Arc<AppState>>,
    Path(quiz_id): Path<String>,
) -> Result<impl IntoResponse, (StatusCode, String)> {
    let engine = state
        .sessions
        .get(&quiz_id)
        .await
        .ok_or_else(|| (StatusCode::NOT_FOUND, "Quiz not found".to_string()))?;

    tracing::info!("Client connected to SSE stream: quiz={}", quiz_id);

    let view = engine.view().await;
    let initial = EngineEvent::phase_changed(&view.session_id, view.phase);
    let stream = create_event_stream(quiz_id, initial, engine.subscribe());

    Ok(Sse::new(stream).keep_alive(KeepAlive::default()))
}

/// Decrements the connection gauge when the stream is dropped.
struct ConnectionGuard {
    quiz_id: String,
}

impl ConnectionGuard {
    fn new(quiz_id: String) -> Self {
        SSE_CONNECTIONS_ACTIVE.inc();
        Self { quiz_id }
    }
}

impl Drop for ConnectionGuard {
    fn drop(&mut self) {
        SSE_CONNECTIONS_ACTIVE.dec();
        tracing::info!("SSE stream closed: quiz={}", self.quiz_id);
    }
}

fn to_sse(event: &EngineEvent) -> Event {
    Event::default()
        .event(event.event_name())
        .data(event.to_sse_data())
}

/// Current phase first, then every engine event until the engine is gone.
fn create_event_stream(
    quiz_id: String,
    initial: EngineEvent,
    receiver: broadcast::Receiver<EngineEvent>,
) -> impl Stream<Item = Result<Event, Infallible>> {
    let guard = ConnectionGuard::new(quiz_id);

    stream::unfold(
        (Some(initial), receiver, guard),
        |(pending, mut receiver, guard)| async move {
            if let Some(event) = pending {
                return Some((Ok(to_sse(&event)), (None, receiver, guard)));
            }

            loop {
                match receiver.recv().await {
                    Ok(event) => return Some((Ok(to_sse(&event)), (None, receiver, guard))),
                    Err(RecvError::Lagged(skipped)) => {
                        tracing::warn!(
                            "SSE client lagging: quiz={}, skipped {} events",
                            guard.quiz_id,
                            skipped
                        );
                    }
                    Err(RecvError::Closed) => return None,
                }
            }
        },
    )
}
