use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use std::sync::Arc;

use crate::{
    models::{HistoryQuery, PlayerHistoryResponse},
    services::AppState,
};

const DEFAULT_HISTORY_LIMIT: usize = 20;
const MAX_HISTORY_LIMIT: usize = 100;

pub async fn player_history(
    State(state): State<Arc<AppState>>,
    Path(player_id): Path<String>,
    Query(query): Query<HistoryQuery>,
) -> Result<impl IntoResponse, (StatusCode, String)> {
    let player_id = player_id.trim().to_string();
    if player_id.is_empty() {
        return Err((
            StatusCode::BAD_REQUEST,
            "player_id must not be empty".to_string(),
        ));
    }
    let limit = query
        .limit
        .unwrap_or(DEFAULT_HISTORY_LIMIT)
        .clamp(1, MAX_HISTORY_LIMIT);

    let quiz_history = state.history.history(&player_id, limit).await.map_err(|e| {
        tracing::error!("Failed to load history for player={}: {:#}", player_id, e);
        (
            StatusCode::SERVICE_UNAVAILABLE,
            "Quiz history is unavailable".to_string(),
        )
    })?;

    // a player without stored runs starts at level 1, difficulty 1
    let (level, difficulty) = quiz_history
        .first()
        .map(|latest| (latest.level, latest.difficulty))
        .unwrap_or((1, 1));

    Ok((
        StatusCode::OK,
        Json(PlayerHistoryResponse {
            player_id,
            level,
            difficulty,
            quiz_history,
        }),
    ))
}
