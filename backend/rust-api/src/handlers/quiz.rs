use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use std::sync::Arc;

use crate::{
    error::QuizError,
    models::{AskRequest, CreateQuizRequest, CreateQuizResponse, SubmitAnswerRequest},
    services::{quiz_engine::QuizEngine, AppState},
};

type ApiError = (StatusCode, String);

/// HTTP status for each engine failure.
pub fn status_for(error: &QuizError) -> StatusCode {
    match error {
        QuizError::InvalidPhase { .. } | QuizError::Busy | QuizError::Superseded => {
            StatusCode::CONFLICT
        }
        QuizError::InsufficientCredits { .. } => StatusCode::PAYMENT_REQUIRED,
        QuizError::InvalidInput(_) => StatusCode::BAD_REQUEST,
        QuizError::GenerationFailure(_)
        | QuizError::MalformedBatch(_)
        | QuizError::AssistantFailure(_) => StatusCode::BAD_GATEWAY,
        QuizError::Backend(_) => StatusCode::SERVICE_UNAVAILABLE,
    }
}

fn quiz_error(operation: &str, quiz_id: &str, error: QuizError) -> ApiError {
    let status = status_for(&error);
    if status.is_server_error() {
        tracing::error!("Failed to {} quiz={}: {}", operation, quiz_id, error);
    } else {
        tracing::info!("Rejected {} for quiz={}: {}", operation, quiz_id, error);
    }
    (status, error.to_string())
}

async fn find_quiz(state: &AppState, quiz_id: &str) -> Result<QuizEngine, ApiError> {
    state
        .sessions
        .get(quiz_id)
        .await
        .ok_or_else(|| (StatusCode::NOT_FOUND, "Quiz not found".to_string()))
}

pub async fn create_quiz(
    State(state): State<Arc<AppState>>,
    Json(req): Json<CreateQuizRequest>,
) -> Result<impl IntoResponse, ApiError> {
    tracing::info!("Creating quiz for player_id={}", req.player_id);

    let engine = state
        .sessions
        .create(&req.player_id)
        .await
        .map_err(|e| quiz_error("create", "-", e))?;

    let response = CreateQuizResponse {
        quiz_id: engine.id().to_string(),
        state: engine.view().await,
    };
    Ok((StatusCode::CREATED, Json(response)))
}

pub async fn get_quiz(
    State(state): State<Arc<AppState>>,
    Path(quiz_id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let engine = find_quiz(&state, &quiz_id).await?;
    Ok((StatusCode::OK, Json(engine.view().await)))
}

pub async fn delete_quiz(
    State(state): State<Arc<AppState>>,
    Path(quiz_id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    tracing::info!("Deleting quiz: {}", quiz_id);

    if state.sessions.remove(&quiz_id).await {
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err((StatusCode::NOT_FOUND, "Quiz not found".to_string()))
    }
}

pub async fn start_quiz(
    State(state): State<Arc<AppState>>,
    Path(quiz_id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let engine = find_quiz(&state, &quiz_id).await?;
    let view = engine
        .start_quiz()
        .await
        .map_err(|e| quiz_error("start", &quiz_id, e))?;
    Ok((StatusCode::OK, Json(view)))
}

pub async fn repeat_quiz(
    State(state): State<Arc<AppState>>,
    Path(quiz_id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let engine = find_quiz(&state, &quiz_id).await?;
    let view = engine
        .repeat()
        .await
        .map_err(|e| quiz_error("repeat", &quiz_id, e))?;
    Ok((StatusCode::OK, Json(view)))
}

pub async fn advance_topic(
    State(state): State<Arc<AppState>>,
    Path(quiz_id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let engine = find_quiz(&state, &quiz_id).await?;
    let view = engine
        .advance_topic()
        .await
        .map_err(|e| quiz_error("advance", &quiz_id, e))?;
    Ok((StatusCode::OK, Json(view)))
}

pub async fn abandon_quiz(
    State(state): State<Arc<AppState>>,
    Path(quiz_id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let engine = find_quiz(&state, &quiz_id).await?;
    let view = engine
        .abandon()
        .await
        .map_err(|e| quiz_error("abandon", &quiz_id, e))?;
    Ok((StatusCode::OK, Json(view)))
}

pub async fn submit_answer(
    State(state): State<Arc<AppState>>,
    Path(quiz_id): Path<String>,
    Json(req): Json<SubmitAnswerRequest>,
) -> Result<impl IntoResponse, ApiError> {
    tracing::info!("Submitting answer for quiz: {}", quiz_id);

    let engine = find_quiz(&state, &quiz_id).await?;
    let outcome = engine
        .submit_answer(&req.choice)
        .await
        .map_err(|e| quiz_error("answer", &quiz_id, e))?;
    Ok((StatusCode::OK, Json(outcome)))
}

pub async fn ask(
    State(state): State<Arc<AppState>>,
    Path(quiz_id): Path<String>,
    Json(req): Json<AskRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let engine = find_quiz(&state, &quiz_id).await?;
    let outcome = engine
        .ask(&req.text)
        .await
        .map_err(|e| quiz_error("ask", &quiz_id, e))?;
    Ok((StatusCode::OK, Json(outcome)))
}

pub async fn list_messages(
    State(state): State<Arc<AppState>>,
    Path(quiz_id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let engine = find_quiz(&state, &quiz_id).await?;
    Ok((StatusCode::OK, Json(engine.messages().await)))
}
