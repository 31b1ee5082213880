use axum::{
    body::{to_bytes, Body},
    http::{Request, StatusCode},
    Router,
};
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;
use tower::ServiceExt;

use quizmaster_api::models::Phase;

mod common;

use common::{
    complete_correctly, create_test_app, create_test_app_with, malformed_batch, wait_for_phase,
    ScriptedSource,
};

async fn send(router: &Router, method: &str, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
    let mut builder = Request::builder().method(method).uri(uri);
    let body = match body {
        Some(body) => {
            builder = builder.header("content-type", "application/json");
            Body::from(body.to_string())
        }
        None => Body::empty(),
    };

    let response = router
        .clone()
        .oneshot(builder.body(body).unwrap())
        .await
        .unwrap();

    let status = response.status();
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let json = serde_json::from_slice(&bytes)
        .unwrap_or_else(|_| Value::String(String::from_utf8_lossy(&bytes).to_string()));
    (status, json)
}

async fn create_quiz(router: &Router) -> String {
    let (status, body) = send(
        router,
        "POST",
        "/api/v1/quizzes/",
        Some(json!({ "player_id": "player-1" })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED, "body: {}", body);
    assert_eq!(body["state"]["phase"], "idle");
    body["quiz_id"].as_str().unwrap().to_string()
}

#[tokio::test]
async fn test_health_check() {
    let app = create_test_app();

    let (status, body) = send(&app.router, "GET", "/health", None).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["service"], "quizmaster-api");
    assert_eq!(body["dependencies"]["snapshots"], "log");
}

#[tokio::test]
async fn test_metrics_require_basic_auth() {
    let app = create_test_app();

    let (status, _) = send(&app.router, "GET", "/metrics", None).await;

    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_create_quiz_requires_player() {
    let app = create_test_app();

    let (status, _) = send(
        &app.router,
        "POST",
        "/api/v1/quizzes/",
        Some(json!({ "player_id": "  " })),
    )
    .await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_unknown_quiz_returns_not_found() {
    let app = create_test_app();

    let (status, _) = send(&app.router, "GET", "/api/v1/quizzes/missing", None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, _) = send(&app.router, "POST", "/api/v1/quizzes/missing/start", None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test(start_paused = true)]
async fn test_start_hides_answers_and_rejects_early_answer() {
    let app = create_test_app();
    let quiz_id = create_quiz(&app.router).await;

    let (status, body) = send(
        &app.router,
        "POST",
        &format!("/api/v1/quizzes/{}/start", quiz_id),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK, "body: {}", body);
    assert_eq!(body["phase"], "countdown");
    assert_eq!(body["total_questions"], 3);

    let (status, _) = send(
        &app.router,
        "POST",
        &format!("/api/v1/quizzes/{}/answers", quiz_id),
        Some(json!({ "choice": "A0" })),
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT);

    let engine = app.state.sessions.get(&quiz_id).await.unwrap();
    wait_for_phase(&engine, Phase::Active).await;

    let (status, body) = send(
        &app.router,
        "GET",
        &format!("/api/v1/quizzes/{}", quiz_id),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["phase"], "active");
    assert!(body["current_question"]["prompt"].is_string());
    assert!(body["current_question"].get("correct_answer").is_none());
}

#[tokio::test(start_paused = true)]
async fn test_answer_and_conversation_over_http() {
    let app = create_test_app();
    let quiz_id = create_quiz(&app.router).await;
    send(
        &app.router,
        "POST",
        &format!("/api/v1/quizzes/{}/start", quiz_id),
        None,
    )
    .await;
    let engine = app.state.sessions.get(&quiz_id).await.unwrap();
    wait_for_phase(&engine, Phase::Active).await;

    let (status, body) = send(
        &app.router,
        "POST",
        &format!("/api/v1/quizzes/{}/ask", quiz_id),
        Some(json!({ "text": "hint please" })),
    )
    .await;
    assert_eq!(status, StatusCode::OK, "body: {}", body);
    assert_eq!(body["reply"]["content"], "Re: hint please");
    assert_eq!(body["degraded"], false);

    let (status, body) = send(
        &app.router,
        "POST",
        &format!("/api/v1/quizzes/{}/answers", quiz_id),
        Some(json!({ "choice": "A0" })),
    )
    .await;
    assert_eq!(status, StatusCode::OK, "body: {}", body);
    assert_eq!(body["correct"], true);
    assert_eq!(body["score"], 10);

    let (status, body) = send(
        &app.router,
        "GET",
        &format!("/api/v1/quizzes/{}/messages", quiz_id),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    let roles: Vec<&str> = body
        .as_array()
        .unwrap()
        .iter()
        .map(|m| m["role"].as_str().unwrap())
        .collect();
    assert_eq!(roles, vec!["user", "assistant", "assistant"]);
}

#[tokio::test]
async fn test_delete_quiz() {
    let app = create_test_app();
    let quiz_id = create_quiz(&app.router).await;
    let uri = format!("/api/v1/quizzes/{}", quiz_id);

    let (status, _) = send(&app.router, "DELETE", &uri, None).await;
    assert_eq!(status, StatusCode::NO_CONTENT);

    let (status, _) = send(&app.router, "GET", &uri, None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert!(app.state.sessions.is_empty().await);
}

#[tokio::test]
async fn test_start_without_credits_is_payment_required() {
    let app = create_test_app_with(Arc::new(ScriptedSource::new()), 50);
    let quiz_id = create_quiz(&app.router).await;

    let (status, _) = send(
        &app.router,
        "POST",
        &format!("/api/v1/quizzes/{}/start", quiz_id),
        None,
    )
    .await;

    assert_eq!(status, StatusCode::PAYMENT_REQUIRED);
    assert!(app.source.calls().is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_malformed_batch_is_bad_gateway() {
    let source = Arc::new(ScriptedSource::new());
    source.push(Ok(malformed_batch()));
    source.push(Ok(malformed_batch()));
    let app = create_test_app_with(source, 1000);
    let quiz_id = create_quiz(&app.router).await;

    let (status, _) = send(
        &app.router,
        "POST",
        &format!("/api/v1/quizzes/{}/start", quiz_id),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::BAD_GATEWAY);

    let (_, body) = send(
        &app.router,
        "GET",
        &format!("/api/v1/quizzes/{}", quiz_id),
        None,
    )
    .await;
    assert_eq!(body["phase"], "idle");
}

#[tokio::test(start_paused = true)]
async fn test_player_history_lists_completed_runs() {
    let app = create_test_app();
    let quiz_id = create_quiz(&app.router).await;
    send(
        &app.router,
        "POST",
        &format!("/api/v1/quizzes/{}/start", quiz_id),
        None,
    )
    .await;
    let engine = app.state.sessions.get(&quiz_id).await.unwrap();
    wait_for_phase(&engine, Phase::Active).await;
    complete_correctly(&engine).await;

    let (status, body) = send(&app.router, "GET", "/api/v1/players/player-1/history", None).await;

    assert_eq!(status, StatusCode::OK, "body: {}", body);
    assert_eq!(body["player_id"], "player-1");
    assert_eq!(body["level"], 1);
    assert_eq!(body["difficulty"], 1);
    let runs = body["quiz_history"].as_array().unwrap();
    assert_eq!(runs.len(), 1);
    assert_eq!(runs[0]["phase"], "completed");
    assert_eq!(runs[0]["score"], 30);
    assert_eq!(runs[0]["messages"].as_array().unwrap().len(), 3);
}

#[tokio::test]
async fn test_player_without_history_starts_at_level_one() {
    let app = create_test_app();

    let (status, body) = send(&app.router, "GET", "/api/v1/players/nobody/history", None).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["level"], 1);
    assert_eq!(body["difficulty"], 1);
    assert!(body["quiz_history"].as_array().unwrap().is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_idle_quizzes_are_evicted_unless_streaming() {
    let app = create_test_app();
    let idle = create_quiz(&app.router).await;
    let watched = create_quiz(&app.router).await;
    let _events = app.state.sessions.get(&watched).await.unwrap().subscribe();

    tokio::time::advance(Duration::from_secs(20)).await;
    let fresh = create_quiz(&app.router).await;

    let evicted = app.state.sessions.sweep_idle(Duration::from_secs(15)).await;
    assert_eq!(evicted, 1);

    let (status, _) = send(&app.router, "GET", &format!("/api/v1/quizzes/{}", idle), None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    for quiz_id in [&watched, &fresh] {
        let (status, _) =
            send(&app.router, "GET", &format!("/api/v1/quizzes/{}", quiz_id), None).await;
        assert_eq!(status, StatusCode::OK);
    }
}

#[tokio::test(start_paused = true)]
async fn test_sweeper_evicts_abandoned_quizzes_in_background() {
    let app = create_test_app();
    let quiz_id = create_quiz(&app.router).await;
    let sweeper = app
        .state
        .sessions
        .spawn_sweeper(Duration::from_secs(5), Duration::from_secs(15));

    tokio::time::sleep(Duration::from_secs(10)).await;
    assert_eq!(app.state.sessions.len().await, 1);

    tokio::time::sleep(Duration::from_secs(10)).await;
    assert!(app.state.sessions.get(&quiz_id).await.is_none());
    sweeper.abort();
}
