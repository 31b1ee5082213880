use axum::{
    http::{header, Method},
    middleware,
    routing::{get, post},
    Router,
};
use std::sync::Arc;
use tower_http::{compression::CompressionLayer, cors::CorsLayer, trace::TraceLayer};

pub mod config;
pub mod error;
pub mod handlers;
pub mod metrics;
pub mod middlewares;
pub mod models;
pub mod services;
pub mod utils;

pub use config::Config;
pub use error::QuizError;
pub use services::AppState;

pub fn create_router(app_state: Arc<AppState>) -> Router {
    let cors = CorsLayer::new()
        .allow_methods([Method::GET, Method::POST, Method::DELETE, Method::OPTIONS])
        .allow_headers([header::AUTHORIZATION, header::CONTENT_TYPE])
        .allow_origin(tower_http::cors::Any);

    Router::new()
        .route("/health", get(handlers::health_check))
        .route(
            "/metrics",
            get(handlers::metrics_handler)
                .layer(middleware::from_fn(handlers::metrics_auth_middleware)),
        )
        .nest("/api/v1/quizzes", quiz_routes().layer(cors.clone()))
        .route(
            "/api/v1/players/{player_id}/history",
            get(handlers::player::player_history).layer(cors),
        )
        .with_state(app_state)
        .layer(middleware::from_fn(
            middlewares::metrics::metrics_middleware,
        ))
        .layer(middleware::from_fn(
            middlewares::trace::trace_context_middleware,
        ))
        .layer(TraceLayer::new_for_http())
}

fn quiz_routes() -> Router<Arc<AppState>> {
    // the event stream is left uncompressed so events are flushed as they happen
    let commands = Router::new()
        .route("/", post(handlers::quiz::create_quiz))
        .route(
            "/{id}",
            get(handlers::quiz::get_quiz).delete(handlers::quiz::delete_quiz),
        )
        .route("/{id}/start", post(handlers::quiz::start_quiz))
        .route("/{id}/repeat", post(handlers::quiz::repeat_quiz))
        .route("/{id}/advance", post(handlers::quiz::advance_topic))
        .route("/{id}/abandon", post(handlers::quiz::abandon_quiz))
        .route("/{id}/answers", post(handlers::quiz::submit_answer))
        .route("/{id}/ask", post(handlers::quiz::ask))
        .route("/{id}/messages", get(handlers::quiz::list_messages))
        .layer(CompressionLayer::new());

    Router::new()
        .merge(commands)
        .route("/{id}/stream", get(handlers::sse::quiz_stream))
}
