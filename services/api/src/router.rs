//! Axum Router Configuration
//!
//! This module defines the complete HTTP routing for the application,
//! including the streaming chat relay, the REST API, and the OpenAPI document.

use crate::{
    chat, handlers,
    models::{
        AppendMessagePayload, CourseLesson, CourseModule, ErrorResponse, HistoryMessage,
        LessonDetail, MessageRole, ProgressEntry, ProgressSummary, SubmitTurnPayload, TurnMessage,
        UpsertProgressPayload,
    },
    state::AppState,
};

use axum::{
    Json, Router,
    routing::{get, post, put},
};
use std::sync::Arc;
use utoipa::OpenApi;

#[derive(OpenApi)]
#[openapi(
    paths(
        chat::chat,
        handlers::list_messages,
        handlers::append_message,
        handlers::get_progress,
        handlers::upsert_progress,
        handlers::get_course,
        handlers::get_lesson,
    ),
    components(
        schemas(
            SubmitTurnPayload, TurnMessage, AppendMessagePayload, HistoryMessage,
            UpsertProgressPayload, ProgressEntry, ProgressSummary, CourseModule,
            CourseLesson, LessonDetail, ErrorResponse, MessageRole
        )
    ),
    tags(
        (name = "Mentor API", description = "Streaming chat relay and lesson progress for the crypto trading course")
    )
)]
pub struct ApiDoc;

async fn openapi_json() -> Json<utoipa::openapi::OpenApi> {
    Json(ApiDoc::openapi())
}

/// Creates the main Axum router for the application.
pub fn create_router(app_state: Arc<AppState>) -> Router {
    // Group all routes that require AppState into their own router.
    let api_router = Router::new()
        .route("/chat", post(chat::chat))
        .route(
            "/lessons/{lesson}/messages",
            get(handlers::list_messages).post(handlers::append_message),
        )
        .route("/progress", get(handlers::get_progress))
        .route("/progress/{lesson}", put(handlers::upsert_progress))
        .with_state(app_state);

    // Stateless routes.
    Router::new()
        .route("/course", get(handlers::get_course))
        .route("/course/lessons/{day}", get(handlers::get_lesson))
        .route("/api-docs/openapi.json", get(openapi_json))
        .merge(api_router)
}
