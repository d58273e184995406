//! Axum Handlers for the REST API
//!
//! Conversation history, lesson progress and the course catalog. The streaming
//! chat endpoint lives in `crate::chat`. Handlers carry `utoipa` annotations to
//! generate the OpenAPI document.

use axum::{
    extract::{Path, State},
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Json, Response},
};
use chrono::Utc;
use mentor_core::{
    course,
    turn::{ContextKey, Role},
};
use std::sync::Arc;
use tracing::{error, info};

use crate::{
    models::{
        AppendMessagePayload, CourseModule, ErrorResponse, HistoryMessage, LessonDetail,
        ProgressEntry, ProgressSummary, UpsertProgressPayload,
    },
    state::AppState,
};

pub enum ApiError {
    BadRequest(String),
    NotFound(String),
    BadGateway(String),
    InternalServerError(anyhow::Error),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        match self {
            ApiError::BadRequest(message) => {
                (StatusCode::BAD_REQUEST, Json(ErrorResponse { message })).into_response()
            }
            ApiError::NotFound(message) => {
                (StatusCode::NOT_FOUND, Json(ErrorResponse { message })).into_response()
            }
            ApiError::BadGateway(message) => {
                (StatusCode::BAD_GATEWAY, Json(ErrorResponse { message })).into_response()
            }
            ApiError::InternalServerError(err) => {
                error!("Internal Server Error: {:?}", err);
                let message = "An internal server error occurred.".to_string();
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    Json(ErrorResponse { message }),
                )
                    .into_response()
            }
        }
    }
}

impl<E> From<E> for ApiError
where
    E: Into<anyhow::Error>,
{
    fn from(err: E) -> Self {
        Self::InternalServerError(err.into())
    }
}

pub(crate) fn user_id(headers: &HeaderMap) -> Result<&str, ApiError> {
    headers
        .get("x-user-id")
        .and_then(|v| v.to_str().ok())
        .filter(|v| !v.trim().is_empty())
        .ok_or_else(|| ApiError::BadRequest("x-user-id header is required".to_string()))
}

pub(crate) fn check_lesson(lesson: u32) -> Result<u32, ApiError> {
    if course::is_valid_lesson(lesson) {
        Ok(lesson)
    } else {
        Err(ApiError::BadRequest(format!(
            "lesson must be between 1 and {}",
            course::TOTAL_LESSONS
        )))
    }
}

/// List the stored conversation of one lesson, oldest first.
#[utoipa::path(
    get,
    path = "/lessons/{lesson}/messages",
    responses(
        (status = 200, description = "Conversation history", body = [HistoryMessage]),
        (status = 400, description = "Bad request", body = ErrorResponse),
        (status = 500, description = "Internal server error", body = ErrorResponse)
    ),
    params(
        ("lesson" = u32, Path, description = "Lesson day"),
        ("x-user-id" = String, Header, description = "The ID of the learner")
    )
)]
pub async fn list_messages(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(lesson): Path<u32>,
) -> Result<Json<Vec<HistoryMessage>>, ApiError> {
    let user_id = user_id(&headers)?;
    let context = ContextKey::new(user_id, check_lesson(lesson)?);

    let history = state.messages.history(&context).await?;
    Ok(Json(history.into_iter().map(Into::into).collect()))
}

/// Append one message to the conversation of a lesson.
#[utoipa::path(
    post,
    path = "/lessons/{lesson}/messages",
    request_body = AppendMessagePayload,
    responses(
        (status = 201, description = "Message stored"),
        (status = 400, description = "Bad request", body = ErrorResponse),
        (status = 500, description = "Internal server error", body = ErrorResponse)
    ),
    params(
        ("lesson" = u32, Path, description = "Lesson day"),
        ("x-user-id" = String, Header, description = "The ID of the learner")
    )
)]
pub async fn append_message(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(lesson): Path<u32>,
    Json(payload): Json<AppendMessagePayload>,
) -> Result<impl IntoResponse, ApiError> {
    let user_id = user_id(&headers)?;
    let context = ContextKey::new(user_id, check_lesson(lesson)?);
    if payload.content.is_empty() {
        return Err(ApiError::BadRequest("content must not be empty".to_string()));
    }

    let role: Role = payload.role.into();
    state
        .messages
        .append(&context, role, &payload.content)
        .await?;

    Ok(StatusCode::CREATED)
}

/// List the learner's lesson progress with the overall course percentage.
#[utoipa::path(
    get,
    path = "/progress",
    responses(
        (status = 200, description = "Progress records", body = ProgressSummary),
        (status = 400, description = "Bad request", body = ErrorResponse),
        (status = 500, description = "Internal server error", body = ErrorResponse)
    ),
    params(
        ("x-user-id" = String, Header, description = "The ID of the learner")
    )
)]
pub async fn get_progress(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
) -> Result<Json<ProgressSummary>, ApiError> {
    let user_id = user_id(&headers)?;
    let records = state.progress.list(user_id).await?;

    let completed: Vec<u32> = records
        .iter()
        .filter(|r| r.completed)
        .map(|r| r.lesson)
        .collect();

    Ok(Json(ProgressSummary {
        total_percentage: course::total_progress(&completed),
        lessons: records.into_iter().map(Into::into).collect(),
    }))
}

/// Insert or overwrite the progress record of one lesson.
#[utoipa::path(
    put,
    path = "/progress/{lesson}",
    request_body = UpsertProgressPayload,
    responses(
        (status = 200, description = "Progress recorded", body = ProgressEntry),
        (status = 400, description = "Bad request", body = ErrorResponse),
        (status = 500, description = "Internal server error", body = ErrorResponse)
    ),
    params(
        ("lesson" = u32, Path, description = "Lesson day"),
        ("x-user-id" = String, Header, description = "The ID of the learner")
    )
)]
pub async fn upsert_progress(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(lesson): Path<u32>,
    Json(payload): Json<UpsertProgressPayload>,
) -> Result<Json<ProgressEntry>, ApiError> {
    let user_id = user_id(&headers)?;
    let lesson = check_lesson(lesson)?;
    let at = payload.completed_at.unwrap_or_else(Utc::now);

    state
        .progress
        .upsert(user_id, lesson, payload.completed, at)
        .await?;
    info!(user_id, lesson, completed = payload.completed, "Lesson progress recorded");

    Ok(Json(ProgressEntry {
        lesson,
        completed: payload.completed,
        completed_at: payload.completed.then_some(at),
    }))
}

/// The fixed course catalog.
#[utoipa::path(
    get,
    path = "/course",
    responses(
        (status = 200, description = "Course modules and lessons", body = [CourseModule])
    )
)]
pub async fn get_course() -> Json<Vec<CourseModule>> {
    Json(course::modules().iter().map(CourseModule::from).collect())
}

/// A single lesson of the catalog, looked up by its day.
#[utoipa::path(
    get,
    path = "/course/lessons/{day}",
    params(
        ("day" = u32, Path, description = "Course day of the lesson")
    ),
    responses(
        (status = 200, description = "The lesson and its module", body = LessonDetail),
        (status = 404, description = "No lesson on that day", body = ErrorResponse)
    )
)]
pub async fn get_lesson(Path(day): Path<u32>) -> Result<Json<LessonDetail>, ApiError> {
    let (module_id, lesson) = course::lessons()
        .find(|(_, l)| l.day == day)
        .ok_or_else(|| ApiError::NotFound(format!("Lesson {day} not found")))?;
    let module_name = course::modules()
        .iter()
        .find(|m| m.id == module_id)
        .map(|m| m.name)
        .unwrap_or_default();

    Ok(Json(LessonDetail {
        day: lesson.day,
        title: lesson.title.to_string(),
        module_id,
        module_name: module_name.to_string(),
    }))
}
