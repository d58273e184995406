//! API and Database Models
//!
//! This module defines the data structures used for database mapping with
//! `sqlx`, for request/response bodies, and for generating OpenAPI
//! documentation with `utoipa`.

use chrono::{DateTime, Utc};
use mentor_core::{course, store, turn};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use std::fmt;
use utoipa::ToSchema;

#[derive(sqlx::Type, Debug, Serialize, Deserialize, ToSchema, Clone, Copy, PartialEq)]
#[sqlx(type_name = "message_role", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum MessageRole {
    User,
    Assistant,
}

impl fmt::Display for MessageRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MessageRole::User => write!(f, "user"),
            MessageRole::Assistant => write!(f, "assistant"),
        }
    }
}

impl From<turn::Role> for MessageRole {
    fn from(role: turn::Role) -> Self {
        match role {
            turn::Role::User => MessageRole::User,
            turn::Role::Assistant => MessageRole::Assistant,
        }
    }
}

impl From<MessageRole> for turn::Role {
    fn from(role: MessageRole) -> Self {
        match role {
            MessageRole::User => turn::Role::User,
            MessageRole::Assistant => turn::Role::Assistant,
        }
    }
}

/// A row of `chat_messages`.
#[derive(Serialize, Deserialize, ToSchema, FromRow, Debug, Clone)]
pub struct Message {
    pub id: i64,
    pub user_id: String,
    pub lesson: i32,
    #[schema(value_type = String, example = "user")]
    pub role: MessageRole,
    pub content: String,
    pub created_at: DateTime<Utc>,
}

impl From<Message> for store::StoredMessage {
    fn from(message: Message) -> Self {
        store::StoredMessage {
            role: message.role.into(),
            content: message.content,
            created_at: message.created_at,
        }
    }
}

/// A row of `lesson_progress`.
#[derive(Serialize, Deserialize, ToSchema, FromRow, Debug, Clone)]
pub struct LessonProgress {
    pub user_id: String,
    pub lesson_day: i32,
    pub completed: bool,
    pub completed_at: Option<DateTime<Utc>>,
}

impl From<LessonProgress> for store::ProgressRecord {
    fn from(row: LessonProgress) -> Self {
        store::ProgressRecord {
            subject: row.user_id,
            lesson: row.lesson_day.max(0) as u32,
            completed: row.completed,
            completed_at: row.completed_at,
        }
    }
}

/// One prior or new message in a submitted turn.
#[derive(Serialize, Deserialize, ToSchema, Debug, Clone)]
pub struct TurnMessage {
    #[schema(value_type = String, example = "user")]
    pub role: MessageRole,
    #[schema(example = "oi")]
    pub content: String,
}

impl From<TurnMessage> for turn::ChatTurn {
    fn from(message: TurnMessage) -> Self {
        turn::ChatTurn {
            role: message.role.into(),
            content: message.content,
        }
    }
}

#[derive(Deserialize, ToSchema)]
pub struct SubmitTurnPayload {
    #[schema(example = 1)]
    pub lesson: u32,
    /// Prior turns followed by the new user message.
    pub messages: Vec<TurnMessage>,
}

#[derive(Deserialize, ToSchema)]
pub struct AppendMessagePayload {
    #[schema(value_type = String, example = "assistant")]
    pub role: MessageRole,
    pub content: String,
}

#[derive(Serialize, Deserialize, ToSchema, Debug, Clone, PartialEq)]
pub struct HistoryMessage {
    #[schema(value_type = String, example = "assistant")]
    pub role: MessageRole,
    pub content: String,
    pub created_at: DateTime<Utc>,
}

impl From<store::StoredMessage> for HistoryMessage {
    fn from(message: store::StoredMessage) -> Self {
        HistoryMessage {
            role: message.role.into(),
            content: message.content,
            created_at: message.created_at,
        }
    }
}

#[derive(Serialize, Deserialize, ToSchema)]
pub struct UpsertProgressPayload {
    #[schema(example = true)]
    pub completed: bool,
    /// Defaults to the time the request is handled.
    pub completed_at: Option<DateTime<Utc>>,
}

#[derive(Serialize, Deserialize, ToSchema, Debug, Clone, PartialEq)]
pub struct ProgressEntry {
    pub lesson: u32,
    pub completed: bool,
    pub completed_at: Option<DateTime<Utc>>,
}

impl From<store::ProgressRecord> for ProgressEntry {
    fn from(record: store::ProgressRecord) -> Self {
        ProgressEntry {
            lesson: record.lesson,
            completed: record.completed,
            completed_at: record.completed_at,
        }
    }
}

#[derive(Serialize, Deserialize, ToSchema, Debug)]
pub struct ProgressSummary {
    pub lessons: Vec<ProgressEntry>,
    /// Rounded percentage of the course completed.
    #[schema(example = 35)]
    pub total_percentage: u32,
}

#[derive(Serialize, ToSchema, Debug)]
pub struct CourseLesson {
    pub day: u32,
    pub title: String,
}

#[derive(Serialize, ToSchema, Debug)]
pub struct CourseModule {
    pub id: u32,
    pub name: String,
    pub course_percentage: u32,
    pub lessons: Vec<CourseLesson>,
}

impl From<&course::Module> for CourseModule {
    fn from(module: &course::Module) -> Self {
        CourseModule {
            id: module.id,
            name: module.name.to_string(),
            course_percentage: module.course_percentage,
            lessons: module
                .lessons
                .iter()
                .map(|l| CourseLesson {
                    day: l.day,
                    title: l.title.to_string(),
                })
                .collect(),
        }
    }
}

/// One lesson with the module it belongs to.
#[derive(Serialize, ToSchema, Debug)]
pub struct LessonDetail {
    #[schema(example = 7)]
    pub day: u32,
    #[schema(example = "Dominando o Vector")]
    pub title: String,
    pub module_id: u32,
    #[schema(example = "ANÁLISE")]
    pub module_name: String,
}

#[derive(Serialize, ToSchema)]
pub struct ErrorResponse {
    pub message: String,
}
