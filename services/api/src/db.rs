//! Data Access Layer
//!
//! Postgres-backed implementations of the core `MessageStore` and
//! `ProgressStore` traits. Queries are built at runtime with `sqlx::query_as`
//! so the crate compiles without a live database.

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use mentor_core::{
    store::{MessageStore, ProgressRecord, ProgressStore, StoreError, StoredMessage},
    turn::{ContextKey, Role},
};
use sqlx::PgPool;

use crate::models::{LessonProgress, Message, MessageRole};

/// A wrapper around the `PgPool` to provide a clear data access interface.
#[derive(Clone)]
pub struct Db {
    pool: PgPool,
}

impl Db {
    /// Creates a new `Db` instance.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Runs all pending `sqlx` migrations.
    pub async fn run_migrations(&self) -> Result<()> {
        sqlx::migrate!("./migrations").run(&self.pool).await?;
        Ok(())
    }
}

// `id` is a BIGSERIAL, so it follows insertion order exactly.
const HISTORY_QUERY: &str = r#"
    SELECT id, user_id, lesson, role, content, created_at
    FROM chat_messages
    WHERE user_id = $1 AND lesson = $2
    ORDER BY id ASC
"#;

fn store_error(err: sqlx::Error) -> StoreError {
    match err {
        sqlx::Error::Database(db) => StoreError::Rejected(db.to_string()),
        other => StoreError::Unavailable(other.to_string()),
    }
}

fn lesson_column(lesson: u32) -> Result<i32, StoreError> {
    i32::try_from(lesson).map_err(|_| StoreError::Rejected(format!("lesson {lesson} out of range")))
}

#[async_trait]
impl MessageStore for Db {
    async fn append(&self, context: &ContextKey, role: Role, text: &str) -> Result<(), StoreError> {
        sqlx::query("INSERT INTO chat_messages (user_id, lesson, role, content) VALUES ($1, $2, $3, $4)")
            .bind(&context.subject)
            .bind(lesson_column(context.lesson)?)
            .bind(MessageRole::from(role))
            .bind(text)
            .execute(&self.pool)
            .await
            .map_err(store_error)?;
        Ok(())
    }

    async fn history(&self, context: &ContextKey) -> Result<Vec<StoredMessage>, StoreError> {
        let rows = sqlx::query_as::<_, Message>(HISTORY_QUERY)
            .bind(&context.subject)
            .bind(lesson_column(context.lesson)?)
            .fetch_all(&self.pool)
            .await
            .map_err(store_error)?;
        Ok(rows.into_iter().map(Into::into).collect())
    }
}

#[async_trait]
impl ProgressStore for Db {
    async fn upsert(
        &self,
        subject: &str,
        lesson: u32,
        completed: bool,
        at: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        let completed_at = completed.then_some(at);
        sqlx::query(
            r#"
            INSERT INTO lesson_progress (user_id, lesson_day, completed, completed_at)
            VALUES ($1, $2, $3, $4)
            ON CONFLICT (user_id, lesson_day)
            DO UPDATE SET completed = EXCLUDED.completed, completed_at = EXCLUDED.completed_at
            "#,
        )
        .bind(subject)
        .bind(lesson_column(lesson)?)
        .bind(completed)
        .bind(completed_at)
        .execute(&self.pool)
        .await
        .map_err(store_error)?;
        Ok(())
    }

    async fn list(&self, subject: &str) -> Result<Vec<ProgressRecord>, StoreError> {
        let rows = sqlx::query_as::<_, LessonProgress>(
            r#"
            SELECT user_id, lesson_day, completed, completed_at
            FROM lesson_progress
            WHERE user_id = $1
            ORDER BY lesson_day ASC
            "#,
        )
        .bind(subject)
        .fetch_all(&self.pool)
        .await
        .map_err(store_error)?;
        Ok(rows.into_iter().map(Into::into).collect())
    }
}
