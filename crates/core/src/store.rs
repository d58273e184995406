//! Persistence seams.
//!
//! The pipeline writes exactly two kinds of record: conversation messages and
//! lesson progress. Both stores are traits so the relay service can back them
//! with Postgres, the client with the relay's REST API, and tests with memory.

use crate::turn::{ContextKey, Role};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use tokio::sync::Mutex;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StoreError {
    #[error("store unavailable: {0}")]
    Unavailable(String),
    #[error("store rejected the write: {0}")]
    Rejected(String),
}

/// A persisted conversation message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredMessage {
    pub role: Role,
    pub content: String,
    pub created_at: DateTime<Utc>,
}

/// Completion state of one lesson for one learner.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProgressRecord {
    pub subject: String,
    pub lesson: u32,
    pub completed: bool,
    pub completed_at: Option<DateTime<Utc>>,
}

/// Append-only, per-context ordered message log.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait MessageStore: Send + Sync {
    /// Appends one message; messages of a context are kept in call order.
    async fn append(&self, context: &ContextKey, role: Role, text: &str) -> Result<(), StoreError>;

    /// All messages of a context, oldest first.
    async fn history(&self, context: &ContextKey) -> Result<Vec<StoredMessage>, StoreError>;
}

/// Progress records keyed by (subject, lesson) with upsert semantics.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ProgressStore: Send + Sync {
    /// Inserts or overwrites the record for (subject, lesson). Idempotent.
    async fn upsert(
        &self,
        subject: &str,
        lesson: u32,
        completed: bool,
        at: DateTime<Utc>,
    ) -> Result<(), StoreError>;

    /// All records of a subject, ordered by lesson.
    async fn list(&self, subject: &str) -> Result<Vec<ProgressRecord>, StoreError>;
}

/// In-process implementation of both stores.
#[derive(Debug, Default)]
pub struct MemoryStore {
    messages: Mutex<HashMap<ContextKey, Vec<StoredMessage>>>,
    progress: Mutex<BTreeMap<(String, u32), ProgressRecord>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl MessageStore for MemoryStore {
    async fn append(&self, context: &ContextKey, role: Role, text: &str) -> Result<(), StoreError> {
        self.messages
            .lock()
            .await
            .entry(context.clone())
            .or_default()
            .push(StoredMessage {
                role,
                content: text.to_string(),
                created_at: Utc::now(),
            });
        Ok(())
    }

    async fn history(&self, context: &ContextKey) -> Result<Vec<StoredMessage>, StoreError> {
        Ok(self
            .messages
            .lock()
            .await
            .get(context)
            .cloned()
            .unwrap_or_default())
    }
}

#[async_trait]
impl ProgressStore for MemoryStore {
    async fn upsert(
        &self,
        subject: &str,
        lesson: u32,
        completed: bool,
        at: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        self.progress.lock().await.insert(
            (subject.to_string(), lesson),
            ProgressRecord {
                subject: subject.to_string(),
                lesson,
                completed,
                completed_at: completed.then_some(at),
            },
        );
        Ok(())
    }

    async fn list(&self, subject: &str) -> Result<Vec<ProgressRecord>, StoreError> {
        Ok(self
            .progress
            .lock()
            .await
            .values()
            .filter(|record| record.subject == subject)
            .cloned()
            .collect())
    }
}
