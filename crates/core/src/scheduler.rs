//! Side-Effect Scheduler
//!
//! The only writer to the durable stores. Each completed turn is handed over by
//! value, so its messages and its progress update are scheduled exactly once.
//! The message writes and the progress upsert are independent: a failure in one
//! is reported on its own and never prevents the other.

use crate::assembler::AssembledMessage;
use crate::store::{MessageStore, ProgressStore, StoreError};
use crate::turn::{ContextKey, Role};
use chrono::Utc;
use std::sync::Arc;
use tracing::{error, info, instrument};

/// A turn whose assistant reply has been frozen.
#[derive(Debug, Clone)]
pub struct CompletedTurn {
    pub context: ContextKey,
    pub user_text: String,
    pub reply: AssembledMessage,
}

/// Outcome of each persistence action for one turn.
#[derive(Debug)]
pub struct PersistenceReport {
    pub user_message: Result<(), StoreError>,
    /// `None` when the reply was empty and nothing was written.
    pub assistant_message: Option<Result<(), StoreError>>,
    /// The detected lesson and the result of its upsert, if one was detected.
    pub progress: Option<(u32, Result<(), StoreError>)>,
}

impl PersistenceReport {
    pub fn is_clean(&self) -> bool {
        self.failures().next().is_none()
    }

    pub fn failures(&self) -> impl Iterator<Item = &StoreError> {
        let messages = [
            self.user_message.as_ref().err(),
            self.assistant_message.as_ref().and_then(|r| r.as_ref().err()),
        ];
        let progress = self.progress.as_ref().and_then(|(_, r)| r.as_ref().err());
        messages.into_iter().chain(std::iter::once(progress)).flatten()
    }

    /// The lesson whose progress upsert failed and may be retried.
    pub fn pending_progress(&self) -> Option<u32> {
        match &self.progress {
            Some((lesson, Err(_))) => Some(*lesson),
            _ => None,
        }
    }
}

#[derive(Clone)]
pub struct Scheduler {
    messages: Arc<dyn MessageStore>,
    progress: Arc<dyn ProgressStore>,
}

impl Scheduler {
    pub fn new(messages: Arc<dyn MessageStore>, progress: Arc<dyn ProgressStore>) -> Self {
        Self { messages, progress }
    }

    /// Persists the turn's messages in submission order, then records the
    /// detected lesson as completed.
    #[instrument(name = "schedule_turn", skip_all, fields(context = %turn.context, lesson = ?completed_lesson))]
    pub async fn schedule(
        &self,
        turn: CompletedTurn,
        completed_lesson: Option<u32>,
    ) -> PersistenceReport {
        let user_message = self
            .messages
            .append(&turn.context, Role::User, &turn.user_text)
            .await;
        if let Err(e) = &user_message {
            error!(error = %e, "Failed to persist user message");
        }

        let assistant_message = if turn.reply.text.is_empty() {
            None
        } else {
            let result = self
                .messages
                .append(&turn.context, Role::Assistant, &turn.reply.text)
                .await;
            if let Err(e) = &result {
                error!(error = %e, "Failed to persist assistant message");
            }
            Some(result)
        };

        let progress = match completed_lesson {
            Some(lesson) => Some((
                lesson,
                self.retry_progress(&turn.context.subject, lesson).await,
            )),
            None => None,
        };

        PersistenceReport {
            user_message,
            assistant_message,
            progress,
        }
    }

    /// Marks `lesson` completed for `subject` with a fresh timestamp.
    ///
    /// Safe to repeat: the store upserts on (subject, lesson).
    pub async fn retry_progress(&self, subject: &str, lesson: u32) -> Result<(), StoreError> {
        match self.progress.upsert(subject, lesson, true, Utc::now()).await {
            Ok(()) => {
                info!(subject, lesson, "Lesson marked as completed");
                Ok(())
            }
            Err(e) => {
                error!(subject, lesson, error = %e, "Failed to record lesson progress");
                Err(e)
            }
        }
    }
}
