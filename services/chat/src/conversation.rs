//! Per-context conversation driver.
//!
//! A `Conversation` owns the history of one (learner, lesson) context. Each
//! call to `submit_turn` opens one relay stream, assembles the reply while
//! reporting the live text, checks the frozen reply for a completion marker and
//! hands the finished turn to the scheduler. The method takes `&mut self`, so a
//! context can never have two turns streaming into it at once.

use crate::transport::RelayTransport;
use mentor_core::{
    assembler::{AssembledMessage, AssemblerUpdate, Termination, assemble_stream},
    completion::CompletionDetector,
    scheduler::{CompletedTurn, PersistenceReport, Scheduler},
    store::{MessageStore, StoreError},
    turn::{ChatTurn, ContextKey},
};
use std::sync::Arc;
use tracing::{error, info, instrument, warn};

#[derive(Debug, thiserror::Error)]
pub enum TurnError {
    /// The relay could not start streaming a reply. Details are logged.
    #[error("could not get a response, try again")]
    Unavailable,
    #[error("message must not be empty")]
    EmptyInput,
}

#[derive(Debug)]
pub struct TurnOutcome {
    pub message: AssembledMessage,
    pub completed_lesson: Option<u32>,
    pub persistence: PersistenceReport,
}

pub struct Conversation {
    context: ContextKey,
    history: Vec<ChatTurn>,
    transport: Arc<dyn RelayTransport>,
    detector: Arc<CompletionDetector>,
    scheduler: Scheduler,
}

impl Conversation {
    pub fn new(
        context: ContextKey,
        transport: Arc<dyn RelayTransport>,
        detector: Arc<CompletionDetector>,
        scheduler: Scheduler,
    ) -> Self {
        Self {
            context,
            history: Vec::new(),
            transport,
            detector,
            scheduler,
        }
    }

    /// Seeds the history from previously stored messages of this context.
    pub async fn resume(
        context: ContextKey,
        transport: Arc<dyn RelayTransport>,
        detector: Arc<CompletionDetector>,
        scheduler: Scheduler,
        messages: &dyn MessageStore,
    ) -> Result<Self, StoreError> {
        let stored = messages.history(&context).await?;
        let mut conversation = Self::new(context, transport, detector, scheduler);
        conversation.history = stored
            .into_iter()
            .map(|m| ChatTurn {
                role: m.role,
                content: m.content,
            })
            .collect();
        Ok(conversation)
    }

    pub fn context(&self) -> &ContextKey {
        &self.context
    }

    pub fn history(&self) -> &[ChatTurn] {
        &self.history
    }

    pub fn scheduler(&self) -> &Scheduler {
        &self.scheduler
    }

    /// Runs one turn end to end.
    ///
    /// `on_update` receives the full partial reply after every appended
    /// fragment. On `TurnError::Unavailable` nothing was persisted and the
    /// history is unchanged. Once streaming has started the turn always
    /// completes: a broken stream yields the partial text, which is kept.
    #[instrument(name = "submit_turn", skip_all, fields(context = %self.context))]
    pub async fn submit_turn<F>(&mut self, text: &str, mut on_update: F) -> Result<TurnOutcome, TurnError>
    where
        F: FnMut(&str),
    {
        if text.trim().is_empty() {
            return Err(TurnError::EmptyInput);
        }

        let mut turns = self.history.clone();
        turns.push(ChatTurn::user(text));

        let events = self
            .transport
            .open_turn(&self.context, &turns)
            .await
            .map_err(|e| {
                error!(error = %e, "Relay did not open a stream for the turn");
                TurnError::Unavailable
            })?;

        let message = assemble_stream(events, |update, partial| {
            if let AssemblerUpdate::Appended(_) = update {
                on_update(partial);
            }
        })
        .await;

        match &message.termination {
            Termination::Done => {}
            Termination::Ended => warn!("Reply ended without a terminal event; keeping partial text"),
            Termination::Failed(reason) => {
                warn!(reason = %reason, "Reply stream broke; keeping partial text")
            }
        }

        let completed_lesson = self.detector.detect(&message.text);
        if let Some(lesson) = completed_lesson {
            info!(lesson, "Completion marker detected");
        }

        self.history = turns;
        if !message.text.is_empty() {
            self.history.push(ChatTurn::assistant(message.text.clone()));
        }

        let persistence = self
            .scheduler
            .schedule(
                CompletedTurn {
                    context: self.context.clone(),
                    user_text: text.to_string(),
                    reply: message.clone(),
                },
                completed_lesson,
            )
            .await;

        Ok(TurnOutcome {
            message,
            completed_lesson,
            persistence,
        })
    }
}
