//! Shared Application State
//!
//! This module defines the `AppState` struct, which holds all shared,
//! clonable resources like the stores and the upstream client.

use crate::upstream::UpstreamClient;
use mentor_core::store::{MessageStore, ProgressStore};
use std::sync::Arc;

/// The shared application state, created once at startup and passed to all handlers.
/// All fields are public to be accessible from other modules.
#[derive(Clone)]
pub struct AppState {
    pub messages: Arc<dyn MessageStore>,
    pub progress: Arc<dyn ProgressStore>,
    pub upstream: Arc<dyn UpstreamClient>,
    pub system_prompt: Arc<String>,
}
