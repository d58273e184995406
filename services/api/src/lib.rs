//! Mentor API Library Crate
//!
//! This library contains all the server-side logic for the mentor relay
//! service, including the application state, database access, the upstream
//! provider clients, the streaming chat handler, and routing. The `api`
//! binary is a thin wrapper around this library.

pub mod chat;
pub mod config;
pub mod db;
pub mod handlers;
pub mod models;
pub mod router;
pub mod state;
pub mod upstream;
