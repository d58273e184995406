//! Mentor Chat Client Library
//!
//! Talks to the relay service: opens one event stream per turn, assembles the
//! reply, detects lesson-completion markers and persists the turn through the
//! relay's REST API. The `mentor-chat` binary is a terminal front end for it.

pub mod cli;
pub mod conversation;
pub mod stores;
pub mod transport;
