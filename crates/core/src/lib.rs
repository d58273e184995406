//! Mentor Core
//!
//! The transport-agnostic half of the tutoring chat: decoding the provider's
//! streaming frames, re-framing them as normalized events, reassembling those
//! events on the client, spotting lesson-completion markers and persisting the
//! outcome of each turn.

pub mod assembler;
pub mod completion;
pub mod course;
pub mod event;
pub mod frame;
pub mod relay;
pub mod scheduler;
pub mod store;
pub mod turn;
