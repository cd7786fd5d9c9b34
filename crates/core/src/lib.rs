//! Kairos Core
//!
//! Domain logic for the real-time adaptive tutoring session. This crate is
//! runtime-agnostic: it defines the lesson content model, the pacing queue
//! that spaces chunk reveal to reading speed, the session state machine,
//! the affect-driven adaptation engine, the conversation side-channel state,
//! and the summary computed at session end. The `kairos-session` service
//! crate drives these pieces from a single tokio event loop.

pub mod adaptation;
pub mod affect;
pub mod chunk;
pub mod conversation;
pub mod history;
pub mod pacing;
pub mod session;
pub mod storage;
pub mod summary;
