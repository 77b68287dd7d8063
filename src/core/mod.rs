//! Core playback: queue, autoplay, segment skipping, gestures, the session

pub mod autoplay;
pub mod events;
pub mod gesture;
pub mod piped;
pub mod player;
pub mod queue;
pub mod segments;
pub mod session;
pub mod source;
