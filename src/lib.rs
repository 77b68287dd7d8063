//! tube-autoplay library
//!
//! Background playback engine: autoplay queue, sponsor segment skipping,
//! touch gesture classification and a player-driven session state machine.

pub mod core;
pub mod error;
pub mod storage;
pub mod types;
pub mod utils;
