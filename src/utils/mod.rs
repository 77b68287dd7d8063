//! Utilities: paths, logging, input parsing

pub mod logging;
pub mod paths;
pub mod video_id;
