//! Storage modules: config, response cache, watch positions

pub mod cache;
pub mod config;
pub mod positions;
