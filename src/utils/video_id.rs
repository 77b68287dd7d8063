//! Video id extraction from user input

use regex::Regex;
use std::sync::OnceLock;

use crate::error::{Result, TubeError};
use crate::types::VideoId;

fn id_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(
            r"(?x)
            ^(?:
                (?P<bare>[A-Za-z0-9_-]{11})
              | (?:https?://)?(?:www\.|m\.|music\.)?youtube\.com/(?:watch\?(?:.*&)?v=|shorts/|embed/|live/)(?P<long>[A-Za-z0-9_-]{11})
              | (?:https?://)?youtu\.be/(?P<short>[A-Za-z0-9_-]{11})
              | (?:https?://)?[^/\s]+/watch\?(?:.*&)?v=(?P<front>[A-Za-z0-9_-]{11})
            )(?:[?&\#/].*)?$",
        )
        .expect("Invalid regex")
    })
}

fn playlist_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"[?&]list=(?P<list>[A-Za-z0-9_-]+)")
            .expect("Invalid regex")
    })
}

/// Accept a bare id or any common watch URL form
pub fn parse_video_id(input: &str) -> Result<VideoId> {
    let input = input.trim();
    let caps = id_pattern()
        .captures(input)
        .ok_or_else(|| TubeError::InvalidConfig(format!("not a video id or URL: {input}")))?;

    ["bare", "long", "short", "front"]
        .iter()
        .find_map(|name| caps.name(name))
        .map(|m| VideoId::new(m.as_str()))
        .ok_or_else(|| TubeError::InvalidConfig(format!("not a video id or URL: {input}")))
}

/// Playlist id carried by a `list=` query parameter, if any
pub fn parse_playlist_id(input: &str) -> Option<String> {
    playlist_pattern()
        .captures(input)
        .and_then(|caps| caps.name("list"))
        .map(|m| m.as_str().to_string())
}

/// Piped-style related links look like `/watch?v=ID`
pub fn id_from_watch_path(path: &str) -> Option<VideoId> {
    path.split_once("v=")
        .map(|(_, rest)| rest.split('&').next().unwrap_or(rest))
        .filter(|id| id.len() == 11)
        .map(VideoId::new)
}
