//! Type definitions for tube-autoplay
//!
//! Source of truth for all data structures shared between the playback core,
//! its collaborators and the CLI.

use serde::{Deserialize, Serialize};
use std::fmt;

// ============================================
// Video Types
// ============================================

/// Opaque handle identifying a playable item
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct VideoId(String);

impl VideoId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for VideoId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for VideoId {
    fn from(id: &str) -> Self {
        Self::new(id)
    }
}

/// One slot of the playing queue
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueueEntry {
    pub video_id: VideoId,
}

impl QueueEntry {
    pub fn new(video_id: VideoId) -> Self {
        Self { video_id }
    }
}

/// One quality/format variant of a video or audio track
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Rendition {
    /// "1080p", "128 kbps", ...
    pub quality: String,
    /// "M4A", "WEBMA_OPUS", "MPEG_4", ...
    pub format: String,
    pub url: String,
    /// Bits per second, when reported
    pub bitrate: Option<u64>,
    /// True for video renditions that carry no audio track
    pub video_only: bool,
}

/// Resolved metadata for a video
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StreamDescriptor {
    pub video_id: VideoId,
    pub title: String,
    pub uploader: String,
    pub duration_millis: u64,
    pub video_streams: Vec<Rendition>,
    pub audio_streams: Vec<Rendition>,
    /// Combined adaptive stream (HLS manifest), if the backend offers one
    pub adaptive_url: Option<String>,
    /// Related videos, most relevant first
    pub related: Vec<VideoId>,
}

/// What the player is actually handed after source selection
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MediaSource {
    /// Muxed adaptive manifest
    Adaptive(String),
    /// One progressive URL carrying everything needed
    Single(String),
    /// Separate video and audio renditions played together
    Merged { video: String, audio: String },
}

impl MediaSource {
    pub fn primary_url(&self) -> &str {
        match self {
            MediaSource::Adaptive(url) | MediaSource::Single(url) => url,
            MediaSource::Merged { video, .. } => video,
        }
    }
}

// ============================================
// Segment Types
// ============================================

/// A time range to be skipped automatically
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SkipSegment {
    pub start_millis: u64,
    pub end_millis: u64,
    pub category: String,
}

impl SkipSegment {
    pub fn new(start_millis: u64, end_millis: u64, category: impl Into<String>) -> Self {
        Self {
            start_millis,
            end_millis,
            category: category.into(),
        }
    }

    /// Half-open `[start, end)` membership
    pub fn contains(&self, position_millis: u64) -> bool {
        (self.start_millis..self.end_millis).contains(&position_millis)
    }
}

/// Unordered skip ranges for one video
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SegmentSet {
    pub segments: Vec<SkipSegment>,
}

impl SegmentSet {
    pub fn new(segments: Vec<SkipSegment>) -> Self {
        Self { segments }
    }

    pub fn is_empty(&self) -> bool {
        self.segments.is_empty()
    }
}

/// A persisted playback offset
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WatchPosition {
    pub video_id: VideoId,
    pub position_millis: u64,
    /// Unix timestamp of the last write
    pub updated_at: i64,
}

// ============================================
// Playback State
// ============================================

/// Why a session entered `Error`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlaybackFailure {
    pub kind: crate::error::ErrorKind,
    pub message: String,
}

/// The single source of truth for what the session is doing
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PlaybackState {
    Idle,
    Loading,
    Ready,
    Playing,
    Paused,
    Buffering,
    Ended,
    Error(PlaybackFailure),
}

impl PlaybackState {
    /// States from which a new load may start
    pub fn accepts_load(&self) -> bool {
        matches!(
            self,
            PlaybackState::Idle | PlaybackState::Ended | PlaybackState::Error(_)
        )
    }

    /// Playing, paused or buffering: the player holds a live position
    pub fn is_active(&self) -> bool {
        matches!(
            self,
            PlaybackState::Playing | PlaybackState::Paused | PlaybackState::Buffering
        )
    }

    /// Whether the machine allows moving from `self` to `next`.
    ///
    /// `Loading` from a terminal state starts a fresh instance of the machine
    /// rather than being a transition, so it is accepted from those states too.
    pub fn can_transition_to(&self, next: &PlaybackState) -> bool {
        use PlaybackState::*;
        match (self, next) {
            (_, Error(_)) => matches!(self, Loading | Ready | Playing | Paused | Buffering),
            (Idle | Ended | Error(_), Loading) => true,
            (Loading, Ready) => true,
            (Ready, Playing | Paused | Buffering) => true,
            (Playing, Paused | Buffering | Ended) => true,
            (Paused, Playing | Buffering | Ended) => true,
            (Buffering, Playing | Paused | Ended) => true,
            _ => false,
        }
    }
}

impl fmt::Display for PlaybackState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PlaybackState::Idle => f.write_str("idle"),
            PlaybackState::Loading => f.write_str("loading"),
            PlaybackState::Ready => f.write_str("ready"),
            PlaybackState::Playing => f.write_str("playing"),
            PlaybackState::Paused => f.write_str("paused"),
            PlaybackState::Buffering => f.write_str("buffering"),
            PlaybackState::Ended => f.write_str("ended"),
            PlaybackState::Error(failure) => write!(f, "error: {}", failure.message),
        }
    }
}

// ============================================
// Gesture Types
// ============================================

/// Horizontal third of the viewport a double tap landed in
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TapZone {
    Left,
    Center,
    Right,
}

/// Half of the viewport a vertical swipe started in
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SwipeSide {
    Left,
    Right,
}

/// Semantic gesture produced by the classifier
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum GestureEvent {
    SingleTap,
    DoubleTap(TapZone),
    /// Positive `delta_y` means the finger moved up since the last move
    SwipeVertical { side: SwipeSide, delta_y: f32 },
    SwipeEnd,
    PinchZoom,
    PinchMinimize,
}

// ============================================
// Config Types
// ============================================

/// Which audio rendition wins when several are available
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum AudioQuality {
    #[default]
    Best,
    Worst,
}

/// What happens when the current item ends
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum RepeatMode {
    #[default]
    Off,
    /// Restart the same item
    One,
    /// Wrap the queue around to its first entry
    Queue,
}

/// User configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Piped-compatible API base URL
    pub instance: String,
    /// Continue with a resolved next video when one ends
    pub autoplay: bool,
    /// Audio-only playback (the default for background mode)
    pub audio_only: bool,
    pub playback_speed: f32,
    /// Seek step for double taps and `+`/`-` commands
    pub seek_increment_secs: u64,
    /// Segment categories to skip; empty disables skipping
    pub sponsor_categories: Vec<String>,
    /// Announce every skipped segment
    pub skip_notifications: bool,
    /// Remember and restore watch positions
    pub watch_positions: bool,
    pub audio_quality: AudioQuality,
    pub repeat_mode: RepeatMode,
    /// Editor command (default: "nvim")
    pub editor: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            instance: "https://pipedapi.kavin.rocks".into(),
            autoplay: true,
            audio_only: true,
            playback_speed: 1.0,
            seek_increment_secs: 10,
            sponsor_categories: vec!["sponsor".into()],
            skip_notifications: true,
            watch_positions: true,
            audio_quality: AudioQuality::default(),
            repeat_mode: RepeatMode::default(),
            editor: "nvim".into(),
        }
    }
}

// ============================================
// Cache Types
// ============================================

/// Cached data with TTL
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheEntry<T> {
    pub data: T,
    pub timestamp: i64,
    /// Time-to-live in seconds
    pub ttl: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_segment_range_is_half_open() {
        let seg = SkipSegment::new(5000, 6000, "sponsor");
        assert!(!seg.contains(4999));
        assert!(seg.contains(5000));
        assert!(seg.contains(5999));
        assert!(!seg.contains(6000));
    }

    #[test]
    fn test_state_transitions() {
        use PlaybackState::*;
        assert!(Idle.can_transition_to(&Loading));
        assert!(Loading.can_transition_to(&Ready));
        assert!(Playing.can_transition_to(&Paused));
        assert!(Paused.can_transition_to(&Playing));
        assert!(Buffering.can_transition_to(&Playing));
        assert!(!Idle.can_transition_to(&Playing));
        assert!(!Ended.can_transition_to(&Playing));

        let failure = Error(PlaybackFailure {
            kind: crate::error::ErrorKind::Network,
            message: "down".into(),
        });
        assert!(Loading.can_transition_to(&failure));
        assert!(!Idle.can_transition_to(&failure));
        assert!(failure.can_transition_to(&Loading));
    }

    #[test]
    fn test_config_partial_json_uses_defaults() {
        let cfg: Config = serde_json::from_str(r#"{"autoplay": false, "repeat_mode": "queue"}"#)
            .unwrap();
        assert!(!cfg.autoplay);
        assert_eq!(cfg.repeat_mode, RepeatMode::Queue);
        assert_eq!(cfg.seek_increment_secs, 10);
        assert_eq!(cfg.sponsor_categories, vec!["sponsor".to_string()]);
    }
}
