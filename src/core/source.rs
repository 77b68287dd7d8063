//! Collaborator contracts the playback core consumes, plus source selection

use crate::error::{Result, TubeError};
use crate::types::{AudioQuality, MediaSource, Rendition, SegmentSet, StreamDescriptor, VideoId};
use async_trait::async_trait;

/// Fetches stream metadata and skip ranges
#[async_trait]
pub trait StreamSource: Send + Sync {
    /// Fails with `NotFound`, `Network` or `Protocol`
    async fn fetch_stream(&self, video_id: &VideoId) -> Result<StreamDescriptor>;

    /// No segments is an empty set, not an error
    async fn fetch_segments(&self, video_id: &VideoId, categories: &[String]) -> Result<SegmentSet>;
}

/// One page of a playlist
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PlaylistPage {
    pub items: Vec<VideoId>,
    pub next_page_token: Option<String>,
}

#[async_trait]
pub trait PlaylistSource: Send + Sync {
    async fn fetch_page(&self, playlist_id: &str, page_token: Option<&str>) -> Result<PlaylistPage>;
}

/// Persisted watch positions
#[async_trait]
pub trait PositionStore: Send + Sync {
    async fn save(&self, video_id: &VideoId, position_millis: u64) -> Result<()>;

    async fn load(&self, video_id: &VideoId) -> Result<Option<u64>>;
}

/// Pick what to hand the player.
///
/// An adaptive manifest always wins. Without one, audio-only playback takes the
/// preferred audio rendition; video playback takes a muxed rendition, or pairs
/// the best video-only rendition with an audio rendition.
pub fn select_source(
    descriptor: &StreamDescriptor,
    audio_only: bool,
    quality: AudioQuality,
) -> Result<MediaSource> {
    if let Some(ref url) = descriptor.adaptive_url {
        return Ok(MediaSource::Adaptive(url.clone()));
    }

    let audio = pick_audio(&descriptor.audio_streams, quality);

    if audio_only {
        return audio
            .map(|r| MediaSource::Single(r.url.clone()))
            .ok_or_else(|| no_source(descriptor));
    }

    let best_muxed = descriptor
        .video_streams
        .iter()
        .filter(|r| !r.video_only)
        .max_by_key(|r| resolution_of(r));
    if let Some(muxed) = best_muxed {
        return Ok(MediaSource::Single(muxed.url.clone()));
    }

    let best_video = descriptor
        .video_streams
        .iter()
        .max_by_key(|r| resolution_of(r));
    match (best_video, audio) {
        (Some(video), Some(audio)) => Ok(MediaSource::Merged {
            video: video.url.clone(),
            audio: audio.url.clone(),
        }),
        (None, Some(audio)) => Ok(MediaSource::Single(audio.url.clone())),
        _ => Err(no_source(descriptor)),
    }
}

fn no_source(descriptor: &StreamDescriptor) -> TubeError {
    TubeError::Protocol(format!("no playable source for {}", descriptor.video_id))
}

fn pick_audio(streams: &[Rendition], quality: AudioQuality) -> Option<&Rendition> {
    let key = |r: &&Rendition| r.bitrate.unwrap_or(0);
    match quality {
        AudioQuality::Best => streams.iter().max_by_key(key),
        AudioQuality::Worst => streams.iter().min_by_key(key),
    }
}

/// "1080p60" -> 1080; unknown qualities sort last
fn resolution_of(rendition: &Rendition) -> u32 {
    rendition
        .quality
        .split('p')
        .next()
        .and_then(|n| n.trim().parse().ok())
        .unwrap_or(0)
}
