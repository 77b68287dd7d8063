//! Piped API client
//!
//! Implements the stream, segment and playlist sources against a
//! Piped-compatible instance.

use crate::core::source::{PlaylistPage, PlaylistSource, StreamSource};
use crate::error::{Result, TubeError};
use crate::storage::cache::{get_cache_key, get_cached, set_cache, SEGMENT_TTL};
use crate::types::{Rendition, SegmentSet, SkipSegment, StreamDescriptor, VideoId};
use crate::utils::video_id::id_from_watch_path;
use async_trait::async_trait;
use reqwest::StatusCode;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use std::path::PathBuf;
use std::time::Duration;
use tracing::{debug, warn};

const USER_AGENT: &str = concat!("tube-autoplay/", env!("CARGO_PKG_VERSION"));
const REQUEST_TIMEOUT: Duration = Duration::from_secs(15);

// ============================================
// Wire types
// ============================================

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct StreamsResponse {
    title: String,
    #[serde(default)]
    uploader: String,
    /// Seconds; negative or zero for live streams
    #[serde(default)]
    duration: i64,
    #[serde(default)]
    hls: Option<String>,
    #[serde(default)]
    audio_streams: Vec<PipedStream>,
    #[serde(default)]
    video_streams: Vec<PipedStream>,
    #[serde(default)]
    related_streams: Vec<RelatedItem>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PipedStream {
    url: String,
    #[serde(default)]
    format: String,
    #[serde(default)]
    quality: String,
    #[serde(default)]
    bitrate: Option<u64>,
    #[serde(default)]
    video_only: bool,
}

#[derive(Debug, Deserialize)]
struct RelatedItem {
    url: String,
    #[serde(default, rename = "type")]
    kind: Option<String>,
}

#[derive(Debug, Deserialize)]
struct SegmentsResponse {
    #[serde(default)]
    segments: Vec<PipedSegment>,
}

#[derive(Debug, Deserialize)]
struct PipedSegment {
    /// `[start, end]` in seconds
    segment: [f64; 2],
    category: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PlaylistResponse {
    #[serde(default)]
    nextpage: Option<String>,
    #[serde(default)]
    related_streams: Vec<RelatedItem>,
}

// ============================================
// Conversions
// ============================================

impl From<PipedStream> for Rendition {
    fn from(s: PipedStream) -> Self {
        Rendition {
            quality: s.quality,
            format: s.format,
            url: s.url,
            bitrate: s.bitrate,
            video_only: s.video_only,
        }
    }
}

fn related_ids(items: Vec<RelatedItem>) -> Vec<VideoId> {
    items
        .into_iter()
        .filter(|item| item.kind.as_deref().is_none_or(|k| k == "stream"))
        .filter_map(|item| id_from_watch_path(&item.url))
        .collect()
}

fn to_descriptor(video_id: &VideoId, body: StreamsResponse) -> StreamDescriptor {
    StreamDescriptor {
        video_id: video_id.clone(),
        title: body.title,
        uploader: body.uploader,
        duration_millis: body.duration.max(0) as u64 * 1000,
        video_streams: body.video_streams.into_iter().map(Rendition::from).collect(),
        audio_streams: body.audio_streams.into_iter().map(Rendition::from).collect(),
        adaptive_url: body.hls.filter(|url| !url.is_empty()),
        related: related_ids(body.related_streams),
    }
}

fn to_segments(body: SegmentsResponse) -> SegmentSet {
    SegmentSet::new(
        body.segments
            .into_iter()
            .filter(|s| s.segment[0] >= 0.0 && s.segment[1] > s.segment[0])
            .map(|s| {
                SkipSegment::new(
                    (s.segment[0] * 1000.0).round() as u64,
                    (s.segment[1] * 1000.0).round() as u64,
                    s.category,
                )
            })
            .collect(),
    )
}

fn to_page(body: PlaylistResponse) -> PlaylistPage {
    PlaylistPage {
        items: related_ids(body.related_streams),
        next_page_token: body.nextpage.filter(|token| !token.is_empty()),
    }
}

fn parse<T: DeserializeOwned>(body: &str, what: &str) -> Result<T> {
    serde_json::from_str(body).map_err(|e| TubeError::Protocol(format!("{}: {}", what, e)))
}

// ============================================
// Client
// ============================================

pub struct PipedClient {
    http: reqwest::Client,
    base_url: String,
    cache_dir: Option<PathBuf>,
}

impl PipedClient {
    pub fn new(base_url: &str) -> Result<Self> {
        let http = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .timeout(REQUEST_TIMEOUT)
            .build()?;
        Ok(Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
            cache_dir: None,
        })
    }

    /// Cache segment responses under `dir`
    pub fn with_cache_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.cache_dir = Some(dir.into());
        self
    }

    /// GET `path`, returning `None` on 404
    async fn get_text(&self, path: &str) -> Result<Option<String>> {
        let url = format!("{}{}", self.base_url, path);
        debug!(%url, "GET");
        let response = self
            .http
            .get(&url)
            .send()
            .await
            .map_err(|e| TubeError::Network(format!("{}: {}", url, e)))?;

        let status = response.status();
        if status == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        if !status.is_success() {
            return Err(TubeError::Network(format!("HTTP {}: {}", status, url)));
        }

        let body = response
            .text()
            .await
            .map_err(|e| TubeError::Network(format!("{}: {}", url, e)))?;
        Ok(Some(body))
    }
}

#[async_trait]
impl StreamSource for PipedClient {
    async fn fetch_stream(&self, video_id: &VideoId) -> Result<StreamDescriptor> {
        let path = format!("/streams/{}", urlencoding::encode(video_id.as_str()));
        let body = self
            .get_text(&path)
            .await?
            .ok_or_else(|| TubeError::NotFound(video_id.to_string()))?;
        let response: StreamsResponse = parse(&body, "streams")?;
        Ok(to_descriptor(video_id, response))
    }

    async fn fetch_segments(&self, video_id: &VideoId, categories: &[String]) -> Result<SegmentSet> {
        let categories_json = serde_json::to_string(categories)?;
        let cache_key = get_cache_key(&["segments", video_id.as_str(), &categories_json]);

        if let Some(ref dir) = self.cache_dir {
            if let Some(cached) = get_cached::<SegmentSet>(dir, &cache_key).await {
                debug!(video = %video_id, "segments from cache");
                return Ok(cached);
            }
        }

        let path = format!(
            "/sponsors/{}?category={}",
            urlencoding::encode(video_id.as_str()),
            urlencoding::encode(&categories_json)
        );
        let set = match self.get_text(&path).await? {
            Some(body) => to_segments(parse(&body, "sponsors")?),
            None => SegmentSet::default(),
        };

        if let Some(ref dir) = self.cache_dir {
            // best-effort
            if let Err(e) = set_cache(dir, &cache_key, &set, SEGMENT_TTL).await {
                warn!(error = %e, "failed to cache segments");
            }
        }
        Ok(set)
    }
}

#[async_trait]
impl PlaylistSource for PipedClient {
    async fn fetch_page(&self, playlist_id: &str, page_token: Option<&str>) -> Result<PlaylistPage> {
        let id = urlencoding::encode(playlist_id);
        let path = match page_token {
            None => format!("/playlists/{}", id),
            Some(token) => format!(
                "/nextpage/playlists/{}?nextpage={}",
                id,
                urlencoding::encode(token)
            ),
        };
        let body = self
            .get_text(&path)
            .await?
            .ok_or_else(|| TubeError::NotFound(format!("playlist {}", playlist_id)))?;
        Ok(to_page(parse(&body, "playlist")?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const STREAMS: &str = r#"{
        "title": "Lofi mix",
        "uploader": "Chill Channel",
        "duration": 120,
        "hls": null,
        "audioStreams": [
            {"url": "https://cdn/a1", "format": "M4A", "quality": "128 kbps", "bitrate": 128000, "videoOnly": false},
            {"url": "https://cdn/a2", "format": "WEBMA_OPUS", "quality": "160 kbps", "bitrate": 160000, "videoOnly": false}
        ],
        "videoStreams": [
            {"url": "https://cdn/v1", "format": "MPEG_4", "quality": "720p", "videoOnly": true}
        ],
        "relatedStreams": [
            {"url": "/watch?v=abcdefghijk", "type": "stream"},
            {"url": "/channel/UCxyz", "type": "channel"},
            {"url": "/watch?v=bcdefghijkl"}
        ]
    }"#;

    #[test]
    fn test_streams_response_to_descriptor() {
        let body: StreamsResponse = parse(STREAMS, "streams").unwrap();
        let d = to_descriptor(&VideoId::new("dQw4w9WgXcQ"), body);

        assert_eq!(d.title, "Lofi mix");
        assert_eq!(d.duration_millis, 120_000);
        assert_eq!(d.adaptive_url, None);
        assert_eq!(d.audio_streams.len(), 2);
        assert!(d.video_streams[0].video_only);
        assert_eq!(
            d.related,
            vec![VideoId::new("abcdefghijk"), VideoId::new("bcdefghijkl")]
        );
    }

    #[test]
    fn test_live_stream_duration_clamped() {
        let body: StreamsResponse =
            parse(r#"{"title": "live", "duration": -1, "hls": "https://cdn/live.m3u8"}"#, "streams")
                .unwrap();
        let d = to_descriptor(&VideoId::new("x"), body);
        assert_eq!(d.duration_millis, 0);
        assert_eq!(d.adaptive_url.as_deref(), Some("https://cdn/live.m3u8"));
    }

    #[test]
    fn test_segments_in_millis() {
        let body: SegmentsResponse = parse(
            r#"{"segments": [
                {"segment": [5.0, 6.25], "category": "sponsor", "UUID": "u1", "actionType": "skip"},
                {"segment": [9.0, 8.0], "category": "sponsor"}
            ]}"#,
            "sponsors",
        )
        .unwrap();
        let set = to_segments(body);
        assert_eq!(set.segments, vec![SkipSegment::new(5000, 6250, "sponsor")]);
    }

    #[test]
    fn test_playlist_page() {
        let body: PlaylistResponse = parse(
            r#"{"name": "mix", "nextpage": "tok", "relatedStreams": [{"url": "/watch?v=abcdefghijk"}]}"#,
            "playlist",
        )
        .unwrap();
        let page = to_page(body);
        assert_eq!(page.items, vec![VideoId::new("abcdefghijk")]);
        assert_eq!(page.next_page_token.as_deref(), Some("tok"));

        let last: PlaylistResponse = parse(r#"{"nextpage": null}"#, "playlist").unwrap();
        assert_eq!(to_page(last).next_page_token, None);
    }

    #[test]
    fn test_malformed_body_is_protocol_error() {
        let result: Result<StreamsResponse> = parse("<html>", "streams");
        assert!(matches!(result, Err(TubeError::Protocol(_))));
    }

    #[test]
    fn test_base_url_trimmed() {
        let client = PipedClient::new("https://piped.example/").unwrap();
        assert_eq!(client.base_url, "https://piped.example");
    }
}
