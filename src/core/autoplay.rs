//! Autoplay resolution - picks what plays after the current video
//!
//! Order of preference: the user's queue, then the owning playlist, then the
//! most relevant related video. Playlist pages are fetched lazily and a
//! failing or slow page only drops that rule.

use crate::core::queue::PlayingQueue;
use crate::core::source::PlaylistSource;
use crate::types::VideoId;
use parking_lot::Mutex;
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

const PAGE_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, Default)]
struct PlaylistState {
    id: String,
    items: Vec<VideoId>,
    next_token: Option<String>,
    fetched_first: bool,
    exhausted: bool,
}

enum Scan {
    Found(VideoId),
    Fetch(Option<String>),
    Done,
}

pub struct AutoPlayResolver {
    source: Option<Arc<dyn PlaylistSource>>,
    playlist: Mutex<Option<PlaylistState>>,
    played: Mutex<HashSet<VideoId>>,
    page_timeout: Duration,
}

impl AutoPlayResolver {
    pub fn new(source: Option<Arc<dyn PlaylistSource>>) -> Self {
        Self {
            source,
            playlist: Mutex::new(None),
            played: Mutex::new(HashSet::new()),
            page_timeout: PAGE_TIMEOUT,
        }
    }

    pub fn with_page_timeout(mut self, timeout: Duration) -> Self {
        self.page_timeout = timeout;
        self
    }

    /// Attach the session to a playlist, or detach it with `None`.
    /// Switching playlists drops the loaded pages.
    pub fn set_playlist(&self, playlist_id: Option<&str>) {
        let mut playlist = self.playlist.lock();
        match playlist_id {
            Some(id) if playlist.as_ref().is_some_and(|p| p.id == id) => {}
            Some(id) => {
                *playlist = Some(PlaylistState {
                    id: id.to_string(),
                    ..Default::default()
                })
            }
            None => *playlist = None,
        }
    }

    pub fn playlist_id(&self) -> Option<String> {
        self.playlist.lock().as_ref().map(|p| p.id.clone())
    }

    pub fn mark_played(&self, video_id: &VideoId) {
        self.played.lock().insert(video_id.clone());
    }

    /// Forget the session's history and playlist
    pub fn reset(&self) {
        self.played.lock().clear();
        *self.playlist.lock() = None;
    }

    /// Next video after `finished`, or `None` when playback should stop
    pub async fn resolve(
        &self,
        finished: &VideoId,
        related: &[VideoId],
        queue: &PlayingQueue,
    ) -> Option<VideoId> {
        let next = match queue.get_next() {
            Some(queued) => Some(queued),
            None => match self.next_from_playlist(finished).await {
                Some(item) => Some(item),
                None => related.first().cloned(),
            },
        };

        // a one-item loop is not autoplay
        let next = next.filter(|id| id != finished);
        debug!(finished = %finished, next = ?next.as_ref().map(VideoId::as_str), "autoplay resolved");
        next
    }

    async fn next_from_playlist(&self, finished: &VideoId) -> Option<VideoId> {
        let source = self.source.as_ref()?;

        loop {
            let (playlist_id, token) = match self.scan(finished) {
                None => return None,
                Some((_, Scan::Found(id))) => return Some(id),
                Some((_, Scan::Done)) => return None,
                Some((playlist_id, Scan::Fetch(token))) => (playlist_id, token),
            };

            let fetch = source.fetch_page(&playlist_id, token.as_deref());
            let page = match tokio::time::timeout(self.page_timeout, fetch).await {
                Ok(Ok(page)) => page,
                Ok(Err(e)) => {
                    warn!(playlist = %playlist_id, error = %e, "playlist page fetch failed");
                    return None;
                }
                Err(_) => {
                    warn!(playlist = %playlist_id, "playlist page fetch timed out");
                    return None;
                }
            };

            {
                let mut guard = self.playlist.lock();
                let Some(state) = guard.as_mut().filter(|p| p.id == playlist_id) else {
                    // playlist switched while the page was in flight
                    return None;
                };
                state.items.extend(page.items);
                state.fetched_first = true;
                state.exhausted = page.next_page_token.is_none();
                state.next_token = page.next_page_token;
            }
        }
    }

    /// Look through loaded items; tell the caller which page to fetch next
    fn scan(&self, finished: &VideoId) -> Option<(String, Scan)> {
        let guard = self.playlist.lock();
        let state = guard.as_ref()?;
        let played = self.played.lock();

        let found = state
            .items
            .iter()
            .find(|id| *id != finished && !played.contains(*id));

        let scan = match found {
            Some(id) => Scan::Found(id.clone()),
            None if state.exhausted => Scan::Done,
            None if !state.fetched_first => Scan::Fetch(None),
            None => Scan::Fetch(state.next_token.clone()),
        };
        Some((state.id.clone(), scan))
    }
}
