//! Outward notifications
//!
//! Presentation layers subscribe to a broadcast channel; the core never knows
//! who is listening.

use crate::types::{GestureEvent, PlaybackState, SkipSegment, VideoId};
use tokio::sync::broadcast;

const DEFAULT_CAPACITY: usize = 64;

#[derive(Debug, Clone, PartialEq)]
pub enum SessionEvent {
    StateChanged {
        video_id: Option<VideoId>,
        state: PlaybackState,
    },
    QueueChanged,
    Gesture(GestureEvent),
    SegmentSkipped {
        video_id: VideoId,
        segment: SkipSegment,
    },
    /// The session was torn down by an unrecoverable error
    Failed(String),
}

#[derive(Debug, Clone)]
pub struct EventBus {
    tx: broadcast::Sender<SessionEvent>,
}

impl EventBus {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx }
    }

    /// Publish to every current subscriber. Having none is fine.
    pub fn emit(&self, event: SessionEvent) {
        let _ = self.tx.send(event);
    }

    pub fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.tx.subscribe()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}
