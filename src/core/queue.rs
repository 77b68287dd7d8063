//! Playing queue - ordered video ids with a movable cursor
//!
//! The queue is shared between the session task and UI readers, so every
//! operation takes the lock once and leaves the queue consistent before
//! releasing it.

use crate::types::{QueueEntry, VideoId};
use parking_lot::Mutex;

#[derive(Debug, Default)]
struct QueueInner {
    entries: Vec<QueueEntry>,
    cursor: Option<usize>,
    repeat: bool,
}

impl QueueInner {
    fn current_id(&self) -> Option<&VideoId> {
        self.cursor
            .and_then(|idx| self.entries.get(idx))
            .map(|e| &e.video_id)
    }

    /// Index of `id` searching forward from the cursor, then wrapping to the front
    fn find_from_cursor(&self, id: &VideoId) -> Option<usize> {
        let start = self.cursor.unwrap_or(0).min(self.entries.len());
        let matches = |e: &QueueEntry| &e.video_id == id;
        self.entries[start..]
            .iter()
            .position(matches)
            .map(|idx| idx + start)
            .or_else(|| self.entries[..start].iter().position(matches))
    }

    fn next_after_cursor(&self) -> Option<VideoId> {
        let current = self.current_id();
        let start = self.cursor.map(|c| c + 1).unwrap_or(0);
        let not_current = |e: &&QueueEntry| Some(&e.video_id) != current;

        let found = self.entries[start.min(self.entries.len())..]
            .iter()
            .find(not_current);

        match found {
            Some(entry) => Some(entry.video_id.clone()),
            None if self.repeat => self
                .entries
                .iter()
                .find(not_current)
                .map(|e| e.video_id.clone()),
            None => None,
        }
    }
}

/// Consistent view of the queue taken under a single lock
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueueSnapshot {
    pub entries: Vec<VideoId>,
    pub cursor: Option<usize>,
}

impl QueueSnapshot {
    pub fn current(&self) -> Option<&VideoId> {
        self.cursor.and_then(|idx| self.entries.get(idx))
    }
}

/// Ordered, mutable sequence of video ids
#[derive(Debug, Default)]
pub struct PlayingQueue {
    inner: Mutex<QueueInner>,
}

impl PlayingQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append `id` unless it already is the tail
    pub fn add(&self, id: VideoId) {
        let mut inner = self.inner.lock();
        if inner.entries.last().map(|e| &e.video_id) == Some(&id) {
            return;
        }
        inner.entries.push(QueueEntry::new(id));
    }

    /// Append `id` for a load unless the cursor will reach it anyway: it is
    /// at or after the cursor, or anywhere at all when queue repeat is on.
    pub fn add_upcoming(&self, id: VideoId) {
        let mut inner = self.inner.lock();
        let reachable = inner
            .find_from_cursor(&id)
            .is_some_and(|idx| inner.repeat || idx >= inner.cursor.unwrap_or(0));
        if !reachable {
            inner.entries.push(QueueEntry::new(id));
        }
    }

    /// Append `id` unconditionally (explicit user action)
    pub fn enqueue(&self, id: VideoId) {
        self.inner.lock().entries.push(QueueEntry::new(id));
    }

    /// The id after the cursor, skipping entries equal to the current id.
    /// Wraps to the front when queue repeat is on.
    pub fn get_next(&self) -> Option<VideoId> {
        self.inner.lock().next_after_cursor()
    }

    /// Move the cursor to the first occurrence of `id` at or after the
    /// cursor (wrapping to the front), appending it if absent
    pub fn update_current(&self, id: &VideoId) {
        let mut inner = self.inner.lock();
        let idx = match inner.find_from_cursor(id) {
            Some(idx) => idx,
            None => {
                inner.entries.push(QueueEntry::new(id.clone()));
                inner.entries.len() - 1
            }
        };
        inner.cursor = Some(idx);
    }

    pub fn clear(&self) {
        let mut inner = self.inner.lock();
        inner.entries.clear();
        inner.cursor = None;
    }

    pub fn is_not_empty(&self) -> bool {
        !self.inner.lock().entries.is_empty()
    }

    pub fn len(&self) -> usize {
        self.inner.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        !self.is_not_empty()
    }

    pub fn current(&self) -> Option<VideoId> {
        self.inner.lock().current_id().cloned()
    }

    pub fn set_repeat(&self, repeat: bool) {
        self.inner.lock().repeat = repeat;
    }

    pub fn snapshot(&self) -> QueueSnapshot {
        let inner = self.inner.lock();
        QueueSnapshot {
            entries: inner.entries.iter().map(|e| e.video_id.clone()).collect(),
            cursor: inner.cursor,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use std::sync::Arc;

    fn id(s: &str) -> VideoId {
        VideoId::new(s)
    }

    #[test]
    fn test_add_skips_duplicate_tail() {
        let queue = PlayingQueue::new();
        queue.add(id("a"));
        queue.add(id("a"));
        queue.add(id("b"));
        queue.add(id("a"));
        assert_eq!(queue.snapshot().entries, vec![id("a"), id("b"), id("a")]);
    }

    #[test]
    fn test_enqueue_allows_duplicates() {
        let queue = PlayingQueue::new();
        queue.enqueue(id("a"));
        queue.enqueue(id("a"));
        assert_eq!(queue.len(), 2);
    }

    #[test]
    fn test_get_next_does_not_move_cursor() {
        let queue = PlayingQueue::new();
        queue.add(id("a"));
        queue.add(id("b"));
        queue.update_current(&id("a"));

        assert_eq!(queue.get_next(), Some(id("b")));
        assert_eq!(queue.get_next(), Some(id("b")));
        assert_eq!(queue.current(), Some(id("a")));

        queue.update_current(&id("b"));
        assert_eq!(queue.get_next(), None);
    }

    #[test]
    fn test_update_current_inserts_missing_id() {
        let queue = PlayingQueue::new();
        queue.add(id("a"));
        queue.update_current(&id("z"));

        let snap = queue.snapshot();
        assert_eq!(snap.entries, vec![id("a"), id("z")]);
        assert_eq!(snap.current(), Some(&id("z")));
    }

    #[test]
    fn test_update_current_uses_first_occurrence() {
        let queue = PlayingQueue::new();
        queue.enqueue(id("a"));
        queue.enqueue(id("b"));
        queue.enqueue(id("a"));
        queue.update_current(&id("a"));
        assert_eq!(queue.snapshot().cursor, Some(0));
    }

    #[test]
    fn test_duplicate_right_after_cursor_is_skipped() {
        let queue = PlayingQueue::new();
        queue.enqueue(id("a"));
        queue.enqueue(id("a"));
        queue.update_current(&id("a"));
        assert_eq!(queue.get_next(), None);
    }

    #[test]
    fn test_add_upcoming_keeps_queued_entries_in_place() {
        let queue = PlayingQueue::new();
        queue.add_upcoming(id("v1"));
        queue.update_current(&id("v1"));
        queue.enqueue(id("q1"));
        queue.enqueue(id("q2"));

        queue.add_upcoming(id("q1"));
        queue.update_current(&id("q1"));
        assert_eq!(queue.len(), 3);
        assert_eq!(queue.get_next(), Some(id("q2")));

        // an already-played id is appended again
        queue.add_upcoming(id("v1"));
        queue.update_current(&id("v1"));
        let snap = queue.snapshot();
        assert_eq!(snap.entries, vec![id("v1"), id("q1"), id("q2"), id("v1")]);
        assert_eq!(snap.cursor, Some(3));
    }

    #[test]
    fn test_clear_is_idempotent() {
        let queue = PlayingQueue::new();
        queue.add(id("a"));
        queue.update_current(&id("a"));

        queue.clear();
        assert!(queue.is_empty());
        assert_eq!(queue.current(), None);

        queue.clear();
        assert!(queue.is_empty());
        assert_eq!(queue.snapshot().cursor, None);
    }

    #[test]
    fn test_repeat_wraps_to_front() {
        let queue = PlayingQueue::new();
        queue.add(id("a"));
        queue.add(id("b"));
        queue.update_current(&id("b"));
        assert_eq!(queue.get_next(), None);

        queue.set_repeat(true);
        assert_eq!(queue.get_next(), Some(id("a")));

        // a single entry never wraps onto itself
        let single = PlayingQueue::new();
        single.set_repeat(true);
        single.update_current(&id("a"));
        assert_eq!(single.get_next(), None);
    }

    #[test]
    fn test_concurrent_readers_never_see_torn_state() {
        let queue = Arc::new(PlayingQueue::new());
        let writer = {
            let queue = Arc::clone(&queue);
            std::thread::spawn(move || {
                for i in 0..500 {
                    queue.update_current(&VideoId::new(format!("v{i}")));
                }
            })
        };

        for _ in 0..500 {
            let snap = queue.snapshot();
            if let Some(cursor) = snap.cursor {
                assert!(cursor < snap.entries.len());
            }
        }
        writer.join().unwrap();
        assert_eq!(queue.len(), 500);
    }

    #[derive(Debug, Clone)]
    enum Op {
        Add(u8),
        AddUpcoming(u8),
        Enqueue(u8),
        UpdateCurrent(u8),
        Clear,
        Repeat(bool),
    }

    fn op() -> impl Strategy<Value = Op> {
        prop_oneof![
            (0u8..4).prop_map(Op::Add),
            (0u8..4).prop_map(Op::AddUpcoming),
            (0u8..4).prop_map(Op::Enqueue),
            (0u8..4).prop_map(Op::UpdateCurrent),
            Just(Op::Clear),
            any::<bool>().prop_map(Op::Repeat),
        ]
    }

    fn name(n: u8) -> VideoId {
        VideoId::new(format!("v{n}"))
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(256))]

        /// For any sequence of mutations the cursor stays in bounds and
        /// `get_next` never hands back the current id.
        #[test]
        fn prop_get_next_never_returns_current(ops in prop::collection::vec(op(), 0..60)) {
            let queue = PlayingQueue::new();
            for op in ops {
                match op {
                    Op::Add(n) => queue.add(name(n)),
                    Op::AddUpcoming(n) => queue.add_upcoming(name(n)),
                    Op::Enqueue(n) => queue.enqueue(name(n)),
                    Op::UpdateCurrent(n) => queue.update_current(&name(n)),
                    Op::Clear => queue.clear(),
                    Op::Repeat(on) => queue.set_repeat(on),
                }

                let snap = queue.snapshot();
                if let Some(cursor) = snap.cursor {
                    prop_assert!(cursor < snap.entries.len());
                }
                if let (Some(next), Some(current)) = (queue.get_next(), snap.current()) {
                    prop_assert_ne!(&next, current);
                }
            }
        }

        /// Following `get_next` the way autoplay does visits every queued id
        /// once, in order, without growing the queue.
        #[test]
        fn prop_autoplay_walk_visits_each_entry_once(
            queued in prop::collection::btree_set(1u8..60, 0..12),
        ) {
            let queue = PlayingQueue::new();
            queue.add_upcoming(name(0));
            queue.update_current(&name(0));
            let queued: Vec<VideoId> = queued.into_iter().map(name).collect();
            for id in &queued {
                queue.enqueue(id.clone());
            }

            let mut played = vec![name(0)];
            while let Some(next) = queue.get_next() {
                prop_assert!(played.len() <= queued.len());
                queue.add_upcoming(next.clone());
                queue.update_current(&next);
                played.push(next);
            }

            let mut expected = vec![name(0)];
            expected.extend(queued.iter().cloned());
            prop_assert_eq!(played, expected);
            prop_assert_eq!(queue.len(), queued.len() + 1);
        }

        /// With queue repeat the walk cycles forever but the queue stays put
        #[test]
        fn prop_repeat_walk_does_not_grow(
            queued in prop::collection::btree_set(1u8..60, 1..8),
            rounds in 1usize..4,
        ) {
            let queue = PlayingQueue::new();
            queue.set_repeat(true);
            queue.add_upcoming(name(0));
            queue.update_current(&name(0));
            for n in &queued {
                queue.enqueue(name(*n));
            }
            let len = queue.len();

            for _ in 0..rounds * len {
                let next = queue.get_next();
                prop_assert!(next.is_some());
                if let Some(next) = next {
                    queue.add_upcoming(next.clone());
                    queue.update_current(&next);
                }
            }
            prop_assert_eq!(queue.len(), len);
        }
    }
}
