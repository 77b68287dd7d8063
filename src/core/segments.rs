//! Segment skipping
//!
//! The monitor is a pure decision over the current playback offset. The
//! session owns the 100 ms timer that feeds it and performs the seeks it asks
//! for, so stopping the monitor is just dropping it.

use crate::types::{SegmentSet, SkipSegment};
use std::time::Duration;

/// Polling cadence while a segment set is active
pub const POLL_INTERVAL: Duration = Duration::from_millis(100);

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SkipAction {
    /// Position is outside every range
    Continue,
    /// Seek to `to`, the end of `segment`
    Seek { to: u64, segment: SkipSegment },
    /// Every range ends at or before the position; nothing left to skip
    Exhausted,
}

#[derive(Debug, Clone)]
pub struct SegmentSkipMonitor {
    segments: Vec<SkipSegment>,
    last_end: u64,
    /// Range we already jumped out of during the current traversal
    skipping: Option<usize>,
}

impl SegmentSkipMonitor {
    /// Keep the segments whose category is enabled. Returns `None` when nothing
    /// remains to skip.
    pub fn new(set: SegmentSet, categories: &[String]) -> Option<Self> {
        let mut segments: Vec<SkipSegment> = set
            .segments
            .into_iter()
            .filter(|s| s.end_millis > s.start_millis)
            .filter(|s| categories.iter().any(|c| c == &s.category))
            .collect();
        if segments.is_empty() {
            return None;
        }
        segments.sort_by_key(|s| s.start_millis);
        let last_end = segments.iter().map(|s| s.end_millis).max().unwrap_or(0);

        Some(Self {
            segments,
            last_end,
            skipping: None,
        })
    }

    pub fn segments(&self) -> &[SkipSegment] {
        &self.segments
    }

    /// Compare one position sample against the ranges
    pub fn check(&mut self, position_millis: u64) -> SkipAction {
        let hit = self
            .segments
            .iter()
            .enumerate()
            .filter(|(_, s)| s.contains(position_millis))
            .max_by_key(|(_, s)| s.end_millis);

        match hit {
            Some((idx, _)) if self.skipping == Some(idx) => SkipAction::Continue,
            Some((idx, segment)) => {
                self.skipping = Some(idx);
                SkipAction::Seek {
                    to: segment.end_millis,
                    segment: segment.clone(),
                }
            }
            None => {
                self.skipping = None;
                if position_millis >= self.last_end {
                    SkipAction::Exhausted
                } else {
                    SkipAction::Continue
                }
            }
        }
    }

    /// Forget the current traversal, e.g. after a user seek
    pub fn rearm(&mut self) {
        self.skipping = None;
    }

    /// Whether any range still lies ahead of `position_millis`
    pub fn has_segments_after(&self, position_millis: u64) -> bool {
        position_millis < self.last_end
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn monitor(segments: Vec<SkipSegment>) -> SegmentSkipMonitor {
        SegmentSkipMonitor::new(SegmentSet::new(segments), &["sponsor".to_string()]).unwrap()
    }

    fn seeks(monitor: &mut SegmentSkipMonitor, positions: &[u64]) -> Vec<u64> {
        positions
            .iter()
            .filter_map(|p| match monitor.check(*p) {
                SkipAction::Seek { to, .. } => Some(to),
                _ => None,
            })
            .collect()
    }

    #[test]
    fn test_single_seek_per_traversal() {
        let mut m = monitor(vec![SkipSegment::new(5000, 6000, "sponsor")]);
        assert_eq!(seeks(&mut m, &[4900, 5000, 5100]), vec![6000]);
    }

    #[test]
    fn test_reentry_after_seek_back_skips_again() {
        let mut m = monitor(vec![SkipSegment::new(5000, 6000, "sponsor")]);
        assert_eq!(seeks(&mut m, &[4900, 5000, 6000]), vec![6000]);
        // user seeks back to 4900
        assert_eq!(seeks(&mut m, &[4900, 5000, 5100]), vec![6000]);
    }

    #[test]
    fn test_rearm_inside_range() {
        let mut m = monitor(vec![SkipSegment::new(5000, 6000, "sponsor")]);
        assert_eq!(seeks(&mut m, &[5000]), vec![6000]);
        m.rearm();
        assert_eq!(seeks(&mut m, &[5500]), vec![6000]);
    }

    #[test]
    fn test_category_filter() {
        let set = SegmentSet::new(vec![
            SkipSegment::new(0, 1000, "intro"),
            SkipSegment::new(2000, 3000, "sponsor"),
        ]);
        let mut m = SegmentSkipMonitor::new(set.clone(), &["sponsor".to_string()]).unwrap();
        assert_eq!(m.check(500), SkipAction::Continue);
        assert_eq!(m.segments().len(), 1);

        assert!(SegmentSkipMonitor::new(set, &["outro".to_string()]).is_none());
        assert!(SegmentSkipMonitor::new(SegmentSet::default(), &["sponsor".to_string()]).is_none());
    }

    #[test]
    fn test_exhausted_after_last_segment() {
        let mut m = monitor(vec![
            SkipSegment::new(1000, 2000, "sponsor"),
            SkipSegment::new(8000, 9000, "sponsor"),
        ]);
        assert_eq!(m.check(5000), SkipAction::Continue);
        assert!(m.has_segments_after(5000));
        assert_eq!(m.check(9000), SkipAction::Exhausted);
        assert!(!m.has_segments_after(9500));
    }

    #[test]
    fn test_overlapping_ranges_jump_to_furthest_end() {
        let mut m = monitor(vec![
            SkipSegment::new(1000, 3000, "sponsor"),
            SkipSegment::new(2000, 5000, "sponsor"),
        ]);
        assert_eq!(seeks(&mut m, &[2500]), vec![5000]);
    }
}
