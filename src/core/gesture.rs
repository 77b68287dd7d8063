//! Gesture classification
//!
//! Turns raw pointer and pinch input into [`GestureEvent`]s. The classifier is a
//! plain state machine: every input carries its own timestamp and the pending
//! single tap only fires from [`GestureClassifier::poll`], so tests drive time
//! explicitly.

use crate::types::{GestureEvent, SwipeSide, TapZone};
use tracing::debug;

/// Window for the second tap of a double tap, and the single-tap delay
pub const DOUBLE_TAP_WINDOW_MS: u64 = 400;
/// Vertical travel before a move counts as a swipe
pub const MOVEMENT_THRESHOLD_PX: f32 = 30.0;
/// Edge strip reserved for system gestures
pub const BORDER_THRESHOLD_PX: f32 = 90.0;

const PINCH_MINIMIZE_BELOW: f32 = 0.8;
const PINCH_ZOOM_ABOVE: f32 = 1.2;

/// Raw single-pointer input
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum PointerEvent {
    Down { x: f32, y: f32, at_ms: u64 },
    Move { x: f32, y: f32, at_ms: u64 },
    Up { x: f32, y: f32, at_ms: u64 },
    Cancel,
}

impl PointerEvent {
    /// The same event stamped at `at_ms`
    pub fn stamped(self, at_ms: u64) -> Self {
        match self {
            PointerEvent::Down { x, y, .. } => PointerEvent::Down { x, y, at_ms },
            PointerEvent::Move { x, y, .. } => PointerEvent::Move { x, y, at_ms },
            PointerEvent::Up { x, y, .. } => PointerEvent::Up { x, y, at_ms },
            PointerEvent::Cancel => PointerEvent::Cancel,
        }
    }
}

/// Two-pointer scale input
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum PinchEvent {
    Begin,
    /// Scale factor relative to the previous `Scale` event
    Scale(f32),
    End,
}

/// Raw input as a host delivers it, before classification
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum GestureInput {
    Pointer(PointerEvent),
    Pinch(PinchEvent),
    Viewport { width: f32, height: f32 },
    Enabled(bool),
}

#[derive(Debug, Clone, Copy)]
struct PendingTap {
    at_ms: u64,
    zone: TapZone,
}

#[derive(Debug, Clone, Copy)]
struct Touch {
    start_x: f32,
    start_y: f32,
    last_y: f32,
    swiping: bool,
}

#[derive(Debug)]
struct MalformedInput(&'static str);

pub struct GestureClassifier {
    width: f32,
    height: f32,
    enabled: bool,
    pending_tap: Option<PendingTap>,
    last_double_tap_ms: Option<u64>,
    touch: Option<Touch>,
    pinch_factor: Option<f32>,
}

impl GestureClassifier {
    pub fn new(width: f32, height: f32) -> Self {
        Self {
            width,
            height,
            enabled: true,
            pending_tap: None,
            last_double_tap_ms: None,
            touch: None,
            pinch_factor: None,
        }
    }

    pub fn set_viewport(&mut self, width: f32, height: f32) {
        self.width = width;
        self.height = height;
    }

    /// While disabled, input is still consumed but nothing is emitted
    pub fn set_enabled(&mut self, enabled: bool) {
        self.enabled = enabled;
        if !enabled {
            self.pending_tap = None;
            self.touch = None;
            self.pinch_factor = None;
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    pub fn is_pinching(&self) -> bool {
        self.pinch_factor.is_some()
    }

    /// Feed one pointer event. Malformed input yields nothing.
    pub fn on_pointer(&mut self, event: PointerEvent) -> Vec<GestureEvent> {
        if !self.enabled {
            return Vec::new();
        }
        match self.classify_pointer(event) {
            Ok(events) => events,
            Err(MalformedInput(reason)) => {
                debug!(reason, "dropping malformed pointer event");
                self.touch = None;
                Vec::new()
            }
        }
    }

    pub fn on_pinch(&mut self, event: PinchEvent) -> Option<GestureEvent> {
        if !self.enabled {
            return None;
        }
        match event {
            PinchEvent::Begin => {
                self.pinch_factor = Some(1.0);
                self.pending_tap = None;
                None
            }
            PinchEvent::Scale(factor) => {
                if factor.is_finite() && factor > 0.0 {
                    if let Some(acc) = self.pinch_factor.as_mut() {
                        *acc *= factor;
                    }
                }
                None
            }
            PinchEvent::End => match self.pinch_factor.take() {
                Some(f) if f < PINCH_MINIMIZE_BELOW => Some(GestureEvent::PinchMinimize),
                Some(f) if f > PINCH_ZOOM_ABOVE => Some(GestureEvent::PinchZoom),
                _ => None,
            },
        }
    }

    /// Fire the pending single tap once its window has elapsed
    pub fn poll(&mut self, now_ms: u64) -> Option<GestureEvent> {
        if !self.enabled {
            return None;
        }
        let pending = self.pending_tap?;
        if now_ms.saturating_sub(pending.at_ms) < DOUBLE_TAP_WINDOW_MS {
            return None;
        }
        self.pending_tap = None;
        if self.touch.is_some_and(|t| t.swiping) {
            return None;
        }
        Some(GestureEvent::SingleTap)
    }

    /// When the next `poll` could produce something
    pub fn next_deadline(&self) -> Option<u64> {
        self.pending_tap.map(|p| p.at_ms + DOUBLE_TAP_WINDOW_MS)
    }

    fn classify_pointer(&mut self, event: PointerEvent) -> Result<Vec<GestureEvent>, MalformedInput> {
        if !(self.width > 0.0 && self.height > 0.0) {
            return Err(MalformedInput("viewport has no area"));
        }

        match event {
            PointerEvent::Down { x, y, at_ms } => {
                check_coords(x, y)?;
                Ok(self.on_down(x, y, at_ms))
            }
            PointerEvent::Move { x, y, .. } => {
                check_coords(x, y)?;
                Ok(self.on_move(x, y).into_iter().collect())
            }
            PointerEvent::Up { .. } | PointerEvent::Cancel => {
                let ended_swipe = self.touch.take().is_some_and(|t| t.swiping);
                Ok(if ended_swipe {
                    vec![GestureEvent::SwipeEnd]
                } else {
                    Vec::new()
                })
            }
        }
    }

    fn on_down(&mut self, x: f32, y: f32, at_ms: u64) -> Vec<GestureEvent> {
        if self.is_pinching() || self.touch.is_some_and(|t| t.swiping) {
            return Vec::new();
        }

        self.touch = Some(Touch {
            start_x: x,
            start_y: y,
            last_y: y,
            swiping: false,
        });

        let zone = self.zone_of(x);
        let mut events = Vec::new();

        if let Some(pending) = self.pending_tap.take() {
            let within = at_ms.saturating_sub(pending.at_ms) < DOUBLE_TAP_WINDOW_MS;
            if within && pending.zone == zone {
                self.last_double_tap_ms = Some(at_ms);
                return vec![GestureEvent::DoubleTap(pending.zone)];
            }
            // the earlier tap stands on its own
            events.push(GestureEvent::SingleTap);
        }

        let cooling_down = self
            .last_double_tap_ms
            .is_some_and(|t| at_ms.saturating_sub(t) < DOUBLE_TAP_WINDOW_MS / 2);
        if !cooling_down {
            self.pending_tap = Some(PendingTap { at_ms, zone });
        }
        events
    }

    fn on_move(&mut self, x: f32, y: f32) -> Option<GestureEvent> {
        if self.is_pinching() {
            return None;
        }
        let (width, height) = (self.width, self.height);
        let touch = self.touch.as_mut()?;

        if !touch.swiping {
            let dx = (x - touch.start_x).abs();
            let dy = (y - touch.start_y).abs();
            let near_edge = touch.start_x < BORDER_THRESHOLD_PX
                || touch.start_y < BORDER_THRESHOLD_PX
                || touch.start_x > width - BORDER_THRESHOLD_PX
                || touch.start_y > height - BORDER_THRESHOLD_PX;

            if dy <= MOVEMENT_THRESHOLD_PX || near_edge || dx > dy {
                return None;
            }
            touch.swiping = true;
            self.pending_tap = None;
        }

        let delta_y = touch.last_y - y;
        touch.last_y = y;

        let half = width * 0.5;
        let side = if touch.start_x < half {
            SwipeSide::Left
        } else if touch.start_x > half {
            SwipeSide::Right
        } else {
            return None;
        };
        Some(GestureEvent::SwipeVertical { side, delta_y })
    }

    fn zone_of(&self, x: f32) -> TapZone {
        let ratio = x / self.width;
        if ratio < 0.4 {
            TapZone::Left
        } else if ratio > 0.6 {
            TapZone::Right
        } else {
            TapZone::Center
        }
    }
}

fn check_coords(x: f32, y: f32) -> Result<(), MalformedInput> {
    if x.is_finite() && y.is_finite() {
        Ok(())
    } else {
        Err(MalformedInput("non-finite coordinates"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tap(c: &mut GestureClassifier, x: f32, at_ms: u64) -> Vec<GestureEvent> {
        let mut out = c.on_pointer(PointerEvent::Down { x, y: 500.0, at_ms });
        out.extend(c.on_pointer(PointerEvent::Up { x, y: 500.0, at_ms: at_ms + 50 }));
        out
    }

    #[test]
    fn test_double_tap_left() {
        let mut c = GestureClassifier::new(1000.0, 1000.0);
        assert!(tap(&mut c, 100.0, 0).is_empty());
        assert_eq!(tap(&mut c, 100.0, 300), vec![GestureEvent::DoubleTap(TapZone::Left)]);
        // the pending single tap was cancelled
        assert_eq!(c.poll(1000), None);
    }

    #[test]
    fn test_slow_taps_are_two_single_taps() {
        let mut c = GestureClassifier::new(1000.0, 1000.0);
        let mut events = tap(&mut c, 100.0, 0);
        events.extend(c.poll(400));
        events.extend(tap(&mut c, 100.0, 500));
        events.extend(c.poll(900));
        assert_eq!(events, vec![GestureEvent::SingleTap, GestureEvent::SingleTap]);
    }

    #[test]
    fn test_second_tap_flushes_expired_pending_tap() {
        let mut c = GestureClassifier::new(1000.0, 1000.0);
        tap(&mut c, 100.0, 0);
        assert_eq!(tap(&mut c, 100.0, 500), vec![GestureEvent::SingleTap]);
        assert_eq!(c.poll(899), None);
        assert_eq!(c.poll(900), Some(GestureEvent::SingleTap));
    }

    #[test]
    fn test_zones() {
        for (x, zone) in [(399.0, TapZone::Left), (500.0, TapZone::Center), (601.0, TapZone::Right)] {
            let mut c = GestureClassifier::new(1000.0, 1000.0);
            tap(&mut c, x, 0);
            assert_eq!(tap(&mut c, x, 200), vec![GestureEvent::DoubleTap(zone)]);
        }
    }

    #[test]
    fn test_taps_in_different_zones_are_not_a_double_tap() {
        let mut c = GestureClassifier::new(1000.0, 1000.0);
        tap(&mut c, 100.0, 0);
        assert_eq!(tap(&mut c, 900.0, 200), vec![GestureEvent::SingleTap]);
        assert_eq!(c.poll(600), Some(GestureEvent::SingleTap));
    }

    #[test]
    fn test_cool_down_after_double_tap() {
        let mut c = GestureClassifier::new(1000.0, 1000.0);
        tap(&mut c, 100.0, 0);
        tap(&mut c, 100.0, 100);
        assert!(tap(&mut c, 100.0, 250).is_empty());
        assert_eq!(c.poll(2000), None);
    }

    #[test]
    fn test_vertical_swipe_needs_threshold() {
        let mut c = GestureClassifier::new(1000.0, 1000.0);
        c.on_pointer(PointerEvent::Down { x: 200.0, y: 500.0, at_ms: 0 });
        assert!(c.on_pointer(PointerEvent::Move { x: 200.0, y: 480.0, at_ms: 10 }).is_empty());

        let events = c.on_pointer(PointerEvent::Move { x: 205.0, y: 460.0, at_ms: 20 });
        assert_eq!(
            events,
            vec![GestureEvent::SwipeVertical {
                side: SwipeSide::Left,
                delta_y: 40.0
            }]
        );

        let events = c.on_pointer(PointerEvent::Move { x: 205.0, y: 470.0, at_ms: 30 });
        assert_eq!(
            events,
            vec![GestureEvent::SwipeVertical {
                side: SwipeSide::Left,
                delta_y: -10.0
            }]
        );

        assert_eq!(
            c.on_pointer(PointerEvent::Up { x: 205.0, y: 470.0, at_ms: 40 }),
            vec![GestureEvent::SwipeEnd]
        );
        // swipe swallowed the pending tap
        assert_eq!(c.poll(1000), None);
    }

    #[test]
    fn test_swipe_rejected_near_edge_or_horizontal() {
        let mut c = GestureClassifier::new(1000.0, 1000.0);
        c.on_pointer(PointerEvent::Down { x: 50.0, y: 500.0, at_ms: 0 });
        assert!(c.on_pointer(PointerEvent::Move { x: 50.0, y: 300.0, at_ms: 10 }).is_empty());
        c.on_pointer(PointerEvent::Up { x: 50.0, y: 300.0, at_ms: 20 });

        let mut c = GestureClassifier::new(1000.0, 1000.0);
        c.on_pointer(PointerEvent::Down { x: 700.0, y: 500.0, at_ms: 0 });
        assert!(c.on_pointer(PointerEvent::Move { x: 800.0, y: 450.0, at_ms: 10 }).is_empty());
        let events = c.on_pointer(PointerEvent::Move { x: 700.0, y: 400.0, at_ms: 20 });
        assert!(matches!(
            events.as_slice(),
            [GestureEvent::SwipeVertical { side: SwipeSide::Right, .. }]
        ));
    }

    #[test]
    fn test_tap_during_swipe_is_ignored() {
        let mut c = GestureClassifier::new(1000.0, 1000.0);
        c.on_pointer(PointerEvent::Down { x: 200.0, y: 500.0, at_ms: 0 });
        c.on_pointer(PointerEvent::Move { x: 200.0, y: 400.0, at_ms: 10 });
        assert!(c.on_pointer(PointerEvent::Down { x: 200.0, y: 400.0, at_ms: 50 }).is_empty());
        assert!(c.on_pointer(PointerEvent::Down { x: 200.0, y: 400.0, at_ms: 90 }).is_empty());
        assert_eq!(c.poll(1000), None);
    }

    #[test]
    fn test_pinch() {
        let mut c = GestureClassifier::new(1000.0, 1000.0);
        c.on_pinch(PinchEvent::Begin);
        c.on_pinch(PinchEvent::Scale(0.9));
        c.on_pinch(PinchEvent::Scale(0.85));
        assert_eq!(c.on_pinch(PinchEvent::End), Some(GestureEvent::PinchMinimize));

        c.on_pinch(PinchEvent::Begin);
        c.on_pinch(PinchEvent::Scale(1.1));
        c.on_pinch(PinchEvent::Scale(1.2));
        assert_eq!(c.on_pinch(PinchEvent::End), Some(GestureEvent::PinchZoom));

        c.on_pinch(PinchEvent::Begin);
        c.on_pinch(PinchEvent::Scale(1.1));
        assert_eq!(c.on_pinch(PinchEvent::End), None);
    }

    #[test]
    fn test_disabled_consumes_everything() {
        let mut c = GestureClassifier::new(1000.0, 1000.0);
        c.set_enabled(false);
        assert!(tap(&mut c, 100.0, 0).is_empty());
        assert!(tap(&mut c, 100.0, 100).is_empty());
        assert_eq!(c.poll(1000), None);
        c.on_pinch(PinchEvent::Begin);
        c.on_pinch(PinchEvent::Scale(2.0));
        assert_eq!(c.on_pinch(PinchEvent::End), None);
    }

    #[test]
    fn test_malformed_input_is_swallowed() {
        let mut c = GestureClassifier::new(1000.0, 1000.0);
        assert!(c.on_pointer(PointerEvent::Down { x: f32::NAN, y: 1.0, at_ms: 0 }).is_empty());

        let mut c = GestureClassifier::new(0.0, 0.0);
        assert!(tap(&mut c, 100.0, 0).is_empty());
        assert_eq!(c.poll(1000), None);
    }
}
