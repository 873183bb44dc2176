//! Viewport, minimap, and scrollbar coordinate math.
//!
//! Everything here is pure: the renderer feeds in viewport size, item height,
//! and total line count, and reads back which lines to request and where the
//! minimap thumb sits. No rendering surface is involved, so every mapping is
//! unit-testable on its own.
//!
//! Scroll offsets are kept in *track* pixels: the rendered track height is
//! capped at [`TRACK_CAP_PX`], and beyond the cap the logical↔track mapping
//! is proportional rather than 1:1. The minimap ratios divide by track-space
//! quantities, so the proportional compression must hold or the thumb and the
//! content desync at large line counts.

use std::time::{Duration, Instant};

/// Rendered track height cap; beyond this the logical↔track mapping
/// compresses proportionally
pub const TRACK_CAP_PX: f64 = 1_000_000.0;

/// Minimum scrollbar thumb height
const MIN_NAV_HEIGHT: f64 = 20.0;

/// The minimap renders at 1/8 scale of the main view
const MAP_SCALE: f64 = 8.0;

/// Map a logical scroll offset into track space.
///
/// Both arguments are scroll *ranges* (content height minus one viewport of
/// lines). When the content fits under the track cap the ranges are equal and
/// the mapping is the identity; beyond the cap it is proportional, so track
/// max lands exactly on logical max.
pub fn logical_to_track(logical: f64, logical_range: f64, track_range: f64) -> f64 {
    if logical_range <= 0.0 {
        0.0
    } else {
        logical * (track_range / logical_range)
    }
}

/// Inverse of [`logical_to_track`].
pub fn track_to_logical(track: f64, logical_range: f64, track_range: f64) -> f64 {
    if track_range <= 0.0 {
        0.0
    } else {
        track * (logical_range / track_range)
    }
}

/// Viewport size in pixels
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Viewport {
    pub width: f64,
    pub height: f64,
}

/// Derived geometry for one (viewport, item height, total count) triple.
///
/// Construction fails on a zero-sized viewport: the renderer treats that as
/// "not yet ready" and defers all geometry math.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Geometry {
    viewport: Viewport,
    item_height: f64,
    total_count: usize,
}

impl Geometry {
    pub fn new(viewport: Viewport, item_height: f64, total_count: usize) -> Option<Self> {
        if viewport.width <= 0.0 || viewport.height <= 0.0 || item_height <= 0.0 {
            return None;
        }
        Some(Self {
            viewport,
            item_height,
            total_count,
        })
    }

    pub fn viewport(&self) -> Viewport {
        self.viewport
    }

    pub fn item_height(&self) -> f64 {
        self.item_height
    }

    pub fn total_count(&self) -> usize {
        self.total_count
    }

    /// Lines that fit the viewport; the slice length requested per render
    pub fn item_number(&self) -> usize {
        (self.viewport.height / self.item_height).ceil() as usize
    }

    /// Uncompressed content height
    pub fn logical_total(&self) -> f64 {
        self.total_count as f64 * self.item_height
    }

    /// Rendered track height, capped
    pub fn track_total(&self) -> f64 {
        self.logical_total().min(TRACK_CAP_PX)
    }

    /// Largest valid scroll offset, in track pixels
    pub fn max_scroll(&self) -> f64 {
        (self.track_total() - self.item_height * self.item_number() as f64).max(0.0)
    }

    /// Largest valid scroll offset, in logical pixels
    fn max_logical_scroll(&self) -> f64 {
        (self.logical_total() - self.item_height * self.item_number() as f64).max(0.0)
    }

    /// Minimap height: content at 1/8 scale, at most the viewport height
    pub fn map_height(&self) -> f64 {
        (self.logical_total() / MAP_SCALE).min(self.viewport.height)
    }

    /// Scrollbar thumb height, proportional to the visible fraction and
    /// clamped to `[20, viewport height]`
    pub fn nav_height(&self) -> f64 {
        let track = self.track_total();
        if track <= 0.0 {
            return self.viewport.height;
        }
        let proportional = self.viewport.height * (self.viewport.height / track);
        proportional.clamp(
            MIN_NAV_HEIGHT.min(self.viewport.height),
            self.viewport.height,
        )
    }

    /// Travel range of the minimap thumb
    pub fn thumb_travel(&self) -> f64 {
        (self.map_height() - self.viewport.height / MAP_SCALE).max(0.0)
    }

    /// Minimap pixels per track pixel; the double conversion exists because
    /// the thumb travel range is smaller than the scroll range and must move
    /// proportionally, not 1:1
    fn map_ratio(&self) -> f64 {
        let max = self.max_scroll();
        if max <= 0.0 { 0.0 } else { self.thumb_travel() / max }
    }

    /// Minimap thumb top for a scroll offset
    pub fn map_top(&self, offset: f64) -> f64 {
        (offset * self.map_ratio()).clamp(0.0, self.thumb_travel())
    }

    /// Scrollbar thumb top for a scroll offset
    pub fn nav_top(&self, offset: f64) -> f64 {
        let max = self.max_scroll();
        if max <= 0.0 {
            return 0.0;
        }
        let travel = (self.viewport.height - self.nav_height()).max(0.0);
        (offset / max * travel).clamp(0.0, travel)
    }

    /// Convert a wheel delta into a new scroll offset: the delta goes through
    /// minimap space, gets clamped to the thumb travel range, and comes back.
    pub fn apply_wheel(&self, offset: f64, delta_px: f64) -> f64 {
        let ratio = self.map_ratio();
        if ratio <= 0.0 {
            return 0.0;
        }
        let map_top = ((offset + delta_px) * ratio).clamp(0.0, self.thumb_travel());
        map_top / ratio
    }

    /// Scroll offset for an absolute minimap thumb position (drag)
    pub fn offset_for_map_top(&self, map_top: f64) -> f64 {
        let ratio = self.map_ratio();
        if ratio <= 0.0 {
            return 0.0;
        }
        map_top.clamp(0.0, self.thumb_travel()) / ratio
    }

    /// Scroll offset for an absolute scrollbar thumb position (drag)
    pub fn offset_for_nav_top(&self, nav_top: f64) -> f64 {
        let travel = (self.viewport.height - self.nav_height()).max(0.0);
        if travel <= 0.0 {
            return 0.0;
        }
        nav_top.clamp(0.0, travel) / travel * self.max_scroll()
    }

    /// First line whose pixel range intersects the viewport at `offset`
    pub fn first_visible(&self, offset: f64) -> usize {
        let logical = track_to_logical(
            offset.max(0.0),
            self.max_logical_scroll(),
            self.max_scroll(),
        );
        ((logical / self.item_height).floor() as usize)
            .min(self.total_count.saturating_sub(1))
    }

    /// Scroll offset that puts `line` at the top of the viewport, clamped
    pub fn offset_for_line(&self, line: usize) -> f64 {
        let logical = (line as f64 * self.item_height).min(self.max_logical_scroll());
        logical_to_track(logical, self.max_logical_scroll(), self.max_scroll())
            .min(self.max_scroll())
    }

    /// Minimap sampling window: `(start_line, row_count)`. One texel row per
    /// source line at 1/8 scale, positioned so the thumb overlays the lines
    /// it represents.
    pub fn minimap_window(&self, offset: f64) -> (usize, usize) {
        let row_px = self.item_height / MAP_SCALE;
        let count = (self.map_height() / row_px).ceil() as usize;
        let above = (self.map_top(offset) / row_px).round() as usize;
        let start = self.first_visible(offset).saturating_sub(above);
        let start = start.min(self.total_count.saturating_sub(count.min(self.total_count)));
        (start, count.min(self.total_count))
    }

    /// Rescale a scroll offset so the visual position survives a geometry
    /// change (resize or data append).
    pub fn rescale_offset(&self, old: &Geometry, offset: f64) -> f64 {
        let old_max = old.max_scroll();
        if old_max <= 0.0 {
            return 0.0;
        }
        (offset / old_max * self.max_scroll()).clamp(0.0, self.max_scroll())
    }
}

/// Limits continuous-drag store queries to roughly ten per second, with a
/// trailing final query after the drag stops.
#[derive(Debug)]
pub struct DragThrottle {
    min_interval: Duration,
    last_sent: Option<Instant>,
    pending: Option<f64>,
}

impl Default for DragThrottle {
    fn default() -> Self {
        Self::new(Duration::from_millis(100))
    }
}

impl DragThrottle {
    pub fn new(min_interval: Duration) -> Self {
        Self {
            min_interval,
            last_sent: None,
            pending: None,
        }
    }

    /// Offer an offset during a drag. Returns the offset when a query should
    /// fire now; otherwise it is held as the pending trailing value.
    pub fn offer(&mut self, now: Instant, offset: f64) -> Option<f64> {
        let due = match self.last_sent {
            Some(last) => now.duration_since(last) >= self.min_interval,
            None => true,
        };
        if due {
            self.last_sent = Some(now);
            self.pending = None;
            Some(offset)
        } else {
            self.pending = Some(offset);
            None
        }
    }

    /// The trailing query after the drag stops, if any offer was suppressed.
    pub fn finish(&mut self) -> Option<f64> {
        self.last_sent = None;
        self.pending.take()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn geometry(height: f64, total: usize) -> Geometry {
        Geometry::new(
            Viewport {
                width: 640.0,
                height,
            },
            16.0,
            total,
        )
        .unwrap()
    }

    #[test]
    fn test_zero_viewport_is_not_ready() {
        let vp = Viewport {
            width: 0.0,
            height: 480.0,
        };
        assert!(Geometry::new(vp, 16.0, 100).is_none());
        let vp = Viewport {
            width: 640.0,
            height: 0.0,
        };
        assert!(Geometry::new(vp, 16.0, 100).is_none());
    }

    #[test]
    fn test_slice_length_is_independent_of_total_count() {
        // ceil(48 / 16) = 3 lines, whether the log has 10 or a million lines.
        assert_eq!(geometry(48.0, 10).item_number(), 3);
        assert_eq!(geometry(48.0, 1_000_000).item_number(), 3);
        assert_eq!(geometry(50.0, 1_000_000).item_number(), 4);
    }

    #[test]
    fn test_track_mapping_is_identity_under_cap() {
        // Equal ranges: the content fits under the cap.
        assert_eq!(logical_to_track(1234.0, 500_000.0, 500_000.0), 1234.0);
        assert_eq!(track_to_logical(1234.0, 500_000.0, 500_000.0), 1234.0);
    }

    #[test]
    fn test_track_mapping_compresses_beyond_cap() {
        // A 10M logical range compresses onto a 1M track range.
        let track = logical_to_track(5_000_000.0, 10_000_000.0, 1_000_000.0);
        assert!((track - 500_000.0).abs() < 1e-6);
        let back = track_to_logical(track, 10_000_000.0, 1_000_000.0);
        assert!((back - 5_000_000.0).abs() < 1e-3);
    }

    #[test]
    fn test_track_round_trip_far_beyond_cap() {
        let logical_range = 3_200_000_000.0;
        let track_range = 1_000_000.0;
        for logical in [0.0, 16.0, 1_599_999_984.0, 3_199_999_984.0] {
            let track = logical_to_track(logical, logical_range, track_range);
            let back = track_to_logical(track, logical_range, track_range);
            let err = (back - logical).abs() / logical_range;
            assert!(err < 1e-9, "round trip drifted: {logical} -> {back}");
        }
        // The range ends map onto each other exactly.
        let end = logical_to_track(logical_range, logical_range, track_range);
        assert!((end - track_range).abs() < 1e-6);
    }

    #[test]
    fn test_wheel_clamps_at_both_ends() {
        let g = geometry(480.0, 10_000);
        assert_eq!(g.apply_wheel(0.0, -500.0), 0.0);
        let max = g.max_scroll();
        let at_max = g.apply_wheel(max, 5_000.0);
        assert!((at_max - max).abs() < 1e-6);
    }

    #[test]
    fn test_wheel_moves_proportionally_through_map_space() {
        let g = geometry(480.0, 10_000);
        let next = g.apply_wheel(0.0, 160.0);
        // The clamp happens in minimap space, but an in-range delta must come
        // back out unchanged.
        assert!((next - 160.0).abs() < 1e-6);
    }

    #[test]
    fn test_nav_height_clamps() {
        // Tiny content: thumb fills the viewport.
        assert_eq!(geometry(480.0, 10).nav_height(), 480.0);
        // Huge content: thumb hits the 20px floor.
        assert_eq!(geometry(480.0, 1_000_000).nav_height(), 20.0);
        // In between: proportional.
        let g = geometry(480.0, 60);
        let expected = 480.0 * (480.0 / 960.0);
        assert!((g.nav_height() - expected).abs() < 1e-6);
    }

    #[test]
    fn test_map_height_capped_by_viewport() {
        assert!(geometry(480.0, 1_000_000).map_height() <= 480.0);
        // 100 lines * 16px / 8 = 200px of minimap content.
        assert_eq!(geometry(480.0, 100).map_height(), 200.0);
    }

    #[test]
    fn test_thumb_positions_track_scroll_fraction() {
        let g = geometry(480.0, 100_000);
        assert_eq!(g.map_top(0.0), 0.0);
        assert_eq!(g.nav_top(0.0), 0.0);
        let max = g.max_scroll();
        assert!((g.map_top(max) - g.thumb_travel()).abs() < 1e-6);
        assert!((g.nav_top(max) - (480.0 - g.nav_height())).abs() < 1e-6);

        let half = g.map_top(max / 2.0);
        assert!((half - g.thumb_travel() / 2.0).abs() < 1e-6);
    }

    #[test]
    fn test_drag_round_trips_through_map_space() {
        let g = geometry(480.0, 100_000);
        let offset = g.max_scroll() * 0.37;
        let back = g.offset_for_map_top(g.map_top(offset));
        assert!((back - offset).abs() < 1e-6);

        let back = g.offset_for_nav_top(g.nav_top(offset));
        assert!((back - offset).abs() < 1e-6);
    }

    #[test]
    fn test_first_visible_under_and_beyond_cap() {
        let g = geometry(480.0, 1_000);
        assert_eq!(g.first_visible(0.0), 0);
        assert_eq!(g.first_visible(160.0), 10);

        // 10M lines * 16px is far beyond the cap; the last offsets must land
        // on the last lines, not half way.
        let g = geometry(480.0, 10_000_000);
        let last = g.first_visible(g.max_scroll());
        assert!(last >= 10_000_000 - g.item_number() - 1);
    }

    #[test]
    fn test_offset_for_line_round_trips() {
        let g = geometry(480.0, 10_000_000);
        for line in [0usize, 523_443, 9_999_000] {
            let offset = g.offset_for_line(line);
            let seen = g.first_visible(offset);
            assert!(
                seen.abs_diff(line) <= 1,
                "line {line} mapped to offset {offset} showing {seen}"
            );
        }
    }

    #[test]
    fn test_rescale_preserves_relative_position() {
        let old = geometry(480.0, 100_000);
        let offset = old.max_scroll() * 0.5;
        let new = geometry(240.0, 100_000);
        let rescaled = new.rescale_offset(&old, offset);
        assert!((rescaled / new.max_scroll() - 0.5).abs() < 1e-9);
    }

    #[test]
    fn test_minimap_window_stays_in_bounds() {
        let g = geometry(480.0, 100_000);
        let (start, count) = g.minimap_window(0.0);
        assert_eq!(start, 0);
        // 480px of minimap at 2px per row.
        assert_eq!(count, 240);

        let (start, count) = g.minimap_window(g.max_scroll());
        assert!(start + count <= 100_000);
        assert!(start + count >= 100_000 - 1);
    }

    #[test]
    fn test_minimap_window_small_log_shows_everything() {
        let g = geometry(480.0, 50);
        let (start, count) = g.minimap_window(0.0);
        assert_eq!((start, count), (0, 50));
    }

    #[test]
    fn test_drag_throttle_limits_rate_with_trailing() {
        let mut throttle = DragThrottle::new(Duration::from_millis(100));
        let t0 = Instant::now();

        assert_eq!(throttle.offer(t0, 1.0), Some(1.0));
        // Within the interval: suppressed, held as pending.
        assert_eq!(throttle.offer(t0 + Duration::from_millis(10), 2.0), None);
        assert_eq!(throttle.offer(t0 + Duration::from_millis(50), 3.0), None);
        // Interval elapsed: fires with the fresh value, pending cleared.
        assert_eq!(
            throttle.offer(t0 + Duration::from_millis(120), 4.0),
            Some(4.0)
        );
        assert_eq!(throttle.finish(), None);

        assert_eq!(throttle.offer(t0 + Duration::from_millis(130), 5.0), Some(5.0));
        assert_eq!(throttle.offer(t0 + Duration::from_millis(140), 6.0), None);
        // Trailing final request after the drag stops.
        assert_eq!(throttle.finish(), Some(6.0));
    }
}
