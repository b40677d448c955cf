//! Choosing the item to highlight, and hiding it again without flicker.

use crate::canvas::tile_set::{round_px, TileSet};
use crate::interaction::predict::WaypointRing;
use crate::timer::Timer;
use crate::types::{sqr, ItemId};

/// Find the best item to highlight around (`x`, `y`).
///
/// It may not be the item right under the cursor when that data has not
/// arrived yet. Candidates only count if the highlight tile for the cursor's
/// tile coordinate is already at hand. An exhaustive search over a small
/// radius goes first; only while the cursor is moving do the predicted
/// waypoints serve as a fallback. Both share the `max_distance` ceiling.
pub fn resolve(
    tiles: &TileSet,
    x: f64,
    y: f64,
    moving: bool,
    waypoints: &WaypointRing,
    radius: i32,
    max_distance: f64,
) -> Option<ItemId> {
    let coord = tiles.tile_coord(x, y);
    let mut best = None;
    let mut min_dist2 = sqr(max_distance);

    let (ix, iy) = (round_px(x) as i64, round_px(y) as i64);
    let r = radius as i64;
    for xx in ix - r..=ix + r {
        for yy in iy - r..=iy + r {
            let (fx, fy) = (xx as f64, yy as f64);
            let dist2 = sqr(x - fx) + sqr(y - fy);
            if dist2 >= min_dist2 { continue; }
            let Some(item_id) = tiles.get_highlight_id(fx, fy).item() else { continue };
            if tiles.has_tile(&tiles.key(coord, Some(item_id))) {
                best = Some(item_id);
                min_dist2 = dist2;
            }
        }
    }

    if best.is_none() && moving {
        for wp in waypoints.iter() {
            let (Some((wx, wy)), Some(item_id)) = (wp.pos, wp.item_id) else { continue };
            let dist2 = sqr(wx - x) + sqr(wy - y);
            if dist2 >= min_dist2 { continue; }
            if tiles.has_tile(&tiles.key(coord, Some(item_id))) {
                best = Some(item_id);
                min_dist2 = dist2;
            }
        }
    }

    log::trace!("resolve({x}, {y}) -> {best:?}");
    best
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum HideStep {
    /// Turn the highlighted item off.
    ClearHighlight,
    /// Hide the whole foreground layer.
    HideForeground,
}

/// Delays hiding a highlight: the item stays for at least `min_highlight_ms`,
/// then the foreground layer stays for `min_foreground_visible_ms` more, so
/// quickly moving onto another item never shows a blank flash.
pub struct HighlightDebounce {
    /// Last time a highlight was set.
    last_update: Option<f64>,
    timer: Timer,
    pending: Option<HideStep>,
    foreground_visible: bool,
    min_highlight_ms: f64,
    min_foreground_visible_ms: f64,
}

impl HighlightDebounce {
    pub fn new(min_highlight_ms: f64, min_foreground_visible_ms: f64) -> Self {
        Self {
            last_update: None,
            timer: Timer::new(),
            pending: None,
            foreground_visible: false,
            min_highlight_ms,
            min_foreground_visible_ms,
        }
    }

    /// A highlight was set: cancel any pending hide.
    pub fn on_set(&mut self, now: f64) {
        self.last_update = Some(now);
        self.timer.cancel();
        self.pending = None;
        self.foreground_visible = true;
    }

    /// Returns the step if it is due right away; otherwise it is scheduled.
    fn schedule(&mut self, step: HideStep, threshold: f64, now: f64) -> Option<HideStep> {
        let elapsed = self.last_update.map_or(f64::INFINITY, |t| now - t);
        if elapsed >= threshold {
            self.timer.cancel();
            self.pending = None;
            return Some(step);
        }
        log::trace!("{step:?} will fire in {} ms", threshold - elapsed);
        self.timer.arm(now, threshold - elapsed);
        self.pending = Some(step);
        None
    }

    pub fn request_clear(&mut self, now: f64) -> Option<HideStep> {
        self.schedule(HideStep::ClearHighlight, self.min_highlight_ms, now)
    }

    /// The highlight was just cleared: schedule hiding the foreground.
    pub fn highlight_cleared(&mut self, now: f64) -> Option<HideStep> {
        self.schedule(HideStep::HideForeground, self.min_foreground_visible_ms, now)
    }

    pub fn hide_foreground(&mut self) {
        self.foreground_visible = false;
    }

    pub fn poll(&mut self, now: f64) -> Option<HideStep> {
        if !self.timer.fire(now) { return None; }
        self.pending.take()
    }

    pub fn deadline(&self) -> Option<f64> {
        self.timer.deadline()
    }

    pub fn foreground_visible(&self) -> bool {
        self.foreground_visible
    }

    pub fn pending(&self) -> Option<HideStep> {
        self.pending
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::canvas::tile_set::tests::{base_tile, canvas, hl_tile, small_config};
    use crate::types::{TileCoord, Waypoint};

    fn tiles_with(item_at_col1: Option<ItemId>) -> TileSet {
        let mut set = TileSet::new(&small_config());
        set.add_config(canvas(1, 8, 8));
        set.add_tile(base_tile(&set, 0, 0, 0, None));
        set.add_tile(base_tile(&set, 0, 1, 0, item_at_col1));
        set
    }

    #[test]
    fn test_exhaustive_search_needs_highlight_tile() {
        let mut set = tiles_with(Some(4));
        let ring = WaypointRing::new(4);
        // Cursor in tile (0,0), item 4 is 2px to the right.
        assert_eq!(resolve(&set, 2.0, 1.0, false, &ring, 5, 30.0), None, "no highlight tile yet");
        set.add_tile(hl_tile(&set, 0, 0, 4));
        assert_eq!(resolve(&set, 2.0, 1.0, false, &ring, 5, 30.0), Some(4));
        assert_eq!(resolve(&set, 2.0, 1.0, false, &ring, 1, 30.0), None, "outside the radius");
    }

    #[test]
    fn test_waypoint_fallback_only_while_moving() {
        let mut set = tiles_with(None);
        set.add_tile(hl_tile(&set, 0, 0, 9));
        let mut ring = WaypointRing::new(4);
        ring.extend(&[Waypoint::at(3.0, 3.0, Some(9)), Waypoint::at(1.0, 1.0, None)]);
        assert_eq!(resolve(&set, 1.0, 1.0, true, &ring, 5, 30.0), Some(9));
        assert_eq!(resolve(&set, 1.0, 1.0, false, &ring, 5, 30.0), None);
        assert_eq!(resolve(&set, 1.0, 1.0, true, &ring, 5, 2.0), None, "beyond max distance");
        assert!(set.has_tile(&set.key(TileCoord::new(0, 0), Some(9))));
    }

    #[test]
    fn test_debounce_phases() {
        let mut d = HighlightDebounce::new(100.0, 500.0);
        assert_eq!(d.request_clear(0.0), Some(HideStep::ClearHighlight), "never set: clear immediately");

        d.on_set(0.0);
        assert!(d.foreground_visible());
        assert_eq!(d.request_clear(50.0), None);
        assert_eq!(d.deadline(), Some(100.0));
        assert_eq!(d.poll(99.0), None);
        assert_eq!(d.poll(100.0), Some(HideStep::ClearHighlight));
        assert_eq!(d.highlight_cleared(100.0), None);
        assert_eq!(d.deadline(), Some(500.0));
        assert_eq!(d.poll(500.0), Some(HideStep::HideForeground));
    }

    #[test]
    fn test_new_highlight_cancels_pending_hide() {
        let mut d = HighlightDebounce::new(100.0, 500.0);
        d.on_set(0.0);
        d.request_clear(10.0);
        d.on_set(20.0);
        assert_eq!(d.pending(), None);
        assert_eq!(d.poll(1000.0), None);
    }
}
