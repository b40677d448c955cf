//! Keeps track of the tiles currently being shown in the canvas.
//!
//! Every tile identity lives in at most one of two places: the visible set
//! (eligible for display under the current config, zoom, offsets and
//! highlight) or the LRU cache of tiles that scrolled away or belong to
//! another item. Moving a tile offscreen never drops it, so panning back does
//! not re-fetch.

use std::collections::HashMap;
use serde::Serialize;
use crate::canvas::tile::{Tile, TileKey};
use crate::canvas::tile_cache::LruCache;
use crate::config::EngineConfig;
use crate::net::message::{CanvasConfig, ConfigHow, ConfigRequest, ZoomRect};
use crate::types::{HighlightLookup, HighlightTrigger, ItemId, TileCoord};

/// JS-style rounding (halves go up), matching the backend's pixel grid.
pub fn round_px(v: f64) -> f64 {
    (v + 0.5).floor()
}

/// The last requested canvas config. Data bounds are filled in only when the
/// backend answers with `canvas_config`.
#[derive(Clone, Copy, Debug, Default)]
struct ConfigReqState {
    config_id: u64,
    w: Option<u32>,
    h: Option<u32>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Layer {
    Base,
    Highlight,
}

/// A visible tile and where to paint it.
#[derive(Clone, Copy, Debug, PartialEq, Serialize)]
pub struct PlacedTile {
    pub key: TileKey,
    pub left: f64,
    pub top: f64,
    pub layer: Layer,
}

pub struct TileSet {
    tile_size: u32,
    config: Option<CanvasConfig>,
    zoom_level: i32,
    // Panning offset in screen pixels: (10, 3) shifts every tile 10 px right
    // and 3 px down.
    x_offset: f64,
    y_offset: f64,
    last_config_req: ConfigReqState,
    /// Current selection-map version: always even, bumped by 2 per change.
    sm_version: u32,
    highlight_item: Option<ItemId>,
    /// `None` whenever highlighting is off.
    highlight_trigger: Option<HighlightTrigger>,
    visible: HashMap<TileKey, Tile>,
    cache: LruCache<TileKey, Tile>,
    dirty: bool,
}

impl TileSet {
    pub fn new(config: &EngineConfig) -> Self {
        Self {
            tile_size: config.tile_size,
            config: None,
            zoom_level: 0,
            x_offset: 0.0,
            y_offset: 0.0,
            last_config_req: ConfigReqState::default(),
            sm_version: 0,
            highlight_item: None,
            highlight_trigger: None,
            visible: HashMap::new(),
            cache: LruCache::new(config.tile_cache_capacity, |old: &Tile, new: &Tile| {
                old.sm_version < new.sm_version
            }),
            dirty: false,
        }
    }

    // ── Canvas config ────────────────────────────────────────────────────────

    fn next_config_req(&mut self, w: u32, h: u32) -> u64 {
        let config_id = self.last_config_req.config_id + 1;
        self.last_config_req = ConfigReqState { config_id, w: Some(w), h: Some(h) };
        config_id
    }

    /// Ask the backend for a fresh config covering the whole data range.
    pub fn reset_canvas(&mut self, w: u32, h: u32) -> ConfigRequest {
        let config_id = self.next_config_req(w, h);
        log::info!("Reset canvas config_id={config_id} w={w} h={h}");
        ConfigRequest { config_id, w, h, how: ConfigHow::Reset, old_config: None, zoom: None }
    }

    /// `None` if the size did not change since the last request.
    pub fn resize_canvas(&mut self, w: u32, h: u32) -> Option<ConfigRequest> {
        if self.last_config_req.w == Some(w) && self.last_config_req.h == Some(h) {
            return None;
        }
        let old_config = self.current_config();
        let config_id = self.next_config_req(w, h);
        log::info!("Resize canvas config_id={config_id} w={w} h={h}");
        Some(match old_config {
            Some(old) => ConfigRequest {
                config_id, w, h, how: ConfigHow::Resize, old_config: Some(old), zoom: None,
            },
            None => {
                log::info!("No valid config yet, asking for reset ...");
                ConfigRequest { config_id, w, h, how: ConfigHow::Reset, old_config: None, zoom: None }
            }
        })
    }

    /// Zoom into `rect` (data-relative pixels). `None` without a valid config.
    pub fn zoom_canvas(&mut self, w: u32, h: u32, rect: ZoomRect) -> Option<ConfigRequest> {
        let Some(old) = self.current_config() else {
            log::warn!("Cannot zoom: no valid config yet");
            return None;
        };
        let config_id = self.next_config_req(w, h);
        log::info!("Zoom canvas config_id={config_id} w={w} h={h} rect={rect:?}");
        Some(ConfigRequest {
            config_id, w, h, how: ConfigHow::Zoom, old_config: Some(old), zoom: Some(rect),
        })
    }

    /// Install a `canvas_config` from the backend. Returns false if stale.
    pub fn add_config(&mut self, config: CanvasConfig) -> bool {
        if let Some(cur) = self.config {
            if cur.config_id >= config.config_id {
                log::debug!(
                    "canvas_config has stale config_id {}: we already have {}",
                    config.config_id, cur.config_id
                );
                return false;
            }
        }
        if config.zoom_level != 0 || config.x_offset != 0 || config.y_offset != 0 {
            log::warn!("canvas_config {} carries non-zero zoom/offset, ignoring them", config.config_id);
        }

        self.config = Some(CanvasConfig { zoom_level: 0, x_offset: 0, y_offset: 0, ..config });
        self.zoom_level = 0;
        self.x_offset = 0.0;
        self.y_offset = 0.0;

        // Tiles of older configs can never be shown again.
        let new_id = config.config_id;
        self.visible.retain(|k, _| k.config_id >= new_id);
        self.cache.drain_where(|k, _| k.config_id < new_id);
        self.dirty = true;
        self.refresh();
        true
    }

    pub fn has_valid_config(&self) -> bool {
        self.config.is_some()
    }

    pub fn config_id(&self) -> Option<u64> {
        self.config.map(|c| c.config_id)
    }

    /// Snapshot of what is currently shown, for outgoing requests.
    pub fn current_config(&self) -> Option<CanvasConfig> {
        self.config.map(|c| CanvasConfig {
            zoom_level: self.zoom_level,
            x_offset: round_px(self.x_offset) as i64,
            y_offset: round_px(self.y_offset) as i64,
            ..c
        })
    }

    pub fn size(&self) -> (u32, u32) {
        self.config.map_or((0, 0), |c| (c.w, c.h))
    }

    pub fn offsets(&self) -> (f64, f64) {
        (self.x_offset, self.y_offset)
    }

    pub fn zoom_level(&self) -> i32 {
        self.zoom_level
    }

    pub fn tile_size(&self) -> u32 {
        self.tile_size
    }

    // ── Selection map / highlight state ─────────────────────────────────────

    pub fn sm_version(&self) -> u32 {
        self.sm_version
    }

    /// Bump and return the selection-map version.
    pub fn new_sm_version(&mut self) -> u32 {
        self.sm_version += 2;
        self.sm_version
    }

    pub fn highlight_item(&self) -> Option<ItemId> {
        self.highlight_item
    }

    pub fn highlight_trigger(&self) -> Option<HighlightTrigger> {
        self.highlight_trigger
    }

    // ── Tile bookkeeping ────────────────────────────────────────────────────

    pub fn key(&self, coord: TileCoord, item_id: Option<ItemId>) -> TileKey {
        TileKey {
            config_id: self.config_id().unwrap_or(0),
            zoom_level: self.zoom_level,
            row: coord.row,
            col: coord.col,
            item_id,
        }
    }

    pub fn has_tile(&self, key: &TileKey) -> bool {
        self.visible.contains_key(key) || self.cache.contains(key)
    }

    /// The freshest copy of `key`, visible or cached.
    pub fn get_tile(&self, key: &TileKey) -> Option<&Tile> {
        match (self.visible.get(key), self.cache.get(key)) {
            (Some(v), Some(c)) if c.sm_version > v.sm_version => Some(c),
            (Some(v), _) => Some(v),
            (None, c) => c,
        }
    }

    pub fn is_shown(&self, key: &TileKey) -> bool {
        self.visible.contains_key(key)
    }

    pub fn is_cached(&self, key: &TileKey) -> bool {
        self.cache.contains(key)
    }

    pub fn visible_len(&self) -> usize {
        self.visible.len()
    }

    pub fn cached_len(&self) -> usize {
        self.cache.len()
    }

    /// Whether a tile with `key` belongs on screen right now.
    ///
    /// One tile of slack on each side keeps partially scrolled tiles alive.
    pub fn is_visible(&self, key: &TileKey) -> bool {
        if key.is_highlight() && key.item_id != self.highlight_item {
            return false;
        }
        let Some(config) = self.config else { return false };
        if key.config_id != config.config_id || key.zoom_level != self.zoom_level {
            return false;
        }
        let ts = self.tile_size as f64;
        let top = key.row as f64 * ts + self.y_offset;
        let left = key.col as f64 * ts + self.x_offset;
        top > -ts && top < config.h as f64 && left > -ts && left < config.w as f64
    }

    /// Add a tile received from the backend. Returns true if it is now shown.
    ///
    /// An identity is kept once: when it is on screen, the older copy is
    /// dropped (ties favour the tile already shown).
    pub fn add_tile(&mut self, tile: Tile) -> bool {
        let key = *tile.key();
        if !self.is_visible(&key) {
            self.cache.insert(key, tile);
            return false;
        }
        let mut tile = tile;
        if let Some(cached) = self.cache.pop(&key) {
            if cached.sm_version > tile.sm_version { tile = cached; }
        }
        match self.visible.get(&key) {
            Some(existing) if existing.sm_version >= tile.sm_version => {
                log::trace!("Keeping shown tile [{}]{key}", existing.sm_version);
                false
            }
            _ => {
                self.show(tile);
                true
            }
        }
    }

    fn show(&mut self, tile: Tile) {
        self.visible.insert(*tile.key(), tile);
        self.dirty = true;
    }

    /// Move a visible tile back into the cache.
    fn hide(&mut self, key: &TileKey) {
        if let Some(tile) = self.visible.remove(key) {
            self.cache.insert(*key, tile);
            self.dirty = true;
        }
    }

    /// Move a cached tile onto the screen, unless that identity is already shown.
    fn promote(&mut self, key: &TileKey) {
        if self.visible.contains_key(key) { return; }
        if let Some(tile) = self.cache.pop(key) {
            self.show(tile);
        }
    }

    /// Switch the highlighted item; `None` turns highlighting off.
    pub fn set_highlight(&mut self, item_id: Option<ItemId>, trigger: Option<HighlightTrigger>) {
        self.highlight_item = item_id;
        self.highlight_trigger = item_id.and(trigger);

        let stale: Vec<TileKey> = self.visible.keys()
            .filter(|k| k.is_highlight() && k.item_id != item_id)
            .copied()
            .collect();
        for key in &stale {
            self.hide(key);
        }

        if let Some(id) = item_id {
            for coord in self.all_tile_coords() {
                let key = self.key(coord, Some(id));
                self.promote(&key);
            }
        }
    }

    /// Update panning: reposition, hide what scrolled away, show cached tiles
    /// that scrolled in.
    pub fn pan(&mut self, x_offset: f64, y_offset: f64) {
        self.x_offset = x_offset;
        self.y_offset = y_offset;
        self.dirty = true;

        let gone: Vec<TileKey> = self.visible.keys()
            .filter(|k| !self.is_visible(k))
            .copied()
            .collect();
        for key in &gone {
            self.hide(key);
        }

        for coord in self.all_tile_coords() {
            let base = self.key(coord, None);
            self.promote(&base);
            if let Some(id) = self.highlight_item {
                let hl = self.key(coord, Some(id));
                self.promote(&hl);
            }
        }
    }

    /// Local zoom by `steps` levels, keeping the same config.
    pub fn zoom_by(&mut self, steps: i32, zoom_factor: f64) {
        let scale = zoom_factor.powi(steps);
        self.zoom_level += steps;
        self.x_offset *= scale;
        self.y_offset *= scale;
        self.dirty = true;
        self.refresh();
    }

    /// Re-compute which tiles should be visible after the config changed.
    pub fn refresh(&mut self) {
        let gone: Vec<TileKey> = self.visible.keys()
            .filter(|k| !self.is_visible(k))
            .copied()
            .collect();
        for key in &gone {
            self.hide(key);
        }

        let back: Vec<TileKey> = self.cache.keys()
            .filter(|k| self.is_visible(k))
            .copied()
            .collect();
        for key in &back {
            self.promote(key);
        }
    }

    // ── Coordinates ─────────────────────────────────────────────────────────

    /// Tile coordinate covering screen point (`x`, `y`).
    pub fn tile_coord(&self, x: f64, y: f64) -> TileCoord {
        let ts = self.tile_size as i64;
        let px = round_px(x - self.x_offset) as i64;
        let py = round_px(y - self.y_offset) as i64;
        TileCoord::new(py.div_euclid(ts) as i32, px.div_euclid(ts) as i32)
    }

    /// Every tile coordinate intersecting the canvas, row-major.
    pub fn all_tile_coords(&self) -> Vec<TileCoord> {
        let Some(config) = self.config else {
            log::debug!("all_tile_coords called before the canvas size is known");
            return Vec::new();
        };
        let ts = self.tile_size as f64;
        let r0 = (-self.y_offset / ts).floor() as i32;
        let c0 = (-self.x_offset / ts).floor() as i32;
        let r1 = ((config.h as f64 - self.y_offset) / ts).ceil() as i32 - 1;
        let c1 = ((config.w as f64 - self.x_offset) / ts).ceil() as i32 - 1;

        let mut coords = Vec::new();
        for row in r0..=r1 {
            for col in c0..=c1 {
                coords.push(TileCoord::new(row, col));
            }
        }
        coords
    }

    /// Item under screen point (`x`, `y`) according to the hit-test data.
    pub fn get_highlight_id(&self, x: f64, y: f64) -> HighlightLookup {
        if self.config.is_none() {
            return HighlightLookup::Unknown;
        }
        let ts = self.tile_size as i64;
        let px = round_px(x - self.x_offset) as i64;
        let py = round_px(y - self.y_offset) as i64;
        let coord = TileCoord::new(py.div_euclid(ts) as i32, px.div_euclid(ts) as i32);
        let key = self.key(coord, None);

        let Some(hitmap) = self.get_tile(&key).and_then(|t| t.hitmap.as_ref()) else {
            return HighlightLookup::Unknown;
        };
        match hitmap.item_at(px.rem_euclid(ts) as u32, py.rem_euclid(ts) as u32) {
            Some(id) => HighlightLookup::Item(id),
            None => HighlightLookup::NoItem,
        }
    }

    // ── Painting ────────────────────────────────────────────────────────────

    /// Visible tiles with their screen positions, base layer first.
    pub fn placed_tiles(&self) -> Vec<PlacedTile> {
        let ts = self.tile_size as f64;
        let mut placed: Vec<PlacedTile> = self.visible.keys()
            .map(|k| PlacedTile {
                key: *k,
                left: k.col as f64 * ts + self.x_offset,
                top: k.row as f64 * ts + self.y_offset,
                layer: if k.is_highlight() { Layer::Highlight } else { Layer::Base },
            })
            .collect();
        placed.sort_by_key(|p| (p.layer == Layer::Highlight, p.key.row, p.key.col));
        placed
    }

    pub fn visible_tile(&self, key: &TileKey) -> Option<&Tile> {
        self.visible.get(key)
    }

    /// True once if anything visible changed since the last call.
    pub fn take_dirty(&mut self) -> bool {
        std::mem::take(&mut self.dirty)
    }

    /// Drop every tile and highlight (used when the session restarts).
    pub fn clear_tiles(&mut self) {
        self.visible.clear();
        self.cache.clear();
        self.highlight_item = None;
        self.highlight_trigger = None;
        self.dirty = true;
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::canvas::tile::HitMap;

    pub(crate) const TS: u32 = 4;

    pub(crate) fn small_config() -> EngineConfig {
        EngineConfig { tile_size: TS, tile_cache_capacity: 16, ..EngineConfig::default() }
    }

    pub(crate) fn canvas(config_id: u64, w: u32, h: u32) -> CanvasConfig {
        CanvasConfig {
            config_id, w, h,
            x0: 0.0, y0: 0.0, x1: 1.0, y1: 1.0,
            zoom_level: 0, x_offset: 0, y_offset: 0,
        }
    }

    /// Base tile whose every pixel maps to `item` (or nothing).
    pub(crate) fn base_tile(set: &TileSet, row: i32, col: i32, sm: u32, item: Option<ItemId>) -> Tile {
        let v = item.map_or(-1, |i| i as i32);
        let map = HitMap::from_ids(TS, vec![v; (TS * TS) as usize]);
        Tile::new(set.key(TileCoord::new(row, col), None), sm, vec![0], Some(map))
    }

    pub(crate) fn hl_tile(set: &TileSet, row: i32, col: i32, item: ItemId) -> Tile {
        Tile::new(set.key(TileCoord::new(row, col), Some(item)), 0, vec![1], None)
    }

    fn ready_set() -> TileSet {
        let mut set = TileSet::new(&small_config());
        let req = set.reset_canvas(8, 8);
        assert_eq!(req.config_id, 1);
        assert!(set.add_config(canvas(1, 8, 8)));
        set
    }

    #[test]
    fn test_all_tile_coords_follow_offsets() {
        let mut set = ready_set();
        assert_eq!(set.all_tile_coords().len(), 4);
        set.pan(2.0, 0.0);
        let coords = set.all_tile_coords();
        assert_eq!(coords.first(), Some(&TileCoord::new(0, -1)));
        assert_eq!(coords.len(), 6, "a 2px shift exposes an extra column");
    }

    #[test]
    fn test_visible_and_cache_are_exclusive() {
        let mut set = ready_set();
        let t = base_tile(&set, 0, 0, 0, Some(1));
        let key = *t.key();
        assert!(set.add_tile(t));
        assert!(set.is_shown(&key) && !set.is_cached(&key));

        set.pan(-20.0, 0.0);
        assert!(!set.is_shown(&key) && set.is_cached(&key), "offscreen tile is demoted");

        set.pan(0.0, 0.0);
        assert!(set.is_shown(&key) && !set.is_cached(&key), "and promoted back");
    }

    #[test]
    fn test_newer_version_wins_and_older_never_replaces() {
        let mut set = ready_set();
        let key = *base_tile(&set, 0, 0, 0, None).key();
        set.add_tile(base_tile(&set, 0, 0, 2, None));
        set.add_tile(base_tile(&set, 0, 0, 0, None));
        assert_eq!(set.get_tile(&key).map(|t| t.sm_version), Some(2));
        assert_eq!(set.visible_tile(&key).map(|t| t.sm_version), Some(2));

        set.add_tile(base_tile(&set, 0, 0, 4, None));
        assert_eq!(set.visible_tile(&key).map(|t| t.sm_version), Some(4));
    }

    #[test]
    fn test_highlight_swap_promotes_and_demotes() {
        let mut set = ready_set();
        set.add_tile(hl_tile(&set, 0, 0, 7));
        set.add_tile(hl_tile(&set, 0, 0, 9));
        let k7 = set.key(TileCoord::new(0, 0), Some(7));
        let k9 = set.key(TileCoord::new(0, 0), Some(9));
        assert!(set.is_cached(&k7) && set.is_cached(&k9), "no highlight active yet");

        set.set_highlight(Some(7), Some(HighlightTrigger::Canvas));
        assert!(set.is_shown(&k7) && set.is_cached(&k9));

        set.set_highlight(Some(9), Some(HighlightTrigger::Canvas));
        assert!(set.is_cached(&k7) && set.is_shown(&k9));

        set.set_highlight(None, Some(HighlightTrigger::Canvas));
        assert!(set.is_cached(&k9));
        assert_eq!(set.highlight_trigger(), None);
    }

    #[test]
    fn test_highlight_id_distinguishes_unknown_and_empty() {
        let mut set = ready_set();
        assert_eq!(set.get_highlight_id(1.0, 1.0), HighlightLookup::Unknown);
        set.add_tile(base_tile(&set, 0, 0, 0, None));
        set.add_tile(base_tile(&set, 0, 1, 0, Some(5)));
        assert_eq!(set.get_highlight_id(1.0, 1.0), HighlightLookup::NoItem);
        assert_eq!(set.get_highlight_id(5.0, 1.0), HighlightLookup::Item(5));
        assert_eq!(set.get_highlight_id(1.0, 5.0), HighlightLookup::Unknown);
    }

    #[test]
    fn test_new_config_resets_offsets_and_drops_old_tiles() {
        let mut set = ready_set();
        set.add_tile(base_tile(&set, 0, 0, 0, None));
        set.pan(3.0, 1.0);
        assert!(!set.add_config(canvas(1, 8, 8)), "same id is stale");
        assert!(set.add_config(canvas(2, 8, 8)));
        assert_eq!(set.offsets(), (0.0, 0.0));
        assert_eq!(set.visible_len() + set.cached_len(), 0);
    }

    #[test]
    fn test_resize_and_zoom_requests() {
        let mut set = TileSet::new(&small_config());
        let r = set.resize_canvas(8, 8).unwrap();
        assert_eq!(r.how, ConfigHow::Reset, "no config yet: resize becomes reset");
        assert!(set.resize_canvas(8, 8).is_none(), "same size is a no-op");
        let rect = ZoomRect { px0: 0.0, py0: 0.0, px1: 4.0, py1: 4.0 };
        assert!(set.zoom_canvas(8, 8, rect).is_none(), "zoom needs a valid config");

        set.add_config(canvas(1, 8, 8));
        let r = set.resize_canvas(16, 8).unwrap();
        assert_eq!((r.config_id, r.how), (2, ConfigHow::Resize));
        assert_eq!(r.old_config.map(|c| c.config_id), Some(1));
        let z = set.zoom_canvas(16, 8, rect).unwrap();
        assert_eq!(z.config_id, 3);
    }

    #[test]
    fn test_local_zoom_scales_offsets() {
        let mut set = ready_set();
        set.add_tile(base_tile(&set, 0, 0, 0, None));
        set.pan(2.0, -2.0);
        set.zoom_by(1, 1.5);
        assert_eq!(set.zoom_level(), 1);
        assert_eq!(set.offsets(), (3.0, -3.0));
        assert_eq!(set.visible_len(), 0, "zoom level 0 tiles are hidden");
        set.zoom_by(-1, 1.5);
        assert_eq!(set.visible_len(), 1);
    }

    #[test]
    fn test_placed_tiles_positions() {
        let mut set = ready_set();
        set.add_tile(base_tile(&set, 1, 0, 0, None));
        set.pan(1.0, 2.0);
        let placed = set.placed_tiles();
        assert_eq!(placed.len(), 1);
        assert_eq!((placed[0].left, placed[0].top), (1.0, TS as f64 + 2.0));
        assert!(set.take_dirty());
        assert!(!set.take_dirty());
    }
}
