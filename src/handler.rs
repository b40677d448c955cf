//! The main handler for one canvas: glues the viewport, request flow
//! control, pointer handling, prediction and highlight logic together.
//!
//! Everything runs on the host's event loop. The host forwards pointer
//! events and backend messages, calls `tick` when `next_deadline` comes due,
//! and repaints from `placed_tiles`/`view` when `take_repaint` says so.

use crate::canvas::axis::{AxisState, VisibleTick};
use crate::canvas::nearest::NearestPoints;
use crate::canvas::tile::Tile;
use crate::canvas::tile_set::{round_px, PlacedTile, TileSet};
use crate::config::EngineConfig;
use crate::error::Result;
use crate::interaction::highlight::{self, HideStep, HighlightDebounce};
use crate::interaction::mouse::{MouseAction, MouseTracker, MoveState, PointerEvent};
use crate::interaction::predict::{trace_line, MotionPredictor, Prediction, WaypointRing};
use crate::interaction::search::{SearchState, SelectCommand};
use crate::interaction::status::StatusBar;
use crate::net::flow::FlowController;
use crate::net::message::{
    coord_seq, CanvasConfigMsg, LabelsMsg, Message, Request, TileMsg, TileReqItem, TileRequest,
};
use crate::net::Transport;
use crate::timer::earliest;
use crate::types::{HighlightLookup, HighlightTrigger, ItemId, Rect, TileCoord, Waypoint};
use serde::Serialize;
use std::collections::{HashMap, HashSet};

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct Tooltip {
    pub left: f64,
    pub top: f64,
    /// Item label, plus the nearest data point once known.
    pub text: String,
    /// Hex colour of the item, without `#`.
    pub border_color: Option<String>,
}

/// Overlay state the host paints on top of the tiles.
#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct ViewState {
    pub tooltip: Option<Tooltip>,
    /// Screen position of the nearest data point.
    pub crosshair: Option<(f64, f64)>,
    pub select_area: Option<Rect>,
    #[serde(skip)]
    needs_repaint: bool,
}

pub struct TileHandler<T: Transport> {
    config: EngineConfig,
    transport: T,
    tiles: TileSet,
    flow: FlowController,
    axis: AxisState,
    mouse: MouseTracker,
    predictor: MotionPredictor,
    waypoints: WaypointRing,
    debounce: HighlightDebounce,
    nearest: NearestPoints,
    search: SearchState,
    status: StatusBar,
    /// Tiles received but not processed yet: a burst is handled in one pass.
    received: Vec<Tile>,
    /// Set when a tile refresh could not be sent because of flow control.
    tile_update_stalled: bool,
    view: ViewState,
}

impl<T: Transport> TileHandler<T> {
    pub fn new(config: EngineConfig, transport: T, now: f64) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            tiles: TileSet::new(&config),
            flow: FlowController::new(config.max_inflight_requests, config.inflight_expire_ms),
            axis: AxisState::new(&config),
            mouse: MouseTracker::new(&config),
            predictor: MotionPredictor::new(&config),
            waypoints: WaypointRing::new(config.max_waypoints),
            debounce: HighlightDebounce::new(config.min_highlight_ms, config.min_foreground_visible_ms),
            nearest: NearestPoints::new(config.nearest_point_cache),
            search: SearchState::new(),
            status: StatusBar::new(now, config.progress_bar_timeout_ms),
            received: Vec::new(),
            tile_update_stalled: false,
            view: ViewState::default(),
            config,
            transport,
        })
    }

    // ── Outgoing ────────────────────────────────────────────────────────────

    fn send(&mut self, request: Request) {
        log::debug!("Sending {}", request.kind());
        if let Err(err) = self.transport.send(&request) {
            self.status.on_comm_error(&err.to_string());
            self.view.needs_repaint = true;
        }
    }

    fn send_tile_req(&mut self, req: TileRequest) {
        if req.items.is_empty() { return; }
        log::debug!("tile_req: {} tiles, acking {:?}", req.tile_count(), req.ack_seqs);
        self.send(Request::TileReq(req));
    }

    /// Ask for a fresh config and the initial (unfiltered) search results.
    pub fn start(&mut self, w: u32, h: u32) {
        self.reset(w, h);
        let req = self.search.search("", false, None);
        self.send(req);
    }

    pub fn reset(&mut self, w: u32, h: u32) {
        let req = self.tiles.reset_canvas(w, h);
        self.send(Request::CanvasConfigReq(req));
    }

    pub fn resize(&mut self, w: u32, h: u32) {
        if let Some(req) = self.tiles.resize_canvas(w, h) {
            self.send(Request::CanvasConfigReq(req));
        }
    }

    pub fn zoom_in(&mut self, now: f64) {
        self.local_zoom(1, now);
    }

    pub fn zoom_out(&mut self, now: f64) {
        self.local_zoom(-1, now);
    }

    fn local_zoom(&mut self, steps: i32, now: f64) {
        if !self.tiles.has_valid_config() { return; }
        self.tiles.zoom_by(steps, self.config.zoom_factor);
        if let Some(req) = self.axis.update_location(&self.tiles, true, now) {
            self.send(req);
        }
        self.request_new_tiles(now);
    }

    /// Choose what a drag does: select-to-zoom (true) or pan (false).
    pub fn set_zoom_mode(&mut self, on: bool) {
        self.mouse.set_zoom_mode(on);
    }

    /// Tell the backend this canvas is gone.
    pub fn dispose(&mut self) {
        self.send(Request::CellFini);
        self.received.clear();
        self.tiles.clear_tiles();
    }

    // ── Flow control ────────────────────────────────────────────────────────

    /// Request base tiles that are missing or older than the current
    /// selection-map version.
    ///
    /// Stops at the in-flight budget without flagging the request: the next
    /// tile arrival retries.
    pub fn create_tile_req(&mut self, now: f64) -> Option<TileRequest> {
        self.tile_update_stalled = false;
        self.flow.expire_old(now);

        let sm_version = self.tiles.sm_version();
        log::debug!(
            "create_tile_req (version {sm_version}): {} in-flight requests",
            self.flow.inflight_len()
        );
        if self.flow.is_saturated() {
            log::debug!("Too many in-flight requests, bailing out ...");
            self.tile_update_stalled = true;
            return None;
        }
        let config = self.tiles.current_config()?;

        let mut buf = Vec::new();
        for coord in self.tiles.all_tile_coords() {
            let key = self.tiles.key(coord, None);
            let stale = self.tiles.get_tile(&key).map_or(true, |t| t.sm_version < sm_version);
            if !stale { continue; }
            let Some(seq) = self.flow.try_issue(now) else {
                self.tile_update_stalled = true;
                break;
            };
            buf.push(coord_seq(coord, seq));
        }
        if buf.is_empty() { return None; }

        Some(TileRequest {
            ack_seqs: self.flow.take_acks(),
            config,
            items: vec![TileReqItem { id: None, version: Some(sm_version), prio: buf, reg: Vec::new() }],
            throttled: false,
        })
    }

    /// Request highlight tiles for the items named by `waypoints`.
    ///
    /// Tiles at the waypoints' positions go first ("prio"); the rest of the
    /// viewport follows ("reg") in case the cursor goes there. Waypoints
    /// without a position (from the search list) make the whole viewport
    /// priority. Running out of budget sets `throttled`; a throttled request
    /// may have no items at all, in which case it must not be sent.
    pub fn create_highlight_req(&mut self, waypoints: &[Waypoint], now: f64) -> Option<TileRequest> {
        self.flow.expire_old(now);
        let config = self.tiles.current_config()?;
        let all_coords = self.tiles.all_tile_coords();

        let mut order: Vec<ItemId> = Vec::new();
        let mut prio: HashMap<ItemId, HashSet<TileCoord>> = HashMap::new();
        for wp in waypoints {
            let Some(item_id) = wp.item_id else { continue };
            let coords = prio.entry(item_id).or_insert_with(|| {
                order.push(item_id);
                HashSet::new()
            });
            match wp.pos {
                Some((x, y)) => { coords.insert(self.tiles.tile_coord(x, y)); }
                None => coords.extend(all_coords.iter().copied()),
            }
        }

        let mut throttled = false;
        let mut items: Vec<TileReqItem> = Vec::new();
        for is_prio in [true, false] {
            for &item_id in &order {
                let mut buf = Vec::new();
                for &coord in &all_coords {
                    if self.tiles.has_tile(&self.tiles.key(coord, Some(item_id))) { continue; }
                    if prio[&item_id].contains(&coord) != is_prio { continue; }
                    let Some(seq) = self.flow.try_issue(now) else {
                        throttled = true;
                        break;
                    };
                    buf.push(coord_seq(coord, seq));
                }
                if buf.is_empty() { continue; }

                match items.iter_mut().find(|i| i.id == Some(item_id)) {
                    Some(item) => item.reg = buf,
                    None if is_prio => items.push(TileReqItem { id: Some(item_id), prio: buf, ..Default::default() }),
                    None => items.push(TileReqItem { id: Some(item_id), reg: buf, ..Default::default() }),
                }
            }
        }

        if throttled {
            log::debug!("Highlight request throttled at {} in-flight", self.flow.inflight_len());
        }
        if items.is_empty() {
            return throttled.then(|| TileRequest { ack_seqs: Vec::new(), config, items, throttled });
        }
        Some(TileRequest { ack_seqs: self.flow.take_acks(), config, items, throttled })
    }

    /// Request new base tiles, e.g. after panning or a selection change.
    pub fn request_new_tiles(&mut self, now: f64) {
        if let Some(req) = self.create_tile_req(now) {
            self.send_tile_req(req);
        }
    }

    // ── Incoming ────────────────────────────────────────────────────────────

    pub fn on_message_json(&mut self, text: &str, attachments: Vec<Vec<u8>>, now: f64) -> Result<()> {
        let msg = Message::parse(text).map_err(|e| {
            log::warn!("Dropping malformed backend message: {e}");
            e
        })?;
        self.on_message(msg, attachments, now)
    }

    pub fn on_message(&mut self, msg: Message, attachments: Vec<Vec<u8>>, now: f64) -> Result<()> {
        self.status.on_comm_ok();
        match msg {
            Message::CanvasConfig(m) => self.register_canvas_config(m, now),
            Message::Tile(m) => self.register_tile(&m, attachments)?,
            Message::AxisTicks(m) => {
                if self.axis.on_axis_ticks(&m, self.tiles.config_id()) {
                    self.view.needs_repaint = true;
                }
            }
            Message::Pt(m) => {
                self.nearest.insert(&m);
                self.recompute_highlight(now);
            }
            Message::Labels(m) => self.update_search_result(m, now),
        }
        Ok(())
    }

    fn register_canvas_config(&mut self, msg: CanvasConfigMsg, now: f64) {
        if !self.tiles.add_config(msg.config) { return; }
        log::info!("New canvas config {} ({}x{})", msg.config.config_id, msg.config.w, msg.config.h);

        // Cancel any selection/zoom going on.
        self.mouse.reset();
        self.view.select_area = None;
        // Screen positions of the old config mean nothing now.
        self.predictor.clear();
        self.waypoints.clear();
        self.axis.on_canvas_config(msg.axes.as_ref());
        self.view.needs_repaint = true;
        self.request_new_tiles(now);
    }

    /// Acknowledge the tile's sequence numbers and queue it for the next `tick`.
    fn register_tile(&mut self, msg: &TileMsg, attachments: Vec<Vec<u8>>) -> Result<()> {
        let seqs = msg.seq_numbers();
        self.flow.ack(&seqs);

        let tile = Tile::from_message(msg, attachments, self.config.tile_size)?;
        log::trace!("Received tile [{}]{} seq={seqs:?}", tile.sm_version, tile.key());
        if self.tiles.config_id().is_some_and(|current| tile.key().config_id < current) {
            log::debug!("Dropping tile {} of an old config", tile.key());
            return Ok(());
        }
        self.received.push(tile);
        Ok(())
    }

    /// Process every queued tile in one pass.
    fn flush_tiles(&mut self, now: f64) {
        if self.received.is_empty() { return; }
        let batch = std::mem::take(&mut self.received);

        let mut has_hover = false;
        for tile in batch {
            has_hover |= tile.is_highlight();
            self.tiles.add_tile(tile);
        }
        if self.tiles.visible_len() > 0 {
            self.status.on_tiles_visible();
        }

        if self.tile_update_stalled {
            self.request_new_tiles(now);
        }

        // A resting cursor may now have the exact hit-test data it waited for.
        if self.mouse.movement() == MoveState::Stopped {
            if let Some(action) = self.mouse.stopped() {
                self.apply_mouse_action(action, now);
            }
            return;
        }

        if has_hover {
            // A search-triggered highlight just picks up the new tiles.
            match (self.tiles.highlight_trigger(), self.tiles.highlight_item()) {
                (Some(HighlightTrigger::Search), Some(item_id)) => {
                    self.tiles.set_highlight(Some(item_id), Some(HighlightTrigger::Search));
                }
                _ => self.recompute_highlight(now),
            }
        }
    }

    fn update_search_result(&mut self, msg: LabelsMsg, now: f64) {
        if self.tiles.highlight_trigger() == Some(HighlightTrigger::Search) && self.search.highlighted().is_some() {
            self.search.set_highlighted(None);
            self.clear_highlight(now);
        }
        self.search.apply_labels(msg);
        self.view.needs_repaint = true;
    }

    // ── Pointer ─────────────────────────────────────────────────────────────

    pub fn on_pointer(&mut self, ev: PointerEvent, now: f64) {
        let actions = self.mouse.handle(ev, self.tiles.offsets(), now);
        log::trace!("pointer {:?} -> {} {actions:?}", ev.kind, self.mouse);
        for action in actions {
            self.apply_mouse_action(action, now);
        }
    }

    fn apply_mouse_action(&mut self, action: MouseAction, now: f64) {
        match action {
            MouseAction::ClearHighlight => self.clear_highlight(now),
            MouseAction::HideTooltip => self.hide_tooltip(),
            MouseAction::ClearSelectArea => {
                if self.view.select_area.take().is_some() {
                    self.view.needs_repaint = true;
                }
            }
            MouseAction::ShowSelectArea(rect) => {
                self.view.select_area = Some(rect);
                self.view.needs_repaint = true;
            }
            MouseAction::Pan { x_offset, y_offset } => self.handle_panning(x_offset, y_offset, now),
            MouseAction::Zoom(rect) => {
                let (w, h) = self.tiles.size();
                if let Some(req) = self.tiles.zoom_canvas(w, h, rect) {
                    self.send(Request::CanvasConfigReq(req));
                }
            }
            MouseAction::Hover { x, y } => {
                self.update_mouse_history(x, y, now);
                self.recompute_highlight(now);
            }
            MouseAction::Stopped { x, y } => {
                self.handle_mouse_stop(x, y, now);
                self.recompute_highlight(now);
            }
        }
    }

    fn handle_panning(&mut self, x_offset: f64, y_offset: f64, now: f64) {
        self.tiles.pan(x_offset, y_offset);
        self.request_new_tiles(now);
        if let Some(req) = self.axis.update_location(&self.tiles, false, now) {
            self.send(req);
        }
    }

    /// The cursor rests: ask for the highlight tiles exactly under it.
    fn handle_mouse_stop(&mut self, x: f64, y: f64, now: f64) {
        let lookup = self.tiles.get_highlight_id(x, y);
        if lookup.is_unknown() { return; }
        log::trace!("handle_mouse_stop: ({x}, {y}) -> {lookup:?}");

        let Some(req) = self.create_highlight_req(&[Waypoint::at(x, y, lookup.item())], now) else {
            return;
        };
        let throttled = req.throttled;
        self.send_tile_req(req);
        if throttled {
            // Could not ask for everything: check again later.
            self.mouse.enqueue_stop(now);
        }
    }

    fn update_mouse_history(&mut self, x: f64, y: f64, now: f64) {
        if let Prediction::Line { from, to } = self.predictor.record(now, x, y) {
            self.draw_prediction_line(from, to, now);
        }
    }

    /// Collect waypoints along the predicted path and pre-fetch their tiles.
    fn draw_prediction_line(&mut self, from: (f64, f64), to: (f64, f64), now: f64) {
        let tiles = &self.tiles;
        let wps = trace_line(
            from,
            to,
            self.config.max_items_per_predict_step,
            self.config.max_prediction_line_step,
            |x, y| tiles.get_highlight_id(x, y),
        );
        if wps.is_empty() { return; }
        self.waypoints.extend(&wps);

        if let Some(req) = self.create_highlight_req(&wps, now) {
            self.send_tile_req(req);
        }
    }

    // ── Highlight ───────────────────────────────────────────────────────────

    /// Pick the best item near the cursor and update highlight and tooltip.
    pub fn recompute_highlight(&mut self, now: f64) {
        let movement = self.mouse.movement();
        if movement == MoveState::Outside { return; }
        let (x, y) = self.mouse.position();

        let best = highlight::resolve(
            &self.tiles,
            x,
            y,
            movement == MoveState::Moving,
            &self.waypoints,
            self.config.exhaustive_search_radius,
            self.config.max_distance,
        );

        let clear_pending = self.debounce.pending() == Some(HideStep::ClearHighlight);
        if best != self.tiles.highlight_item() || (best.is_some() && clear_pending) {
            match best {
                Some(item_id) => self.set_highlight(item_id, HighlightTrigger::Canvas, now),
                None => self.clear_highlight(now),
            }
        }

        self.hide_tooltip();
        let (MoveState::Stopped, Some(item_id)) = (movement, best) else { return };
        self.show_tooltip(x, y, item_id);
    }

    fn show_tooltip(&mut self, x: f64, y: f64, item_id: ItemId) {
        let key = self.tiles.key(self.tiles.tile_coord(x, y), Some(item_id));
        let Some(tile) = self.tiles.get_tile(&key) else { return };
        let Some(config) = self.tiles.current_config() else { return };
        log::trace!("Activating tooltip for item #{item_id} ...");

        let label = tile.label.clone().unwrap_or_default();
        let border_color = tile.color().map(str::to_string);
        let (x_offset, y_offset) = self.tiles.offsets();
        let nearest = self.nearest.get(
            config.config_id, config.zoom_level, x_offset, y_offset, x, y, item_id,
        );

        let text = match nearest {
            Some(pt) => {
                self.view.crosshair = Some((pt.screen_x, pt.screen_y));
                format!("{label}\r\n({}, {})", pt.data_x, pt.data_y)
            }
            None => label,
        };
        let ask = nearest.is_none();
        self.view.tooltip = Some(Tooltip {
            left: x + self.config.tooltip_offset_x,
            top: y + self.config.tooltip_offset_y,
            text,
            border_color,
        });
        self.view.needs_repaint = true;

        if ask {
            self.send(Request::PtReq {
                config,
                mouse_x: round_px(x) as i64,
                mouse_y: round_px(y) as i64,
                item_id,
            });
        }
    }

    fn hide_tooltip(&mut self) {
        if self.view.tooltip.take().is_some() | self.view.crosshair.take().is_some() {
            self.view.needs_repaint = true;
        }
    }

    fn set_highlight(&mut self, item_id: ItemId, trigger: HighlightTrigger, now: f64) {
        log::debug!("Setting highlight to #{item_id} ({trigger:?})");
        self.tiles.set_highlight(Some(item_id), Some(trigger));
        self.search.set_highlighted(Some(item_id));
        self.debounce.on_set(now);
        self.view.needs_repaint = true;
    }

    /// Turn the highlight off, after the anti-flicker delays.
    fn clear_highlight(&mut self, now: f64) {
        if let Some(step) = self.debounce.request_clear(now) {
            self.apply_hide_step(step, now);
        }
    }

    fn apply_hide_step(&mut self, step: HideStep, now: f64) {
        match step {
            HideStep::ClearHighlight => {
                log::debug!("Clearing highlight ...");
                self.tiles.set_highlight(None, None);
                self.search.set_highlighted(None);
                self.view.needs_repaint = true;
                if let Some(next) = self.debounce.highlight_cleared(now) {
                    self.apply_hide_step(next, now);
                }
            }
            HideStep::HideForeground => {
                self.debounce.hide_foreground();
                self.view.needs_repaint = true;
            }
        }
    }

    // ── Search list ─────────────────────────────────────────────────────────

    pub fn search(&mut self, pattern: &str, regex: bool, now: f64) {
        let version = self.search.autoselect().then(|| self.tiles.new_sm_version());
        let req = self.search.search(pattern, regex, version);
        self.send(req);
        if version.is_some() {
            self.request_new_tiles(now);
        }
    }

    pub fn set_autoselect(&mut self, on: bool, now: f64) {
        self.search.set_autoselect(on);
        if !on { return; }
        let version = self.tiles.new_sm_version();
        let req = self.search.select_exact(version);
        self.send(req);
        self.request_new_tiles(now);
    }

    pub fn select(&mut self, cmd: SelectCommand, now: f64) {
        let version = self.tiles.new_sm_version();
        let req = self.search.select(cmd, version);
        self.send(req);
        self.request_new_tiles(now);
    }

    pub fn set_item_selected(&mut self, item_id: ItemId, selected: bool, now: f64) {
        let version = self.tiles.new_sm_version();
        let req = self.search.set_item_selected(item_id, selected, version);
        self.send(req);
        self.request_new_tiles(now);
    }

    /// Cursor entered (`enter`) or left a label in the search result list.
    pub fn label_hover(&mut self, item_id: ItemId, enter: bool, now: f64) {
        let highlighted = self.search.is_label_highlighted(item_id);
        if enter && !highlighted {
            self.set_highlight(item_id, HighlightTrigger::Search, now);
            if let Some(req) = self.create_highlight_req(&[Waypoint::item_only(item_id)], now) {
                self.send_tile_req(req);
            }
        } else if !enter && highlighted {
            self.clear_highlight(now);
        }
    }

    // ── Timers ──────────────────────────────────────────────────────────────

    /// Run everything that is due: queued tiles, then expired timers.
    pub fn tick(&mut self, now: f64) {
        self.flush_tiles(now);
        if let Some(action) = self.mouse.poll(now) {
            self.apply_mouse_action(action, now);
        }
        if let Some(step) = self.debounce.poll(now) {
            self.apply_hide_step(step, now);
        }
        if self.status.poll(now) {
            self.view.needs_repaint = true;
        }
    }

    /// When `tick` should run next. A deadline in the past means right away.
    pub fn next_deadline(&self) -> Option<f64> {
        let queued = (!self.received.is_empty()).then_some(f64::NEG_INFINITY);
        earliest([queued, self.mouse.stop_deadline(), self.debounce.deadline(), self.status.deadline()])
    }

    // ── Output ──────────────────────────────────────────────────────────────

    /// True once per batch of visible changes.
    pub fn take_repaint(&mut self) -> bool {
        let tiles_dirty = self.tiles.take_dirty();
        std::mem::take(&mut self.view.needs_repaint) | tiles_dirty
    }

    pub fn view(&self) -> &ViewState { &self.view }
    pub fn placed_tiles(&self) -> Vec<PlacedTile> { self.tiles.placed_tiles() }
    pub fn visible_ticks(&self) -> Vec<VisibleTick> { self.axis.visible_ticks(&self.tiles) }
    pub fn foreground_visible(&self) -> bool { self.debounce.foreground_visible() }
    pub fn status_text(&self) -> Option<&'static str> { self.status.text() }
    pub fn tiles(&self) -> &TileSet { &self.tiles }
    pub fn search_state(&self) -> &SearchState { &self.search }
    pub fn mouse(&self) -> &MouseTracker { &self.mouse }
    pub fn inflight_len(&self) -> usize { self.flow.inflight_len() }
    pub fn transport(&self) -> &T { &self.transport }
    pub fn transport_mut(&mut self) -> &mut T { &mut self.transport }

    /// Look up the tile at screen point (`x`, `y`): handy for hosts that
    /// want to show hit-test state.
    pub fn highlight_id_at(&self, x: f64, y: f64) -> HighlightLookup {
        self.tiles.get_highlight_id(x, y)
    }
}
