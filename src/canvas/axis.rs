//! Axis ticks and the `axis_req` flow that keeps them current while panning.

use serde::Serialize;
use crate::canvas::tile_set::{round_px, TileSet};
use crate::config::EngineConfig;
use crate::net::flow::FlowController;
use crate::net::message::{Axes, AxisTicksMsg, Request};
use crate::types::sqr;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum WhichAxis {
    X,
    Y,
}

#[derive(Clone, Debug, PartialEq)]
pub struct Tick {
    pub axis: WhichAxis,
    /// Pixels from the data origin, before panning.
    pub coord: f64,
    pub label: String,
}

/// A tick positioned on screen (`pos` is left for X, top for Y).
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct VisibleTick {
    pub axis: WhichAxis,
    pub pos: f64,
    pub label: String,
}

pub struct AxisState {
    ticks: Vec<Tick>,
    flow: FlowController,
    last_seq: Option<u64>,
    // x/y offsets of the last `axis_req` (or the last applied answer).
    last_x_offset: f64,
    last_y_offset: f64,
    redraw_distance: f64,
    max_inflight: usize,
    expire_ms: f64,
}

impl AxisState {
    pub fn new(config: &EngineConfig) -> Self {
        Self {
            ticks: Vec::new(),
            flow: FlowController::new(config.max_inflight_axis_requests, config.inflight_expire_ms),
            last_seq: None,
            last_x_offset: 0.0,
            last_y_offset: 0.0,
            redraw_distance: config.axis_redraw_distance,
            max_inflight: config.max_inflight_axis_requests,
            expire_ms: config.inflight_expire_ms,
        }
    }

    fn replace_ticks(&mut self, axes: &Axes) {
        self.ticks.clear();
        for (axis, list) in [(WhichAxis::X, &axes.x), (WhichAxis::Y, &axes.y)] {
            self.ticks.extend(list.iter().map(|(coord, label)| Tick {
                axis,
                coord: *coord,
                label: label.clone(),
            }));
        }
    }

    /// A new canvas config starts a fresh axis sequence.
    pub fn on_canvas_config(&mut self, axes: Option<&Axes>) {
        self.flow = FlowController::new(self.max_inflight, self.expire_ms);
        self.last_seq = None;
        self.last_x_offset = 0.0;
        self.last_y_offset = 0.0;
        match axes {
            Some(axes) => self.replace_ticks(axes),
            None => self.ticks.clear(),
        }
    }

    /// Apply `axis_ticks` if it is the newest answer for the current config.
    ///
    /// Sequence numbers restart with each config, so an answer for another
    /// config must not retire anything.
    pub fn on_axis_ticks(&mut self, msg: &AxisTicksMsg, current_config_id: Option<u64>) -> bool {
        if current_config_id != Some(msg.config_id) {
            log::debug!("Ignoring axis_ticks of config_id={}", msg.config_id);
            return false;
        }
        self.flow.ack(&[msg.axis_seq]);
        self.flow.take_acks();

        if self.last_seq.is_some_and(|s| msg.axis_seq < s) {
            log::debug!("Ignoring stale axis_ticks seq={}", msg.axis_seq);
            return false;
        }
        self.last_seq = Some(msg.axis_seq);
        self.last_x_offset = msg.x_offset;
        self.last_y_offset = msg.y_offset;
        self.replace_ticks(&msg.axes);
        true
    }

    /// Called after panning or zooming: builds an `axis_req` when the view
    /// drifted far enough from the last labelled position.
    pub fn update_location(&mut self, tiles: &TileSet, zoom_updated: bool, now: f64) -> Option<Request> {
        let (x_offset, y_offset) = tiles.offsets();
        if !zoom_updated {
            let dist2 = sqr(x_offset - self.last_x_offset) + sqr(y_offset - self.last_y_offset);
            if dist2 < sqr(self.redraw_distance) { return None; }
        }
        let config = tiles.current_config()?;

        self.flow.expire_old(now);
        // TODO: a zoom change dropped here should be retried once a slot frees up.
        let Some(axis_seq) = self.flow.try_issue(now) else {
            log::debug!("Too many in-flight axis requests, bailing out ...");
            return None;
        };
        self.last_x_offset = round_px(x_offset);
        self.last_y_offset = round_px(y_offset);
        Some(Request::AxisReq { config, axis_seq })
    }

    pub fn ticks(&self) -> &[Tick] {
        &self.ticks
    }

    /// Ticks that land inside the canvas at the current offsets.
    pub fn visible_ticks(&self, tiles: &TileSet) -> Vec<VisibleTick> {
        let (x_offset, y_offset) = tiles.offsets();
        let (w, h) = tiles.size();
        self.ticks.iter()
            .filter_map(|t| {
                let (offset, limit) = match t.axis {
                    WhichAxis::X => (x_offset, w as f64),
                    WhichAxis::Y => (y_offset, h as f64),
                };
                let pos = round_px(offset + t.coord);
                (pos >= 0.0 && pos < limit).then(|| VisibleTick { axis: t.axis, pos, label: t.label.clone() })
            })
            .collect()
    }

    pub fn inflight_len(&self) -> usize {
        self.flow.inflight_len()
    }
}
