//! Tunable constants for the engine.
//!
//! Every threshold used by the viewport, the request flow controller, the
//! pointer state machine, the motion predictor and the highlight resolver
//! lives here so a host can override any subset from JSON.

use serde::{Deserialize, Serialize};
use crate::error::{EngineError, Result};

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Edge length of a tile in pixels. Must match the backend.
    pub tile_size: u32,
    /// Capacity of the LRU cache of tiles that are not being shown.
    pub tile_cache_capacity: usize,

    // ── Request flow control ──
    pub max_inflight_requests: usize,
    pub inflight_expire_ms: f64,
    pub max_inflight_axis_requests: usize,

    // ── Pointer ──
    pub mouse_stop_ms: f64,
    /// Drag diagonal below which select-to-zoom is treated as a click.
    pub min_select_diag: f64,

    // ── Motion prediction ──
    pub history_min_step_ms: f64,
    pub history_window_ms: f64,
    pub predict_step_ms: f64,
    pub predict_error_threshold: f64,
    pub history_reset_threshold: f64,
    pub max_prediction_line_step: f64,
    pub max_items_per_predict_step: usize,
    pub max_waypoints: usize,

    // ── Highlight ──
    pub max_distance: f64,
    pub exhaustive_search_radius: i32,
    pub min_highlight_ms: f64,
    pub min_foreground_visible_ms: f64,
    pub nearest_point_cache: usize,
    pub tooltip_offset_x: f64,
    pub tooltip_offset_y: f64,

    // ── Misc ──
    pub progress_bar_timeout_ms: f64,
    /// Must match the backend's zoom step.
    pub zoom_factor: f64,
    pub axis_redraw_distance: f64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            tile_size: 256,
            tile_cache_capacity: 500,
            max_inflight_requests: 50,
            inflight_expire_ms: 5000.0,
            max_inflight_axis_requests: 2,
            mouse_stop_ms: 30.0,
            min_select_diag: 5.0,
            history_min_step_ms: 5.0,
            history_window_ms: 150.0,
            predict_step_ms: 20.0,
            predict_error_threshold: 5.0,
            history_reset_threshold: 50.0,
            max_prediction_line_step: 10.0,
            max_items_per_predict_step: 5,
            max_waypoints: 50,
            max_distance: 30.0,
            exhaustive_search_radius: 5,
            min_highlight_ms: 100.0,
            min_foreground_visible_ms: 500.0,
            nearest_point_cache: 10,
            tooltip_offset_x: 25.0,
            tooltip_offset_y: 10.0,
            progress_bar_timeout_ms: 500.0,
            zoom_factor: 1.5,
            axis_redraw_distance: 30.0,
        }
    }
}

impl EngineConfig {
    /// Parse a (possibly partial) JSON object; missing keys keep their defaults.
    pub fn from_json(text: &str) -> Result<Self> {
        let config: EngineConfig = serde_json::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.tile_size == 0 {
            return Err(EngineError::config("tile_size must be positive"));
        }
        if self.tile_cache_capacity == 0 {
            return Err(EngineError::config("tile_cache_capacity must be positive"));
        }
        if self.max_inflight_requests == 0 || self.max_inflight_axis_requests == 0 {
            return Err(EngineError::config("in-flight budgets must be positive"));
        }
        if self.max_waypoints == 0 || self.nearest_point_cache == 0 {
            return Err(EngineError::config("ring and cache sizes must be positive"));
        }
        if self.exhaustive_search_radius < 0 {
            return Err(EngineError::config("exhaustive_search_radius must not be negative"));
        }
        if !(self.zoom_factor > 1.0) {
            return Err(EngineError::config("zoom_factor must be greater than 1"));
        }
        if !(self.predict_error_threshold <= self.history_reset_threshold) {
            return Err(EngineError::config(
                "predict_error_threshold must not exceed history_reset_threshold",
            ));
        }
        Ok(())
    }
}
