//! Predictive highlighting: extrapolate the cursor a few milliseconds ahead
//! so highlight tiles can be requested before the cursor gets there.

use std::collections::VecDeque;
use crate::canvas::tile_set::round_px;
use crate::config::EngineConfig;
use crate::types::{sqr, HighlightLookup, MouseSample, Waypoint};

/// `x(t) = vx·t + x0`, `y(t) = vy·t + y0`, with `t` relative to the time
/// the fit was computed for.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct LinearFit {
    pub vx: f64,
    pub x0: f64,
    pub vy: f64,
    pub y0: f64,
}

impl LinearFit {
    pub fn at(&self, t_rel: f64) -> (f64, f64) {
        (self.vx * t_rel + self.x0, self.vy * t_rel + self.y0)
    }
}

/// Ordinary least-squares fit of both coordinates against time.
///
/// Times are shifted by `now` to keep the sums small. `None` with fewer than
/// two samples or when every sample shares one timestamp.
pub fn fit(samples: &[MouseSample], now: f64) -> Option<LinearFit> {
    if samples.len() < 2 { return None; }
    let n = samples.len() as f64;
    let (mut sum_t, mut sum_t2, mut sum_x, mut sum_y, mut sum_tx, mut sum_ty) =
        (0.0, 0.0, 0.0, 0.0, 0.0, 0.0);
    for s in samples {
        let t = s.t - now;
        sum_t += t;
        sum_t2 += t * t;
        sum_x += s.x;
        sum_y += s.y;
        sum_tx += t * s.x;
        sum_ty += t * s.y;
    }

    let d = n * sum_t2 - sum_t * sum_t;
    if d.abs() < f64::EPSILON { return None; }
    let vx = (n * sum_tx - sum_t * sum_x) / d;
    let vy = (n * sum_ty - sum_t * sum_y) / d;
    Some(LinearFit {
        vx,
        x0: (sum_x - vx * sum_t) / n,
        vy,
        y0: (sum_y - vy * sum_t) / n,
    })
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub enum Prediction {
    /// Sample merged into the previous one, or too little history.
    Nothing,
    /// Fit was far off: history truncated to the newest sample.
    Reset,
    /// Fit is not good enough to extrapolate this time.
    Unreliable,
    /// Trace from the current position to the extrapolated one.
    Line { from: (f64, f64), to: (f64, f64) },
}

pub struct MotionPredictor {
    history: VecDeque<MouseSample>,
    min_step_ms: f64,
    window_ms: f64,
    predict_step_ms: f64,
    error_threshold: f64,
    reset_threshold: f64,
}

impl MotionPredictor {
    pub fn new(config: &EngineConfig) -> Self {
        Self {
            history: VecDeque::new(),
            min_step_ms: config.history_min_step_ms,
            window_ms: config.history_window_ms,
            predict_step_ms: config.predict_step_ms,
            error_threshold: config.predict_error_threshold,
            reset_threshold: config.history_reset_threshold,
        }
    }

    /// Record a cursor sample at `now` and try to predict where it goes next.
    pub fn record(&mut self, now: f64, x: f64, y: f64) -> Prediction {
        let sample = MouseSample { t: now, x, y };

        // Called too often: just replace the last known position.
        if let Some(last) = self.history.back_mut() {
            if now - last.t < self.min_step_ms {
                log::trace!("mouse history updated too quickly, replacing last sample");
                *last = sample;
                return Prediction::Nothing;
            }
        }

        while self.history.front().is_some_and(|s| s.t < now - self.window_ms) {
            self.history.pop_front();
        }
        self.history.push_back(sample);

        let samples = self.history.make_contiguous();
        let Some(line) = fit(samples, now) else { return Prediction::Nothing };

        // Self-consistency check: the current sample is part of the fit.
        let (px, py) = line.at(0.0);
        let dist = (sqr(x - px) + sqr(y - py)).sqrt();
        log::trace!("mouse=({x}, {y}) predicted=({px:.2}, {py:.2}) error={dist:.2}");

        if dist > self.reset_threshold {
            log::debug!("Prediction error too high, resetting mouse history ...");
            let keep = self.history.len() - 1;
            self.history.drain(..keep);
            return Prediction::Reset;
        }
        if dist > self.error_threshold {
            return Prediction::Unreliable;
        }
        Prediction::Line { from: (x, y), to: line.at(self.predict_step_ms) }
    }

    pub fn history(&self) -> impl Iterator<Item = &MouseSample> {
        self.history.iter()
    }

    pub fn clear(&mut self) {
        self.history.clear();
    }
}

/// Walk the pixels between `from` and `to` and collect waypoints.
///
/// Runs of the same item keep only their endpoints unless a run gets longer
/// than `max_step` pixels. Stops at missing data or once more than
/// `max_items` item changes were seen.
pub fn trace_line(
    from: (f64, f64),
    to: (f64, f64),
    max_items: usize,
    max_step: f64,
    mut lookup: impl FnMut(f64, f64) -> HighlightLookup,
) -> Vec<Waypoint> {
    let ((x0, y0), (x1, y1)) = (from, to);
    if (x1 - x0).abs() + (y1 - y0).abs() < 1.0 { return Vec::new(); }

    let mut buf: Vec<Waypoint> = Vec::new();
    let mut item_cnt = 0;

    // Visit one pixel; false = stop.
    let mut visit = |x: f64, y: f64| -> bool {
        let (x, y) = (round_px(x), round_px(y));
        let item_id = match lookup(x, y) {
            HighlightLookup::Unknown => return false,
            HighlightLookup::Item(id) => Some(id),
            HighlightLookup::NoItem => None,
        };
        let wp = Waypoint::at(x, y, item_id);

        if buf.last().map_or(true, |w| w.item_id != item_id) {
            buf.push(wp);
            item_cnt += 1;
            return item_cnt <= max_items;
        }
        if buf.len() == 1 {
            buf.push(wp);
            return true;
        }

        let penult = buf[buf.len() - 2];
        let (px, py) = penult.pos.unwrap_or((x, y));
        if penult.item_id == item_id && sqr(px - x) + sqr(py - y) < sqr(max_step) {
            if let Some(last) = buf.last_mut() {
                *last = wp;
            }
        } else {
            buf.push(wp);
        }
        true
    };

    if (x1 - x0).abs() >= (y1 - y0).abs() {
        let slope = (y1 - y0) / (x1 - x0);
        let (start, end) = (round_px(x0) as i64, round_px(x1) as i64);
        let step = if start < end { 1 } else { -1 };
        let mut x = start;
        loop {
            if !visit(x as f64, y0 + slope * (x as f64 - x0)) || x == end { break; }
            x += step;
        }
    } else {
        let slope = (x1 - x0) / (y1 - y0);
        let (start, end) = (round_px(y0) as i64, round_px(y1) as i64);
        let step = if start < end { 1 } else { -1 };
        let mut y = start;
        loop {
            if !visit(x0 + slope * (y as f64 - y0), y as f64) || y == end { break; }
            y += step;
        }
    }
    buf
}

/// Bounded buffer of recent waypoints, oldest dropped first.
pub struct WaypointRing {
    buf: VecDeque<Waypoint>,
    capacity: usize,
}

impl WaypointRing {
    pub fn new(capacity: usize) -> Self {
        Self { buf: VecDeque::with_capacity(capacity), capacity }
    }

    pub fn extend(&mut self, waypoints: &[Waypoint]) {
        for wp in waypoints {
            if self.buf.len() == self.capacity {
                self.buf.pop_front();
            }
            self.buf.push_back(*wp);
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = &Waypoint> {
        self.buf.iter()
    }

    pub fn len(&self) -> usize {
        self.buf.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    pub fn clear(&mut self) {
        self.buf.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn s(t: f64, x: f64, y: f64) -> MouseSample {
        MouseSample { t, x, y }
    }

    #[test]
    fn test_fit_extrapolates_linear_motion() {
        let line = fit(&[s(0.0, 0.0, 0.0), s(10.0, 1.0, 0.0), s(20.0, 2.0, 0.0)], 0.0).unwrap();
        let (x, y) = line.at(30.0);
        assert!((x - 3.0).abs() < 1e-9, "x = {x}");
        assert!(y.abs() < 1e-9, "y = {y}");
    }

    #[test]
    fn test_fit_needs_two_distinct_times() {
        assert!(fit(&[s(0.0, 1.0, 1.0)], 0.0).is_none());
        assert!(fit(&[s(5.0, 1.0, 1.0), s(5.0, 2.0, 1.0)], 5.0).is_none());
    }

    #[test]
    fn test_record_predicts_ahead() {
        let mut p = MotionPredictor::new(&EngineConfig::default());
        assert_eq!(p.record(0.0, 0.0, 0.0), Prediction::Nothing);
        p.record(10.0, 1.0, 0.0);
        match p.record(20.0, 2.0, 0.0) {
            Prediction::Line { from, to } => {
                assert_eq!(from, (2.0, 0.0));
                assert!((to.0 - 4.0).abs() < 1e-9, "20ms ahead at 0.1 px/ms");
            }
            other => panic!("expected a line, got {other:?}"),
        }
    }

    #[test]
    fn test_too_frequent_samples_replace_last() {
        let mut p = MotionPredictor::new(&EngineConfig::default());
        p.record(0.0, 0.0, 0.0);
        p.record(10.0, 1.0, 0.0);
        assert_eq!(p.record(12.0, 5.0, 5.0), Prediction::Nothing);
        assert_eq!(p.history().count(), 2);
        assert_eq!(p.history().last().map(|s| s.x), Some(5.0));
    }

    #[test]
    fn test_sudden_jump_resets_history() {
        let mut p = MotionPredictor::new(&EngineConfig::default());
        p.record(0.0, 0.0, 0.0);
        p.record(10.0, 0.0, 0.0);
        p.record(20.0, 0.0, 0.0);
        assert_eq!(p.record(30.0, 400.0, 0.0), Prediction::Reset);
        assert_eq!(p.history().count(), 1);
    }

    #[test]
    fn test_history_window() {
        let mut p = MotionPredictor::new(&EngineConfig::default());
        for i in 0..30 {
            p.record(i as f64 * 10.0, i as f64, 0.0);
        }
        assert!(p.history().all(|s| s.t >= 290.0 - 150.0));
    }

    #[test]
    fn test_trace_line_compresses_runs() {
        // Item 1 left of x=10, nothing after.
        let wps = trace_line((0.0, 0.0), (15.0, 0.0), 5, 10.0, |x, _| {
            if x < 10.0 { HighlightLookup::Item(1) } else { HighlightLookup::NoItem }
        });
        let xs: Vec<_> = wps.iter().map(|w| w.pos.unwrap().0).collect();
        assert_eq!(xs, vec![0.0, 9.0, 10.0, 15.0]);
        assert_eq!(wps[2].item_id, None);
    }

    #[test]
    fn test_trace_line_keeps_points_on_long_runs() {
        let wps = trace_line((0.0, 0.0), (0.0, 25.0), 5, 10.0, |_, _| HighlightLookup::Item(3));
        assert!(wps.len() > 2, "a 25px run must be sampled every 10px");
        assert!(wps.iter().all(|w| w.item_id == Some(3)));
    }

    #[test]
    fn test_trace_line_stops_on_unknown_and_item_budget() {
        let wps = trace_line((0.0, 0.0), (20.0, 0.0), 5, 10.0, |x, _| {
            if x < 3.0 { HighlightLookup::Item(0) } else { HighlightLookup::Unknown }
        });
        assert_eq!(wps.last().and_then(|w| w.pos), Some((2.0, 0.0)));

        let wps = trace_line((0.0, 0.0), (20.0, 0.0), 2, 10.0, |x, _| HighlightLookup::Item(x as u32));
        assert_eq!(wps.len(), 3, "stops right after exceeding the item budget");

        assert!(trace_line((0.0, 0.0), (0.4, 0.4), 5, 10.0, |_, _| HighlightLookup::NoItem).is_empty());
    }

    #[test]
    fn test_waypoint_ring_evicts_oldest() {
        let mut ring = WaypointRing::new(3);
        let wps: Vec<_> = (0..5).map(|i| Waypoint::at(i as f64, 0.0, Some(i))).collect();
        ring.extend(&wps);
        assert_eq!(ring.len(), 3);
        assert_eq!(ring.iter().next().and_then(|w| w.item_id), Some(2));
    }
}
