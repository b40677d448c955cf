//! Status line: "please wait" while the first tiles are generated, or a
//! connection error.

use crate::timer::Timer;

pub const PROGRESS_TEXT: &str = "Please wait, the graph is being generated ...";
pub const COMM_ERROR_TEXT: &str = "Cannot connect to backend!  Please rerun the cell.";

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum GraphStatus {
    Initial,
    Ok,
    /// Cannot reach the backend.
    Error,
}

pub struct StatusBar {
    status: GraphStatus,
    progress_timer: Timer,
    progress_visible: bool,
    /// Set once any tile was shown; the progress text never comes back.
    tiles_seen: bool,
}

impl StatusBar {
    pub fn new(now: f64, progress_timeout_ms: f64) -> Self {
        let mut progress_timer = Timer::new();
        progress_timer.arm(now, progress_timeout_ms);
        Self { status: GraphStatus::Initial, progress_timer, progress_visible: false, tiles_seen: false }
    }

    pub fn status(&self) -> GraphStatus {
        self.status
    }

    /// Returns true if the visible text changed.
    pub fn poll(&mut self, now: f64) -> bool {
        if !self.progress_timer.fire(now) { return false; }
        if self.status == GraphStatus::Error || self.tiles_seen { return false; }
        self.progress_visible = true;
        true
    }

    pub fn deadline(&self) -> Option<f64> {
        self.progress_timer.deadline()
    }

    pub fn on_comm_ok(&mut self) {
        if self.status == GraphStatus::Initial {
            self.status = GraphStatus::Ok;
        }
    }

    pub fn on_comm_error(&mut self, err: &str) {
        log::error!("Backend communication failed: {err}");
        self.progress_timer.cancel();
        self.progress_visible = false;
        self.status = GraphStatus::Error;
    }

    /// Some tile is on screen: drop the progress text for good.
    pub fn on_tiles_visible(&mut self) {
        self.tiles_seen = true;
        self.progress_timer.cancel();
        self.progress_visible = false;
    }

    pub fn text(&self) -> Option<&'static str> {
        match self.status {
            GraphStatus::Error => Some(COMM_ERROR_TEXT),
            _ if self.progress_visible => Some(PROGRESS_TEXT),
            _ => None,
        }
    }
}
