/// A single-shot, host-polled timer.
///
/// The engine never owns a real clock: the host passes `now` (milliseconds)
/// into every call and polls `fire` from its own timeout callback. Arming
/// replaces any earlier deadline, so a superseded timer cannot fire.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct Timer {
    deadline: Option<f64>,
}

impl Timer {
    pub fn new() -> Self {
        Self { deadline: None }
    }

    pub fn arm(&mut self, now: f64, delay_ms: f64) {
        self.deadline = Some(now + delay_ms.max(0.0));
    }

    pub fn cancel(&mut self) {
        self.deadline = None;
    }

    pub fn deadline(&self) -> Option<f64> {
        self.deadline
    }

    /// Returns true exactly once when the deadline has passed.
    pub fn fire(&mut self, now: f64) -> bool {
        match self.deadline {
            Some(d) if now >= d => {
                self.deadline = None;
                true
            }
            _ => false,
        }
    }
}

/// Earliest of several optional deadlines.
pub fn earliest(deadlines: impl IntoIterator<Item = Option<f64>>) -> Option<f64> {
    deadlines.into_iter().flatten().fold(None, |acc: Option<f64>, d| {
        Some(acc.map_or(d, |a| a.min(d)))
    })
}
