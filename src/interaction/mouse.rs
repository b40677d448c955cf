//! Mouse interaction inside the canvas.
//!
//! Two independent state variables: the primary button (up, panning or
//! selecting a zoom rectangle) and cursor movement (moving, stopped or
//! outside). The tracker only decides *what* should happen; the handler
//! carries the returned actions out.

use crate::config::EngineConfig;
use crate::net::message::ZoomRect;
use crate::timer::Timer;
use crate::types::{sqr, Rect};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ButtonState {
    /// Primary button not pressed.
    Up,
    Pan,
    SelectToZoom,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum MoveState {
    Moving,
    Stopped,
    Outside,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PointerKind {
    Down,
    Move,
    Up,
    Leave,
}

/// A raw pointer event in canvas-relative pixels.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct PointerEvent {
    pub kind: PointerKind,
    pub x: f64,
    pub y: f64,
    /// Button bitmask as reported by the browser (bit 0 = primary).
    pub buttons: u16,
}

impl PointerEvent {
    pub fn new(kind: PointerKind, x: f64, y: f64, buttons: u16) -> Self {
        Self { kind, x, y, buttons }
    }
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub enum MouseAction {
    ClearHighlight,
    HideTooltip,
    ClearSelectArea,
    ShowSelectArea(Rect),
    Pan { x_offset: f64, y_offset: f64 },
    /// Rectangle in data-relative pixels (offsets already removed).
    Zoom(ZoomRect),
    /// Cursor moved with the button up.
    Hover { x: f64, y: f64 },
    /// Cursor has not moved for a while (button up).
    Stopped { x: f64, y: f64 },
}

/// Snapshot taken when the button goes down.
#[derive(Clone, Copy, Debug)]
struct DragStart {
    x: f64,
    y: f64,
    /// Pan offset at drag start.
    x_offset0: f64,
    y_offset0: f64,
}

pub struct MouseTracker {
    button: ButtonState,
    movement: MoveState,
    x: f64,
    y: f64,
    start: Option<DragStart>,
    zoom_mode: bool,
    stop_timer: Timer,
    stop_ms: f64,
    min_select_diag: f64,
}

impl MouseTracker {
    pub fn new(config: &EngineConfig) -> Self {
        Self {
            button: ButtonState::Up,
            movement: MoveState::Moving,
            x: 0.0,
            y: 0.0,
            start: None,
            zoom_mode: false,
            stop_timer: Timer::new(),
            stop_ms: config.mouse_stop_ms,
            min_select_diag: config.min_select_diag,
        }
    }

    /// Cancel any drag in progress (called on a new canvas config).
    ///
    /// A stopped cursor stays stopped, so highlighting under it keeps working.
    pub fn reset(&mut self) {
        self.button = ButtonState::Up;
        if self.movement != MoveState::Stopped {
            self.movement = MoveState::Moving;
        }
        self.start = None;
    }

    pub fn button(&self) -> ButtonState { self.button }
    pub fn movement(&self) -> MoveState { self.movement }
    pub fn position(&self) -> (f64, f64) { (self.x, self.y) }
    pub fn zoom_mode(&self) -> bool { self.zoom_mode }

    /// Toggle between select-to-zoom (true) and panning (false) drags.
    pub fn set_zoom_mode(&mut self, on: bool) {
        self.zoom_mode = on;
    }

    /// Feed a raw pointer event. `pan_offset` is the viewport's current offset.
    pub fn handle(&mut self, ev: PointerEvent, pan_offset: (f64, f64), now: f64) -> Vec<MouseAction> {
        let (x, y) = (ev.x, ev.y);
        self.x = x;
        self.y = y;

        if ev.kind == PointerKind::Leave {
            self.movement = MoveState::Outside;
            self.stop_timer.cancel();
            return vec![MouseAction::ClearSelectArea, MouseAction::ClearHighlight, MouseAction::HideTooltip];
        }

        // Down/move/up can only happen with the cursor inside.
        let prev_move = self.movement;
        if ev.kind == PointerKind::Move {
            self.stop_timer.cancel();
            self.movement = MoveState::Moving;
        } else if self.movement == MoveState::Outside {
            self.movement = MoveState::Moving;
        }

        // Down/up also fire for buttons we don't care about: compare the
        // primary button's previous and current state instead.
        let was_pressed = self.button != ButtonState::Up;
        let is_pressed = ev.buttons & 1 == 1;

        if ev.kind == PointerKind::Down && !was_pressed && is_pressed {
            let (x_offset0, y_offset0) = pan_offset;
            self.start = Some(DragStart { x, y, x_offset0, y_offset0 });
            self.button = if self.zoom_mode { ButtonState::SelectToZoom } else { ButtonState::Pan };
            return vec![MouseAction::ClearHighlight, MouseAction::HideTooltip];
        }

        // A release after the cursor went outside means the button was let go
        // off-canvas: forget the drag.
        if was_pressed && !is_pressed {
            let mut actions = Vec::new();
            if let Some(start) = self.start.filter(|_| prev_move != MoveState::Outside) {
                match self.button {
                    ButtonState::SelectToZoom => {
                        let diag = (sqr(start.x - x) + sqr(start.y - y)).sqrt();
                        if diag < self.min_select_diag {
                            log::debug!("Selected area too small, ignoring ...");
                        } else {
                            let (x_off, y_off) = pan_offset;
                            actions.push(MouseAction::Zoom(ZoomRect {
                                px0: start.x - x_off,
                                py0: start.y - y_off,
                                px1: x - x_off,
                                py1: y - y_off,
                            }));
                        }
                    }
                    ButtonState::Pan => actions.push(MouseAction::Pan {
                        x_offset: start.x_offset0 + x - start.x,
                        y_offset: start.y_offset0 + y - start.y,
                    }),
                    ButtonState::Up => {}
                }
            }
            actions.push(MouseAction::ClearSelectArea);
            self.button = ButtonState::Up;
            self.start = None;
            return actions;
        }

        // Anything else is movement.
        match (self.button, self.start) {
            (ButtonState::Up, _) => {
                self.stop_timer.arm(now, self.stop_ms);
                vec![MouseAction::Hover { x, y }]
            }
            (ButtonState::SelectToZoom, Some(start)) => {
                vec![MouseAction::ShowSelectArea(Rect::from_corners(start.x, start.y, x, y))]
            }
            (ButtonState::Pan, Some(start)) => vec![MouseAction::Pan {
                x_offset: start.x_offset0 + x - start.x,
                y_offset: start.y_offset0 + y - start.y,
            }],
            (_, None) => {
                debug_assert!(false, "drag without a start snapshot");
                Vec::new()
            }
        }
    }

    /// Re-arm the stop timer, e.g. to retry a throttled highlight request.
    pub fn enqueue_stop(&mut self, now: f64) {
        self.stop_timer.arm(now, self.stop_ms);
    }

    pub fn stop_deadline(&self) -> Option<f64> {
        self.stop_timer.deadline()
    }

    /// Poll the stop timer.
    pub fn poll(&mut self, now: f64) -> Option<MouseAction> {
        if !self.stop_timer.fire(now) { return None; }
        self.stopped()
    }

    /// Enter the stopped state; yields an action only while the button is up.
    pub fn stopped(&mut self) -> Option<MouseAction> {
        self.movement = MoveState::Stopped;
        (self.button == ButtonState::Up).then_some(MouseAction::Stopped { x: self.x, y: self.y })
    }
}

impl std::fmt::Display for MouseTracker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:?}-{:?}", self.button, self.movement)
    }
}
