//! Client-side engine for an interactive scatter plot drawn from server
//! rendered tiles.
//!
//! The host (a browser page, or a test) owns the socket, the clock and the
//! painting. It forwards pointer events and backend messages to a
//! [`handler::TileHandler`], calls `tick` when `next_deadline` comes due,
//! and repaints from `placed_tiles` and `view`.

pub mod canvas;
pub mod config;
pub mod error;
pub mod handler;
pub mod interaction;
pub mod net;
pub mod registry;
pub mod timer;
pub mod types;

#[cfg(target_arch = "wasm32")]
pub mod web;

pub use config::EngineConfig;
pub use error::{EngineError, Result};
pub use handler::{TileHandler, ViewState};
pub use registry::{CanvasId, CanvasRegistry};
