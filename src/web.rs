//! Browser binding: one `WebSession` per page, canvases registered by id.
//!
//! Messages cross the boundary as JSON text plus raw attachment buffers;
//! the host owns the socket and the timers and just calls back into here.

use wasm_bindgen::prelude::*;

use crate::canvas::tile_set::Layer;
use crate::config::EngineConfig;
use crate::error::EngineError;
use crate::handler::TileHandler;
use crate::interaction::mouse::{PointerEvent, PointerKind};
use crate::interaction::search::SelectCommand;
use crate::net::message::Request;
use crate::net::Transport;
use crate::registry::CanvasRegistry;

/// Install the console logger and the panic hook. Safe to call repeatedly.
pub fn init_logging() {
    console_error_panic_hook::set_once();
    // Fails if a logger is already installed, which is fine.
    let _ = console_log::init_with_level(log::Level::Info);
}

/// `performance.now()`, or 0 outside a window.
fn now() -> f64 {
    web_sys::window()
        .and_then(|w| w.performance())
        .map_or(0.0, |p| p.now())
}

fn js_err(err: EngineError) -> JsValue {
    JsValue::from_str(&err.to_string())
}

/// Sends requests through a JS callback taking the JSON text.
pub struct JsTransport {
    send: js_sys::Function,
}

impl Transport for JsTransport {
    fn send(&mut self, request: &Request) -> Result<(), EngineError> {
        let json = request.to_json()?;
        self.send
            .call1(&JsValue::NULL, &JsValue::from_str(&json))
            .map(|_| ())
            .map_err(|e| EngineError::Transport(format!("{e:?}")))
    }
}

#[wasm_bindgen]
pub struct WebSession {
    canvases: CanvasRegistry<JsTransport>,
}

impl WebSession {
    fn canvas(&mut self, id: &str) -> Result<&mut TileHandler<JsTransport>, JsValue> {
        self.canvases
            .get_mut(id)
            .ok_or_else(|| JsValue::from_str(&format!("unknown canvas {id:?}")))
    }
}

#[wasm_bindgen]
impl WebSession {
    #[wasm_bindgen(constructor)]
    pub fn new() -> WebSession {
        init_logging();
        WebSession { canvases: CanvasRegistry::new() }
    }

    /// Register a canvas. `config_json` may override any engine constant.
    pub fn create_canvas(&mut self, id: &str, config_json: Option<String>, send: js_sys::Function) -> Result<(), JsValue> {
        let config = match config_json {
            Some(text) => EngineConfig::from_json(&text).map_err(js_err)?,
            None => EngineConfig::default(),
        };
        self.canvases
            .create(id, config, JsTransport { send }, now())
            .map_err(js_err)?;
        Ok(())
    }

    pub fn start(&mut self, id: &str, w: u32, h: u32) -> Result<(), JsValue> {
        self.canvas(id)?.start(w, h);
        Ok(())
    }

    pub fn resize(&mut self, id: &str, w: u32, h: u32) -> Result<(), JsValue> {
        self.canvas(id)?.resize(w, h);
        Ok(())
    }

    pub fn reset(&mut self, id: &str, w: u32, h: u32) -> Result<(), JsValue> {
        self.canvas(id)?.reset(w, h);
        Ok(())
    }

    /// Feed a backend message; `attachments` is an array of `Uint8Array`.
    pub fn on_message(&mut self, id: &str, text: &str, attachments: js_sys::Array) -> Result<(), JsValue> {
        let buffers = attachments
            .iter()
            .map(|v| js_sys::Uint8Array::new(&v).to_vec())
            .collect();
        self.canvas(id)?
            .on_message_json(text, buffers, now())
            .map_err(js_err)
    }

    /// `kind` is one of `down`, `move`, `up`, `leave`.
    pub fn on_pointer(&mut self, id: &str, kind: &str, x: f64, y: f64, buttons: u16) -> Result<(), JsValue> {
        let kind = match kind {
            "down" => PointerKind::Down,
            "move" => PointerKind::Move,
            "up" => PointerKind::Up,
            "leave" => PointerKind::Leave,
            other => return Err(JsValue::from_str(&format!("unknown pointer event {other:?}"))),
        };
        let now = now();
        self.canvas(id)?.on_pointer(PointerEvent::new(kind, x, y, buttons), now);
        Ok(())
    }

    pub fn zoom_in(&mut self, id: &str) -> Result<(), JsValue> {
        let now = now();
        self.canvas(id)?.zoom_in(now);
        Ok(())
    }

    pub fn zoom_out(&mut self, id: &str) -> Result<(), JsValue> {
        let now = now();
        self.canvas(id)?.zoom_out(now);
        Ok(())
    }

    pub fn set_zoom_mode(&mut self, id: &str, on: bool) -> Result<(), JsValue> {
        self.canvas(id)?.set_zoom_mode(on);
        Ok(())
    }

    pub fn search(&mut self, id: &str, pattern: &str, regex: bool) -> Result<(), JsValue> {
        let now = now();
        self.canvas(id)?.search(pattern, regex, now);
        Ok(())
    }

    /// `cmd` is one of `select_all`, `deselect_all`, `select_matching`,
    /// `deselect_matching`.
    pub fn select(&mut self, id: &str, cmd: &str) -> Result<(), JsValue> {
        let cmd = match cmd {
            "select_all" => SelectCommand::SelectAll,
            "deselect_all" => SelectCommand::DeselectAll,
            "select_matching" => SelectCommand::SelectMatching,
            "deselect_matching" => SelectCommand::DeselectMatching,
            other => return Err(JsValue::from_str(&format!("unknown select command {other:?}"))),
        };
        let now = now();
        self.canvas(id)?.select(cmd, now);
        Ok(())
    }

    pub fn set_item_selected(&mut self, id: &str, item_id: u32, selected: bool) -> Result<(), JsValue> {
        let now = now();
        self.canvas(id)?.set_item_selected(item_id, selected, now);
        Ok(())
    }

    pub fn set_autoselect(&mut self, id: &str, on: bool) -> Result<(), JsValue> {
        let now = now();
        self.canvas(id)?.set_autoselect(on, now);
        Ok(())
    }

    pub fn label_hover(&mut self, id: &str, item_id: u32, enter: bool) -> Result<(), JsValue> {
        let now = now();
        self.canvas(id)?.label_hover(item_id, enter, now);
        Ok(())
    }

    pub fn dispose(&mut self, id: &str) -> bool {
        self.canvases.dispose(id)
    }

    pub fn tick(&mut self) {
        self.canvases.tick(now());
    }

    /// Milliseconds until `tick` is due (0 if overdue), or undefined.
    pub fn next_timeout(&self) -> Option<f64> {
        self.canvases.next_deadline().map(|d| (d - now()).max(0.0))
    }

    pub fn take_repaint(&mut self, id: &str) -> Result<bool, JsValue> {
        Ok(self.canvas(id)?.take_repaint())
    }

    /// Visible tiles as `{key, left, top, layer, raster}` objects, base
    /// layer first.
    pub fn placed_tiles(&mut self, id: &str) -> Result<js_sys::Array, JsValue> {
        let handler = self.canvas(id)?;
        let out = js_sys::Array::new();
        for placed in handler.placed_tiles() {
            let obj = js_sys::Object::new();
            let layer = match placed.layer {
                Layer::Base => "base",
                Layer::Highlight => "highlight",
            };
            js_sys::Reflect::set(&obj, &"key".into(), &placed.key.to_string().into())?;
            js_sys::Reflect::set(&obj, &"left".into(), &placed.left.into())?;
            js_sys::Reflect::set(&obj, &"top".into(), &placed.top.into())?;
            js_sys::Reflect::set(&obj, &"layer".into(), &layer.into())?;
            if let Some(tile) = handler.tiles().visible_tile(&placed.key) {
                let raster = js_sys::Uint8Array::from(tile.raster.as_slice());
                js_sys::Reflect::set(&obj, &"raster".into(), &raster)?;
            }
            out.push(&obj);
        }
        Ok(out)
    }

    /// Overlay, axis ticks, legend, status and the drag mode, as JSON.
    pub fn view_json(&mut self, id: &str) -> Result<String, JsValue> {
        let handler = self.canvas(id)?;
        let search = handler.search_state();
        let labels: Vec<_> = search.labels().iter()
            .map(|l| serde_json::json!({
                "item_id": l.item_id,
                "selected": l.selected,
                "text": l.text,
                "color": l.color(),
                "marker_size": l.marker_size(),
                "line_width": l.line_width(),
                "highlighted": l.highlighted,
            }))
            .collect();
        let view = serde_json::json!({
            "overlay": handler.view(),
            "foreground_visible": handler.foreground_visible(),
            "ticks": handler.visible_ticks(),
            "status": handler.status_text(),
            "labels": labels,
            "summary": search.summary(),
            "autoselect": search.autoselect(),
            "zoom_mode": handler.mouse().zoom_mode(),
        });
        Ok(view.to_string())
    }
}

impl Default for WebSession {
    fn default() -> Self {
        Self::new()
    }
}
