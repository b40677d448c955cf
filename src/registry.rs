//! Canvases of one session, by id.

use std::collections::HashMap;
use std::fmt;

use crate::config::EngineConfig;
use crate::error::{EngineError, Result};
use crate::handler::TileHandler;
use crate::net::Transport;

/// A canvas id: `[A-Za-z][A-Za-z0-9_-]*`.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CanvasId(String);

impl CanvasId {
    pub fn parse(id: &str) -> Result<Self> {
        let invalid = |reason| EngineError::InvalidCanvasId { id: id.to_string(), reason };
        let mut chars = id.chars();
        match chars.next() {
            None => return Err(invalid("empty")),
            Some(c) if !c.is_ascii_alphabetic() => return Err(invalid("must start with a letter")),
            Some(_) => {}
        }
        if !chars.all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-') {
            return Err(invalid("only letters, digits, '_' and '-' are allowed"));
        }
        Ok(Self(id.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CanvasId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

pub struct CanvasRegistry<T: Transport> {
    handlers: HashMap<CanvasId, TileHandler<T>>,
}

impl<T: Transport> Default for CanvasRegistry<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Transport> CanvasRegistry<T> {
    pub fn new() -> Self {
        Self { handlers: HashMap::new() }
    }

    /// Register a new canvas. Its handler does not talk to the backend
    /// until the host calls `start`.
    pub fn create(&mut self, id: &str, config: EngineConfig, transport: T, now: f64) -> Result<&mut TileHandler<T>> {
        let id = CanvasId::parse(id)?;
        if self.handlers.contains_key(&id) {
            return Err(EngineError::DuplicateCanvas(id.to_string()));
        }
        let handler = TileHandler::new(config, transport, now)?;
        log::info!("Registered canvas {id}");
        Ok(self.handlers.entry(id).or_insert(handler))
    }

    pub fn get(&self, id: &str) -> Option<&TileHandler<T>> {
        let id = CanvasId::parse(id).ok()?;
        self.handlers.get(&id)
    }

    pub fn get_mut(&mut self, id: &str) -> Option<&mut TileHandler<T>> {
        let id = CanvasId::parse(id).ok()?;
        self.handlers.get_mut(&id)
    }

    /// Send `cell_fini` and forget the canvas. Returns false for unknown ids.
    pub fn dispose(&mut self, id: &str) -> bool {
        let Ok(id) = CanvasId::parse(id) else { return false };
        let Some(mut handler) = self.handlers.remove(&id) else { return false };
        handler.dispose();
        log::info!("Disposed canvas {id}");
        true
    }

    pub fn ids(&self) -> impl Iterator<Item = &CanvasId> {
        self.handlers.keys()
    }

    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }

    /// Earliest deadline over all canvases.
    pub fn next_deadline(&self) -> Option<f64> {
        crate::timer::earliest(self.handlers.values().map(|h| h.next_deadline()))
    }

    pub fn tick(&mut self, now: f64) {
        for handler in self.handlers.values_mut() {
            handler.tick(now);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::net::message::Request;
    use crate::net::RecordingTransport;

    #[test]
    fn test_canvas_id_rules() {
        assert!(CanvasId::parse("cell-1_a").is_ok());
        assert!(CanvasId::parse("").is_err(), "empty");
        assert!(CanvasId::parse("1abc").is_err(), "leading digit");
        assert!(CanvasId::parse("a b").is_err(), "space");
        assert!(matches!(
            CanvasId::parse("x\"]"),
            Err(EngineError::InvalidCanvasId { .. })
        ));
    }

    #[test]
    fn test_create_get_dispose() {
        let mut reg = CanvasRegistry::new();
        reg.create("c1", EngineConfig::default(), RecordingTransport::new(), 0.0).unwrap();
        assert!(matches!(
            reg.create("c1", EngineConfig::default(), RecordingTransport::new(), 0.0),
            Err(EngineError::DuplicateCanvas(_))
        ));
        assert!(reg.create("9", EngineConfig::default(), RecordingTransport::new(), 0.0).is_err());
        assert_eq!(reg.len(), 1);

        reg.get_mut("c1").unwrap().start(512, 512);
        let sent = reg.get_mut("c1").unwrap().transport_mut().take();
        assert_eq!(sent.iter().map(Request::kind).collect::<Vec<_>>(), vec!["canvas_config_req", "search"]);

        assert!(reg.dispose("c1"));
        assert!(!reg.dispose("c1"), "already gone");
        assert!(reg.is_empty());
    }

    #[test]
    fn test_bad_config_is_rejected() {
        let mut reg: CanvasRegistry<RecordingTransport> = CanvasRegistry::new();
        let config = EngineConfig { tile_size: 0, ..EngineConfig::default() };
        assert!(matches!(
            reg.create("c1", config, RecordingTransport::new(), 0.0),
            Err(EngineError::InvalidConfig { .. })
        ));
        assert!(reg.get("c1").is_none());
    }
}
