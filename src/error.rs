use thiserror::Error;

pub type Result<T> = std::result::Result<T, EngineError>;

#[derive(Debug, Error)]
pub enum EngineError {
    /// Canvas ids end up inside element ids and selectors, so only a
    /// conservative character set is accepted.
    #[error("invalid canvas id {id:?}: {reason}")]
    InvalidCanvasId { id: String, reason: &'static str },

    #[error("invalid engine config: {message}")]
    InvalidConfig { message: String },

    #[error("malformed message: {0}")]
    Json(#[from] serde_json::Error),

    #[error("tile {key} is missing attachment #{index}")]
    MissingAttachment { key: String, index: usize },

    #[error("tile {key} hit-test buffer has {got} bytes, expected {expected}")]
    BadHitMap { key: String, got: usize, expected: usize },

    #[error("transport failure: {0}")]
    Transport(String),

    #[error("canvas {0} is already registered")]
    DuplicateCanvas(String),
}

impl EngineError {
    pub fn config(message: impl Into<String>) -> Self {
        Self::InvalidConfig { message: message.into() }
    }
}
