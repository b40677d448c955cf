pub mod flow;
pub mod message;

use crate::error::EngineError;
use message::Request;

/// Outbound side of the backend session.
///
/// Delivery, framing and binary attachments belong to the host; the engine
/// only hands over fully built requests.
pub trait Transport {
    fn send(&mut self, request: &Request) -> Result<(), EngineError>;
}

/// Transport that keeps every request, for tests and offline replay.
#[derive(Debug, Default)]
pub struct RecordingTransport {
    pub sent: Vec<Request>,
    /// When set, every send fails with this message.
    pub fail_with: Option<String>,
}

impl RecordingTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn take(&mut self) -> Vec<Request> {
        std::mem::take(&mut self.sent)
    }
}

impl Transport for RecordingTransport {
    fn send(&mut self, request: &Request) -> Result<(), EngineError> {
        if let Some(msg) = &self.fail_with {
            return Err(EngineError::Transport(msg.clone()));
        }
        self.sent.push(request.clone());
        Ok(())
    }
}
