use async_trait::async_trait;
use serde::Serialize;
use serde_json::Value;

use crate::errors::SongwatchError;

/// Messages the client sends upstream.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum OutboundMessage {
    Subscribe { run_id: String },
    Unsubscribe { run_id: String },
    Ping { nonce: u64 },
}

impl OutboundMessage {
    pub fn to_json(&self) -> Result<String, SongwatchError> {
        Ok(serde_json::to_string(self)?)
    }
}

/// Messages delivered by a transport session.
#[derive(Debug, Clone, PartialEq)]
pub enum InboundMessage {
    /// Candidate workflow event; validated at the buffer boundary.
    Event(Value),
    Pong { nonce: Option<u64> },
    /// Frame that could not be decoded at all.
    Malformed(String),
    /// Well-formed control frame this client has no use for.
    Ignored,
}

impl InboundMessage {
    /// Decode one text frame. Frames without a `type` are treated as events.
    pub fn from_text(text: &str) -> Self {
        let value: Value = match serde_json::from_str(text) {
            Ok(v) => v,
            Err(e) => return Self::Malformed(e.to_string()),
        };
        if !value.is_object() {
            return Self::Malformed("frame is not a JSON object".to_string());
        }

        match value.get("type").and_then(Value::as_str) {
            None | Some("event") | Some("workflow_event") => Self::Event(value),
            Some("pong") => Self::Pong {
                nonce: value.get("nonce").and_then(Value::as_u64),
            },
            Some(_) => Self::Ignored,
        }
    }
}

/// Opens sessions to the workflow event source.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn connect(&self) -> Result<Box<dyn TransportSession>, SongwatchError>;

    /// Human-readable endpoint, used in logs.
    fn endpoint(&self) -> String;
}

/// One live connection. Owned exclusively by the connection driver.
#[async_trait]
pub trait TransportSession: Send {
    async fn send(&mut self, message: OutboundMessage) -> Result<(), SongwatchError>;

    /// Next inbound message, or `None` once the peer has closed the session.
    /// Must be cancel-safe: the driver polls it inside `select!`.
    async fn recv(&mut self) -> Option<Result<InboundMessage, SongwatchError>>;

    async fn close(&mut self) -> Result<(), SongwatchError> {
        Ok(())
    }
}
