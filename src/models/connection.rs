use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::errors::SongwatchError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum ConnectionState {
    #[default]
    Disconnected,
    Connecting,
    Connected,
    Reconnecting,
    Failed,
}

impl ConnectionState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Disconnected => "disconnected",
            Self::Connecting => "connecting",
            Self::Connected => "connected",
            Self::Reconnecting => "reconnecting",
            Self::Failed => "failed",
        }
    }

    /// States from which `connect()` starts a new attempt.
    pub fn accepts_connect(&self) -> bool {
        matches!(self, Self::Disconnected | Self::Failed | Self::Reconnecting)
    }
}

impl std::fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Display-friendly snapshot of the last transport failure.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConnectionError {
    pub message: String,
    pub cause: Option<String>,
    pub error_type: String,
    pub retryable: bool,
}

impl ConnectionError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            cause: None,
            error_type: "TransportError".to_string(),
            retryable: true,
        }
    }

    pub fn with_cause(mut self, cause: impl Into<String>) -> Self {
        self.cause = Some(cause.into());
        self
    }
}

impl From<&SongwatchError> for ConnectionError {
    fn from(err: &SongwatchError) -> Self {
        let class = err.classify();
        let cause = match err {
            SongwatchError::Io(e) => Some(e.kind().to_string()),
            SongwatchError::Json(e) => Some(format!("line {} column {}", e.line(), e.column())),
            _ => None,
        };
        Self {
            message: err.to_string(),
            cause,
            error_type: class.error_type.to_string(),
            retryable: class.retryable,
        }
    }
}

impl std::fmt::Display for ConnectionError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.cause {
            Some(cause) => write!(f, "{} ({})", self.message, cause),
            None => f.write_str(&self.message),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ConnectionStats {
    pub active_subscriptions: usize,
    pub events_processed: u64,
    pub reconnections: u64,
    /// Time spent in the current `connected` session.
    pub uptime_ms: u64,
    pub latency_ms: Option<u64>,
}

/// Read-only snapshot handed to observers on every state change.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ConnectionStatusView {
    pub state: ConnectionState,
    pub reconnect_attempt: u32,
    pub last_connected: Option<DateTime<Utc>>,
    pub last_disconnected: Option<DateTime<Utc>>,
    pub error: Option<ConnectionError>,
    pub stats: ConnectionStats,
}
