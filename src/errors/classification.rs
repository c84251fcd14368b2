use super::types::SongwatchError;

#[derive(Debug, Clone)]
pub struct ErrorClassification {
    pub error_type: &'static str,
    pub retryable: bool,
}

impl SongwatchError {
    /// Classify this error to determine its type and whether a reconnect
    /// attempt may follow it.
    pub fn classify(&self) -> ErrorClassification {
        match self {
            // Retryable errors
            SongwatchError::Transport(_) => ErrorClassification {
                error_type: "TransportError",
                retryable: true,
            },
            SongwatchError::Timeout(_) => ErrorClassification {
                error_type: "TimeoutError",
                retryable: true,
            },
            SongwatchError::Closed(_) => ErrorClassification {
                error_type: "ClosedError",
                retryable: true,
            },
            SongwatchError::Protocol(_) => ErrorClassification {
                error_type: "ProtocolError",
                retryable: true,
            },
            SongwatchError::Io(_) => ErrorClassification {
                error_type: "IoError",
                retryable: true,
            },
            SongwatchError::Json(_) => ErrorClassification {
                error_type: "JsonError",
                retryable: true,
            },

            // Non-retryable errors
            SongwatchError::Authentication(_) => ErrorClassification {
                error_type: "AuthenticationError",
                retryable: false,
            },
            SongwatchError::Config(_) => ErrorClassification {
                error_type: "ConfigError",
                retryable: false,
            },
            SongwatchError::Yaml(_) => ErrorClassification {
                error_type: "YamlError",
                retryable: false,
            },
        }
    }
}
