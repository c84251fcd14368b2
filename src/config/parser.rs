use std::path::Path;
use crate::errors::SongwatchError;
use super::types::SongwatchConfig;
use super::schema::CONFIG_SCHEMA;
use tracing::warn;

const MAX_CONFIG_BYTES: u64 = 1_048_576;

pub async fn parse_config(path: &Path) -> Result<SongwatchConfig, SongwatchError> {
    if !path.exists() {
        return Err(SongwatchError::Config(format!("Config file not found: {}", path.display())));
    }

    let metadata = tokio::fs::metadata(path).await?;
    if metadata.len() > MAX_CONFIG_BYTES {
        return Err(SongwatchError::Config("Config file exceeds 1MB limit".into()));
    }

    let content = tokio::fs::read_to_string(path).await?;
    parse_config_str(&content)
}

/// Parse and validate config text.
pub fn parse_config_str(content: &str) -> Result<SongwatchConfig, SongwatchError> {
    let yaml: serde_yaml::Value = serde_yaml::from_str(content)?;

    // An empty file is a valid, all-defaults config
    if yaml.is_null() {
        return Ok(SongwatchConfig::default());
    }

    // JSON Schema validation
    validate_schema(&yaml)?;

    // Parse into typed config
    let config: SongwatchConfig = serde_yaml::from_value(yaml)?;

    // Semantic conflict detection
    validate_conflicts(&config)?;

    Ok(config)
}

/// Validate config against the JSON schema for structural correctness.
fn validate_schema(yaml: &serde_yaml::Value) -> Result<(), SongwatchError> {
    // Convert YAML value to JSON for schema validation
    let json_str = serde_json::to_string(yaml)
        .map_err(|e| SongwatchError::Config(format!("Config conversion error: {}", e)))?;
    let json_value: serde_json::Value = serde_json::from_str(&json_str)
        .map_err(|e| SongwatchError::Config(format!("Config conversion error: {}", e)))?;

    let compiled = jsonschema::JSONSchema::compile(&CONFIG_SCHEMA)
        .map_err(|e| SongwatchError::Config(format!("Schema compilation error: {}", e)))?;

    let result = compiled.validate(&json_value);
    if let Err(errors) = result {
        let messages: Vec<String> = errors
            .map(|e| format!("{} at {}", e, e.instance_path))
            .collect();
        // Advisory only; typed parsing and conflict checks below are authoritative
        for msg in &messages {
            warn!(validation_error = %msg, "Config schema warning");
        }
    }

    Ok(())
}

/// Detect semantic conflicts in the parsed configuration.
fn validate_conflicts(config: &SongwatchConfig) -> Result<(), SongwatchError> {
    if let Some(conn) = &config.connection {
        if let (Some(base), Some(max)) = (conn.base_delay_ms, conn.max_delay_ms) {
            if base > max {
                return Err(SongwatchError::Config(format!(
                    "base_delay_ms ({}) must not exceed max_delay_ms ({})",
                    base, max
                )));
            }
        }

        if let Some(url) = &conn.url {
            if !(url.starts_with("ws://") || url.starts_with("wss://")) {
                return Err(SongwatchError::Config(format!(
                    "connection.url must use ws:// or wss://, got '{}'",
                    url
                )));
            }
        }

        for (name, value) in [
            ("base_delay_ms", conn.base_delay_ms),
            ("max_delay_ms", conn.max_delay_ms),
            ("connect_timeout_ms", conn.connect_timeout_ms),
            ("ping_interval_ms", conn.ping_interval_ms),
        ] {
            if value == Some(0) {
                return Err(SongwatchError::Config(format!("connection.{} must be positive", name)));
            }
        }

        if conn.max_reconnect_attempts == Some(0) {
            warn!("max_reconnect_attempts is 0; reconnecting will never give up");
        }
    }

    if let Some(stream) = &config.stream {
        if stream.max_events == Some(0) {
            return Err(SongwatchError::Config("stream.max_events must be at least 1".into()));
        }
    }

    if let Some(workflow) = &config.workflow {
        if workflow.total_expected_nodes == Some(0) {
            return Err(SongwatchError::Config("workflow.total_expected_nodes must be at least 1".into()));
        }
    }

    Ok(())
}
