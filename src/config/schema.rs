use serde_json::{json, Value};
use std::sync::LazyLock;

pub static CONFIG_SCHEMA: LazyLock<Value> = LazyLock::new(|| {
    json!({
        "$schema": "http://json-schema.org/draft-07/schema#",
        "type": "object",
        "properties": {
            "connection": {
                "type": "object",
                "properties": {
                    "url": { "type": "string", "pattern": "^wss?://" },
                    "base_delay_ms": { "type": "integer", "minimum": 1 },
                    "max_delay_ms": { "type": "integer", "minimum": 1 },
                    "max_reconnect_attempts": { "type": "integer", "minimum": 0 },
                    "connect_timeout_ms": { "type": "integer", "minimum": 1 },
                    "ping_interval_ms": { "type": "integer", "minimum": 1 },
                    "jitter_ms": { "type": "integer", "minimum": 0 }
                },
                "additionalProperties": false
            },
            "stream": {
                "type": "object",
                "properties": {
                    "max_events": { "type": "integer", "minimum": 1 }
                },
                "additionalProperties": false
            },
            "workflow": {
                "type": "object",
                "properties": {
                    "total_expected_nodes": { "type": "integer", "minimum": 1 }
                },
                "additionalProperties": false
            }
        }
    })
});
