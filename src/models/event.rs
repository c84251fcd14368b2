use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;

/// Lifecycle phase of the node (or run) an event refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EventPhase {
    Start,
    End,
    Fail,
}

impl EventPhase {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Start => "start",
            Self::End => "end",
            Self::Fail => "fail",
        }
    }

    /// `end` and `fail` close a node; `start` opens one.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::End | Self::Fail)
    }
}

impl std::fmt::Display for EventPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Severity attached to an issue reported by a workflow node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IssueSeverity {
    Error,
    Warning,
    Info,
}

impl IssueSeverity {
    /// Lower rank means more severe.
    pub fn rank(&self) -> u8 {
        match self {
            IssueSeverity::Error => 0,
            IssueSeverity::Warning => 1,
            IssueSeverity::Info => 2,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Issue {
    pub severity: IssueSeverity,
    pub message: String,
}

/// One lifecycle notification for a workflow run.
///
/// Events are immutable once received. Their `timestamp` is only used for
/// display and duration math; arrival order is what orders them.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct WorkflowEvent {
    pub run_id: String,
    pub timestamp: String,
    pub phase: EventPhase,
    /// `None` for run-level events such as the overall start.
    pub node_name: Option<String>,
    pub data: Map<String, Value>,
    pub metrics: BTreeMap<String, f64>,
    pub issues: Vec<Issue>,
}

/// Reasons an inbound payload is rejected at the buffer boundary.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum MalformedEvent {
    #[error("event has no run_id")]
    MissingRunId,
    #[error("event has no phase")]
    MissingPhase,
    #[error("event has no node_name field")]
    MissingNodeName,
    #[error("event payload could not be decoded: {0}")]
    Undecodable(String),
}

/// Wire shape before validation. Every field is optional so that a missing
/// key can be told apart from a decode failure.
#[derive(Debug, Deserialize)]
struct RawEvent {
    #[serde(default, alias = "runId")]
    run_id: Option<String>,
    #[serde(default, alias = "ts")]
    timestamp: Option<String>,
    #[serde(default)]
    phase: Option<EventPhase>,
    #[serde(default, alias = "nodeName", deserialize_with = "field_present")]
    node_name: Option<Option<String>>,
    #[serde(default)]
    data: Option<Map<String, Value>>,
    #[serde(default, deserialize_with = "numeric_metrics")]
    metrics: BTreeMap<String, f64>,
    #[serde(default)]
    issues: Option<Vec<Issue>>,
}

/// Distinguishes an explicit `null` (`Some(None)`) from an absent key (`None`).
fn field_present<'de, D>(deserializer: D) -> Result<Option<Option<String>>, D::Error>
where
    D: Deserializer<'de>,
{
    Option::<String>::deserialize(deserializer).map(Some)
}

/// Keeps only the numeric entries of a metrics object.
fn numeric_metrics<'de, D>(deserializer: D) -> Result<BTreeMap<String, f64>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = Option::<Map<String, Value>>::deserialize(deserializer)?;
    Ok(raw
        .unwrap_or_default()
        .into_iter()
        .filter_map(|(k, v)| v.as_f64().map(|n| (k, n)))
        .collect())
}

impl WorkflowEvent {
    /// Validate a decoded JSON payload into an event.
    pub fn from_value(value: Value) -> Result<Self, MalformedEvent> {
        let raw: RawEvent = serde_json::from_value(value)
            .map_err(|e| MalformedEvent::Undecodable(e.to_string()))?;
        Self::from_raw(raw)
    }

    /// Decode and validate a single JSON document.
    pub fn from_json(text: &str) -> Result<Self, MalformedEvent> {
        let raw: RawEvent = serde_json::from_str(text)
            .map_err(|e| MalformedEvent::Undecodable(e.to_string()))?;
        Self::from_raw(raw)
    }

    fn from_raw(raw: RawEvent) -> Result<Self, MalformedEvent> {
        let run_id = raw
            .run_id
            .filter(|id| !id.is_empty())
            .ok_or(MalformedEvent::MissingRunId)?;
        let phase = raw.phase.ok_or(MalformedEvent::MissingPhase)?;
        let node_name = raw.node_name.ok_or(MalformedEvent::MissingNodeName)?;

        Ok(Self {
            run_id,
            timestamp: raw.timestamp.unwrap_or_default(),
            phase,
            node_name,
            data: raw.data.unwrap_or_default(),
            metrics: raw.metrics,
            issues: raw.issues.unwrap_or_default(),
        })
    }

    pub fn is_run_level(&self) -> bool {
        self.node_name.is_none()
    }

    pub fn node(&self) -> Option<&str> {
        self.node_name.as_deref()
    }

    /// Parsed `timestamp`, if it is valid RFC 3339.
    pub fn recorded_at(&self) -> Option<DateTime<Utc>> {
        DateTime::parse_from_rfc3339(&self.timestamp)
            .ok()
            .map(|t| t.with_timezone(&Utc))
    }

    /// Duration reported by the node itself in `data.duration_ms`.
    pub fn reported_duration_ms(&self) -> Option<i64> {
        let value = self.data.get("duration_ms")?;
        value
            .as_i64()
            .or_else(|| value.as_f64().map(|ms| ms.round() as i64))
    }

    /// Pretty-printed dump used by the "copy event" action.
    pub fn to_pretty_text(&self) -> String {
        serde_json::to_string_pretty(self).unwrap_or_else(|_| format!("{:?}", self))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parse_full_event() {
        let event = WorkflowEvent::from_value(json!({
            "type": "event",
            "run_id": "run-1",
            "ts": "2025-01-15T10:00:00.000Z",
            "node_name": "STYLE",
            "phase": "end",
            "data": { "duration_ms": 1200 },
            "metrics": { "hook_density": 0.8, "note": "ignored" },
            "issues": [{ "severity": "warning", "message": "tempo drift" }]
        }))
        .unwrap();

        assert_eq!(event.run_id, "run-1");
        assert_eq!(event.phase, EventPhase::End);
        assert_eq!(event.node(), Some("STYLE"));
        assert_eq!(event.reported_duration_ms(), Some(1200));
        assert_eq!(event.metrics.len(), 1);
        assert_eq!(event.metrics["hook_density"], 0.8);
        assert_eq!(event.issues[0].severity, IssueSeverity::Warning);
    }

    #[test]
    fn test_camel_case_aliases() {
        let event = WorkflowEvent::from_value(json!({
            "runId": "run-2",
            "timestamp": "2025-01-15T10:00:00Z",
            "nodeName": null,
            "phase": "start"
        }))
        .unwrap();
        assert_eq!(event.run_id, "run-2");
        assert!(event.is_run_level());
        assert!(event.recorded_at().is_some());
    }

    #[test]
    fn test_missing_phase_is_malformed() {
        let err = WorkflowEvent::from_value(json!({
            "run_id": "run-1",
            "node_name": "PLAN"
        }))
        .unwrap_err();
        assert_eq!(err, MalformedEvent::MissingPhase);
    }

    #[test]
    fn test_missing_run_id_is_malformed() {
        let err = WorkflowEvent::from_value(json!({
            "run_id": "",
            "node_name": "PLAN",
            "phase": "start"
        }))
        .unwrap_err();
        assert_eq!(err, MalformedEvent::MissingRunId);
    }

    #[test]
    fn test_absent_node_name_differs_from_null() {
        let err = WorkflowEvent::from_value(json!({
            "run_id": "run-1",
            "phase": "end"
        }))
        .unwrap_err();
        assert_eq!(err, MalformedEvent::MissingNodeName);
    }

    #[test]
    fn test_unknown_phase_is_undecodable() {
        let err = WorkflowEvent::from_json(
            r#"{"run_id":"r","node_name":"PLAN","phase":"paused"}"#,
        )
        .unwrap_err();
        assert!(matches!(err, MalformedEvent::Undecodable(_)));
    }

    #[test]
    fn test_invalid_timestamp_has_no_recorded_at() {
        let event = WorkflowEvent::from_json(
            r#"{"run_id":"r","node_name":"PLAN","phase":"start","ts":"yesterday"}"#,
        )
        .unwrap();
        assert!(event.recorded_at().is_none());
    }

    #[test]
    fn test_pretty_text_contains_fields() {
        let event = WorkflowEvent::from_json(
            r#"{"run_id":"r","node_name":"LYRICS","phase":"fail"}"#,
        )
        .unwrap();
        let text = event.to_pretty_text();
        assert!(text.contains("\"node_name\": \"LYRICS\""));
        assert!(text.contains("\"phase\": \"fail\""));
        assert!(text.contains('\n'));
    }
}
