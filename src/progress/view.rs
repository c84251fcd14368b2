use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::models::Issue;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NodeStatus {
    Running,
    Success,
    Failed,
}

impl NodeStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Running => "running",
            Self::Success => "success",
            Self::Failed => "failed",
        }
    }
}

impl std::fmt::Display for NodeStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Latest known state of one workflow node.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeProgress {
    pub name: String,
    pub status: NodeStatus,
    pub started_at: Option<DateTime<Utc>>,
    pub duration_ms: Option<i64>,
    /// Number of `start` events seen for this node.
    pub attempts: u32,
}

/// Derived view of a run. Never stored; recomputed from the event buffer.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ProgressView {
    pub current_node: Option<String>,
    /// Every node seen, in first-seen order.
    pub nodes: Vec<NodeProgress>,
    pub nodes_completed: Vec<String>,
    pub nodes_failed: Vec<String>,
    pub nodes_in_progress: Vec<String>,
    pub total_expected_nodes: usize,
    pub progress_percentage: f64,
    pub total_duration_ms: Option<i64>,
    pub fix_iterations: usize,
    pub scores: BTreeMap<String, f64>,
    pub issues: Vec<Issue>,
    pub event_count: usize,
    pub is_running: bool,
    pub is_complete: bool,
    pub is_failed: bool,
}

impl ProgressView {
    /// Percentage rounded for display: 3 of 9 nodes shows as 33.
    pub fn progress_percent_rounded(&self) -> u8 {
        self.progress_percentage.round().clamp(0.0, 100.0) as u8
    }

    pub fn node(&self, name: &str) -> Option<&NodeProgress> {
        self.nodes.iter().find(|n| n.name == name)
    }

    /// Complete or failed; no further progress is expected.
    pub fn is_finished(&self) -> bool {
        self.is_complete || self.is_failed
    }

    pub fn status_label(&self) -> &'static str {
        if self.is_complete {
            "complete"
        } else if self.is_failed {
            "failed"
        } else if self.is_running {
            "running"
        } else {
            "idle"
        }
    }
}
