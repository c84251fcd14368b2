use serde::{Deserialize, Serialize};

/// On-disk configuration. Every field is optional; `MonitorSettings`
/// fills the gaps with defaults.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
pub struct SongwatchConfig {
    pub connection: Option<ConnectionConfig>,
    pub stream: Option<StreamConfig>,
    pub workflow: Option<WorkflowConfig>,
}

#[derive(Debug, Clone, Deserialize, Serialize, Default)]
pub struct ConnectionConfig {
    pub url: Option<String>,
    pub base_delay_ms: Option<u64>,
    pub max_delay_ms: Option<u64>,
    /// 0 keeps retrying forever.
    pub max_reconnect_attempts: Option<u32>,
    pub connect_timeout_ms: Option<u64>,
    pub ping_interval_ms: Option<u64>,
    pub jitter_ms: Option<u64>,
}

#[derive(Debug, Clone, Deserialize, Serialize, Default)]
pub struct StreamConfig {
    pub max_events: Option<usize>,
}

#[derive(Debug, Clone, Deserialize, Serialize, Default)]
pub struct WorkflowConfig {
    pub total_expected_nodes: Option<usize>,
}
