use std::collections::{BTreeMap, HashMap};

use chrono::{DateTime, Utc};
use tracing::warn;

use crate::models::{EventPhase, WorkflowEvent};
use super::view::{NodeProgress, NodeStatus, ProgressView};

/// Size of the known workflow graph (PLAN through REVIEW).
pub const DEFAULT_TOTAL_EXPECTED_NODES: usize = 9;

/// Node whose completions count as fix iterations.
pub const FIX_NODE: &str = "FIX";

struct NodeTrack {
    progress: NodeProgress,
    /// Arrival index of the latest `start`, for the running-node tie-break.
    started_seq: Option<usize>,
}

/// Project an ordered event sequence into a `ProgressView`.
///
/// Pure and deterministic: the same sequence always yields the same view.
/// Events are processed strictly in the order given; timestamps are only used
/// for durations.
pub fn project<'a, I>(events: I, total_expected_nodes: usize) -> ProgressView
where
    I: IntoIterator<Item = &'a WorkflowEvent>,
{
    let mut tracks: Vec<NodeTrack> = Vec::new();
    let mut index: HashMap<String, usize> = HashMap::new();
    let mut scores = BTreeMap::new();
    let mut issues = Vec::new();
    let mut fix_iterations = 0;
    let mut event_count = 0;
    let mut first_at: Option<DateTime<Utc>> = None;
    let mut last_at: Option<DateTime<Utc>> = None;
    let mut run_succeeded = false;
    let mut run_failed = false;

    for (seq, event) in events.into_iter().enumerate() {
        event_count += 1;
        let recorded_at = event.recorded_at();
        if let Some(at) = recorded_at {
            first_at.get_or_insert(at);
            last_at = Some(at);
        }

        match event.node() {
            Some(name) => {
                let slot = *index.entry(name.to_string()).or_insert_with(|| {
                    tracks.push(NodeTrack {
                        progress: NodeProgress {
                            name: name.to_string(),
                            status: NodeStatus::Running,
                            started_at: None,
                            duration_ms: None,
                            attempts: 0,
                        },
                        started_seq: None,
                    });
                    tracks.len() - 1
                });
                let track = &mut tracks[slot];

                match event.phase {
                    EventPhase::Start => {
                        track.progress.status = NodeStatus::Running;
                        track.progress.started_at = recorded_at;
                        track.progress.duration_ms = None;
                        track.progress.attempts += 1;
                        track.started_seq = Some(seq);
                    }
                    EventPhase::End | EventPhase::Fail => {
                        track.progress.status = if event.phase == EventPhase::End {
                            NodeStatus::Success
                        } else {
                            NodeStatus::Failed
                        };
                        track.progress.duration_ms = event.reported_duration_ms().or_else(|| {
                            let started = track.progress.started_at?;
                            Some((recorded_at? - started).num_milliseconds())
                        });
                    }
                }

                if name == FIX_NODE && event.phase == EventPhase::End {
                    fix_iterations += 1;
                }
            }
            None => match event.phase {
                EventPhase::Start => {
                    run_succeeded = false;
                    run_failed = false;
                }
                EventPhase::End => run_succeeded = true,
                EventPhase::Fail => run_failed = true,
            },
        }

        if event.phase == EventPhase::End {
            for (key, value) in &event.metrics {
                scores.insert(key.clone(), *value);
            }
        }
        issues.extend(event.issues.iter().cloned());
    }

    let names_with = |status: NodeStatus| -> Vec<String> {
        tracks
            .iter()
            .filter(|t| t.progress.status == status)
            .map(|t| t.progress.name.clone())
            .collect()
    };
    let nodes_completed = names_with(NodeStatus::Success);
    let nodes_failed = names_with(NodeStatus::Failed);
    let nodes_in_progress = names_with(NodeStatus::Running);

    if nodes_in_progress.len() > 1 {
        warn!(
            running = ?nodes_in_progress,
            "Multiple workflow nodes running at once; using the most recently started"
        );
    }
    let current_node = tracks
        .iter()
        .filter(|t| t.progress.status == NodeStatus::Running)
        .max_by_key(|t| t.started_seq)
        .map(|t| t.progress.name.clone());

    let progress_percentage = if total_expected_nodes == 0 {
        0.0
    } else {
        (nodes_completed.len() as f64 / total_expected_nodes as f64 * 100.0).clamp(0.0, 100.0)
    };

    let total_duration_ms = match (first_at, last_at) {
        (Some(first), Some(last)) if event_count >= 2 => Some((last - first).num_milliseconds()),
        _ => None,
    };

    let any_running = !nodes_in_progress.is_empty();
    let is_failed = run_failed || !nodes_failed.is_empty();
    let graph_done = total_expected_nodes > 0 && nodes_completed.len() >= total_expected_nodes;
    let is_complete = !is_failed && !any_running && (run_succeeded || graph_done);
    let is_running = !is_complete && !is_failed && event_count > 0;

    ProgressView {
        current_node,
        nodes: tracks.into_iter().map(|t| t.progress).collect(),
        nodes_completed,
        nodes_failed,
        nodes_in_progress,
        total_expected_nodes,
        progress_percentage,
        total_duration_ms,
        fix_iterations,
        scores,
        issues,
        event_count,
        is_running,
        is_complete,
        is_failed,
    }
}
