use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use serde_json::json;

use songwatch::models::WorkflowEvent;
use songwatch::progress::{project, NodeStatus};
use songwatch::stream::{ChangeKind, NoUpstream, RunRegistry};

fn event(run_id: &str, ts: &str, phase: &str, node: Option<&str>) -> WorkflowEvent {
    WorkflowEvent::from_value(json!({
        "run_id": run_id,
        "timestamp": ts,
        "phase": phase,
        "node_name": node,
    }))
    .unwrap()
}

fn registry(max_events: usize) -> Arc<RunRegistry> {
    RunRegistry::new(max_events, 9, Arc::new(NoUpstream))
}

#[test]
fn test_buffer_keeps_most_recent_suffix() {
    let registry = registry(5);
    let subscription = registry.subscribe("run-1");

    let all: Vec<WorkflowEvent> = (0..12)
        .map(|i| event("run-1", &format!("2025-01-15T10:00:{:02}Z", i), "start", Some(&format!("N{}", i))))
        .collect();
    for e in &all {
        registry.dispatch(e.clone());
    }

    let snapshot = subscription.snapshot();
    assert_eq!(snapshot.len(), 5);
    assert_eq!(snapshot.as_slice(), &all[7..]);
}

#[test]
fn test_one_notification_per_append() {
    let registry = registry(2);
    let subscription = registry.subscribe("run-1");
    let notified = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&notified);
    let _observer = subscription.on_change(move |change| {
        if let ChangeKind::Appended { evicted, .. } = change.kind {
            assert!(evicted <= 1);
        }
        counter.fetch_add(1, Ordering::SeqCst);
    });

    for i in 0..4 {
        registry.dispatch(event("run-1", "2025-01-15T10:00:00Z", "start", Some(&format!("N{}", i))));
    }
    assert_eq!(notified.load(Ordering::SeqCst), 4);
}

#[test]
fn test_other_runs_are_ignored() {
    let registry = registry(10);
    let subscription = registry.subscribe("run-1");

    assert!(!registry.dispatch(event("run-2", "2025-01-15T10:00:00Z", "start", Some("PLAN"))));
    assert!(subscription.is_empty());
}

#[test]
fn test_malformed_events_never_reach_the_buffer() {
    let registry = registry(10);
    let subscription = registry.subscribe("run-1");

    let lines = [
        r#"{"run_id":"run-1","timestamp":"2025-01-15T10:00:00Z","phase":"start","node_name":"PLAN"}"#,
        r#"{"run_id":"run-1","timestamp":"2025-01-15T10:00:01Z","phase":"end"}"#,
        r#"{"run_id":"run-1","timestamp":"2025-01-15T10:00:01Z","node_name":"PLAN"}"#,
        r#"{"timestamp":"2025-01-15T10:00:01Z","phase":"end","node_name":"PLAN"}"#,
    ];
    for line in lines {
        if let Ok(e) = WorkflowEvent::from_json(line) {
            registry.dispatch(e);
        }
    }

    assert_eq!(subscription.len(), 1);
    let view = subscription.progress();
    assert!(view.nodes_completed.is_empty());
    assert_eq!(view.nodes_in_progress, vec!["PLAN".to_string()]);
}

#[test]
fn test_resubscribe_after_release_starts_empty() {
    let registry = registry(10);
    let first = registry.subscribe("run-1");
    registry.dispatch(event("run-1", "2025-01-15T10:00:00Z", "start", Some("PLAN")));
    assert_eq!(first.len(), 1);
    first.unsubscribe();
    assert_eq!(registry.active_count(), 0);

    let second = registry.subscribe("run-1");
    assert!(second.is_empty());
    assert_eq!(second.progress().event_count, 0);
}

#[test]
fn test_shared_buffer_survives_partial_unsubscribe() {
    let registry = registry(10);
    let a = registry.subscribe("run-1");
    let b = registry.subscribe("run-1");
    registry.dispatch(event("run-1", "2025-01-15T10:00:00Z", "start", Some("PLAN")));

    drop(a);
    assert_eq!(b.len(), 1);
    assert_eq!(registry.subscriber_count("run-1"), 1);
}

#[test]
fn test_clear_keeps_subscription() {
    let registry = registry(10);
    let subscription = registry.subscribe("run-1");
    registry.dispatch(event("run-1", "2025-01-15T10:00:00Z", "start", Some("PLAN")));

    subscription.clear();
    assert!(subscription.is_empty());
    registry.dispatch(event("run-1", "2025-01-15T10:00:01Z", "end", Some("PLAN")));
    assert_eq!(subscription.len(), 1);
}

#[test]
fn test_full_run_projection() {
    let registry = registry(100);
    let subscription = registry.subscribe("run-1");

    let script = [
        ("2025-01-15T10:00:00.000Z", "start", None),
        ("2025-01-15T10:00:00.000Z", "start", Some("PLAN")),
        ("2025-01-15T10:00:05.000Z", "end", Some("PLAN")),
        ("2025-01-15T10:00:05.000Z", "start", Some("STYLE")),
        ("2025-01-15T10:00:20.000Z", "end", Some("STYLE")),
        ("2025-01-15T10:00:20.000Z", "start", Some("VALIDATE")),
        ("2025-01-15T10:00:30.000Z", "fail", Some("VALIDATE")),
        ("2025-01-15T10:00:30.000Z", "start", Some("FIX")),
        ("2025-01-15T10:00:40.000Z", "end", Some("FIX")),
        ("2025-01-15T10:00:40.000Z", "start", Some("VALIDATE")),
        ("2025-01-15T10:00:45.000Z", "end", Some("VALIDATE")),
        ("2025-01-15T10:02:30.000Z", "end", None),
    ];
    for (ts, phase, node) in script {
        registry.dispatch(event("run-1", ts, phase, node));
    }

    let view = subscription.progress();
    assert_eq!(view.event_count, 12);
    assert_eq!(view.fix_iterations, 1);
    assert_eq!(view.total_duration_ms, Some(150_000));
    assert_eq!(view.nodes_completed.len(), 4);
    assert!(view.nodes_failed.is_empty());
    assert!(view.is_complete);
    assert!(!view.is_failed);
    assert!(!view.is_running);
    assert_eq!(view.current_node, None);

    let validate = view.node("VALIDATE").unwrap();
    assert_eq!(validate.status, NodeStatus::Success);
    assert_eq!(validate.attempts, 2);
    assert_eq!(validate.duration_ms, Some(5_000));

    let snapshot = subscription.snapshot();
    assert_eq!(project(&snapshot, 9), view);
}

#[test]
fn test_progress_matches_direct_projection_after_eviction() {
    let registry = registry(3);
    let subscription = registry.subscribe("run-1");
    for node in ["PLAN", "STYLE", "LYRICS", "PRODUCER"] {
        registry.dispatch(event("run-1", "2025-01-15T10:00:00Z", "end", Some(node)));
    }

    let view = subscription.progress();
    assert_eq!(view.nodes_completed, vec!["STYLE", "LYRICS", "PRODUCER"]);
    assert_eq!(view.progress_percent_rounded(), 33);
}

#[test]
fn test_copy_event_is_pretty_json() {
    let registry = registry(10);
    let subscription = registry.subscribe("run-1");
    let e = event("run-1", "2025-01-15T10:00:00Z", "start", Some("PLAN"));

    let text = subscription.copy_event(&e);
    let parsed: serde_json::Value = serde_json::from_str(&text).unwrap();
    assert_eq!(parsed["node_name"], "PLAN");
    assert!(text.contains('\n'));
}
