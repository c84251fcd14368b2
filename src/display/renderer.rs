use console::style;

use crate::models::{ConnectionState, ConnectionStatusView, EventPhase, IssueSeverity, WorkflowEvent};
use crate::progress::{NodeStatus, ProgressView};
use crate::utils::formatting::{format_duration, format_percentage, format_score, format_signed_duration};
use crate::utils::truncation::truncate_error;

/// Render a workflow event as one styled log line.
pub fn render_event(event: &WorkflowEvent) -> String {
    let time = event
        .recorded_at()
        .map(|t| t.format("%H:%M:%S").to_string())
        .unwrap_or_else(|| event.timestamp.clone());

    let subject = match event.node() {
        Some(node) => style(node.to_string()).white().bold().to_string(),
        None => style("run").cyan().bold().to_string(),
    };

    let duration = event
        .reported_duration_ms()
        .map(|ms| format!(" ({})", format_signed_duration(ms)))
        .unwrap_or_default();

    let mut line = format!(
        "  {} {} {}{}",
        style(time).dim(),
        render_phase_marker(event.phase),
        subject,
        style(duration).dim(),
    );

    for issue in &event.issues {
        line.push_str(&format!(
            "\n      {} {}",
            render_issue_badge(&issue.severity),
            issue.message,
        ));
    }
    line
}

pub fn render_phase_marker(phase: EventPhase) -> String {
    match phase {
        EventPhase::Start => style("▶").yellow().to_string(),
        EventPhase::End => style("✓").green().to_string(),
        EventPhase::Fail => style("✗").red().bold().to_string(),
    }
}

/// Render an issue severity badge with appropriate colors.
pub fn render_issue_badge(severity: &IssueSeverity) -> String {
    match severity {
        IssueSeverity::Error => style(" ERROR ").on_red().white().bold().to_string(),
        IssueSeverity::Warning => style(" WARN ").yellow().bold().to_string(),
        IssueSeverity::Info => style(" INFO ").dim().to_string(),
    }
}

pub fn render_state_badge(state: ConnectionState) -> String {
    let label = state.as_str();
    match state {
        ConnectionState::Connected => style(label).green().bold().to_string(),
        ConnectionState::Connecting => style(label).yellow().to_string(),
        ConnectionState::Reconnecting => style(label).yellow().bold().to_string(),
        ConnectionState::Failed => style(label).red().bold().to_string(),
        ConnectionState::Disconnected => style(label).dim().to_string(),
    }
}

/// One-line connection status, with the reconnect countdown when waiting.
pub fn render_connection_line(status: &ConnectionStatusView, countdown: Option<u64>) -> String {
    let mut line = format!("{} {}", style("●").dim(), render_state_badge(status.state));

    if status.state == ConnectionState::Reconnecting {
        line.push_str(&format!(" (attempt {})", status.reconnect_attempt));
        if let Some(secs) = countdown {
            line.push_str(&format!(", retrying in {}s", secs));
        }
    }

    if let Some(error) = &status.error {
        if matches!(status.state, ConnectionState::Reconnecting | ConnectionState::Failed) {
            line.push_str(&format!(" {}", style(truncate_error(&error.to_string())).red().dim()));
        }
    }
    line
}

/// Multi-line connection details.
pub fn render_connection_status(status: &ConnectionStatusView) -> String {
    let stats = &status.stats;
    let latency = stats
        .latency_ms
        .map(|ms| format!("{}ms", ms))
        .unwrap_or_else(|| "n/a".to_string());

    let mut out = format!(
        "\n  {} {}\n  {} {}\n  {} {}\n  {} {}\n  {} {}\n  {} {}\n",
        style("State:").dim(),
        render_state_badge(status.state),
        style("Subscriptions:").dim(),
        style(stats.active_subscriptions.to_string()).white(),
        style("Events:").dim(),
        style(stats.events_processed.to_string()).white().bold(),
        style("Reconnections:").dim(),
        style(stats.reconnections.to_string()).white(),
        style("Uptime:").dim(),
        style(format_duration(stats.uptime_ms)).white(),
        style("Latency:").dim(),
        style(latency).white(),
    );

    if let Some(error) = &status.error {
        out.push_str(&format!(
            "  {} {}\n",
            style("Last error:").dim(),
            style(truncate_error(&error.to_string())).red(),
        ));
    }
    out
}

/// Per-node progress listing for a run.
pub fn render_progress(run_id: &str, view: &ProgressView) -> String {
    let mut out = String::new();
    out.push_str(&format!(
        "\n{} {} {} {}\n\n",
        style("Run").white().bold(),
        style(run_id).cyan(),
        render_run_label(view),
        style(format!(
            "{}/{} nodes, {}",
            view.nodes_completed.len(),
            view.total_expected_nodes,
            format_percentage(view.progress_percentage),
        ))
        .dim(),
    ));

    for node in &view.nodes {
        let duration = node
            .duration_ms
            .map(|ms| format!(" ({})", format_signed_duration(ms)))
            .unwrap_or_default();
        let attempts = if node.attempts > 1 {
            format!(" x{}", node.attempts)
        } else {
            String::new()
        };
        let line = match node.status {
            NodeStatus::Running => format!("  {} {}", style("⏳").yellow(), style(&node.name).yellow()),
            NodeStatus::Success => format!("  {} {}", style("✓").green(), style(&node.name).green()),
            NodeStatus::Failed => format!("  {} {}", style("✗").red(), style(&node.name).red()),
        };
        out.push_str(&format!("{}{}{}\n", line, style(duration).dim(), style(attempts).dim()));
    }

    if view.nodes.is_empty() {
        out.push_str(&format!("  {}\n", style("No events received yet.").dim()));
    }

    if view.fix_iterations > 0 {
        out.push_str(&format!(
            "\n  {} {}\n",
            style("Fix iterations:").dim(),
            style(view.fix_iterations.to_string()).white(),
        ));
    }

    if !view.scores.is_empty() {
        out.push_str(&format!("\n  {}\n", style("Scores:").dim()));
        for (name, value) in &view.scores {
            out.push_str(&format!("    {:<20} {}\n", name, style(format_score(*value)).white().bold()));
        }
    }

    if !view.issues.is_empty() {
        out.push_str(&format!("\n  {}\n", style("Issues:").dim()));
        for issue in &view.issues {
            out.push_str(&format!("    {} {}\n", render_issue_badge(&issue.severity), issue.message));
        }
    }

    if let Some(ms) = view.total_duration_ms {
        out.push_str(&format!(
            "\n  {} {}\n",
            style("Elapsed:").dim(),
            style(format_signed_duration(ms)).white(),
        ));
    }
    out
}

fn render_run_label(view: &ProgressView) -> String {
    let label = view.status_label();
    match label {
        "complete" => style(label).green().bold().to_string(),
        "failed" => style(label).red().bold().to_string(),
        "running" => style(label).yellow().to_string(),
        _ => style(label).dim().to_string(),
    }
}

/// Render the version info.
pub fn render_version() -> String {
    let version = env!("CARGO_PKG_VERSION");
    let git_hash = option_env!("GIT_HASH").unwrap_or("dev");
    let build_ts = option_env!("BUILD_TIMESTAMP").unwrap_or("unknown");

    format!(
        "{} {} ({}, built {})",
        style("songwatch").white().bold(),
        version,
        git_hash,
        build_ts,
    )
}
