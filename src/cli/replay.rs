use std::path::Path;
use std::sync::Arc;

use tracing::{info, warn};

use songwatch::config::MonitorSettings;
use songwatch::display::renderer::{render_event, render_progress};
use songwatch::errors::SongwatchError;
use songwatch::models::WorkflowEvent;
use songwatch::progress::ProgressView;
use songwatch::stream::{NoUpstream, RunRegistry};

use crate::cli::commands::ReplayArgs;
use crate::cli::load_settings;

pub struct ReplayOutcome {
    pub run_id: String,
    pub events: Vec<WorkflowEvent>,
    pub view: ProgressView,
    pub skipped_lines: usize,
}

pub async fn handle_replay(args: ReplayArgs, quiet: bool) -> Result<(), SongwatchError> {
    let settings = load_settings(args.config.as_deref())
        .await?
        .with_overrides(None, args.max_events);

    let path = Path::new(&args.file);
    if !path.exists() {
        return Err(SongwatchError::Config(format!("Event log not found: {}", path.display())));
    }
    let content = tokio::fs::read_to_string(path).await?;

    let outcome = replay_lines(&content, args.run_id.as_deref(), &settings)?;
    info!(
        run_id = %outcome.run_id,
        buffered = outcome.events.len(),
        skipped = outcome.skipped_lines,
        "Replayed event log"
    );

    if args.json {
        println!("{}", serde_json::to_string_pretty(&outcome.view)?);
        return Ok(());
    }

    if args.events && !quiet {
        for event in &outcome.events {
            println!("{}", render_event(event));
        }
    }
    println!("{}", render_progress(&outcome.run_id, &outcome.view));
    Ok(())
}

/// Feed NDJSON lines through a run buffer exactly as live delivery would.
///
/// Lines that are blank are ignored; lines that fail validation are counted
/// and skipped. Without `run_id`, the first valid event's run is replayed.
pub fn replay_lines(
    content: &str,
    run_id: Option<&str>,
    settings: &MonitorSettings,
) -> Result<ReplayOutcome, SongwatchError> {
    let mut skipped_lines = 0;
    let mut events = Vec::new();
    for (index, line) in content.lines().enumerate() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        match WorkflowEvent::from_json(line) {
            Ok(event) => events.push(event),
            Err(e) => {
                warn!(line = index + 1, error = %e, "Skipping malformed event");
                skipped_lines += 1;
            }
        }
    }

    let run_id = match run_id {
        Some(id) => id.to_string(),
        None => events
            .first()
            .map(|e| e.run_id.clone())
            .ok_or_else(|| SongwatchError::Config("Event log contains no valid events".into()))?,
    };

    let registry = RunRegistry::new(settings.max_events, settings.total_expected_nodes, Arc::new(NoUpstream));
    let subscription = registry.subscribe(&run_id);
    for event in events {
        registry.dispatch(event);
    }

    Ok(ReplayOutcome {
        run_id,
        events: subscription.snapshot(),
        view: subscription.progress(),
        skipped_lines,
    })
}
