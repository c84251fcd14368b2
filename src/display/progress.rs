use std::time::Duration;

use console::style;
use indicatif::{MultiProgress, ProgressBar, ProgressDrawTarget, ProgressStyle};

use crate::models::{ConnectionState, ConnectionStatusView};
use crate::progress::ProgressView;
use super::renderer::render_connection_line;

/// Live terminal view for `watch`: a node bar for the run plus a spinner
/// line carrying the connection state and reconnect countdown.
pub struct WatchProgress {
    multi: MultiProgress,
    node_bar: ProgressBar,
    status_bar: ProgressBar,
    connection: ConnectionStatusView,
    countdown: Option<u64>,
}

impl WatchProgress {
    pub fn new(run_id: &str, total_expected_nodes: usize, hidden: bool) -> Self {
        let multi = if hidden {
            MultiProgress::with_draw_target(ProgressDrawTarget::hidden())
        } else {
            MultiProgress::new()
        };

        let node_bar = multi.add(ProgressBar::new(total_expected_nodes as u64));
        node_bar.set_style(
            ProgressStyle::default_bar()
                .template("  {bar:30.cyan/dark_gray} {pos}/{len} nodes | {msg}")
                .unwrap_or_else(|_| ProgressStyle::default_bar())
                .progress_chars("█▓░"),
        );
        node_bar.set_message(format!("Waiting for run {}", run_id));

        let status_bar = multi.add(ProgressBar::new_spinner());
        status_bar.set_style(
            ProgressStyle::default_spinner()
                .template("  {spinner:.cyan} {msg}")
                .unwrap_or_else(|_| ProgressStyle::default_spinner()),
        );
        status_bar.enable_steady_tick(Duration::from_millis(120));

        let progress = Self {
            multi,
            node_bar,
            status_bar,
            connection: ConnectionStatusView::default(),
            countdown: None,
        };
        progress.redraw_status();
        progress
    }

    /// Reflect a fresh projection of the run.
    pub fn update_progress(&self, view: &ProgressView) {
        self.node_bar.set_length(view.total_expected_nodes as u64);
        self.node_bar
            .set_position(view.nodes_completed.len().min(view.total_expected_nodes) as u64);

        let message = match (&view.current_node, view.is_failed, view.is_complete) {
            (_, true, _) => {
                let failed = view.nodes_failed.join(", ");
                if failed.is_empty() {
                    "Run failed".to_string()
                } else {
                    format!("Failed at {}", failed)
                }
            }
            (_, _, true) => "Run complete".to_string(),
            (Some(node), _, _) => format!("Running {}", node),
            (None, _, _) => "Waiting for next node".to_string(),
        };
        self.node_bar.set_message(message);
    }

    pub fn update_connection(&mut self, status: &ConnectionStatusView) {
        if status.state != ConnectionState::Reconnecting {
            self.countdown = None;
        }
        self.connection = status.clone();
        self.redraw_status();
    }

    pub fn update_countdown(&mut self, seconds: Option<u64>) {
        self.countdown = seconds;
        self.redraw_status();
    }

    /// Print a line above the bars without tearing them.
    pub fn println(&self, msg: &str) {
        let _ = self.multi.println(msg);
    }

    pub fn finish(&self, view: &ProgressView) {
        if view.is_failed {
            self.node_bar.abandon_with_message(format!("{}", style("Run failed").red().bold()));
        } else if view.is_complete {
            self.node_bar.finish_with_message(format!("{}", style("Run complete").green().bold()));
        } else {
            self.node_bar.abandon();
        }
        self.status_bar.finish_and_clear();
    }

    fn redraw_status(&self) {
        let mut line = render_connection_line(&self.connection, self.countdown);
        let stats = &self.connection.stats;
        if self.connection.state == ConnectionState::Connected {
            line.push_str(&format!(" | {} events", stats.events_processed));
            if let Some(latency) = stats.latency_ms {
                line.push_str(&format!(" | {}ms", latency));
            }
        }
        self.status_bar.set_message(line);
    }
}
