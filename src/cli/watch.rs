use std::sync::Arc;

use tokio::sync::mpsc;
use tracing::info;

use songwatch::connection::{ConnectionManager, ReconnectCountdown, WebSocketTransport};
use songwatch::display::renderer::{render_connection_status, render_event, render_progress, render_version};
use songwatch::display::WatchProgress;
use songwatch::errors::SongwatchError;
use songwatch::models::{ConnectionState, ConnectionStatusView};
use songwatch::stream::{BufferChange, ChangeKind};

use crate::cli::commands::WatchArgs;
use crate::cli::load_settings;

enum Update {
    Status(ConnectionStatusView),
    Buffer(BufferChange),
}

pub async fn handle_watch(args: WatchArgs, quiet: bool) -> Result<(), SongwatchError> {
    let settings = load_settings(args.config.as_deref())
        .await?
        .with_overrides(args.url.clone(), args.max_events);
    info!(run_id = %args.run_id, url = %settings.url, "Watching workflow run");

    let transport = Arc::new(WebSocketTransport::new(&settings.url)?);
    let manager = ConnectionManager::new(settings.clone(), transport);
    manager.init();
    let subscription = manager.subscribe(&args.run_id);

    let (tx, mut rx) = mpsc::unbounded_channel();
    let status_tx = tx.clone();
    let _status_observer = manager.observe(move |status| {
        let _ = status_tx.send(Update::Status(status.clone()));
    });
    let _buffer_observer = subscription.on_change(move |change| {
        let _ = tx.send(Update::Buffer(change.clone()));
    });

    let mut countdown = ReconnectCountdown::new(settings.backoff);
    let mut countdown_rx = countdown.watch();
    let mut display = WatchProgress::new(&args.run_id, settings.total_expected_nodes, quiet);
    if !quiet {
        display.println(&render_version());
    }

    manager.connect();

    let outcome = loop {
        tokio::select! {
            update = rx.recv() => match update {
                Some(Update::Status(status)) => {
                    countdown.update(status.state, status.reconnect_attempt);
                    display.update_connection(&status);
                    if status.state == ConnectionState::Failed {
                        let reason = status
                            .error
                            .as_ref()
                            .map(|e| e.to_string())
                            .unwrap_or_else(|| "reconnect attempts exhausted".to_string());
                        break Err(SongwatchError::Transport(reason));
                    }
                }
                Some(Update::Buffer(change)) => {
                    if args.events {
                        if let ChangeKind::Appended { event, .. } = &change.kind {
                            display.println(&render_event(event));
                        }
                    }
                    let view = subscription.progress();
                    display.update_progress(&view);
                    if view.is_finished() && !args.follow {
                        break Ok(());
                    }
                }
                None => break Ok(()),
            },
            changed = countdown_rx.changed() => {
                if changed.is_ok() {
                    let remaining = *countdown_rx.borrow_and_update();
                    display.update_countdown(remaining);
                }
            }
            _ = tokio::signal::ctrl_c() => {
                info!("Interrupted, disconnecting");
                break Ok(());
            }
        }
    };

    let view = subscription.progress();
    display.finish(&view);
    manager.dispose().await;

    if !quiet {
        println!("{}", render_progress(subscription.run_id(), &view));
        if outcome.is_err() {
            println!("{}", render_connection_status(&manager.status()));
        }
    }
    outcome
}
