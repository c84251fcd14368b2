use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use chrono::Utc;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::config::MonitorSettings;
use crate::errors::SongwatchError;
use crate::models::{ConnectionError, ConnectionState, ConnectionStats, ConnectionStatusView, WorkflowEvent};
use crate::stream::{RunRegistry, RunSubscription, UpstreamLink};
use crate::utils::observers::{ObserverHandle, ObserverSet};
use crate::utils::timer::schedule_once;
use super::state::{ConnectionStateMachine, RetryDecision};
use super::transport::{InboundMessage, OutboundMessage, Transport, TransportSession};

#[derive(Debug)]
enum Command {
    Connect,
    Disconnect,
    Subscribe(String),
    Unsubscribe(String),
    Shutdown,
}

/// Forwards run (un)subscriptions from the registry to the driver.
struct CommandLink {
    commands: mpsc::UnboundedSender<Command>,
}

impl UpstreamLink for CommandLink {
    fn run_added(&self, run_id: &str) {
        let _ = self.commands.send(Command::Subscribe(run_id.to_string()));
    }

    fn run_released(&self, run_id: &str) {
        let _ = self.commands.send(Command::Unsubscribe(run_id.to_string()));
    }
}

#[derive(Default)]
struct Telemetry {
    connected_at: Option<Instant>,
    latency_ms: Option<u64>,
}

/// State shared between the public handle and the driver task.
struct Shared {
    machine: Mutex<ConnectionStateMachine>,
    telemetry: Mutex<Telemetry>,
    events_processed: AtomicU64,
    observers: Arc<ObserverSet<ConnectionStatusView>>,
    registry: Arc<RunRegistry>,
}

impl Shared {
    fn machine(&self) -> MutexGuard<'_, ConnectionStateMachine> {
        self.machine.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn telemetry(&self) -> MutexGuard<'_, Telemetry> {
        self.telemetry.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn stats(&self) -> ConnectionStats {
        let telemetry = self.telemetry();
        ConnectionStats {
            active_subscriptions: self.registry.active_count(),
            events_processed: self.events_processed.load(Ordering::Relaxed),
            reconnections: 0,
            uptime_ms: telemetry
                .connected_at
                .map(|at| at.elapsed().as_millis() as u64)
                .unwrap_or(0),
            latency_ms: telemetry.latency_ms,
        }
    }

    fn view(&self) -> ConnectionStatusView {
        let stats = self.stats();
        self.machine().view(stats)
    }

    /// Notify observers of the current state. Observer panics are isolated
    /// inside the observer set.
    fn publish(&self) {
        let view = self.view();
        self.observers.notify(&view);
    }
}

/// One logical connection to the workflow event source, shared by any number
/// of run subscriptions.
///
/// Lifecycle: `new` → `init` (spawns the driver task) → `connect` /
/// `disconnect` as needed → `dispose`. All connection state changes happen on
/// the driver task; this handle only enqueues commands and reads snapshots.
pub struct ConnectionManager {
    settings: MonitorSettings,
    transport: Arc<dyn Transport>,
    shared: Arc<Shared>,
    commands: mpsc::UnboundedSender<Command>,
    pending_rx: Mutex<Option<mpsc::UnboundedReceiver<Command>>>,
    driver: Mutex<Option<JoinHandle<()>>>,
}

impl ConnectionManager {
    pub fn new(settings: MonitorSettings, transport: Arc<dyn Transport>) -> Self {
        let (commands, rx) = mpsc::unbounded_channel();
        let link = Arc::new(CommandLink { commands: commands.clone() });
        let registry = RunRegistry::new(settings.max_events, settings.total_expected_nodes, link);

        let shared = Arc::new(Shared {
            machine: Mutex::new(ConnectionStateMachine::new(settings.backoff)),
            telemetry: Mutex::new(Telemetry::default()),
            events_processed: AtomicU64::new(0),
            observers: ObserverSet::new(),
            registry,
        });

        Self {
            settings,
            transport,
            shared,
            commands,
            pending_rx: Mutex::new(Some(rx)),
            driver: Mutex::new(None),
        }
    }

    /// Spawn the driver task. Must be called from within a tokio runtime.
    /// Calling it twice is a no-op.
    pub fn init(&self) {
        let rx = match self.pending_rx.lock().unwrap_or_else(PoisonError::into_inner).take() {
            Some(rx) => rx,
            None => {
                warn!("Connection manager already initialized");
                return;
            }
        };

        let driver = Driver {
            transport: Arc::clone(&self.transport),
            shared: Arc::clone(&self.shared),
            connect_timeout: self.settings.connect_timeout,
            ping_interval: self.settings.ping_interval,
            commands: rx,
            next_nonce: 0,
            pending_ping: None,
        };
        let handle = tokio::spawn(driver.run());
        *self.driver.lock().unwrap_or_else(PoisonError::into_inner) = Some(handle);
        debug!(endpoint = %self.transport.endpoint(), "Connection driver started");
    }

    /// Stop the driver, closing any open session. Subscriptions stay valid
    /// but receive no further events.
    pub async fn dispose(&self) {
        let _ = self.commands.send(Command::Shutdown);
        let handle = self.driver.lock().unwrap_or_else(PoisonError::into_inner).take();
        if let Some(handle) = handle {
            if let Err(e) = handle.await {
                warn!(error = %e, "Connection driver ended abnormally");
            }
        }
    }

    /// Start a connection attempt now, skipping any pending backoff delay.
    /// Does not reset the reconnect attempt counter.
    pub fn connect(&self) {
        let _ = self.commands.send(Command::Connect);
    }

    pub fn disconnect(&self) {
        let _ = self.commands.send(Command::Disconnect);
    }

    pub fn subscribe(&self, run_id: &str) -> RunSubscription {
        self.shared.registry.subscribe(run_id)
    }

    /// Empty the event buffer of `run_id`. Returns false if nobody is
    /// subscribed to it.
    pub fn clear_events(&self, run_id: &str) -> bool {
        self.shared.registry.clear(run_id)
    }

    pub fn status(&self) -> ConnectionStatusView {
        self.shared.view()
    }

    pub fn state(&self) -> ConnectionState {
        self.shared.machine().state()
    }

    pub fn stats(&self) -> ConnectionStats {
        self.shared.view().stats
    }

    /// Register for a snapshot on every state transition.
    pub fn observe<F>(&self, callback: F) -> ObserverHandle
    where
        F: Fn(&ConnectionStatusView) + Send + Sync + 'static,
    {
        self.shared.observers.register(callback)
    }

    pub fn settings(&self) -> &MonitorSettings {
        &self.settings
    }
}

impl Drop for ConnectionManager {
    fn drop(&mut self) {
        // The registry's link keeps the command channel open
        let _ = self.commands.send(Command::Shutdown);
    }
}

/// Where the driver loop goes next.
enum Step {
    Idle,
    Attempt,
    Waiting(Duration),
    Online(Box<dyn TransportSession>),
    Shutdown,
}

struct Driver {
    transport: Arc<dyn Transport>,
    shared: Arc<Shared>,
    connect_timeout: Duration,
    ping_interval: Duration,
    commands: mpsc::UnboundedReceiver<Command>,
    next_nonce: u64,
    pending_ping: Option<(u64, Instant)>,
}

impl Driver {
    async fn run(mut self) {
        let mut step = Step::Idle;
        loop {
            step = match step {
                Step::Idle => self.idle().await,
                Step::Attempt => self.attempt().await,
                Step::Waiting(delay) => self.wait_for_retry(delay).await,
                Step::Online(session) => self.online(session).await,
                Step::Shutdown => break,
            };
        }

        self.shared.machine().disconnect(Utc::now());
        self.shared.telemetry().connected_at = None;
        self.shared.registry.set_stalled(true);
        self.shared.publish();
        debug!("Connection driver stopped");
    }

    async fn idle(&mut self) -> Step {
        loop {
            match self.commands.recv().await {
                None | Some(Command::Shutdown) => return Step::Shutdown,
                Some(Command::Connect) => return self.begin_attempt(),
                Some(Command::Disconnect) => {
                    let state = self.shared.machine().state();
                    if state != ConnectionState::Disconnected {
                        self.mark_disconnected();
                    }
                }
                // Subscriptions are (re)sent once a session is up
                Some(Command::Subscribe(_) | Command::Unsubscribe(_)) => {}
            }
        }
    }

    fn begin_attempt(&mut self) -> Step {
        let started = self.shared.machine().begin_connect();
        if !started {
            return Step::Idle;
        }
        info!(endpoint = %self.transport.endpoint(), "Connecting to workflow event stream");
        self.shared.publish();
        Step::Attempt
    }

    async fn attempt(&mut self) -> Step {
        let transport = Arc::clone(&self.transport);
        let connect = tokio::time::timeout(self.connect_timeout, transport.connect());
        tokio::pin!(connect);

        loop {
            tokio::select! {
                result = &mut connect => {
                    return match result {
                        Ok(Ok(session)) => self.connected(session).await,
                        Ok(Err(e)) => self.attempt_failed(&e),
                        Err(_) => self.attempt_failed(&SongwatchError::Timeout(format!(
                            "connect attempt exceeded {}ms",
                            self.connect_timeout.as_millis()
                        ))),
                    };
                }
                command = self.commands.recv() => match command {
                    None | Some(Command::Shutdown) => return Step::Shutdown,
                    Some(Command::Disconnect) => {
                        self.mark_disconnected();
                        return Step::Idle;
                    }
                    // Already connecting; subscriptions go out after connect
                    Some(Command::Connect | Command::Subscribe(_) | Command::Unsubscribe(_)) => {}
                }
            }
        }
    }

    async fn connected(&mut self, mut session: Box<dyn TransportSession>) -> Step {
        let runs = self.shared.registry.active_runs();
        let resubscribe = async {
            for run_id in runs {
                session.send(OutboundMessage::Subscribe { run_id }).await?;
            }
            Ok::<(), SongwatchError>(())
        };
        let resubscribed = tokio::time::timeout(self.connect_timeout, resubscribe).await;
        match resubscribed {
            Ok(Ok(())) => {}
            Ok(Err(e)) => return self.attempt_failed(&e),
            // Dropped without a close handshake; the peer is not reading
            Err(_) => {
                return self.attempt_failed(&SongwatchError::Timeout(format!(
                    "resubscribe exceeded {}ms",
                    self.connect_timeout.as_millis()
                )));
            }
        }

        self.shared.machine().connect_succeeded(Utc::now());
        {
            let mut telemetry = self.shared.telemetry();
            telemetry.connected_at = Some(Instant::now());
        }
        self.pending_ping = None;
        self.shared.registry.set_stalled(false);
        info!(endpoint = %self.transport.endpoint(), "Connected to workflow event stream");
        self.shared.publish();
        Step::Online(session)
    }

    fn attempt_failed(&mut self, error: &SongwatchError) -> Step {
        let decision = self.shared.machine().connect_failed(ConnectionError::from(error));
        self.after_failure(decision, error)
    }

    fn connection_lost(&mut self, error: &SongwatchError) -> Step {
        self.shared.telemetry().connected_at = None;
        self.shared.registry.set_stalled(true);
        let decision = self
            .shared
            .machine()
            .connection_lost(ConnectionError::from(error), Utc::now());
        self.after_failure(decision, error)
    }

    fn after_failure(&mut self, decision: RetryDecision, error: &SongwatchError) -> Step {
        let step = match decision {
            RetryDecision::Retry { attempt, .. } => {
                let delay = self.shared.machine().policy().delay_with_jitter(attempt);
                warn!(
                    attempt,
                    delay_ms = delay.as_millis() as u64,
                    error = %error,
                    "Event stream unavailable, scheduling reconnect"
                );
                Step::Waiting(delay)
            }
            RetryDecision::GiveUp => {
                warn!(error = %error, "Giving up on event stream connection");
                Step::Idle
            }
        };
        self.shared.publish();
        step
    }

    async fn wait_for_retry(&mut self, delay: Duration) -> Step {
        let (fire_tx, mut fired) = oneshot::channel();
        // Dropping the handle on any early return cancels the retry.
        let _timer = schedule_once(delay, move || {
            let _ = fire_tx.send(());
        });

        loop {
            tokio::select! {
                _ = &mut fired => return self.begin_attempt(),
                command = self.commands.recv() => match command {
                    None | Some(Command::Shutdown) => return Step::Shutdown,
                    Some(Command::Connect) => {
                        debug!("Manual reconnect requested, skipping backoff");
                        return self.begin_attempt();
                    }
                    Some(Command::Disconnect) => {
                        self.mark_disconnected();
                        return Step::Idle;
                    }
                    Some(Command::Subscribe(_) | Command::Unsubscribe(_)) => {}
                }
            }
        }
    }

    async fn online(&mut self, mut session: Box<dyn TransportSession>) -> Step {
        let start = Instant::now() + self.ping_interval;
        let mut heartbeat = tokio::time::interval_at(start, self.ping_interval);

        loop {
            tokio::select! {
                inbound = session.recv() => match inbound {
                    Some(Ok(message)) => self.handle_inbound(message),
                    Some(Err(e)) => return self.connection_lost(&e),
                    None => return self.connection_lost(&SongwatchError::Closed("stream ended".into())),
                },
                command = self.commands.recv() => match command {
                    None | Some(Command::Shutdown) => {
                        close_quietly(session.as_mut()).await;
                        return Step::Shutdown;
                    }
                    Some(Command::Disconnect) => {
                        close_quietly(session.as_mut()).await;
                        self.mark_disconnected();
                        return Step::Idle;
                    }
                    Some(Command::Connect) => {}
                    Some(Command::Subscribe(run_id)) => {
                        if let Err(e) = session.send(OutboundMessage::Subscribe { run_id }).await {
                            return self.connection_lost(&e);
                        }
                    }
                    Some(Command::Unsubscribe(run_id)) => {
                        if let Err(e) = session.send(OutboundMessage::Unsubscribe { run_id }).await {
                            return self.connection_lost(&e);
                        }
                    }
                },
                _ = heartbeat.tick() => {
                    self.next_nonce += 1;
                    let nonce = self.next_nonce;
                    self.pending_ping = Some((nonce, Instant::now()));
                    if let Err(e) = session.send(OutboundMessage::Ping { nonce }).await {
                        return self.connection_lost(&e);
                    }
                }
            }
        }
    }

    fn handle_inbound(&mut self, message: InboundMessage) {
        match message {
            InboundMessage::Event(value) => match WorkflowEvent::from_value(value) {
                Ok(event) => {
                    if self.shared.registry.dispatch(event) {
                        self.shared.events_processed.fetch_add(1, Ordering::Relaxed);
                    }
                }
                Err(reason) => debug!(reason = %reason, "Dropping malformed workflow event"),
            },
            InboundMessage::Pong { nonce } => {
                let matched = match (self.pending_ping, nonce) {
                    (Some((pending, _)), Some(nonce)) => pending == nonce,
                    // Servers that do not echo the nonce answer the latest ping
                    (Some(_), None) => true,
                    (None, _) => false,
                };
                if !matched {
                    return;
                }
                if let Some((_, sent_at)) = self.pending_ping.take() {
                    let latency = sent_at.elapsed().as_millis() as u64;
                    self.shared.telemetry().latency_ms = Some(latency);
                    debug!(latency_ms = latency, "Heartbeat round trip");
                }
            }
            InboundMessage::Malformed(reason) => debug!(reason = %reason, "Dropping undecodable frame"),
            InboundMessage::Ignored => {}
        }
    }

    fn mark_disconnected(&mut self) {
        self.shared.machine().disconnect(Utc::now());
        self.shared.telemetry().connected_at = None;
        self.shared.registry.set_stalled(true);
        info!("Disconnected from workflow event stream");
        self.shared.publish();
    }
}

async fn close_quietly(session: &mut dyn TransportSession) {
    if let Err(e) = session.close().await {
        debug!(error = %e, "Error while closing event stream session");
    }
}
