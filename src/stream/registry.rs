use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use tracing::{debug, info};

use crate::models::WorkflowEvent;
use crate::progress::{ProgressCache, ProgressView};
use crate::utils::observers::{ObserverHandle, ObserverSet};
use super::buffer::EventBuffer;

/// Upstream side of run subscriptions: told when a run gains its first
/// subscriber and when it loses its last one.
///
/// Both calls are made while the registry holds the run's map entry, so for
/// any one run they arrive strictly alternating. Implementations must not
/// call back into the registry.
pub trait UpstreamLink: Send + Sync {
    fn run_added(&self, run_id: &str);
    fn run_released(&self, run_id: &str);
}

/// For offline use, where nothing upstream needs to know about runs.
pub struct NoUpstream;

impl UpstreamLink for NoUpstream {
    fn run_added(&self, _run_id: &str) {}
    fn run_released(&self, _run_id: &str) {}
}

#[derive(Debug, Clone, PartialEq)]
pub enum ChangeKind {
    Appended { event: WorkflowEvent, evicted: usize },
    Cleared { removed: usize },
}

/// Change notification delivered once per buffer mutation.
#[derive(Debug, Clone, PartialEq)]
pub struct BufferChange {
    pub run_id: String,
    pub version: u64,
    pub len: usize,
    pub kind: ChangeKind,
}

/// Shared per-run state behind every subscription handle for that run.
struct RunChannel {
    run_id: String,
    buffer: Mutex<EventBuffer>,
    cache: Mutex<ProgressCache>,
    observers: Arc<ObserverSet<BufferChange>>,
    stalled: AtomicBool,
    total_expected_nodes: usize,
}

impl RunChannel {
    fn new(run_id: &str, max_events: usize, total_expected_nodes: usize, stalled: bool) -> Self {
        Self {
            run_id: run_id.to_string(),
            buffer: Mutex::new(EventBuffer::new(max_events)),
            cache: Mutex::new(ProgressCache::new()),
            observers: ObserverSet::new(),
            stalled: AtomicBool::new(stalled),
            total_expected_nodes,
        }
    }

    fn buffer(&self) -> std::sync::MutexGuard<'_, EventBuffer> {
        self.buffer.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn append(&self, event: WorkflowEvent) {
        let change = {
            let mut buffer = self.buffer();
            let evicted = buffer.append(event.clone());
            BufferChange {
                run_id: self.run_id.clone(),
                version: buffer.version(),
                len: buffer.len(),
                kind: ChangeKind::Appended { event, evicted },
            }
        };
        self.observers.notify(&change);
    }

    fn clear(&self) {
        let change = {
            let mut buffer = self.buffer();
            let removed = buffer.clear();
            BufferChange {
                run_id: self.run_id.clone(),
                version: buffer.version(),
                len: 0,
                kind: ChangeKind::Cleared { removed },
            }
        };
        self.observers.notify(&change);
    }

    fn progress(&self) -> ProgressView {
        let buffer = self.buffer();
        self.cache
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get_or_project(buffer.version(), buffer.iter(), self.total_expected_nodes)
    }
}

struct RunEntry {
    channel: Arc<RunChannel>,
    subscribers: usize,
}

/// Owns one reference-counted event buffer per subscribed run and routes
/// validated events into them.
pub struct RunRegistry {
    runs: DashMap<String, RunEntry>,
    max_events: usize,
    total_expected_nodes: usize,
    upstream: Arc<dyn UpstreamLink>,
    // Inherited by runs subscribed while the connection is down
    stalled: AtomicBool,
}

impl RunRegistry {
    pub fn new(max_events: usize, total_expected_nodes: usize, upstream: Arc<dyn UpstreamLink>) -> Arc<Self> {
        Arc::new(Self {
            runs: DashMap::new(),
            max_events,
            total_expected_nodes,
            upstream,
            stalled: AtomicBool::new(false),
        })
    }

    /// Register interest in `run_id`. Subscribers to the same run share one
    /// buffer; the first one triggers an upstream subscription.
    pub fn subscribe(self: &Arc<Self>, run_id: &str) -> RunSubscription {
        let channel = {
            let mut entry = self.runs.entry(run_id.to_string()).or_insert_with(|| RunEntry {
                channel: Arc::new(RunChannel::new(
                    run_id,
                    self.max_events,
                    self.total_expected_nodes,
                    self.stalled.load(Ordering::SeqCst),
                )),
                subscribers: 0,
            });
            entry.subscribers += 1;
            if entry.subscribers == 1 {
                info!(run_id, "Subscribed to workflow run");
                self.upstream.run_added(run_id);
            }
            Arc::clone(&entry.channel)
        };

        RunSubscription {
            registry: Arc::clone(self),
            channel,
        }
    }

    fn release(&self, run_id: &str) {
        if let Entry::Occupied(mut entry) = self.runs.entry(run_id.to_string()) {
            let remaining = entry.get().subscribers.saturating_sub(1);
            entry.get_mut().subscribers = remaining;
            if remaining == 0 {
                info!(run_id, "Released workflow run");
                self.upstream.run_released(run_id);
                entry.remove();
            }
        }
    }

    /// Route an event to its run's buffer. Returns false (and drops the
    /// event) when nobody is tracking that run.
    pub fn dispatch(&self, event: WorkflowEvent) -> bool {
        let channel = match self.runs.get(&event.run_id) {
            Some(entry) => Arc::clone(&entry.channel),
            None => {
                debug!(run_id = %event.run_id, "Ignoring event for untracked run");
                return false;
            }
        };
        channel.append(event);
        true
    }

    /// Empty a run's buffer. Returns false for untracked runs.
    pub fn clear(&self, run_id: &str) -> bool {
        let channel = match self.runs.get(run_id) {
            Some(entry) => Arc::clone(&entry.channel),
            None => return false,
        };
        channel.clear();
        true
    }

    pub fn set_stalled(&self, stalled: bool) {
        self.stalled.store(stalled, Ordering::SeqCst);
        for entry in self.runs.iter() {
            entry.channel.stalled.store(stalled, Ordering::SeqCst);
        }
    }

    pub fn active_runs(&self) -> Vec<String> {
        let mut runs: Vec<String> = self.runs.iter().map(|e| e.key().clone()).collect();
        runs.sort();
        runs
    }

    pub fn active_count(&self) -> usize {
        self.runs.len()
    }

    pub fn subscriber_count(&self, run_id: &str) -> usize {
        self.runs.get(run_id).map(|e| e.subscribers).unwrap_or(0)
    }
}

/// Handle to one run's event buffer.
///
/// Read-only for the holder apart from `clear`. Dropping the handle
/// unsubscribes; the buffer is released with the last handle.
pub struct RunSubscription {
    registry: Arc<RunRegistry>,
    channel: Arc<RunChannel>,
}

impl RunSubscription {
    pub fn run_id(&self) -> &str {
        &self.channel.run_id
    }

    /// Current contents in arrival order.
    pub fn snapshot(&self) -> Vec<WorkflowEvent> {
        self.channel.buffer().to_vec()
    }

    pub fn len(&self) -> usize {
        self.channel.buffer().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn version(&self) -> u64 {
        self.channel.buffer().version()
    }

    /// Progress derived from the current contents.
    pub fn progress(&self) -> ProgressView {
        self.channel.progress()
    }

    pub fn on_change<F>(&self, callback: F) -> ObserverHandle
    where
        F: Fn(&BufferChange) + Send + Sync + 'static,
    {
        self.channel.observers.register(callback)
    }

    /// Empty the shared buffer. The subscription itself stays active.
    pub fn clear(&self) {
        self.channel.clear();
    }

    /// Text dump of an event for manual inspection.
    pub fn copy_event(&self, event: &WorkflowEvent) -> String {
        event.to_pretty_text()
    }

    /// True while the connection is down; no appends happen until it returns.
    pub fn is_stalled(&self) -> bool {
        self.channel.stalled.load(Ordering::SeqCst)
    }

    pub fn unsubscribe(self) {
        drop(self);
    }
}

impl Drop for RunSubscription {
    fn drop(&mut self) {
        self.registry.release(&self.channel.run_id);
    }
}
