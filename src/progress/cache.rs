use crate::models::WorkflowEvent;
use super::projector::project;
use super::view::ProgressView;

/// Remembers the last projection, keyed by the buffer version it was
/// computed from. Purely an optimization; `project` is always correct.
#[derive(Debug, Default)]
pub struct ProgressCache {
    version: Option<u64>,
    view: ProgressView,
}

impl ProgressCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get_or_project<'a, I>(&mut self, version: u64, events: I, total_expected_nodes: usize) -> ProgressView
    where
        I: IntoIterator<Item = &'a WorkflowEvent>,
    {
        if self.version != Some(version) || self.view.total_expected_nodes != total_expected_nodes {
            self.view = project(events, total_expected_nodes);
            self.version = Some(version);
        }
        self.view.clone()
    }

    pub fn invalidate(&mut self) {
        self.version = None;
    }
}
