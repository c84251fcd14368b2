use std::collections::VecDeque;

use crate::models::WorkflowEvent;

pub const DEFAULT_MAX_EVENTS: usize = 100;

/// Ordered, capacity-bounded log of the events received for one run.
///
/// Overflow evicts from the head, so the contents are always the most recent
/// suffix of the arrival sequence. `version` changes on every mutation and
/// keys the progress cache.
#[derive(Debug, Clone)]
pub struct EventBuffer {
    events: VecDeque<WorkflowEvent>,
    max_events: usize,
    version: u64,
}

impl EventBuffer {
    pub fn new(max_events: usize) -> Self {
        let max_events = max_events.max(1);
        Self {
            events: VecDeque::with_capacity(max_events.min(DEFAULT_MAX_EVENTS)),
            max_events,
            version: 0,
        }
    }

    /// Push at the tail and return how many events were evicted.
    pub fn append(&mut self, event: WorkflowEvent) -> usize {
        self.events.push_back(event);
        let mut evicted = 0;
        while self.events.len() > self.max_events {
            self.events.pop_front();
            evicted += 1;
        }
        self.version += 1;
        evicted
    }

    /// Empty the buffer and return how many events were dropped.
    pub fn clear(&mut self) -> usize {
        let removed = self.events.len();
        self.events.clear();
        self.version += 1;
        removed
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    pub fn max_events(&self) -> usize {
        self.max_events
    }

    pub fn version(&self) -> u64 {
        self.version
    }

    pub fn iter(&self) -> impl Iterator<Item = &WorkflowEvent> {
        self.events.iter()
    }

    pub fn last(&self) -> Option<&WorkflowEvent> {
        self.events.back()
    }

    pub fn to_vec(&self) -> Vec<WorkflowEvent> {
        self.events.iter().cloned().collect()
    }
}

impl Default for EventBuffer {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_EVENTS)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::EventPhase;

    fn event(seq: usize) -> WorkflowEvent {
        WorkflowEvent {
            run_id: "run-1".to_string(),
            timestamp: format!("2025-01-15T10:00:{:02}.000Z", seq % 60),
            phase: EventPhase::Start,
            node_name: Some(format!("NODE_{}", seq)),
            data: Default::default(),
            metrics: Default::default(),
            issues: Vec::new(),
        }
    }

    fn node_names(buffer: &EventBuffer) -> Vec<String> {
        buffer.iter().filter_map(|e| e.node_name.clone()).collect()
    }

    #[test]
    fn test_default_capacity() {
        assert_eq!(EventBuffer::default().max_events(), 100);
    }

    #[test]
    fn test_keeps_most_recent_suffix() {
        let mut buffer = EventBuffer::new(3);
        for seq in 0..7 {
            buffer.append(event(seq));
            let names = node_names(&buffer);
            let expected: Vec<String> = (0..=seq)
                .skip((seq + 1).saturating_sub(3))
                .map(|s| format!("NODE_{}", s))
                .collect();
            assert_eq!(names, expected);
        }
    }

    #[test]
    fn test_capacity_after_overflow() {
        let mut buffer = EventBuffer::new(100);
        for seq in 0..250 {
            buffer.append(event(seq));
        }
        assert_eq!(buffer.len(), 100);
        assert_eq!(buffer.iter().next().unwrap().node(), Some("NODE_150"));
        assert_eq!(buffer.last().unwrap().node(), Some("NODE_249"));
    }

    #[test]
    fn test_append_reports_evictions() {
        let mut buffer = EventBuffer::new(2);
        assert_eq!(buffer.append(event(0)), 0);
        assert_eq!(buffer.append(event(1)), 0);
        assert_eq!(buffer.append(event(2)), 1);
    }

    #[test]
    fn test_version_bumps_on_every_mutation() {
        let mut buffer = EventBuffer::new(2);
        assert_eq!(buffer.version(), 0);
        buffer.append(event(0));
        buffer.append(event(1));
        buffer.append(event(2));
        assert_eq!(buffer.version(), 3);
        assert_eq!(buffer.clear(), 2);
        assert_eq!(buffer.version(), 4);
        assert!(buffer.is_empty());
    }

    #[test]
    fn test_zero_capacity_is_raised_to_one() {
        let mut buffer = EventBuffer::new(0);
        buffer.append(event(0));
        buffer.append(event(1));
        assert_eq!(buffer.len(), 1);
    }
}
